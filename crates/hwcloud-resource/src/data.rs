//! Per-operation resource data

use crate::error::{ResourceError, Result};
use crate::schema::value_of;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Identity, configuration and computed attributes of one resource.
///
/// `config` is the desired configuration, `prior` the configuration the
/// resource was last applied with. Adapters read arguments from `config` and
/// record what the cloud reports with [`ResourceData::set`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceData {
    id: Option<String>,
    config: Value,
    prior: Option<Value>,
    attributes: Map<String, Value>,
}

impl Default for ResourceData {
    fn default() -> Self {
        Self::new(Value::Object(Map::new()))
    }
}

impl ResourceData {
    pub fn new(config: Value) -> Self {
        Self {
            id: None,
            config,
            prior: None,
            attributes: Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_prior(mut self, prior: Value) -> Self {
        self.prior = Some(prior);
        self
    }

    pub fn with_attributes(mut self, attributes: Map<String, Value>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn require_id(&self) -> Result<&str> {
        self.id().filter(|id| !id.is_empty()).ok_or(ResourceError::MissingId)
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    pub fn clear_id(&mut self) {
        self.id = None;
    }

    pub fn config(&self) -> &Value {
        &self.config
    }

    pub fn prior(&self) -> Option<&Value> {
        self.prior.as_ref()
    }

    /// Typed view of the desired configuration
    pub fn config_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.config.clone())
            .map_err(|e| ResourceError::InvalidConfig(e.to_string()))
    }

    /// Configured value of `key`, falling back to the last read attribute
    pub fn get(&self, key: &str) -> Option<&Value> {
        value_of(&self.config, key).or_else(|| self.attributes.get(key).filter(|v| !v.is_null()))
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    /// Whether the configured value of `key` differs from the prior one
    pub fn has_change(&self, key: &str) -> bool {
        let (old, new) = self.get_change(key);
        old != new
    }

    pub fn has_changes(&self, keys: &[&str]) -> bool {
        keys.iter().any(|key| self.has_change(key))
    }

    /// Prior and desired values of `key`
    pub fn get_change(&self, key: &str) -> (Option<&Value>, Option<&Value>) {
        let old = self.prior.as_ref().and_then(|prior| value_of(prior, key));
        (old, value_of(&self.config, key))
    }

    /// Record a computed attribute
    pub fn set(&mut self, key: &str, value: impl Serialize) -> Result<()> {
        self.attributes
            .insert(key.to_string(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn into_attributes(self) -> Map<String, Value> {
        self.attributes
    }
}
