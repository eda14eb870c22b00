//! Resource argument schemas

use crate::error::{ResourceError, Result};
use serde_json::Value;

/// One top-level argument of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    /// Must be present on create
    pub required: bool,
    /// Changing the value replaces the resource
    pub force_new: bool,
    /// Filled in by the cloud when not configured
    pub computed: bool,
}

impl FieldSpec {
    pub const fn required(name: &'static str) -> Self {
        Self {
            name,
            required: true,
            force_new: false,
            computed: false,
        }
    }

    pub const fn optional(name: &'static str) -> Self {
        Self {
            name,
            required: false,
            force_new: false,
            computed: false,
        }
    }

    pub const fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub const fn computed(mut self) -> Self {
        self.computed = true;
        self
    }
}

/// Argument schema of a resource type
#[derive(Debug, Clone, Copy)]
pub struct ResourceSchema {
    fields: &'static [FieldSpec],
}

impl ResourceSchema {
    pub const fn new(fields: &'static [FieldSpec]) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &'static [FieldSpec] {
        self.fields
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Presence checks for required arguments and rejection of unknown ones
    pub fn validate(&self, config: &Value) -> Result<()> {
        let map = config.as_object().ok_or_else(|| {
            ResourceError::InvalidConfig("resource configuration must be an object".to_string())
        })?;

        for key in map.keys() {
            if self.field(key).is_none() {
                return Err(ResourceError::InvalidConfig(format!(
                    "unsupported argument: {key}"
                )));
            }
        }
        for field in self.fields.iter().filter(|f| f.required) {
            if value_of(config, field.name).is_none() {
                return Err(ResourceError::MissingField(field.name.to_string()));
            }
        }
        Ok(())
    }

    /// Configured arguments whose value differs between `prior` and `desired`.
    /// Computed arguments left out of `desired` do not count as changes.
    pub fn changed_fields(&self, prior: &Value, desired: &Value) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|f| {
                let wanted = value_of(desired, f.name);
                if wanted.is_none() && f.computed {
                    return false;
                }
                wanted != value_of(prior, f.name)
            })
            .map(|f| f.name)
            .collect()
    }

    /// Changed arguments that cannot be updated in place
    pub fn replacement_fields(&self, prior: &Value, desired: &Value) -> Vec<&'static str> {
        self.changed_fields(prior, desired)
            .into_iter()
            .filter(|name| self.field(name).is_some_and(|f| f.force_new))
            .collect()
    }
}

/// Value of `key`, treating `null` and `""` as absent
pub(crate) fn value_of<'v>(config: &'v Value, key: &str) -> Option<&'v Value> {
    config
        .get(key)
        .filter(|v| !v.is_null() && v.as_str() != Some(""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FIELDS: &[FieldSpec] = &[
        FieldSpec::optional("region").force_new().computed(),
        FieldSpec::required("name"),
        FieldSpec::required("engine").force_new(),
        FieldSpec::optional("description"),
        FieldSpec::optional("enterprise_project_id").force_new().computed(),
    ];
    const SCHEMA: ResourceSchema = ResourceSchema::new(FIELDS);

    #[test]
    fn test_validate_required() {
        assert!(SCHEMA.validate(&json!({"name": "a", "engine": "Redis"})).is_ok());
        assert!(matches!(
            SCHEMA.validate(&json!({"name": "a"})),
            Err(ResourceError::MissingField(f)) if f == "engine"
        ));
        assert!(matches!(
            SCHEMA.validate(&json!({"name": "", "engine": "Redis"})),
            Err(ResourceError::MissingField(f)) if f == "name"
        ));
    }

    #[test]
    fn test_validate_rejects_unknown_arguments() {
        assert!(matches!(
            SCHEMA.validate(&json!({"name": "a", "engine": "Redis", "colour": "red"})),
            Err(ResourceError::InvalidConfig(_))
        ));
        assert!(SCHEMA.validate(&json!(["not", "an", "object"])).is_err());
    }

    #[test]
    fn test_changed_and_replacement_fields() {
        let prior = json!({"name": "a", "engine": "Redis", "enterprise_project_id": "0"});
        let desired = json!({"name": "b", "engine": "Memcached", "description": null});

        assert_eq!(SCHEMA.changed_fields(&prior, &desired), vec!["name", "engine"]);
        assert_eq!(SCHEMA.replacement_fields(&prior, &desired), vec!["engine"]);
    }

    #[test]
    fn test_null_and_missing_are_equal() {
        let prior = json!({"name": "a", "engine": "Redis"});
        let desired = json!({"name": "a", "engine": "Redis", "description": ""});
        assert!(SCHEMA.changed_fields(&prior, &desired).is_empty());
    }
}
