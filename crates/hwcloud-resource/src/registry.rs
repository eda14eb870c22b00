//! Registry of resource adapters and data sources

use crate::adapter::{DataSource, ResourceAdapter};
use crate::error::{ResourceError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Default, Clone)]
pub struct Registry {
    resources: BTreeMap<&'static str, Arc<dyn ResourceAdapter>>,
    data_sources: BTreeMap<&'static str, Arc<dyn DataSource>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_resource(&mut self, adapter: impl ResourceAdapter + 'static) -> &mut Self {
        self.resources.insert(adapter.type_name(), Arc::new(adapter));
        self
    }

    pub fn register_data_source(&mut self, source: impl DataSource + 'static) -> &mut Self {
        self.data_sources.insert(source.type_name(), Arc::new(source));
        self
    }

    pub fn resource(&self, type_name: &str) -> Result<Arc<dyn ResourceAdapter>> {
        self.resources
            .get(type_name)
            .cloned()
            .ok_or_else(|| ResourceError::UnknownResourceType(type_name.to_string()))
    }

    pub fn data_source(&self, type_name: &str) -> Result<Arc<dyn DataSource>> {
        self.data_sources
            .get(type_name)
            .cloned()
            .ok_or_else(|| ResourceError::UnknownDataSource(type_name.to_string()))
    }

    /// Registered resource type names, sorted
    pub fn resource_types(&self) -> Vec<&'static str> {
        self.resources.keys().copied().collect()
    }

    /// Registered data source names, sorted
    pub fn data_source_types(&self) -> Vec<&'static str> {
        self.data_sources.keys().copied().collect()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("resources", &self.resource_types())
            .field("data_sources", &self.data_source_types())
            .finish()
    }
}
