//! Service client factory

use crate::{CloudConfig, ConfigError, Result};
use hwcloud_sdk::catalog::{self, ServiceEntry};
use hwcloud_sdk::{ProviderClient, RequestOpts, RetryConfig, ServiceClient};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Builds [`ServiceClient`]s from a [`CloudConfig`].
///
/// Every client shares the same [`ProviderClient`]. Project IDs looked up
/// through IAM are cached per region.
#[derive(Debug)]
pub struct ClientFactory {
    config: CloudConfig,
    provider: Arc<ProviderClient>,
    project_ids: RwLock<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct Project {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ProjectList {
    projects: Vec<Project>,
}

impl ClientFactory {
    pub fn new(config: CloudConfig) -> Result<Self> {
        let retry = RetryConfig::default().with_max_retries(config.max_retries);
        let provider = ProviderClient::new(config.auth_token.clone(), config.insecure)?
            .with_retry(retry);
        Ok(Self::with_provider(config, Arc::new(provider)))
    }

    /// Use an already built provider client
    pub fn with_provider(config: CloudConfig, provider: Arc<ProviderClient>) -> Self {
        Self {
            config,
            provider,
            project_ids: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CloudConfig {
        &self.config
    }

    pub fn region(&self) -> &str {
        &self.config.region
    }

    pub fn provider(&self) -> Arc<ProviderClient> {
        Arc::clone(&self.provider)
    }

    /// Resolve the region a resource should live in.
    ///
    /// Tokens are region scoped, so a resource-level region different from
    /// the provider region is rejected.
    pub fn resolve_region(&self, requested: Option<&str>) -> Result<String> {
        match requested.filter(|r| !r.is_empty()) {
            Some(region) if region != self.config.region => Err(ConfigError::RegionMismatch {
                requested: region.to_string(),
                provider: self.config.region.clone(),
            }),
            _ => Ok(self.config.region.clone()),
        }
    }

    /// Enterprise project for a new resource: its own value, otherwise the
    /// provider default
    pub fn enterprise_project_id(&self, requested: Option<&str>) -> Option<String> {
        requested
            .filter(|id| !id.is_empty())
            .or_else(|| {
                self.config
                    .enterprise_project_id
                    .as_deref()
                    .filter(|id| !id.is_empty())
            })
            .map(str::to_string)
    }

    /// Endpoint for `entry`, honouring configured overrides
    pub fn endpoint(&self, entry: &ServiceEntry, region: &str) -> String {
        match self.config.endpoints.get(entry.key) {
            Some(url) => url.clone(),
            None => entry.endpoint(region, &self.config.cloud, self.config.regional),
        }
    }

    /// Client for `service` in `region` (the provider region when `None`)
    pub async fn service_client(&self, service: &str, region: Option<&str>) -> Result<ServiceClient> {
        let entry =
            catalog::lookup(service).ok_or_else(|| ConfigError::UnknownService(service.to_string()))?;
        let region = self.resolve_region(region)?;

        let project_id = if entry.without_project_id {
            None
        } else {
            Some(self.project_id(&region).await?)
        };

        let endpoint = self.endpoint(entry, &region);
        debug!(service, region = %region, endpoint = %endpoint, "building service client");
        Ok(ServiceClient::for_service(
            self.provider(),
            entry,
            endpoint,
            project_id,
        )?)
    }

    /// Project ID for `region`: configured value, cache, then IAM lookup
    /// (scoped to `domain_id` when configured)
    pub async fn project_id(&self, region: &str) -> Result<String> {
        if let Some(project_id) = self.config.project_id.as_ref().filter(|p| !p.is_empty()) {
            return Ok(project_id.clone());
        }
        if let Some(cached) = self.cached_project_id(region) {
            return Ok(cached);
        }

        let iam = self.service_client_for_lookup(region)?;
        let url = iam.url("v3/projects");
        let mut opts = RequestOpts::new().query("name", region);
        // Project names are only unique within an account
        if let Some(domain_id) = self.config.domain_id.as_deref().filter(|d| !d.is_empty()) {
            opts = opts.query("domain_id", domain_id);
        }
        let list: ProjectList = iam.get(&url, opts).await?.json()?;
        let project_id = list
            .projects
            .into_iter()
            .find(|p| p.name == region)
            .map(|p| p.id)
            .ok_or_else(|| ConfigError::ProjectNotFound(region.to_string()))?;

        debug!(region, project_id = %project_id, "resolved project id");
        if let Ok(mut cache) = self.project_ids.write() {
            cache.insert(region.to_string(), project_id.clone());
        }
        Ok(project_id)
    }

    fn cached_project_id(&self, region: &str) -> Option<String> {
        self.project_ids
            .read()
            .ok()
            .and_then(|cache| cache.get(region).cloned())
    }

    fn service_client_for_lookup(&self, region: &str) -> Result<ServiceClient> {
        let entry =
            catalog::lookup("iam").ok_or_else(|| ConfigError::UnknownService("iam".to_string()))?;
        let endpoint = self.endpoint(entry, region);
        Ok(ServiceClient::for_service(
            self.provider(),
            entry,
            endpoint,
            None,
        )?)
    }
}
