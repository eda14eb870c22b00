//! Resource adapter and data source traits

use crate::data::ResourceData;
use crate::error::{ResourceError, Result};
use crate::schema::ResourceSchema;
use crate::wait::StateChangeConf;
use async_trait::async_trait;
use hwcloud_config::ClientFactory;
use hwcloud_sdk::ServiceClient;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Per-operation timeouts of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceTimeouts {
    pub create: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl ResourceTimeouts {
    pub const fn new(create: Duration, update: Duration, delete: Duration) -> Self {
        Self {
            create,
            update,
            delete,
        }
    }

    pub const fn uniform(timeout: Duration) -> Self {
        Self::new(timeout, timeout, timeout)
    }
}

/// Overrides the delay and interval adapters configure on their waits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTiming {
    pub delay: Duration,
    pub interval: Duration,
}

/// Everything an adapter needs for one operation
#[derive(Debug, Clone)]
pub struct OperationContext {
    factory: Arc<ClientFactory>,
    region: Option<String>,
    timeouts: Option<ResourceTimeouts>,
    poll_timing: Option<PollTiming>,
    cancellation: CancellationToken,
}

impl OperationContext {
    pub fn new(factory: Arc<ClientFactory>) -> Self {
        Self {
            factory,
            region: None,
            timeouts: None,
            poll_timing: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// Region used when the resource does not configure one
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_timeouts(mut self, timeouts: ResourceTimeouts) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    pub fn with_poll_timing(mut self, timing: PollTiming) -> Self {
        self.poll_timing = Some(timing);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn factory(&self) -> &ClientFactory {
        &self.factory
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Region of `data`: its `region` argument, the context region, or the
    /// provider region.
    pub fn region(&self, data: &ResourceData) -> String {
        self.region_or(data.get_str("region"))
    }

    /// `requested` when set, otherwise the context region, otherwise the
    /// provider region
    pub fn region_or(&self, requested: Option<&str>) -> String {
        requested
            .filter(|region| !region.is_empty())
            .map(str::to_string)
            .or_else(|| self.region.clone())
            .unwrap_or_else(|| self.factory.region().to_string())
    }

    /// Service client for `service` in the region of `data`
    pub async fn client(&self, service: &str, data: &ResourceData) -> Result<ServiceClient> {
        self.client_in(service, data.get_str("region")).await
    }

    /// Service client for `service` in `region`, falling back as
    /// [`OperationContext::region_or`] does
    pub async fn client_in(&self, service: &str, region: Option<&str>) -> Result<ServiceClient> {
        let region = self.region_or(region);
        Ok(self.factory.service_client(service, Some(&region)).await?)
    }

    /// Service client for `service` in the context region
    pub async fn default_client(&self, service: &str) -> Result<ServiceClient> {
        self.client_in(service, None).await
    }

    /// Effective timeouts: the override if set, otherwise the adapter's
    pub fn timeouts(&self, defaults: ResourceTimeouts) -> ResourceTimeouts {
        self.timeouts.unwrap_or(defaults)
    }

    /// Interval between retries of a rejected request: the poll timing
    /// override if set, otherwise `default`
    pub fn retry_interval(&self, default: Duration) -> Duration {
        self.poll_timing.map_or(default, |timing| timing.interval)
    }

    /// Attach the cancellation token and any poll timing override
    pub fn wait_conf(&self, conf: StateChangeConf) -> StateChangeConf {
        let conf = conf.cancellation(self.cancellation.clone());
        match self.poll_timing {
            Some(timing) => conf.delay(timing.delay).poll_interval(timing.interval),
            None => conf,
        }
    }
}

/// Outcome of reading a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    Present,
    /// The resource no longer exists and should be dropped from state
    Absent,
}

/// CRUD adapter for one resource type
#[async_trait]
pub trait ResourceAdapter: Send + Sync {
    /// Type name, e.g. `huaweicloud_dcs_instance`
    fn type_name(&self) -> &'static str;

    fn schema(&self) -> ResourceSchema;

    fn timeouts(&self) -> ResourceTimeouts;

    /// Create the resource and set its ID on `data`
    async fn create(&self, ctx: &OperationContext, data: &mut ResourceData) -> Result<()>;

    /// Refresh the attributes of `data` from the cloud
    async fn read(&self, ctx: &OperationContext, data: &mut ResourceData) -> Result<ReadOutcome>;

    /// Apply changed mutable arguments
    async fn update(&self, ctx: &OperationContext, data: &mut ResourceData) -> Result<()>;

    async fn delete(&self, ctx: &OperationContext, data: &mut ResourceData) -> Result<()>;

    /// Adopt an existing resource by its cloud identity
    async fn import(&self, ctx: &OperationContext, id: &str) -> Result<ResourceData> {
        let mut data = ResourceData::default().with_id(id);
        match self.read(ctx, &mut data).await? {
            ReadOutcome::Present => Ok(data),
            ReadOutcome::Absent => Err(ResourceError::NotFound(format!(
                "{} {}",
                self.type_name(),
                id
            ))),
        }
    }
}

/// Read-only query
#[async_trait]
pub trait DataSource: Send + Sync {
    fn type_name(&self) -> &'static str;

    async fn read(&self, ctx: &OperationContext, args: &Value) -> Result<Value>;
}
