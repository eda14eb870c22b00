//! Drives adapters through their lifecycle
//!
//! `absent → creating → present → (updating → present)* → deleting → absent`

use crate::action::ActionType;
use crate::adapter::{OperationContext, ReadOutcome, ResourceAdapter};
use crate::data::ResourceData;
use crate::error::{ResourceError, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Executes planned actions against one adapter
pub struct Lifecycle {
    adapter: Arc<dyn ResourceAdapter>,
    ctx: OperationContext,
}

impl Lifecycle {
    pub fn new(adapter: Arc<dyn ResourceAdapter>, ctx: OperationContext) -> Self {
        Self { adapter, ctx }
    }

    pub fn adapter(&self) -> &dyn ResourceAdapter {
        self.adapter.as_ref()
    }

    /// Run `action`. `current` is the tracked resource (ID and prior
    /// configuration), `desired` the new configuration. Returns the resulting
    /// resource, or `None` once it is gone.
    ///
    /// A replacement whose create step fails after the old resource was
    /// deleted reports [`ResourceError::ReplacementFailed`].
    pub async fn execute(
        &self,
        action: ActionType,
        current: Option<ResourceData>,
        desired: Option<Value>,
    ) -> Result<Option<ResourceData>> {
        match (action, current, desired) {
            (ActionType::NoOp, current, _) => Ok(current),
            (ActionType::Create, _, Some(desired)) => self.create(desired).await.map(Some),
            (ActionType::Update, Some(current), Some(desired)) => {
                self.update(current, desired).await.map(Some)
            }
            (ActionType::Replace, Some(current), Some(desired)) => {
                let id = current.require_id()?.to_string();
                self.delete(current).await?;
                match self.create(desired).await {
                    Ok(data) => Ok(Some(data)),
                    Err(e @ ResourceError::Tainted { .. }) => Err(e),
                    Err(e) => Err(ResourceError::ReplacementFailed {
                        id,
                        source: Box::new(e),
                    }),
                }
            }
            (ActionType::Delete, Some(current), _) => {
                self.delete(current).await?;
                Ok(None)
            }
            (action, _, _) => Err(ResourceError::InvalidConfig(format!(
                "cannot {action} {} without the required prior or desired configuration",
                self.adapter.type_name()
            ))),
        }
    }

    /// Create, then read back. If the create call assigned an ID but a later
    /// step failed, the error is [`ResourceError::Tainted`] so the caller can
    /// still track the half-created resource.
    pub async fn create(&self, desired: Value) -> Result<ResourceData> {
        let type_name = self.adapter.type_name();
        self.adapter.schema().validate(&desired)?;

        let mut data = ResourceData::new(desired);
        info!(resource_type = type_name, "creating");
        if let Err(e) = self.adapter.create(&self.ctx, &mut data).await {
            return Err(taint(&data, e));
        }

        match self.adapter.read(&self.ctx, &mut data).await {
            Ok(ReadOutcome::Present) => {}
            Ok(ReadOutcome::Absent) => {
                return Err(taint(
                    &data,
                    ResourceError::NotFound(format!("{type_name} disappeared after creation")),
                ));
            }
            Err(e) => return Err(taint(&data, e)),
        }

        info!(
            resource_type = type_name,
            id = data.id().unwrap_or_default(),
            "created"
        );
        Ok(data)
    }

    pub async fn update(&self, current: ResourceData, desired: Value) -> Result<ResourceData> {
        let type_name = self.adapter.type_name();
        let id = current.require_id()?.to_string();
        let prior = current.config().clone();

        let mut data = ResourceData::new(desired)
            .with_id(&id)
            .with_prior(prior)
            .with_attributes(current.into_attributes());

        info!(resource_type = type_name, id = %id, "updating");
        self.adapter.update(&self.ctx, &mut data).await?;
        match self.adapter.read(&self.ctx, &mut data).await? {
            ReadOutcome::Present => {
                info!(resource_type = type_name, id = %id, "updated");
                Ok(data)
            }
            ReadOutcome::Absent => Err(ResourceError::NotFound(format!("{type_name} {id}"))),
        }
    }

    pub async fn delete(&self, mut current: ResourceData) -> Result<()> {
        let type_name = self.adapter.type_name();
        let id = current.require_id()?.to_string();

        info!(resource_type = type_name, id = %id, "deleting");
        self.adapter.delete(&self.ctx, &mut current).await?;
        info!(resource_type = type_name, id = %id, "deleted");
        Ok(())
    }

    /// Read the current state; `None` when the resource no longer exists
    pub async fn refresh(&self, mut current: ResourceData) -> Result<Option<ResourceData>> {
        let id = current.require_id()?.to_string();
        match self.adapter.read(&self.ctx, &mut current).await? {
            ReadOutcome::Present => Ok(Some(current)),
            ReadOutcome::Absent => {
                debug!(
                    resource_type = self.adapter.type_name(),
                    id = %id,
                    "resource is gone, dropping it"
                );
                Ok(None)
            }
        }
    }

    pub async fn import(&self, id: &str) -> Result<ResourceData> {
        info!(resource_type = self.adapter.type_name(), id, "importing");
        self.adapter.import(&self.ctx, id).await
    }
}

fn taint(data: &ResourceData, error: ResourceError) -> ResourceError {
    match data.id() {
        Some(id) if !id.is_empty() => ResourceError::Tainted {
            id: id.to_string(),
            source: Box::new(error),
        },
        _ => error,
    }
}
