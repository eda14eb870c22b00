//! Resource operation error types

use crate::wait::WaitError;
use hwcloud_config::ConfigError;
use hwcloud_sdk::SdkError;
use thiserror::Error;

/// Resource operation errors
#[derive(Error, Debug)]
pub enum ResourceError {
    #[error(transparent)]
    Sdk(#[from] SdkError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Wait(#[from] WaitError<SdkError>),

    #[error("missing required argument: {0}")]
    MissingField(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid resource ID {id:?}: {reason}")]
    InvalidId { id: String, reason: String },

    #[error("resource has no ID")]
    MissingId,

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("{operation} failed: {message}")]
    Operation { operation: String, message: String },

    #[error("unknown resource type: {0}")]
    UnknownResourceType(String),

    #[error("unknown data source: {0}")]
    UnknownDataSource(String),

    #[error("resource {id} was created but did not become ready: {source}")]
    Tainted {
        id: String,
        #[source]
        source: Box<ResourceError>,
    },

    #[error("resource {id} was deleted but its replacement could not be created: {source}")]
    ReplacementFailed {
        id: String,
        #[source]
        source: Box<ResourceError>,
    },

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ResourceError {
    pub fn operation(operation: impl Into<String>, message: impl Into<String>) -> Self {
        ResourceError::Operation {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Whether the underlying cause is a missing cloud resource
    pub fn is_not_found(&self) -> bool {
        match self {
            ResourceError::NotFound(_) => true,
            ResourceError::Sdk(e) => e.is_not_found(),
            ResourceError::Wait(WaitError::Refresh(e)) => e.is_not_found(),
            _ => false,
        }
    }

    /// Whether the operation gave up waiting, as opposed to failing
    pub fn is_timeout(&self) -> bool {
        match self {
            ResourceError::Wait(e) => e.is_timeout(),
            ResourceError::Tainted { source, .. }
            | ResourceError::ReplacementFailed { source, .. } => source.is_timeout(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ResourceError>;
