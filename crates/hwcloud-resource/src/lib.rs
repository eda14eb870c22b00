//! hwcloud resource framework
//!
//! Resource adapters translate a declarative configuration into calls against
//! HuaweiCloud REST APIs. This crate holds everything that is not specific to
//! one resource type.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  hwcloud CLI                     │
//! │          (apply / show / destroy / import)       │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               hwcloud-resource                   │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  Lifecycle  ──►  trait ResourceAdapter    │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │ StateChange  │  │  State Mgmt  │            │
//! │  │    Conf      │  │              │            │
//! │  └──────────────┘  └──────────────┘            │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼─────────────────────────────────────────┐
//! │  hwcloud-services: GA / DCS / CDM adapters       │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod action;
pub mod adapter;
pub mod data;
pub mod error;
pub mod lifecycle;
pub mod registry;
pub mod schema;
pub mod state;
pub mod wait;

// Re-exports
pub use action::{ActionType, Plan, plan, plan_action};
pub use adapter::{
    DataSource, OperationContext, PollTiming, ReadOutcome, ResourceAdapter, ResourceTimeouts,
};
pub use data::ResourceData;
pub use error::{ResourceError, Result};
pub use lifecycle::Lifecycle;
pub use registry::Registry;
pub use schema::{FieldSpec, ResourceSchema};
pub use state::{ResourceState, ResourceStatus, StateFile, StateLock, StateManager};
pub use wait::{Refreshed, Settled, StateChangeConf, TimeoutCause, WaitError};
