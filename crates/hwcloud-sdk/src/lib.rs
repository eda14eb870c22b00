//! HuaweiCloud REST SDK
//!
//! Low-level building blocks shared by every resource adapter: an
//! authenticated HTTP client bound to a service endpoint, typed request
//! bodies and query strings, status-code checking and list pagination.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use hwcloud_sdk::{catalog, ProviderClient, RequestOpts, ServiceClient};
//!
//! let provider = Arc::new(ProviderClient::new(token, false)?);
//! let entry = catalog::lookup("dcs").unwrap();
//! let endpoint = entry.endpoint("cn-north-4", "myhuaweicloud.com", false);
//! let client = ServiceClient::for_service(provider, entry, endpoint, Some(project_id))?;
//!
//! let response = client
//!     .get(&client.resource_url(&["instances", id]), RequestOpts::new())
//!     .await?;
//! let instance: Instance = response.json()?;
//! ```

pub mod catalog;
pub mod client;
pub mod error;
pub mod pagination;
pub mod request;

pub use catalog::{ServiceEntry, Scope};
pub use client::{ProviderClient, RequestOpts, Response, RetryConfig, ServiceClient};
pub use error::{ResponseDetail, Result, SdkError};
pub use pagination::{PageStrategy, Pager};
pub use request::{QueryParams, RequestBody, expand_path, require, require_str};
pub use reqwest::Method;
