//! HuaweiCloud service adapters
//!
//! Resource adapters and data sources built on `hwcloud-resource`:
//!
//! | Type | Kind | Service |
//! |------|------|---------|
//! | `huaweicloud_ga_accelerator` | resource | GA |
//! | `huaweicloud_dcs_instance` | resource | DCS |
//! | `huaweicloud_cdm_job` | resource | CDM |
//! | `huaweicloud_ga_accelerators` | data source | GA |
//! | `huaweicloud_dcs_instances` | data source | DCS |
//!
//! # Example
//!
//! ```ignore
//! let registry = hwcloud_services::registry();
//! let adapter = registry.resource("huaweicloud_dcs_instance")?;
//! let data = Lifecycle::new(adapter, ctx).create(config).await?;
//! ```

pub mod cdm;
pub mod common;
pub mod dcs;
pub mod ga;

use hwcloud_resource::Registry;

/// Registry with every adapter and data source of this crate
pub fn registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .register_resource(ga::AcceleratorAdapter::new())
        .register_resource(dcs::InstanceAdapter::new())
        .register_resource(cdm::JobAdapter::new())
        .register_data_source(ga::AcceleratorsDataSource::new())
        .register_data_source(dcs::InstancesDataSource::new());
    registry
}
