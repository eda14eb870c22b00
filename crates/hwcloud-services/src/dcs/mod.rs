//! Distributed Cache Service (DCS)

mod instance;
mod instances;

pub use instance::InstanceAdapter;
pub use instances::InstancesDataSource;
