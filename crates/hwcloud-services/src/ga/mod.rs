//! Global Accelerator (GA)

mod accelerator;
mod accelerators;

pub use accelerator::AcceleratorAdapter;
pub use accelerators::AcceleratorsDataSource;
