//! Cloud Data Migration (CDM)

mod job;

pub use job::JobAdapter;
