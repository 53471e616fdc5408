pub mod policy;
pub mod schedule;
