//! This module implements the autoscaling policy, a background process that keeps the size of a
//! node source proportional to the workload of the scheduler.
//!
//! Each cycle samples the workload, smooths it over a window of samples and reconciles the
//! estimated size of the node source with the number of nodes required by the load, within the
//! configured bounds. Node removals and additions are only requested here, their outcome is
//! observed later through node events, which are accounted by [`accountant::PoolAccountant`].
pub mod accountant;
pub mod config;
pub mod controller;
pub mod gate;
pub mod link;
pub mod process;
pub mod registry;
pub mod removal;
pub mod sampler;
pub mod schedule;
pub mod service;
pub mod workload;

pub use config::{PolicyConfig, PolicyParams, ScalerConfig};
pub use controller::{AutoscaleController, PolicyStatus, ScaleDecision};
pub use link::{LinkConnector, NodeSourceLink};
pub use registry::{NodeId, NodeState};
pub use service::{PolicyService, PoolEvent, activate_policy};
