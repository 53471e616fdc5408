use std::future::Future;
use std::time::Duration;

use derive_builder::Builder;
use tokio::task::{JoinHandle, LocalSet};

use crate::policy::config::{PolicyConfig, PolicyParams, WorkloadSource};

/// Runs `background_fut` on a local set until `fut` finishes.
/// The set is returned so that the background future keeps running.
pub async fn run_concurrent<
    R: 'static,
    Fut1: 'static + Future<Output = R>,
    Fut2: Future<Output = ()>,
>(
    background_fut: Fut1,
    fut: Fut2,
) -> (LocalSet, JoinHandle<R>) {
    let set = tokio::task::LocalSet::new();
    let handle = set.spawn_local(background_fut);
    set.run_until(fut).await;
    (set, handle)
}

#[derive(Builder)]
#[builder(pattern = "owned", build_fn(name = "finish"))]
pub struct Policy {
    #[builder(default = "Duration::from_secs(1)")]
    refresh_period: Duration,
    #[builder(default)]
    min_nodes: u32,
    #[builder(default = "10")]
    max_nodes: u32,
    #[builder(default = "10")]
    load_factor: u32,
    #[builder(default = "1")]
    window_size: u32,
    #[builder(default)]
    release_delay: Duration,
    #[builder(default)]
    release_threshold: Duration,
    #[builder(default)]
    preemptive_release: bool,
    #[builder(default)]
    workload_source: WorkloadSource,
}

impl PolicyBuilder {
    pub fn params(self) -> PolicyParams {
        let Policy {
            refresh_period,
            min_nodes,
            max_nodes,
            load_factor,
            window_size,
            release_delay,
            release_threshold,
            preemptive_release,
            workload_source,
        } = self.finish().unwrap();
        PolicyParams {
            refresh_period,
            min_nodes,
            max_nodes,
            load_factor,
            window_size,
            release_delay,
            release_threshold,
            preemptive_release,
            workload_source,
        }
    }

    pub fn build(self) -> PolicyConfig {
        PolicyConfig::try_from(self.params()).unwrap()
    }
}
