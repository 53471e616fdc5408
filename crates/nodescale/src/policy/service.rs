use std::future::Future;
use std::pin::Pin;
use std::time::SystemTime;

use chrono::Local;

use crate::common::JobId;
use crate::common::rpc::{ResponseToken, RpcSender, initiate_request, make_rpc_queue};
use crate::policy::config::{PolicyConfig, ScalerConfig};
use crate::policy::controller::{AutoscaleController, PolicyStatus};
use crate::policy::gate::create_gate;
use crate::policy::link::{LinkConnector, connect_with_retry};
use crate::policy::process::policy_process;
use crate::policy::registry::{NodeId, NodeState};

/// Change observed in the resource manager.
#[derive(Debug, Clone, PartialEq)]
pub enum PoolEvent {
    NodeAdded {
        node: NodeId,
        source: String,
        state: NodeState,
        at: SystemTime,
    },
    NodeRemoved {
        node: NodeId,
        source: String,
        state: NodeState,
    },
    NodeStateChanged {
        node: NodeId,
        source: String,
        previous: NodeState,
        state: NodeState,
    },
    JobSubmitted {
        job: JobId,
        /// Nodes needed by all tasks of the job.
        nodes_needed: u32,
    },
    TaskFinished {
        job: JobId,
        nodes: u32,
    },
    /// The scheduler recomputed the nodes still needed by a job.
    JobUpdated {
        job: JobId,
        nodes_needed: u32,
    },
    JobFinished {
        job: JobId,
    },
}

impl PoolEvent {
    /// Node source of a node event, `None` for job and task events.
    pub fn node_source(&self) -> Option<&str> {
        match self {
            PoolEvent::NodeAdded { source, .. }
            | PoolEvent::NodeRemoved { source, .. }
            | PoolEvent::NodeStateChanged { source, .. } => Some(source),
            PoolEvent::JobSubmitted { .. }
            | PoolEvent::TaskFinished { .. }
            | PoolEvent::JobUpdated { .. }
            | PoolEvent::JobFinished { .. } => None,
        }
    }
}

#[derive(Debug)]
pub enum PolicyMessage {
    Event(PoolEvent),
    GetStatus(ResponseToken<PolicyStatus>),
    Shutdown,
}

/// Handle to a running policy.
#[derive(Clone)]
pub struct PolicyService {
    sender: RpcSender<PolicyMessage>,
}

impl PolicyService {
    pub fn on_event(&self, event: PoolEvent) {
        self.send(PolicyMessage::Event(event));
    }

    /// Returns `None` if the policy is not running anymore.
    pub fn get_status(&self) -> impl Future<Output = Option<PolicyStatus>> + use<> {
        let fut = initiate_request(|token| self.sender.send(PolicyMessage::GetStatus(token)));
        async move { fut.await.ok() }
    }

    /// Stops the policy loop. Requests that were already issued are not awaited.
    pub fn shutdown(&self) {
        self.send(PolicyMessage::Shutdown);
    }

    fn send(&self, message: PolicyMessage) {
        if self.sender.send(message).is_err() {
            log::debug!("Policy loop has already ended");
        }
    }
}

pub type PolicyProcess = Pin<Box<dyn Future<Output = ()>>>;

/// Validates the configuration, connects to the scheduler and prepares the policy loop.
/// The returned future has to be polled (e.g. spawned on a `LocalSet`) for the policy to run.
pub async fn activate_policy(
    config: ScalerConfig,
    connector: &dyn LinkConnector,
) -> crate::Result<(PolicyService, PolicyProcess)> {
    let ScalerConfig { policy, gate, link } = config;
    let policy = PolicyConfig::try_from(policy)?;
    let gate = create_gate(&gate, &Local::now())?;

    let link = connect_with_retry(connector, link.connect_trials, link.connect_backoff).await?;
    let nodes = link.nodes_in_source().await.map_err(|error| {
        crate::Error::GenericError(format!(
            "Could not read the nodes of node source {}: {error:?}",
            link.source_name()
        ))
    })?;

    let jobs = link.jobs_in_scheduler().await.map_err(|error| {
        crate::Error::GenericError(format!("Could not read the jobs of the scheduler: {error:?}"))
    })?;

    log::info!(
        "Activating policy for node source {}: {}",
        link.source_name(),
        policy.summary()
    );
    let mut controller = AutoscaleController::new(policy);
    controller.seed(nodes);
    controller.seed_jobs(jobs);

    let (tx, rx) = make_rpc_queue();
    let process = policy_process(controller, gate, link, rx);
    Ok((PolicyService { sender: tx }, Box::pin(process)))
}
