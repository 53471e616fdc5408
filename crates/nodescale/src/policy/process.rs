use std::time::{Duration, Instant};

use chrono::Local;

use crate::common::rpc::RpcReceiver;
use crate::common::timeutils::now_monotonic;
use crate::policy::controller::AutoscaleController;
use crate::policy::gate::{GateVerdict, ScaleGate};
use crate::policy::link::NodeSourceLink;
use crate::policy::service::PolicyMessage;

/// Accumulates the time elapsed between wake-ups of the policy loop, so that the cycle runs at
/// most once per refresh period, however often the loop is woken up by events.
pub struct CycleBudget {
    period: Duration,
    accumulated: Duration,
    last_check: Instant,
}

impl CycleBudget {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            accumulated: Duration::ZERO,
            last_check: now_monotonic(),
        }
    }

    /// Adds the time elapsed since the last call. Returns `true` (and starts a new period) if a
    /// whole period has elapsed.
    pub fn advance(&mut self) -> bool {
        let now = now_monotonic();
        self.accumulated += now.saturating_duration_since(self.last_check);
        self.last_check = now;
        if self.accumulated >= self.period {
            self.accumulated = Duration::ZERO;
            true
        } else {
            false
        }
    }

    /// Starts a new period, e.g. after a cycle was run out of order.
    pub fn reset(&mut self) {
        self.accumulated = Duration::ZERO;
        self.last_check = now_monotonic();
    }
}

/// Main loop of a policy. It owns the whole policy state, runs the control cycle periodically and
/// handles events and requests sent through `receiver`.
pub async fn policy_process(
    mut controller: AutoscaleController,
    mut gate: Box<dyn ScaleGate>,
    mut link: Box<dyn NodeSourceLink>,
    mut receiver: RpcReceiver<PolicyMessage>,
) {
    let refresh_period = controller.config().refresh_period();
    let mut budget = CycleBudget::new(refresh_period);

    loop {
        let trigger_delay = gate.next_trigger().map(|time| {
            (time - Local::now())
                .to_std()
                .unwrap_or(Duration::ZERO)
        });

        tokio::select! {
            msg = tokio::time::timeout(refresh_period, receiver.recv()) => {
                match msg {
                    Ok(None) | Ok(Some(PolicyMessage::Shutdown)) => break,
                    Ok(Some(message)) => handle_message(&mut controller, gate.as_ref(), link.as_ref(), message),
                    Err(_) => {}
                }
            }
            _ = wait_for_trigger(trigger_delay) => {
                if gate.fire_due(&Local::now()) {
                    run_gated_cycle(&mut controller, gate.as_mut(), link.as_mut()).await;
                    budget.reset();
                }
            }
        }

        if budget.advance() {
            run_gated_cycle(&mut controller, gate.as_mut(), link.as_mut()).await;
        }
    }
    log::debug!("Ending policy loop of node source {}", link.source_name());
}

async fn wait_for_trigger(delay: Option<Duration>) {
    match delay {
        Some(delay) => tokio::time::sleep(delay).await,
        None => std::future::pending().await,
    }
}

fn handle_message(
    controller: &mut AutoscaleController,
    gate: &dyn ScaleGate,
    link: &dyn NodeSourceLink,
    message: PolicyMessage,
) {
    log::debug!("Handling message {message:?}");
    match message {
        PolicyMessage::Event(event) => controller.on_event(event, link.source_name()),
        PolicyMessage::GetStatus(response) => response.respond(controller.status(gate.describe())),
        PolicyMessage::Shutdown => {}
    }
}

/// Runs the cycle as decided by the gate.
pub async fn run_gated_cycle(
    controller: &mut AutoscaleController,
    gate: &mut dyn ScaleGate,
    link: &mut dyn NodeSourceLink,
) {
    match gate.verdict() {
        GateVerdict::Run => {
            controller.run_cycle(link).await;
        }
        GateVerdict::ReleaseAll => controller.release_all(link).await,
        GateVerdict::FillToMax => controller.fill_to_max(link),
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant, SystemTime};

    use chrono::{DateTime, Local, NaiveDateTime, TimeZone};

    use super::{CycleBudget, handle_message, policy_process, run_gated_cycle};
    use crate::common::rpc::{ResponseToken, make_rpc_queue};
    use crate::common::timeutils::mock_time::MockTime;
    use crate::policy::controller::{AutoscaleController, ScaleDecision};
    use crate::policy::gate::{AlwaysOnGate, FullHoldGate, ScaleGate, TimeWindowGate, Trigger};
    use crate::policy::link::{NodeSnapshot, NodeSourceLink};
    use crate::policy::registry::NodeState;
    use crate::policy::schedule::CronSchedule;
    use crate::policy::service::{PolicyMessage, PoolEvent};
    use crate::tests::link::MockLink;
    use crate::tests::utils::{PolicyBuilder, run_concurrent};

    fn local(text: &str) -> DateTime<Local> {
        let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M").unwrap();
        Local.from_local_datetime(&naive).earliest().unwrap()
    }

    fn trigger(expression: &str) -> Trigger {
        Trigger::new(
            CronSchedule::parse(expression).unwrap(),
            &local("2024-03-01 07:00"),
        )
    }

    fn seeded(builder: PolicyBuilder, nodes: &[&str]) -> AutoscaleController {
        let mut controller = AutoscaleController::new(builder.build());
        controller.seed(
            nodes
                .iter()
                .map(|node| NodeSnapshot::new(*node, NodeState::Free, SystemTime::now()))
                .collect(),
        );
        controller
    }

    #[test]
    fn budget_runs_once_per_period() {
        let time = MockTime::mock(Instant::now());
        let mut budget = CycleBudget::new(Duration::from_secs(10));
        assert!(!budget.advance());

        time.advance(Duration::from_secs(4));
        assert!(!budget.advance());
        time.advance(Duration::from_secs(4));
        assert!(!budget.advance());
        time.advance(Duration::from_secs(2));
        assert!(budget.advance());

        // A new period starts after the cycle
        time.advance(Duration::from_secs(9));
        assert!(!budget.advance());
        time.advance(Duration::from_secs(1));
        assert!(budget.advance());
    }

    #[test]
    fn budget_reset() {
        let time = MockTime::mock(Instant::now());
        let mut budget = CycleBudget::new(Duration::from_secs(10));
        time.advance(Duration::from_secs(9));
        budget.reset();
        time.advance(Duration::from_secs(9));
        assert!(!budget.advance());
    }

    #[test]
    fn handle_status_request() {
        let mut controller = seeded(PolicyBuilder::default(), &["a"]);
        let link = MockLink::default();
        let (token, mut rx) = ResponseToken::new();
        handle_message(
            &mut controller,
            &AlwaysOnGate,
            &link,
            PolicyMessage::GetStatus(token),
        );
        let status = rx.try_recv().unwrap();
        assert_eq!(status.registered_nodes, 1);
    }

    #[test]
    fn handle_node_event() {
        let mut controller = seeded(PolicyBuilder::default(), &["a"]);
        let link = MockLink::default();
        handle_message(
            &mut controller,
            &AlwaysOnGate,
            &link,
            PolicyMessage::Event(PoolEvent::NodeStateChanged {
                node: "a".to_string(),
                source: link.source_name().to_string(),
                previous: NodeState::Free,
                state: NodeState::Down,
            }),
        );
        assert_eq!(controller.accountant().counters().confirmed_in_source, 0);
        assert!(controller.accountant().is_down("a"));
    }

    #[tokio::test]
    async fn forbidden_window_empties_pool() {
        let mut controller = seeded(PolicyBuilder::default().min_nodes(2), &["a", "b"]);
        let mut link = MockLink::default();
        link.set_node_state("a", NodeState::Free);
        link.set_node_state("b", NodeState::Busy);
        let mut gate = TimeWindowGate::new(trigger("0 8 * * *"), trigger("0 20 * * *"), false);

        run_gated_cycle(&mut controller, &mut gate, &mut link).await;
        assert_eq!(link.released(), vec!["a", "b"]);
        assert_eq!(controller.accountant().estimate_in_source(), 0);

        // The pool is empty, nothing else happens
        run_gated_cycle(&mut controller, &mut gate, &mut link).await;
        assert_eq!(link.released().len(), 2);
        assert!(link.acquired().is_empty());
    }

    #[tokio::test]
    async fn full_hold_fills_and_drains() {
        let mut controller = seeded(PolicyBuilder::default().max_nodes(3), &["a"]);
        let mut link = MockLink::default();
        link.set_node_state("a", NodeState::Free);
        let mut gate = FullHoldGate::new(trigger("0 8 * * *"), trigger("0 18 * * *"), true);

        run_gated_cycle(&mut controller, &mut gate, &mut link).await;
        assert_eq!(link.acquired(), vec![2]);

        // Both triggers are due, the undeploy one was planned later
        assert!(gate.fire_due(&local("2024-03-01 18:30")));
        run_gated_cycle(&mut controller, &mut gate, &mut link).await;
        assert_eq!(link.released(), vec!["a"]);
        assert_eq!(
            controller.status(gate.describe()).last_decision,
            Some(ScaleDecision::Release(1))
        );
    }

    #[tokio::test]
    async fn periodic_cycle_acquires_minimum() {
        let link = MockLink::default();
        let controller = seeded(
            PolicyBuilder::default()
                .refresh_period(Duration::from_millis(20))
                .min_nodes(1),
            &[],
        );
        let (tx, rx) = make_rpc_queue();
        let process = policy_process(
            controller,
            Box::new(AlwaysOnGate),
            Box::new(link.clone()) as Box<dyn NodeSourceLink>,
            rx,
        );

        let (set, handle) = run_concurrent(process, async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let (token, rx) = ResponseToken::new();
            tx.send(PolicyMessage::GetStatus(token)).unwrap();
            let status = rx.await.unwrap();
            assert!(status.cycles >= 1);
            assert_eq!(status.counters.pending_add, 1);
            tx.send(PolicyMessage::Shutdown).unwrap();
        })
        .await;
        set.run_until(handle).await.unwrap();
        assert_eq!(link.acquired(), vec![1]);
    }
}
