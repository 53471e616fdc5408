use chrono::{DateTime, Local};

use crate::policy::config::GateParams;
use crate::policy::schedule::CronSchedule;

/// What should happen in the next cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateVerdict {
    /// Run the normal control cycle.
    Run,
    /// Release every node of the pool, regardless of the minimum.
    ReleaseAll,
    /// Acquire nodes until the pool reaches its maximum.
    FillToMax,
}

/// Schedule-driven override of the control cycle.
pub trait ScaleGate {
    /// Earliest time at which one of the gate triggers fires.
    fn next_trigger(&self) -> Option<DateTime<Local>>;

    /// Fires every trigger that is due at `now`. Returns `true` if any trigger fired.
    fn fire_due(&mut self, now: &DateTime<Local>) -> bool;

    /// Decides about the next cycle. Called once at the start of each cycle.
    fn verdict(&mut self) -> GateVerdict;

    fn describe(&self) -> String;
}

pub fn create_gate(params: &GateParams, now: &DateTime<Local>) -> crate::Result<Box<dyn ScaleGate>> {
    let gate: Box<dyn ScaleGate> = match params {
        GateParams::Always => Box::new(AlwaysOnGate),
        GateParams::TimeWindow {
            allow,
            forbid,
            start_allowed,
        } => Box::new(TimeWindowGate::new(
            Trigger::new(CronSchedule::parse(allow)?, now),
            Trigger::new(CronSchedule::parse(forbid)?, now),
            *start_allowed,
        )),
        GateParams::FullHold {
            deploy,
            undeploy,
            acquire_now,
        } => Box::new(FullHoldGate::new(
            Trigger::new(CronSchedule::parse(deploy)?, now),
            Trigger::new(CronSchedule::parse(undeploy)?, now),
            *acquire_now,
        )),
    };
    Ok(gate)
}

/// A cron schedule together with its next fire time.
pub struct Trigger {
    schedule: CronSchedule,
    next: Option<DateTime<Local>>,
}

impl Trigger {
    pub fn new(schedule: CronSchedule, now: &DateTime<Local>) -> Self {
        let next = schedule.next_fire(now);
        if next.is_none() {
            log::warn!("Schedule `{schedule}` will never fire");
        }
        Self { schedule, next }
    }

    pub fn next(&self) -> Option<DateTime<Local>> {
        self.next
    }

    /// If the trigger is due, re-arms it and returns `true`.
    fn fire_if_due(&mut self, now: &DateTime<Local>) -> bool {
        match self.next {
            Some(next) if next <= *now => {
                log::debug!("Schedule `{}` fired (planned at {next})", self.schedule);
                self.next = self.schedule.next_fire(now);
                true
            }
            _ => false,
        }
    }
}

fn earliest(a: Option<DateTime<Local>>, b: Option<DateTime<Local>>) -> Option<DateTime<Local>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn format_next(trigger: &Trigger) -> String {
    match trigger.next() {
        Some(time) => time.format("%Y-%m-%d %H:%M").to_string(),
        None => "never".to_string(),
    }
}

pub struct AlwaysOnGate;

impl ScaleGate for AlwaysOnGate {
    fn next_trigger(&self) -> Option<DateTime<Local>> {
        None
    }

    fn fire_due(&mut self, _now: &DateTime<Local>) -> bool {
        false
    }

    fn verdict(&mut self) -> GateVerdict {
        GateVerdict::Run
    }

    fn describe(&self) -> String {
        "always on".to_string()
    }
}

/// Allows acquiring nodes only within time windows. Outside of them the pool is emptied.
pub struct TimeWindowGate {
    allow: Trigger,
    forbid: Trigger,
    acquisition_allowed: bool,
}

impl TimeWindowGate {
    pub fn new(allow: Trigger, forbid: Trigger, start_allowed: bool) -> Self {
        Self {
            allow,
            forbid,
            acquisition_allowed: start_allowed,
        }
    }

    pub fn acquisition_allowed(&self) -> bool {
        self.acquisition_allowed
    }
}

impl ScaleGate for TimeWindowGate {
    fn next_trigger(&self) -> Option<DateTime<Local>> {
        earliest(self.allow.next(), self.forbid.next())
    }

    fn fire_due(&mut self, now: &DateTime<Local>) -> bool {
        // When both triggers are due, the one planned later wins
        let allow_at = self.allow.next();
        let forbid_at = self.forbid.next();
        let allowed = self.allow.fire_if_due(now);
        let forbidden = self.forbid.fire_if_due(now);
        match (allowed, forbidden) {
            (true, true) => self.acquisition_allowed = allow_at > forbid_at,
            (true, false) => self.acquisition_allowed = true,
            (false, true) => self.acquisition_allowed = false,
            (false, false) => return false,
        }
        log::info!(
            "Node acquisition is now {}",
            if self.acquisition_allowed {
                "allowed"
            } else {
                "forbidden"
            }
        );
        true
    }

    fn verdict(&mut self) -> GateVerdict {
        if self.acquisition_allowed {
            GateVerdict::Run
        } else {
            GateVerdict::ReleaseAll
        }
    }

    fn describe(&self) -> String {
        format!(
            "time window (acquisition {}, next allow: {}, next forbid: {})",
            if self.acquisition_allowed {
                "allowed"
            } else {
                "forbidden"
            },
            format_next(&self.allow),
            format_next(&self.forbid)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldMode {
    Normal,
    /// The pool is kept at its maximum size.
    Holding,
    /// The pool will be emptied in the next cycle.
    Draining,
}

/// Keeps the pool at full capacity between the deploy and undeploy triggers.
pub struct FullHoldGate {
    deploy: Trigger,
    undeploy: Trigger,
    mode: HoldMode,
}

impl FullHoldGate {
    pub fn new(deploy: Trigger, undeploy: Trigger, acquire_now: bool) -> Self {
        Self {
            deploy,
            undeploy,
            mode: if acquire_now {
                HoldMode::Holding
            } else {
                HoldMode::Normal
            },
        }
    }

    pub fn mode(&self) -> HoldMode {
        self.mode
    }
}

impl ScaleGate for FullHoldGate {
    fn next_trigger(&self) -> Option<DateTime<Local>> {
        earliest(self.deploy.next(), self.undeploy.next())
    }

    fn fire_due(&mut self, now: &DateTime<Local>) -> bool {
        let deploy_at = self.deploy.next();
        let undeploy_at = self.undeploy.next();
        let deployed = self.deploy.fire_if_due(now);
        let undeployed = self.undeploy.fire_if_due(now);
        self.mode = match (deployed, undeployed) {
            (true, true) if deploy_at > undeploy_at => HoldMode::Holding,
            (true, true) => HoldMode::Draining,
            (true, false) => HoldMode::Holding,
            (false, true) => HoldMode::Draining,
            (false, false) => return false,
        };
        log::info!("Full hold gate switched to {:?}", self.mode);
        true
    }

    fn verdict(&mut self) -> GateVerdict {
        match self.mode {
            HoldMode::Normal => GateVerdict::Run,
            HoldMode::Holding => GateVerdict::FillToMax,
            HoldMode::Draining => {
                self.mode = HoldMode::Normal;
                GateVerdict::ReleaseAll
            }
        }
    }

    fn describe(&self) -> String {
        format!(
            "full hold ({:?}, next deploy: {}, next undeploy: {})",
            self.mode,
            format_next(&self.deploy),
            format_next(&self.undeploy)
        )
    }
}
