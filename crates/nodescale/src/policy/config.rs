use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::common::error::invalid_config;
use crate::common::timeutils::serde_duration;

/// How many times is the connection to the scheduler attempted during activation.
pub const DEFAULT_CONNECT_TRIALS: u32 = 5;
/// Fixed delay between two connection attempts.
pub const DEFAULT_CONNECT_BACKOFF: Duration = Duration::from_secs(5);

pub fn get_connect_trials() -> u32 {
    std::env::var("NODESCALE_CONNECT_TRIALS")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(DEFAULT_CONNECT_TRIALS)
}

pub fn get_connect_backoff() -> Duration {
    get_duration_from_env("NODESCALE_CONNECT_BACKOFF_MS").unwrap_or(DEFAULT_CONNECT_BACKOFF)
}

fn get_duration_from_env(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Where does the cycle read the current workload from.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum WorkloadSource {
    /// Ask the scheduler for running and queued work in every cycle.
    #[default]
    Query,
    /// Use the demand accumulated from job and task events.
    Events,
}

fn default_refresh_period() -> Duration {
    Duration::from_secs(1)
}

fn default_max_nodes() -> u32 {
    10
}

fn default_load_factor() -> u32 {
    10
}

fn default_window_size() -> u32 {
    5
}

/// Raw, unvalidated policy parameters, as they are written in a configuration file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PolicyParams {
    #[serde(with = "serde_duration", default = "default_refresh_period")]
    pub refresh_period: Duration,
    #[serde(default)]
    pub min_nodes: u32,
    #[serde(default = "default_max_nodes")]
    pub max_nodes: u32,
    /// How many tasks can a single node handle.
    #[serde(default = "default_load_factor")]
    pub load_factor: u32,
    /// Number of workload samples that are averaged.
    #[serde(default = "default_window_size")]
    pub window_size: u32,
    #[serde(with = "serde_duration", default)]
    pub release_delay: Duration,
    #[serde(with = "serde_duration", default)]
    pub release_threshold: Duration,
    #[serde(default)]
    pub preemptive_release: bool,
    #[serde(default)]
    pub workload_source: WorkloadSource,
}

impl Default for PolicyParams {
    fn default() -> Self {
        Self {
            refresh_period: default_refresh_period(),
            min_nodes: 0,
            max_nodes: default_max_nodes(),
            load_factor: default_load_factor(),
            window_size: default_window_size(),
            release_delay: Duration::ZERO,
            release_threshold: Duration::ZERO,
            preemptive_release: false,
            workload_source: WorkloadSource::default(),
        }
    }
}

/// Recurring interval after which the cost of a running node resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingWindow {
    pub delay: Duration,
    pub threshold: Duration,
}

impl BillingWindow {
    /// Time left until the current billing period of a node acquired `elapsed` ago ends.
    pub fn remaining(&self, elapsed: Duration) -> Duration {
        let delay = self.delay.as_nanos();
        if delay == 0 {
            return Duration::ZERO;
        }
        let into_period = elapsed.as_nanos() % delay;
        Duration::from_nanos(u64::try_from(delay - into_period).unwrap_or(u64::MAX))
    }

    pub fn is_releasable(&self, elapsed: Duration) -> bool {
        self.remaining(elapsed) <= self.threshold
    }
}

/// Validated policy configuration. It does not change after the policy is activated.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyConfig {
    refresh_period: Duration,
    min_nodes: u32,
    max_nodes: u32,
    load_factor: u32,
    window_size: u32,
    billing: Option<BillingWindow>,
    preemptive_release: bool,
    workload_source: WorkloadSource,
}

impl PolicyConfig {
    pub fn refresh_period(&self) -> Duration {
        self.refresh_period
    }
    pub fn min_nodes(&self) -> u32 {
        self.min_nodes
    }
    pub fn max_nodes(&self) -> u32 {
        self.max_nodes
    }
    pub fn load_factor(&self) -> u32 {
        self.load_factor
    }
    pub fn window_size(&self) -> u32 {
        self.window_size
    }
    /// Returns `None` when nodes can be released at any time.
    pub fn billing_window(&self) -> Option<BillingWindow> {
        self.billing
    }
    pub fn preemptive_release(&self) -> bool {
        self.preemptive_release
    }
    pub fn workload_source(&self) -> WorkloadSource {
        self.workload_source
    }

    /// Short human-readable overview of the parameters.
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "[Min nodes: {} Max nodes: {} Tasks per node: {} Window: {} Refresh period: {}",
            self.min_nodes,
            self.max_nodes,
            self.load_factor,
            self.window_size,
            humantime::format_duration(self.refresh_period)
        );
        if let Some(billing) = self.billing {
            summary.push_str(&format!(
                " Release delay: {} Release threshold: {}",
                humantime::format_duration(billing.delay),
                humantime::format_duration(billing.threshold)
            ));
        }
        if self.preemptive_release {
            summary.push_str(" Preemptive");
        }
        summary.push(']');
        summary
    }
}

impl TryFrom<PolicyParams> for PolicyConfig {
    type Error = crate::Error;

    fn try_from(params: PolicyParams) -> crate::Result<Self> {
        let PolicyParams {
            refresh_period,
            min_nodes,
            max_nodes,
            load_factor,
            window_size,
            release_delay,
            release_threshold,
            preemptive_release,
            workload_source,
        } = params;

        if refresh_period.is_zero() {
            return invalid_config("refresh period has to be positive");
        }
        if min_nodes > max_nodes {
            return invalid_config(format!(
                "minimum number of nodes ({min_nodes}) cannot be larger than the maximum ({max_nodes})"
            ));
        }
        if load_factor == 0 {
            return invalid_config("load factor has to be positive");
        }
        if window_size == 0 {
            return invalid_config("window size has to be at least 1");
        }
        let billing = if release_delay.is_zero() {
            None
        } else {
            if release_threshold > release_delay {
                return invalid_config(format!(
                    "release threshold ({}) cannot exceed the release delay ({})",
                    humantime::format_duration(release_threshold),
                    humantime::format_duration(release_delay)
                ));
            }
            Some(BillingWindow {
                delay: release_delay,
                threshold: release_threshold,
            })
        };

        Ok(Self {
            refresh_period,
            min_nodes,
            max_nodes,
            load_factor,
            window_size,
            billing,
            preemptive_release,
            workload_source,
        })
    }
}

fn default_true() -> bool {
    true
}

/// Schedule-driven override of the normal cycle.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum GateParams {
    #[default]
    Always,
    TimeWindow {
        /// Cron expression that allows acquiring nodes.
        allow: String,
        /// Cron expression that forbids acquiring nodes and empties the pool.
        forbid: String,
        #[serde(default = "default_true")]
        start_allowed: bool,
    },
    FullHold {
        /// Cron expression that fills the pool up to its maximum.
        deploy: String,
        /// Cron expression that releases the whole pool and resumes the normal cycle.
        undeploy: String,
        #[serde(default)]
        acquire_now: bool,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LinkParams {
    #[serde(default = "get_connect_trials")]
    pub connect_trials: u32,
    #[serde(with = "serde_duration", default = "get_connect_backoff")]
    pub connect_backoff: Duration,
}

impl Default for LinkParams {
    fn default() -> Self {
        Self {
            connect_trials: get_connect_trials(),
            connect_backoff: get_connect_backoff(),
        }
    }
}

/// Complete configuration file of a policy.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ScalerConfig {
    #[serde(default)]
    pub policy: PolicyParams,
    #[serde(default)]
    pub gate: GateParams,
    #[serde(default)]
    pub link: LinkParams,
}

impl ScalerConfig {
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> crate::Result<Self> {
        let config: ScalerConfig = toml::from_str(content)?;
        if config.link.connect_trials == 0 {
            return invalid_config("at least one connection attempt is required");
        }
        Ok(config)
    }
}
