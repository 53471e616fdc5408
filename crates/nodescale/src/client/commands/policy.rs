use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Local};
use clap::Parser;
use serde::Serialize;

use crate::client::output::Output;
use crate::common::timeutils::serde_duration;
use crate::policy::config::{PolicyConfig, PolicyParams, ScalerConfig};
use crate::policy::controller::{POLICY_DESCRIPTION, ScaleDecision, decide, required_nodes};
use crate::policy::gate::create_gate;

#[derive(Parser)]
pub struct CheckOpts {
    /// Path to a TOML policy configuration
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,
}

#[derive(Parser)]
pub struct DecideOpts {
    /// Minimal number of nodes of the node source
    #[arg(long, default_value_t = 0)]
    pub min_nodes: u32,

    /// Maximal number of nodes of the node source
    #[arg(long, default_value_t = 10)]
    pub max_nodes: u32,

    /// How many tasks can a single node handle
    #[arg(long, default_value_t = 10)]
    pub load_factor: u32,

    /// Considered workload (number of tasks)
    #[arg(long)]
    pub load: u32,

    /// Estimated number of nodes in the node source
    #[arg(long)]
    pub in_source: u32,

    /// Number of alive nodes. Defaults to the number of nodes in the node source
    #[arg(long)]
    pub alive: Option<u32>,
}

/// Outcome of a configuration check.
#[derive(Serialize, Debug)]
pub struct PolicyCheck {
    pub description: String,
    pub summary: String,
    pub gate: String,
    pub next_trigger: Option<DateTime<Local>>,
    pub connect_trials: u32,
    #[serde(with = "serde_duration")]
    pub connect_backoff: Duration,
}

#[derive(Serialize, Debug)]
pub struct DecisionReport {
    pub load: u32,
    pub required: u32,
    pub in_source: u32,
    pub alive: u32,
    pub decision: ScaleDecision,
}

pub fn check_config(config: ScalerConfig, now: &DateTime<Local>) -> crate::Result<PolicyCheck> {
    let policy = PolicyConfig::try_from(config.policy)?;
    let gate = create_gate(&config.gate, now)?;
    Ok(PolicyCheck {
        description: POLICY_DESCRIPTION.to_string(),
        summary: policy.summary(),
        gate: gate.describe(),
        next_trigger: gate.next_trigger(),
        connect_trials: config.link.connect_trials,
        connect_backoff: config.link.connect_backoff,
    })
}

pub fn command_check(output: &dyn Output, opts: CheckOpts) -> anyhow::Result<()> {
    let config = ScalerConfig::load(&opts.config)?;
    let check = check_config(config, &Local::now())?;
    output.print_policy_check(&check);
    Ok(())
}

pub fn dry_run_decision(opts: &DecideOpts) -> crate::Result<DecisionReport> {
    let config = PolicyConfig::try_from(PolicyParams {
        min_nodes: opts.min_nodes,
        max_nodes: opts.max_nodes,
        load_factor: opts.load_factor,
        ..Default::default()
    })?;
    let alive = opts.alive.unwrap_or(opts.in_source);
    let required = required_nodes(opts.load, config.load_factor());
    Ok(DecisionReport {
        load: opts.load,
        required,
        in_source: opts.in_source,
        alive,
        decision: decide(opts.in_source, alive, required, &config),
    })
}

pub fn command_decide(output: &dyn Output, opts: DecideOpts) -> anyhow::Result<()> {
    let report = dry_run_decision(&opts)?;
    output.print_decision(&report);
    Ok(())
}
