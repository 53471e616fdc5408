use crate::client::commands::policy::{DecisionReport, PolicyCheck};
use crate::client::commands::schedule::FireTimes;
use crate::client::output::cli::CliOutput;
use crate::client::output::json::JsonOutput;

pub mod cli;
pub mod json;

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputMode {
    Cli,
    Json,
}

pub trait Output {
    fn print_policy_check(&self, check: &PolicyCheck);
    fn print_fire_times(&self, fires: &FireTimes);
    fn print_decision(&self, report: &DecisionReport);

    fn print_error(&self, error: anyhow::Error);
}

pub fn create_output(mode: OutputMode) -> Box<dyn Output> {
    match mode {
        OutputMode::Cli => Box::new(CliOutput),
        OutputMode::Json => Box::new(JsonOutput),
    }
}
