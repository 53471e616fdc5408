use std::fmt::Write;

use chrono::{DateTime, Local};
use itertools::Itertools;

use crate::client::commands::policy::{DecisionReport, PolicyCheck};
use crate::client::commands::schedule::FireTimes;
use crate::client::output::Output;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M %:z";

pub struct CliOutput;

impl Output for CliOutput {
    fn print_policy_check(&self, check: &PolicyCheck) {
        println!("{}", format_policy_check(check));
    }

    fn print_fire_times(&self, fires: &FireTimes) {
        println!("{}", format_fire_times(fires));
    }

    fn print_decision(&self, report: &DecisionReport) {
        println!("{}", format_decision(report));
    }

    fn print_error(&self, error: anyhow::Error) {
        eprintln!("{error:?}");
    }
}

fn format_time(time: Option<&DateTime<Local>>) -> String {
    match time {
        Some(time) => time.format(TIME_FORMAT).to_string(),
        None => "never".to_string(),
    }
}

fn format_policy_check(check: &PolicyCheck) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "Configuration is valid");
    let _ = writeln!(output, "Policy: {}", check.description);
    let _ = writeln!(output, "Parameters: {}", check.summary);
    let _ = writeln!(output, "Gate: {}", check.gate);
    let _ = writeln!(output, "Next gate trigger: {}", format_time(check.next_trigger.as_ref()));
    let _ = write!(
        output,
        "Connection: {} attempt(s), {} apart",
        check.connect_trials,
        humantime::format_duration(check.connect_backoff)
    );
    output
}

fn format_fire_times(fires: &FireTimes) -> String {
    if fires.times.is_empty() {
        return format!("`{}` never fires", fires.expression);
    }
    format!(
        "Next fire times of `{}`:\n{}",
        fires.expression,
        fires
            .times
            .iter()
            .map(|time| time.format(TIME_FORMAT))
            .join("\n")
    )
}

fn format_decision(report: &DecisionReport) -> String {
    format!(
        "Load {} needs {} node(s); in source: {}, alive: {}; decision: {}",
        report.load, report.required, report.in_source, report.alive, report.decision
    )
}
