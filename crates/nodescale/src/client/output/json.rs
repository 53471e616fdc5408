use serde::Serialize;

use crate::client::commands::policy::{DecisionReport, PolicyCheck};
use crate::client::commands::schedule::FireTimes;
use crate::client::output::Output;

pub struct JsonOutput;

impl JsonOutput {
    fn print<T: Serialize>(&self, data: &T) {
        match serde_json::to_string_pretty(data) {
            Ok(json) => println!("{json}"),
            Err(error) => log::error!("Cannot serialize output: {error:?}"),
        }
    }
}

impl Output for JsonOutput {
    fn print_policy_check(&self, check: &PolicyCheck) {
        self.print(check);
    }

    fn print_fire_times(&self, fires: &FireTimes) {
        self.print(fires);
    }

    fn print_decision(&self, report: &DecisionReport) {
        self.print(report);
    }

    fn print_error(&self, error: anyhow::Error) {
        self.print(&serde_json::json!({
            "error": format!("{error:?}"),
        }));
    }
}
