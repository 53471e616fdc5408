use chrono::{DateTime, Local, TimeZone};
use clap::Parser;
use serde::Serialize;

use crate::client::output::Output;
use crate::policy::schedule::CronSchedule;

#[derive(Parser)]
pub struct CronOpts {
    /// Five-field cron expression (e.g. `"0 8 * * 1-5"`) or a shortcut (e.g. `@daily`)
    pub expression: String,

    /// How many fire times should be printed
    #[arg(long, default_value_t = 5)]
    pub count: u32,
}

#[derive(Serialize, Debug)]
pub struct FireTimes {
    pub expression: String,
    pub times: Vec<DateTime<Local>>,
}

/// Computes up to `count` consecutive fire times of `schedule` after `from`.
pub fn next_fire_times<Tz: TimeZone>(
    schedule: &CronSchedule,
    from: &DateTime<Tz>,
    count: u32,
) -> Vec<DateTime<Tz>> {
    let mut times = Vec::new();
    let mut current = from.clone();
    for _ in 0..count {
        match schedule.next_fire(&current) {
            Some(next) => {
                current = next.clone();
                times.push(next);
            }
            None => break,
        }
    }
    times
}

pub fn command_cron(output: &dyn Output, opts: CronOpts) -> anyhow::Result<()> {
    let schedule = CronSchedule::parse(&opts.expression)?;
    let times = next_fire_times(&schedule, &Local::now(), opts.count);
    output.print_fire_times(&FireTimes {
        expression: schedule.expression().to_string(),
        times,
    });
    Ok(())
}
