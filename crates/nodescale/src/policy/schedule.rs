//! Cron expressions driving the schedule gates.
//!
//! Supported syntax is the classic five-field one (`minute hour day-of-month month day-of-week`)
//! with `*`, lists, ranges and steps, plus the `@hourly`, `@daily`, `@midnight`, `@weekly`,
//! `@monthly`, `@yearly` and `@annually` shortcuts.
use std::fmt::{Display, Formatter};

use anyhow::{anyhow, bail};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Timelike};
use nom::branch::alt;
use nom::character::complete::char;
use nom::combinator::{map, opt};
use nom::multi::separated_list1;
use nom::sequence::{pair, preceded};
use nom_supreme::ParserExt;

use crate::common::error::ScaleError;
use crate::common::parser::{NomResult, consume_all, p_u32};

/// How far into the future is a matching minute searched for.
const MAX_LOOKAHEAD_DAYS: i64 = 366 * 8;

/// Set of allowed values of a single field, stored as a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldSet(u64);

impl FieldSet {
    fn contains(&self, value: u32) -> bool {
        value < 64 && self.0 & (1 << value) != 0
    }
}

struct FieldBounds {
    name: &'static str,
    min: u32,
    max: u32,
}

const MINUTES: FieldBounds = FieldBounds {
    name: "minute",
    min: 0,
    max: 59,
};
const HOURS: FieldBounds = FieldBounds {
    name: "hour",
    min: 0,
    max: 23,
};
const DAYS_OF_MONTH: FieldBounds = FieldBounds {
    name: "day of month",
    min: 1,
    max: 31,
};
const MONTHS: FieldBounds = FieldBounds {
    name: "month",
    min: 1,
    max: 12,
};
// Both 0 and 7 denote Sunday
const DAYS_OF_WEEK: FieldBounds = FieldBounds {
    name: "day of week",
    min: 0,
    max: 7,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldBase {
    Any,
    Single(u32),
    Range(u32, u32),
}

type FieldItem = (FieldBase, Option<u32>);

fn p_field_base(input: &str) -> NomResult<FieldBase> {
    alt((
        map(char('*'), |_| FieldBase::Any),
        map(
            pair(p_u32, opt(preceded(char('-'), p_u32.context("range end")))),
            |(start, end)| match end {
                Some(end) => FieldBase::Range(start, end),
                None => FieldBase::Single(start),
            },
        ),
    ))(input)
}

fn p_field_item(input: &str) -> NomResult<FieldItem> {
    pair(
        p_field_base.context("value, range or `*`"),
        opt(preceded(char('/'), p_u32.context("step"))),
    )(input)
}

fn p_field(input: &str) -> NomResult<Vec<FieldItem>> {
    separated_list1(char(','), p_field_item)(input)
}

fn expand_field(items: &[FieldItem], bounds: &FieldBounds) -> anyhow::Result<FieldSet> {
    let mut mask = 0u64;
    for &(base, step) in items {
        let (start, end) = match base {
            FieldBase::Any => (bounds.min, bounds.max),
            // `5/15` means "from 5 to the end with step 15"
            FieldBase::Single(value) if step.is_some() => (value, bounds.max),
            FieldBase::Single(value) => (value, value),
            FieldBase::Range(start, end) => (start, end),
        };
        if start < bounds.min || end > bounds.max {
            bail!(
                "{} has to be between {} and {}",
                bounds.name,
                bounds.min,
                bounds.max
            );
        }
        if start > end {
            bail!("invalid {} range {start}-{end}", bounds.name);
        }
        let step = step.unwrap_or(1);
        if step == 0 {
            bail!("{} step cannot be zero", bounds.name);
        }
        for value in (start..=end).step_by(step as usize) {
            mask |= 1 << value;
        }
    }
    Ok(FieldSet(mask))
}

fn parse_field(text: &str, bounds: &FieldBounds) -> anyhow::Result<FieldSet> {
    let items = consume_all(p_field, text)
        .map_err(|error| anyhow!("invalid {} field `{text}`: {error}", bounds.name))?;
    expand_field(&items, bounds)
}

fn expand_shortcut(expression: &str) -> Option<&'static str> {
    let expanded = match expression {
        "@hourly" => "0 * * * *",
        "@daily" | "@midnight" => "0 0 * * *",
        "@weekly" => "0 0 * * 0",
        "@monthly" => "0 0 1 * *",
        "@yearly" | "@annually" => "0 0 1 1 *",
        _ => return None,
    };
    Some(expanded)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    minutes: FieldSet,
    hours: FieldSet,
    days_of_month: FieldSet,
    months: FieldSet,
    days_of_week: FieldSet,
    /// When both day fields are restricted, a day matches if either of them matches.
    day_of_month_restricted: bool,
    day_of_week_restricted: bool,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> crate::Result<Self> {
        Self::parse_inner(expression.trim())
            .map_err(|error| ScaleError::ScheduleError(format!("`{expression}`: {error}")))
    }

    fn parse_inner(expression: &str) -> anyhow::Result<Self> {
        let fields_text = if expression.starts_with('@') {
            expand_shortcut(expression).ok_or_else(|| anyhow!("unknown shortcut"))?
        } else {
            expression
        };
        let fields: Vec<&str> = fields_text.split_whitespace().collect();
        let [minute, hour, day_of_month, month, day_of_week] = fields.as_slice() else {
            bail!("expected 5 fields, found {}", fields.len());
        };

        let mut days_of_week = parse_field(day_of_week, &DAYS_OF_WEEK)?;
        if days_of_week.contains(7) {
            days_of_week.0 = (days_of_week.0 & !(1 << 7)) | 1;
        }
        Ok(Self {
            expression: expression.to_string(),
            minutes: parse_field(minute, &MINUTES)?,
            hours: parse_field(hour, &HOURS)?,
            days_of_month: parse_field(day_of_month, &DAYS_OF_MONTH)?,
            months: parse_field(month, &MONTHS)?,
            days_of_week,
            day_of_month_restricted: !day_of_month.starts_with('*'),
            day_of_week_restricted: !day_of_week.starts_with('*'),
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let day_of_month = self.days_of_month.contains(date.day());
        let day_of_week = self
            .days_of_week
            .contains(date.weekday().num_days_from_sunday());
        match (self.day_of_month_restricted, self.day_of_week_restricted) {
            (true, true) => day_of_month || day_of_week,
            (true, false) => day_of_month,
            (false, true) => day_of_week,
            (false, false) => true,
        }
    }

    /// First matching minute strictly after `after`, in local (naive) time.
    pub fn next_after(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        let limit = after + TimeDelta::days(MAX_LOOKAHEAD_DAYS);
        let mut time = after
            .date()
            .and_hms_opt(after.hour(), after.minute(), 0)?
            + TimeDelta::minutes(1);

        while time <= limit {
            if !self.months.contains(time.month()) {
                time = first_day_of_next_month(time.date())?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !self.day_matches(time.date()) {
                time = time.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !self.hours.contains(time.hour()) {
                time = time.date().and_hms_opt(time.hour(), 0, 0)? + TimeDelta::hours(1);
                continue;
            }
            if !self.minutes.contains(time.minute()) {
                time += TimeDelta::minutes(1);
                continue;
            }
            return Some(time);
        }
        None
    }

    /// Next fire time in the time zone of `after`.
    /// Local times skipped by a daylight saving change are skipped by the schedule as well.
    pub fn next_fire<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let mut naive = after.naive_local();
        loop {
            naive = self.next_after(naive)?;
            if let Some(time) = after.timezone().from_local_datetime(&naive).earliest() {
                if time > *after {
                    return Some(time);
                }
            }
        }
    }
}

impl Display for CronSchedule {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.expression)
    }
}

fn first_day_of_next_month(date: NaiveDate) -> Option<NaiveDate> {
    if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)
    }
}
