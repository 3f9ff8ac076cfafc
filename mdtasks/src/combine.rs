//! Overlay extracted clock times onto calendar dates.
//!
//! Inference rules:
//! 1. A start date with no start time and no due date takes a due-context time.
//! 2. A due date without its own time borrows the scheduled time, and a scheduled
//!    date borrows the due time.
//! 3. The end of a range lands on the start date, or else the first of
//!    due/scheduled/completed, one day later when the range crosses midnight.
//!
//! A role without any applicable time stays unset.

use crate::core::{
    EnhancedDates, MetaField, MetaValue, TaskMetadata, TimeComponent, TimeComponents,
    local_datetime_from_millis,
};
use crate::dates::parse_strict;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

/// A calendar date as stored in metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateInput {
    Millis(i64),
    Text(String),
}

impl DateInput {
    /// The day, and the time of day if the input carries one.
    pub fn resolve(&self) -> Option<(NaiveDate, Option<NaiveTime>)> {
        match self {
            DateInput::Millis(ms) => {
                let dt = local_datetime_from_millis(*ms)?;
                let time = dt.time();
                let explicit = (time != NaiveTime::MIN).then_some(time);
                Some((dt.date(), explicit))
            }
            DateInput::Text(s) => parse_strict(s),
        }
    }

    fn from_value(value: &MetaValue) -> Option<Self> {
        match value {
            MetaValue::Timestamp(ms) => Some(DateInput::Millis(*ms)),
            MetaValue::Text(s) => Some(DateInput::Text(s.clone())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DateInputs {
    pub start: Option<DateInput>,
    pub due: Option<DateInput>,
    pub scheduled: Option<DateInput>,
    pub completed: Option<DateInput>,
}

impl DateInputs {
    pub fn from_metadata(meta: &TaskMetadata) -> Self {
        let pick = |f: MetaField| meta.get(&f).and_then(DateInput::from_value);
        Self {
            start: pick(MetaField::StartDate),
            due: pick(MetaField::DueDate),
            scheduled: pick(MetaField::ScheduledDate),
            completed: pick(MetaField::CompletedDate),
        }
    }
}

fn time_of(c: &Option<TimeComponent>) -> Option<NaiveTime> {
    c.as_ref().and_then(TimeComponent::to_naive_time)
}

pub fn combine(dates: &DateInputs, times: &TimeComponents) -> EnhancedDates {
    let resolve = |d: &Option<DateInput>| d.as_ref().and_then(DateInput::resolve);
    let start = resolve(&dates.start);
    let due = resolve(&dates.due);
    let scheduled = resolve(&dates.scheduled);
    let completed = resolve(&dates.completed);

    let start_time = time_of(&times.start_time);
    let due_time = time_of(&times.due_time);
    let scheduled_time = time_of(&times.scheduled_time);

    let mut out = EnhancedDates::default();

    if let Some((day, own)) = start {
        let borrowed = if start_time.is_none() && own.is_none() && due.is_none() {
            due_time
        } else {
            None
        };
        out.start_date_time = start_time.or(own).or(borrowed).map(|t| day.and_time(t));
    }
    if let Some((day, own)) = due {
        out.due_date_time = due_time
            .or(own)
            .or(scheduled_time)
            .map(|t| day.and_time(t));
    }
    if let Some((day, own)) = scheduled {
        out.scheduled_date_time = scheduled_time
            .or(own)
            .or(due_time)
            .map(|t| day.and_time(t));
    }
    if let Some((day, own)) = completed {
        out.completed_date_time = own.map(|t| day.and_time(t));
    }

    if let Some(end) = &times.end_time {
        let base = start.or(due).or(scheduled).or(completed).map(|(day, _)| day);
        if let (Some(day), Some(t)) = (base, end.to_naive_time()) {
            let mut dt: NaiveDateTime = day.and_time(t);
            if end.ends_after_midnight() {
                dt += Duration::days(1);
            }
            out.end_date_time = Some(dt);
        }
    }

    out
}
