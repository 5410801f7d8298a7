use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Upper bound (inclusive) for the hours booked on a single day.
pub const MAX_HOURS_PER_DAY: Decimal = Decimal::from_parts(8, 0, 0, false, 0);

/// Decimal places accepted for an hours value.
pub const MAX_HOURS_SCALE: usize = 2;

/// Longest leave span, in calendar days, a single request may cover.
pub const MAX_SPAN_DAYS: usize = 62;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub id: UserId,
    pub display_name: String,
    pub handle: Option<String>,
}

impl Requester {
    /// `@handle`, or a placeholder when the chat account has none.
    pub fn handle_label(&self) -> String {
        match self.handle.as_deref().map(str::trim).filter(|handle| !handle.is_empty()) {
            Some(handle) => format!("@{handle}"),
            None => "no handle".to_owned(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approver {
    pub id: UserId,
    pub display_name: String,
}

/// Inclusive calendar range with `start <= end`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateSpan {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateSpan {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn single(date: NaiveDate) -> Self {
        Self { start: date, end: date }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn day_count(&self) -> usize {
        let days = (self.end - self.start).num_days();
        usize::try_from(days).unwrap_or(0) + 1
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        let start = self.start;
        (0..self.day_count()).filter_map(move |offset| {
            u64::try_from(offset).ok().and_then(|offset| start.checked_add_days(Days::new(offset)))
        })
    }
}

impl fmt::Display for DateSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start.format("%Y-%m-%d"), self.end.format("%Y-%m-%d"))
    }
}

/// Hours booked for every date of a [`DateSpan`], and nothing else.
///
/// Only constructed through [`LeaveHours::uniform`] or [`LeaveHours::per_day`],
/// both of which require values in `(0, 8]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveHours {
    by_date: BTreeMap<NaiveDate, Decimal>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LeaveHoursError {
    CountMismatch { expected: usize, actual: usize },
    OutOfRange { value: Decimal },
}

impl LeaveHours {
    pub fn uniform(span: &DateSpan, hours: Decimal) -> Result<Self, LeaveHoursError> {
        ensure_in_range(hours)?;
        let hours = hours.normalize();
        Ok(Self { by_date: span.dates().map(|date| (date, hours)).collect() })
    }

    pub fn per_day(span: &DateSpan, hours: &[Decimal]) -> Result<Self, LeaveHoursError> {
        if hours.len() != span.day_count() {
            return Err(LeaveHoursError::CountMismatch {
                expected: span.day_count(),
                actual: hours.len(),
            });
        }
        for value in hours {
            ensure_in_range(*value)?;
        }

        Ok(Self {
            by_date: span.dates().zip(hours.iter().map(|value| value.normalize())).collect(),
        })
    }

    pub fn get(&self, date: NaiveDate) -> Option<Decimal> {
        self.by_date.get(&date).copied()
    }

    pub fn len(&self) -> usize {
        self.by_date.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_date.is_empty()
    }

    pub fn total(&self) -> Decimal {
        self.by_date.values().copied().sum()
    }

    /// Entries in calendar order.
    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, Decimal)> + '_ {
        self.by_date.iter().map(|(date, hours)| (*date, *hours))
    }

    pub fn values(&self) -> Vec<Decimal> {
        self.by_date.values().copied().collect()
    }
}

fn ensure_in_range(value: Decimal) -> Result<(), LeaveHoursError> {
    if value <= Decimal::ZERO || value > MAX_HOURS_PER_DAY {
        return Err(LeaveHoursError::OutOfRange { value });
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub id: RequestId,
    pub requester: Requester,
    pub span: DateSpan,
    pub hours: LeaveHours,
    pub remarks: String,
    pub submitted_at: DateTime<Utc>,
    pub supervisor_approval: Option<Approver>,
}

impl LeaveRequest {
    pub fn start_date(&self) -> NaiveDate {
        self.span.start()
    }

    pub fn end_date(&self) -> NaiveDate {
        self.span.end()
    }

    pub fn total_hours(&self) -> Decimal {
        self.hours.total()
    }

    pub fn is_supervisor_approved(&self) -> bool {
        self.supervisor_approval.is_some()
    }

    pub fn supervisor_name(&self) -> Option<&str> {
        self.supervisor_approval.as_ref().map(|approver| approver.display_name.as_str())
    }
}
