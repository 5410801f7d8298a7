//! Input grammar for the conversation steps.
//!
//! ```text
//! dates   := date | date " to " date
//! date    := YYYY "-" MM "-" DD
//! hours   := number | number ("," number)+
//! remarks := any non-blank text
//! ```

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::{
    DateSpan, LeaveHours, LeaveHoursError, MAX_HOURS_PER_DAY, MAX_HOURS_SCALE, MAX_SPAN_DAYS,
};

pub const RANGE_SEPARATOR: &str = " to ";
pub const LIST_SEPARATOR: char = ',';

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("`{input}` is not a calendar date in YYYY-MM-DD format")]
    MalformedDate { input: String },
    #[error("start date {start} is after end date {end}")]
    StartAfterEnd { start: NaiveDate, end: NaiveDate },
    #[error("a request covers at most {max} days but {days} were given", max = MAX_SPAN_DAYS)]
    RangeTooLong { days: usize },
    #[error("expected {expected} hour values (one per day) but got {actual}")]
    HoursCountMismatch { expected: usize, actual: usize },
    #[error("`{token}` is not a number of hours")]
    MalformedHours { token: String },
    #[error("{value} hours is outside the allowed range (0, {max}]", max = MAX_HOURS_PER_DAY)]
    HoursOutOfRange { value: Decimal },
    #[error("remarks must not be empty")]
    EmptyRemarks,
}

impl From<LeaveHoursError> for ValidationError {
    fn from(value: LeaveHoursError) -> Self {
        match value {
            LeaveHoursError::CountMismatch { expected, actual } => {
                Self::HoursCountMismatch { expected, actual }
            }
            LeaveHoursError::OutOfRange { value } => Self::HoursOutOfRange { value },
        }
    }
}

pub fn parse_date_span(input: &str) -> Result<DateSpan, ValidationError> {
    let input = input.trim();
    match input.split_once(RANGE_SEPARATOR) {
        Some((start, end)) => {
            let start = parse_date(start)?;
            let end = parse_date(end)?;
            let span =
                DateSpan::new(start, end).ok_or(ValidationError::StartAfterEnd { start, end })?;
            if span.day_count() > MAX_SPAN_DAYS {
                return Err(ValidationError::RangeTooLong { days: span.day_count() });
            }
            Ok(span)
        }
        None => parse_date(input).map(DateSpan::single),
    }
}

fn parse_date(token: &str) -> Result<NaiveDate, ValidationError> {
    let token = token.trim();
    let malformed = || ValidationError::MalformedDate { input: token.to_owned() };

    let bytes = token.as_bytes();
    let shape_ok = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes.iter().enumerate().all(|(idx, byte)| idx == 4 || idx == 7 || byte.is_ascii_digit());
    if !shape_ok {
        return Err(malformed());
    }

    NaiveDate::parse_from_str(token, "%Y-%m-%d").map_err(|_| malformed())
}

/// Parses the hours reply for `span`. A comma list is applied positionally from
/// the start date; a single number applies to every day. Any bad token fails
/// the whole input.
pub fn parse_hours(span: &DateSpan, input: &str) -> Result<LeaveHours, ValidationError> {
    let input = input.trim();
    if input.contains(LIST_SEPARATOR) {
        let tokens = input.split(LIST_SEPARATOR).collect::<Vec<_>>();
        if tokens.len() != span.day_count() {
            return Err(ValidationError::HoursCountMismatch {
                expected: span.day_count(),
                actual: tokens.len(),
            });
        }
        let values = tokens.into_iter().map(parse_hours_token).collect::<Result<Vec<_>, _>>()?;
        return LeaveHours::per_day(span, &values).map_err(ValidationError::from);
    }

    let value = parse_hours_token(input)?;
    LeaveHours::uniform(span, value).map_err(ValidationError::from)
}

fn parse_hours_token(token: &str) -> Result<Decimal, ValidationError> {
    let token = token.trim();
    let malformed = || ValidationError::MalformedHours { token: token.to_owned() };
    // Decimal rounds past its precision, so overlong fractions never reach the range check.
    if token.split_once('.').is_some_and(|(_, fraction)| fraction.len() > MAX_HOURS_SCALE) {
        return Err(malformed());
    }
    let value = Decimal::from_str(token).map_err(|_| malformed())?;
    if value <= Decimal::ZERO || value > MAX_HOURS_PER_DAY {
        return Err(ValidationError::HoursOutOfRange { value });
    }
    Ok(value)
}

pub fn parse_remarks(input: &str) -> Result<String, ValidationError> {
    let remarks = input.trim();
    if remarks.is_empty() {
        return Err(ValidationError::EmptyRemarks);
    }
    Ok(remarks.to_owned())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::{parse_date_span, parse_hours, parse_remarks, ValidationError};
    use crate::domain::DateSpan;

    fn feb(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, day).expect("valid date")
    }

    #[test]
    fn single_date_yields_one_day_span() {
        let span = parse_date_span("2025-02-15").expect("single date");

        assert_eq!(span.start(), feb(15));
        assert_eq!(span.end(), feb(15));
        assert_eq!(span.day_count(), 1);
    }

    #[test]
    fn range_is_inclusive_and_trimmed() {
        let span = parse_date_span("  2025-02-15 to 2025-02-17 ").expect("range");

        assert_eq!(span.start(), feb(15));
        assert_eq!(span.end(), feb(17));
        assert_eq!(span.day_count(), 3);
    }

    #[test]
    fn reversed_range_is_rejected() {
        assert_eq!(
            parse_date_span("2025-02-17 to 2025-02-15"),
            Err(ValidationError::StartAfterEnd { start: feb(17), end: feb(15) })
        );
    }

    #[test]
    fn spans_longer_than_the_cap_are_rejected() {
        let longest = parse_date_span("2025-01-01 to 2025-03-03").expect("62 days");
        assert_eq!(longest.day_count(), 62);

        assert_eq!(
            parse_date_span("2025-01-01 to 2025-03-04"),
            Err(ValidationError::RangeTooLong { days: 63 })
        );
        assert_eq!(
            parse_date_span("0001-01-01 to 9999-12-31"),
            Err(ValidationError::RangeTooLong { days: 3_652_059 })
        );
    }

    #[test]
    fn malformed_dates_are_rejected() {
        for input in ["15/02/2025", "2025-2-15", "2025-02-30", "tomorrow", "2025-02-15 - 2025-02-16"]
        {
            assert!(
                matches!(parse_date_span(input), Err(ValidationError::MalformedDate { .. })),
                "`{input}` should be rejected"
            );
        }
    }

    #[test]
    fn uniform_hours_apply_to_every_day() {
        let span = DateSpan::new(feb(15), feb(19)).expect("span");
        let hours = parse_hours(&span, "4.5").expect("uniform hours");

        assert_eq!(hours.len(), 5);
        assert_eq!(hours.iter().map(|(date, _)| date).collect::<Vec<_>>(), span.dates().collect::<Vec<_>>());
        assert!(hours.iter().all(|(_, value)| value == Decimal::new(45, 1)));
    }

    #[test]
    fn per_day_hours_scenario_totals_twenty() {
        let span = parse_date_span("2025-02-15 to 2025-02-17").expect("span");
        let hours = parse_hours(&span, "8,4,8").expect("per-day hours");

        assert_eq!(hours.get(feb(15)), Some(Decimal::from(8)));
        assert_eq!(hours.get(feb(16)), Some(Decimal::from(4)));
        assert_eq!(hours.get(feb(17)), Some(Decimal::from(8)));
        assert_eq!(hours.total(), Decimal::from(20));
    }

    #[test]
    fn per_day_count_must_match_day_count() {
        let span = parse_date_span("2025-02-15 to 2025-02-17").expect("span");

        assert_eq!(
            parse_hours(&span, "8,4"),
            Err(ValidationError::HoursCountMismatch { expected: 3, actual: 2 })
        );
        assert_eq!(
            parse_hours(&span, "8,4,8,8"),
            Err(ValidationError::HoursCountMismatch { expected: 3, actual: 4 })
        );
    }

    #[test]
    fn out_of_range_hours_fail_on_both_paths() {
        let single = parse_date_span("2025-02-15").expect("span");
        let range = parse_date_span("2025-02-15 to 2025-02-16").expect("span");

        assert_eq!(
            parse_hours(&single, "9"),
            Err(ValidationError::HoursOutOfRange { value: Decimal::from(9) })
        );
        assert_eq!(
            parse_hours(&single, "0"),
            Err(ValidationError::HoursOutOfRange { value: Decimal::ZERO })
        );
        assert!(matches!(
            parse_hours(&range, "8,-1"),
            Err(ValidationError::HoursOutOfRange { .. })
        ));
        assert!(matches!(
            parse_hours(&range, "8.5,4"),
            Err(ValidationError::HoursOutOfRange { .. })
        ));
    }

    #[test]
    fn overlong_fractions_cannot_round_into_range() {
        let single = parse_date_span("2025-02-15").expect("span");
        let range = parse_date_span("2025-02-15 to 2025-02-16").expect("span");

        assert_eq!(
            parse_hours(&single, "8.000000000000000000000000000001"),
            Err(ValidationError::MalformedHours {
                token: "8.000000000000000000000000000001".to_owned()
            })
        );
        assert!(matches!(
            parse_hours(&range, "4,7.999"),
            Err(ValidationError::MalformedHours { .. })
        ));
        assert_eq!(
            parse_hours(&single, "7.75").map(|hours| hours.total()),
            Ok(Decimal::new(775, 2))
        );
    }

    #[test]
    fn one_bad_token_fails_the_whole_list() {
        let span = parse_date_span("2025-02-15 to 2025-02-17").expect("span");

        assert_eq!(
            parse_hours(&span, "8, four ,8"),
            Err(ValidationError::MalformedHours { token: "four".to_owned() })
        );
    }

    #[test]
    fn remarks_require_text() {
        assert_eq!(parse_remarks("   "), Err(ValidationError::EmptyRemarks));
        assert_eq!(parse_remarks(" NIL "), Ok("NIL".to_owned()));
    }
}
