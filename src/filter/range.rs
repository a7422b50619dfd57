use crate::core::{DashboardError, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;

/// A value a range can compare against.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub enum Comparable {
    Number(f64),
    Moment(NaiveDateTime),
}

const DATE_TIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"];

/// Parses a date or date-time; the flag tells whether it was a bare date.
pub fn parse_moment(raw: &str) -> Option<(NaiveDateTime, bool)> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some((date.and_time(NaiveTime::MIN), true));
    }
    if let Ok(moment) = DateTime::parse_from_rfc3339(raw) {
        return Some((moment.naive_utc(), false));
    }
    DATE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|moment| (moment, false))
}

fn as_number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

/// Range bound compiled once per predicate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bound {
    value: Comparable,
}

impl Bound {
    /// `None` for an absent or blank bound.
    ///
    /// A bare-date upper bound is widened to the end of that day.
    pub fn parse(raw: Option<&JsonValue>, upper: bool) -> Result<Option<Self>> {
        let Some(raw) = raw else {
            return Ok(None);
        };
        match raw {
            JsonValue::Null => Ok(None),
            JsonValue::String(s) if s.trim().is_empty() => Ok(None),
            JsonValue::Number(_) => Ok(as_number(raw).map(|n| Self {
                value: Comparable::Number(n),
            })),
            JsonValue::String(s) => {
                if let Some((moment, date_only)) = parse_moment(s) {
                    let moment = if upper && date_only {
                        moment + Duration::days(1) - Duration::nanoseconds(1)
                    } else {
                        moment
                    };
                    return Ok(Some(Self {
                        value: Comparable::Moment(moment),
                    }));
                }
                as_number(raw)
                    .map(|n| {
                        Some(Self {
                            value: Comparable::Number(n),
                        })
                    })
                    .ok_or_else(|| {
                        DashboardError::InvalidInput(format!(
                            "range bound '{s}' is neither a number nor a date"
                        ))
                    })
            }
            other => Err(DashboardError::InvalidInput(format!(
                "range bound must be a number or a date, got {other}"
            ))),
        }
    }

    /// Orders a record value against this bound, if it is of the same kind.
    pub fn compare(&self, value: &JsonValue) -> Option<Ordering> {
        let coerced = match self.value {
            Comparable::Number(_) => as_number(value).map(Comparable::Number),
            Comparable::Moment(_) => value
                .as_str()
                .and_then(parse_moment)
                .map(|(moment, _)| Comparable::Moment(moment)),
        }?;
        coerced.partial_cmp(&self.value)
    }
}

/// Inclusive range with optional ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeCheck {
    pub min: Option<Bound>,
    pub max: Option<Bound>,
}

impl RangeCheck {
    pub fn compile(min: Option<&JsonValue>, max: Option<&JsonValue>) -> Result<Self> {
        Ok(Self {
            min: Bound::parse(min, false)?,
            max: Bound::parse(max, true)?,
        })
    }

    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    /// A value of the wrong kind never lies inside a bounded range.
    pub fn contains(&self, value: &JsonValue) -> bool {
        let above_min = match &self.min {
            Some(bound) => matches!(bound.compare(value), Some(Ordering::Greater | Ordering::Equal)),
            None => true,
        };
        let below_max = match &self.max {
            Some(bound) => matches!(bound.compare(value), Some(Ordering::Less | Ordering::Equal)),
            None => true,
        };
        above_min && below_max
    }
}
