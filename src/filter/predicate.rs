use super::criterion::{FilterCriterion, FilterOperator};
use super::range::RangeCheck;
use crate::core::{Record, Result, normalize_key};
use serde_json::Value as JsonValue;
use std::collections::HashSet;

#[derive(Debug, Clone)]
enum Check {
    Equals(String),
    NotEquals(String),
    Range(RangeCheck),
    Contains(String),
    OneOf(HashSet<String>),
    Nothing,
}

#[derive(Debug, Clone)]
struct Compiled {
    fields: Vec<String>,
    check: Check,
}

impl Compiled {
    fn matches(&self, record: &Record) -> bool {
        let mut values = self.fields.iter().flat_map(|field| record.values_at(field));
        match &self.check {
            Check::Equals(expected) => values.any(|v| normalize_key(v).as_ref() == Some(expected)),
            Check::NotEquals(excluded) => !values.any(|v| normalize_key(v).as_ref() == Some(excluded)),
            Check::Range(range) => values.any(|v| range.contains(v)),
            Check::Contains(needle) => values.any(|v| text_of(v).is_some_and(|t| t.contains(needle.as_str()))),
            Check::OneOf(accepted) => values.any(|v| normalize_key(v).is_some_and(|k| accepted.contains(&k))),
            Check::Nothing => false,
        }
    }
}

fn text_of(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.to_lowercase()),
        JsonValue::Number(_) | JsonValue::Bool(_) => normalize_key(value),
        _ => None,
    }
}

/// Conjunction of compiled criteria.
///
/// Criteria that disable themselves (empty equality value, blank search,
/// unbounded range) are dropped at build time, so an empty predicate is the
/// identity.
#[derive(Debug, Clone, Default)]
pub struct Predicate {
    checks: Vec<Compiled>,
}

impl Predicate {
    /// Matches everything.
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn is_identity(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.checks.iter().all(|check| check.matches(record))
    }

    /// Records that satisfy the predicate, order preserved.
    pub fn apply(&self, records: &[Record]) -> Vec<Record> {
        records.iter().filter(|r| self.matches(r)).cloned().collect()
    }

    /// Closure form for iterator adaptors.
    pub fn into_fn(self) -> impl Fn(&Record) -> bool {
        move |record| self.matches(record)
    }
}

/// Compiles criteria into a single predicate.
///
/// Fails only on range bounds that are neither numbers nor dates.
pub fn build_predicate(criteria: &[FilterCriterion]) -> Result<Predicate> {
    let mut checks = Vec::with_capacity(criteria.len());
    for criterion in criteria {
        if criterion.fields.is_empty() {
            continue;
        }
        let check = match &criterion.operator {
            FilterOperator::Equals { value } => match normalize_key(value) {
                Some(key) => Check::Equals(key),
                None => continue,
            },
            FilterOperator::NotEquals { value } => match normalize_key(value) {
                Some(key) => Check::NotEquals(key),
                None => continue,
            },
            FilterOperator::Range { min, max } => {
                let range = RangeCheck::compile(min.as_ref(), max.as_ref())?;
                if range.is_unbounded() {
                    continue;
                }
                Check::Range(range)
            }
            FilterOperator::Contains { needle } => {
                let needle = needle.trim().to_lowercase();
                if needle.is_empty() {
                    continue;
                }
                Check::Contains(needle)
            }
            FilterOperator::OneOf { values } => {
                let accepted: HashSet<String> = values.iter().filter_map(normalize_key).collect();
                if accepted.is_empty() {
                    Check::Nothing
                } else {
                    Check::OneOf(accepted)
                }
            }
        };
        checks.push(Compiled {
            fields: criterion.fields.clone(),
            check,
        });
    }
    Ok(Predicate { checks })
}

/// One-shot filter.
pub fn filter_records(records: &[Record], criteria: &[FilterCriterion]) -> Result<Vec<Record>> {
    Ok(build_predicate(criteria)?.apply(records))
}
