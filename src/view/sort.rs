// ============================================================================
// src/view/sort.rs - Multi-key record sorting
// ============================================================================
//
// - Multi-key sorting, stable (equal records keep their fetched order)
// - NULLS LAST for ascending keys, NULLS FIRST for descending keys
// - Numbers and numeric strings compare numerically, text case-insensitively
//
// ============================================================================

use crate::core::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;

// ============================================================================
// NULL HANDLING
// ============================================================================

/// Where missing or `null` values go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullOrdering {
    NullsFirst,
    NullsLast,
}

impl NullOrdering {
    /// ASC → NULLS LAST, DESC → NULLS FIRST
    pub fn default_for_direction(descending: bool) -> Self {
        if descending {
            Self::NullsFirst
        } else {
            Self::NullsLast
        }
    }
}

// ============================================================================
// SORT KEY
// ============================================================================

/// One sort key: a field path and a direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    #[serde(default)]
    pub descending: bool,
    pub null_ordering: NullOrdering,
}

impl SortKey {
    pub fn new(field: &str, descending: bool) -> Self {
        Self {
            field: field.to_string(),
            descending,
            null_ordering: NullOrdering::default_for_direction(descending),
        }
    }

    pub fn asc(field: &str) -> Self {
        Self::new(field, false)
    }

    pub fn desc(field: &str) -> Self {
        Self::new(field, true)
    }

    pub fn with_null_ordering(mut self, null_ordering: NullOrdering) -> Self {
        self.null_ordering = null_ordering;
        self
    }
}

// ============================================================================
// COMPARATOR
// ============================================================================

/// Compares records key by key; the first non-equal key decides.
pub struct RecordComparator<'a> {
    keys: &'a [SortKey],
}

impl<'a> RecordComparator<'a> {
    pub fn new(keys: &'a [SortKey]) -> Self {
        Self { keys }
    }

    pub fn compare(&self, left: &Record, right: &Record) -> Ordering {
        for key in self.keys {
            let ordering = compare_by_key(left, right, key);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

fn compare_by_key(left: &Record, right: &Record, key: &SortKey) -> Ordering {
    let l = left.get_path(&key.field);
    let r = right.get_path(&key.field);

    // Null placement is absolute; direction only flips present values.
    match (l, r) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => match key.null_ordering {
            NullOrdering::NullsFirst => Ordering::Less,
            NullOrdering::NullsLast => Ordering::Greater,
        },
        (Some(_), None) => match key.null_ordering {
            NullOrdering::NullsFirst => Ordering::Greater,
            NullOrdering::NullsLast => Ordering::Less,
        },
        (Some(l), Some(r)) => {
            let ordering = compare_values(l, r);
            if key.descending {
                ordering.reverse()
            } else {
                ordering
            }
        }
    }
}

#[derive(PartialEq, PartialOrd)]
enum SortValue {
    Bool(bool),
    Number(f64),
    Text(String, String),
    Other(String),
}

fn sort_value(value: &JsonValue) -> SortValue {
    match value {
        JsonValue::Bool(b) => SortValue::Bool(*b),
        JsonValue::Number(n) => SortValue::Number(n.as_f64().unwrap_or(f64::NAN)),
        JsonValue::String(s) => match s.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => SortValue::Number(n),
            _ => SortValue::Text(s.to_lowercase(), s.clone()),
        },
        other => SortValue::Other(other.to_string()),
    }
}

/// Total order over JSON scalars: booleans, numbers, text, then the rest.
pub fn compare_values(left: &JsonValue, right: &JsonValue) -> Ordering {
    sort_value(left)
        .partial_cmp(&sort_value(right))
        .unwrap_or(Ordering::Equal)
}

// ============================================================================
// SORTING
// ============================================================================

/// Stable in-place sort by `keys`; no keys leaves the order untouched.
pub fn sort_records(records: &mut [Record], keys: &[SortKey]) {
    if keys.is_empty() {
        return;
    }
    let comparator = RecordComparator::new(keys);
    records.sort_by(|a, b| comparator.compare(a, b));
}
