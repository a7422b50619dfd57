use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Comparison applied by a [`FilterCriterion`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operator", rename_all = "snake_case")]
pub enum FilterOperator {
    /// Loose equality. An empty value disables the criterion.
    Equals { value: JsonValue },
    /// Loose inequality; a missing field is not equal. An empty value disables the criterion.
    NotEquals { value: JsonValue },
    /// Inclusive number or date bounds, either one optional.
    Range {
        #[serde(default)]
        min: Option<JsonValue>,
        #[serde(default)]
        max: Option<JsonValue>,
    },
    /// Case-insensitive substring. A blank needle disables the criterion.
    Contains { needle: String },
    /// Loose membership. An empty set matches nothing.
    OneOf { values: Vec<JsonValue> },
}

/// One named filter. Every criterion of a set must hold.
///
/// A criterion names one or more fields (dotted paths allowed); it holds when
/// any value found under any of them satisfies the operator, except for
/// `NotEquals` which requires that none does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCriterion {
    pub fields: Vec<String>,
    #[serde(flatten)]
    pub operator: FilterOperator,
}

impl FilterCriterion {
    pub fn new(field: &str, operator: FilterOperator) -> Self {
        Self {
            fields: vec![field.to_string()],
            operator,
        }
    }

    pub fn equals(field: &str, value: impl Into<JsonValue>) -> Self {
        Self::new(field, FilterOperator::Equals { value: value.into() })
    }

    pub fn not_equals(field: &str, value: impl Into<JsonValue>) -> Self {
        Self::new(field, FilterOperator::NotEquals { value: value.into() })
    }

    pub fn range(field: &str, min: Option<JsonValue>, max: Option<JsonValue>) -> Self {
        Self::new(field, FilterOperator::Range { min, max })
    }

    pub fn between(field: &str, min: impl Into<JsonValue>, max: impl Into<JsonValue>) -> Self {
        Self::range(field, Some(min.into()), Some(max.into()))
    }

    pub fn contains(field: &str, needle: &str) -> Self {
        Self::new(
            field,
            FilterOperator::Contains {
                needle: needle.to_string(),
            },
        )
    }

    /// Search box over several fields.
    pub fn search<I, S>(fields: I, needle: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            operator: FilterOperator::Contains {
                needle: needle.to_string(),
            },
        }
    }

    pub fn one_of<I, V>(field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<JsonValue>,
    {
        Self::new(
            field,
            FilterOperator::OneOf {
                values: values.into_iter().map(Into::into).collect(),
            },
        )
    }

    /// `Some(value)` becomes `equals`, `None` disables the filter.
    pub fn equals_opt<V: Into<JsonValue>>(field: &str, value: Option<V>) -> Self {
        Self::equals(field, value.map(Into::into).unwrap_or(JsonValue::Null))
    }
}
