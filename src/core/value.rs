//! Loose identifier semantics.
//!
//! Source collections mix `"3"` and `3` for the same identifier, so every
//! key comparison in the crate goes through [`normalize_key`]: strings are
//! trimmed, integral numbers print without a fractional part, and anything
//! that is not a scalar has no key at all.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::fmt;

/// String-normalized form of an identifier or foreign-key value.
pub fn normalize_key(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                n.as_f64().map(|f| {
                    if f.fract() == 0.0 && f.abs() < 9.0e15 {
                        format!("{}", f as i64)
                    } else {
                        f.to_string()
                    }
                })
            }
        }
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Null | JsonValue::Array(_) | JsonValue::Object(_) => None,
    }
}

/// `"3" == 3`, but `null` never equals anything.
pub fn loose_eq(left: &JsonValue, right: &JsonValue) -> bool {
    match (normalize_key(left), normalize_key(right)) {
        (Some(l), Some(r)) => l == r,
        _ => false,
    }
}

/// Identifier of a record, compared loosely.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey(String);

impl RecordKey {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        Self(raw.trim().to_string())
    }

    pub fn from_value(value: &JsonValue) -> Option<Self> {
        normalize_key(value).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, value: &JsonValue) -> bool {
        normalize_key(value).is_some_and(|k| k == self.0)
    }

    /// Wire form used when writing foreign keys back to the store.
    pub fn to_value(&self) -> JsonValue {
        JsonValue::String(self.0.clone())
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RecordKey {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<i64> for RecordKey {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl From<u64> for RecordKey {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl From<i32> for RecordKey {
    fn from(value: i32) -> Self {
        Self(value.to_string())
    }
}

impl Serialize for RecordKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RecordKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = JsonValue::deserialize(deserializer)?;
        RecordKey::from_value(&value)
            .ok_or_else(|| serde::de::Error::custom("record key must be a non-empty scalar"))
    }
}

/// Splits a dotted field path (`student.user.nom`) into its segments.
pub fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').filter(|s| !s.is_empty())
}

/// Every value reachable at `path`, flattening arrays met along the way.
///
/// `links.id_classe` on `{ links: [{id_classe: 1}, {id_classe: 2}] }`
/// yields `[1, 2]`. Missing segments and `null` yield nothing.
pub fn lookup_path<'a>(root: &'a JsonValue, path: &str) -> Vec<&'a JsonValue> {
    let mut current: Vec<&JsonValue> = vec![root];
    for segment in path_segments(path) {
        let mut next = Vec::new();
        for value in current {
            collect_segment(value, segment, &mut next);
        }
        if next.is_empty() {
            return next;
        }
        current = next;
    }
    let mut out = Vec::with_capacity(current.len());
    for value in current {
        match value {
            JsonValue::Array(items) => out.extend(items.iter().filter(|v| !v.is_null())),
            JsonValue::Null => {}
            other => out.push(other),
        }
    }
    out
}

/// [`lookup_path`] rooted at an object's fields.
pub fn lookup_in_map<'a>(map: &'a JsonMap<String, JsonValue>, path: &str) -> Vec<&'a JsonValue> {
    let mut segments = path_segments(path);
    let Some(head) = segments.next() else {
        return Vec::new();
    };
    let Some(first) = map.get(head) else {
        return Vec::new();
    };
    let rest: Vec<&str> = segments.collect();
    if rest.is_empty() {
        return match first {
            JsonValue::Null => Vec::new(),
            JsonValue::Array(items) => items.iter().filter(|v| !v.is_null()).collect(),
            other => vec![other],
        };
    }
    lookup_path(first, &rest.join("."))
}

fn collect_segment<'a>(value: &'a JsonValue, segment: &str, out: &mut Vec<&'a JsonValue>) {
    match value {
        JsonValue::Object(map) => {
            if let Some(child) = map.get(segment) {
                if !child.is_null() {
                    out.push(child);
                }
            }
        }
        JsonValue::Array(items) => {
            for item in items {
                collect_segment(item, segment, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_and_string_ids_normalize_identically() {
        assert_eq!(normalize_key(&json!(3)), Some("3".to_string()));
        assert_eq!(normalize_key(&json!("3")), Some("3".to_string()));
        assert_eq!(normalize_key(&json!(3.0)), Some("3".to_string()));
        assert_eq!(normalize_key(&json!(" 3 ")), Some("3".to_string()));
        assert!(loose_eq(&json!(3), &json!("3")));
        assert!(!loose_eq(&json!("03"), &json!(3)));
    }

    #[test]
    fn null_and_empty_have_no_key() {
        assert_eq!(normalize_key(&json!(null)), None);
        assert_eq!(normalize_key(&json!("")), None);
        assert_eq!(normalize_key(&json!({"id": 1})), None);
        assert!(!loose_eq(&json!(null), &json!(null)));
    }

    #[test]
    fn record_key_deserializes_from_number_or_string() {
        let a: RecordKey = serde_json::from_value(json!(7)).unwrap();
        let b: RecordKey = serde_json::from_value(json!("7")).unwrap();
        assert_eq!(a, b);
        assert!(a.matches(&json!(7)));
        assert!(serde_json::from_value::<RecordKey>(json!(null)).is_err());
    }

    #[test]
    fn lookup_path_flattens_arrays() {
        let doc = json!({
            "links": [{"id_classe": 1}, {"id_classe": "2"}, {"other": 3}],
            "student": {"user": {"nom": "Ndiaye"}},
            "empty": null
        });
        let ids: Vec<_> = lookup_path(&doc, "links.id_classe")
            .into_iter()
            .filter_map(normalize_key)
            .collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(lookup_path(&doc, "student.user.nom"), vec![&json!("Ndiaye")]);
        assert!(lookup_path(&doc, "empty.anything").is_empty());
        assert!(lookup_path(&doc, "missing").is_empty());
    }
}
