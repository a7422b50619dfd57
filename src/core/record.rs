use super::value::{RecordKey, lookup_in_map};
use super::{DashboardError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

/// A flat record from a named collection.
///
/// After a join pass the same type carries the attached relations, so a
/// denormalized record is still a `Record`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record(JsonMap<String, JsonValue>);

/// Record with relations attached by the join resolver.
pub type DenormalizedRecord = Record;

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: JsonMap<String, JsonValue>) -> Self {
        Self(map)
    }

    /// Accepts only JSON objects.
    pub fn from_value(value: JsonValue) -> Result<Self> {
        match value {
            JsonValue::Object(map) => Ok(Self(map)),
            other => Err(DashboardError::InvalidInput(format!(
                "expected a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    pub fn id(&self) -> Option<RecordKey> {
        self.0.get("id").and_then(RecordKey::from_value)
    }

    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.0.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(JsonValue::as_str)
    }

    /// Foreign key stored in `field`, normalized.
    pub fn key(&self, field: &str) -> Option<RecordKey> {
        self.0.get(field).and_then(RecordKey::from_value)
    }

    /// First non-null value at a dotted path.
    pub fn get_path(&self, path: &str) -> Option<&JsonValue> {
        self.values_at(path).into_iter().next()
    }

    /// Every value at a dotted path, arrays flattened.
    pub fn values_at(&self, path: &str) -> Vec<&JsonValue> {
        lookup_in_map(&self.0, path)
    }

    pub fn contains_key(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<JsonValue>) -> Option<JsonValue> {
        self.0.insert(field.into(), value.into())
    }

    pub fn remove(&mut self, field: &str) -> Option<JsonValue> {
        self.0.remove(field)
    }

    /// Builder-style insert.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.insert(field, value);
        self
    }

    /// Shallow merge, `other` wins on shared fields.
    pub fn merge(&mut self, other: Record) {
        for (k, v) in other.0 {
            self.0.insert(k, v);
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &JsonValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &JsonMap<String, JsonValue> {
        &self.0
    }

    pub fn as_map_mut(&mut self) -> &mut JsonMap<String, JsonValue> {
        &mut self.0
    }

    pub fn into_map(self) -> JsonMap<String, JsonValue> {
        self.0
    }

    pub fn into_value(self) -> JsonValue {
        JsonValue::Object(self.0)
    }
}

impl From<JsonMap<String, JsonValue>> for Record {
    fn from(map: JsonMap<String, JsonValue>) -> Self {
        Self(map)
    }
}

impl From<Record> for JsonValue {
    fn from(record: Record) -> Self {
        record.into_value()
    }
}

impl TryFrom<JsonValue> for Record {
    type Error = DashboardError;

    fn try_from(value: JsonValue) -> Result<Self> {
        Self::from_value(value)
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let map = JsonMap::<String, JsonValue>::deserialize(deserializer)?;
        Ok(Self(map))
    }
}

/// Parses a JSON array of objects into records, failing on the first non-object.
pub fn records_from_value(value: JsonValue) -> Result<Vec<Record>> {
    match value {
        JsonValue::Array(items) => items.into_iter().map(Record::from_value).collect(),
        other => Err(DashboardError::InvalidInput(format!(
            "expected a JSON array of records, got {}",
            json_type_name(&other)
        ))),
    }
}

pub(crate) fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

/// `json!({...})` shorthand for records in tests and fixtures.
#[macro_export]
macro_rules! record {
    ($($tt:tt)+) => {
        $crate::core::Record::from_value(::serde_json::json!($($tt)+))
            .expect("record! literal must be an object")
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn id_is_loosely_typed() {
        let numeric = record!({ "id": 3 });
        let text = record!({ "id": "3" });
        assert_eq!(numeric.id(), text.id());
    }

    #[test]
    fn from_value_rejects_non_objects() {
        assert!(Record::from_value(json!([1, 2])).is_err());
        assert!(records_from_value(json!([{ "id": 1 }, 2])).is_err());
        assert_eq!(records_from_value(json!([{ "id": 1 }])).unwrap().len(), 1);
    }

    #[test]
    fn values_at_traverses_nested_relations() {
        let record = record!({
            "id": 1,
            "student": { "user": { "nom": "Ndiaye" } },
            "classes": [{ "libelle": "L1" }, { "libelle": "L2" }]
        });
        assert_eq!(record.get_path("student.user.nom"), Some(&json!("Ndiaye")));
        assert_eq!(record.values_at("classes.libelle").len(), 2);
        assert_eq!(record.values_at("classes").len(), 2);
        assert!(record.get_path("student.classe").is_none());
    }
}
