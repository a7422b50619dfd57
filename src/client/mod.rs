//! Resource Client
//!
//! Typed access to the flat resource store: one trait, [`ResourceStore`],
//! and two implementations: [`HttpResourceClient`] over the REST protocol,
//! [`InMemoryStore`] for tests and for backing the mock server.

pub mod config;
pub mod http;
pub mod memory;

pub use config::ClientConfig;
pub use http::HttpResourceClient;
pub use memory::InMemoryStore;

use crate::core::{DashboardError, Record, RecordKey, Result, loose_eq};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// How an update replaces the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UpdateMode {
    /// PATCH: merge the payload into the stored record.
    #[default]
    Partial,
    /// PUT: replace the stored record (the id is kept).
    Full,
}

impl UpdateMode {
    pub fn http_method(&self) -> &'static str {
        match self {
            Self::Partial => "PATCH",
            Self::Full => "PUT",
        }
    }
}

/// Flat collection store addressed by resource name.
///
/// Calls are independent of each other: nothing is batched or ordered
/// implicitly, callers sequence writes when order matters.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// `GET /{name}`. Never returns a partially parsed body.
    async fn fetch_collection(&self, name: &str) -> Result<Vec<Record>>;

    /// `GET /{name}?field=value&...` with loose equality on every pair.
    async fn fetch_where(&self, name: &str, filters: &[(String, String)]) -> Result<Vec<Record>> {
        let records = self.fetch_collection(name).await?;
        Ok(records
            .into_iter()
            .filter(|record| matches_query(record, filters))
            .collect())
    }

    /// `GET /{name}/{id}`; `NotFound` when the store has no such record.
    async fn fetch_one(&self, name: &str, id: &RecordKey) -> Result<Record>;

    /// `POST /{name}`
    async fn create(&self, name: &str, payload: Record) -> Result<Record>;

    /// `PATCH` or `PUT /{name}/{id}`
    async fn update(&self, name: &str, id: &RecordKey, payload: Record, mode: UpdateMode) -> Result<Record>;

    /// `DELETE /{name}/{id}`; deleting an absent record succeeds.
    async fn remove(&self, name: &str, id: &RecordKey) -> Result<()>;
}

/// Shared handle every manager holds.
pub type SharedStore = Arc<dyn ResourceStore>;

/// Query-string equality as json-server applies it.
pub fn matches_query(record: &Record, filters: &[(String, String)]) -> bool {
    filters.iter().all(|(field, expected)| {
        let expected = JsonValue::String(expected.clone());
        record
            .values_at(field)
            .into_iter()
            .any(|value| loose_eq(value, &expected))
    })
}

/// Validates collection names before they reach a URL or a store map.
pub fn validate_collection_name(name: &str) -> Result<()> {
    let Some(first) = name.chars().next() else {
        return Err(DashboardError::InvalidInput(
            "Collection name cannot be empty".to_string(),
        ));
    };

    // Must start with letter or underscore
    if !first.is_alphabetic() && first != '_' {
        return Err(DashboardError::InvalidInput(format!(
            "Collection name '{name}' must start with a letter or underscore"
        )));
    }

    if !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(DashboardError::InvalidInput(format!(
            "Collection name '{name}' can only contain letters, numbers, and underscores"
        )));
    }

    if name.len() > 64 {
        return Err(DashboardError::InvalidInput(
            "Collection name too long (max 64 characters)".to_string(),
        ));
    }

    Ok(())
}
