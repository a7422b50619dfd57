//! Mock json-server: the flat REST store the dashboard talks to.
//!
//! Routes:
//! - `GET /:collection` (query string = equality filters)
//! - `POST /:collection`
//! - `GET /:collection/:id`
//! - `PUT /:collection/:id`
//! - `PATCH /:collection/:id`
//! - `DELETE /:collection/:id`

pub mod persistence;

pub use persistence::DbFile;

use crate::client::{InMemoryStore, UpdateMode};
use crate::core::{Record, RecordKey};
use crate::web::{Result, WebError};
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{Level, event};

#[derive(Clone)]
struct StoreState {
    store: Arc<InMemoryStore>,
    db: Option<Arc<DbFile>>,
}

impl StoreState {
    /// Writes the store back after a mutation, unless running read-only.
    async fn persist(&self) -> Result<()> {
        let Some(db) = self.db.clone() else {
            return Ok(());
        };
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || db.save(&store))
            .await
            .map_err(|e| WebError::Internal(format!("persist task failed: {e}")))??;
        Ok(())
    }
}

/// Router over `store`. With `db`, every successful write is saved to it.
pub fn router(store: Arc<InMemoryStore>, db: Option<Arc<DbFile>>) -> axum::Router {
    let state = StoreState { store, db };
    axum::Router::new()
        .route("/:collection", get(list).post(create))
        .route(
            "/:collection/:id",
            get(fetch)
                .put(replace)
                .patch(patch)
                .delete(remove),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Query parameters starting with `_` are json-server directives and are
/// not treated as filters.
fn filters_from(query: BTreeMap<String, String>) -> Vec<(String, String)> {
    query
        .into_iter()
        .filter(|(field, _)| !field.starts_with('_'))
        .collect()
}

fn body_record(payload: JsonValue) -> Result<Record> {
    Record::from_value(payload)
        .map_err(|_| WebError::Input("request body must be a JSON object".to_string()))
}

async fn list(
    State(state): State<StoreState>,
    Path(collection): Path<String>,
    Query(query): Query<BTreeMap<String, String>>,
) -> Result<Json<JsonValue>> {
    let records = state.store.list(&collection, &filters_from(query))?;
    Ok(Json(JsonValue::Array(
        records.into_iter().map(Record::into_value).collect(),
    )))
}

async fn fetch(
    State(state): State<StoreState>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Json<JsonValue>> {
    let record = state.store.get(&collection, &RecordKey::from(id))?;
    Ok(Json(record.into_value()))
}

async fn create(
    State(state): State<StoreState>,
    Path(collection): Path<String>,
    Json(payload): Json<JsonValue>,
) -> Result<Response> {
    let record = state.store.insert(&collection, body_record(payload)?)?;
    state.persist().await?;
    event!(Level::DEBUG, collection = %collection, "record created");
    Ok((StatusCode::CREATED, Json(record.into_value())).into_response())
}

async fn write(
    state: StoreState,
    collection: String,
    id: String,
    payload: JsonValue,
    mode: UpdateMode,
) -> Result<Json<JsonValue>> {
    let record = state
        .store
        .replace(&collection, &RecordKey::from(id), body_record(payload)?, mode)?;
    state.persist().await?;
    Ok(Json(record.into_value()))
}

async fn replace(
    State(state): State<StoreState>,
    Path((collection, id)): Path<(String, String)>,
    Json(payload): Json<JsonValue>,
) -> Result<Json<JsonValue>> {
    write(state, collection, id, payload, UpdateMode::Full).await
}

async fn patch(
    State(state): State<StoreState>,
    Path((collection, id)): Path<(String, String)>,
    Json(payload): Json<JsonValue>,
) -> Result<Json<JsonValue>> {
    write(state, collection, id, payload, UpdateMode::Partial).await
}

async fn remove(
    State(state): State<StoreState>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<StatusCode> {
    if !state.store.delete(&collection, &RecordKey::from(id.clone()))? {
        return Err(WebError::NotFound(format!(
            "record '{id}' not found in '{collection}'"
        )));
    }
    state.persist().await?;
    Ok(StatusCode::NO_CONTENT)
}
