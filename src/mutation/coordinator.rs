use super::request::{MutationKey, MutationOperation, MutationRequest};
use crate::client::{SharedStore, UpdateMode};
use crate::core::{DashboardError, ErrorKind, FieldErrors, Record, Result};
use crate::view::Refresh;
use futures::future::join_all;
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{Instrument, Level, event, info_span};

/// A failed mutation, with the request attached so the caller can retry it.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{request} failed: {source}")]
pub struct MutationError {
    pub request: MutationRequest,
    #[source]
    pub source: DashboardError,
}

impl MutationError {
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self.source, DashboardError::Conflict(_))
    }
}

impl From<MutationError> for DashboardError {
    fn from(err: MutationError) -> Self {
        err.source
    }
}

/// A view that could not be refreshed after a successful write.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshError {
    pub view: String,
    pub error: DashboardError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MutationOutcome {
    pub request: MutationRequest,
    /// Stored record as returned by the store; `None` for deletes.
    pub record: Option<Record>,
    pub refresh_errors: Vec<RefreshError>,
}

// ============================================================================
// IN-FLIGHT GUARD
// ============================================================================

type InFlight = Arc<Mutex<HashSet<MutationKey>>>;

/// Holds a key in the in-flight set until dropped, including when the
/// owning future is cancelled.
struct InFlightGuard {
    in_flight: InFlight,
    key: MutationKey,
}

impl InFlightGuard {
    fn acquire(in_flight: &InFlight, key: MutationKey) -> Result<Self> {
        let mut keys = in_flight.lock()?;
        if !keys.insert(key.clone()) {
            return Err(DashboardError::Conflict(key.to_string()));
        }
        Ok(Self {
            in_flight: Arc::clone(in_flight),
            key,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut keys) = self.in_flight.lock() {
            keys.remove(&self.key);
        }
    }
}

// ============================================================================
// COORDINATOR
// ============================================================================

/// Sends mutations to the store with at most one in flight per key, then
/// refreshes the registered views.
///
/// The key is released once the writes complete, before views refresh.
/// Failures are never retried.
#[derive(Clone)]
pub struct MutationCoordinator {
    store: SharedStore,
    in_flight: InFlight,
    views: Vec<Arc<dyn Refresh>>,
}

impl MutationCoordinator {
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            views: Vec::new(),
        }
    }

    /// Registers a view to reload after every successful mutation.
    pub fn refreshing(mut self, view: Arc<dyn Refresh>) -> Self {
        self.views.push(view);
        self
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn is_in_flight(&self, key: &MutationKey) -> bool {
        self.in_flight
            .lock()
            .map(|keys| keys.contains(key))
            .unwrap_or(false)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().map(|keys| keys.len()).unwrap_or(0)
    }

    pub async fn submit(
        &self,
        request: MutationRequest,
    ) -> std::result::Result<MutationOutcome, MutationError> {
        self.submit_then(request, |record| async move { Ok(record) })
            .await
    }

    /// Runs `then` on the stored record before the key is released and
    /// before views refresh, for writes that span several collections.
    ///
    /// A failing follow-up fails the whole mutation; earlier writes are not
    /// rolled back.
    pub async fn submit_then<F, Fut>(
        &self,
        request: MutationRequest,
        then: F,
    ) -> std::result::Result<MutationOutcome, MutationError>
    where
        F: FnOnce(Option<Record>) -> Fut + Send,
        Fut: Future<Output = Result<Option<Record>>> + Send,
    {
        let span = info_span!(
            "mutation",
            request_id = %request.request_id,
            key = %request.key()
        );
        async move {
            let guard = match InFlightGuard::acquire(&self.in_flight, request.key()) {
                Ok(guard) => guard,
                Err(source) => {
                    event!(Level::INFO, "mutation rejected: already in flight");
                    return Err(MutationError { request, source });
                }
            };

            let written = match self.execute(&request).await {
                Ok(record) => then(record).await,
                Err(err) => Err(err),
            };
            drop(guard);

            let record = match written {
                Ok(record) => record,
                Err(source) => {
                    event!(Level::WARN, error = %source, "mutation failed");
                    return Err(MutationError { request, source });
                }
            };
            event!(Level::DEBUG, "mutation stored");

            let refresh_errors = self.refresh_views().await;
            Ok(MutationOutcome {
                request,
                record,
                refresh_errors,
            })
        }
        .instrument(span)
        .await
    }

    /// Forwards validation errors without touching the store.
    pub async fn submit_validated(
        &self,
        request: MutationRequest,
        errors: FieldErrors,
    ) -> std::result::Result<MutationOutcome, MutationError> {
        if !errors.is_empty() {
            return Err(MutationError {
                request,
                source: DashboardError::Validation(errors),
            });
        }
        self.submit(request).await
    }

    /// Generic status change: archive, restore, validate, reject, accept, refuse.
    pub async fn status_transition(
        &self,
        collection: &str,
        id: impl Into<crate::core::RecordKey>,
        field: &str,
        status: &str,
        extra: Record,
    ) -> std::result::Result<MutationOutcome, MutationError> {
        self.submit(MutationRequest::status_transition(collection, id, field, status, extra))
            .await
    }

    async fn execute(&self, request: &MutationRequest) -> Result<Option<Record>> {
        let collection = request.collection.as_str();
        let require_id = || {
            request.entity_id.as_ref().ok_or_else(|| {
                DashboardError::InvalidInput(format!("{} needs an entity id", request.key()))
            })
        };

        match &request.operation {
            MutationOperation::Create => self
                .store
                .create(collection, request.body())
                .await
                .map(Some),
            MutationOperation::Update(mode) => self
                .store
                .update(collection, require_id()?, request.body(), *mode)
                .await
                .map(Some),
            MutationOperation::StatusTransition { .. } => self
                .store
                .update(collection, require_id()?, request.body(), UpdateMode::Partial)
                .await
                .map(Some),
            MutationOperation::Delete => {
                self.store.remove(collection, require_id()?).await?;
                Ok(None)
            }
        }
    }

    async fn refresh_views(&self) -> Vec<RefreshError> {
        let results = join_all(self.views.iter().map(|view| view.refresh())).await;
        self.views
            .iter()
            .zip(results)
            .filter_map(|(view, result)| {
                result.err().map(|error| {
                    event!(Level::WARN, view = view.name(), error = %error, "refresh after mutation failed");
                    RefreshError {
                        view: view.name().to_string(),
                        error,
                    }
                })
            })
            .collect()
    }
}
