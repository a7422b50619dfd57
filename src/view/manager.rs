use super::projector::{SubscriptionId, ViewProjector};
use super::state::{ViewOptions, ViewState, project};
use crate::core::{DenormalizedRecord, Record, Result};
use crate::filter::{FilterCriterion, build_predicate};
use crate::join::{JoinOutcome, JoinResolver, RelationDescriptor, RelationError};
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{Instrument, Level, event, info_span};

/// Computed fields added to each record after joining.
pub type DeriveFn = Arc<dyn Fn(&mut Record) + Send + Sync>;

/// What a view shows: a base collection, its relations, and the criteria
/// that always apply (typically ownership by the current actor).
#[derive(Clone)]
pub struct ViewSource {
    pub collection: String,
    pub relations: Vec<RelationDescriptor>,
    /// Equality filters sent to the store with the base fetch.
    pub base_filters: Vec<(String, String)>,
    /// Criteria ANDed with every query.
    pub scope: Vec<FilterCriterion>,
    pub derive: Option<DeriveFn>,
}

impl ViewSource {
    pub fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            relations: Vec::new(),
            base_filters: Vec::new(),
            scope: Vec::new(),
            derive: None,
        }
    }

    pub fn relation(mut self, relation: RelationDescriptor) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn relations(mut self, relations: impl IntoIterator<Item = RelationDescriptor>) -> Self {
        self.relations.extend(relations);
        self
    }

    pub fn base_filter(mut self, field: &str, value: impl ToString) -> Self {
        self.base_filters.push((field.to_string(), value.to_string()));
        self
    }

    pub fn scope(mut self, criterion: FilterCriterion) -> Self {
        self.scope.push(criterion);
        self
    }

    pub fn derive<F>(mut self, derive: F) -> Self
    where
        F: Fn(&mut Record) + Send + Sync + 'static,
    {
        self.derive = Some(Arc::new(derive));
        self
    }
}

impl fmt::Debug for ViewSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewSource")
            .field("collection", &self.collection)
            .field("relations", &self.relations)
            .field("base_filters", &self.base_filters)
            .field("scope", &self.scope)
            .field("derive", &self.derive.is_some())
            .finish()
    }
}

/// User-controlled part of a view: criteria plus pagination.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewQuery {
    pub criteria: Vec<FilterCriterion>,
    pub options: ViewOptions,
}

impl ViewQuery {
    pub fn new(criteria: Vec<FilterCriterion>, options: ViewOptions) -> Self {
        Self { criteria, options }
    }

    pub fn criterion(mut self, criterion: FilterCriterion) -> Self {
        self.criteria.push(criterion);
        self
    }

    pub fn options(mut self, options: ViewOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Applied {
        state: ViewState,
        relation_errors: Vec<RelationError>,
    },
    /// A newer request was issued while this one was in flight; nothing changed.
    Superseded,
}

impl LoadOutcome {
    pub fn state(&self) -> Option<&ViewState> {
        match self {
            Self::Applied { state, .. } => Some(state),
            Self::Superseded => None,
        }
    }

    pub fn is_superseded(&self) -> bool {
        matches!(self, Self::Superseded)
    }
}

#[derive(Default)]
struct Retained {
    records: Option<Vec<DenormalizedRecord>>,
    query: ViewQuery,
    relation_errors: Vec<RelationError>,
}

/// One page-level view: fetch, join, filter, project, publish.
///
/// Every request takes a ticket from a monotonic sequence; a result is only
/// applied if no newer ticket was issued meanwhile (last request wins).
/// Failed loads leave the published state untouched.
pub struct ViewManager {
    name: String,
    resolver: JoinResolver,
    source: ViewSource,
    projector: ViewProjector,
    retained: Mutex<Retained>,
    sequence: AtomicU64,
}

impl ViewManager {
    pub fn new(name: &str, resolver: JoinResolver, source: ViewSource) -> Self {
        Self {
            name: name.to_string(),
            resolver,
            source,
            projector: ViewProjector::new(),
            retained: Mutex::new(Retained::default()),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &ViewSource {
        &self.source
    }

    pub fn current(&self) -> Option<ViewState> {
        self.projector.current()
    }

    pub fn query(&self) -> ViewQuery {
        self.retained
            .lock()
            .map(|r| r.query.clone())
            .unwrap_or_default()
    }

    /// Joined records behind the current state, before filtering.
    pub fn records(&self) -> Vec<DenormalizedRecord> {
        self.retained
            .lock()
            .ok()
            .and_then(|r| r.records.clone())
            .unwrap_or_default()
    }

    pub fn relation_errors(&self) -> Vec<RelationError> {
        self.retained
            .lock()
            .map(|r| r.relation_errors.clone())
            .unwrap_or_default()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&ViewState) + Send + Sync + 'static,
    {
        self.projector.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.projector.unsubscribe(id)
    }

    fn ticket(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_latest(&self, ticket: u64) -> bool {
        self.sequence.load(Ordering::SeqCst) == ticket
    }

    /// Fetches, joins and projects `query`.
    ///
    /// Errors from a request that has been superseded are dropped as well.
    pub async fn load(&self, query: ViewQuery) -> Result<LoadOutcome> {
        let ticket = self.ticket();
        let predicate = {
            let mut criteria = self.source.scope.clone();
            criteria.extend(query.criteria.iter().cloned());
            build_predicate(&criteria)?
        };

        let span = info_span!("view.load", view = %self.name, ticket);
        let fetched = async {
            if self.source.base_filters.is_empty() {
                self.resolver
                    .load(&self.source.collection, &self.source.relations)
                    .await
            } else {
                self.resolver
                    .load_where(
                        &self.source.collection,
                        &self.source.base_filters,
                        &self.source.relations,
                    )
                    .await
            }
        }
        .instrument(span)
        .await;

        if !self.is_latest(ticket) {
            event!(Level::DEBUG, view = %self.name, ticket, "superseded load discarded");
            return Ok(LoadOutcome::Superseded);
        }

        let JoinOutcome {
            mut records,
            errors,
        } = fetched?;
        if let Some(derive) = &self.source.derive {
            records.iter_mut().for_each(|record| derive(record));
        }
        let visible: Vec<DenormalizedRecord> =
            records.iter().filter(|r| predicate.matches(r)).cloned().collect();
        let state = project(visible, &query.options);

        {
            let mut retained = self.retained.lock()?;
            if !self.is_latest(ticket) {
                return Ok(LoadOutcome::Superseded);
            }
            retained.records = Some(records);
            retained.query = query;
            retained.relation_errors = errors.clone();
        }

        self.projector.publish(ticket, state.clone());
        event!(
            Level::DEBUG,
            view = %self.name,
            total = state.total_count,
            page = state.page,
            "view state applied"
        );
        Ok(LoadOutcome::Applied {
            state,
            relation_errors: errors,
        })
    }

    /// Re-runs the current query against fresh data.
    pub async fn reload(&self) -> Result<LoadOutcome> {
        self.load(self.query()).await
    }

    /// New criteria, back to page 1.
    pub async fn set_criteria(&self, criteria: Vec<FilterCriterion>) -> Result<LoadOutcome> {
        let mut query = self.query();
        query.criteria = criteria;
        query.options.page = 1;
        self.load(query).await
    }

    /// Re-projects the retained records on another page without fetching.
    ///
    /// Falls back to a full load when nothing was loaded yet.
    pub async fn go_to_page(&self, page: usize) -> Result<LoadOutcome> {
        let (records, mut query) = {
            let retained = self.retained.lock()?;
            (retained.records.clone(), retained.query.clone())
        };
        query.options.page = page;

        let Some(records) = records else {
            return self.load(query).await;
        };

        let ticket = self.ticket();
        let mut criteria = self.source.scope.clone();
        criteria.extend(query.criteria.iter().cloned());
        let predicate = build_predicate(&criteria)?;
        let visible: Vec<DenormalizedRecord> =
            records.into_iter().filter(|r| predicate.matches(r)).collect();
        let state = project(visible, &query.options);

        let relation_errors = {
            let mut retained = self.retained.lock()?;
            if !self.is_latest(ticket) {
                return Ok(LoadOutcome::Superseded);
            }
            retained.query = query;
            retained.relation_errors.clone()
        };
        self.projector.publish(ticket, state.clone());
        Ok(LoadOutcome::Applied {
            state,
            relation_errors,
        })
    }
}

impl fmt::Debug for ViewManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewManager")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("sequence", &self.sequence.load(Ordering::SeqCst))
            .finish()
    }
}

/// Something that can be brought back in sync with the store.
#[async_trait]
pub trait Refresh: Send + Sync {
    fn name(&self) -> &str;

    async fn refresh(&self) -> Result<()>;
}

#[async_trait]
impl Refresh for ViewManager {
    fn name(&self) -> &str {
        &self.name
    }

    async fn refresh(&self) -> Result<()> {
        self.reload().await.map(|_| ())
    }
}
