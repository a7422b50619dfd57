// ============================================================================
// Ecole 221 dashboard engine
// ============================================================================

//! Client-side relational joins and view-state projection over a flat REST
//! resource store.
//!
//! The store only knows collections of flat records. Everything a dashboard
//! page shows (a class with its filière and students, a justification with
//! its absence, course and student) is assembled here:
//!
//! - [`client`]: the [`ResourceStore`] seam and its HTTP and in-memory implementations
//! - [`join`]: batched relation resolution, one fetch per target collection
//! - [`filter`]: criteria compiled into a single predicate
//! - [`view`]: sorting, pagination, subscriptions, last-request-wins loading
//! - [`mutation`]: single-flight writes followed by view refresh
//! - [`domain`]: the school's collections, statuses, forms and role desks
//! - [`server`]: the mock json-server used by the `ecole221-store` binary
//!
//! ```no_run
//! use ecole221::{ClientConfig, DashboardError, HttpResourceClient, ResourceStore};
//!
//! # async fn demo() -> ecole221::Result<()> {
//! let config = ClientConfig::from_url("http://localhost:3000").map_err(DashboardError::InvalidInput)?;
//! let client = HttpResourceClient::new(config)?;
//! let classes = client.fetch_collection("classes").await?;
//! println!("{} classes", classes.len());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod core;
pub mod domain;
pub mod filter;
pub mod join;
pub mod mutation;
pub mod server;
pub mod view;
pub mod web;

pub use client::{ClientConfig, HttpResourceClient, InMemoryStore, ResourceStore, SharedStore, UpdateMode};
pub use core::{DashboardError, DenormalizedRecord, ErrorKind, FieldErrors, Record, RecordKey, Result};
pub use filter::{FilterCriterion, FilterOperator, Predicate, build_predicate};
pub use join::{Cardinality, JoinOutcome, JoinResolver, RelationDescriptor};
pub use mutation::{MutationCoordinator, MutationError, MutationOutcome, MutationRequest};
pub use view::{LoadOutcome, SortKey, ViewManager, ViewOptions, ViewQuery, ViewSource, ViewState};
