//! View-State Projector
//!
//! Sorting, pagination and change notification for joined records, plus the
//! [`ViewManager`] that drives a full fetch → join → filter → project cycle.

pub mod manager;
pub mod projector;
pub mod sort;
pub mod state;

pub use manager::{DeriveFn, LoadOutcome, Refresh, ViewManager, ViewQuery, ViewSource};
pub use projector::{Listener, SubscriptionId, ViewProjector};
pub use sort::{NullOrdering, RecordComparator, SortKey, compare_values, sort_records};
pub use state::{DEFAULT_PAGE_SIZE, ViewOptions, ViewState, project};
