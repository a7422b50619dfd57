//! Mutation Coordinator
//!
//! State changes go through [`MutationCoordinator::submit`]: one request in
//! flight per `(collection, entity, operation kind)`, no automatic retry,
//! registered views reloaded after success.

pub mod coordinator;
pub mod request;

pub use coordinator::{MutationCoordinator, MutationError, MutationOutcome, RefreshError};
pub use request::{MutationKey, MutationOperation, MutationRequest, OperationKind};
