//! Join Resolver
//!
//! Rebuilds relations between flat collections in memory: foreign key field
//! on the base record, key field on the target collection, loose equality
//! between the two.

pub mod descriptor;
pub mod index;
pub mod resolver;

pub use descriptor::{Cardinality, RelationDescriptor, validate_relations};
pub use index::KeyIndex;
pub use resolver::{FetchedTargets, JoinOutcome, JoinResolver, RelationError, attach_relations};
