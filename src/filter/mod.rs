//! Filter/Predicate Engine
//!
//! Named criteria compiled once into a [`Predicate`] and applied to joined
//! records.

pub mod criterion;
pub mod predicate;
pub mod range;

pub use criterion::{FilterCriterion, FilterOperator};
pub use predicate::{Predicate, build_predicate, filter_records};
pub use range::{Bound, Comparable, RangeCheck, parse_moment};
