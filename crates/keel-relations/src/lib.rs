//! Relationship engine: a lazily computed, cache-backed index of
//! typed relations between entities.
//!
//! For an entity E the cache answers "what are E's related entities,
//! grouped by rule reference?" in amortized constant time. Relations
//! are computed on demand, one entity at a time, and invalidated with
//! entity-level granularity (plus a cascade through the reverse index
//! so no cached relation ever points at a deleted entity) and
//! rule-level granularity (a changed rule strips its relations
//! everywhere and is recomputed lazily).

pub mod cache;
pub mod error;

pub use cache::{RelationStats, RelationshipCache};
pub use error::{RelationError, Result};
