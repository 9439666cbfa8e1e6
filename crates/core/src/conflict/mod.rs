//! Conflict detection: the upstream-changed filter, structural equality,
//! and the diff used by the changeset emitter.

pub mod detect;
pub mod diff;
pub mod equality;
pub mod error;

pub use detect::detect_conflicts;
pub use diff::{apply_delta, diff_elements, ElementDelta};
pub use equality::elements_conflict;
pub use error::Error;
