//! Replay semantics for reconciling offline OpenStreetMap edits.
//!
//! `replay_core` holds the pure logic of the replay pipeline: given the
//! changesets a disconnected replica accumulated and three snapshots of the
//! same area of interest (original at clone time, local now, upstream now),
//! it decides which locally touched elements still agree with upstream,
//! which conflict, and what an upload must contain. The stages, in
//! dependency order:
//!
//! 1. **Tracking** ([`tracker`]) -- classify every element occurrence from
//!    the local changesets as added, modified, deleted, or referenced.
//! 2. **Snapshots** ([`snapshot`]) -- materialized views of the three AOI
//!    files, restricted to the touched ids, plus the reference graph built
//!    on the local file.
//! 3. **Conflict detection** ([`conflict`]) -- the upstream-changed version
//!    gate followed by structural equality (meta fields never compared).
//! 4. **Reference propagation** ([`propagate`]) -- node conflicts surface
//!    the ways and relations whose geometry depends on them.
//! 5. **The element store** ([`store`]) -- one record per touched element
//!    with its three snapshots, and the resolution API (ours / theirs /
//!    custom, with parent-to-child cascade).
//! 6. **Emission** ([`emit`]) -- the ordered changeset plan with locally
//!    created ids rewritten to negative placeholders.
//! 7. **The state machine** ([`state`]) -- guarded stage transitions,
//!    re-trigger rollback, reset.
//!
//! Parsing and serializing OSM XML is deliberately outside this crate (see
//! `replay_osm`), as is anything that talks to the network or the
//! filesystem (`replay_pipeline`).
//!
//! # Crate features
//!
//! - **`serde`** -- enables `Serialize`/`Deserialize` derives on the data
//!   model so the pipeline layer can persist it.
//!
//! This crate is `no_std` compatible (requires `alloc`).

#![cfg_attr(not(test), no_std)]
extern crate alloc;

pub mod conflict;
pub mod element;
pub mod emit;
pub mod propagate;
pub mod snapshot;
pub mod state;
pub mod store;
pub mod tracker;

pub use conflict::{detect_conflicts, elements_conflict};
pub use element::{Element, ElementKind, Geometry, Location, Member, Tag};
pub use emit::{plan_changeset, ChangesetPlan};
pub use propagate::propagate_references;
pub use state::{PipelineStatus, ReplayState};
pub use store::{ElementKey, ElementStore, TrackedElement};
pub use tracker::{ChangeRecord, ChangeTracker};
