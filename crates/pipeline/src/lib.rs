//! The replay pipeline host: orchestration and external collaborators.
//!
//! `replay_core` decides *what* the replay means; this crate makes it
//! happen against the outside world. It owns:
//!
//! - the deployment [`config`]uration,
//! - the [`storage`] contract (singleton status, collected changesets,
//!   tracked elements, config) with in-memory and JSON-file backends,
//! - the changeset [`collect`]or over the replica's HTTP API,
//! - snapshot [`acquire`]rs (Overpass for upstream, the FIFO exporter
//!   handshake for the local extract),
//! - the [`detect`]ion stage gluing tracker, loader, detector, and
//!   propagator together,
//! - the [`resolution`] entry points the HTTP facade calls,
//! - the [`upload`] lifecycle (create / upload / close), and
//! - the [`runner`], which walks the stages under the state machine's
//!   guard and implements trigger / re-trigger / reset / push.
//!
//! The pipeline is single-writer end to end: one run at a time, stages
//! strictly sequential, suspension only at the external I/O points.

pub mod acquire;
pub mod collect;
pub mod config;
pub mod detect;
pub mod error;
pub mod resolution;
pub mod runner;
pub mod storage;
pub mod upload;

pub use config::ReplayConfig;
pub use error::Error;
pub use runner::{HttpPipeline, Pipeline};
pub use storage::{JsonFileStorage, LocalChangeset, MemoryStorage, Storage};
pub use upload::PushOutcome;
