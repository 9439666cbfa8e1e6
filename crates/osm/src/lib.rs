//! The XML boundary of the replay tool.
//!
//! Everything that reads or writes OSM's wire formats lives here, keeping
//! `replay_core` free of parsing concerns:
//!
//! - [`reader`] -- streaming loader for AOI snapshot files. One pass,
//!   bounded memory per element; only elements the tracker cares about are
//!   materialized.
//! - [`changeset`] -- osmChange payload parsing into the flat change
//!   records the tracker consumes.
//! - [`writer`] -- osmChange document serialization (grouped `create` /
//!   `modify` / `delete` containers), referenced-elements sub-OSM output,
//!   and the changeset-creation body.
//! - [`manifest`] -- the AOI `manifest.json` with the bounding box.

pub mod changeset;
pub mod error;
pub mod manifest;
pub mod reader;
pub mod writer;

pub use error::Error;
pub use manifest::Manifest;
pub use reader::{load_aoi, load_aoi_from_reader, LoadOptions, LoadedAoi};
