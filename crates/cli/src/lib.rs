//! osm-replay CLI -- serve the facade or drive the pipeline directly.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "osm-replay",
    about = "Replay and reconcile offline OpenStreetMap edits against upstream"
)]
pub struct App {
    /// JSON state file backing the pipeline (created on first use)
    #[arg(long, default_value = "replay-state.json")]
    pub data: PathBuf,

    /// JSON configuration file; falls back to the stored configuration,
    /// then to defaults
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the HTTP facade and pipeline host
    Serve(ServeArgs),
    /// Run the preparation pipeline once from the beginning
    Trigger,
    /// Roll back one stage boundary and re-run from there
    Retrigger,
    /// Upload the composite changeset upstream
    Push,
    /// Print the current pipeline status
    Status,
    /// Serialize the pending osmChange document without uploading
    Emit(EmitArgs),
    /// Drop pipeline state, collected changesets, and tracked elements
    Reset,
}

#[derive(Debug, Parser)]
pub struct ServeArgs {
    /// Address to bind the facade on
    #[arg(long, default_value = "127.0.0.1:8000")]
    pub addr: SocketAddr,
}

#[derive(Debug, Parser)]
pub struct EmitArgs {
    /// Changeset id to stamp on every emitted element
    #[arg(long, default_value_t = 1)]
    pub changeset: i64,

    /// Output file; stdout when omitted
    #[arg(long)]
    pub out: Option<PathBuf>,
}
