//! Deployment configuration: URLs, credentials, AOI paths, and the
//! exporter handshake parameters.

use std::path::PathBuf;

use replay_osm::Manifest;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::Error;

fn default_osm_base_url() -> String {
    "http://172.16.1.1:81".to_string()
}

fn default_overpass_api_url() -> String {
    "http://overpass-api.de/api/interpreter".to_string()
}

fn default_upstream_api_url() -> String {
    "https://master.apis.dev.openstreetmap.org".to_string()
}

fn default_aoi_root() -> PathBuf {
    PathBuf::from("/aoi")
}

fn default_original_aoi_file_name() -> String {
    "original_aoi.osm".to_string()
}

fn default_exporter_request_fifo() -> PathBuf {
    PathBuf::from("osmosis_command_reader.fifo")
}

fn default_exporter_result_fifo() -> PathBuf {
    PathBuf::from("osmosis_result_reader.fifo")
}

fn default_exporter_db_host() -> String {
    "172.16.1.1".to_string()
}

fn default_exporter_db_user() -> String {
    "osm".to_string()
}

fn default_exporter_db_password() -> String {
    "openstreetmap".to_string()
}

const fn default_first_changeset_id() -> u64 {
    1
}

const fn default_changeset_fetch_delay_ms() -> u64 {
    100
}

const fn default_http_timeout_secs() -> u64 {
    30
}

const fn default_exporter_timeout_secs() -> u64 {
    10
}

/// The singleton configuration record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TypedBuilder)]
pub struct ReplayConfig {
    /// The replica's OSM API (`schema://host:port`), source of the local
    /// changesets.
    #[builder(default = default_osm_base_url())]
    #[serde(default = "default_osm_base_url")]
    pub osm_base_url: String,

    /// Overpass endpoint the upstream AOI extract is pulled from.
    #[builder(default = default_overpass_api_url())]
    #[serde(default = "default_overpass_api_url")]
    pub overpass_api_url: String,

    /// Upstream OSM API root for changeset create/upload/close.
    #[builder(default = default_upstream_api_url())]
    #[serde(default = "default_upstream_api_url")]
    pub upstream_api_url: String,

    /// Pre-authorized bearer token for the upstream API.
    #[builder(default)]
    #[serde(default)]
    pub oauth_token: Option<String>,

    #[builder(default = default_aoi_root())]
    #[serde(default = "default_aoi_root")]
    pub aoi_root: PathBuf,

    /// Directory name under `aoi_root` holding `manifest.json` and the
    /// snapshot files.
    #[builder(default)]
    #[serde(default)]
    pub aoi_name: String,

    #[builder(default = default_original_aoi_file_name())]
    #[serde(default = "default_original_aoi_file_name")]
    pub original_aoi_file_name: String,

    /// First local changeset id to sweep; the sweep stops at the first 404.
    #[builder(default = default_first_changeset_id())]
    #[serde(default = "default_first_changeset_id")]
    pub first_changeset_id: u64,

    #[builder(default = default_changeset_fetch_delay_ms())]
    #[serde(default = "default_changeset_fetch_delay_ms")]
    pub changeset_fetch_delay_ms: u64,

    #[builder(default = default_http_timeout_secs())]
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    #[builder(default = default_exporter_request_fifo())]
    #[serde(default = "default_exporter_request_fifo")]
    pub exporter_request_fifo: PathBuf,

    #[builder(default = default_exporter_result_fifo())]
    #[serde(default = "default_exporter_result_fifo")]
    pub exporter_result_fifo: PathBuf,

    #[builder(default = default_exporter_timeout_secs())]
    #[serde(default = "default_exporter_timeout_secs")]
    pub exporter_timeout_secs: u64,

    #[builder(default = default_exporter_db_host())]
    #[serde(default = "default_exporter_db_host")]
    pub exporter_db_host: String,

    #[builder(default = default_exporter_db_user())]
    #[serde(default = "default_exporter_db_user")]
    pub exporter_db_user: String,

    #[builder(default = default_exporter_db_password())]
    #[serde(default = "default_exporter_db_password")]
    pub exporter_db_password: String,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ReplayConfig {
    /// Fatal configuration gaps, surfaced on stage entry.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] naming the missing field.
    pub fn validate(&self) -> Result<(), Error> {
        if self.aoi_name.is_empty() {
            return Err(Error::Config("aoi_name must be configured".to_string()));
        }
        Ok(())
    }

    /// Extra requirements of the local-export stage.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] naming the missing field.
    pub fn validate_for_export(&self) -> Result<(), Error> {
        self.validate()?;
        for (value, name) in [
            (&self.exporter_db_host, "exporter_db_host"),
            (&self.exporter_db_user, "exporter_db_user"),
            (&self.exporter_db_password, "exporter_db_password"),
        ] {
            if value.is_empty() {
                return Err(Error::Config(format!("{name} must be configured")));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn aoi_path(&self) -> PathBuf {
        self.aoi_root.join(&self.aoi_name)
    }

    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.aoi_path().join("manifest.json")
    }

    #[must_use]
    pub fn local_aoi_path(&self) -> PathBuf {
        self.aoi_path().join("local_aoi.osm")
    }

    #[must_use]
    pub fn current_aoi_path(&self) -> PathBuf {
        self.aoi_path().join("current_aoi.osm")
    }

    #[must_use]
    pub fn original_aoi_path(&self) -> PathBuf {
        self.aoi_path().join(&self.original_aoi_file_name)
    }

    /// Where the loader drops the reduced referenced-elements extract for
    /// one snapshot (`original`, `local`, `upstream`).
    #[must_use]
    pub fn referenced_osm_path(&self, snapshot: &str) -> PathBuf {
        self.aoi_path().join(format!("{snapshot}_referenced.osm"))
    }

    /// The Overpass query for the manifest's bbox: all nodes in the box,
    /// their parents, and everything those recursively require, with meta.
    #[must_use]
    pub fn overpass_query(manifest: &Manifest) -> String {
        format!(
            "(node({s},{w},{n},{e});<;>>;>;);out meta;",
            s = manifest.south(),
            w = manifest.west(),
            n = manifest.north(),
            e = manifest.east(),
        )
    }

    #[must_use]
    pub fn changeset_comment(&self) -> String {
        format!("Updates from offline replica in area '{}'", self.aoi_name)
    }
}
