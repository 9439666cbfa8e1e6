//! Snapshot acquisition: the upstream AOI extract over Overpass, and the
//! local AOI extract through the out-of-process exporter.

use replay_osm::Manifest;
use tokio::time::{timeout, Duration};

use crate::config::ReplayConfig;
use crate::error::Error;

/// Produces the `current_aoi.osm` and `local_aoi.osm` files.
#[allow(async_fn_in_trait)]
pub trait SnapshotAcquirer {
    /// Fetch the upstream extract for the manifest's bbox and write it to
    /// [`ReplayConfig::current_aoi_path`].
    ///
    /// # Errors
    ///
    /// Transport, non-200 statuses, and I/O failures.
    async fn fetch_upstream(
        &self,
        config: &ReplayConfig,
        manifest: &Manifest,
    ) -> Result<(), Error>;

    /// Ask the exporter to dump the replica database to
    /// [`ReplayConfig::local_aoi_path`].
    ///
    /// # Errors
    ///
    /// Exporter protocol errors, timeouts, and I/O failures.
    async fn export_local(&self, config: &ReplayConfig) -> Result<(), Error>;
}

/// Production acquirer: Overpass over HTTP, the exporter over its two named
/// FIFOs.
#[derive(Debug, Clone)]
pub struct HttpSnapshotAcquirer {
    client: reqwest::Client,
}

impl HttpSnapshotAcquirer {
    #[must_use]
    pub const fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl SnapshotAcquirer for HttpSnapshotAcquirer {
    async fn fetch_upstream(
        &self,
        config: &ReplayConfig,
        manifest: &Manifest,
    ) -> Result<(), Error> {
        let query = ReplayConfig::overpass_query(manifest);
        tracing::debug!(query = %query, "requesting upstream extract");
        let response = self
            .client
            .post(&config.overpass_api_url)
            .form(&[("data", query.as_str())])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::UpstreamStatus {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let body = response.bytes().await?;
        tokio::fs::write(config.current_aoi_path(), &body).await?;
        tracing::info!(bytes = body.len(), "stored upstream aoi extract");
        Ok(())
    }

    async fn export_local(&self, config: &ReplayConfig) -> Result<(), Error> {
        config.validate_for_export()?;
        let out_path = config.local_aoi_path();
        let command = format!(
            "osmosis --read-apidb host={host} user={user} password={password} \
             validateSchemaVersion=no --write-xml file={file}",
            host = config.exporter_db_host,
            user = config.exporter_db_user,
            password = config.exporter_db_password,
            file = out_path.display(),
        );

        tokio::fs::write(&config.exporter_request_fifo, command).await?;

        // The result FIFO stays open until the exporter finishes; reading it
        // to EOF is the completion signal.
        let result = timeout(
            Duration::from_secs(config.exporter_timeout_secs),
            tokio::fs::read_to_string(&config.exporter_result_fifo),
        )
        .await
        .map_err(|_| Error::Timeout("exporter result"))??;

        let line = result
            .lines()
            .filter(|l| !l.trim().is_empty())
            .next_back()
            .ok_or_else(|| Error::Exporter("empty result from exporter".to_string()))?;
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("0") => {
                tracing::info!(path = %out_path.display(), "local aoi export finished");
                Ok(())
            }
            _ => Err(Error::Exporter(line.trim().to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The FIFO handshake is exercised against plain files: same read/write
    // path, no blocking semantics.
    #[tokio::test]
    async fn export_local_accepts_zero_result() {
        let dir = tempfile::tempdir().unwrap();
        let request = dir.path().join("request.fifo");
        let result = dir.path().join("result.fifo");
        std::fs::write(&result, "0 export complete\n").unwrap();

        let config = ReplayConfig::builder()
            .aoi_root(dir.path().to_path_buf())
            .aoi_name("aoi".to_string())
            .exporter_request_fifo(request.clone())
            .exporter_result_fifo(result)
            .build();
        std::fs::create_dir_all(config.aoi_path()).unwrap();

        let acquirer = HttpSnapshotAcquirer::new(reqwest::Client::new());
        acquirer.export_local(&config).await.unwrap();

        let written = std::fs::read_to_string(&request).unwrap();
        assert!(written.contains("--read-apidb"));
        assert!(written.contains("local_aoi.osm"));
    }

    #[tokio::test]
    async fn export_local_surfaces_error_line() {
        let dir = tempfile::tempdir().unwrap();
        let result = dir.path().join("result.fifo");
        std::fs::write(&result, "1 schema validation failed\n").unwrap();

        let config = ReplayConfig::builder()
            .aoi_root(dir.path().to_path_buf())
            .aoi_name("aoi".to_string())
            .exporter_request_fifo(dir.path().join("request.fifo"))
            .exporter_result_fifo(result)
            .build();
        std::fs::create_dir_all(config.aoi_path()).unwrap();

        let acquirer = HttpSnapshotAcquirer::new(reqwest::Client::new());
        let err = acquirer.export_local(&config).await.unwrap_err();
        assert!(matches!(err, Error::Exporter(msg) if msg.contains("schema validation")));
    }

    #[tokio::test]
    async fn export_local_rejects_empty_result() {
        let dir = tempfile::tempdir().unwrap();
        let result = dir.path().join("result.fifo");
        std::fs::write(&result, "\n").unwrap();

        let config = ReplayConfig::builder()
            .aoi_root(dir.path().to_path_buf())
            .aoi_name("aoi".to_string())
            .exporter_request_fifo(dir.path().join("request.fifo"))
            .exporter_result_fifo(result)
            .build();
        std::fs::create_dir_all(config.aoi_path()).unwrap();

        let acquirer = HttpSnapshotAcquirer::new(reqwest::Client::new());
        let err = acquirer.export_local(&config).await.unwrap_err();
        assert!(matches!(err, Error::Exporter(_)));
    }
}
