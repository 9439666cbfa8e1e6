//! The changeset collector: sweep a contiguous id range off the replica's
//! OSM API until the first 404.

use chrono::Utc;
use tokio::time::{sleep, Duration};

use crate::config::ReplayConfig;
use crate::error::Error;
use crate::storage::{LocalChangeset, Storage};

/// Access to the replica's changeset endpoints.
#[allow(async_fn_in_trait)]
pub trait ChangesetApi {
    /// Changeset metadata; `None` when the id does not exist (404), which
    /// terminates the sweep.
    ///
    /// # Errors
    ///
    /// Transport failures and non-200/404 statuses.
    async fn fetch_meta(&self, changeset_id: u64) -> Result<Option<String>, Error>;

    /// The osmChange payload for one changeset.
    ///
    /// # Errors
    ///
    /// Transport failures and non-200 statuses.
    async fn fetch_payload(&self, changeset_id: u64) -> Result<String, Error>;
}

/// `ChangesetApi` over the replica's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpChangesetApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpChangesetApi {
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

impl ChangesetApi for HttpChangesetApi {
    async fn fetch_meta(&self, changeset_id: u64) -> Result<Option<String>, Error> {
        let url = format!("{}/api/0.6/changeset/{changeset_id}", self.base_url);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Error::UpstreamStatus {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(Some(response.text().await?))
    }

    async fn fetch_payload(&self, changeset_id: u64) -> Result<String, Error> {
        let url = format!(
            "{}/api/0.6/changeset/{changeset_id}/download",
            self.base_url
        );
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::UpstreamStatus {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.text().await?)
    }
}

/// Collect changesets from `first_changeset_id` upward until the first
/// missing id, storing each as it arrives. Returns how many were collected.
///
/// # Errors
///
/// Transport or storage failures; partial progress stays stored and the
/// sweep is idempotent on re-trigger (the stage discards its products
/// first).
pub async fn collect_changesets<C: ChangesetApi>(
    storage: &dyn Storage,
    api: &C,
    config: &ReplayConfig,
) -> Result<u64, Error> {
    let mut changeset_id = config.first_changeset_id;
    let mut collected = 0;

    while let Some(meta) = api.fetch_meta(changeset_id).await? {
        let payload = api.fetch_payload(changeset_id).await?;
        storage.append_changeset(LocalChangeset {
            changeset_id,
            meta,
            payload,
            processed: false,
            collected_at: Utc::now(),
        })?;
        collected += 1;
        changeset_id += 1;
        tracing::debug!(changeset_id, "collected local changeset");
        // Pace the sweep; the replica API is a small field deployment.
        sleep(Duration::from_millis(config.changeset_fetch_delay_ms)).await;
    }

    tracing::info!(collected, "changeset sweep finished");
    Ok(collected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    struct FixedApi {
        changesets: Vec<(u64, String)>,
    }

    impl ChangesetApi for FixedApi {
        async fn fetch_meta(&self, changeset_id: u64) -> Result<Option<String>, Error> {
            Ok(self
                .changesets
                .iter()
                .find(|(id, _)| *id == changeset_id)
                .map(|_| format!("<changeset id=\"{changeset_id}\"/>")))
        }

        async fn fetch_payload(&self, changeset_id: u64) -> Result<String, Error> {
            self.changesets
                .iter()
                .find(|(id, _)| *id == changeset_id)
                .map(|(_, payload)| payload.clone())
                .ok_or(Error::UpstreamStatus {
                    status: 500,
                    body: String::new(),
                })
        }
    }

    #[tokio::test]
    async fn sweep_stops_at_first_missing_id() {
        let storage = MemoryStorage::new();
        let api = FixedApi {
            changesets: vec![
                (1, "<osmChange/>".to_string()),
                (2, "<osmChange/>".to_string()),
                // id 3 missing, id 4 present but unreachable by the sweep
                (4, "<osmChange/>".to_string()),
            ],
        };
        let config = ReplayConfig::builder()
            .aoi_name("aoi".to_string())
            .changeset_fetch_delay_ms(0)
            .build();

        let collected = collect_changesets(&storage, &api, &config).await.unwrap();
        assert_eq!(collected, 2);
        let stored = storage.load_changesets().unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].changeset_id, 1);
        assert_eq!(stored[1].changeset_id, 2);
        assert!(!stored[0].processed);
    }

    #[tokio::test]
    async fn sweep_honors_first_changeset_id() {
        let storage = MemoryStorage::new();
        let api = FixedApi {
            changesets: vec![(5, "<osmChange/>".to_string())],
        };
        let config = ReplayConfig::builder()
            .aoi_name("aoi".to_string())
            .first_changeset_id(5)
            .changeset_fetch_delay_ms(0)
            .build();

        let collected = collect_changesets(&storage, &api, &config).await.unwrap();
        assert_eq!(collected, 1);
    }
}
