//! The upstream uploader: changeset create, contents upload, close.
//!
//! Authentication is somebody else's problem by contract; the uploader
//! takes a pre-authorized bearer token. Upload is atomic: one changeset,
//! one osmChange document, no chunking.

use replay_core::plan_changeset;

use crate::config::ReplayConfig;
use crate::error::Error;
use crate::storage::Storage;

/// The upstream changeset lifecycle.
#[allow(async_fn_in_trait)]
pub trait Uploader {
    /// Open a changeset; returns its upstream id.
    ///
    /// # Errors
    ///
    /// Transport and non-200 statuses.
    async fn create_changeset(&self, comment: &str) -> Result<i64, Error>;

    /// Upload one osmChange document into the changeset.
    ///
    /// # Errors
    ///
    /// Transport and non-200 statuses.
    async fn upload_changeset(&self, changeset_id: i64, body: &str) -> Result<(), Error>;

    /// Close the changeset.
    ///
    /// # Errors
    ///
    /// Transport and non-200 statuses.
    async fn close_changeset(&self, changeset_id: i64) -> Result<(), Error>;
}

/// `Uploader` over the upstream OSM API.
#[derive(Debug, Clone)]
pub struct OsmApiUploader {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl OsmApiUploader {
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: String, token: Option<String>) -> Self {
        Self {
            client,
            base_url,
            token,
        }
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, url)
            .header("Content-Type", "text/xml");
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn expect_success(response: reqwest::Response) -> Result<String, Error> {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status.is_success() {
            Ok(body)
        } else {
            Err(Error::UpstreamStatus {
                status: status.as_u16(),
                body,
            })
        }
    }
}

impl Uploader for OsmApiUploader {
    async fn create_changeset(&self, comment: &str) -> Result<i64, Error> {
        let body = replay_osm::writer::changeset_creation_xml(comment)?;
        let url = format!("{}/api/0.6/changeset/create", self.base_url);
        let response = self
            .request(reqwest::Method::PUT, url)
            .body(body)
            .send()
            .await?;
        let text = Self::expect_success(response).await?;
        text.trim()
            .parse()
            .map_err(|_| Error::Upstream(format!("non-numeric changeset id {text:?}")))
    }

    async fn upload_changeset(&self, changeset_id: i64, body: &str) -> Result<(), Error> {
        let url = format!("{}/api/0.6/changeset/{changeset_id}/upload", self.base_url);
        let response = self
            .request(reqwest::Method::POST, url)
            .body(body.to_string())
            .send()
            .await?;
        Self::expect_success(response).await.map(|_| ())
    }

    async fn close_changeset(&self, changeset_id: i64) -> Result<(), Error> {
        let url = format!("{}/api/0.6/changeset/{changeset_id}/close", self.base_url);
        let response = self.request(reqwest::Method::PUT, url).send().await?;
        Self::expect_success(response).await.map(|_| ())
    }
}

/// Result of a push for reporting.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PushOutcome {
    pub changeset_id: i64,
    pub changes: usize,
}

/// Plan, serialize, and upload the composite changeset, then mark every
/// covered element pushed.
///
/// # Errors
///
/// Planning, serialization, transport, and storage failures. Elements are
/// marked pushed only after the changeset is closed.
pub async fn push_changeset<U: Uploader>(
    storage: &dyn Storage,
    config: &ReplayConfig,
    uploader: &U,
) -> Result<PushOutcome, Error> {
    let mut store = storage.load_elements()?;

    let changeset_id = uploader.create_changeset(&config.changeset_comment()).await?;
    let plan = plan_changeset(&store, changeset_id)?;
    let body = replay_osm::writer::osm_change_to_xml(&plan)?;

    tracing::info!(changeset_id, changes = plan.changes.len(), "uploading changeset");
    uploader.upload_changeset(changeset_id, &body).await?;
    uploader.close_changeset(changeset_id).await?;

    store.mark_pushed(&plan.covered);
    storage.save_elements(&store)?;

    Ok(PushOutcome {
        changeset_id,
        changes: plan.changes.len(),
    })
}
