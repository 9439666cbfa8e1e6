//! The pipeline orchestrator: runs the stages in order under the state
//! machine's guard, resuming from wherever a re-trigger rolled back to.

use std::future::Future;
use std::sync::Arc;

use replay_core::state::Rollback;
use replay_core::ReplayState;
use replay_osm::Manifest;

use crate::acquire::{HttpSnapshotAcquirer, SnapshotAcquirer};
use crate::collect::{collect_changesets, ChangesetApi, HttpChangesetApi};
use crate::config::ReplayConfig;
use crate::detect::run_detection;
use crate::error::Error;
use crate::storage::Storage;
use crate::upload::{push_changeset, OsmApiUploader, PushOutcome, Uploader};

/// The orchestrator, parameterized over its external collaborators so the
/// stages can run against fakes.
pub struct Pipeline<C, A, U> {
    storage: Arc<dyn Storage>,
    config: ReplayConfig,
    changesets: C,
    acquirer: A,
    uploader: U,
}

/// The production assembly: everything over HTTP.
pub type HttpPipeline = Pipeline<HttpChangesetApi, HttpSnapshotAcquirer, OsmApiUploader>;

impl HttpPipeline {
    /// Build the production pipeline with a shared HTTP client.
    ///
    /// # Errors
    ///
    /// Client construction failures.
    pub fn with_http(storage: Arc<dyn Storage>, config: ReplayConfig) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.http_timeout_secs))
            .build()?;
        let changesets = HttpChangesetApi::new(client.clone(), config.osm_base_url.clone());
        let acquirer = HttpSnapshotAcquirer::new(client.clone());
        let uploader = OsmApiUploader::new(
            client,
            config.upstream_api_url.clone(),
            config.oauth_token.clone(),
        );
        Ok(Self::new(storage, config, changesets, acquirer, uploader))
    }
}

impl<C, A, U> Pipeline<C, A, U>
where
    C: ChangesetApi,
    A: SnapshotAcquirer,
    U: Uploader,
{
    pub fn new(
        storage: Arc<dyn Storage>,
        config: ReplayConfig,
        changesets: C,
        acquirer: A,
        uploader: U,
    ) -> Self {
        Self {
            storage,
            config,
            changesets,
            acquirer,
            uploader,
        }
    }

    #[must_use]
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    #[must_use]
    pub const fn config(&self) -> &ReplayConfig {
        &self.config
    }

    /// Start a fresh run; rejected when one is already underway.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyTriggered`] or any stage failure.
    pub async fn trigger(&self) -> Result<(), Error> {
        if self.storage.load_status()?.is_initiated() {
            return Err(Error::AlreadyTriggered);
        }
        self.run_from(ReplayState::NotTriggered).await
    }

    /// Roll back one boundary (discarding that stage's products) and re-run
    /// from there.
    ///
    /// # Errors
    ///
    /// Storage or stage failures.
    pub async fn retrigger(&self) -> Result<(), Error> {
        let mut status = self.storage.load_status()?;
        let rollback = status.retrigger();
        match rollback {
            Rollback::DiscardChangesets | Rollback::DiscardChangesetsKeepElements => {
                self.storage.clear_changesets()?;
            }
            Rollback::DiscardElements => self.storage.clear_elements()?,
            Rollback::None => {}
        }
        let resume_from = status.state;
        self.storage.save_status(&status)?;
        self.run_from(resume_from).await
    }

    /// Wipe everything: initial status, no changesets, no elements.
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub fn reset(&self) -> Result<(), Error> {
        let mut status = self.storage.load_status()?;
        status.reset();
        self.storage.save_status(&status)?;
        self.storage.clear_changesets()?;
        self.storage.clear_elements()?;
        tracing::info!("pipeline reset");
        Ok(())
    }

    /// Run every remaining preparation stage, beginning after `from`, up to
    /// the opening of conflict resolution.
    ///
    /// # Errors
    ///
    /// The first stage failure; the status record keeps the error and the
    /// state pointer stays on the failed stage.
    pub async fn run_from(&self, from: ReplayState) -> Result<(), Error> {
        self.config.validate()?;

        if from <= ReplayState::NotTriggered {
            self.guarded(ReplayState::GatheringChangesets, async {
                let collected =
                    collect_changesets(self.storage.as_ref(), &self.changesets, &self.config)
                        .await?;
                tracing::info!(collected, "gathered local changesets");
                Ok(())
            })
            .await?;
        }

        if from <= ReplayState::GatheringChangesets {
            self.guarded(ReplayState::ExtractingUpstreamAoi, async {
                let manifest = Manifest::load(&self.config.manifest_path())?;
                self.acquirer.fetch_upstream(&self.config, &manifest).await
            })
            .await?;
        }

        if from <= ReplayState::ExtractingUpstreamAoi {
            self.guarded(ReplayState::ExtractingLocalAoi, async {
                self.acquirer.export_local(&self.config).await
            })
            .await?;
        }

        if from <= ReplayState::ExtractingLocalAoi {
            let outcome = self
                .guarded(ReplayState::DetectingConflicts, async {
                    run_detection(self.storage.as_ref(), &self.config)
                })
                .await?;
            let mut status = self.storage.load_status()?;
            status.elements_data = Some(outcome.elements_data);
            self.storage.save_status(&status)?;
        }

        if from <= ReplayState::DetectingConflicts {
            self.guarded(ReplayState::CreatingGeojsons, async {
                // The reduced extracts were written during detection; this
                // boundary hands them to the external GeoJSON converter.
                for snapshot in ["original", "local", "upstream"] {
                    let path = self.config.referenced_osm_path(snapshot);
                    if !path.exists() {
                        return Err(Error::Config(format!(
                            "missing referenced extract {}",
                            path.display()
                        )));
                    }
                }
                Ok(())
            })
            .await?;
        }

        if from <= ReplayState::CreatingGeojsons {
            let mut status = self.storage.load_status()?;
            status.enter(ReplayState::ResolvingConflicts)?;
            let open = self.storage.load_elements()?.conflicting_count();
            if open == 0 {
                tracing::info!("no conflicts detected; ready to push");
                status.complete();
            } else {
                tracing::info!(open, "conflicts await resolution");
            }
            self.storage.save_status(&status)?;
        }

        Ok(())
    }

    /// Upload the composite changeset; only legal once resolution is
    /// complete.
    ///
    /// # Errors
    ///
    /// Guard violations and upload failures.
    pub async fn push(&self) -> Result<PushOutcome, Error> {
        let outcome = self
            .guarded(ReplayState::PushConflicts, async {
                push_changeset(self.storage.as_ref(), &self.config, &self.uploader).await
            })
            .await?;

        let mut status = self.storage.load_status()?;
        status.enter(ReplayState::PushedUpstream)?;
        status.complete();
        self.storage.save_status(&status)?;
        tracing::info!(changeset_id = outcome.changeset_id, "pushed upstream");
        Ok(outcome)
    }

    /// Run one stage under the transition guard: enter, run, then mark
    /// complete or record the failure in place. The stage body is a lazy
    /// future; nothing in it runs before the guard admits the stage.
    async fn guarded<T>(
        &self,
        stage: ReplayState,
        run: impl Future<Output = Result<T, Error>>,
    ) -> Result<T, Error> {
        let mut status = self.storage.load_status()?;
        status.enter(stage)?;
        self.storage.save_status(&status)?;

        match run.await {
            Ok(value) => {
                let mut status = self.storage.load_status()?;
                status.complete();
                self.storage.save_status(&status)?;
                Ok(value)
            }
            Err(e) => {
                let mut status = self.storage.load_status()?;
                status.fail(e.to_string());
                self.storage.save_status(&status)?;
                tracing::error!(stage = %stage, error = %e, "stage failed");
                Err(e)
            }
        }
    }
}
