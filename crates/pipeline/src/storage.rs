//! The persistence contract and its two implementations.
//!
//! Durable state is small and closed: the singleton pipeline status, the
//! collected local changesets, the tracked elements, and the
//! configuration. Any durable KV store satisfies the contract;
//! shipped here are an in-memory store (tests, ephemeral runs) and a
//! single-file JSON store (field deployments are one AOI, the state fits
//! in one document).

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use replay_core::store::{ElementStore, TrackedElement};
use replay_core::PipelineStatus;
use serde::{Deserialize, Serialize};

use crate::config::ReplayConfig;
use crate::error::Error;

/// One collected local changeset: meta and payload exactly as fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalChangeset {
    pub changeset_id: u64,
    pub meta: String,
    pub payload: String,
    pub processed: bool,
    pub collected_at: DateTime<Utc>,
}

/// Durable state, loaded and saved wholesale; calls are serializable with
/// each other, so a resolution cascade persisted through one `save` is
/// atomic from every reader's point of view.
pub trait Storage: Send + Sync {
    /// # Errors
    /// Backend failures.
    fn load_status(&self) -> Result<PipelineStatus, Error>;
    /// # Errors
    /// Backend failures.
    fn save_status(&self, status: &PipelineStatus) -> Result<(), Error>;

    /// # Errors
    /// Backend failures.
    fn load_config(&self) -> Result<Option<ReplayConfig>, Error>;
    /// # Errors
    /// Backend failures.
    fn save_config(&self, config: &ReplayConfig) -> Result<(), Error>;

    /// # Errors
    /// Backend failures.
    fn load_elements(&self) -> Result<ElementStore, Error>;
    /// # Errors
    /// Backend failures.
    fn save_elements(&self, store: &ElementStore) -> Result<(), Error>;
    /// # Errors
    /// Backend failures.
    fn clear_elements(&self) -> Result<(), Error>;

    /// # Errors
    /// Backend failures.
    fn append_changeset(&self, changeset: LocalChangeset) -> Result<(), Error>;
    /// # Errors
    /// Backend failures.
    fn load_changesets(&self) -> Result<Vec<LocalChangeset>, Error>;
    /// # Errors
    /// Backend failures.
    fn mark_changesets_processed(&self) -> Result<(), Error>;
    /// # Errors
    /// Backend failures.
    fn clear_changesets(&self) -> Result<(), Error>;
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Persisted {
    status: PipelineStatus,
    config: Option<ReplayConfig>,
    changesets: Vec<LocalChangeset>,
    elements: Vec<TrackedElement>,
}

/// Ephemeral storage for tests and one-shot runs.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: Mutex<Persisted>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut Persisted) -> T) -> T {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl Storage for MemoryStorage {
    fn load_status(&self) -> Result<PipelineStatus, Error> {
        Ok(self.with(|db| db.status.clone()))
    }

    fn save_status(&self, status: &PipelineStatus) -> Result<(), Error> {
        self.with(|db| db.status = status.clone());
        Ok(())
    }

    fn load_config(&self) -> Result<Option<ReplayConfig>, Error> {
        Ok(self.with(|db| db.config.clone()))
    }

    fn save_config(&self, config: &ReplayConfig) -> Result<(), Error> {
        self.with(|db| db.config = Some(config.clone()));
        Ok(())
    }

    fn load_elements(&self) -> Result<ElementStore, Error> {
        Ok(self.with(|db| ElementStore::from_elements(db.elements.clone())))
    }

    fn save_elements(&self, store: &ElementStore) -> Result<(), Error> {
        self.with(|db| db.elements = store.to_vec());
        Ok(())
    }

    fn clear_elements(&self) -> Result<(), Error> {
        self.with(|db| db.elements.clear());
        Ok(())
    }

    fn append_changeset(&self, changeset: LocalChangeset) -> Result<(), Error> {
        self.with(|db| db.changesets.push(changeset));
        Ok(())
    }

    fn load_changesets(&self) -> Result<Vec<LocalChangeset>, Error> {
        Ok(self.with(|db| db.changesets.clone()))
    }

    fn mark_changesets_processed(&self) -> Result<(), Error> {
        self.with(|db| {
            for changeset in &mut db.changesets {
                changeset.processed = true;
            }
        });
        Ok(())
    }

    fn clear_changesets(&self) -> Result<(), Error> {
        self.with(|db| db.changesets.clear());
        Ok(())
    }
}

/// Single-file JSON storage: the whole state is one document, rewritten on
/// every mutation.
#[derive(Debug)]
pub struct JsonFileStorage {
    path: PathBuf,
    inner: Mutex<Persisted>,
}

impl JsonFileStorage {
    /// Open or create the backing file.
    ///
    /// # Errors
    ///
    /// I/O or JSON errors reading an existing file.
    pub fn open(path: PathBuf) -> Result<Self, Error> {
        let db = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw)?
        } else {
            Persisted::default()
        };
        Ok(Self {
            path,
            inner: Mutex::new(db),
        })
    }

    fn with<T>(&self, f: impl FnOnce(&mut Persisted) -> T) -> Result<T, Error> {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let value = f(&mut guard);
        let raw = serde_json::to_string_pretty(&*guard)?;
        std::fs::write(&self.path, raw)?;
        Ok(value)
    }

    fn read<T>(&self, f: impl FnOnce(&Persisted) -> T) -> T {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }
}

impl Storage for JsonFileStorage {
    fn load_status(&self) -> Result<PipelineStatus, Error> {
        Ok(self.read(|db| db.status.clone()))
    }

    fn save_status(&self, status: &PipelineStatus) -> Result<(), Error> {
        self.with(|db| db.status = status.clone())
    }

    fn load_config(&self) -> Result<Option<ReplayConfig>, Error> {
        Ok(self.read(|db| db.config.clone()))
    }

    fn save_config(&self, config: &ReplayConfig) -> Result<(), Error> {
        self.with(|db| db.config = Some(config.clone()))
    }

    fn load_elements(&self) -> Result<ElementStore, Error> {
        Ok(self.read(|db| ElementStore::from_elements(db.elements.clone())))
    }

    fn save_elements(&self, store: &ElementStore) -> Result<(), Error> {
        self.with(|db| db.elements = store.to_vec())
    }

    fn clear_elements(&self) -> Result<(), Error> {
        self.with(|db| db.elements.clear())
    }

    fn append_changeset(&self, changeset: LocalChangeset) -> Result<(), Error> {
        self.with(|db| db.changesets.push(changeset))
    }

    fn load_changesets(&self) -> Result<Vec<LocalChangeset>, Error> {
        Ok(self.read(|db| db.changesets.clone()))
    }

    fn mark_changesets_processed(&self) -> Result<(), Error> {
        self.with(|db| {
            for changeset in &mut db.changesets {
                changeset.processed = true;
            }
        })
    }

    fn clear_changesets(&self) -> Result<(), Error> {
        self.with(|db| db.changesets.clear())
    }
}
