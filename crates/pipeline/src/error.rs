use replay_core::store::ElementKey;

/// Aggregate error for the pipeline layer.
///
/// Core-layer errors carry no `Display` of their own (they are plain data);
/// they are wrapped here with their debug representation so a stage failure
/// always produces a readable detail string for the status record.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration: {0}")]
    Config(String),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream api returned {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("upstream api protocol error: {0}")]
    Upstream(String),

    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse: {0}")]
    Parse(#[from] replay_osm::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage: {0}")]
    Storage(String),

    #[error("element store: {0:?}")]
    Store(replay_core::store::Error),

    #[error("state machine: {0:?}")]
    State(replay_core::state::Error),

    #[error("conflict detection: {0:?}")]
    Detect(replay_core::conflict::Error),

    #[error("reference propagation: {0:?}")]
    Propagate(replay_core::propagate::Error),

    #[error("changeset emit: {0:?}")]
    Emit(replay_core::emit::Error),

    #[error("exporter: {0}")]
    Exporter(String),

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("pipeline already triggered")]
    AlreadyTriggered,
}

impl Error {
    /// Whether the failure names an element the caller asked for that does
    /// not exist (the facade maps this to 404).
    #[must_use]
    pub fn not_found_key(&self) -> Option<ElementKey> {
        match self {
            Self::Store(replay_core::store::Error::NotFound(key)) => Some(*key),
            _ => None,
        }
    }
}

impl From<replay_core::store::Error> for Error {
    fn from(e: replay_core::store::Error) -> Self {
        Self::Store(e)
    }
}

impl From<replay_core::state::Error> for Error {
    fn from(e: replay_core::state::Error) -> Self {
        Self::State(e)
    }
}

impl From<replay_core::conflict::Error> for Error {
    fn from(e: replay_core::conflict::Error) -> Self {
        Self::Detect(e)
    }
}

impl From<replay_core::propagate::Error> for Error {
    fn from(e: replay_core::propagate::Error) -> Self {
        Self::Propagate(e)
    }
}

impl From<replay_core::emit::Error> for Error {
    fn from(e: replay_core::emit::Error) -> Self {
        Self::Emit(e)
    }
}
