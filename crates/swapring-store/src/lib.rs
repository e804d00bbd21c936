//! SwapRing Store - state tree ownership and persistence
//!
//! The store exclusively owns all state. Components hold an
//! `Arc<Store>` and mutate through [`Store::mutate`], which serializes
//! writers behind one lock and persists the snapshot before the
//! mutation's result is returned. Reads may be concurrent.
//!
//! Two backends share the same interface: a JSON snapshot written
//! atomically (temp file + rename) and an embedded SQLite database
//! hydrating the same logical tree.

pub mod migrate;
pub mod snapshot;
pub mod sqlite;
pub mod state;

pub use migrate::{migrate_json_to_sqlite, MigrationReport};
pub use snapshot::JsonSnapshotBackend;
pub use sqlite::SqliteBackend;
pub use state::{AppState, TenancyIndex};

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::debug;

use swapring_types::SwapError;

/// Store and persistence errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot (de)serialization failed: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Canonical encoding failed: {0}")]
    Canonical(#[from] swapring_canonical::CanonicalError),

    #[error("Database error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("State corruption detected: {0}")]
    Corrupt(String),

    #[error("Migration error: {0}")]
    Migration(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for SwapError {
    fn from(err: StoreError) -> Self {
        SwapError::internal(err.to_string())
    }
}

/// Persistence backend contract shared by JSON snapshots and SQLite
#[async_trait]
pub trait StatePersistence: Send + Sync {
    /// Load the persisted tree, `None` when nothing was saved yet
    async fn load(&self) -> StoreResult<Option<AppState>>;

    /// Persist the full tree
    async fn save(&self, state: &AppState) -> StoreResult<()>;
}

/// Which persistence backend to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateBackend {
    Json,
    Sqlite,
}

/// Store configuration, read from `STATE_BACKEND` / `STATE_FILE`
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StateBackend,
    pub state_file: PathBuf,
}

impl StoreConfig {
    pub fn from_env() -> Self {
        let backend = match std::env::var("STATE_BACKEND").as_deref() {
            Ok("sqlite") => StateBackend::Sqlite,
            _ => StateBackend::Json,
        };
        let state_file = std::env::var("STATE_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("swapring_state.json"));
        Self {
            backend,
            state_file,
        }
    }
}

/// The single-writer store
pub struct Store {
    state: RwLock<AppState>,
    persistence: Option<Box<dyn StatePersistence>>,
}

impl Store {
    /// In-memory store without persistence (tests, matcher shadows)
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(AppState::default()),
            persistence: None,
        }
    }

    /// Open a store over a backend, hydrating any persisted tree
    pub async fn open(persistence: Box<dyn StatePersistence>) -> StoreResult<Self> {
        let state = persistence.load().await?.unwrap_or_default();
        Ok(Self {
            state: RwLock::new(state),
            persistence: Some(persistence),
        })
    }

    /// Open per configuration
    pub async fn open_with_config(config: &StoreConfig) -> StoreResult<Self> {
        let backend: Box<dyn StatePersistence> = match config.backend {
            StateBackend::Json => Box::new(JsonSnapshotBackend::new(&config.state_file)),
            StateBackend::Sqlite => Box::new(SqliteBackend::open(&config.state_file).await?),
        };
        Self::open(backend).await
    }

    /// Concurrent read access
    pub async fn read(&self) -> RwLockReadGuard<'_, AppState> {
        self.state.read().await
    }

    /// Clone of the current tree (exports, diagnostics)
    pub async fn snapshot(&self) -> AppState {
        self.state.read().await.clone()
    }

    /// Apply a mutation under the writer lock, then persist. The
    /// closure runs against a staged copy: either every write lands
    /// and is saved, or the error is returned with state untouched.
    pub async fn mutate<T, F>(&self, f: F) -> Result<T, SwapError>
    where
        F: FnOnce(&mut AppState) -> Result<T, SwapError>,
        T: Send,
    {
        let mut state = self.state.write().await;
        let mut staged = state.clone();
        match f(&mut staged) {
            Ok(value) => {
                if let Some(p) = &self.persistence {
                    p.save(&staged).await.map_err(SwapError::from)?;
                }
                *state = staged;
                debug!("store mutation committed");
                Ok(value)
            }
            Err(e) => Err(e),
        }
    }
}
