use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tracing::{debug, error, info, warn};

use crate::{
    fs::operations::{quarantine, write_atomically},
    utils::{clock::Clock, time::quarantine_stamp},
};

use super::entities::History;

/// Name of the history file inside the application directory.
pub const HISTORY_FILE_NAME: &str = "keycount_history.json";

/// Interface for abstracting durable storage of the day history.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait HistoryStorage: Send + Sync + 'static {
    /// Loads the whole history. A missing file is an empty history, a damaged one is moved aside
    /// and also reads as empty.
    async fn load(&self) -> Result<History>;

    /// Durably replaces the stored history with `history`.
    async fn save(&self, history: &History) -> Result<()>;
}

/// The main realization of [HistoryStorage]. Keeps the whole history in one JSON file that is
/// replaced atomically on every save.
pub struct HistoryStorageImpl {
    path: PathBuf,
    clock: Box<dyn Clock>,
}

impl HistoryStorageImpl {
    pub fn new(path: PathBuf, clock: Box<dyn Clock>) -> Result<Self, std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        Ok(Self { path, clock })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the history without any repair. Used by readers that must not touch the file, a
    /// damaged file surfaces as a [serde_json::Error].
    pub async fn read(&self) -> Result<History> {
        debug!("Reading history from {:?}", self.path);
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(History::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn recover_from_corruption(&self, cause: &anyhow::Error) -> Result<History> {
        let stamp = quarantine_stamp(&self.clock.time());
        let moved = quarantine(&self.path, &stamp).await?;
        warn!(
            "History file {:?} could not be parsed ({cause}), moved it to {:?}",
            self.path, moved
        );

        let history = History::default();
        if let Err(e) = self.save(&history).await {
            // The next flush writes the file anyway.
            error!("Failed to write a fresh history after recovery {e:?}");
        }
        Ok(history)
    }
}

#[async_trait]
impl HistoryStorage for HistoryStorageImpl {
    async fn load(&self) -> Result<History> {
        match self.read().await {
            Ok(history) => {
                info!("Loaded {} days of history", history.len());
                Ok(history)
            }
            Err(e) if e.downcast_ref::<serde_json::Error>().is_some() => {
                self.recover_from_corruption(&e).await
            }
            Err(e) => Err(e),
        }
    }

    async fn save(&self, history: &History) -> Result<()> {
        let mut buffer = serde_json::to_vec_pretty(history)?;
        buffer.push(b'\n');
        write_atomically(&self.path, &buffer).await?;
        debug!("Saved {} days of history", history.len());
        Ok(())
    }
}
