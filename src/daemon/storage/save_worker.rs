use std::sync::Arc;

use anyhow::Result;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, error, info_span, Instrument};

use super::{entities::History, history_storage::HistoryStorage};

#[derive(Debug, Clone)]
struct SaveRequest {
    generation: u64,
    history: Arc<History>,
}

/// Result of the most recent write attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SaveOutcome {
    pub generation: u64,
    pub succeeded: bool,
}

/// Writes history snapshots on its own task so that disk latency never reaches the event path.
/// Requests go through a watch channel, which makes the queue one slot deep: a snapshot that has
/// not been picked up yet is replaced by a newer one. Snapshots always contain the whole history,
/// so the newer one carries everything the replaced one had.
pub struct SaveWorker<S> {
    storage: S,
    pending: watch::Receiver<Option<SaveRequest>>,
    settled: watch::Sender<SaveOutcome>,
}

impl<S: HistoryStorage> SaveWorker<S> {
    pub fn spawn(storage: S) -> SaveQueue {
        let (pending_sender, pending) = watch::channel(None);
        let (settled, settled_receiver) = watch::channel(SaveOutcome::default());

        let worker = SaveWorker {
            storage,
            pending,
            settled,
        };
        let handle = tokio::spawn(worker.run().instrument(info_span!("save worker")));

        SaveQueue {
            pending: pending_sender,
            settled: settled_receiver,
            worker: handle,
            next_generation: 0,
        }
    }

    async fn run(mut self) {
        // Keeps going after the queue is dropped until the last submitted snapshot is written.
        while self.pending.changed().await.is_ok() {
            let Some(request) = self.pending.borrow_and_update().clone() else {
                continue;
            };

            let succeeded = match self.storage.save(&request.history).await {
                Ok(()) => {
                    debug!("Saved snapshot {}", request.generation);
                    true
                }
                Err(e) => {
                    // In-memory counts stay authoritative, the next snapshot carries them again.
                    error!("Failed to save snapshot {}: {e:?}", request.generation);
                    false
                }
            };

            self.settled.send_replace(SaveOutcome {
                generation: request.generation,
                succeeded,
            });
        }
        debug!("Save queue closed");
    }
}

/// Sending side of [SaveWorker].
pub struct SaveQueue {
    pending: watch::Sender<Option<SaveRequest>>,
    settled: watch::Receiver<SaveOutcome>,
    worker: JoinHandle<()>,
    next_generation: u64,
}

impl SaveQueue {
    /// Hands a snapshot over without waiting for the write. Returns the generation that can be
    /// passed to [SaveQueue::wait_settled].
    pub fn submit(&mut self, history: Arc<History>) -> u64 {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.pending
            .send_replace(Some(SaveRequest { generation, history }));
        generation
    }

    pub fn last_outcome(&self) -> SaveOutcome {
        *self.settled.borrow()
    }

    /// Waits until a write covering `generation` has either succeeded or failed.
    pub async fn wait_settled(&self, generation: u64) -> SaveOutcome {
        let mut settled = self.settled.clone();
        if settled
            .wait_for(|outcome| outcome.generation >= generation)
            .await
            .is_err()
        {
            debug!("Save worker stopped before snapshot {generation} settled");
        }
        let outcome = *settled.borrow();
        outcome
    }

    /// Stops accepting snapshots and waits for the worker to write the last one.
    pub async fn close(self) -> Result<SaveOutcome> {
        let SaveQueue {
            pending,
            settled,
            worker,
            ..
        } = self;
        drop(pending);
        worker.await?;
        let outcome = *settled.borrow();
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use tempfile::tempdir;
    use tokio::sync::Semaphore;

    use super::{SaveOutcome, SaveWorker};
    use crate::{
        daemon::storage::{
            entities::{DayCounts, DayKey, History},
            history_storage::{
                HistoryStorage, HistoryStorageImpl, MockHistoryStorage, HISTORY_FILE_NAME,
            },
        },
        utils::{clock::DefaultClock, logging::TEST_LOGGING},
    };

    fn history(keystrokes: u64) -> Arc<History> {
        let day = DayKey::new(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap());
        Arc::new([(day, DayCounts::new(keystrokes, 0))].into_iter().collect())
    }

    /// Records saves and holds each one until the test lets it through.
    struct GatedStorage {
        gate: Arc<Semaphore>,
        saved: Arc<Mutex<Vec<History>>>,
    }

    #[async_trait]
    impl HistoryStorage for GatedStorage {
        async fn load(&self) -> Result<History> {
            Ok(History::default())
        }

        async fn save(&self, history: &History) -> Result<()> {
            self.gate.acquire().await?.forget();
            self.saved.lock().unwrap().push(history.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_submit_writes_to_disk() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let path = dir.path().join(HISTORY_FILE_NAME);
        let mut queue =
            SaveWorker::spawn(HistoryStorageImpl::new(path.clone(), Box::new(DefaultClock))?);

        let generation = queue.submit(history(5));
        let outcome = queue.wait_settled(generation).await;

        assert_eq!(
            outcome,
            SaveOutcome {
                generation,
                succeeded: true
            }
        );
        let reader = HistoryStorageImpl::new(path, Box::new(DefaultClock))?;
        assert_eq!(reader.read().await?, *history(5));
        queue.close().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_pending_snapshot_is_superseded() -> Result<()> {
        *TEST_LOGGING;
        let gate = Arc::new(Semaphore::new(0));
        let saved = Arc::new(Mutex::new(vec![]));
        let mut queue = SaveWorker::spawn(GatedStorage {
            gate: gate.clone(),
            saved: saved.clone(),
        });

        queue.submit(history(1));
        // Let the worker pick up the first snapshot and block inside the write.
        tokio::task::yield_now().await;
        queue.submit(history(2));
        let last = queue.submit(history(3));

        gate.add_permits(10);
        let outcome = queue.wait_settled(last).await;
        assert!(outcome.succeeded);
        queue.close().await?;

        let saved = saved.lock().unwrap().clone();
        assert_eq!(saved.first(), Some(&*history(1)));
        assert_eq!(saved.last(), Some(&*history(3)));
        assert!(!saved.contains(&*history(2)));
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_save_is_reported_and_worker_continues() -> Result<()> {
        *TEST_LOGGING;
        let mut storage = MockHistoryStorage::new();
        let mut calls = 0;
        storage.expect_save().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(anyhow!("disk full"))
            } else {
                Ok(())
            }
        });
        let mut queue = SaveWorker::spawn(storage);

        let first = queue.submit(history(1));
        assert!(!queue.wait_settled(first).await.succeeded);
        assert_eq!(queue.last_outcome().generation, first);

        let second = queue.submit(history(2));
        assert!(queue.wait_settled(second).await.succeeded);
        queue.close().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_close_waits_for_last_snapshot() -> Result<()> {
        *TEST_LOGGING;
        let gate = Arc::new(Semaphore::new(0));
        let saved = Arc::new(Mutex::new(vec![]));
        let mut queue = SaveWorker::spawn(GatedStorage {
            gate: gate.clone(),
            saved: saved.clone(),
        });

        let generation = queue.submit(history(7));
        let releaser = tokio::spawn({
            let gate = gate.clone();
            async move {
                tokio::task::yield_now().await;
                gate.add_permits(1);
            }
        });

        let outcome = queue.close().await?;
        releaser.await?;

        assert_eq!(
            outcome,
            SaveOutcome {
                generation,
                succeeded: true
            }
        );
        assert_eq!(saved.lock().unwrap().clone(), vec![(*history(7)).clone()]);
        Ok(())
    }
}
