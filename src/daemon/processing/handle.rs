use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::daemon::storage::entities::{DayCounts, DayKey, History};

/// What readers get to see. Published as a whole after every event, so a reader can never observe
/// keystrokes and clicks from different moments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountsSnapshot {
    pub day: DayKey,
    pub today: DayCounts,
    /// History as of the last flush. The entry for `day` may lag behind `today`.
    pub history: Arc<History>,
}

/// Read side of the counter, handed to whatever presents the counts. Cheap to clone, all reads
/// copy out of the latest snapshot.
#[derive(Clone)]
pub struct CounterHandle {
    snapshot: watch::Receiver<CountsSnapshot>,
    shutdown: CancellationToken,
}

impl CounterHandle {
    pub fn new(snapshot: watch::Receiver<CountsSnapshot>, shutdown: CancellationToken) -> Self {
        Self { snapshot, shutdown }
    }

    /// Live counts for the day of the most recent event.
    pub fn current_counts(&self) -> DayCounts {
        self.snapshot.borrow().today
    }

    pub fn current_day(&self) -> DayKey {
        self.snapshot.borrow().day
    }

    /// Counts for any day, zero when nothing was counted on it.
    pub fn historical_counts(&self, day: DayKey) -> DayCounts {
        let snapshot = self.snapshot.borrow();
        if snapshot.day == day {
            snapshot.today
        } else {
            snapshot.history.get(day)
        }
    }

    /// Every counted day including the live one.
    pub fn export_all(&self) -> History {
        let snapshot = self.snapshot.borrow();
        let mut history = (*snapshot.history).clone();
        history.merge(snapshot.day, snapshot.today);
        history
    }

    /// Waits until the counts change. Fails once the counter has shut down.
    pub async fn changed(&mut self) -> Result<DayCounts> {
        self.snapshot.changed().await?;
        Ok(self.snapshot.borrow_and_update().today)
    }

    /// Starts the shutdown sequence: stop listening, flush, wait for the write.
    pub fn request_shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub async fn shutdown_requested(&self) {
        self.shutdown.cancelled().await
    }
}
