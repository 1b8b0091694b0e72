use std::{num::NonZeroU32, sync::Arc};

use anyhow::Result;
use tracing::debug;

use crate::daemon::storage::{
    entities::History,
    save_worker::{SaveOutcome, SaveQueue},
};

use super::aggregation::AggregationState;

/// Flush after this many events unless configured otherwise.
pub const DEFAULT_FLUSH_EVERY: NonZeroU32 = match NonZeroU32::new(25) {
    Some(v) => v,
    None => unreachable!(),
};

/// Decides when enough events piled up to be worth a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
    every: NonZeroU32,
}

impl FlushPolicy {
    pub fn every(events: NonZeroU32) -> Self {
        Self { every: events }
    }

    pub fn is_due(&self, pending: u64) -> bool {
        pending >= u64::from(self.every.get())
    }
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self::every(DEFAULT_FLUSH_EVERY)
    }
}

/// Tracks events since the last flush and hands snapshots to the save worker. Flushing never waits
/// for the disk.
pub struct PersistenceScheduler {
    policy: FlushPolicy,
    pending: u64,
    queue: SaveQueue,
    last_generation: u64,
}

impl PersistenceScheduler {
    pub fn new(policy: FlushPolicy, queue: SaveQueue) -> Self {
        Self {
            policy,
            pending: 0,
            queue,
            last_generation: 0,
        }
    }

    pub fn record_event(&mut self) {
        self.pending += 1;
    }

    /// Events observed since the last flush.
    pub fn pending(&self) -> u64 {
        self.pending
    }

    /// Flushes if the policy says enough events are pending. Returns whether it did.
    pub fn maybe_flush(&mut self, state: &AggregationState, history: &mut Arc<History>) -> bool {
        if !self.policy.is_due(self.pending) {
            return false;
        }
        self.flush(state, history);
        true
    }

    /// Merges the working copy into `history` and queues the result for writing, regardless of
    /// how many events are pending.
    pub fn flush(&mut self, state: &AggregationState, history: &mut Arc<History>) -> u64 {
        state.merge_into(Arc::make_mut(history));
        self.last_generation = self.queue.submit(history.clone());
        debug!(
            "Queued snapshot {} after {} events",
            self.last_generation, self.pending
        );
        self.pending = 0;
        self.last_generation
    }

    /// Waits for the most recent flush to reach the disk or fail.
    pub async fn wait_flushed(&self) -> SaveOutcome {
        self.queue.wait_settled(self.last_generation).await
    }

    pub async fn close(self) -> Result<SaveOutcome> {
        self.queue.close().await
    }
}
