use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

use crate::daemon::{
    collection::event::InputEvent,
    storage::{
        entities::{DayCounts, DayKey, History},
        save_worker::SaveOutcome,
    },
};

use super::{
    aggregation::AggregationState,
    handle::{CounterHandle, CountsSnapshot},
    module::EventProcessor,
    scheduler::PersistenceScheduler,
};

/// Owner of the counts. Applies events one at a time, rolls the day over when an event lands on a
/// different day and publishes a snapshot for readers after every change.
pub struct Tally {
    state: AggregationState,
    history: Arc<History>,
    scheduler: PersistenceScheduler,
    snapshot: watch::Sender<CountsSnapshot>,
}

impl Tally {
    /// Continues counting `today` on top of the loaded `history`.
    pub fn new(today: DayKey, history: History, scheduler: PersistenceScheduler) -> Self {
        let history = Arc::new(history);
        let state = AggregationState::start(today, &history);
        let (snapshot, _) = watch::channel(CountsSnapshot {
            day: state.day(),
            today: state.counts(),
            history: history.clone(),
        });
        Self {
            state,
            history,
            scheduler,
            snapshot,
        }
    }

    pub fn handle(&self, shutdown: CancellationToken) -> CounterHandle {
        CounterHandle::new(self.snapshot.subscribe(), shutdown)
    }

    pub fn current_counts(&self) -> DayCounts {
        self.state.counts()
    }

    /// Applies one classified event. Returns whether a flush was queued.
    pub fn on_input_event(&mut self, event: InputEvent) -> bool {
        let day = DayKey::of(&event.timestamp);
        let rolled_over = self.state.is_rollover(day);
        if rolled_over {
            self.rollover(day);
        }

        self.state.record(event.class);
        self.scheduler.record_event();
        trace!("Counted {:?}, today {:?}", event.class, self.state.counts());

        let flushed = self
            .scheduler
            .maybe_flush(&self.state, &mut self.history);
        self.publish(rolled_over || flushed);
        rolled_over || flushed
    }

    fn rollover(&mut self, day: DayKey) {
        let previous = self.state.day();
        if day < previous {
            warn!("Clock went back from {previous} to {day}, counting into {day}");
        }
        info!(
            "Day changed from {previous} to {day}, {previous} ended with {:?}",
            self.state.counts()
        );

        // The outgoing day is queued for writing before the state moves on.
        self.scheduler.flush(&self.state, &mut self.history);
        self.state.begin_day(day, &self.history);
    }

    fn publish(&self, history_changed: bool) {
        self.snapshot.send_modify(|snapshot| {
            snapshot.day = self.state.day();
            snapshot.today = self.state.counts();
            if history_changed {
                snapshot.history = self.history.clone();
            }
        });
    }

    /// Queues a write of the current counts regardless of the policy.
    pub fn flush(&mut self) -> u64 {
        let generation = self.scheduler.flush(&self.state, &mut self.history);
        self.publish(true);
        generation
    }

    /// Waits for the last queued write to finish.
    pub async fn wait_flushed(&self) -> SaveOutcome {
        self.scheduler.wait_flushed().await
    }
}

impl EventProcessor for Tally {
    async fn process_next(&mut self, event: InputEvent) -> Result<()> {
        self.on_input_event(event);
        Ok(())
    }

    async fn finalize(mut self) -> Result<()> {
        let counts = self.state.counts();
        self.flush();
        let outcome = self.scheduler.close().await?;
        if outcome.succeeded {
            info!("Saved final counts for {}: {counts:?}", self.state.day());
        } else {
            warn!(
                "Final save for {} failed, {counts:?} were not written",
                self.state.day()
            );
        }
        Ok(())
    }
}
