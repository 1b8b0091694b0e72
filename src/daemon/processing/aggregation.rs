use crate::daemon::{
    collection::event::EventClass,
    storage::entities::{DayCounts, DayKey, History},
};

/// Working copy of the day currently being counted. Only the processing module owns one, so
/// increments need no locking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationState {
    day: DayKey,
    current: DayCounts,
}

impl AggregationState {
    /// Starts counting `day`, continuing from whatever `history` already has for it.
    pub fn start(day: DayKey, history: &History) -> Self {
        Self {
            day,
            current: history.get(day),
        }
    }

    pub fn day(&self) -> DayKey {
        self.day
    }

    pub fn counts(&self) -> DayCounts {
        self.current
    }

    /// Any other day means a rollover, including days before the current one. History is a map
    /// rather than a series, so a clock jumping backwards only switches which entry is counted.
    pub fn is_rollover(&self, day: DayKey) -> bool {
        self.day != day
    }

    pub fn record(&mut self, class: EventClass) {
        self.current.record(class);
    }

    pub fn merge_into(&self, history: &mut History) {
        history.merge(self.day, self.current);
    }

    /// Replaces the state wholesale. The outgoing day must already be merged into `history`.
    pub fn begin_day(&mut self, day: DayKey, history: &History) {
        *self = Self::start(day, history);
    }
}
