use anyhow::Result;

use crate::daemon::collection::event::InputEvent;

/// Represents an event processor. [ProcessingModule](super::ProcessingModule) feeds it one event at
/// a time from a single task, which is what keeps the aggregation state single-writer.
pub trait EventProcessor {
    fn process_next(&mut self, event: InputEvent) -> impl std::future::Future<Output = Result<()>>;

    /// Called once after the last event, before the daemon exits.
    fn finalize(self) -> impl std::future::Future<Output = Result<()>>;
}
