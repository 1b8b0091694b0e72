use anyhow::Result;
use module::EventProcessor;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::collection::event::InputEvent;

pub mod aggregation;
pub mod handle;
pub mod module;
pub mod scheduler;
pub mod tally;

/// Represents the consumer of classified events. This is the single task that owns the counts; the
/// hook only ever enqueues.
pub struct ProcessingModule<Processor> {
    receiver: UnboundedReceiver<InputEvent>,
    processor: Processor,
    shutdown: CancellationToken,
}

impl<P: EventProcessor> ProcessingModule<P> {
    pub fn new(
        receiver: UnboundedReceiver<InputEvent>,
        processor: P,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            receiver,
            processor,
            shutdown,
        }
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    pub async fn run(mut self) -> Result<()> {
        loop {
            tokio::select! {
                biased;
                event = self.receiver.recv() => match event {
                    Some(event) => self.process(event).await,
                    None => break,
                },
                _ = self.shutdown.cancelled() => break,
            }
        }

        // Events already delivered before the shutdown still count.
        self.receiver.close();
        let mut drained = 0usize;
        while let Ok(event) = self.receiver.try_recv() {
            self.process(event).await;
            drained += 1;
        }
        info!("Processing stopped, drained {drained} queued events");

        self.processor.finalize().await
    }

    async fn process(&mut self, event: InputEvent) {
        if let Err(e) = self.processor.process_next(event).await {
            error!("Error processing event {:?}: {e:?}", event);
        }
    }
}
