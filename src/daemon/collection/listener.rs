//! Boundary to the OS input hook. The core only needs two things from a hook: a way to push raw
//! events in and a way to tell that the OS switched the hook off. Both live on [InputSink], which
//! the hook receives when it gets armed.

use std::sync::Arc;

use anyhow::Result;
#[cfg(test)]
use mockall::automock;
use tokio::sync::{mpsc, Notify};
use tracing::trace;

use super::{
    classifier::to_input_event,
    event::{InputEvent, RawInputEvent},
};

/// Handle given to the OS hook. Cheap to clone and safe to use from any thread.
#[derive(Clone)]
pub struct InputSink {
    events: mpsc::UnboundedSender<InputEvent>,
    tap_disabled: Arc<Notify>,
}

impl InputSink {
    pub fn new(events: mpsc::UnboundedSender<InputEvent>, tap_disabled: Arc<Notify>) -> Self {
        Self {
            events,
            tap_disabled,
        }
    }

    /// Classifies `raw` and enqueues it for the aggregation owner. Never blocks, so it can be
    /// called straight from the OS callback. Returns whether the event was counted.
    pub fn deliver(&self, raw: RawInputEvent) -> bool {
        let Some(event) = to_input_event(&raw) else {
            trace!("Ignoring {:?}", raw.kind);
            return false;
        };
        // Fails only once processing has shut down, at which point events are no longer wanted.
        self.events.send(event).is_ok()
    }

    /// Called by the hook when the OS disabled it (timeout, user input, or the hook died). The
    /// collector re-arms the hook in response.
    pub fn tap_disabled(&self) {
        self.tap_disabled.notify_one();
    }
}

/// Contract the OS specific hooks must implement.
#[cfg_attr(test, automock)]
pub trait InputListener: Send {
    /// Starts delivering events into `sink`. Calling it on an armed hook re-enables it, which is
    /// how a hook disabled by the OS gets resubscribed.
    fn arm(&mut self, sink: InputSink) -> Result<()>;

    /// Stops delivering events and lets go of the sink.
    fn disarm(&mut self);
}

/// Serves as a cross-compatible InputListener implementation.
pub struct GenericInputListener {
    inner: Box<dyn InputListener>,
}

impl GenericInputListener {
    pub fn new() -> Result<Self> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "rdev")] {
                use super::rdev_listener::RdevListener;
                Ok(Self {
                    inner: Box::new(RdevListener::new()),
                })
            }
            else {
                Err(anyhow::anyhow!(
                    "keytally was built without an input hook, enable the `rdev` feature"
                ))
            }
        }
    }
}

impl InputListener for GenericInputListener {
    fn arm(&mut self, sink: InputSink) -> Result<()> {
        self.inner.arm(sink)
    }

    fn disarm(&mut self) {
        self.inner.disarm()
    }
}
