use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc, Mutex, MutexGuard, PoisonError,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local};
use rdev::{listen, Button, Event, EventType, Key};
use tracing::{error, info};

use super::{
    event::{MouseButton, RawEventKind, RawInputEvent},
    listener::{InputListener, InputSink},
};

/// How long [RdevListener::arm] waits for the hook to fail right away. Failing to create the hook
/// (no display, missing permission) happens within this window.
const STARTUP_GRACE: Duration = Duration::from_millis(250);

/// Guards against a release event that never arrived keeping a key marked as held forever.
const MAX_HELD_KEYS: usize = 32;

/// Global hook backed by `rdev`. rdev reports key repeats as ordinary presses, so repeats are
/// recognized by a press arriving for a key that is still held.
pub struct RdevListener {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Shared {
    sink: Mutex<Option<InputSink>>,
    held: Mutex<Vec<Key>>,
    /// Set by the hook thread once `listen` returned. The thread may still be unwinding when the
    /// collector re-arms, so this is what decides whether a new thread is needed.
    stopped: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RdevListener {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            thread: None,
        }
    }

    fn is_running(&self) -> bool {
        !self.shared.stopped.load(Ordering::Acquire)
            && self
                .thread
                .as_ref()
                .is_some_and(|thread| !thread.is_finished())
    }
}

impl Default for RdevListener {
    fn default() -> Self {
        Self::new()
    }
}

impl Shared {
    fn on_event(&self, event: Event) {
        let kind = match event.event_type {
            EventType::KeyPress(key) => {
                let mut held = lock(&self.held);
                let autorepeat = held.contains(&key);
                if !autorepeat {
                    if held.len() >= MAX_HELD_KEYS {
                        held.clear();
                    }
                    held.push(key);
                }
                RawEventKind::KeyDown { autorepeat }
            }
            EventType::KeyRelease(key) => {
                lock(&self.held).retain(|v| *v != key);
                RawEventKind::KeyUp
            }
            EventType::ButtonPress(button) => RawEventKind::MouseDown(to_mouse_button(button)),
            EventType::ButtonRelease(button) => RawEventKind::MouseUp(to_mouse_button(button)),
            // Mouse moves and wheel events are by far the most frequent, drop them early.
            _ => return,
        };

        let raw = RawInputEvent {
            kind,
            timestamp: DateTime::<Local>::from(event.time),
        };
        if let Some(sink) = lock(&self.sink).as_ref() {
            sink.deliver(raw);
        }
    }
}

fn to_mouse_button(button: Button) -> MouseButton {
    match button {
        Button::Left => MouseButton::Left,
        Button::Right => MouseButton::Right,
        _ => MouseButton::Other,
    }
}

impl InputListener for RdevListener {
    fn arm(&mut self, sink: InputSink) -> Result<()> {
        *lock(&self.shared.sink) = Some(sink);
        if self.is_running() {
            return Ok(());
        }
        // A stopped hook thread is about to exit on its own.
        self.thread.take();
        self.shared.stopped.store(false, Ordering::Release);

        let (failed_sender, failed) = mpsc::channel::<String>();
        let shared = self.shared.clone();
        let thread = thread::Builder::new()
            .name("input-hook".into())
            .spawn(move || {
                let callback_shared = shared.clone();
                let message = match listen(move |event| callback_shared.on_event(event)) {
                    Ok(()) => "listen returned".to_string(),
                    Err(e) => format!("{e:?}"),
                };
                error!("Input hook stopped {message}");
                // Must be visible before the collector hears about it and re-arms.
                shared.stopped.store(true, Ordering::Release);
                if failed_sender.send(message).is_err() {
                    // arm already returned, tell the collector instead.
                    if let Some(sink) = lock(&shared.sink).as_ref() {
                        sink.tap_disabled();
                    }
                }
            })?;

        match failed.recv_timeout(STARTUP_GRACE) {
            Ok(message) => Err(anyhow!("Failed to create the input hook: {message}")),
            Err(_) => {
                info!("Input hook armed");
                self.thread = Some(thread);
                Ok(())
            }
        }
    }

    fn disarm(&mut self) {
        // rdev offers no way to stop `listen`, the thread stays parked and drops everything.
        lock(&self.shared.sink).take();
        lock(&self.shared.held).clear();
        info!("Input hook disarmed");
    }
}
