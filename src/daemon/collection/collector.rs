use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use anyhow::Result;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::utils::clock::Clock;

use super::listener::{InputListener, InputSink};

/// Retry schedule for arming the hook. The delay doubles after each failure up to `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            max_attempts: 8,
        }
    }
}

impl Backoff {
    /// Delay after the `attempt`-th consecutive failure, starting at 1.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// Keeps the input hook armed for as long as the daemon runs. Events themselves never pass
/// through here, the hook pushes them into the [InputSink] directly.
///
/// Failing to arm and the OS disabling the hook both count as failures. Every retry waits for
/// [Backoff::delay], and the count only resets once the hook stayed armed for `max_delay`.
pub struct CollectionModule {
    listener: Arc<Mutex<Box<dyn InputListener>>>,
    sink: InputSink,
    tap_disabled: Arc<Notify>,
    shutdown: CancellationToken,
    backoff: Backoff,
    clock: Box<dyn Clock>,
}

enum Disarmed {
    ByOs,
    Cancelled,
}

fn lock(listener: &Mutex<Box<dyn InputListener>>) -> MutexGuard<'_, Box<dyn InputListener>> {
    listener.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CollectionModule {
    pub fn new(
        listener: Box<dyn InputListener>,
        sink: InputSink,
        tap_disabled: Arc<Notify>,
        shutdown: CancellationToken,
        backoff: Backoff,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            listener: Arc::new(Mutex::new(listener)),
            sink,
            tap_disabled,
            shutdown,
            backoff,
            clock,
        }
    }

    /// Creating an OS hook may block, so it happens away from the runtime thread.
    async fn arm(&self) -> Result<()> {
        let listener = self.listener.clone();
        let sink = self.sink.clone();
        tokio::task::spawn_blocking(move || lock(&listener).arm(sink)).await?
    }

    /// Waits until the hook gets disabled or the daemon shuts down. A hook that stays armed for
    /// `max_delay` is considered healthy again.
    async fn stay_armed(&self, failures: &mut u32) -> Disarmed {
        loop {
            tokio::select! {
                biased;
                // Cancelation means we stop accepting events. The processing module drains
                // whatever was already delivered and flushes it.
                _ = self.shutdown.cancelled() => return Disarmed::Cancelled,
                _ = self.tap_disabled.notified() => return Disarmed::ByOs,
                _ = self.clock.sleep(self.backoff.max_delay) => *failures = 0,
            }
        }
    }

    /// Executes the collector event loop.
    pub async fn run(self) -> Result<()> {
        let mut failures = 0u32;
        loop {
            match self.arm().await {
                Ok(()) => {
                    info!("Listening for input");
                    match self.stay_armed(&mut failures).await {
                        Disarmed::Cancelled => break,
                        Disarmed::ByOs => warn!("Input listener was disabled"),
                    }
                }
                Err(e) => warn!("Failed to arm input listener: {e:?}"),
            }

            failures += 1;
            if failures >= self.backoff.max_attempts {
                // Counting stops but the rest of the daemon keeps running.
                error!(
                    "Giving up on the input listener after {failures} failures, input is no longer counted"
                );
                self.shutdown.cancelled().await;
                break;
            }

            let delay = self.backoff.delay(failures);
            info!("Re-arming input listener in {delay:?} (failure {failures})");
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = self.clock.sleep(delay) => (),
            }
        }

        lock(&self.listener).disarm();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicU32, Ordering},
            Arc,
        },
        time::Duration,
    };

    use anyhow::{anyhow, Result};
    use tokio::sync::{mpsc, Notify};
    use tokio_util::sync::CancellationToken;

    use super::{Backoff, CollectionModule};
    use crate::{
        daemon::collection::listener::{InputSink, MockInputListener},
        utils::{clock::DefaultClock, logging::TEST_LOGGING},
    };

    fn module(
        listener: MockInputListener,
        shutdown: &CancellationToken,
    ) -> (CollectionModule, Arc<Notify>) {
        let (sender, _) = mpsc::unbounded_channel();
        let tap_disabled = Arc::new(Notify::new());
        let sink = InputSink::new(sender, tap_disabled.clone());
        let module = CollectionModule::new(
            Box::new(listener),
            sink,
            tap_disabled.clone(),
            shutdown.clone(),
            Backoff::default(),
            Box::new(DefaultClock),
        );
        (module, tap_disabled)
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay(1), Duration::from_secs(2));
        assert_eq!(backoff.delay(2), Duration::from_secs(4));
        assert_eq!(backoff.delay(5), Duration::from_secs(32));
        assert_eq!(backoff.delay(6), Duration::from_secs(60));
        assert_eq!(backoff.delay(100), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_arms_and_disarms_on_shutdown() -> Result<()> {
        *TEST_LOGGING;
        let mut listener = MockInputListener::new();
        listener.expect_arm().times(1).returning(|_| Ok(()));
        listener.expect_disarm().times(1).return_const(());

        let shutdown = CancellationToken::new();
        let (module, _) = module(listener, &shutdown);

        let (result, _) = tokio::join!(module.run(), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            shutdown.cancel();
        });
        result
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_failed_arm_with_backoff() -> Result<()> {
        *TEST_LOGGING;
        let attempts = Arc::new(AtomicU32::new(0));
        let mut listener = MockInputListener::new();
        let counter = attempts.clone();
        listener.expect_arm().times(3).returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(anyhow!("no permission"))
            } else {
                Ok(())
            }
        });
        listener.expect_disarm().return_const(());

        let shutdown = CancellationToken::new();
        let (module, _) = module(listener, &shutdown);
        let started = tokio::time::Instant::now();

        let (result, _) = tokio::join!(module.run(), async {
            // 2s + 4s of backoff before the third attempt succeeds.
            tokio::time::sleep(Duration::from_secs(7)).await;
            shutdown.cancel();
        });
        result?;

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_secs(6));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearms_when_tap_is_disabled() -> Result<()> {
        *TEST_LOGGING;
        let mut listener = MockInputListener::new();
        listener.expect_arm().times(2).returning(|_| Ok(()));
        listener.expect_disarm().times(1).return_const(());

        let shutdown = CancellationToken::new();
        let (module, tap_disabled) = module(listener, &shutdown);

        let (result, _) = tokio::join!(module.run(), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            tap_disabled.notify_one();
            // Re-armed after the first backoff step.
            tokio::time::sleep(Duration::from_secs(3)).await;
            shutdown.cancel();
        });
        result
    }

    #[tokio::test(start_paused = true)]
    async fn test_hook_disabled_right_after_arm_is_bounded() -> Result<()> {
        *TEST_LOGGING;
        let arms = Arc::new(AtomicU32::new(0));
        let mut listener = MockInputListener::new();
        let counter = arms.clone();
        listener.expect_arm().returning(move |sink| {
            counter.fetch_add(1, Ordering::SeqCst);
            sink.tap_disabled();
            Ok(())
        });
        listener.expect_disarm().return_const(());

        let shutdown = CancellationToken::new();
        let (module, _) = module(listener, &shutdown);
        let started = tokio::time::Instant::now();

        let (result, _) = tokio::join!(module.run(), async {
            tokio::time::sleep(Duration::from_secs(60 * 60)).await;
            shutdown.cancel();
        });
        result?;

        assert_eq!(arms.load(Ordering::SeqCst), Backoff::default().max_attempts);
        assert!(started.elapsed() >= Duration::from_secs(60 * 60));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_reset_after_hook_stays_armed() -> Result<()> {
        *TEST_LOGGING;
        let max_attempts = Backoff::default().max_attempts as usize;
        let mut listener = MockInputListener::new();
        listener
            .expect_arm()
            .times(max_attempts + 3)
            .returning(|_| Ok(()));
        listener.expect_disarm().times(1).return_const(());

        let shutdown = CancellationToken::new();
        let (module, tap_disabled) = module(listener, &shutdown);

        let (result, _) = tokio::join!(module.run(), async {
            for _ in 0..max_attempts + 2 {
                // Longer than max_delay plus the 2s re-arm delay.
                tokio::time::sleep(Duration::from_secs(90)).await;
                tap_disabled.notify_one();
            }
            tokio::time::sleep(Duration::from_secs(90)).await;
            shutdown.cancel();
        });
        result
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_but_keeps_running_until_shutdown() -> Result<()> {
        *TEST_LOGGING;
        let mut listener = MockInputListener::new();
        listener
            .expect_arm()
            .times(Backoff::default().max_attempts as usize)
            .returning(|_| Err(anyhow!("no display")));
        listener.expect_disarm().return_const(());

        let shutdown = CancellationToken::new();
        let (module, _) = module(listener, &shutdown);

        let (result, _) = tokio::join!(module.run(), async {
            tokio::time::sleep(Duration::from_secs(60 * 60)).await;
            shutdown.cancel();
        });
        result
    }
}
