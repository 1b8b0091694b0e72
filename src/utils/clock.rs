use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};

/// Represents an entity responsible for providing dates across application. Day keys are derived
/// from local time, so this hands out local timestamps. Swapping it allows tests to pin the
/// calendar day and to warp through backoff delays.
#[async_trait]
pub trait Clock: Sync + Send + 'static {
    fn time(&self) -> DateTime<Local>;

    async fn sleep(&self, duration: Duration);
}

#[derive(Clone, Copy)]
pub struct DefaultClock;

#[async_trait]
impl Clock for DefaultClock {
    fn time(&self) -> DateTime<Local> {
        Local::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
