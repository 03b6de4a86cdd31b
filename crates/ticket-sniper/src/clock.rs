//! Wall-clock time and sleeping behind a trait, so timed loops can be driven
//! by a manual clock in tests.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::time::Duration;

/// Source of wall-clock time and sleeping.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
    async fn sleep(&self, duration: Duration);

    /// Time elapsed since `since`, zero if the clock went backwards.
    fn elapsed_since(&self, since: DateTime<Local>) -> Duration {
        (self.now() - since).to_std().unwrap_or(Duration::ZERO)
    }
}

/// The real clock.
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
