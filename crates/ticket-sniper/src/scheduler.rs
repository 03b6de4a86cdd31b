//! Sale-window scheduler.
//!
//! Waits until the sale opens in three phases:
//! - a single coarse sleep until `PREPARE_WINDOW` before the sale,
//! - a 1 Hz countdown that refreshes the page so server-rendered sale state
//!   stays current,
//! - a tight poll that crosses the sale instant with minimal overshoot.

pub use crate::clock::{Clock, SystemClock};

use crate::driver::PageDriver;
use chrono::{DateTime, Local};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long before the sale the countdown phase begins.
pub const PREPARE_WINDOW: Duration = Duration::from_secs(10);

/// Spacing of countdown refreshes.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Sleep between clock checks in the final poll.
pub const BUSY_POLL: Duration = Duration::from_millis(10);

/// The instant at which restricted inventory becomes purchasable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaleWindow {
    target: DateTime<Local>,
}

impl SaleWindow {
    pub fn new(target: DateTime<Local>) -> Self {
        Self { target }
    }

    pub fn target(&self) -> DateTime<Local> {
        self.target
    }

    /// Time left until the sale opens, or `None` once it is open.
    pub fn remaining(&self, now: DateTime<Local>) -> Option<Duration> {
        if now >= self.target {
            return None;
        }
        (self.target - now).to_std().ok()
    }
}

/// Aligns the start of acquisition with a sale window.
pub struct SaleWindowScheduler {
    clock: Arc<dyn Clock>,
}

impl SaleWindowScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Block until `window` opens. Never fails; refresh errors are logged.
    ///
    /// Countdown ticks are anchored to absolute deadlines measured back from
    /// the sale instant, so refresh latency does not accumulate.
    pub async fn await_sale_window(&self, window: &SaleWindow, driver: &mut dyn PageDriver) {
        let Some(remaining) = window.remaining(self.clock.now()) else {
            info!("sale window already open, starting immediately");
            return;
        };

        info!(
            "{:.2}s until sale opens at {}, waiting",
            remaining.as_secs_f64(),
            window.target().format("%Y-%m-%d %H:%M:%S")
        );

        if remaining > PREPARE_WINDOW {
            self.clock.sleep(remaining - PREPARE_WINDOW).await;
            info!("entering final {}s countdown", PREPARE_WINDOW.as_secs());
        }

        let countdown = remaining.min(PREPARE_WINDOW);
        let ticks = countdown.as_secs();
        let countdown_start = window.target() - to_chrono(countdown);

        for tick in 1..=ticks {
            let deadline = countdown_start + to_chrono(REFRESH_INTERVAL * tick as u32);
            let wait = (deadline - self.clock.now())
                .to_std()
                .unwrap_or(Duration::ZERO);
            self.clock.sleep(wait).await;

            info!("countdown: {}s", ticks - tick + 1);
            if let Err(e) = driver.refresh().await {
                warn!("countdown refresh failed: {e}");
            }
        }

        let mut polls = 0u64;
        while self.clock.now() < window.target() {
            self.clock.sleep(BUSY_POLL).await;
            polls += 1;
        }
        debug!("crossed sale instant after {polls} polls");

        info!("sale window open, starting acquisition");
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_remaining_before_and_after_target() {
        let target = Local.with_ymd_and_hms(2026, 5, 20, 12, 0, 0).unwrap();
        let window = SaleWindow::new(target);

        let before = target - chrono::Duration::milliseconds(2500);
        assert_eq!(window.remaining(before), Some(Duration::from_millis(2500)));
        assert_eq!(window.remaining(target), None);
        assert_eq!(window.remaining(target + chrono::Duration::seconds(1)), None);
    }
}
