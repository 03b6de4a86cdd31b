//! Acquisition orchestrator.
//!
//! Owns the page driver for the whole run and drives:
//! login → listing → sale window → bounded attempt loop → disposal.
//! Attempts are strictly sequential; the driver is only ever lent out as a
//! single `&mut` borrow.

use crate::audit::AttemptLog;
use crate::clock::Clock;
use crate::driver::{DriverError, PageDriver};
use crate::outcome::{AcquisitionOutcome, AttemptResult, FailureReason};
use crate::pipeline::AttemptRunner;
use crate::scheduler::{SaleWindow, SaleWindowScheduler};
use crate::session::SessionEstablisher;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Default pause after the between-attempt refresh.
pub const DEFAULT_RETRY_PAUSE: Duration = Duration::from_secs(1);

/// Default time the browser stays open after the run.
pub const DEFAULT_HOLD_OPEN: Duration = Duration::from_secs(60);

/// What happens to the browser once the run is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisposalPolicy {
    /// Keep the browser open for inspection (or to pay), then close it.
    HoldOpen(Duration),
    /// Close the browser right away.
    Release,
}

/// Everything the orchestrator needs to know about one run.
#[derive(Debug, Clone)]
pub struct AcquisitionPlan {
    pub target_url: String,
    /// Selector present once the listing has loaded.
    pub listing_ready: String,
    pub listing_timeout: Duration,
    pub sale_window: Option<SaleWindow>,
    pub retry_limit: u32,
    pub retry_pause: Duration,
    pub disposal: DisposalPolicy,
}

/// Composes login, scheduler and pipeline into one bounded run.
pub struct AcquisitionOrchestrator {
    driver: Box<dyn PageDriver>,
    login: Box<dyn SessionEstablisher>,
    runner: Box<dyn AttemptRunner>,
    clock: Arc<dyn Clock>,
    attempt_log: Option<AttemptLog>,
}

impl AcquisitionOrchestrator {
    pub fn new(
        driver: Box<dyn PageDriver>,
        login: Box<dyn SessionEstablisher>,
        runner: Box<dyn AttemptRunner>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            driver,
            login,
            runner,
            clock,
            attempt_log: None,
        }
    }

    pub fn with_attempt_log(mut self, log: AttemptLog) -> Self {
        self.attempt_log = Some(log);
        self
    }

    /// Execute the run. The driver is disposed of on every path.
    pub async fn run(mut self, plan: &AcquisitionPlan) -> AcquisitionOutcome {
        let outcome = self.acquire(plan).await;
        self.dispose(plan.disposal).await;
        outcome
    }

    /// Pursue the ticket and record the terminal outcome, leaving the
    /// browser open. Pair with [`release`](Self::release).
    pub async fn acquire(&mut self, plan: &AcquisitionPlan) -> AcquisitionOutcome {
        let outcome = self.pursue(plan).await;

        match &outcome {
            AcquisitionOutcome::Acquired { attempts } => {
                info!("ticket acquired on attempt {attempts}, finish payment in the browser")
            }
            AcquisitionOutcome::ExhaustedRetries { attempts } => {
                warn!("no ticket after {attempts} attempts")
            }
            AcquisitionOutcome::AbortedFatal { reason } => error!("run aborted: {reason}"),
        }
        if let Some(log) = self.attempt_log.as_mut() {
            if let Err(e) = log.record_outcome(&outcome) {
                warn!("failed to write attempt log: {e}");
            }
        }
        outcome
    }

    /// Close the browser.
    pub async fn release(&mut self) {
        if let Err(e) = self.driver.close().await {
            warn!("failed to close browser: {e}");
        }
    }

    async fn pursue(&mut self, plan: &AcquisitionPlan) -> AcquisitionOutcome {
        if let Err(e) = self.login.establish(self.driver.as_mut()).await {
            return AcquisitionOutcome::AbortedFatal {
                reason: FailureReason::LoginFailed(e.to_string()),
            };
        }

        if let Err(e) = self.open_listing(plan).await {
            let reason = if e.is_session_loss() {
                FailureReason::SessionLost(e.to_string())
            } else {
                FailureReason::ListingUnavailable(e.to_string())
            };
            return AcquisitionOutcome::AbortedFatal { reason };
        }

        if let Some(window) = &plan.sale_window {
            SaleWindowScheduler::new(Arc::clone(&self.clock))
                .await_sale_window(window, self.driver.as_mut())
                .await;
        }

        for attempt in 1..=plan.retry_limit {
            info!("attempt {attempt}/{}", plan.retry_limit);

            if attempt > 1 {
                if let Err(e) = self.driver.refresh().await {
                    if e.is_session_loss() {
                        return AcquisitionOutcome::AbortedFatal {
                            reason: FailureReason::SessionLost(e.to_string()),
                        };
                    }
                    warn!("refresh before retry failed: {e}");
                }
                self.clock.sleep(plan.retry_pause).await;
            }

            let started = Instant::now();
            let result = self.runner.attempt(self.driver.as_mut(), attempt).await;
            self.record_attempt(attempt, started.elapsed(), &result);

            match result {
                AttemptResult::Success => {
                    return AcquisitionOutcome::Acquired { attempts: attempt }
                }
                AttemptResult::Retryable(reason) => {
                    warn!("attempt {attempt} failed: {reason}");
                }
                AttemptResult::Fatal(reason) => {
                    return AcquisitionOutcome::AbortedFatal { reason };
                }
            }
        }

        AcquisitionOutcome::ExhaustedRetries {
            attempts: plan.retry_limit,
        }
    }

    async fn open_listing(&mut self, plan: &AcquisitionPlan) -> Result<(), DriverError> {
        info!("opening listing {}", plan.target_url);
        self.driver.navigate(&plan.target_url).await?;
        self.driver
            .wait_for_element(&plan.listing_ready, plan.listing_timeout)
            .await?;
        info!("listing loaded");
        Ok(())
    }

    fn record_attempt(&mut self, attempt: u32, elapsed: Duration, result: &AttemptResult) {
        if let Some(log) = self.attempt_log.as_mut() {
            if let Err(e) = log.record_attempt(attempt, elapsed.as_millis() as u64, result) {
                warn!("failed to write attempt log: {e}");
            }
        }
    }

    async fn dispose(&mut self, policy: DisposalPolicy) {
        if let DisposalPolicy::HoldOpen(hold) = policy {
            info!("keeping browser open for {}s", hold.as_secs());
            self.clock.sleep(hold).await;
        }
        self.release().await;
    }
}
