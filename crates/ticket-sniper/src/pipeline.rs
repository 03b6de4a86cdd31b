//! Order pipeline: one acquisition attempt as a linear state machine.
//!
//! `SelectingInventory → SettingQuantity → Submitting → AwaitingConfirmation → Done`
//!
//! Any stage can fail instead. Missing elements and timeouts become
//! `Retryable`; only a lost browser session or a bounce to the login page is
//! `Fatal`. A timeout while awaiting confirmation is reported as a failure and
//! the attempt ends there, so a submitted order is never submitted twice
//! within one attempt.

pub use crate::outcome::Stage;

use crate::clock::Clock;
use crate::driver::{self, DriverError, PageDriver};
use crate::layout::{PageLayout, StageTimeouts};
use crate::outcome::{AttemptResult, FailureReason};
use crate::selector::{self, InventoryOption, SelectionPreference};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Platform cap on tickets per order.
pub const DEFAULT_QUANTITY_CAP: u32 = 6;

/// Pause between quantity clicks so client-side debouncing registers each one.
pub const DEFAULT_CLICK_DELAY: Duration = Duration::from_millis(200);

const PAYMENT_POLL: Duration = Duration::from_millis(200);

/// Requested ticket count and the platform's cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantityRequest {
    pub requested: u32,
    pub cap: u32,
}

impl QuantityRequest {
    /// Quantity actually ordered: at least one, at most the cap.
    pub fn effective(&self) -> u32 {
        self.requested.clamp(1, self.cap.max(1))
    }

    /// Increment clicks needed; the control starts at one.
    pub fn increments(&self) -> u32 {
        self.effective() - 1
    }
}

impl Default for QuantityRequest {
    fn default() -> Self {
        Self {
            requested: 1,
            cap: DEFAULT_QUANTITY_CAP,
        }
    }
}

/// Runs a single acquisition attempt against the page.
#[async_trait]
pub trait AttemptRunner: Send {
    /// `attempt` is 1-based.
    async fn attempt(&mut self, driver: &mut dyn PageDriver, attempt: u32) -> AttemptResult;
}

/// How a stage failed.
#[derive(Debug)]
struct StageFailure {
    reason: FailureReason,
    fatal: bool,
}

impl StageFailure {
    fn retry(reason: FailureReason) -> Self {
        Self {
            reason,
            fatal: false,
        }
    }

    /// Map a driver error, escalating to fatal when the browser is gone.
    fn from_driver(err: DriverError, reason: FailureReason) -> Self {
        if err.is_session_loss() {
            return Self {
                reason: FailureReason::SessionLost(err.to_string()),
                fatal: true,
            };
        }
        debug!("driver error: {err}");
        Self::retry(reason)
    }

    fn interaction(stage: Stage, err: DriverError) -> Self {
        let detail = err.to_string();
        Self::from_driver(err, FailureReason::Interaction { stage, detail })
    }
}

type StageResult = Result<Stage, StageFailure>;

/// The order pipeline for one platform layout.
pub struct OrderPipeline {
    layout: PageLayout,
    timeouts: StageTimeouts,
    preference: SelectionPreference,
    quantity: QuantityRequest,
    click_delay: Duration,
    clock: Arc<dyn Clock>,
}

impl OrderPipeline {
    pub fn new(
        layout: PageLayout,
        timeouts: StageTimeouts,
        preference: SelectionPreference,
        quantity: QuantityRequest,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            layout,
            timeouts,
            preference,
            quantity,
            click_delay: DEFAULT_CLICK_DELAY,
            clock,
        }
    }

    pub fn with_click_delay(mut self, delay: Duration) -> Self {
        self.click_delay = delay;
        self
    }

    /// Drive the state machine from `SelectingInventory` until `Done` or a failure.
    pub async fn run(&self, driver: &mut dyn PageDriver) -> AttemptResult {
        let mut stage = Stage::SelectingInventory;
        loop {
            let step = match stage {
                Stage::SelectingInventory => self.select_inventory(driver).await,
                Stage::SettingQuantity => self.set_quantity(driver).await,
                Stage::Submitting => self.submit(driver).await,
                Stage::AwaitingConfirmation => self.await_confirmation(driver).await,
                Stage::Done => return AttemptResult::Success,
            };

            match step {
                Ok(next) => {
                    debug!("stage {stage} → {next}");
                    stage = next;
                }
                Err(failure) => {
                    warn!("failed while {stage}: {}", failure.reason);
                    return self.classify(driver, failure).await;
                }
            }
        }
    }

    /// Escalate a retryable failure when the page shows the login host.
    async fn classify(&self, driver: &mut dyn PageDriver, failure: StageFailure) -> AttemptResult {
        if failure.fatal {
            return AttemptResult::Fatal(failure.reason);
        }
        match driver
            .current_url_contains(&self.layout.login_url_marker)
            .await
        {
            Ok(true) => AttemptResult::Fatal(FailureReason::SessionLost(
                "redirected to login page".into(),
            )),
            Err(e) if e.is_session_loss() => {
                AttemptResult::Fatal(FailureReason::SessionLost(e.to_string()))
            }
            _ => AttemptResult::Retryable(failure.reason),
        }
    }

    async fn select_inventory(&self, driver: &mut dyn PageDriver) -> StageResult {
        let layout = &self.layout;
        driver
            .wait_for_element(&layout.inventory_option, self.timeouts.inventory())
            .await
            .map_err(|e| StageFailure::from_driver(e, FailureReason::InventoryNotRendered))?;

        let handles = driver
            .list_elements(&layout.inventory_option)
            .await
            .map_err(|e| StageFailure::from_driver(e, FailureReason::InventoryNotRendered))?;

        let mut options = Vec::with_capacity(handles.len());
        for handle in handles {
            let text = driver
                .read_text(handle)
                .await
                .map_err(|e| StageFailure::interaction(Stage::SelectingInventory, e))?;
            options.push(InventoryOption::from_text(
                &text,
                &layout.sold_out_marker,
                handle,
            ));
        }

        let chosen = selector::select(&options, &self.preference)
            .ok_or_else(|| StageFailure::retry(FailureReason::NoInventory))?;

        match &self.preference.preferred_label {
            Some(wanted) if !chosen.label.contains(wanted.trim()) => {
                info!("preferred tier `{wanted}` unavailable, falling back to: {}", chosen.label)
            }
            _ => info!("selecting tier: {}", chosen.label),
        }

        driver
            .click(chosen.handle)
            .await
            .map_err(|e| StageFailure::interaction(Stage::SelectingInventory, e))?;
        Ok(Stage::SettingQuantity)
    }

    async fn set_quantity(&self, driver: &mut dyn PageDriver) -> StageResult {
        let control = driver
            .wait_for_element(&self.layout.quantity_control, self.timeouts.quantity())
            .await
            .map_err(|e| StageFailure::from_driver(e, FailureReason::QuantityControlMissing))?;

        let increment = driver
            .find_within(control, &self.layout.quantity_increment)
            .await
            .map_err(|e| StageFailure::from_driver(e, FailureReason::QuantityControlMissing))?;

        for _ in 0..self.quantity.increments() {
            driver
                .click(increment)
                .await
                .map_err(|e| StageFailure::interaction(Stage::SettingQuantity, e))?;
            self.clock.sleep(self.click_delay).await;
        }

        info!("quantity set to {}", self.quantity.effective());
        Ok(Stage::Submitting)
    }

    async fn submit(&self, driver: &mut dyn PageDriver) -> StageResult {
        let layout = &self.layout;
        let buy = driver
            .wait_for_element(&layout.purchase_button, self.timeouts.purchase())
            .await
            .map_err(|e| StageFailure::from_driver(e, FailureReason::PurchaseTriggerMissing))?;
        driver
            .click(buy)
            .await
            .map_err(|e| StageFailure::interaction(Stage::Submitting, e))?;
        info!("purchase button clicked");

        driver
            .wait_for_element(&layout.confirmation_page, self.timeouts.confirmation_page())
            .await
            .map_err(|e| StageFailure::from_driver(e, FailureReason::ConfirmationPageMissing))?;

        self.accept_agreement(driver).await?;

        let submit = driver
            .find_element(&layout.submit_button)
            .await
            .map_err(|e| StageFailure::from_driver(e, FailureReason::SubmitControlMissing))?;
        driver
            .click(submit)
            .await
            .map_err(|e| StageFailure::interaction(Stage::Submitting, e))?;
        info!("order submitted");

        Ok(Stage::AwaitingConfirmation)
    }

    /// Tick the agreement checkbox when the page has one. Absence is fine.
    async fn accept_agreement(&self, driver: &mut dyn PageDriver) -> Result<(), StageFailure> {
        let found = driver.find_element(&self.layout.agreement_checkbox).await;
        let checkbox = match found {
            Ok(handle) => handle,
            Err(e) if e.is_session_loss() => {
                return Err(StageFailure::from_driver(e, FailureReason::SubmitControlMissing))
            }
            Err(_) => {
                debug!("no agreement checkbox on confirmation page");
                return Ok(());
            }
        };

        if driver.is_checked(checkbox).await.unwrap_or(false) {
            return Ok(());
        }
        if let Err(e) = driver.click(checkbox).await {
            if e.is_session_loss() {
                return Err(StageFailure::interaction(Stage::Submitting, e));
            }
            debug!("could not tick agreement checkbox: {e}");
        }
        Ok(())
    }

    async fn await_confirmation(&self, driver: &mut dyn PageDriver) -> StageResult {
        let reached = driver::wait_until_url_contains(
            driver,
            self.clock.as_ref(),
            &self.layout.payment_url_marker,
            self.timeouts.payment(),
            PAYMENT_POLL,
        )
        .await
        .map_err(|e| StageFailure::from_driver(e, FailureReason::NoConfirmation))?;

        if !reached {
            return Err(StageFailure::retry(FailureReason::NoConfirmation));
        }
        info!("payment page reached, complete payment in the browser");
        Ok(Stage::Done)
    }
}

#[async_trait]
impl AttemptRunner for OrderPipeline {
    async fn attempt(&mut self, driver: &mut dyn PageDriver, attempt: u32) -> AttemptResult {
        debug!("pipeline attempt {attempt}");
        self.run(driver).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantity_clamped_to_cap() {
        let q = QuantityRequest {
            requested: 8,
            cap: 6,
        };
        assert_eq!(q.effective(), 6);
        assert_eq!(q.increments(), 5);
    }

    #[test]
    fn test_quantity_floor_is_one() {
        let q = QuantityRequest {
            requested: 0,
            cap: 6,
        };
        assert_eq!(q.effective(), 1);
        assert_eq!(q.increments(), 0);
    }

    #[test]
    fn test_quantity_within_cap_untouched() {
        let q = QuantityRequest {
            requested: 3,
            cap: 6,
        };
        assert_eq!(q.increments(), 2);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::AwaitingConfirmation.to_string(), "awaiting confirmation");
    }
}
