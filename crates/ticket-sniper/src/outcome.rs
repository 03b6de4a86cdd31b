//! Attempt results and terminal outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stages of one pass through the order pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    SelectingInventory,
    SettingQuantity,
    Submitting,
    AwaitingConfirmation,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::SelectingInventory => "selecting inventory",
            Stage::SettingQuantity => "setting quantity",
            Stage::Submitting => "submitting",
            Stage::AwaitingConfirmation => "awaiting confirmation",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Why an attempt (or the whole run) did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// Every tier is sold out or none matches the preference.
    NoInventory,
    /// The tier list never rendered.
    InventoryNotRendered,
    QuantityControlMissing,
    PurchaseTriggerMissing,
    ConfirmationPageMissing,
    SubmitControlMissing,
    /// The order was submitted but the payment page never appeared.
    NoConfirmation,
    /// A click or read on an element that was present failed.
    Interaction { stage: Stage, detail: String },
    /// The browser went away or the page bounced back to login.
    SessionLost(String),
    LoginFailed(String),
    ListingUnavailable(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NoInventory => write!(f, "no available inventory"),
            FailureReason::InventoryNotRendered => write!(f, "inventory list did not render"),
            FailureReason::QuantityControlMissing => write!(f, "quantity control not found"),
            FailureReason::PurchaseTriggerMissing => write!(f, "purchase button not found"),
            FailureReason::ConfirmationPageMissing => {
                write!(f, "order confirmation page did not load")
            }
            FailureReason::SubmitControlMissing => write!(f, "submit button not found"),
            FailureReason::NoConfirmation => write!(f, "payment page did not appear in time"),
            FailureReason::Interaction { stage, detail } => {
                write!(f, "page interaction failed while {stage}: {detail}")
            }
            FailureReason::SessionLost(detail) => write!(f, "session lost: {detail}"),
            FailureReason::LoginFailed(detail) => write!(f, "login failed: {detail}"),
            FailureReason::ListingUnavailable(detail) => {
                write!(f, "listing page unavailable: {detail}")
            }
        }
    }
}

impl FailureReason {
    /// Pipeline stage this failure belongs to. Run-level failures have none.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            FailureReason::NoInventory | FailureReason::InventoryNotRendered => {
                Some(Stage::SelectingInventory)
            }
            FailureReason::QuantityControlMissing => Some(Stage::SettingQuantity),
            FailureReason::PurchaseTriggerMissing
            | FailureReason::ConfirmationPageMissing
            | FailureReason::SubmitControlMissing => Some(Stage::Submitting),
            FailureReason::NoConfirmation => Some(Stage::AwaitingConfirmation),
            FailureReason::Interaction { stage, .. } => Some(*stage),
            FailureReason::SessionLost(_)
            | FailureReason::LoginFailed(_)
            | FailureReason::ListingUnavailable(_) => None,
        }
    }
}

/// Result of one pass through the order pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptResult {
    Success,
    Retryable(FailureReason),
    Fatal(FailureReason),
}

impl AttemptResult {
    pub fn label(&self) -> &'static str {
        match self {
            AttemptResult::Success => "success",
            AttemptResult::Retryable(_) => "retryable",
            AttemptResult::Fatal(_) => "fatal",
        }
    }

    pub fn reason(&self) -> Option<&FailureReason> {
        match self {
            AttemptResult::Success => None,
            AttemptResult::Retryable(r) | AttemptResult::Fatal(r) => Some(r),
        }
    }
}

/// Terminal value of a whole acquisition run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AcquisitionOutcome {
    /// An order reached the payment stage.
    Acquired { attempts: u32 },
    /// Every allowed attempt failed in a retryable way.
    ExhaustedRetries { attempts: u32 },
    AbortedFatal { reason: FailureReason },
}

impl AcquisitionOutcome {
    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            AcquisitionOutcome::Acquired { .. } => 0,
            AcquisitionOutcome::AbortedFatal { .. } => 1,
            AcquisitionOutcome::ExhaustedRetries { .. } => 2,
        }
    }
}

impl fmt::Display for AcquisitionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquisitionOutcome::Acquired { attempts } => {
                write!(f, "acquired after {attempts} attempt(s)")
            }
            AcquisitionOutcome::ExhaustedRetries { attempts } => {
                write!(f, "no ticket after {attempts} attempt(s)")
            }
            AcquisitionOutcome::AbortedFatal { reason } => write!(f, "aborted: {reason}"),
        }
    }
}
