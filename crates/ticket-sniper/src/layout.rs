//! Page selectors and stage timeouts for the target platform.
//!
//! Defaults match the Damai event page. Every field can be overridden from
//! the config file when the platform changes its markup.

use crate::selector::DEFAULT_SOLD_OUT_MARKER;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// CSS selectors and URL markers the acquisition flow relies on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageLayout {
    /// Present once the listing page has finished loading.
    pub listing_ready: String,
    /// One element per price tier.
    pub inventory_option: String,
    pub sold_out_marker: String,
    pub quantity_control: String,
    /// Increment button, looked up inside `quantity_control`.
    pub quantity_increment: String,
    pub purchase_button: String,
    /// Present once the order confirmation page has rendered.
    pub confirmation_page: String,
    pub agreement_checkbox: String,
    pub submit_button: String,
    /// URL fragment of the payment stage.
    pub payment_url_marker: String,
    /// URL fragment of the login host; seeing it mid-run means the session is gone.
    pub login_url_marker: String,
}

impl Default for PageLayout {
    fn default() -> Self {
        Self {
            listing_ready: ".perform__order__price".into(),
            inventory_option: ".sku-item-container".into(),
            sold_out_marker: DEFAULT_SOLD_OUT_MARKER.into(),
            quantity_control: ".cafe-c-input-number".into(),
            quantity_increment: ".cafe-c-input-number-handler-up".into(),
            purchase_button: ".buy-btn".into(),
            confirmation_page: ".submit-wrapper".into(),
            agreement_checkbox: ".agree-policy".into(),
            submit_button: ".submit-btn".into(),
            payment_url_marker: "pay.damai.cn".into(),
            login_url_marker: "passport.damai.cn".into(),
        }
    }
}

/// Bounded waits for each stage, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageTimeouts {
    pub listing_ms: u64,
    pub inventory_ms: u64,
    pub quantity_ms: u64,
    pub purchase_ms: u64,
    pub confirmation_page_ms: u64,
    pub payment_ms: u64,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            listing_ms: 15_000,
            inventory_ms: 10_000,
            quantity_ms: 10_000,
            purchase_ms: 10_000,
            confirmation_page_ms: 15_000,
            payment_ms: 15_000,
        }
    }
}

impl StageTimeouts {
    pub fn listing(&self) -> Duration {
        Duration::from_millis(self.listing_ms)
    }

    pub fn inventory(&self) -> Duration {
        Duration::from_millis(self.inventory_ms)
    }

    pub fn quantity(&self) -> Duration {
        Duration::from_millis(self.quantity_ms)
    }

    pub fn purchase(&self) -> Duration {
        Duration::from_millis(self.purchase_ms)
    }

    pub fn confirmation_page(&self) -> Duration {
        Duration::from_millis(self.confirmation_page_ms)
    }

    pub fn payment(&self) -> Duration {
        Duration::from_millis(self.payment_ms)
    }
}
