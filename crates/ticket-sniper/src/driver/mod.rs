//! Page automation driver abstraction.
//!
//! Defines the `PageDriver` trait that abstracts over the interactive surface
//! (currently Chromium via chromiumoxide). Every acquisition component talks to
//! the page exclusively through this trait, borrowing it mutably, so at most one
//! caller can drive the page at any moment.

pub mod chromium;

use crate::clock::Clock;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Opaque reference to an element located by the driver.
///
/// Handles are only valid until the next navigation or refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(u64);

impl ElementHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

/// A browser cookie in a driver-neutral, serializable form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

/// Errors raised by a page driver.
#[derive(thiserror::Error, Debug)]
pub enum DriverError {
    #[error("timed out after {timeout_ms}ms waiting for `{selector}`")]
    Timeout { selector: String, timeout_ms: u64 },

    #[error("element not found: `{0}`")]
    NotFound(String),

    #[error("stale element handle {0:?}")]
    StaleElement(ElementHandle),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("browser session closed: {0}")]
    Closed(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl DriverError {
    /// Whether the browser session itself is gone, making further attempts pointless.
    pub fn is_session_loss(&self) -> bool {
        matches!(self, DriverError::Closed(_))
    }
}

pub type DriverResult<T> = Result<T, DriverError>;

/// A single exclusive interactive page.
#[async_trait]
pub trait PageDriver: Send {
    /// Load a URL in the page.
    async fn navigate(&mut self, url: &str) -> DriverResult<()>;

    /// Wait until an element matching `selector` is present, or time out.
    async fn wait_for_element(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> DriverResult<ElementHandle>;

    /// Look up an element without waiting.
    async fn find_element(&mut self, selector: &str) -> DriverResult<ElementHandle>;

    /// Look up an element nested inside `parent`.
    async fn find_within(
        &mut self,
        parent: ElementHandle,
        selector: &str,
    ) -> DriverResult<ElementHandle>;

    /// All elements currently matching `selector`, in document order.
    async fn list_elements(&mut self, selector: &str) -> DriverResult<Vec<ElementHandle>>;

    async fn click(&mut self, element: ElementHandle) -> DriverResult<()>;

    /// Visible text of an element.
    async fn read_text(&mut self, element: ElementHandle) -> DriverResult<String>;

    /// Whether a checkbox-like element is currently checked.
    async fn is_checked(&mut self, element: ElementHandle) -> DriverResult<bool>;

    async fn type_text(&mut self, element: ElementHandle, text: &str) -> DriverResult<()>;

    /// Reload the current page. Invalidates all outstanding handles.
    async fn refresh(&mut self) -> DriverResult<()>;

    async fn current_url(&mut self) -> DriverResult<String>;

    async fn current_url_contains(&mut self, needle: &str) -> DriverResult<bool> {
        Ok(self.current_url().await?.contains(needle))
    }

    async fn cookies(&mut self) -> DriverResult<Vec<StoredCookie>>;

    async fn set_cookies(&mut self, cookies: Vec<StoredCookie>) -> DriverResult<()>;

    /// Release the page and the browser behind it.
    async fn close(&mut self) -> DriverResult<()>;
}

/// Poll the current URL until it contains `needle` or `timeout` elapses.
///
/// Driver errors other than session loss count as "not yet".
pub async fn wait_until_url_contains(
    driver: &mut dyn PageDriver,
    clock: &dyn Clock,
    needle: &str,
    timeout: Duration,
    poll: Duration,
) -> DriverResult<bool> {
    let started = clock.now();
    loop {
        match driver.current_url_contains(needle).await {
            Ok(true) => return Ok(true),
            Ok(false) => {}
            Err(e) if e.is_session_loss() => return Err(e),
            Err(e) => tracing::debug!("url check failed: {e}"),
        }
        if clock.elapsed_since(started) >= timeout {
            return Ok(false);
        }
        clock.sleep(poll).await;
    }
}
