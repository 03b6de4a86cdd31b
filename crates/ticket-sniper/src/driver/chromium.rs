//! Chromium-based page driver using chromiumoxide.

use super::{DriverError, DriverResult, ElementHandle, PageDriver, StoredCookie};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Interval between element lookups while waiting.
const WAIT_POLL: Duration = Duration::from_millis(100);

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. SNIPER_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("SNIPER_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.ticket-sniper/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            let app = "Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing";
            vec![
                home.join(".ticket-sniper/chromium/chrome-mac-arm64").join(app),
                home.join(".ticket-sniper/chromium/chrome-mac-x64").join(app),
                home.join(".ticket-sniper/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".ticket-sniper/chromium/chrome-linux64/chrome"),
                home.join(".ticket-sniper/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// How the browser process is launched.
#[derive(Debug, Clone, Default)]
pub struct BrowserOptions {
    /// Show the browser window instead of running headless.
    pub show_browser: bool,
    /// Persistent Chromium profile directory (keeps cookies across runs).
    pub user_data_dir: Option<PathBuf>,
}

/// Page driver backed by a single Chromium tab.
pub struct ChromiumDriver {
    browser: Browser,
    page: Option<Page>,
    handler_task: JoinHandle<()>,
    elements: HashMap<u64, Element>,
    next_id: u64,
}

impl ChromiumDriver {
    /// Launch Chromium and open a blank tab.
    pub async fn launch(options: &BrowserOptions) -> Result<Self> {
        let chrome_path = find_chromium()
            .context("Chromium not found. Set SNIPER_CHROMIUM_PATH or install Chrome.")?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg(format!("--user-agent={USER_AGENT}"))
            .window_size(1440, 900);

        if options.show_browser {
            builder = builder.with_head();
        }
        if let Some(dir) = &options.user_data_dir {
            builder = builder.user_data_dir(dir);
        }

        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        Ok(Self {
            browser,
            page: Some(page),
            handler_task,
            elements: HashMap::new(),
            next_id: 0,
        })
    }

    fn page(&self) -> DriverResult<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| DriverError::Closed("page already closed".into()))
    }

    fn element(&self, handle: ElementHandle) -> DriverResult<&Element> {
        self.elements
            .get(&handle.id())
            .ok_or(DriverError::StaleElement(handle))
    }

    fn register(&mut self, element: Element) -> ElementHandle {
        self.next_id += 1;
        self.elements.insert(self.next_id, element);
        ElementHandle::new(self.next_id)
    }
}

fn map_cdp(err: CdpError, selector: Option<&str>) -> DriverError {
    match err {
        CdpError::NotFound => DriverError::NotFound(selector.unwrap_or("<element>").to_string()),
        CdpError::ChannelSendError(e) => DriverError::Closed(e.to_string()),
        CdpError::NoResponse => DriverError::Closed("no response from browser".into()),
        CdpError::Ws(e) => DriverError::Closed(e.to_string()),
        other => DriverError::Protocol(other.to_string()),
    }
}

#[async_trait]
impl PageDriver for ChromiumDriver {
    async fn navigate(&mut self, url: &str) -> DriverResult<()> {
        self.elements.clear();
        let page = self.page()?;
        page.goto(url)
            .await
            .map_err(|e| match map_cdp(e, None) {
                DriverError::Protocol(msg) | DriverError::NotFound(msg) => {
                    DriverError::Navigation(msg)
                }
                other => other,
            })?;
        Ok(())
    }

    async fn wait_for_element(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> DriverResult<ElementHandle> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.find_element(selector).await {
                Ok(handle) => return Ok(handle),
                Err(e) if e.is_session_loss() => return Err(e),
                Err(_) => {}
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(DriverError::Timeout {
                    selector: selector.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(WAIT_POLL).await;
        }
    }

    async fn find_element(&mut self, selector: &str) -> DriverResult<ElementHandle> {
        let element = self
            .page()?
            .find_element(selector)
            .await
            .map_err(|e| map_cdp(e, Some(selector)))?;
        Ok(self.register(element))
    }

    async fn find_within(
        &mut self,
        parent: ElementHandle,
        selector: &str,
    ) -> DriverResult<ElementHandle> {
        let element = self
            .element(parent)?
            .find_element(selector)
            .await
            .map_err(|e| map_cdp(e, Some(selector)))?;
        Ok(self.register(element))
    }

    async fn list_elements(&mut self, selector: &str) -> DriverResult<Vec<ElementHandle>> {
        let found = self
            .page()?
            .find_elements(selector)
            .await
            .map_err(|e| map_cdp(e, Some(selector)))?;
        Ok(found.into_iter().map(|el| self.register(el)).collect())
    }

    async fn click(&mut self, element: ElementHandle) -> DriverResult<()> {
        self.element(element)?
            .click()
            .await
            .map_err(|e| map_cdp(e, None))?;
        Ok(())
    }

    async fn read_text(&mut self, element: ElementHandle) -> DriverResult<String> {
        let text = self
            .element(element)?
            .inner_text()
            .await
            .map_err(|e| map_cdp(e, None))?;
        Ok(text.unwrap_or_default())
    }

    async fn is_checked(&mut self, element: ElementHandle) -> DriverResult<bool> {
        let value = self
            .element(element)?
            .property("checked")
            .await
            .map_err(|e| map_cdp(e, None))?;
        Ok(value.and_then(|v| v.as_bool()).unwrap_or(false))
    }

    async fn type_text(&mut self, element: ElementHandle, text: &str) -> DriverResult<()> {
        let el = self.element(element)?;
        el.click().await.map_err(|e| map_cdp(e, None))?;
        el.type_str(text).await.map_err(|e| map_cdp(e, None))?;
        Ok(())
    }

    async fn refresh(&mut self) -> DriverResult<()> {
        self.elements.clear();
        self.page()?.reload().await.map_err(|e| map_cdp(e, None))?;
        Ok(())
    }

    async fn current_url(&mut self) -> DriverResult<String> {
        let url = self
            .page()?
            .url()
            .await
            .map_err(|e| map_cdp(e, None))?
            .unwrap_or_default();
        Ok(url)
    }

    async fn cookies(&mut self) -> DriverResult<Vec<StoredCookie>> {
        let cookies = self
            .page()?
            .get_cookies()
            .await
            .map_err(|e| map_cdp(e, None))?;
        Ok(cookies
            .into_iter()
            .map(|c| StoredCookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
                path: c.path,
                secure: c.secure,
                http_only: c.http_only,
            })
            .collect())
    }

    async fn set_cookies(&mut self, cookies: Vec<StoredCookie>) -> DriverResult<()> {
        let mut params = Vec::with_capacity(cookies.len());
        for c in cookies {
            let param = CookieParam::builder()
                .name(c.name)
                .value(c.value)
                .domain(c.domain)
                .path(c.path)
                .secure(c.secure)
                .http_only(c.http_only)
                .build()
                .map_err(DriverError::Protocol)?;
            params.push(param);
        }
        self.page()?
            .set_cookies(params)
            .await
            .map_err(|e| map_cdp(e, None))?;
        Ok(())
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.elements.clear();
        let page_closed = match self.page.take() {
            Some(page) => page.close().await.map_err(|e| map_cdp(e, None)),
            None => Ok(()),
        };
        let browser_closed = self
            .browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| map_cdp(e, None));
        // Only reap the process once it has been asked to exit.
        let exited = match &browser_closed {
            Ok(()) => self
                .browser
                .wait()
                .await
                .map(|_| ())
                .map_err(|e| DriverError::Protocol(format!("browser did not exit: {e}"))),
            Err(_) => Ok(()),
        };
        self.handler_task.abort();
        page_closed.and(browser_closed).and(exited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lost_connection_maps_to_session_loss() {
        assert!(map_cdp(CdpError::NoResponse, None).is_session_loss());
        assert!(matches!(
            map_cdp(CdpError::NotFound, Some(".buy-btn")),
            DriverError::NotFound(sel) if sel == ".buy-btn"
        ));
        assert!(matches!(
            map_cdp(CdpError::msg("Invalid cookie fields"), None),
            DriverError::Protocol(_)
        ));
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_lists_and_reads_elements() {
        let mut driver = ChromiumDriver::launch(&BrowserOptions::default())
            .await
            .expect("failed to launch browser");

        driver
            .navigate(
                "data:text/html,<div class='sku'>VIP 1280</div><div class='sku'>GA 已售罄</div>",
            )
            .await
            .expect("navigation failed");

        let skus = driver.list_elements(".sku").await.expect("list failed");
        assert_eq!(skus.len(), 2);
        let first = driver.read_text(skus[0]).await.expect("read failed");
        assert!(first.contains("VIP"));

        driver.refresh().await.expect("refresh failed");
        assert!(matches!(
            driver.read_text(skus[0]).await,
            Err(DriverError::StaleElement(_))
        ));

        driver.close().await.expect("close failed");
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_wait_times_out() {
        let mut driver = ChromiumDriver::launch(&BrowserOptions::default())
            .await
            .expect("failed to launch browser");
        driver
            .navigate("data:text/html,<p>empty</p>")
            .await
            .expect("navigation failed");

        let result = driver
            .wait_for_element(".buy-btn", Duration::from_millis(300))
            .await;
        assert!(matches!(result, Err(DriverError::Timeout { .. })));

        driver.close().await.expect("close failed");
    }
}
