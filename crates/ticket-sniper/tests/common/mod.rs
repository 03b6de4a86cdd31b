//! Shared test doubles: a scripted page, a manual clock and canned collaborators.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use ticket_sniper::clock::Clock;
use ticket_sniper::driver::{DriverError, DriverResult, ElementHandle, PageDriver, StoredCookie};
use ticket_sniper::layout::PageLayout;
use ticket_sniper::outcome::AttemptResult;
use ticket_sniper::pipeline::AttemptRunner;
use ticket_sniper::session::{LoginError, SessionEstablisher, SessionKind};

pub const PAYMENT_URL: &str = "https://pay.damai.cn/order?id=42";
pub const LISTING_URL: &str = "https://detail.damai.cn/item.htm?id=1";

/// What a handle points at.
#[derive(Debug, Clone)]
struct Located {
    selector: String,
    tier: Option<usize>,
}

/// Observable state of the scripted page.
#[derive(Debug, Default)]
pub struct PageState {
    pub url: String,
    /// Selectors that currently match an element.
    pub present: HashSet<String>,
    /// Inventory tier texts, rendered under `layout.inventory_option`.
    pub tiers: Vec<String>,
    /// Selectors whose element reports checked.
    pub checked: HashSet<String>,
    /// Clicking the submit button moves the page to the payment URL.
    pub pay_on_submit: bool,
    /// Selectors that become present once the page is navigated to a URL.
    pub reveal_on_navigate: HashMap<String, Vec<String>>,
    /// Selectors that become present once cookies are set.
    pub reveal_on_cookies: Vec<String>,
    /// Clicking an element matching one of these selectors fails.
    pub failing_clicks: HashSet<String>,
    /// The browser refuses stored cookies (`Network.setCookies` rejects them).
    pub reject_cookies: bool,
    /// Closing reports an error after the page is gone.
    pub fail_close: bool,
    /// Every browser call fails as if the browser had crashed.
    pub disconnected: bool,

    pub clicks: Vec<String>,
    pub clicked_tiers: Vec<usize>,
    pub typed: Vec<(String, String)>,
    pub navigations: Vec<String>,
    pub refreshes: u32,
    pub cookies: Vec<StoredCookie>,
    pub closed: bool,

    handles: HashMap<u64, Located>,
    next_id: u64,
}

impl PageState {
    pub fn clicks_on(&self, selector: &str) -> usize {
        self.clicks.iter().filter(|s| s.as_str() == selector).count()
    }
}

/// A fake page whose state is shared with the test.
pub struct ScriptedPage {
    layout: PageLayout,
    state: Arc<Mutex<PageState>>,
    on_refresh: Option<Box<dyn Fn() + Send + Sync>>,
}

impl ScriptedPage {
    /// A listing page with the given tiers and every control the flow needs.
    pub fn listing(tiers: &[&str]) -> Self {
        let layout = PageLayout::default();
        let mut state = PageState {
            url: LISTING_URL.to_string(),
            tiers: tiers.iter().map(|t| t.to_string()).collect(),
            pay_on_submit: true,
            ..Default::default()
        };
        for sel in [
            &layout.listing_ready,
            &layout.quantity_control,
            &layout.quantity_increment,
            &layout.purchase_button,
            &layout.confirmation_page,
            &layout.submit_button,
        ] {
            state.present.insert(sel.clone());
        }
        Self {
            layout,
            state: Arc::new(Mutex::new(state)),
            on_refresh: None,
        }
    }

    /// An empty page with nothing on it.
    pub fn blank() -> Self {
        Self {
            layout: PageLayout::default(),
            state: Arc::new(Mutex::new(PageState::default())),
            on_refresh: None,
        }
    }

    /// Run `hook` every time the page is reloaded, e.g. to model reload latency.
    pub fn on_refresh(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_refresh = Some(Box::new(hook));
        self
    }

    pub fn state(&self) -> Arc<Mutex<PageState>> {
        Arc::clone(&self.state)
    }

    fn lock(&self) -> DriverResult<std::sync::MutexGuard<'_, PageState>> {
        let state = self.state.lock().unwrap();
        if state.disconnected {
            return Err(DriverError::Closed("browser crashed".into()));
        }
        Ok(state)
    }

    fn locate(&self, selector: &str) -> DriverResult<ElementHandle> {
        let mut state = self.lock()?;
        let matches = if selector == self.layout.inventory_option {
            !state.tiers.is_empty()
        } else {
            state.present.contains(selector)
        };
        if !matches {
            return Err(DriverError::NotFound(selector.to_string()));
        }
        let tier = (selector == self.layout.inventory_option).then_some(0);
        Ok(register(&mut state, selector, tier))
    }
}

fn register(state: &mut PageState, selector: &str, tier: Option<usize>) -> ElementHandle {
    state.next_id += 1;
    let id = state.next_id;
    state.handles.insert(
        id,
        Located {
            selector: selector.to_string(),
            tier,
        },
    );
    ElementHandle::new(id)
}

fn resolve(state: &PageState, handle: ElementHandle) -> DriverResult<Located> {
    state
        .handles
        .get(&handle.id())
        .cloned()
        .ok_or(DriverError::StaleElement(handle))
}

#[async_trait]
impl PageDriver for ScriptedPage {
    async fn navigate(&mut self, url: &str) -> DriverResult<()> {
        let mut state = self.lock()?;
        state.handles.clear();
        state.url = url.to_string();
        state.navigations.push(url.to_string());
        if let Some(reveal) = state.reveal_on_navigate.get(url).cloned() {
            state.present.extend(reveal);
        }
        Ok(())
    }

    async fn wait_for_element(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> DriverResult<ElementHandle> {
        self.locate(selector).map_err(|e| match e {
            DriverError::NotFound(_) => DriverError::Timeout {
                selector: selector.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            },
            other => other,
        })
    }

    async fn find_element(&mut self, selector: &str) -> DriverResult<ElementHandle> {
        self.locate(selector)
    }

    async fn find_within(
        &mut self,
        parent: ElementHandle,
        selector: &str,
    ) -> DriverResult<ElementHandle> {
        {
            let state = self.lock()?;
            resolve(&state, parent)?;
        }
        self.locate(selector)
    }

    async fn list_elements(&mut self, selector: &str) -> DriverResult<Vec<ElementHandle>> {
        let mut state = self.lock()?;
        if selector == self.layout.inventory_option {
            let count = state.tiers.len();
            return Ok((0..count)
                .map(|i| register(&mut state, selector, Some(i)))
                .collect());
        }
        if state.present.contains(selector) {
            return Ok(vec![register(&mut state, selector, None)]);
        }
        Ok(Vec::new())
    }

    async fn click(&mut self, element: ElementHandle) -> DriverResult<()> {
        let mut state = self.lock()?;
        let located = resolve(&state, element)?;
        if state.failing_clicks.contains(&located.selector) {
            return Err(DriverError::Protocol("element is not clickable".into()));
        }
        if let Some(tier) = located.tier {
            state.clicked_tiers.push(tier);
        }
        if located.selector == self.layout.submit_button && state.pay_on_submit {
            state.url = PAYMENT_URL.to_string();
        }
        if state.checked.contains(&located.selector) {
            state.checked.remove(&located.selector);
        } else if located.selector == self.layout.agreement_checkbox {
            state.checked.insert(located.selector.clone());
        }
        state.clicks.push(located.selector);
        Ok(())
    }

    async fn read_text(&mut self, element: ElementHandle) -> DriverResult<String> {
        let state = self.lock()?;
        let located = resolve(&state, element)?;
        Ok(located
            .tier
            .and_then(|i| state.tiers.get(i).cloned())
            .unwrap_or_default())
    }

    async fn is_checked(&mut self, element: ElementHandle) -> DriverResult<bool> {
        let state = self.lock()?;
        let located = resolve(&state, element)?;
        Ok(state.checked.contains(&located.selector))
    }

    async fn type_text(&mut self, element: ElementHandle, text: &str) -> DriverResult<()> {
        let mut state = self.lock()?;
        let located = resolve(&state, element)?;
        state.typed.push((located.selector, text.to_string()));
        Ok(())
    }

    async fn refresh(&mut self) -> DriverResult<()> {
        {
            let mut state = self.lock()?;
            state.handles.clear();
            state.refreshes += 1;
        }
        if let Some(hook) = &self.on_refresh {
            hook();
        }
        Ok(())
    }

    async fn current_url(&mut self) -> DriverResult<String> {
        Ok(self.lock()?.url.clone())
    }

    async fn cookies(&mut self) -> DriverResult<Vec<StoredCookie>> {
        Ok(self.lock()?.cookies.clone())
    }

    async fn set_cookies(&mut self, cookies: Vec<StoredCookie>) -> DriverResult<()> {
        let mut state = self.lock()?;
        if state.reject_cookies {
            return Err(DriverError::Protocol("Invalid cookie fields".into()));
        }
        state.cookies = cookies;
        let reveal = state.reveal_on_cookies.clone();
        state.present.extend(reveal);
        Ok(())
    }

    async fn close(&mut self) -> DriverResult<()> {
        let mut state = self.state.lock().unwrap();
        state.handles.clear();
        state.closed = true;
        if state.fail_close {
            return Err(DriverError::Protocol("browser did not exit".into()));
        }
        Ok(())
    }
}

/// A clock that only moves when slept on.
pub struct ManualClock {
    now: Mutex<DateTime<Local>>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn at(now: DateTime<Local>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(now),
            sleeps: Mutex::new(Vec::new()),
        })
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    /// Move time forward without recording a sleep.
    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += chrono::Duration::from_std(by).unwrap();
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(duration).unwrap();
    }
}

/// A fixed instant used as "now" across tests.
pub fn sale_day() -> DateTime<Local> {
    Local.with_ymd_and_hms(2026, 11, 1, 19, 59, 0).unwrap()
}

/// Replays a fixed list of attempt results and counts calls.
pub struct ScriptedRunner {
    script: VecDeque<AttemptResult>,
    calls: Arc<AtomicU32>,
}

impl ScriptedRunner {
    pub fn new(script: Vec<AttemptResult>) -> (Self, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        (
            Self {
                script: script.into(),
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

#[async_trait]
impl AttemptRunner for ScriptedRunner {
    async fn attempt(&mut self, _driver: &mut dyn PageDriver, attempt: u32) -> AttemptResult {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        assert_eq!(n, attempt, "attempts must be numbered sequentially");
        self.script
            .pop_front()
            .expect("runner called more often than scripted")
    }
}

/// Login that succeeds or fails without touching the page.
pub struct StubLogin {
    pub succeed: bool,
}

#[async_trait]
impl SessionEstablisher for StubLogin {
    async fn establish(&mut self, _driver: &mut dyn PageDriver) -> Result<SessionKind, LoginError> {
        if self.succeed {
            Ok(SessionKind::Restored)
        } else {
            Err(LoginError::Timeout(300))
        }
    }
}
