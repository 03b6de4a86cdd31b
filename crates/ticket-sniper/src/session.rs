//! Session establishment: login, with a stored-cookie short-circuit.
//!
//! A run starts by reusing cookies saved by an earlier run. When those are
//! missing or expired, the user logs in either by hand in the visible browser
//! or with configured credentials, and the fresh cookies are saved for next time.

use crate::driver::{DriverError, PageDriver, StoredCookie};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// How long a human gets to finish logging in.
pub const MANUAL_LOGIN_TIMEOUT: Duration = Duration::from_secs(300);

/// How long an automated credential login may take.
pub const CREDENTIAL_LOGIN_TIMEOUT: Duration = Duration::from_secs(30);

/// How long to look for the logged-in marker after restoring cookies.
pub const RESTORE_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

const SWITCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Login errors.
#[derive(thiserror::Error, Debug)]
pub enum LoginError {
    #[error("login not completed within {0}s")]
    Timeout(u64),

    #[error("credential login selected but username or password is missing")]
    MissingCredentials,

    #[error("browser error during login: {0}")]
    Driver(#[from] DriverError),

    #[error("cookie store error: {0}")]
    CookieStore(String),
}

/// How the session came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// Cookies from an earlier run were still valid.
    Restored,
    /// A new login just completed.
    Fresh,
}

/// Establishes a logged-in session on the page before acquisition starts.
#[async_trait]
pub trait SessionEstablisher: Send {
    async fn establish(&mut self, driver: &mut dyn PageDriver) -> Result<SessionKind, LoginError>;
}

/// How a fresh login is performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginMode {
    /// Wait while a human logs in through the browser window.
    Manual,
    /// Fill in the account form automatically.
    Credentials { username: String, password: String },
}

/// Login page selectors and URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginLayout {
    pub login_url: String,
    pub home_url: String,
    /// Rendered only for a logged-in user.
    pub logged_in_marker: String,
    pub account_login_switch: String,
    pub username_input: String,
    pub password_input: String,
    pub submit_button: String,
}

impl Default for LoginLayout {
    fn default() -> Self {
        Self {
            login_url: "https://passport.damai.cn/login".into(),
            home_url: "https://www.damai.cn/".into(),
            logged_in_marker: ".user-header".into(),
            account_login_switch: ".account-login".into(),
            username_input: "#fm-login-id".into(),
            password_input: "#fm-login-password".into(),
            submit_button: ".fm-btn".into(),
        }
    }
}

/// JSON file of cookies persisted between runs.
#[derive(Debug, Clone)]
pub struct CookieStore {
    path: PathBuf,
}

impl CookieStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load stored cookies. A missing file is not an error.
    pub fn load(&self) -> Result<Option<Vec<StoredCookie>>, LoginError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&self.path).map_err(|e| {
            LoginError::CookieStore(format!("failed to read {}: {e}", self.path.display()))
        })?;
        let cookies = serde_json::from_str(&data).map_err(|e| {
            LoginError::CookieStore(format!("failed to parse {}: {e}", self.path.display()))
        })?;
        Ok(Some(cookies))
    }

    pub fn save(&self, cookies: &[StoredCookie]) -> Result<(), LoginError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| LoginError::CookieStore(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(cookies)
            .map_err(|e| LoginError::CookieStore(e.to_string()))?;
        std::fs::write(&self.path, json).map_err(|e| {
            LoginError::CookieStore(format!("failed to write {}: {e}", self.path.display()))
        })
    }
}

/// Login against the platform's passport pages.
pub struct PlatformLogin {
    layout: LoginLayout,
    mode: LoginMode,
    cookie_store: Option<CookieStore>,
    save_cookies: bool,
    manual_timeout: Duration,
    credential_timeout: Duration,
}

impl PlatformLogin {
    pub fn new(layout: LoginLayout, mode: LoginMode) -> Self {
        Self {
            layout,
            mode,
            cookie_store: None,
            save_cookies: false,
            manual_timeout: MANUAL_LOGIN_TIMEOUT,
            credential_timeout: CREDENTIAL_LOGIN_TIMEOUT,
        }
    }

    /// Restore from and (when `save` is set) write back to `store`.
    pub fn with_cookie_store(mut self, store: CookieStore, save: bool) -> Self {
        self.cookie_store = Some(store);
        self.save_cookies = save;
        self
    }

    pub fn with_timeouts(mut self, manual: Duration, credentials: Duration) -> Self {
        self.manual_timeout = manual;
        self.credential_timeout = credentials;
        self
    }

    async fn try_restore(&self, driver: &mut dyn PageDriver) -> Result<bool, LoginError> {
        let Some(store) = &self.cookie_store else {
            return Ok(false);
        };
        let cookies = match store.load() {
            Ok(Some(cookies)) if !cookies.is_empty() => cookies,
            Ok(_) => return Ok(false),
            Err(e) => {
                warn!("ignoring unreadable cookie file: {e}");
                return Ok(false);
            }
        };

        info!(
            "restoring {} cookies from {}",
            cookies.len(),
            store.path().display()
        );
        let restored = match driver.set_cookies(cookies).await {
            Ok(()) => driver.navigate(&self.layout.home_url).await,
            Err(e) => Err(e),
        };
        match restored {
            Ok(()) => {}
            Err(e) if e.is_session_loss() => return Err(e.into()),
            Err(e) => {
                warn!("could not restore stored session, logging in again: {e}");
                return Ok(false);
            }
        }

        match driver
            .wait_for_element(&self.layout.logged_in_marker, RESTORE_CHECK_TIMEOUT)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.is_session_loss() => Err(e.into()),
            Err(_) => {
                info!("stored session has expired, logging in again");
                Ok(false)
            }
        }
    }

    async fn login_manually(&self, driver: &mut dyn PageDriver) -> Result<(), LoginError> {
        info!("complete the login in the browser window");
        self.wait_logged_in(driver, self.manual_timeout).await
    }

    async fn login_with_credentials(
        &self,
        driver: &mut dyn PageDriver,
        username: &str,
        password: &str,
    ) -> Result<(), LoginError> {
        if username.is_empty() || password.is_empty() {
            return Err(LoginError::MissingCredentials);
        }
        let layout = &self.layout;

        let switch = driver
            .wait_for_element(&layout.account_login_switch, SWITCH_TIMEOUT)
            .await?;
        driver.click(switch).await?;

        let user_input = driver.find_element(&layout.username_input).await?;
        driver.type_text(user_input, username).await?;
        let pass_input = driver.find_element(&layout.password_input).await?;
        driver.type_text(pass_input, password).await?;

        let submit = driver.find_element(&layout.submit_button).await?;
        driver.click(submit).await?;

        self.wait_logged_in(driver, self.credential_timeout).await
    }

    async fn wait_logged_in(
        &self,
        driver: &mut dyn PageDriver,
        timeout: Duration,
    ) -> Result<(), LoginError> {
        match driver
            .wait_for_element(&self.layout.logged_in_marker, timeout)
            .await
        {
            Ok(_) => Ok(()),
            Err(DriverError::Timeout { .. }) => Err(LoginError::Timeout(timeout.as_secs())),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, driver: &mut dyn PageDriver) {
        let Some(store) = self.cookie_store.as_ref().filter(|_| self.save_cookies) else {
            return;
        };
        let saved = match driver.cookies().await {
            Ok(cookies) => store.save(&cookies).map(|_| cookies.len()),
            Err(e) => Err(e.into()),
        };
        match saved {
            Ok(n) => info!("saved {n} cookies to {}", store.path().display()),
            Err(e) => warn!("failed to save cookies: {e}"),
        }
    }
}

#[async_trait]
impl SessionEstablisher for PlatformLogin {
    async fn establish(&mut self, driver: &mut dyn PageDriver) -> Result<SessionKind, LoginError> {
        if self.try_restore(driver).await? {
            info!("logged in with stored session");
            return Ok(SessionKind::Restored);
        }

        info!("opening login page");
        driver.navigate(&self.layout.login_url).await?;

        match &self.mode {
            LoginMode::Manual => self.login_manually(driver).await?,
            LoginMode::Credentials { username, password } => {
                self.login_with_credentials(driver, username, password)
                    .await?
            }
        }
        info!("login succeeded");

        self.persist(driver).await;
        Ok(SessionKind::Fresh)
    }
}
