//! Configuration loading and resolution.
//!
//! The config file is JSON with one section per platform:
//!
//! ```json
//! { "damai": { "target_url": "https://detail.damai.cn/item.htm?id=1", "ticket_count": 2 } }
//! ```
//!
//! `SNIPER_USERNAME` and `SNIPER_PASSWORD` override the credentials in the file.

use crate::driver::chromium::BrowserOptions;
use crate::layout::{PageLayout, StageTimeouts};
use crate::orchestrator::{AcquisitionPlan, DisposalPolicy, DEFAULT_HOLD_OPEN, DEFAULT_RETRY_PAUSE};
use crate::pipeline::{QuantityRequest, DEFAULT_CLICK_DELAY, DEFAULT_QUANTITY_CAP};
use crate::scheduler::SaleWindow;
use crate::selector::SelectionPreference;
use crate::session::{LoginLayout, LoginMode};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file name in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Default platform section.
pub const DEFAULT_PLATFORM: &str = "damai";

/// Format of `sale_time` in the config file (local time).
pub const SALE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Configuration errors.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(String),

    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("config has no `{0}` section")]
    MissingSection(String),

    #[error("invalid config: {0}")]
    Validation(String),
}

/// One platform section as written in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub target_url: String,
    #[serde(default)]
    pub sale_time: Option<String>,
    #[serde(default)]
    pub ticket_type: Option<String>,
    #[serde(default = "default_true")]
    pub allow_other_ticket: bool,
    #[serde(default = "default_ticket_count")]
    pub ticket_count: u32,
    #[serde(default = "default_retry_times")]
    pub retry_times: u32,
    #[serde(default = "default_true")]
    pub keep_browser: bool,
    #[serde(default = "default_keep_browser_secs")]
    pub keep_browser_secs: u64,
    #[serde(default)]
    pub show_browser: bool,
    #[serde(default)]
    pub user_data_dir: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub manual_login: bool,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_true")]
    pub save_cookies: bool,
    #[serde(default = "default_cookie_file")]
    pub cookie_file: PathBuf,
    #[serde(default)]
    pub attempt_log: Option<PathBuf>,
    #[serde(default = "default_retry_pause_ms")]
    pub retry_pause_ms: u64,
    #[serde(default = "default_click_delay_ms")]
    pub quantity_click_delay_ms: u64,
    #[serde(default = "default_quantity_cap")]
    pub quantity_cap: u32,
    #[serde(default)]
    pub layout: PageLayout,
    #[serde(default)]
    pub login: LoginLayout,
    #[serde(default)]
    pub timeouts: StageTimeouts,
}

fn default_true() -> bool {
    true
}

fn default_ticket_count() -> u32 {
    1
}

fn default_retry_times() -> u32 {
    10
}

fn default_keep_browser_secs() -> u64 {
    DEFAULT_HOLD_OPEN.as_secs()
}

fn default_cookie_file() -> PathBuf {
    PathBuf::from("damai_cookies.json")
}

fn default_retry_pause_ms() -> u64 {
    DEFAULT_RETRY_PAUSE.as_millis() as u64
}

fn default_click_delay_ms() -> u64 {
    DEFAULT_CLICK_DELAY.as_millis() as u64
}

fn default_quantity_cap() -> u32 {
    DEFAULT_QUANTITY_CAP
}

/// Fully resolved, validated settings for one run.
#[derive(Debug, Clone)]
pub struct SniperSettings {
    pub plan: AcquisitionPlan,
    pub layout: PageLayout,
    pub timeouts: StageTimeouts,
    pub preference: SelectionPreference,
    pub quantity: QuantityRequest,
    pub click_delay: Duration,
    pub login_layout: LoginLayout,
    pub login_mode: LoginMode,
    pub cookie_file: PathBuf,
    pub save_cookies: bool,
    pub browser: BrowserOptions,
    pub attempt_log: Option<PathBuf>,
}

/// Resolve the config path: explicit flag, then `SNIPER_CONFIG`, then `config.json`.
pub fn resolve_config_path(explicit: Option<&str>) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }
    if let Ok(env_path) = std::env::var("SNIPER_CONFIG") {
        return PathBuf::from(env_path);
    }
    PathBuf::from(DEFAULT_CONFIG_FILE)
}

/// Load one platform section from a config file.
pub fn load_config(path: &Path, platform: &str) -> Result<TargetConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }
    let data = std::fs::read_to_string(path)?;
    load_config_from_str(&data, platform)
}

/// Parse one platform section from JSON text.
pub fn load_config_from_str(json: &str, platform: &str) -> Result<TargetConfig, ConfigError> {
    let mut sections: HashMap<String, serde_json::Value> =
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
    let section = sections
        .remove(platform)
        .ok_or_else(|| ConfigError::MissingSection(platform.to_string()))?;
    serde_json::from_value(section).map_err(|e| ConfigError::Parse(format!("{platform}: {e}")))
}

/// Parse a sale time as local `YYYY-MM-DD HH:MM:SS` or RFC 3339.
pub fn parse_sale_time(raw: &str) -> Result<DateTime<Local>, ConfigError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Local));
    }
    let naive = NaiveDateTime::parse_from_str(raw, SALE_TIME_FORMAT).map_err(|e| {
        ConfigError::Validation(format!(
            "sale_time `{raw}` is not `{SALE_TIME_FORMAT}` or RFC 3339: {e}"
        ))
    })?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| ConfigError::Validation(format!("sale_time `{raw}` does not exist locally")))
}

impl TargetConfig {
    /// Validate and resolve using the process environment.
    pub fn resolve(self) -> Result<SniperSettings, ConfigError> {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    /// Validate and resolve, reading overrides through `env`.
    pub fn resolve_with<F>(self, env: F) -> Result<SniperSettings, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = url::Url::parse(&self.target_url)
            .map_err(|e| ConfigError::Validation(format!("target_url: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Validation(format!(
                "target_url must be http(s), got `{}`",
                url.scheme()
            )));
        }
        if self.retry_times == 0 {
            return Err(ConfigError::Validation("retry_times must be at least 1".into()));
        }
        if self.ticket_count == 0 {
            return Err(ConfigError::Validation("ticket_count must be at least 1".into()));
        }
        if self.quantity_cap == 0 {
            return Err(ConfigError::Validation("quantity_cap must be at least 1".into()));
        }

        let sale_window = self
            .sale_time
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(parse_sale_time)
            .transpose()?
            .map(SaleWindow::new);

        let login_mode = if self.manual_login {
            LoginMode::Manual
        } else {
            let username = env("SNIPER_USERNAME").or(self.username).unwrap_or_default();
            let password = env("SNIPER_PASSWORD").or(self.password).unwrap_or_default();
            if username.is_empty() || password.is_empty() {
                return Err(ConfigError::Validation(
                    "manual_login is false but username/password are not set".into(),
                ));
            }
            LoginMode::Credentials { username, password }
        };

        let disposal = if self.keep_browser {
            DisposalPolicy::HoldOpen(Duration::from_secs(self.keep_browser_secs))
        } else {
            DisposalPolicy::Release
        };

        let plan = AcquisitionPlan {
            target_url: self.target_url,
            listing_ready: self.layout.listing_ready.clone(),
            listing_timeout: self.timeouts.listing(),
            sale_window,
            retry_limit: self.retry_times,
            retry_pause: Duration::from_millis(self.retry_pause_ms),
            disposal,
        };

        Ok(SniperSettings {
            plan,
            layout: self.layout,
            timeouts: self.timeouts,
            preference: SelectionPreference {
                preferred_label: self.ticket_type.filter(|t| !t.trim().is_empty()),
                allow_fallback: self.allow_other_ticket,
            },
            quantity: QuantityRequest {
                requested: self.ticket_count,
                cap: self.quantity_cap,
            },
            click_delay: Duration::from_millis(self.quantity_click_delay_ms),
            login_layout: self.login,
            // A human can only log in through a visible window.
            browser: BrowserOptions {
                show_browser: self.show_browser || self.manual_login,
                user_data_dir: self.user_data_dir,
            },
            login_mode,
            cookie_file: self.cookie_file,
            save_cookies: self.save_cookies,
            attempt_log: self.attempt_log,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use std::io::Write;

    const MINIMAL: &str = r#"{
        "damai": { "target_url": "https://detail.damai.cn/item.htm?id=1" }
    }"#;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_minimal_config_defaults() {
        let cfg = load_config_from_str(MINIMAL, "damai").unwrap();
        assert!(cfg.allow_other_ticket);
        assert_eq!(cfg.ticket_count, 1);
        assert_eq!(cfg.retry_times, 10);
        assert!(cfg.keep_browser);
        assert!(cfg.manual_login);
        assert_eq!(cfg.cookie_file, PathBuf::from("damai_cookies.json"));

        let settings = cfg.resolve_with(no_env).unwrap();
        assert_eq!(settings.plan.retry_limit, 10);
        assert_eq!(settings.plan.retry_pause, Duration::from_secs(1));
        assert_eq!(
            settings.plan.disposal,
            DisposalPolicy::HoldOpen(Duration::from_secs(60))
        );
        assert!(settings.plan.sale_window.is_none());
        assert_eq!(settings.login_mode, LoginMode::Manual);
        assert!(settings.browser.show_browser);
        assert_eq!(settings.quantity.cap, 6);
        assert_eq!(settings.plan.listing_ready, ".perform__order__price");
    }

    #[test]
    fn test_missing_section() {
        let err = load_config_from_str(MINIMAL, "bilibili").unwrap_err();
        assert!(matches!(err, ConfigError::MissingSection(ref p) if p == "bilibili"));
    }

    #[test]
    fn test_missing_target_url_is_parse_error() {
        let err = load_config_from_str(r#"{ "damai": { "ticket_count": 2 } }"#, "damai")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_invalid_url_rejected() {
        let cfg = load_config_from_str(r#"{ "damai": { "target_url": "ftp://x" } }"#, "damai")
            .unwrap();
        assert!(matches!(
            cfg.resolve_with(no_env),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_zero_retries_rejected() {
        let json = r#"{ "damai": { "target_url": "https://a.b/", "retry_times": 0 } }"#;
        let cfg = load_config_from_str(json, "damai").unwrap();
        assert!(matches!(
            cfg.resolve_with(no_env),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_credentials_from_env_override_file() {
        let json = r#"{ "damai": {
            "target_url": "https://a.b/",
            "manual_login": false,
            "username": "file-user",
            "password": "file-pass"
        } }"#;
        let cfg = load_config_from_str(json, "damai").unwrap();
        let settings = cfg
            .resolve_with(|k| (k == "SNIPER_PASSWORD").then(|| "env-pass".to_string()))
            .unwrap();
        assert_eq!(
            settings.login_mode,
            LoginMode::Credentials {
                username: "file-user".into(),
                password: "env-pass".into()
            }
        );
        assert!(!settings.browser.show_browser);
    }

    #[test]
    fn test_credentials_required_without_manual_login() {
        let json = r#"{ "damai": { "target_url": "https://a.b/", "manual_login": false } }"#;
        let cfg = load_config_from_str(json, "damai").unwrap();
        assert!(matches!(
            cfg.resolve_with(no_env),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_sale_time_local_format() {
        let dt = parse_sale_time("2026-11-01 20:00:00").unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2026, 11, 1));
        assert_eq!((dt.hour(), dt.minute(), dt.second()), (20, 0, 0));
    }

    #[test]
    fn test_sale_time_rfc3339() {
        let dt = parse_sale_time("2026-11-01T12:00:00Z").unwrap();
        assert_eq!(dt.timestamp(), 1_793_534_400);
    }

    #[test]
    fn test_sale_time_garbage() {
        assert!(matches!(
            parse_sale_time("tomorrow at eight"),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_full_section_resolves() {
        let json = r#"{ "damai": {
            "target_url": "https://detail.damai.cn/item.htm?id=7",
            "sale_time": "2026-12-24 19:00:00",
            "ticket_type": "内场",
            "allow_other_ticket": false,
            "ticket_count": 8,
            "retry_times": 3,
            "keep_browser": false,
            "attempt_log": "logs/attempts.jsonl",
            "layout": { "purchase_button": ".buybtn" },
            "timeouts": { "payment_ms": 20000 }
        } }"#;
        let settings = load_config_from_str(json, "damai")
            .unwrap()
            .resolve_with(no_env)
            .unwrap();
        assert!(settings.plan.sale_window.is_some());
        assert_eq!(settings.preference.preferred_label.as_deref(), Some("内场"));
        assert!(!settings.preference.allow_fallback);
        assert_eq!(settings.quantity.increments(), 5);
        assert_eq!(settings.plan.disposal, DisposalPolicy::Release);
        assert_eq!(settings.layout.purchase_button, ".buybtn");
        assert_eq!(settings.timeouts.payment(), Duration::from_secs(20));
        assert_eq!(
            settings.attempt_log,
            Some(PathBuf::from("logs/attempts.jsonl"))
        );
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let cfg = load_config(file.path(), "damai").unwrap();
        assert_eq!(cfg.target_url, "https://detail.damai.cn/item.htm?id=1");

        let missing = load_config(Path::new("/nonexistent/config.json"), "damai");
        assert!(matches!(missing, Err(ConfigError::FileNotFound(_))));
    }
}
