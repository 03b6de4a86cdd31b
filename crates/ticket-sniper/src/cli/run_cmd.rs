//! `run`: launch Chromium and execute one acquisition run.

use crate::audit::AttemptLog;
use crate::clock::{Clock, SystemClock};
use crate::config::{load_config, resolve_config_path};
use crate::driver::chromium::ChromiumDriver;
use crate::orchestrator::{AcquisitionOrchestrator, DisposalPolicy};
use crate::pipeline::OrderPipeline;
use crate::session::{CookieStore, PlatformLogin};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// Exit code when the run is interrupted with Ctrl-C.
pub const EXIT_INTERRUPTED: i32 = 130;

/// Run the acquisition and return the process exit code.
pub async fn run(config: Option<&str>, platform: &str, json: bool) -> Result<i32> {
    let path = resolve_config_path(config);
    let settings = load_config(&path, platform)
        .with_context(|| format!("loading {}", path.display()))?
        .resolve()?;

    info!(
        "ticket-sniper v{} targeting {}",
        env!("CARGO_PKG_VERSION"),
        settings.plan.target_url
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let driver = ChromiumDriver::launch(&settings.browser).await?;
    info!("Chromium launched");

    let login = PlatformLogin::new(settings.login_layout.clone(), settings.login_mode.clone())
        .with_cookie_store(
            CookieStore::new(settings.cookie_file.clone()),
            settings.save_cookies,
        );
    let pipeline = OrderPipeline::new(
        settings.layout.clone(),
        settings.timeouts,
        settings.preference.clone(),
        settings.quantity,
        Arc::clone(&clock),
    )
    .with_click_delay(settings.click_delay);

    let mut orchestrator = AcquisitionOrchestrator::new(
        Box::new(driver),
        Box::new(login),
        Box::new(pipeline),
        Arc::clone(&clock),
    );
    if let Some(log_path) = &settings.attempt_log {
        match AttemptLog::open(log_path) {
            Ok(log) => {
                info!("attempt log run id {}", log.run_id());
                orchestrator = orchestrator.with_attempt_log(log);
            }
            Err(e) => warn!("attempt log disabled: {e:#}"),
        }
    }

    let outcome = tokio::select! {
        outcome = orchestrator.acquire(&settings.plan) => outcome,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, closing browser");
            orchestrator.release().await;
            return Ok(EXIT_INTERRUPTED);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{outcome}");
    }

    // The outcome is already reported; Ctrl-C only cuts the hold short.
    if let DisposalPolicy::HoldOpen(hold) = settings.plan.disposal {
        info!("keeping browser open for {}s, Ctrl-C to close", hold.as_secs());
        tokio::select! {
            _ = clock.sleep(hold) => {}
            _ = tokio::signal::ctrl_c() => info!("interrupted, closing browser"),
        }
    }
    orchestrator.release().await;
    Ok(outcome.exit_code())
}
