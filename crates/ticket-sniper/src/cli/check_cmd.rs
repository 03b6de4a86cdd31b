//! `check`: validate the config and print the resolved plan.

use crate::config::{load_config, resolve_config_path};
use crate::orchestrator::DisposalPolicy;
use crate::session::LoginMode;
use anyhow::{Context, Result};

pub fn run(config: Option<&str>, platform: &str, json: bool) -> Result<()> {
    let path = resolve_config_path(config);
    let settings = load_config(&path, platform)
        .with_context(|| format!("loading {}", path.display()))?
        .resolve()?;
    let plan = &settings.plan;

    let sale_time = plan
        .sale_window
        .map(|w| w.target().format("%Y-%m-%d %H:%M:%S").to_string());
    let login = match &settings.login_mode {
        LoginMode::Manual => "manual".to_string(),
        LoginMode::Credentials { username, .. } => format!("credentials ({username})"),
    };
    let disposal = match plan.disposal {
        DisposalPolicy::HoldOpen(d) => format!("hold open {}s", d.as_secs()),
        DisposalPolicy::Release => "release".to_string(),
    };

    if json {
        let summary = serde_json::json!({
            "config": path.display().to_string(),
            "platform": platform,
            "target_url": plan.target_url,
            "sale_time": sale_time,
            "preferred_tier": settings.preference.preferred_label,
            "allow_fallback": settings.preference.allow_fallback,
            "quantity": settings.quantity.effective(),
            "retry_limit": plan.retry_limit,
            "login": login,
            "disposal": disposal,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Config:    {} [{platform}]", path.display());
    println!("Target:    {}", plan.target_url);
    println!(
        "Sale time: {}",
        sale_time.as_deref().unwrap_or("none (start immediately)")
    );
    println!(
        "Tier:      {} (fallback {})",
        settings
            .preference
            .preferred_label
            .as_deref()
            .unwrap_or("any"),
        if settings.preference.allow_fallback { "on" } else { "off" }
    );
    if settings.quantity.requested != settings.quantity.effective() {
        println!(
            "Quantity:  {} (requested {}, capped at {})",
            settings.quantity.effective(),
            settings.quantity.requested,
            settings.quantity.cap
        );
    } else {
        println!("Quantity:  {}", settings.quantity.effective());
    }
    println!("Attempts:  {}", plan.retry_limit);
    println!("Login:     {login}");
    println!("On exit:   {disposal}");
    Ok(())
}
