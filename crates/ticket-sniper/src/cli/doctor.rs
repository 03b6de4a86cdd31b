//! Environment readiness check.

use crate::config::{load_config, resolve_config_path};
use crate::driver::chromium::find_chromium;
use anyhow::Result;

/// Check Chromium availability, the config file and the stored session.
pub async fn run(config: Option<&str>, platform: &str) -> Result<()> {
    println!("Ticket Sniper Doctor");
    println!("====================");
    println!();

    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    let chromium = find_chromium();
    match &chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!("[!!] Chromium NOT found. Install Chrome or set SNIPER_CHROMIUM_PATH."),
    }

    let path = resolve_config_path(config);
    let mut config_ok = false;
    match load_config(&path, platform).map(|c| c.resolve()) {
        Ok(Ok(settings)) => {
            config_ok = true;
            println!("[OK] Config valid: {} [{platform}]", path.display());
            if settings.cookie_file.exists() {
                println!(
                    "[OK] Stored session: {}",
                    settings.cookie_file.display()
                );
            } else {
                println!("[..] No stored session yet; first run will log in");
            }
        }
        Ok(Err(e)) | Err(e) => println!("[!!] {e}"),
    }

    println!();
    if chromium.is_some() && config_ok {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }
    Ok(())
}
