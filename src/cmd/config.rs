//! Configuration view and validation command — `postbridge config`.

use anyhow::{Context, Result};

use postbridge::config::BridgeConfig;

fn mask(secret: &str) -> &'static str {
    if secret.is_empty() { "(not set)" } else { "********" }
}

fn or_unset(value: &str) -> &str {
    if value.is_empty() { "(not set)" } else { value }
}

pub fn cmd_config(config: &BridgeConfig) -> Result<()> {
    println!();
    println!("postbridge configuration");
    println!("========================");
    println!();
    println!("[facebook]");
    println!("  app_id       = {}", or_unset(&config.facebook.app_id));
    println!("  app_secret   = {}", mask(&config.facebook.app_secret));
    println!("  redirect_uri = {}", or_unset(&config.facebook.redirect_uri));
    println!("  api_version  = {}", config.facebook.api_version);
    println!();
    println!("[bluesky]");
    println!("  handle       = {}", or_unset(&config.bluesky.identifier));
    println!("  app_password = {}", mask(&config.bluesky.app_password));
    println!("  service      = {}", config.bluesky.service);
    println!();

    config.validate().context("Configuration is invalid")?;
    println!("Configuration is valid.");
    Ok(())
}
