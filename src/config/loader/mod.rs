use crate::config::Config;
use crate::utils::get_wabridge_home;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variables that override config file values.
const ENV_WEBHOOK_URL: &str = "WABRIDGE_WEBHOOK_URL";

pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_wabridge_home()?.join("config.json"))
}

pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let default_path = get_config_path().unwrap_or_else(|_| PathBuf::from("config.json"));
    let path = config_path.unwrap_or(default_path.as_path());

    let mut config = if path.exists() {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config JSON from {}", path.display()))?;
        debug!("loaded config from {}", path.display());
        config
    } else {
        debug!("no config at {}, using defaults", path.display());
        Config::default()
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    config
        .validate()
        .with_context(|| "Configuration validation failed")?;
    Ok(config)
}

/// Apply environment overrides using `lookup` to read variables.
/// Empty values are ignored.
pub(crate) fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup(ENV_WEBHOOK_URL).filter(|v| !v.trim().is_empty()) {
        config.webhook.url = url.trim().to_string();
    }
}
