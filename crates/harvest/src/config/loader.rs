//! Configuration loading and merging logic.

use std::path::PathBuf;

use super::{Config, Settings};
use crate::error::Result;

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Data directory (--data flag), highest precedence.
    pub data: Option<PathBuf>,
}

/// Load config from the explicit path, else auto-discover it.
async fn load_file_config(options: &LoadOptions) -> Config {
    if let Some(ref config_path) = options.config_path {
        return match Config::load_from_path(config_path).await {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}, using defaults", e);
                Config::default()
            }
        };
    }
    Config::load().await
}

/// Load settings with explicit options.
///
/// Precedence, lowest first: defaults, config file, `HARVEST_*` environment,
/// command-line options. Returns `(Settings, Config)` with the engine section
/// validated.
pub async fn load_settings_with_options(options: LoadOptions) -> Result<(Settings, Config)> {
    let mut config = load_file_config(&options).await;
    config.apply_env_overrides();
    config.engine.validate()?;

    let mut settings = Settings::default();
    let base_dir = config
        .base_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    config.apply_to_settings(&mut settings, &base_dir);

    if let Some(data_dir) = options.data {
        settings.data_dir = data_dir;
    }

    if let Some(ref path) = config.source_path {
        tracing::debug!("Loaded config from {}", path.display());
    }

    Ok((settings, config))
}
