//! Configuration management for harvest using the prefer crate.

mod engine;
mod loader;
mod search;
mod settings;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use engine::EngineConfig;
pub use loader::{load_settings_with_options, LoadOptions};
pub use search::{HttpMethod, SearchApiConfig};
pub use settings::Settings;

/// Record identity settings (`[identity]` section).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Provider id fields, tried in order. Dotted paths reach nested objects.
    pub id_fields: Vec<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            id_fields: ["lotNumber", "lot_number", "lotId", "ln"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Storage root. Relative paths resolve against the config file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub search: SearchApiConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer for discovery.
    /// Discovers harvest config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("harvest").await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            tracing::warn!("{}, using defaults", e);
                            Self::default()
                        }
                    }
                } else {
                    Self::default()
                }
            }
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// The format follows the file extension: TOML, YAML, or JSON.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let mut config = Self::parse(&contents, ext)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse config text in the format named by `ext`.
    pub fn parse(contents: &str, ext: &str) -> Result<Self, String> {
        match ext {
            "toml" => {
                toml::from_str(contents).map_err(|e| format!("Failed to parse TOML config: {}", e))
            }
            "yaml" | "yml" => serde_yaml::from_str(contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e)),
            _ => serde_json::from_str(contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e)),
        }
    }

    /// Directory of the config file, if loaded from one.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// Paths starting with ~ are expanded.
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply `HARVEST_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |name: &str| lookup(name).filter(|s| !s.trim().is_empty());

        if let Some(dir) = lookup("HARVEST_DATA_DIR") {
            self.data_dir = Some(dir);
        }
        if let Some(raw) = lookup("HARVEST_MAX_PAGES") {
            match raw.trim().parse() {
                Ok(max_pages) => self.engine.max_pages = max_pages,
                Err(_) => tracing::warn!("Ignoring invalid HARVEST_MAX_PAGES: {}", raw),
            }
        }
        if let Some(raw) = lookup("HARVEST_BATCH_SIZE") {
            match raw.trim().parse() {
                Ok(batch_size) => self.engine.batch_size = batch_size,
                Err(_) => tracing::warn!("Ignoring invalid HARVEST_BATCH_SIZE: {}", raw),
            }
        }
        if let Some(user_agent) = lookup("HARVEST_USER_AGENT") {
            self.search.user_agent = Some(user_agent);
        }
    }

    /// Apply configuration to settings.
    /// `base_dir` resolves relative paths (config file dir or CWD).
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
        }
    }
}
