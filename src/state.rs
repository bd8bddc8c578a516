//! Application state and configuration management.
//!
//! Config lives at `~/.fieldops/config.json`; the snapshot cache and other
//! durable artifacts live alongside it in the same state directory.

use std::fs;
use std::path::PathBuf;

use parking_lot::RwLock;
use url::Url;

use crate::types::Config;

/// Shared application state. Components receive `Arc<AppState>` and read
/// config through the non-poisoning lock.
pub struct AppState {
    pub config: RwLock<Option<Config>>,
}

impl AppState {
    pub fn new() -> Self {
        let config = match load_config() {
            Ok(c) => Some(c),
            Err(e) => {
                log::warn!("Config unavailable: {}. Running unconfigured.", e);
                None
            }
        };
        Self {
            config: RwLock::new(config),
        }
    }

    /// Snapshot of the current config, if one is loaded.
    pub fn config(&self) -> Option<Config> {
        self.config.read().clone()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Get the canonical config file path (~/.fieldops/config.json)
pub fn config_path() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    Ok(home.join(".fieldops").join("config.json"))
}

/// Path of the snapshot cache file inside the state directory.
pub fn snapshots_path() -> Result<PathBuf, String> {
    Ok(state_dir()?.join("snapshots.json"))
}

/// Get the state directory (~/.fieldops), creating it if needed.
fn state_dir() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    let state_dir = home.join(".fieldops");

    if !state_dir.exists() {
        fs::create_dir_all(&state_dir).map_err(|e| format!("Failed to create state dir: {}", e))?;
    }

    Ok(state_dir)
}

/// Load configuration from ~/.fieldops/config.json
pub fn load_config() -> Result<Config, String> {
    let config_path = config_path()?;

    if !config_path.exists() {
        return Err(format!(
            "Config file not found at {}. Create it with: {{ \"apiBaseUrl\": \"https://...\", \"facilityId\": \"...\" }}",
            config_path.display()
        ));
    }

    let content =
        fs::read_to_string(&config_path).map_err(|e| format!("Failed to read config: {}", e))?;

    let config: Config =
        serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))?;

    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &Config) -> Result<(), String> {
    Url::parse(&config.api_base_url)
        .map_err(|e| format!("Invalid apiBaseUrl {}: {}", config.api_base_url, e))?;
    if config.facility_id.trim().is_empty() {
        return Err("facilityId must not be empty".to_string());
    }
    Ok(())
}

/// Reload configuration from disk, replacing the in-memory copy.
pub fn reload_config(state: &AppState) -> Result<Config, String> {
    let config = load_config()?;
    *state.config.write() = Some(config.clone());
    Ok(config)
}

/// Create or update config.json atomically.
///
/// If config already exists in-memory, clones it, applies the mutator, and
/// writes back. If config is None (first-run), starts from serde defaults,
/// applies the mutator, ensures ~/.fieldops/ exists, and writes + updates
/// in-memory state.
pub fn create_or_update_config(
    state: &AppState,
    mutator: impl FnOnce(&mut Config),
) -> Result<Config, String> {
    let mut guard = state.config.write();

    let mut config = match guard.clone() {
        Some(c) => c,
        None => serde_json::from_str(r#"{"apiBaseUrl": "", "facilityId": ""}"#)
            .map_err(|e| format!("Failed to build default config: {}", e))?,
    };

    mutator(&mut config);
    validate_config(&config)?;

    let path = config_path()?;
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| format!("Failed to create config dir: {}", e))?;
        }
    }

    let content = serde_json::to_string_pretty(&config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(&path, content).map_err(|e| format!("Failed to write config: {}", e))?;

    *guard = Some(config.clone());

    Ok(config)
}
