//! Settings persistence
//!
//! Rate settings are stored as YAML. Loading never fails: a missing or
//! broken file yields defaults, and whatever is loaded is clamped.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::RateSettings;

/// Default settings file
///
/// Returns: `~/.config/mesh/rate-control.yaml`
pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("mesh")
        .join("rate-control.yaml")
}

/// Load rate settings from a YAML file
///
/// If the file doesn't exist, returns defaults.
/// If the file exists but is invalid, logs a warning and returns defaults.
pub fn load_settings(path: &Path) -> RateSettings {
    log::info!("load_settings: Loading from {:?}", path);

    if !path.exists() {
        log::info!("load_settings: Settings file doesn't exist, using defaults");
        return RateSettings::default();
    }

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            log::warn!("load_settings: Failed to read settings file: {}, using defaults", e);
            return RateSettings::default();
        }
    };

    match serde_yaml::from_str::<RateSettings>(&contents) {
        Ok(settings) => {
            let settings = settings.clamped();
            log::info!(
                "load_settings: ramp {:?}, sensitivity {}, temp {}% / {}%, perm {}% / {}%",
                settings.ramp_mode,
                settings.ramp_sensitivity,
                settings.temp,
                settings.temp_small,
                settings.perm,
                settings.perm_small
            );
            settings
        }
        Err(e) => {
            log::warn!("load_settings: Failed to parse settings: {}, using defaults", e);
            RateSettings::default()
        }
    }
}

/// Save rate settings to a YAML file
///
/// Creates parent directories if they don't exist.
pub fn save_settings(settings: &RateSettings, path: &Path) -> Result<()> {
    log::info!("save_settings: Saving to {:?}", path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create settings directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(settings).context("Failed to serialize rate settings")?;
    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write settings file: {:?}", path))?;

    Ok(())
}
