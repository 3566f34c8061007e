//! Settings file loading and saving
//!
//! The settings record lives in a TOML file. Every field has a default, so a
//! file only needs the values it changes.

use anyhow::{Context, Result};
use inventory_sync_core::Settings;
use std::fs;
use std::path::Path;

/// Default settings file name
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

const HEADER: &str = "\
# Inventory Sync settings
#
# [source] kind = \"csv\" takes a published CSV url (http(s) url or local path).
# [source] kind = \"sheets\" takes spreadsheet_id, range and api_key.
# Column names under [columns] must match the sheet's header row.

";

/// Parse settings from TOML text
pub fn parse_config(content: &str) -> Result<Settings> {
    let mut settings: Settings = toml::from_str(content)?;
    if settings.auto_refresh_minutes == 0 {
        log::warn!("auto_refresh_minutes must be at least 1, using 1");
        settings.auto_refresh_minutes = 1;
    }
    Ok(settings)
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Settings> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    parse_config(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
}

/// Render settings as a commented TOML document
pub fn render_config(settings: &Settings) -> Result<String> {
    let body = toml::to_string_pretty(settings).context("Failed to serialize settings")?;
    Ok(format!("{}{}", HEADER, body))
}

/// Write settings to a TOML file, creating parent directories
pub fn save_config(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }
    fs::write(path, render_config(settings)?)
        .with_context(|| format!("Failed to write config file: {:?}", path))
}
