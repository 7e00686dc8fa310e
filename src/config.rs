//! Settings file and persisted display preferences.
//!
//! The settings file is YAML. Preference toggles are kept as the literal
//! strings `"true"`/`"false"` so the file stays interchangeable with the
//! browser storage format they were first written in.

use std::{
    collections::BTreeMap,
    env, fmt, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::ValueEnum;
use log::debug;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "cloud-inventory.yml";
pub const DEFAULT_STORE_FILE: &str = "inventory.json";
pub const CONFIG_ENV: &str = "CLOUD_INVENTORY_CONFIG";
pub const STORE_ENV: &str = "CLOUD_INVENTORY_STORE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum Preference {
    DarkMode,
    ShowDashboard,
    ShowUpgrades,
    ShowPricing,
    ExcludeStopped,
    ShowDetailed,
}

impl Preference {
    pub const ALL: [Preference; 6] = [
        Preference::DarkMode,
        Preference::ShowDashboard,
        Preference::ShowUpgrades,
        Preference::ShowPricing,
        Preference::ExcludeStopped,
        Preference::ShowDetailed,
    ];

    /// Storage key.
    pub fn key(self) -> &'static str {
        match self {
            Preference::DarkMode => "darkMode",
            Preference::ShowDashboard => "showDashboard",
            Preference::ShowUpgrades => "showUpgrades",
            Preference::ShowPricing => "showPricing",
            Preference::ExcludeStopped => "excludeStopped",
            Preference::ShowDetailed => "showDetailed",
        }
    }

    pub fn default_value(self) -> bool {
        matches!(
            self,
            Preference::ShowDashboard | Preference::ShowUpgrades | Preference::ShowPricing
        )
    }
}

impl fmt::Display for Preference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Preferences(BTreeMap<String, String>);

impl Preferences {
    /// Unset toggles take their default; any stored value other than
    /// `"true"` reads as off.
    pub fn get(&self, preference: Preference) -> bool {
        match self.0.get(preference.key()) {
            Some(value) => value == "true",
            None => preference.default_value(),
        }
    }

    pub fn set(&mut self, preference: Preference, enabled: bool) {
        self.0.insert(
            preference.key().to_string(),
            if enabled { "true" } else { "false" }.to_string(),
        );
    }

    pub fn entries(&self) -> Vec<(Preference, bool)> {
        Preference::ALL
            .iter()
            .map(|preference| (*preference, self.get(*preference)))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Inventory store location.
    pub store: Option<PathBuf>,
    /// Rate table used by `pricing` when `--rates` is not given.
    pub rates: Option<PathBuf>,
    pub preferences: Preferences,
}

impl Settings {
    /// Reads `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("Settings file {path:?} not found; using defaults");
            return Ok(Self::default());
        }
        let text =
            fs::read_to_string(path).with_context(|| format!("Reading settings {path:?}"))?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&text).with_context(|| format!("Parsing settings {path:?}"))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Serializing settings")?;
        fs::write(path, yaml).with_context(|| format!("Writing settings {path:?}"))
    }
}

/// `--config`, then `$CLOUD_INVENTORY_CONFIG`, then the default file name.
pub fn resolve_config_path(cli: Option<&Path>) -> PathBuf {
    cli.map(Path::to_path_buf)
        .or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// `--store`, then `$CLOUD_INVENTORY_STORE`, then the settings file, then
/// the default file name.
pub fn resolve_store_path(cli: Option<&Path>, settings: &Settings) -> PathBuf {
    cli.map(Path::to_path_buf)
        .or_else(|| env::var_os(STORE_ENV).map(PathBuf::from))
        .or_else(|| settings.store.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preferences_default_and_persist_as_strings() {
        let mut prefs = Preferences::default();
        assert!(prefs.get(Preference::ShowDashboard));
        assert!(!prefs.get(Preference::DarkMode));
        prefs.set(Preference::DarkMode, true);
        prefs.set(Preference::ShowPricing, false);

        let settings = Settings {
            preferences: prefs,
            ..Default::default()
        };
        let yaml = serde_yaml::to_string(&settings).unwrap();
        assert!(yaml.contains("darkMode: 'true'") || yaml.contains("darkMode: \"true\""), "{yaml}");
        let parsed: Settings = serde_yaml::from_str(&yaml).unwrap();
        assert!(parsed.preferences.get(Preference::DarkMode));
        assert!(!parsed.preferences.get(Preference::ShowPricing));
    }

    #[test]
    fn non_true_strings_read_as_off() {
        let settings: Settings =
            serde_yaml::from_str("preferences:\n  showUpgrades: 'yes'\n").unwrap();
        assert!(!settings.preferences.get(Preference::ShowUpgrades));
    }

    #[test]
    fn missing_settings_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("absent.yml")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(
            resolve_store_path(Some(Path::new("custom.json")), &settings),
            PathBuf::from("custom.json")
        );
    }
}
