use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::autoshop::error::Result;

/// File name the settings are stored under inside the application directory.
pub const SETTINGS_FILE: &str = "Config.json";

/// Application settings. Loaded once at startup and passed explicitly to the
/// request list and the report selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Whether requests with a past completion date are listed and reported.
    #[serde(default)]
    pub show_completed_requests: bool,
}

impl Settings {
    /// Loads the settings, falling back to defaults when the file is absent.
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("settings file missing, using defaults");
            return Ok(Self::default());
        }
        let source = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&source)?)
    }

    #[instrument(level = "debug", skip(self), fields(path = %path.display()))]
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().expect("temporary directory");
        let settings = Settings::load(&dir.path().join(SETTINGS_FILE)).expect("defaults");
        assert!(!settings.show_completed_requests);
    }

    #[test]
    fn save_then_load_round_trips_flag() {
        let dir = tempdir().expect("temporary directory");
        let path = dir.path().join(SETTINGS_FILE);

        for flag in [true, false] {
            let settings = Settings {
                show_completed_requests: flag,
            };
            settings.save(&path).expect("saved");
            assert_eq!(Settings::load(&path).expect("loaded"), settings);
        }
    }

    #[test]
    fn uses_camel_case_key() {
        let dir = tempdir().expect("temporary directory");
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(&path, r#"{ "showCompletedRequests": true }"#).unwrap();
        assert!(Settings::load(&path).unwrap().show_completed_requests);

        fs::write(&path, "not json").unwrap();
        assert!(Settings::load(&path).is_err());
    }
}
