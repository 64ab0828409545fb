//! Persisted configuration (§6): the JSON file holding last-used output
//! device, split/trim defaults, naming-convention selector, and the
//! overclock toggle. Unknown keys are preserved on rewrite so a config
//! written by a newer build of this tool round-trips through an older one
//! without data loss.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use snafu::{ResultExt, Snafu};
use std::io::Write;
use std::path::Path;

#[derive(Snafu, Debug)]
pub enum ConfigError {
    #[snafu(display("failed to read config file {}", path.display()))]
    Read {
        source: std::io::Error,
        path: std::path::PathBuf,
    },
    #[snafu(display("failed to parse config file {}", path.display()))]
    Parse {
        source: serde_json::Error,
        path: std::path::PathBuf,
    },
    #[snafu(display("failed to serialize config"))]
    Serialize { source: serde_json::Error },
    #[snafu(display("failed to write config file {}", path.display()))]
    Write {
        source: std::io::Error,
        path: std::path::PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputDevice {
    Sd,
    Ums,
    UsbHost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingConvention {
    /// `<name> [<titleid>][v<version>].nsp`
    Full,
    /// `<titleid>.nsp`
    TitleIdOnly,
}

impl Default for NamingConvention {
    fn default() -> Self {
        Self::Full
    }
}

fn default_true() -> bool {
    true
}

/// The persisted config surface (§6). Every field has a `#[serde(default)]`
/// so an older config file missing a field this version added still loads;
/// `extra` is the escape hatch for the reverse direction (a newer config
/// carrying a field this version doesn't know about).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub last_output_device: Option<OutputDevice>,
    #[serde(default = "default_true")]
    pub split_enabled: bool,
    #[serde(default)]
    pub trim_enabled: bool,
    #[serde(default)]
    pub naming_convention: NamingConvention,
    #[serde(default)]
    pub overclock_enabled: bool,
    /// Keys this version of the config schema doesn't recognize, preserved
    /// verbatim across a load/save round-trip.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            last_output_device: None,
            split_enabled: true,
            trim_enabled: false,
            naming_convention: NamingConvention::default(),
            overclock_enabled: false,
            extra: Map::new(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).context(ReadSnafu { path })?;
        serde_json::from_str(&data).context(ParseSnafu { path })
    }

    /// Loads `path` if it exists, falling back to [`Config::default`] if it
    /// doesn't (first run).
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let data = serde_json::to_vec_pretty(self).context(SerializeSnafu)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context(WriteSnafu { path })?;
        }
        let mut file = std::fs::File::create(path).context(WriteSnafu { path })?;
        file.write_all(&data).context(WriteSnafu { path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = Config::load_or_default(&path).unwrap();
        assert!(config.split_enabled);
        assert!(!config.trim_enabled);
    }

    #[test]
    fn unknown_keys_are_preserved_across_a_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"split_enabled": false, "future_field_from_a_newer_build": 42}"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert!(!config.split_enabled);
        assert_eq!(
            config.extra.get("future_field_from_a_newer_build"),
            Some(&Value::from(42))
        );

        config.save(&path).unwrap();
        let reloaded = Config::load(&path).unwrap();
        assert_eq!(
            reloaded.extra.get("future_field_from_a_newer_build"),
            Some(&Value::from(42))
        );
    }
}
