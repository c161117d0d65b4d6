//! Application configuration file

use std::fs;
use std::path::Path;

use gadget_configfs::GadgetConfig;
use gadget_runtime::RuntimeConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CliError;

/// Used when no `--config` is given and the file exists.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/gadgetctl/config.yaml";

/// Top level of the YAML config. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub gadget: GadgetConfig,
    pub runtime: RuntimeConfig,
}

impl AppConfig {
    /// Load `path`, or the default location if present, or built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, CliError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    debug!("No config file, using defaults");
                    Self::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, CliError> {
        debug!(path = %path.display(), "Loading config");
        let text = fs::read_to_string(path).map_err(|source| CliError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text).map_err(|source| CliError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    pub fn validate(&self) -> Result<(), CliError> {
        self.gadget
            .validate()
            .map_err(|e| CliError::InvalidConfig(e.to_string()))?;
        self.runtime
            .validate()
            .map_err(|e| CliError::InvalidConfig(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_default() -> Result<(), serde_yaml::Error> {
        assert_eq!(AppConfig::from_yaml("")?, AppConfig::default());
        assert_eq!(AppConfig::from_yaml("{}")?, AppConfig::default());
        Ok(())
    }

    #[test]
    fn test_partial_sections() -> Result<(), Box<dyn std::error::Error>> {
        let config = AppConfig::from_yaml(
            "gadget:\n  name: pad\n  udc: dummy_udc.0\nruntime:\n  poll_interval_ms: 4\n",
        )?;
        assert_eq!(config.gadget.name, "pad");
        assert_eq!(config.gadget.udc.as_deref(), Some("dummy_udc.0"));
        assert_eq!(config.runtime.poll_interval_ms, Some(4));
        assert_eq!(config.runtime.joystick.buttons, 24);
        config.validate()?;
        Ok(())
    }

    #[test]
    fn test_unknown_section_rejected() {
        assert!(AppConfig::from_yaml("gadgets: {}\n").is_err());
    }

    #[test]
    fn test_load_reports_path() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("bad.yaml");
        fs::write(&path, "runtime: [1, 2]\n")?;
        match AppConfig::load(Some(&path)) {
            Err(CliError::ConfigParse { path: p, .. }) => assert_eq!(p, path),
            other => return Err(format!("unexpected {other:?}").into()),
        }
        Ok(())
    }

    #[test]
    fn test_invalid_values_rejected() -> Result<(), serde_yaml::Error> {
        let config = AppConfig::from_yaml("runtime:\n  keyboard_rollover: 0\n")?;
        assert!(matches!(config.validate(), Err(CliError::InvalidConfig(_))));
        Ok(())
    }
}
