//! TOML configuration for HostCare.
//!
//! Every field has a default, so an empty or partial file is valid. The file
//! is looked up at an explicit path first, then under
//! `%LOCALAPPDATA%\HostCare\config.toml`; if neither exists the built-in
//! defaults apply.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::util::constants::*;
use crate::util::error::{HostCareError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Seconds between heartbeat lines while a task runs. `0` disables them.
    pub heartbeat_secs: u64,
    pub timeouts: Timeouts,
    pub report: ReportDefaults,
}

/// Per-command wall-clock timeouts, in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub service_secs: u64,
    pub network_secs: u64,
    pub sfc_secs: u64,
    pub dism_secs: u64,
    pub drivers_secs: u64,
}

/// Defaults for the `report` command when flags are omitted.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportDefaults {
    pub logs: Vec<String>,
    pub levels: Vec<String>,
    pub days: u32,
    pub max_events: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            heartbeat_secs: DEFAULT_HEARTBEAT_SECS,
            timeouts: Timeouts::default(),
            report: ReportDefaults::default(),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            service_secs: DEFAULT_SERVICE_TIMEOUT_SECS,
            network_secs: DEFAULT_NETWORK_TIMEOUT_SECS,
            sfc_secs: DEFAULT_SFC_TIMEOUT_SECS,
            dism_secs: DEFAULT_DISM_TIMEOUT_SECS,
            drivers_secs: DEFAULT_DRIVERS_TIMEOUT_SECS,
        }
    }
}

impl Default for ReportDefaults {
    fn default() -> Self {
        Self {
            logs: vec!["System".into(), "Application".into()],
            levels: vec!["critical".into(), "error".into(), "warning".into()],
            days: 7,
            max_events: DEFAULT_MAX_EVENTS,
        }
    }
}

impl Timeouts {
    pub fn service(&self) -> Duration {
        Duration::from_secs(self.service_secs)
    }

    pub fn network(&self) -> Duration {
        Duration::from_secs(self.network_secs)
    }

    pub fn sfc(&self) -> Duration {
        Duration::from_secs(self.sfc_secs)
    }

    pub fn dism(&self) -> Duration {
        Duration::from_secs(self.dism_secs)
    }

    pub fn drivers(&self) -> Duration {
        Duration::from_secs(self.drivers_secs)
    }
}

impl Settings {
    /// Parse settings from TOML text.
    ///
    /// # Errors
    /// Returns [`HostCareError::Config`] if the text is not valid TOML or a
    /// field has the wrong type.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| HostCareError::Config(e.to_string()))
    }

    /// Load settings from `explicit`, else from the per-user config file if
    /// it exists, else return the defaults.
    ///
    /// # Errors
    /// An explicit path that cannot be read, or any file that does not parse.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => match default_config_path() {
                Some(p) if p.exists() => p,
                _ => return Ok(Self::default()),
            },
        };

        let text = std::fs::read_to_string(&path).map_err(|e| {
            HostCareError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let settings = Self::from_toml_str(&text)?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(settings)
    }

    /// Heartbeat interval, or `None` when disabled.
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_secs > 0).then(|| Duration::from_secs(self.heartbeat_secs))
    }
}

/// `%LOCALAPPDATA%\HostCare`, if the variable is set.
pub fn app_data_dir() -> Option<PathBuf> {
    let local_app_data = std::env::var_os("LOCALAPPDATA")?;
    Some(PathBuf::from(local_app_data).join(APP_DATA_DIR))
}

fn default_config_path() -> Option<PathBuf> {
    app_data_dir().map(|d| d.join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let s = Settings::from_toml_str("").unwrap();
        assert_eq!(s.heartbeat_secs, DEFAULT_HEARTBEAT_SECS);
        assert_eq!(s.timeouts.network_secs, DEFAULT_NETWORK_TIMEOUT_SECS);
        assert_eq!(s.report.max_events, DEFAULT_MAX_EVENTS);
    }

    #[test]
    fn test_partial_toml_overrides_only_given_fields() {
        let s = Settings::from_toml_str(
            "heartbeat_secs = 5\n[timeouts]\nsfc_secs = 30\n[report]\nlogs = [\"Setup\"]\n",
        )
        .unwrap();
        assert_eq!(s.heartbeat_secs, 5);
        assert_eq!(s.timeouts.sfc(), Duration::from_secs(30));
        assert_eq!(s.timeouts.dism_secs, DEFAULT_DISM_TIMEOUT_SECS);
        assert_eq!(s.report.logs, vec!["Setup".to_string()]);
        assert_eq!(s.report.days, 7);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = Settings::from_toml_str("heartbeat_secs = \"soon\"").unwrap_err();
        assert!(matches!(err, HostCareError::Config(_)));
    }

    #[test]
    fn test_zero_heartbeat_disables() {
        let s = Settings::from_toml_str("heartbeat_secs = 0").unwrap();
        assert!(s.heartbeat_interval().is_none());
    }
}
