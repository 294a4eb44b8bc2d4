use crate::error::SettingsError;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs, path::Path, time::Duration};
use tracing::{debug, info};
use units::{ConfigDuration, DataSize};

pub mod units;

pub const ENV_PREFIX: &str = "ROWSTREAM_";

/// Server-side limits of the result streaming protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProtocolSettings {
    /// Byte target used when a request does not name one.
    pub target_result_size: DataSize,
    /// Upper bound applied to caller-supplied targets.
    pub max_target_result_size: DataSize,
    /// Upper bound applied to caller-supplied waits.
    pub max_wait: ConfigDuration,
    /// Wait used when a request does not name one.
    pub default_wait: ConfigDuration,
    /// A running query with no heartbeat for this long is abandoned.
    pub client_timeout: ConfigDuration,
    pub reaper_interval: ConfigDuration,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            target_result_size: DataSize::megabytes(1),
            max_target_result_size: DataSize::megabytes(128),
            max_wait: ConfigDuration::secs(1),
            default_wait: ConfigDuration::secs(1),
            client_timeout: ConfigDuration::secs(300),
            reaper_interval: ConfigDuration::secs(1),
        }
    }
}

impl ProtocolSettings {
    /// Defaults, overlaid with `path` when given, then with `ROWSTREAM_*`
    /// environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        let vars: HashMap<String, String> = std::env::vars()
            .filter(|(name, _)| name.starts_with(ENV_PREFIX))
            .collect();
        settings.apply_env(&vars)?;
        settings.validate()?;

        info!(settings = ?settings, "Protocol settings loaded");
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let raw = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&raw).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies overrides such as `ROWSTREAM_MAX_WAIT=2s`. Unknown names
    /// are ignored.
    pub fn apply_env(&mut self, vars: &HashMap<String, String>) -> Result<(), SettingsError> {
        fn parse<T>(name: &str, value: &str) -> Result<T, SettingsError>
        where
            T: std::str::FromStr<Err = SettingsError>,
        {
            value.parse().map_err(|err| SettingsError::Env {
                name: name.to_string(),
                source: Box::new(err),
            })
        }

        for (name, value) in vars {
            let Some(key) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };

            match key {
                "TARGET_RESULT_SIZE" => self.target_result_size = parse(name, value)?,
                "MAX_TARGET_RESULT_SIZE" => self.max_target_result_size = parse(name, value)?,
                "MAX_WAIT" => self.max_wait = parse(name, value)?,
                "DEFAULT_WAIT" => self.default_wait = parse(name, value)?,
                "CLIENT_TIMEOUT" => self.client_timeout = parse(name, value)?,
                "REAPER_INTERVAL" => self.reaper_interval = parse(name, value)?,
                _ => {
                    debug!(name = %name, "Ignoring unknown setting override");
                    continue;
                }
            }
            debug!(name = %name, value = %value, "Applied setting override");
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.max_target_result_size < self.target_result_size {
            return Err(SettingsError::Invalid(format!(
                "max_target_result_size ({}) is below target_result_size ({})",
                self.max_target_result_size, self.target_result_size
            )));
        }

        let waits = [
            ("max_wait", self.max_wait),
            ("default_wait", self.default_wait),
            ("client_timeout", self.client_timeout),
            ("reaper_interval", self.reaper_interval),
        ];
        for (name, value) in waits {
            if value.as_duration().is_zero() {
                return Err(SettingsError::Invalid(format!("{name} must be positive")));
            }
        }

        Ok(())
    }

    /// Byte target for one request.
    pub fn effective_target(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.target_result_size.as_bytes())
            .min(self.max_target_result_size.as_bytes())
    }

    /// Wait bound for one request.
    pub fn effective_wait(&self, requested: Option<Duration>) -> Duration {
        requested
            .unwrap_or(self.default_wait.as_duration())
            .min(self.max_wait.as_duration())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_are_valid() {
        let settings = ProtocolSettings::default();
        settings.validate().unwrap();
        assert_eq!(settings.target_result_size.as_bytes(), 1 << 20);
        assert_eq!(settings.client_timeout.as_duration(), Duration::from_secs(300));
    }

    #[test]
    fn loads_partial_file_over_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "max_wait": "2s", "target_result_size": "64kB" }}"#).unwrap();

        let settings = ProtocolSettings::from_file(file.path()).unwrap();
        assert_eq!(settings.max_wait.as_duration(), Duration::from_secs(2));
        assert_eq!(settings.target_result_size.as_bytes(), 65_536);
        assert_eq!(settings.reaper_interval, ConfigDuration::secs(1));
    }

    #[test]
    fn rejects_unknown_fields_and_bad_units() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "max_wait": "2 fortnights" }}"#).unwrap();
        assert!(matches!(
            ProtocolSettings::from_file(file.path()),
            Err(SettingsError::Parse { .. })
        ));

        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "max_wiat": "2s" }}"#).unwrap();
        assert!(ProtocolSettings::from_file(file.path()).is_err());
    }

    #[test]
    fn env_overrides_apply_after_file() {
        let mut settings = ProtocolSettings::default();
        settings
            .apply_env(&vars(&[
                ("ROWSTREAM_MAX_WAIT", "250ms"),
                ("ROWSTREAM_CLIENT_TIMEOUT", "10m"),
                ("ROWSTREAM_UNRELATED", "x"),
            ]))
            .unwrap();

        assert_eq!(settings.max_wait.as_duration(), Duration::from_millis(250));
        assert_eq!(settings.client_timeout.as_duration(), Duration::from_secs(600));
    }

    #[test]
    fn env_errors_name_the_variable() {
        let mut settings = ProtocolSettings::default();
        let err = settings
            .apply_env(&vars(&[("ROWSTREAM_TARGET_RESULT_SIZE", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("ROWSTREAM_TARGET_RESULT_SIZE"));
    }

    #[test]
    fn validation_checks_bounds() {
        let settings = ProtocolSettings {
            target_result_size: DataSize::megabytes(256),
            ..ProtocolSettings::default()
        };
        assert!(matches!(settings.validate(), Err(SettingsError::Invalid(_))));

        let settings = ProtocolSettings {
            max_wait: ConfigDuration::millis(0),
            ..ProtocolSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn requests_are_clamped() {
        let settings = ProtocolSettings::default();
        assert_eq!(settings.effective_target(None), 1 << 20);
        assert_eq!(settings.effective_target(Some(1 << 40)), 128 << 20);
        assert_eq!(settings.effective_wait(Some(Duration::from_secs(30))), Duration::from_secs(1));
        assert_eq!(
            settings.effective_wait(Some(Duration::from_millis(10))),
            Duration::from_millis(10)
        );
    }
}
