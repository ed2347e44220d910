// Keyseize Settings Module
// Monitor and output options loaded from TOML

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::event::DEFAULT_POLL_INTERVAL;
use crate::output::OutputFormat;

/// Options for one monitoring session.
///
/// Read from `~/.config/keyseize/settings.toml` unless a path is given; a
/// missing file means defaults. Command line flags are applied on top.
#[derive(Debug, Clone)]
pub struct Settings {
    product: Option<String>,
    poll_interval: Duration,
    output_format: OutputFormat,
    /// File these settings came from, if any
    origin: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("cannot read settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed settings file: {0}")]
    TomlParse(String),

    #[error("invalid setting: {0}")]
    InvalidValue(String),
}

/// On-disk layout
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SettingsFile {
    monitor: MonitorSection,
    output: OutputSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct MonitorSection {
    product: Option<String>,
    poll_interval_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct OutputSection {
    format: Option<String>,
}

impl TryFrom<SettingsFile> for Settings {
    type Error = SettingsError;

    fn try_from(file: SettingsFile) -> Result<Self, Self::Error> {
        let mut settings = Settings::new();
        settings.set_product(file.monitor.product)?;

        match file.monitor.poll_interval_ms {
            Some(0) => {
                return Err(SettingsError::InvalidValue(
                    "monitor.poll_interval_ms must be at least 1".to_string(),
                ))
            }
            Some(ms) => settings.poll_interval = Duration::from_millis(ms),
            None => {}
        }

        if let Some(format) = file.output.format {
            settings.output_format = OutputFormat::from_str(&format).map_err(|_| {
                SettingsError::InvalidValue(format!(
                    "output.format must be \"binary\" or \"text\", got {:?}",
                    format
                ))
            })?;
        }
        Ok(settings)
    }
}

impl Settings {
    pub fn new() -> Self {
        Self {
            product: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            output_format: OutputFormat::default(),
            origin: None,
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let file: SettingsFile =
            toml::from_str(content).map_err(|e| SettingsError::TomlParse(e.to_string()))?;
        Settings::try_from(file)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let mut settings = Self::from_toml(&std::fs::read_to_string(path)?)?;
        settings.origin = Some(path.to_path_buf());
        Ok(settings)
    }

    pub fn default_path() -> Option<PathBuf> {
        Some(dirs::config_dir()?.join("keyseize").join("settings.toml"))
    }

    /// Settings from the default path, or defaults when no file exists there
    pub fn load_default() -> Result<Self, SettingsError> {
        match Self::default_path() {
            Some(path) if path.is_file() => Self::from_file(path),
            _ => Ok(Self::new()),
        }
    }

    pub fn product(&self) -> Option<&str> {
        self.product.as_deref()
    }

    /// An empty name could never match a device and is rejected
    pub fn set_product(&mut self, product: Option<String>) -> Result<(), SettingsError> {
        if matches!(product.as_deref(), Some("")) {
            return Err(SettingsError::InvalidValue(
                "monitor.product must not be empty".to_string(),
            ));
        }
        self.product = product;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output_format
    }

    pub fn set_output_format(&mut self, format: OutputFormat) {
        self.output_format = format;
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.origin.as_deref()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}
