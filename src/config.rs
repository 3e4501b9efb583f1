//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::path::Path;

use crate::error::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub simulator: SimulatorConfig,

    #[serde(default)]
    pub stats: StatsConfig,
}

/// Storage and rotation configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    /// Maximum number of minute buckets one session may create
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

/// Fleet simulator configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SimulatorConfig {
    #[serde(default = "default_fleet")]
    pub fleet: String,

    #[serde(default = "default_drone_count")]
    pub drone_count: usize,

    #[serde(default = "default_rate_hz")]
    pub rate_hz: f64,

    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,

    /// Probability a publish is silently skipped (simulated loss)
    #[serde(default = "default_drop_probability")]
    pub drop_probability: f64,

    /// Probability a publish is sent twice (simulated duplication)
    #[serde(default = "default_duplicate_probability")]
    pub duplicate_probability: f64,
}

/// Statistics export configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StatsConfig {
    /// Report file name, relative to `storage.data_dir`
    #[serde(default = "default_report_file")]
    pub report_file: String,
}

// Default value functions
fn default_data_dir() -> String { "./data".to_string() }
fn default_file_prefix() -> String { "telemetry".to_string() }
fn default_max_files() -> usize { 5 }

fn default_fleet() -> String { "lab".to_string() }
fn default_drone_count() -> usize { 2 }
fn default_rate_hz() -> f64 { 5.0 }
fn default_duration_secs() -> u64 { 600 }
fn default_drop_probability() -> f64 { 0.05 }
fn default_duplicate_probability() -> f64 { 0.02 }

fn default_report_file() -> String { "delivery_stats.csv".to_string() }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            file_prefix: default_file_prefix(),
            max_files: default_max_files(),
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            fleet: default_fleet(),
            drone_count: default_drone_count(),
            rate_hz: default_rate_hz(),
            duration_secs: default_duration_secs(),
            drop_probability: default_drop_probability(),
            duplicate_probability: default_duplicate_probability(),
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            report_file: default_report_file(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            simulator: SimulatorConfig::default(),
            stats: StatsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the given path, or fall back to defaults when none given
    pub fn load_or_default(path: Option<&str>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    /// Full path of the statistics report file
    pub fn report_path(&self) -> std::path::PathBuf {
        Path::new(&self.storage.data_dir).join(&self.stats.report_file)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.storage.data_dir.is_empty() {
            return Err(crate::error::IngestError::Config(
                toml::de::Error::custom("storage data_dir cannot be empty")
            ));
        }

        if self.storage.file_prefix.is_empty() {
            return Err(crate::error::IngestError::Config(
                toml::de::Error::custom("storage file_prefix cannot be empty")
            ));
        }

        if self.storage.max_files == 0 {
            return Err(crate::error::IngestError::Config(
                toml::de::Error::custom("storage max_files must be greater than 0")
            ));
        }

        if self.simulator.drone_count == 0 {
            return Err(crate::error::IngestError::Config(
                toml::de::Error::custom("simulator drone_count must be greater than 0")
            ));
        }

        if self.simulator.rate_hz <= 0.0 || self.simulator.rate_hz > 100.0 {
            return Err(crate::error::IngestError::Config(
                toml::de::Error::custom("simulator rate_hz must be between 0 (exclusive) and 100")
            ));
        }

        if self.simulator.duration_secs == 0 {
            return Err(crate::error::IngestError::Config(
                toml::de::Error::custom("simulator duration_secs must be greater than 0")
            ));
        }

        for (name, value) in [
            ("drop_probability", self.simulator.drop_probability),
            ("duplicate_probability", self.simulator.duplicate_probability),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(crate::error::IngestError::Config(
                    toml::de::Error::custom(format!("{} must be between 0.0 and 1.0", name))
                ));
            }
        }

        if self.stats.report_file.is_empty() {
            return Err(crate::error::IngestError::Config(
                toml::de::Error::custom("stats report_file cannot be empty")
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.storage.data_dir, "./data");
        assert_eq!(config.storage.file_prefix, "telemetry");
        assert_eq!(config.storage.max_files, 5);
        assert_eq!(config.simulator.fleet, "lab");
        assert_eq!(config.simulator.drone_count, 2);
        assert_eq!(config.simulator.rate_hz, 5.0);
        assert_eq!(config.simulator.duration_secs, 600);
        assert_eq!(config.stats.report_file, "delivery_stats.csv");
    }

    #[test]
    fn test_empty_data_dir() {
        let mut config = Config::default();
        config.storage.data_dir = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_file_prefix() {
        let mut config = Config::default();
        config.storage.file_prefix = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_files_zero() {
        let mut config = Config::default();
        config.storage.max_files = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_drone_count_zero() {
        let mut config = Config::default();
        config.simulator.drone_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rate_hz_zero() {
        let mut config = Config::default();
        config.simulator.rate_hz = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rate_hz_too_high() {
        let mut config = Config::default();
        config.simulator.rate_hz = 100.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duration_zero() {
        let mut config = Config::default();
        config.simulator.duration_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_drop_probability_out_of_range() {
        let mut config = Config::default();
        config.simulator.drop_probability = 1.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_probability_negative() {
        let mut config = Config::default();
        config.simulator.duplicate_probability = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_report_file() {
        let mut config = Config::default();
        config.stats.report_file = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_report_path_joins_data_dir() {
        let config = Config::default();
        assert_eq!(
            config.report_path(),
            Path::new("./data").join("delivery_stats.csv")
        );
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[storage]
data_dir = "/tmp/ingest-test"
max_files = 3

[simulator]
drone_count = 4
rate_hz = 2.0

[stats]
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.storage.data_dir, "/tmp/ingest-test");
        assert_eq!(config.storage.max_files, 3);
        assert_eq!(config.simulator.drone_count, 4);
        // Unspecified fields fall back to defaults
        assert_eq!(config.storage.file_prefix, "telemetry");
        assert_eq!(config.simulator.duration_secs, 600);
    }

    #[test]
    fn test_load_invalid_config_fails() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[storage]
max_files = 0
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        assert!(Config::load(temp_file.path()).is_err());
    }

    #[test]
    fn test_load_or_default_without_path() {
        let config = Config::load_or_default(None).unwrap();
        assert_eq!(config.storage.max_files, 5);
    }
}
