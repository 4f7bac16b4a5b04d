//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.quiztally.toml` files.

use crate::cli::{Args, Command};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = ".quiztally.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Object storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Processing settings.
    #[serde(default)]
    pub processing: ProcessingConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

/// Where raw submissions and aggregate documents live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one sub-directory per bucket.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Bucket raw submissions are captured into.
    #[serde(default = "default_raw_bucket")]
    pub raw_bucket: String,

    /// Bucket aggregate documents are written to.
    #[serde(default = "default_aggregate_bucket")]
    pub aggregate_bucket: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            raw_bucket: default_raw_bucket(),
            aggregate_bucket: default_aggregate_bucket(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("./data")
}

fn default_raw_bucket() -> String {
    "quiz-responses".to_string()
}

fn default_aggregate_bucket() -> String {
    "quiz-aggregates".to_string()
}

/// Batch processing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Submissions loaded, and documents written, concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments (and their environment variables) take precedence over
    /// config file settings, but only when a value was actually given.
    pub fn merge_with_args(&mut self, args: &Args) {
        if let Some(ref root) = args.storage_root {
            self.storage.root = root.clone();
        }
        if let Some(ref bucket) = args.raw_bucket {
            self.storage.raw_bucket = bucket.clone();
        }
        if let Some(ref bucket) = args.aggregate_bucket {
            self.storage.aggregate_bucket = bucket.clone();
        }

        if let Command::Process(ref process) = args.command {
            if let Some(concurrency) = process.concurrency {
                self.processing.concurrency = concurrency;
            }
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Log level once flags have been merged in. `--quiet` wins.
    pub fn log_level(&self, args: &Args) -> tracing::Level {
        if args.quiet {
            tracing::Level::ERROR
        } else if self.general.verbose {
            tracing::Level::DEBUG
        } else {
            args.log_level()
        }
    }

    /// Reject settings that cannot work together.
    pub fn validate(&self) -> Result<()> {
        if self.storage.raw_bucket == self.storage.aggregate_bucket {
            bail!(
                "raw_bucket and aggregate_bucket must differ (both are '{}')",
                self.storage.raw_bucket
            );
        }
        if self.processing.concurrency == 0 {
            bail!("processing.concurrency must be at least 1");
        }
        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.storage.raw_bucket, "quiz-responses");
        assert_eq!(config.storage.aggregate_bucket, "quiz-aggregates");
        assert_eq!(config.processing.concurrency, 4);
        assert!(!config.general.verbose);
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
verbose = true

[storage]
root = "/srv/quiz"
aggregate_bucket = "monthly"

[processing]
concurrency = 8
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert!(config.general.verbose);
        assert_eq!(config.storage.root, PathBuf::from("/srv/quiz"));
        assert_eq!(config.storage.raw_bucket, "quiz-responses");
        assert_eq!(config.storage.aggregate_bucket, "monthly");
        assert_eq!(config.processing.concurrency, 8);
    }

    #[test]
    fn test_merge_with_args() {
        let args = Args::try_parse_from([
            "quiztally",
            "process",
            "--prefix",
            "1/",
            "--concurrency",
            "2",
            "--raw-bucket",
            "incoming",
        ])
        .unwrap();

        let mut config = Config::default();
        config.storage.aggregate_bucket = "from-file".to_string();
        config.merge_with_args(&args);

        assert_eq!(config.storage.raw_bucket, "incoming");
        assert_eq!(config.storage.aggregate_bucket, "from-file");
        assert_eq!(config.processing.concurrency, 2);
    }

    #[test]
    fn test_verbose_from_file_raises_log_level() {
        let args = Args::try_parse_from(["quiztally", "process", "--prefix", "1/"]).unwrap();
        let mut config: Config = toml::from_str("[general]\nverbose = true\n").unwrap();
        config.merge_with_args(&args);
        assert_eq!(config.log_level(&args), tracing::Level::DEBUG);

        let quiet = Args::try_parse_from(["quiztally", "--quiet", "process", "--prefix", "1/"]).unwrap();
        assert_eq!(config.log_level(&quiet), tracing::Level::ERROR);

        assert_eq!(Config::default().log_level(&args), tracing::Level::INFO);
    }

    #[test]
    fn test_validate_rejects_shared_bucket() {
        assert!(Config::default().validate().is_ok());

        let args = Args::try_parse_from([
            "quiztally",
            "process",
            "--prefix",
            "1/",
            "--raw-bucket",
            "quiz-aggregates",
        ])
        .unwrap();
        let mut config = Config::default();
        config.merge_with_args(&args);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("must differ"));

        let config: Config = toml::from_str("[processing]\nconcurrency = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(!toml_str.is_empty());
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[storage]"));
        assert!(toml_str.contains("[processing]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.storage.raw_bucket, "quiz-responses");
    }
}
