//! Configuration for evalloop.
//!
//! Loaded from .evalloop.yml or ~/.config/evalloop/evalloop.yml, falling back
//! to defaults. The flat [`LoopConfig`] handed to the core is projected from it.

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONCURRENCY_LIMIT: usize = 4;
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;
pub const DEFAULT_TIMEOUT_SECONDS: f64 = 600.0;
pub const DEFAULT_MAX_COST: f64 = 10.0;
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Log level override (otherwise RUST_LOG).
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Evaluator settings.
    pub evaluation: EvaluationConfig,

    /// Stop-condition thresholds.
    pub stop: StopConfig,

    /// Reflection settings.
    pub reflection: ReflectionConfig,

    /// Storage settings.
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration with fallback chain.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. .evalloop.yml in current directory
    /// 3. ~/.config/evalloop/evalloop.yml
    /// 4. Defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let project_config = PathBuf::from(".evalloop.yml");
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => {
                    log::info!("Loaded config from .evalloop.yml");
                    return Ok(config);
                }
                Err(e) => {
                    log::warn!("Failed to load .evalloop.yml: {}", e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("evalloop").join("evalloop.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", user_config.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        log::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.evaluation.concurrency_limit == 0 {
            eyre::bail!("evaluation.concurrency-limit must be > 0");
        }
        if self.evaluation.repeat_times == 0 {
            eyre::bail!("evaluation.repeat-times must be > 0");
        }
        if self.stop.max_iterations == 0 {
            eyre::bail!("stop.max-iterations must be > 0");
        }
        if self.stop.timeout_seconds <= 0.0 {
            eyre::bail!("stop.timeout-seconds must be > 0");
        }
        if self.stop.max_cost < 0.0 {
            eyre::bail!("stop.max-cost must be >= 0");
        }
        if self.stop.confirmation_threshold == 0 {
            eyre::bail!("stop.confirmation-threshold must be > 0");
        }
        if self.reflection.history_size == 0 {
            eyre::bail!("reflection.history-size must be > 0");
        }
        Ok(())
    }

    /// Project the flat loop configuration used by the evaluator, detectors and controller.
    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            concurrency_limit: self.evaluation.concurrency_limit,
            repeat_times: self.evaluation.repeat_times,
            max_iterations: self.stop.max_iterations,
            timeout_seconds: self.stop.timeout_seconds,
            max_cost: self.stop.max_cost,
            max_consecutive_failures: self.stop.max_consecutive_failures,
            confirmation_threshold: self.stop.confirmation_threshold,
        }
    }
}

/// Evaluator settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Maximum number of in-flight predict+score units.
    #[serde(rename = "concurrency-limit")]
    pub concurrency_limit: usize,

    /// Number of full passes over the dataset.
    #[serde(rename = "repeat-times")]
    pub repeat_times: usize,

    /// Scorer registry keys used by the CLI.
    pub scorers: Vec<String>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            repeat_times: 1,
            scorers: vec!["exact_match".to_string()],
        }
    }
}

/// Stop-condition thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StopConfig {
    #[serde(rename = "max-iterations")]
    pub max_iterations: u32,

    #[serde(rename = "timeout-seconds")]
    pub timeout_seconds: f64,

    #[serde(rename = "max-cost")]
    pub max_cost: f64,

    #[serde(rename = "max-consecutive-failures")]
    pub max_consecutive_failures: u32,

    /// Successful validations required before completion.
    #[serde(rename = "confirmation-threshold")]
    pub confirmation_threshold: u32,

    /// Identical consecutive outputs tolerated before the loop is considered stuck.
    #[serde(rename = "max-repeated-outputs")]
    pub max_repeated_outputs: u32,

    #[serde(rename = "min-available-memory-mb")]
    pub min_available_memory_mb: Option<u64>,

    #[serde(rename = "min-available-disk-mb")]
    pub min_available_disk_mb: Option<u64>,
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            max_cost: DEFAULT_MAX_COST,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            confirmation_threshold: 1,
            max_repeated_outputs: 3,
            min_available_memory_mb: None,
            min_available_disk_mb: None,
        }
    }
}

/// Reflection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReflectionConfig {
    /// Number of reflection results retained in history.
    #[serde(rename = "history-size")]
    pub history_size: usize,

    /// Maximum suggestions carried into the next iteration.
    #[serde(rename = "max-suggestions")]
    pub max_suggestions: usize,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            history_size: 20,
            max_suggestions: 5,
        }
    }
}

/// Storage settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".evalloop"),
        }
    }
}

/// Flat configuration passed into the core components.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoopConfig {
    pub concurrency_limit: usize,
    pub repeat_times: usize,
    pub max_iterations: u32,
    pub timeout_seconds: f64,
    pub max_cost: f64,
    pub max_consecutive_failures: u32,
    pub confirmation_threshold: u32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Config::default().loop_config()
    }
}
