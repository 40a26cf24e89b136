//! Search, measurement and statistics configuration
//!
//! Everything here is immutable for the lifetime of one search. The
//! `Settings` aggregate is what the binary reads from a TOML file:
//!
//! ```toml
//! [search]
//! test_case = "de.example.CalculatorTest#testAdd"
//! levels = 1
//! ignore_eois = true
//!
//! [measurement]
//! version = "a1b2c3"
//! version_old = "d4e5f6"
//! vms = 10
//! timeout_secs = 300
//!
//! [measurement.statistics]
//! significance_level = 0.05
//!
//! [command]
//! program = "./run-instrumented.sh"
//! args = ["--quiet"]
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Identifier of the test whose call tree is searched, written `Class#method`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TestCase {
    pub clazz: String,
    pub method: String,
}

impl TestCase {
    pub fn new(clazz: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            clazz: clazz.into(),
            method: method.into(),
        }
    }
}

impl fmt::Display for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.clazz, self.method)
    }
}

impl FromStr for TestCase {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.split_once('#') {
            Some((clazz, method)) if !clazz.is_empty() && !method.is_empty() => {
                Ok(Self::new(clazz, method))
            }
            _ => Err(format!("test case must be written Class#method, got `{}`", s)),
        }
    }
}

impl TryFrom<String> for TestCase {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TestCase> for String {
    fn from(value: TestCase) -> Self {
        value.to_string()
    }
}

/// Parameters of the node comparator
///
/// # Example
/// ```
/// use perfcause::config::StatisticsConfig;
///
/// let config = StatisticsConfig::default();
/// assert_eq!(config.significance_level, 0.05); // 95% confidence
/// assert_eq!(config.outlier_factor, 3.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    /// Type-1 error of the Welch test: a pair differs when p < this value
    pub significance_level: f64,

    /// z-score above which a sample is dropped as an outlier
    pub outlier_factor: f64,

    /// Within-cluster / total sum of squares below which the pooled samples
    /// count as bimodal
    pub bimodality_variance_ratio: f64,

    /// Smallest share of the pooled samples each cluster must hold before a
    /// two-cluster fit is considered at all
    pub min_cluster_fraction: f64,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            significance_level: 0.05,
            outlier_factor: 3.0,
            bimodality_variance_ratio: 0.2,
            min_cluster_fraction: 0.25,
        }
    }
}

impl StatisticsConfig {
    /// 99% confidence: fewer false causes, more missed ones
    pub fn strict() -> Self {
        Self {
            significance_level: 0.01,
            ..Self::default()
        }
    }

    /// 90% confidence: more sensitive, more false causes
    pub fn permissive() -> Self {
        Self {
            significance_level: 0.10,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if !(self.significance_level > 0.0 && self.significance_level <= 0.5) {
            return Err(format!(
                "significance_level must be in (0, 0.5], got {}",
                self.significance_level
            ));
        }

        if self.outlier_factor <= 0.0 {
            return Err(format!(
                "outlier_factor must be positive, got {}",
                self.outlier_factor
            ));
        }

        if !(0.0..=1.0).contains(&self.bimodality_variance_ratio) {
            return Err(format!(
                "bimodality_variance_ratio must be in [0, 1], got {}",
                self.bimodality_variance_ratio
            ));
        }

        if !(0.0..=0.5).contains(&self.min_cluster_fraction) {
            return Err(format!(
                "min_cluster_fraction must be in [0, 0.5], got {}",
                self.min_cluster_fraction
            ));
        }

        Ok(())
    }
}

fn default_levels() -> usize {
    1
}

fn default_ignore_eois() -> bool {
    true
}

/// Per-search parameters of the level-wise search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CauseSearchConfig {
    pub test_case: TestCase,

    /// Levels measured per frontier (the initial frontier reaches depth
    /// `levels - 1` below the root)
    #[serde(default = "default_levels")]
    pub levels: usize,

    /// Match repeated sibling calls by call order instead of execution-order
    /// index
    #[serde(default = "default_ignore_eois")]
    pub ignore_eois: bool,
}

impl CauseSearchConfig {
    pub fn new(test_case: TestCase) -> Self {
        Self {
            test_case,
            levels: default_levels(),
            ignore_eois: default_ignore_eois(),
        }
    }

    pub fn with_levels(mut self, levels: usize) -> Self {
        self.levels = levels;
        self
    }

    pub fn with_ignore_eois(mut self, ignore_eois: bool) -> Self {
        self.ignore_eois = ignore_eois;
        self
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.levels == 0 {
            return Err("levels must be at least 1".to_string());
        }
        Ok(())
    }
}

fn default_vms() -> usize {
    10
}

fn default_timeout_secs() -> u64 {
    300
}

/// Which versions are compared and how often each is measured
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementConfig {
    /// The newer version (the one suspected of regressing)
    pub version: String,

    /// The predecessor version
    pub version_old: String,

    /// Measurement runs (fresh processes) per version and frontier
    #[serde(default = "default_vms")]
    pub vms: usize,

    /// Upper bound for a single measurement run
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub statistics: StatisticsConfig,
}

impl MeasurementConfig {
    pub fn new(version: impl Into<String>, version_old: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            version_old: version_old.into(),
            vms: default_vms(),
            timeout_secs: default_timeout_secs(),
            statistics: StatisticsConfig::default(),
        }
    }

    pub fn with_vms(mut self, vms: usize) -> Self {
        self.vms = vms;
        self
    }

    pub fn with_statistics(mut self, statistics: StatisticsConfig) -> Self {
        self.statistics = statistics;
        self
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.version.is_empty() || self.version_old.is_empty() {
            return Err("version and version_old must not be empty".to_string());
        }

        if self.version == self.version_old {
            return Err(format!(
                "version and version_old must differ, both are `{}`",
                self.version
            ));
        }

        if self.vms < 2 {
            return Err(format!("vms must be >= 2 for a t-test, got {}", self.vms));
        }

        if self.timeout_secs == 0 {
            return Err("timeout_secs must be positive".to_string());
        }

        self.statistics.validate()
    }
}

/// External command that executes one instrumented run of a test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandConfig {
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

/// Root of a `perfcause.toml` file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub search: CauseSearchConfig,
    pub measurement: MeasurementConfig,
    pub command: CommandConfig,
}

impl Settings {
    /// Load settings from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        Self::from_toml_str(&content)
    }

    /// Parse and validate settings from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content).context("Failed to parse TOML")?;
        settings.search.validate().map_err(|e| anyhow::anyhow!(e))?;
        settings
            .measurement
            .validate()
            .map_err(|e| anyhow::anyhow!(e))?;
        Ok(settings)
    }
}
