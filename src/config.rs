//! Run configuration
//!
//! The pipeline only ever sees a resolved [`Config`]. Reading the environment is the
//! surrounding process's job; [`Config::from_env`] is provided for it.

use crate::algorithm::SubstitutionPolicy;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Environment variable holding the substitution policy
pub const ENV_POLICY: &str = "ALGORITHM_SUBSTITUTION_POLICY";
/// Environment variable holding the verbosity flag
pub const ENV_VERBOSE: &str = "VERBOSE";
/// Environment variable holding the plot mode
pub const ENV_PLOT_MODE: &str = "PLOT_MODE";
/// Environment variable holding the comma separated report formats
pub const ENV_REPORT_FORMATS: &str = "REPORT_FORMATS";
/// Environment variable enabling parallel task execution
pub const ENV_PARALLEL_TASKS: &str = "PARALLEL_TASKS";
/// Environment variable holding the per-task timeout in seconds
pub const ENV_TASK_TIMEOUT: &str = "TASK_TIMEOUT_SECS";

/// Log verbosity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// Warnings and errors only
    Quiet,
    /// Progress per document and task
    #[default]
    Normal,
    /// Everything, including cache and resolver decisions
    Verbose,
}

impl Verbosity {
    /// Default tracing filter directive
    #[must_use]
    pub const fn filter(self) -> &'static str {
        match self {
            Self::Quiet => "warn",
            Self::Normal => "info",
            Self::Verbose => "debug",
        }
    }
}

impl FromStr for Verbosity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quiet" => Ok(Self::Quiet),
            "normal" | "0" | "false" | "no" => Ok(Self::Normal),
            "verbose" | "1" | "true" | "yes" => Ok(Self::Verbose),
            other => Err(Error::Config(format!("Unknown verbosity `{other}`"))),
        }
    }
}

/// What to do with plot outputs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlotMode {
    /// Plots are not generated (logged as skipped)
    Skip,
    /// Plots are tabulated into datasets of their data generators
    #[default]
    Tabulate,
}

impl FromStr for PlotMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" | "none" => Ok(Self::Skip),
            "tabulate" | "table" => Ok(Self::Tabulate),
            other => Err(Error::Config(format!("Unknown plot mode `{other}`"))),
        }
    }
}

/// On-disk report format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Apache Parquet
    Parquet,
    /// Comma separated values
    Csv,
}

impl ReportFormat {
    /// File extension
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Parquet => "parquet",
            Self::Csv => "csv",
        }
    }
}

impl FromStr for ReportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "parquet" => Ok(Self::Parquet),
            "csv" => Ok(Self::Csv),
            other => Err(Error::Config(format!("Unknown report format `{other}`"))),
        }
    }
}

/// Resolved configuration of one archive execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How far the resolver may deviate from a requested algorithm
    pub algorithm_substitution_policy: SubstitutionPolicy,
    /// Log verbosity
    pub verbosity: Verbosity,
    /// Plot handling
    pub plot_mode: PlotMode,
    /// Report formats written by the report writer
    pub report_formats: Vec<ReportFormat>,
    /// Run independent tasks of a document in parallel
    pub parallel_tasks: bool,
    /// Hard per-task time limit
    pub task_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            algorithm_substitution_policy: SubstitutionPolicy::default(),
            verbosity: Verbosity::default(),
            plot_mode: PlotMode::default(),
            report_formats: vec![ReportFormat::Parquet],
            parallel_tasks: false,
            task_timeout: None,
        }
    }
}

impl Config {
    /// Create a configuration builder
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Resolve configuration from process environment variables
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    /// Returns `Error::Config` if a variable holds an invalid value
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve configuration from an arbitrary key lookup
    ///
    /// # Errors
    /// Returns `Error::Config` if a value is invalid
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(value) = lookup(ENV_POLICY) {
            config.algorithm_substitution_policy = value.parse()?;
        }
        if let Some(value) = lookup(ENV_VERBOSE) {
            config.verbosity = value.parse()?;
        }
        if let Some(value) = lookup(ENV_PLOT_MODE) {
            config.plot_mode = value.parse()?;
        }
        if let Some(value) = lookup(ENV_REPORT_FORMATS) {
            config.report_formats = value
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(str::parse::<ReportFormat>)
                .collect::<Result<_>>()?;
        }
        if let Some(value) = lookup(ENV_PARALLEL_TASKS) {
            config.parallel_tasks = parse_flag(ENV_PARALLEL_TASKS, &value)?;
        }
        if let Some(value) = lookup(ENV_TASK_TIMEOUT) {
            let secs: f64 = value
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("{ENV_TASK_TIMEOUT} must be a number of seconds, got `{value}`")))?;
            if !secs.is_finite() || secs <= 0.0 {
                return Err(Error::Config(format!("{ENV_TASK_TIMEOUT} must be positive, got `{value}`")));
            }
            let timeout = Duration::try_from_secs_f64(secs)
                .map_err(|e| Error::Config(format!("{ENV_TASK_TIMEOUT} is out of range, got `{value}`: {e}")))?;
            config.task_timeout = Some(timeout);
        }
        Ok(config)
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!("{key} must be a boolean, got `{value}`"))),
    }
}

/// Builder for [`Config`]
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the algorithm substitution policy
    #[must_use]
    pub fn policy(mut self, policy: SubstitutionPolicy) -> Self {
        self.config.algorithm_substitution_policy = policy;
        self
    }

    /// Set the verbosity
    #[must_use]
    pub fn verbosity(mut self, verbosity: Verbosity) -> Self {
        self.config.verbosity = verbosity;
        self
    }

    /// Set the plot mode
    #[must_use]
    pub fn plot_mode(mut self, plot_mode: PlotMode) -> Self {
        self.config.plot_mode = plot_mode;
        self
    }

    /// Set the report formats
    #[must_use]
    pub fn report_formats(mut self, formats: impl Into<Vec<ReportFormat>>) -> Self {
        self.config.report_formats = formats.into();
        self
    }

    /// Enable or disable parallel task execution
    #[must_use]
    pub fn parallel_tasks(mut self, parallel: bool) -> Self {
        self.config.parallel_tasks = parallel;
        self
    }

    /// Set the per-task timeout
    #[must_use]
    pub fn task_timeout(mut self, timeout: Duration) -> Self {
        self.config.task_timeout = Some(timeout);
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> Config {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.algorithm_substitution_policy, SubstitutionPolicy::SimilarVariables);
        assert_eq!(config.report_formats, vec![ReportFormat::Parquet]);
        assert_eq!(config.plot_mode, PlotMode::Tabulate);
        assert!(config.task_timeout.is_none());
    }

    #[test]
    fn test_from_lookup() {
        let config = Config::from_lookup(lookup(&[
            (ENV_POLICY, "none"),
            (ENV_VERBOSE, "1"),
            (ENV_PLOT_MODE, "skip"),
            (ENV_REPORT_FORMATS, "csv, parquet"),
            (ENV_PARALLEL_TASKS, "true"),
            (ENV_TASK_TIMEOUT, "2.5"),
        ]))
        .unwrap();
        assert_eq!(config.algorithm_substitution_policy, SubstitutionPolicy::None);
        assert_eq!(config.verbosity, Verbosity::Verbose);
        assert_eq!(config.plot_mode, PlotMode::Skip);
        assert_eq!(config.report_formats, vec![ReportFormat::Csv, ReportFormat::Parquet]);
        assert!(config.parallel_tasks);
        assert_eq!(config.task_timeout, Some(Duration::from_millis(2500)));
    }

    #[test]
    fn test_invalid_values() {
        assert!(Config::from_lookup(lookup(&[(ENV_POLICY, "SOMETIMES")])).is_err());
        assert!(Config::from_lookup(lookup(&[(ENV_REPORT_FORMATS, "hdf5")])).is_err());
        assert!(Config::from_lookup(lookup(&[(ENV_TASK_TIMEOUT, "-1")])).is_err());
        assert!(Config::from_lookup(lookup(&[(ENV_PARALLEL_TASKS, "maybe")])).is_err());
    }

    #[test]
    fn test_oversized_timeout_is_config_error() {
        let err = Config::from_lookup(lookup(&[(ENV_TASK_TIMEOUT, "1e30")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_verbose_flag_off_is_normal() {
        for value in ["0", "false", "no"] {
            let config = Config::from_lookup(lookup(&[(ENV_VERBOSE, value)])).unwrap();
            assert_eq!(config.verbosity, Verbosity::Normal);
        }
        let config = Config::from_lookup(lookup(&[(ENV_VERBOSE, "quiet")])).unwrap();
        assert_eq!(config.verbosity, Verbosity::Quiet);
    }

    #[test]
    fn test_builder() {
        let config = Config::builder()
            .policy(SubstitutionPolicy::Any)
            .report_formats([ReportFormat::Csv])
            .task_timeout(Duration::from_secs(1))
            .build();
        assert_eq!(config.algorithm_substitution_policy, SubstitutionPolicy::Any);
        assert_eq!(config.report_formats, vec![ReportFormat::Csv]);
        assert_eq!(config.task_timeout, Some(Duration::from_secs(1)));
    }
}
