//! Error types for sedml-exec
//!
//! Two layers:
//! - [`Error`]: structural failures (I/O, Arrow/Parquet, configuration). These are the
//!   only errors allowed to escape the archive orchestrator.
//! - [`ExecError`]: failures of one unit of work (task, output, document). These are
//!   caught at the smallest enclosing unit and recorded in its log node.

use crate::algorithm::SubstitutionPolicy;
use crate::changes::ChangeFailure;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Structural error types
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration value could not be resolved
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input handed in by a collaborator
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Report could not be serialized
    #[error("Report writer error: {0}")]
    ReportWriter(String),

    /// Log node lifecycle violated (programmer error)
    #[error("Execution log error: {0}")]
    Log(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Kind of a unit-level execution failure, as recorded in the execution log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// No backend algorithm satisfies the request under the active policy.
    AlgorithmUnsupported,
    /// Numerical settings of a simulation are inconsistent.
    InvalidSimulationSettings,
    /// The model could not be imported by the backend.
    ModelLoadError,
    /// A declared model change could not be applied.
    ModelChangeError,
    /// The backend raised a numerical failure.
    SimulationExecutionError,
    /// A requested variable cannot be recorded.
    UnsupportedVariable,
    /// A data generator expression cannot be parsed or evaluated.
    InvalidExpression,
    /// An output references data that is not available.
    ReportAssemblyError,
    /// A task exceeded the configured time limit.
    Timeout,
    /// The unit was not started because execution was cancelled.
    Cancelled,
}

/// Unit-level execution failure.
///
/// `Clone` so that a failed preprocessing attempt can be cached and reported by every
/// task that shares the same (model, simulation) pair.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecError {
    /// Algorithm resolution failed
    #[error("Algorithm `{requested}` is not supported (substitution policy reached: {policy}): {reason}")]
    AlgorithmUnsupported {
        /// Requested KiSAO id
        requested: String,
        /// Most permissive policy level that was tried
        policy: SubstitutionPolicy,
        /// Human readable reason
        reason: String,
    },

    /// Simulation settings are structurally inconsistent
    #[error("Simulation `{simulation}` is invalid: {reason}")]
    InvalidSimulationSettings {
        /// Simulation id
        simulation: String,
        /// Human readable reason
        reason: String,
    },

    /// Model could not be loaded
    #[error("Model `{model}` at {location} could not be imported:\n  {reason}")]
    ModelLoad {
        /// Model id
        model: String,
        /// Resolved model file location
        location: String,
        /// Backend diagnostic
        reason: String,
    },

    /// Model change failed
    #[error("Change of `{target}` in model `{model}` could not be applied: {reason}")]
    ModelChange {
        /// Model id
        model: String,
        /// Target of the offending change
        target: String,
        /// Why the change failed
        reason: ChangeFailure,
    },

    /// Backend numerical failure
    #[error("Simulation of task `{task}` failed: {diagnostic}")]
    SimulationExecution {
        /// Task id
        task: String,
        /// Backend diagnostic text
        diagnostic: String,
    },

    /// Variable cannot be recorded
    #[error("Variables of task `{task}` cannot be recorded: {reason}")]
    UnsupportedVariable {
        /// Task id
        task: String,
        /// Human readable reason
        reason: String,
    },

    /// Data generator or set-value math failed
    #[error("Expression of `{owner}` is invalid: {reason}")]
    InvalidExpression {
        /// Id of the data generator or repeated task owning the expression
        owner: String,
        /// Human readable reason
        reason: String,
    },

    /// Output could not be assembled
    #[error("Output `{output}` could not be assembled: {reason}")]
    ReportAssembly {
        /// Output id
        output: String,
        /// Human readable reason
        reason: String,
    },

    /// Hard timeout hit
    #[error("Task `{task}` did not complete within {limit:?}")]
    Timeout {
        /// Task id
        task: String,
        /// Configured limit
        limit: Duration,
    },

    /// Cancelled before start
    #[error("Execution of `{unit}` was cancelled")]
    Cancelled {
        /// Id of the unit that was not started
        unit: String,
    },
}

impl ExecError {
    /// Log-level kind of this failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::AlgorithmUnsupported { .. } => ErrorKind::AlgorithmUnsupported,
            Self::InvalidSimulationSettings { .. } => ErrorKind::InvalidSimulationSettings,
            Self::ModelLoad { .. } => ErrorKind::ModelLoadError,
            Self::ModelChange { .. } => ErrorKind::ModelChangeError,
            Self::SimulationExecution { .. } => ErrorKind::SimulationExecutionError,
            Self::UnsupportedVariable { .. } => ErrorKind::UnsupportedVariable,
            Self::InvalidExpression { .. } => ErrorKind::InvalidExpression,
            Self::ReportAssembly { .. } => ErrorKind::ReportAssemblyError,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }
}
