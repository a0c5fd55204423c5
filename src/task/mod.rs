//! Task preprocessing and execution

mod executor;
mod preprocess;
mod repeated;

pub use executor::{extract_variables, Deadline, TaskExecutor};
pub use preprocess::{PreprocessCache, PreprocessedTask, Preprocessor, TimeCourse};

use rustc_hash::FxHashMap;

/// Variable id → recorded series
pub type VariableResults = FxHashMap<String, Vec<f64>>;

/// Result of one task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    /// Recorded variables
    pub results: VariableResults,
    /// KiSAO id of the executed algorithm
    pub algorithm: String,
    /// Backend method and arguments
    pub simulator_details: serde_json::Value,
}
