//! Simulation backend boundary
//!
//! The pipeline never integrates anything itself. A backend supplies:
//! - a capability table (`algorithms`) the resolver matches requests against
//! - model loading and change application on its own model type
//! - the numerical run entry point, returning raw trajectories
//!
//! `Model` must be `Clone`: every run works on a private copy of the canonical model
//! held by a preprocessed task.

mod reference;

pub use reference::{
    Assignment, Event, NetworkParameter, Reaction, ReactionNetwork, ReferenceBackend, Species, REACTION_NETWORK_LANGUAGE,
};

use crate::algorithm::{BackendAlgorithm, ResolvedAlgorithm};
use crate::changes::ChangeFailure;
use crate::sedml::ModelChange;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Backend diagnostic text
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct BackendError(pub String);

/// Model features that restrict which algorithms can run it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelFeatures {
    /// Model declares discrete events
    pub events: bool,
}

/// Arguments of one numerical run
#[derive(Debug, Clone, Copy)]
pub struct SimulationRun<'a> {
    /// Resolved algorithm and its accepted parameters
    pub algorithm: &'a ResolvedAlgorithm,
    /// Time the integration starts at
    pub initial_time: f64,
    /// Time the integration ends at
    pub end_time: f64,
    /// Number of evenly spaced output points, both ends included
    pub points: usize,
    /// Set by the caller to abort the run; backends poll it between steps
    pub abort: Option<&'a AtomicBool>,
}

impl SimulationRun<'_> {
    /// Whether the caller asked to abort
    #[must_use]
    pub fn aborted(&self) -> bool {
        self.abort.is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// Raw numeric output of one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trajectories {
    /// Output time points
    pub time: Vec<f64>,
    /// Time courses keyed by model element id
    pub series: FxHashMap<String, Vec<f64>>,
    /// Quantities that stay constant (fixed species, parameters)
    pub constants: FxHashMap<String, f64>,
}

impl Trajectories {
    /// Ids of every quantity that can be recorded
    #[must_use]
    pub fn recordable_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .series
            .keys()
            .chain(self.constants.keys())
            .map(String::as_str)
            .collect();
        ids.sort_unstable();
        ids
    }
}

/// A biological-model simulation backend
pub trait SimulationBackend: Send + Sync {
    /// Backend-native loaded model
    type Model: Clone + Send + Sync + 'static;

    /// Backend name, used in simulator details
    fn name(&self) -> &str;

    /// Capability table consumed by the algorithm resolver
    fn algorithms(&self) -> &[BackendAlgorithm];

    /// Whether models in this language (URN) can be loaded
    fn supports_language(&self, language: &str) -> bool;

    /// Load a model from a resolved file path
    ///
    /// # Errors
    /// Returns the backend diagnostic if the file cannot be imported
    fn load_model(&self, path: &Path) -> Result<Self::Model, BackendError>;

    /// Features of a loaded model
    fn features(&self, model: &Self::Model) -> ModelFeatures;

    /// Apply one declared change to a model in place
    ///
    /// # Errors
    /// Returns why the change cannot be applied
    fn apply_change(&self, model: &mut Self::Model, change: &ModelChange) -> Result<(), ChangeFailure>;

    /// Run a simulation
    ///
    /// # Errors
    /// Returns the backend diagnostic on numerical failure
    fn simulate(&self, model: &Self::Model, run: &SimulationRun<'_>) -> Result<Trajectories, BackendError>;

    /// Method and arguments recorded in the task log
    fn simulator_details(&self, algorithm: &ResolvedAlgorithm) -> serde_json::Value {
        let arguments: serde_json::Map<String, serde_json::Value> = algorithm
            .parameters
            .iter()
            .filter_map(|p| {
                serde_json::to_value(&p.value)
                    .ok()
                    .map(|v| (p.backend_id.clone(), v))
            })
            .collect();
        serde_json::json!({
            "method": format!("{}.{}", self.name(), algorithm.backend_id),
            "arguments": arguments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recordable_ids_sorted() {
        let mut traj = Trajectories::default();
        traj.series.insert("B".to_string(), vec![0.0]);
        traj.series.insert("A".to_string(), vec![0.0]);
        traj.constants.insert("k".to_string(), 1.0);
        assert_eq!(traj.recordable_ids(), vec!["A", "B", "k"]);
    }
}
