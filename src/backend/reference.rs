//! Deterministic reference backend
//!
//! Simulates mass-action reaction networks stored as JSON with a fixed-step RK4
//! integrator. It stands in for a real solver in tests, benches and demos; the
//! capability table mirrors a typical ODE backend (LSODA without events, CVODE with).

use super::{BackendError, ModelFeatures, SimulationBackend, SimulationRun, Trajectories};
use crate::algorithm::{BackendAlgorithm, ObservableKind, ParameterSpec, ResolvedAlgorithm, ValueType};
use crate::changes::ChangeFailure;
use crate::sedml::{target_id, ModelChange, SBML_LANGUAGE};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Language URN of the native JSON format
pub const REACTION_NETWORK_LANGUAGE: &str = "urn:sedml:language:reaction-network";

const MAX_STEP: &str = "KISAO_0000467";
const MAX_STEPS: &str = "KISAO_0000415";
const DEFAULT_SUBSTEPS: usize = 20;
/// Substeps per output interval beyond which a run is refused
const SUBSTEP_LIMIT: u32 = u32::MAX;

/// Species of a reaction network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Species {
    /// Species id
    pub id: String,
    /// Initial amount
    pub initial: f64,
    /// Boundary species that never changes
    #[serde(default)]
    pub fixed: bool,
}

/// Named constant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkParameter {
    /// Parameter id
    pub id: String,
    /// Value
    pub value: f64,
}

/// Mass-action reaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    /// Reaction id, recordable as a flux
    pub id: String,
    /// Consumed species (repeat an id for higher stoichiometry)
    #[serde(default)]
    pub reactants: Vec<String>,
    /// Produced species
    #[serde(default)]
    pub products: Vec<String>,
    /// Id of the rate constant parameter
    pub rate_constant: String,
}

/// Threshold event: fires when a species rises to or above a threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event id
    pub id: String,
    /// Watched species
    pub species: String,
    /// Trigger threshold
    pub threshold: f64,
    /// Species assignments applied when triggered
    pub assignments: Vec<Assignment>,
}

/// Event assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    /// Assigned species
    pub species: String,
    /// New amount
    pub value: f64,
}

/// Model type of the reference backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReactionNetwork {
    /// Species
    pub species: Vec<Species>,
    /// Parameters
    #[serde(default)]
    pub parameters: Vec<NetworkParameter>,
    /// Reactions
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    /// Events
    #[serde(default)]
    pub events: Vec<Event>,
}

impl ReactionNetwork {
    /// Parse and validate a network from JSON text
    ///
    /// # Errors
    /// Returns a diagnostic if the JSON is malformed or references unknown ids
    pub fn from_json(text: &str) -> Result<Self, BackendError> {
        let network: Self =
            serde_json::from_str(text).map_err(|e| BackendError(format!("malformed reaction network: {e}")))?;
        network.validate()?;
        Ok(network)
    }

    fn validate(&self) -> Result<(), BackendError> {
        let mut ids = FxHashSet::default();
        for id in self
            .species
            .iter()
            .map(|s| &s.id)
            .chain(self.parameters.iter().map(|p| &p.id))
            .chain(self.reactions.iter().map(|r| &r.id))
        {
            if !ids.insert(id.as_str()) {
                return Err(BackendError(format!("duplicate id `{id}`")));
            }
        }

        for reaction in &self.reactions {
            if self.parameter_index(&reaction.rate_constant).is_none() {
                return Err(BackendError(format!(
                    "reaction `{}` references unknown rate constant `{}`",
                    reaction.id, reaction.rate_constant
                )));
            }
            for species in reaction.reactants.iter().chain(&reaction.products) {
                if self.species_index(species).is_none() {
                    return Err(BackendError(format!(
                        "reaction `{}` references unknown species `{species}`",
                        reaction.id
                    )));
                }
            }
        }

        for event in &self.events {
            for species in std::iter::once(&event.species).chain(event.assignments.iter().map(|a| &a.species)) {
                if self.species_index(species).is_none() {
                    return Err(BackendError(format!(
                        "event `{}` references unknown species `{species}`",
                        event.id
                    )));
                }
            }
        }
        Ok(())
    }

    fn species_index(&self, id: &str) -> Option<usize> {
        self.species.iter().position(|s| s.id == id)
    }

    fn parameter_index(&self, id: &str) -> Option<usize> {
        self.parameters.iter().position(|p| p.id == id)
    }
}

/// Reaction with ids resolved to indices
struct CompiledReaction {
    reactants: Vec<usize>,
    products: Vec<usize>,
    rate_constant: f64,
}

struct CompiledEvent {
    species: usize,
    threshold: f64,
    assignments: Vec<(usize, f64)>,
}

/// Network compiled for integration
struct Compiled {
    reactions: Vec<CompiledReaction>,
    events: Vec<CompiledEvent>,
    fixed: Vec<bool>,
}

impl Compiled {
    fn new(network: &ReactionNetwork) -> Self {
        let reactions = network
            .reactions
            .iter()
            .map(|r| CompiledReaction {
                reactants: r.reactants.iter().filter_map(|s| network.species_index(s)).collect(),
                products: r.products.iter().filter_map(|s| network.species_index(s)).collect(),
                rate_constant: network
                    .parameter_index(&r.rate_constant)
                    .map_or(0.0, |i| network.parameters[i].value),
            })
            .collect();
        let events = network
            .events
            .iter()
            .filter_map(|e| {
                Some(CompiledEvent {
                    species: network.species_index(&e.species)?,
                    threshold: e.threshold,
                    assignments: e
                        .assignments
                        .iter()
                        .filter_map(|a| network.species_index(&a.species).map(|i| (i, a.value)))
                        .collect(),
                })
            })
            .collect();
        Self {
            reactions,
            events,
            fixed: network.species.iter().map(|s| s.fixed).collect(),
        }
    }

    fn fluxes(&self, state: &[f64]) -> Vec<f64> {
        self.reactions
            .iter()
            .map(|r| r.rate_constant * r.reactants.iter().map(|&i| state[i]).product::<f64>())
            .collect()
    }

    fn derivative(&self, state: &[f64]) -> Vec<f64> {
        let mut dy = vec![0.0; state.len()];
        for (reaction, flux) in self.reactions.iter().zip(self.fluxes(state)) {
            for &i in &reaction.reactants {
                dy[i] -= flux;
            }
            for &i in &reaction.products {
                dy[i] += flux;
            }
        }
        for (d, fixed) in dy.iter_mut().zip(&self.fixed) {
            if *fixed {
                *d = 0.0;
            }
        }
        dy
    }

    fn rk4_step(&self, state: &mut [f64], h: f64) {
        let offset = |base: &[f64], k: &[f64], scale: f64| -> Vec<f64> {
            base.iter().zip(k).map(|(y, k)| y + scale * k).collect()
        };
        let k1 = self.derivative(state);
        let k2 = self.derivative(&offset(state, &k1, h / 2.0));
        let k3 = self.derivative(&offset(state, &k2, h / 2.0));
        let k4 = self.derivative(&offset(state, &k3, h));
        for (i, y) in state.iter_mut().enumerate() {
            *y += h / 6.0 * (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]);
        }
    }

    /// Fire events whose watched species crossed its threshold from below
    fn fire_events(&self, before: &[f64], state: &mut [f64]) {
        for event in &self.events {
            if before[event.species] < event.threshold && state[event.species] >= event.threshold {
                for &(i, value) in &event.assignments {
                    state[i] = value;
                }
            }
        }
    }
}

/// Reference backend over [`ReactionNetwork`] models
#[derive(Debug, Clone)]
pub struct ReferenceBackend {
    algorithms: Vec<BackendAlgorithm>,
}

impl Default for ReferenceBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceBackend {
    /// Backend with LSODA (no events) and CVODE (events) entries
    #[must_use]
    pub fn new() -> Self {
        let observables = [ObservableKind::Concentration, ObservableKind::Amount, ObservableKind::Flux]
            .into_iter()
            .collect::<std::collections::BTreeSet<_>>();
        let params = |prefix: &str| {
            vec![
                ParameterSpec::new("KISAO_0000209", format!("{prefix}_rtol"), "relative tolerance", ValueType::Float),
                ParameterSpec::new("KISAO_0000211", format!("{prefix}_atol"), "absolute tolerance", ValueType::Float),
                ParameterSpec::new(MAX_STEPS, format!("{prefix}_mxstep"), "maximum number of steps", ValueType::Integer),
                ParameterSpec::new(MAX_STEP, format!("{prefix}_hmax"), "maximum step size", ValueType::Float),
            ]
        };
        Self {
            algorithms: vec![
                BackendAlgorithm {
                    kisao_id: "KISAO_0000088".to_string(),
                    backend_id: "LSODA".to_string(),
                    observables: observables.clone(),
                    parameters: params("lsoda"),
                    supports_events: false,
                },
                BackendAlgorithm {
                    kisao_id: "KISAO_0000019".to_string(),
                    backend_id: "CVODE".to_string(),
                    observables,
                    parameters: params("cvode"),
                    supports_events: true,
                },
            ],
        }
    }

    fn setting<'a>(algorithm: &'a ResolvedAlgorithm, kisao_id: &str) -> Option<&'a crate::algorithm::ParameterValue> {
        algorithm
            .parameters
            .iter()
            .find(|p| p.kisao_id == kisao_id)
            .map(|p| &p.value)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn substeps(algorithm: &ResolvedAlgorithm, interval: f64) -> Result<usize, BackendError> {
        // counted in f64 so a tiny hmax cannot saturate the integer conversion
        let substeps = match Self::setting(algorithm, MAX_STEP).and_then(|v| v.as_f64()) {
            Some(hmax) if hmax > 0.0 => (interval / hmax).ceil().max(1.0),
            _ => DEFAULT_SUBSTEPS as f64,
        };
        if let Some(mxstep) = Self::setting(algorithm, MAX_STEPS).and_then(|v| v.as_i64()) {
            if mxstep > 0 && substeps > mxstep as f64 {
                return Err(BackendError(format!(
                    "excess work done on this call: {substeps:e} internal steps needed per output interval, \
                     mxstep = {mxstep}"
                )));
            }
        }
        if !substeps.is_finite() || substeps > f64::from(SUBSTEP_LIMIT) {
            return Err(BackendError(format!(
                "maximum step size is too small: {substeps:e} internal steps needed per output interval"
            )));
        }
        Ok(substeps as usize)
    }
}

impl SimulationBackend for ReferenceBackend {
    type Model = ReactionNetwork;

    fn name(&self) -> &str {
        "reference"
    }

    fn algorithms(&self) -> &[BackendAlgorithm] {
        &self.algorithms
    }

    fn supports_language(&self, language: &str) -> bool {
        language.starts_with(SBML_LANGUAGE) || language.starts_with(REACTION_NETWORK_LANGUAGE)
    }

    fn load_model(&self, path: &Path) -> Result<ReactionNetwork, BackendError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| BackendError(format!("cannot read {}: {e}", path.display())))?;
        ReactionNetwork::from_json(&text)
    }

    fn features(&self, model: &ReactionNetwork) -> ModelFeatures {
        ModelFeatures {
            events: !model.events.is_empty(),
        }
    }

    fn apply_change(&self, model: &mut ReactionNetwork, change: &ModelChange) -> Result<(), ChangeFailure> {
        let ModelChange::ChangeAttribute { target, new_value } = change else {
            return Err(ChangeFailure::Unsupported(format!(
                "the {} backend only supports attribute changes",
                self.name()
            )));
        };
        let id = target_id(target).ok_or_else(|| ChangeFailure::TargetNotFound(target.clone()))?;
        let value: f64 = new_value.trim().parse().map_err(|_| ChangeFailure::TypeMismatch {
            target: id.to_string(),
            value: new_value.clone(),
        })?;

        if let Some(species) = model.species.iter_mut().find(|s| s.id == id) {
            species.initial = value;
        } else if let Some(parameter) = model.parameters.iter_mut().find(|p| p.id == id) {
            parameter.value = value;
        } else {
            return Err(ChangeFailure::TargetNotFound(id.to_string()));
        }
        Ok(())
    }

    #[allow(clippy::cast_precision_loss)]
    fn simulate(&self, model: &ReactionNetwork, run: &SimulationRun<'_>) -> Result<Trajectories, BackendError> {
        if run.points == 0 {
            return Err(BackendError("at least one output point is required".to_string()));
        }
        if !model.events.is_empty()
            && !self
                .algorithms
                .iter()
                .any(|a| a.backend_id == run.algorithm.backend_id && a.supports_events)
        {
            return Err(BackendError(format!(
                "{} cannot integrate models with events",
                run.algorithm.backend_id
            )));
        }

        let compiled = Compiled::new(model);
        let interval = if run.points > 1 {
            (run.end_time - run.initial_time) / (run.points - 1) as f64
        } else {
            0.0
        };
        let substeps = Self::substeps(run.algorithm, interval)?;
        let h = interval / substeps as f64;

        let dynamic: Vec<usize> = (0..model.species.len()).filter(|&i| !model.species[i].fixed).collect();
        let mut state: Vec<f64> = model.species.iter().map(|s| s.initial).collect();
        let mut time = Vec::with_capacity(run.points);
        let mut species_series = vec![Vec::with_capacity(run.points); dynamic.len()];
        let mut flux_series = vec![Vec::with_capacity(run.points); model.reactions.len()];

        for point in 0..run.points {
            if point > 0 {
                for _ in 0..substeps {
                    if run.aborted() {
                        let t = run.initial_time + interval * (point - 1) as f64;
                        return Err(BackendError(format!("run aborted at t = {t}")));
                    }
                    let before = state.clone();
                    compiled.rk4_step(&mut state, h);
                    compiled.fire_events(&before, &mut state);
                }
            }
            let t = run.initial_time + interval * point as f64;
            if let Some(i) = state.iter().position(|y| !y.is_finite()) {
                return Err(BackendError(format!(
                    "species `{}` became non-finite at t = {t}",
                    model.species[i].id
                )));
            }
            time.push(t);
            for (series, &i) in species_series.iter_mut().zip(&dynamic) {
                series.push(state[i]);
            }
            for (series, flux) in flux_series.iter_mut().zip(compiled.fluxes(&state)) {
                series.push(flux);
            }
        }

        let mut series = FxHashMap::default();
        for (values, &i) in species_series.into_iter().zip(&dynamic) {
            series.insert(model.species[i].id.clone(), values);
        }
        for (values, reaction) in flux_series.into_iter().zip(&model.reactions) {
            series.insert(reaction.id.clone(), values);
        }

        let mut constants = FxHashMap::default();
        for species in model.species.iter().filter(|s| s.fixed) {
            constants.insert(species.id.clone(), species.initial);
        }
        for parameter in &model.parameters {
            constants.insert(parameter.id.clone(), parameter.value);
        }

        Ok(Trajectories {
            time,
            series,
            constants,
        })
    }
}
