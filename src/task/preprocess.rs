//! Task Preprocessor and the per-archive preprocessing cache
//!
//! Preprocessing loads a model, applies its static changes, resolves the simulation's
//! algorithm and validates the time course. The result is immutable and shared through
//! an `Arc`; runs clone its model before applying per-run changes.

use crate::algorithm::{AlgorithmCatalog, AlgorithmResolver, ResolveError, ResolvedAlgorithm, SubstitutionPolicy};
use crate::backend::SimulationBackend;
use crate::changes::apply_changes;
use crate::error::ExecError;
use crate::sedml::{Model, Simulation};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, instrument};

/// Relative tolerance for the integral point count check
const POINT_COUNT_TOLERANCE: f64 = 1e-8;

/// Validated uniform time course
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeCourse {
    /// Time the integration starts at
    pub initial_time: f64,
    /// First reported time point
    pub output_start_time: f64,
    /// Last reported (and simulated) time point
    pub output_end_time: f64,
    /// Reporting intervals; `number_of_steps + 1` points are reported
    pub number_of_steps: usize,
    /// Points the backend has to produce, from `initial_time` to `output_end_time`
    pub simulated_points: usize,
}

impl TimeCourse {
    /// Validate the numerical settings of a simulation
    ///
    /// # Errors
    /// Returns `ExecError::InvalidSimulationSettings` if the settings are inconsistent
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn new(simulation: &Simulation) -> Result<Self, ExecError> {
        let invalid = |reason: String| ExecError::InvalidSimulationSettings {
            simulation: simulation.id.clone(),
            reason,
        };
        let Simulation {
            initial_time,
            output_start_time,
            output_end_time,
            number_of_steps,
            ..
        } = *simulation;

        if ![initial_time, output_start_time, output_end_time].iter().all(|t| t.is_finite()) {
            return Err(invalid("time points must be finite".to_string()));
        }
        if output_start_time < initial_time {
            return Err(invalid(format!(
                "output start time {output_start_time} must not precede initial time {initial_time}"
            )));
        }
        if output_end_time <= output_start_time {
            return Err(invalid(format!(
                "output end time {output_end_time} must be after output start time {output_start_time}"
            )));
        }
        if number_of_steps == 0 {
            return Err(invalid("number of steps must be positive".to_string()));
        }

        let points = number_of_steps as f64 * (output_end_time - initial_time)
            / (output_end_time - output_start_time)
            + 1.0;
        let rounded = points.round();
        if (points - rounded).abs() > POINT_COUNT_TOLERANCE * rounded {
            return Err(invalid(format!(
                "time course must specify an integer number of time points, got {points}"
            )));
        }

        Ok(Self {
            initial_time,
            output_start_time,
            output_end_time,
            number_of_steps,
            simulated_points: rounded as usize,
        })
    }

    /// Number of reported points
    #[must_use]
    pub const fn reported_points(&self) -> usize {
        self.number_of_steps + 1
    }
}

/// Immutable, reusable result of preprocessing one (model, simulation) pair
#[derive(Debug, Clone)]
pub struct PreprocessedTask<M> {
    model_id: String,
    simulation_id: String,
    model: M,
    algorithm: ResolvedAlgorithm,
    simulator_details: serde_json::Value,
    time_course: TimeCourse,
}

impl<M> PreprocessedTask<M> {
    /// Model id
    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Simulation id
    #[must_use]
    pub fn simulation_id(&self) -> &str {
        &self.simulation_id
    }

    /// Canonical, change-applied model. Runs must clone it.
    #[must_use]
    pub const fn model(&self) -> &M {
        &self.model
    }

    /// Resolved algorithm
    #[must_use]
    pub const fn algorithm(&self) -> &ResolvedAlgorithm {
        &self.algorithm
    }

    /// Backend method and arguments for the task log
    #[must_use]
    pub const fn simulator_details(&self) -> &serde_json::Value {
        &self.simulator_details
    }

    /// Validated time course
    #[must_use]
    pub const fn time_course(&self) -> &TimeCourse {
        &self.time_course
    }
}

/// Builds preprocessed tasks for one archive execution
#[derive(Debug, Clone)]
pub struct Preprocessor {
    catalog: Arc<AlgorithmCatalog>,
    policy: SubstitutionPolicy,
    working_dir: PathBuf,
}

impl Preprocessor {
    /// Create a preprocessor resolving relative model sources against `working_dir`
    #[must_use]
    pub fn new(catalog: Arc<AlgorithmCatalog>, policy: SubstitutionPolicy, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            catalog,
            policy,
            working_dir: working_dir.into(),
        }
    }

    /// Active substitution policy
    #[must_use]
    pub const fn policy(&self) -> SubstitutionPolicy {
        self.policy
    }

    /// Archive working directory
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Load, change, resolve and validate
    ///
    /// # Errors
    /// Returns the `ExecError` of the first failing step
    #[instrument(skip_all, fields(model = %model.id, simulation = %simulation.id))]
    pub fn build<B: SimulationBackend>(
        &self,
        backend: &B,
        model: &Model,
        simulation: &Simulation,
    ) -> Result<PreprocessedTask<B::Model>, ExecError> {
        let location = self.working_dir.join(&model.source);
        let load_error = |reason: String| ExecError::ModelLoad {
            model: model.id.clone(),
            location: location.display().to_string(),
            reason,
        };
        if !backend.supports_language(&model.language) {
            return Err(load_error(format!(
                "language `{}` is not supported by the {} backend",
                model.language,
                backend.name()
            )));
        }
        let loaded = backend.load_model(&location).map_err(|e| load_error(e.0))?;
        let changed = apply_changes(backend, &model.id, &loaded, &model.changes)?;

        let resolver = AlgorithmResolver::new(&self.catalog, backend.algorithms());
        let algorithm = resolver
            .resolve_for(&simulation.algorithm, self.policy, backend.features(&changed))
            .map_err(|e| match e {
                ResolveError::Unsupported {
                    requested,
                    policy,
                    reason,
                } => ExecError::AlgorithmUnsupported {
                    requested,
                    policy,
                    reason,
                },
                invalid @ ResolveError::InvalidParameterValue { .. } => ExecError::InvalidSimulationSettings {
                    simulation: simulation.id.clone(),
                    reason: invalid.to_string(),
                },
            })?;

        let time_course = TimeCourse::new(simulation)?;
        let simulator_details = backend.simulator_details(&algorithm);
        debug!(
            "Preprocessed with {} ({}), {} simulated points",
            algorithm.backend_id, algorithm.kisao_id, time_course.simulated_points
        );

        Ok(PreprocessedTask {
            model_id: model.id.clone(),
            simulation_id: simulation.id.clone(),
            model: changed,
            algorithm,
            simulator_details,
            time_course,
        })
    }
}

type Slot<M> = Arc<OnceLock<Result<Arc<PreprocessedTask<M>>, ExecError>>>;

/// Per-archive cache of preprocessed tasks keyed by (document location, model id,
/// simulation id)
///
/// Model and simulation ids are only unique within one document. Each key is built at most once. Concurrent callers for a key that is being built
/// block until the build finishes and then share its result, failures included.
#[derive(Debug)]
pub struct PreprocessCache<M> {
    entries: DashMap<(String, String, String), Slot<M>>,
    builds: AtomicUsize,
    hits: AtomicUsize,
}

impl<M> Default for PreprocessCache<M> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
            builds: AtomicUsize::new(0),
            hits: AtomicUsize::new(0),
        }
    }
}

impl<M> PreprocessCache<M> {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached entry for the key, building it with `build` on first use
    ///
    /// # Errors
    /// Returns the (cached) preprocessing failure of this key
    pub fn get_or_build<F>(
        &self,
        location: &str,
        model_id: &str,
        simulation_id: &str,
        build: F,
    ) -> Result<Arc<PreprocessedTask<M>>, ExecError>
    where
        F: FnOnce() -> Result<PreprocessedTask<M>, ExecError>,
    {
        let key = (location.to_string(), model_id.to_string(), simulation_id.to_string());
        // Clone the slot out so the shard lock is not held while building
        let slot = Arc::clone(&*self.entries.entry(key).or_default());

        let mut built = false;
        let result = slot.get_or_init(|| {
            built = true;
            self.builds.fetch_add(1, Ordering::Relaxed);
            info!("Preprocessing model {model_id} for simulation {simulation_id} of {location}");
            build().map(Arc::new)
        });
        if !built {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("Preprocessing cache hit for ({location}, {model_id}, {simulation_id})");
        }
        result.clone()
    }

    /// Number of builds performed
    #[must_use]
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }

    /// Number of lookups served from the cache
    #[must_use]
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of distinct keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was cached yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
