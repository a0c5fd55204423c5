//! Task Executor
//!
//! A run clones the preprocessed model, applies per-run overrides to the clone, calls the
//! backend and extracts the requested variables. The shared [`PreprocessedTask`] is only
//! ever read.

use super::preprocess::{PreprocessCache, PreprocessedTask, Preprocessor};
use super::{repeated, TaskOutcome, VariableResults};
use crate::backend::{BackendError, SimulationBackend, SimulationRun, Trajectories};
use crate::changes::apply_changes;
use crate::error::ExecError;
use crate::sedml::{target_id, AbstractTask, ModelChange, SedDocument, Task, Variable, TIME_SYMBOL};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{instrument, warn};

/// Hard time limit of one task, shared by all runs of a repeated task
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    limit: Duration,
}

impl Deadline {
    /// Deadline `limit` from now, `None` if that instant is not representable
    #[must_use]
    pub fn after(limit: Duration) -> Option<Self> {
        Instant::now().checked_add(limit).map(|at| Self { at, limit })
    }

    fn remaining(self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }
}

/// Runs tasks of one archive execution against a backend
pub struct TaskExecutor<B: SimulationBackend> {
    backend: Arc<B>,
    preprocessor: Preprocessor,
    cache: Arc<PreprocessCache<B::Model>>,
    timeout: Option<Duration>,
}

impl<B: SimulationBackend + 'static> TaskExecutor<B> {
    /// Create an executor sharing `cache` for preprocessed tasks
    #[must_use]
    pub fn new(
        backend: Arc<B>,
        preprocessor: Preprocessor,
        cache: Arc<PreprocessCache<B::Model>>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            backend,
            preprocessor,
            cache,
            timeout,
        }
    }

    /// Preprocessing cache
    #[must_use]
    pub fn cache(&self) -> &PreprocessCache<B::Model> {
        &self.cache
    }

    /// Preprocessed task of a basic task, from the cache when possible
    ///
    /// Model and simulation ids are scoped by the document `location`.
    ///
    /// # Errors
    /// Returns the preprocessing failure of the task's (model, simulation) pair
    pub fn prepare(
        &self,
        location: &str,
        document: &SedDocument,
        task: &Task,
    ) -> Result<Arc<PreprocessedTask<B::Model>>, ExecError> {
        let model = document.model(&task.model).ok_or_else(|| ExecError::ModelLoad {
            model: task.model.clone(),
            location: String::new(),
            reason: format!("task `{}` references an undeclared model", task.id),
        })?;
        let simulation = document
            .simulation(&task.simulation)
            .ok_or_else(|| ExecError::InvalidSimulationSettings {
                simulation: task.simulation.clone(),
                reason: format!("task `{}` references an undeclared simulation", task.id),
            })?;
        self.cache.get_or_build(location, &model.id, &simulation.id, || {
            self.preprocessor.build(&*self.backend, model, simulation)
        })
    }

    /// Execute a basic or repeated task and record the variables the document's data
    /// generators reference
    ///
    /// # Errors
    /// Returns the failure of the task; siblings are unaffected
    #[instrument(skip_all, fields(task = %task.id()))]
    pub fn run(&self, location: &str, document: &SedDocument, task: &AbstractTask) -> Result<TaskOutcome, ExecError> {
        let deadline = self.timeout.and_then(|limit| {
            let deadline = Deadline::after(limit);
            if deadline.is_none() {
                warn!("Task timeout {limit:?} is too far in the future; running without a deadline");
            }
            deadline
        });
        let variables = document.variables_of(task.id());
        match task {
            AbstractTask::Task(basic) => {
                let prepared = self.prepare(location, document, basic)?;
                let results = self.execute(&basic.id, &prepared, &[], &variables, deadline)?;
                Ok(TaskOutcome {
                    results,
                    algorithm: prepared.algorithm().kisao_id.clone(),
                    simulator_details: prepared.simulator_details().clone(),
                })
            }
            AbstractTask::RepeatedTask(repeated) => {
                repeated::run(self, location, document, repeated, &variables, deadline)
            }
        }
    }

    /// One run of a preprocessed task with per-run overrides
    ///
    /// # Errors
    /// Returns `ModelChange` for bad overrides, `SimulationExecution` for backend
    /// failures, `Timeout` past the deadline and `UnsupportedVariable` for
    /// unrecordable variables
    pub fn execute(
        &self,
        task_id: &str,
        prepared: &Arc<PreprocessedTask<B::Model>>,
        overrides: &[ModelChange],
        variables: &[&Variable],
        deadline: Option<Deadline>,
    ) -> Result<VariableResults, ExecError> {
        let working = apply_changes(&*self.backend, prepared.model_id(), prepared.model(), overrides)?;
        let trajectories = self.simulate(task_id, prepared, working, deadline)?;
        extract_variables(task_id, &trajectories, prepared.time_course().reported_points(), variables)
    }

    fn simulate(
        &self,
        task_id: &str,
        prepared: &Arc<PreprocessedTask<B::Model>>,
        model: B::Model,
        deadline: Option<Deadline>,
    ) -> Result<Trajectories, ExecError> {
        let failed = |e: BackendError| ExecError::SimulationExecution {
            task: task_id.to_string(),
            diagnostic: e.0,
        };
        let Some(deadline) = deadline else {
            return run_backend(&*self.backend, prepared, &model, None).map_err(failed);
        };
        let timed_out = || ExecError::Timeout {
            task: task_id.to_string(),
            limit: deadline.limit,
        };
        let remaining = deadline.remaining();
        if remaining.is_zero() {
            return Err(timed_out());
        }

        let (tx, rx) = mpsc::channel();
        let abort = Arc::new(AtomicBool::new(false));
        let backend = Arc::clone(&self.backend);
        let shared = Arc::clone(prepared);
        let worker_abort = Arc::clone(&abort);
        thread::Builder::new()
            .name(format!("simulate-{task_id}"))
            .spawn(move || {
                // receiver is gone once the deadline passed
                let _ = tx.send(run_backend(&*backend, &shared, &model, Some(&worker_abort)));
            })
            .map_err(|e| failed(BackendError(format!("cannot start simulation thread: {e}"))))?;

        match rx.recv_timeout(remaining) {
            Ok(result) => result.map_err(failed),
            Err(RecvTimeoutError::Timeout) => {
                abort.store(true, Ordering::Relaxed);
                warn!("Task {task_id} exceeded {:?}; aborting the in-flight run", deadline.limit);
                Err(timed_out())
            }
            Err(RecvTimeoutError::Disconnected) => Err(failed(BackendError("simulation thread panicked".to_string()))),
        }
    }
}

fn run_backend<B: SimulationBackend>(
    backend: &B,
    prepared: &PreprocessedTask<B::Model>,
    model: &B::Model,
    abort: Option<&AtomicBool>,
) -> Result<Trajectories, BackendError> {
    let time_course = prepared.time_course();
    backend.simulate(
        model,
        &SimulationRun {
            algorithm: prepared.algorithm(),
            initial_time: time_course.initial_time,
            end_time: time_course.output_end_time,
            points: time_course.simulated_points,
            abort,
        },
    )
}

/// Pick the requested variables out of raw trajectories
///
/// Only the last `points` values of each series are kept. Constant quantities are
/// expanded into constant series.
///
/// # Errors
/// Returns `ExecError::UnsupportedVariable` listing every unknown symbol and
/// unrecordable target together with the recordable ids
pub fn extract_variables(
    task_id: &str,
    trajectories: &Trajectories,
    points: usize,
    variables: &[&Variable],
) -> Result<VariableResults, ExecError> {
    let tail = |values: &[f64]| values[values.len().saturating_sub(points)..].to_vec();
    let mut results = VariableResults::default();
    let mut unknown_symbols = Vec::new();
    let mut unknown_targets = Vec::new();

    for variable in variables {
        match (&variable.symbol, &variable.target) {
            (Some(symbol), _) if symbol == TIME_SYMBOL => {
                results.insert(variable.id.clone(), tail(&trajectories.time));
            }
            (Some(symbol), _) => unknown_symbols.push(symbol.as_str()),
            (None, Some(target)) => {
                let id = target_id(target).unwrap_or(target.as_str());
                if let Some(series) = trajectories.series.get(id) {
                    results.insert(variable.id.clone(), tail(series));
                } else if let Some(value) = trajectories.constants.get(id) {
                    results.insert(variable.id.clone(), vec![*value; points]);
                } else {
                    unknown_targets.push(target.as_str());
                }
            }
            (None, None) => unknown_targets.push(variable.id.as_str()),
        }
    }

    if unknown_symbols.is_empty() && unknown_targets.is_empty() {
        return Ok(results);
    }
    unknown_symbols.sort_unstable();
    unknown_targets.sort_unstable();

    let mut reason = String::new();
    if !unknown_symbols.is_empty() {
        reason.push_str(&format!(
            "the following symbols are not supported:\n  - {}\nSymbols must be one of the following:\n  - {TIME_SYMBOL}\n",
            unknown_symbols.join("\n  - ")
        ));
    }
    if !unknown_targets.is_empty() {
        reason.push_str(&format!(
            "the following targets could not be recorded:\n  - {}\nTargets must have one of the following ids:\n  - {}",
            unknown_targets.join("\n  - "),
            trajectories.recordable_ids().join("\n  - ")
        ));
    }
    Err(ExecError::UnsupportedVariable {
        task: task_id.to_string(),
        reason,
    })
}
