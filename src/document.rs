//! Document Executor
//!
//! Runs every task of one SED-ML document, evaluates its data generators and assembles
//! its outputs. A failing task or output is recorded in its own log node; its siblings
//! still run.

use crate::archive::CancelToken;
use crate::backend::SimulationBackend;
use crate::config::{Config, PlotMode};
use crate::error::{ErrorKind, ExecError};
use crate::log::{ErrorDetail, LogNode, NodeKind, Status};
use crate::report::{evaluate_data_generators, Dataset, ReportGenerator};
use crate::sedml::{AbstractTask, SedDocument};
use crate::task::{TaskExecutor, TaskOutcome, VariableResults};
use crate::Result;
use rustc_hash::FxHashMap;
use tracing::{info, instrument, warn};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Outcome of one document
#[derive(Debug, Clone)]
pub struct DocumentResults {
    /// Archive-relative location of the document
    pub location: String,
    /// Successfully assembled outputs, in declared order
    pub datasets: Vec<Dataset>,
    /// Document log node with one child per task and output
    pub log: LogNode,
}

impl DocumentResults {
    /// Look up an assembled output by id
    #[must_use]
    pub fn dataset(&self, output_id: &str) -> Option<&Dataset> {
        self.datasets.iter().find(|d| d.output_id() == output_id)
    }
}

/// Executes documents with a shared task executor
pub struct DocumentExecutor<'a, B: SimulationBackend> {
    tasks: &'a TaskExecutor<B>,
    config: &'a Config,
    cancel: &'a CancelToken,
}

impl<'a, B: SimulationBackend + 'static> DocumentExecutor<'a, B> {
    /// Create a document executor
    #[must_use]
    pub const fn new(tasks: &'a TaskExecutor<B>, config: &'a Config, cancel: &'a CancelToken) -> Self {
        Self { tasks, config, cancel }
    }

    /// Execute one document
    ///
    /// # Errors
    /// Only structural errors escape; unit failures are recorded in the returned log
    #[instrument(skip_all, fields(document = %location))]
    pub fn execute(&self, location: &str, document: &SedDocument) -> Result<DocumentResults> {
        let mut log = LogNode::new(location, NodeKind::Document);
        log.start()?;
        info!(
            "Executing {} task(s) and {} output(s)",
            document.tasks.len(),
            document.outputs.len()
        );

        let runs = self.run_tasks(location, document)?;
        let mut task_results: FxHashMap<String, VariableResults> = FxHashMap::default();
        let mut task_failures = Vec::new();
        for (node, outcome) in runs {
            if let Some(outcome) = outcome {
                task_results.insert(node.id().to_string(), outcome.results);
            } else if node.status() == Status::Failed {
                task_failures.extend(node.error().cloned());
            }
            log.push_child(node);
        }

        let data = evaluate_data_generators(document, &task_results);
        let generator = ReportGenerator::new(&data);
        let mut datasets = Vec::with_capacity(document.outputs.len());
        let mut output_failures = Vec::new();
        for output in &document.outputs {
            let mut node = LogNode::new(output.id(), NodeKind::Output);
            if self.cancel.is_cancelled() {
                node.skip(Some(&ExecError::Cancelled {
                    unit: output.id().to_string(),
                }))?;
            } else if output.is_plot() && self.config.plot_mode == PlotMode::Skip {
                node.skip(None)?;
            } else {
                node.start()?;
                match generator.assemble(output) {
                    Ok(dataset) => {
                        node.succeed()?;
                        datasets.push(dataset);
                    }
                    Err(e) => {
                        warn!("Output {} failed: {e}", output.id());
                        output_failures.push(ErrorDetail::from(&e));
                        node.fail(&e)?;
                    }
                }
            }
            log.push_child(node);
        }

        let cancelled = log
            .children()
            .iter()
            .filter_map(LogNode::error)
            .any(|e| e.kind == ErrorKind::Cancelled);
        let failed = !output_failures.is_empty() || (document.outputs.is_empty() && !task_failures.is_empty());

        if failed || cancelled {
            let root = task_failures
                .first()
                .or_else(|| output_failures.first())
                .map_or(ErrorKind::Cancelled, |e| e.kind);
            let cause = task_failures
                .first()
                .or_else(|| output_failures.first())
                .map_or_else(|| "execution was cancelled".to_string(), |e| e.message.clone());
            log.fail_with(ErrorDetail {
                kind: root,
                message: format!(
                    "{} of {} task(s) and {} of {} output(s) failed: {cause}",
                    task_failures.len(),
                    document.tasks.len(),
                    output_failures.len(),
                    document.outputs.len()
                ),
            })?;
        } else {
            log.succeed()?;
        }

        Ok(DocumentResults {
            location: location.to_string(),
            datasets,
            log,
        })
    }

    fn run_tasks(&self, location: &str, document: &SedDocument) -> Result<Vec<(LogNode, Option<TaskOutcome>)>> {
        let run = |task: &AbstractTask| self.run_task(location, document, task);

        #[cfg(feature = "rayon")]
        if self.config.parallel_tasks {
            return document.tasks.par_iter().map(run).collect();
        }
        document.tasks.iter().map(run).collect()
    }

    fn run_task(
        &self,
        location: &str,
        document: &SedDocument,
        task: &AbstractTask,
    ) -> Result<(LogNode, Option<TaskOutcome>)> {
        let mut node = LogNode::new(task.id(), NodeKind::Task);
        if self.cancel.is_cancelled() {
            node.skip(Some(&ExecError::Cancelled {
                unit: task.id().to_string(),
            }))?;
            return Ok((node, None));
        }

        node.start()?;
        match self.tasks.run(location, document, task) {
            Ok(outcome) => {
                node.set_algorithm(outcome.algorithm.clone(), outcome.simulator_details.clone());
                node.succeed()?;
                Ok((node, Some(outcome)))
            }
            Err(e) => {
                warn!("Task {} failed: {e}", task.id());
                node.fail(&e)?;
                Ok((node, None))
            }
        }
    }
}
