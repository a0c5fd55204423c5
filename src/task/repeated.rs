//! Repeated tasks
//!
//! Every iteration starts from the canonical preprocessed model of each sub-task, so
//! iterations never see each other's changes. Results are concatenated in iteration
//! order, and within an iteration in sub-task order.

use super::executor::{Deadline, TaskExecutor};
use super::preprocess::PreprocessedTask;
use super::{TaskOutcome, VariableResults};
use crate::backend::SimulationBackend;
use crate::error::ExecError;
use crate::math::Expression;
use crate::sedml::{AbstractTask, ModelChange, RepeatedTask, SedDocument, SetValue, Task, Variable};
use std::sync::Arc;
use tracing::debug;

pub(super) fn run<B: SimulationBackend + 'static>(
    executor: &TaskExecutor<B>,
    location: &str,
    document: &SedDocument,
    repeated: &RepeatedTask,
    variables: &[&Variable],
    deadline: Option<Deadline>,
) -> Result<TaskOutcome, ExecError> {
    let invalid = |reason: String| ExecError::InvalidSimulationSettings {
        simulation: repeated.id.clone(),
        reason,
    };

    let mut sub_tasks: Vec<_> = repeated.sub_tasks.iter().collect();
    sub_tasks.sort_by_key(|s| s.order);
    let sub_runs: Vec<(&Task, Arc<PreprocessedTask<B::Model>>)> = sub_tasks
        .into_iter()
        .map(|sub| match document.task(&sub.task) {
            Some(AbstractTask::Task(task)) => Ok((task, executor.prepare(location, document, task)?)),
            Some(AbstractTask::RepeatedTask(_)) => Err(invalid(format!(
                "sub-task `{}` is itself a repeated task, which is not supported",
                sub.task
            ))),
            None => Err(invalid(format!("sub-task `{}` is not declared", sub.task))),
        })
        .collect::<Result<_, _>>()?;
    let Some((_, first)) = sub_runs.first() else {
        return Err(invalid("repeated task has no sub-tasks".to_string()));
    };

    let set_values: Vec<(&SetValue, Expression)> = repeated
        .changes
        .iter()
        .map(|change| {
            Expression::parse(&change.math)
                .map(|expr| (change, expr))
                .map_err(|e| ExecError::InvalidExpression {
                    owner: repeated.id.clone(),
                    reason: e.to_string(),
                })
        })
        .collect::<Result<_, _>>()?;

    let mut results: VariableResults = variables.iter().map(|v| (v.id.clone(), Vec::new())).collect();
    let values = repeated.range.values();
    for (iteration, value) in values.iter().enumerate() {
        for (task, prepared) in &sub_runs {
            let overrides = set_values
                .iter()
                .filter(|(change, _)| change.model == task.model)
                .map(|(change, expr)| {
                    expr.eval(|name| (name == repeated.range.id).then_some(*value))
                        .map(|v| ModelChange::attribute(&change.target, v.to_string()))
                        .map_err(|e| ExecError::InvalidExpression {
                            owner: repeated.id.clone(),
                            reason: e.to_string(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            debug!(
                "Iteration {}/{} of {}: sub-task {} with {} change(s)",
                iteration + 1,
                values.len(),
                repeated.id,
                task.id,
                overrides.len()
            );

            let run = executor.execute(&repeated.id, prepared, &overrides, variables, deadline)?;
            for (id, series) in run {
                results.entry(id).or_default().extend(series);
            }
        }
    }

    Ok(TaskOutcome {
        results,
        algorithm: first.algorithm().kisao_id.clone(),
        simulator_details: first.simulator_details().clone(),
    })
}
