//! Report Generator
//!
//! Data generators are evaluated once per document from the task results; outputs are
//! then assembled into Arrow [`RecordBatch`]es with one `Float64` column per data set,
//! in declared order. Columns shorter than the longest one are padded with NaN.

mod writer;

pub use writer::ReportWriter;

use crate::error::ExecError;
use crate::math::{Expression, MathError};
use crate::sedml::{DataGenerator, Output, SedDocument};
use crate::task::VariableResults;
use arrow::array::{Array, ArrayRef, Float64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use rustc_hash::FxHashMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Field metadata key holding the data set label
pub const LABEL_METADATA: &str = "label";

/// Why a data generator has no value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataGeneratorError {
    /// A variable was not produced (its task failed or it was not recorded)
    MissingVariable {
        /// Variable id
        variable: String,
        /// Task id
        task: String,
    },
    /// The math could not be parsed or evaluated
    Math(MathError),
}

/// Data generator id → evaluated series
pub type DataGeneratorResults = FxHashMap<String, Result<Vec<f64>, DataGeneratorError>>;

/// Evaluate every data generator of a document against task results (task id → results)
#[must_use]
pub fn evaluate_data_generators(
    document: &SedDocument,
    task_results: &FxHashMap<String, VariableResults>,
) -> DataGeneratorResults {
    document
        .data_generators
        .iter()
        .map(|dg| (dg.id.clone(), evaluate(dg, task_results)))
        .collect()
}

fn evaluate(
    data_generator: &DataGenerator,
    task_results: &FxHashMap<String, VariableResults>,
) -> Result<Vec<f64>, DataGeneratorError> {
    let mut series: FxHashMap<&str, &[f64]> = FxHashMap::default();
    for variable in &data_generator.variables {
        let values = task_results
            .get(&variable.task)
            .and_then(|results| results.get(&variable.id))
            .ok_or_else(|| DataGeneratorError::MissingVariable {
                variable: variable.id.clone(),
                task: variable.task.clone(),
            })?;
        series.insert(variable.id.as_str(), values.as_slice());
    }
    let parameters: FxHashMap<&str, f64> = data_generator
        .parameters
        .iter()
        .map(|p| (p.id.as_str(), p.value))
        .collect();

    Expression::parse(&data_generator.math)
        .and_then(|expr| expr.eval_series(&series, &parameters))
        .map_err(DataGeneratorError::Math)
}

/// Assembled output
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    output_id: String,
    batch: RecordBatch,
}

impl Dataset {
    /// Output id
    #[must_use]
    pub fn output_id(&self) -> &str {
        &self.output_id
    }

    /// Columnar data
    #[must_use]
    pub const fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    /// Number of rows
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    /// Column (data set) ids in declared order
    #[must_use]
    pub fn column_ids(&self) -> Vec<&str> {
        self.batch
            .schema_ref()
            .fields()
            .iter()
            .map(|f| f.name().as_str())
            .collect()
    }

    /// Column labels in declared order
    #[must_use]
    pub fn labels(&self) -> Vec<&str> {
        self.batch
            .schema_ref()
            .fields()
            .iter()
            .map(|f| {
                f.metadata()
                    .get(LABEL_METADATA)
                    .map_or_else(|| f.name().as_str(), String::as_str)
            })
            .collect()
    }

    /// Values of a column by data set id
    #[must_use]
    pub fn column(&self, id: &str) -> Option<&[f64]> {
        let index = self.batch.schema_ref().index_of(id).ok()?;
        self.batch
            .column(index)
            .as_any()
            .downcast_ref::<Float64Array>()
            .map(|a| &a.values()[..])
    }
}

/// Assembles outputs from evaluated data generators
#[derive(Debug, Clone, Copy)]
pub struct ReportGenerator<'a> {
    data: &'a DataGeneratorResults,
}

impl<'a> ReportGenerator<'a> {
    /// Create a generator over evaluated data generators
    #[must_use]
    pub const fn new(data: &'a DataGeneratorResults) -> Self {
        Self { data }
    }

    /// Assemble one output
    ///
    /// Reports get one column per data set. Plots get one column per distinct data
    /// generator referenced by their curves or surfaces, in first-use order.
    ///
    /// # Errors
    /// Returns `ReportAssembly` if referenced data is missing and `InvalidExpression` if
    /// a referenced data generator's math failed
    pub fn assemble(&self, output: &Output) -> Result<Dataset, ExecError> {
        let columns: Vec<(&str, &str, &str)> = match output {
            Output::Report(report) => report
                .data_sets
                .iter()
                .map(|ds| (ds.id.as_str(), ds.label.as_str(), ds.data_generator.as_str()))
                .collect(),
            Output::Plot2D(plot) => dedup(
                plot.curves
                    .iter()
                    .flat_map(|c| [c.x_data_generator.as_str(), c.y_data_generator.as_str()]),
            ),
            Output::Plot3D(plot) => dedup(plot.surfaces.iter().flat_map(|s| {
                [
                    s.x_data_generator.as_str(),
                    s.y_data_generator.as_str(),
                    s.z_data_generator.as_str(),
                ]
            })),
        };

        let missing = |reason: String| ExecError::ReportAssembly {
            output: output.id().to_string(),
            reason,
        };
        let mut values = Vec::with_capacity(columns.len());
        for (id, _, data_generator) in &columns {
            match self.data.get(*data_generator) {
                Some(Ok(series)) => values.push(series),
                Some(Err(DataGeneratorError::MissingVariable { variable, task })) => {
                    return Err(missing(format!(
                        "data set `{id}` needs variable `{variable}` of task `{task}`, which was not produced"
                    )))
                }
                Some(Err(DataGeneratorError::Math(e))) => {
                    return Err(ExecError::InvalidExpression {
                        owner: (*data_generator).to_string(),
                        reason: e.to_string(),
                    })
                }
                None => {
                    return Err(missing(format!(
                        "data set `{id}` references undeclared data generator `{data_generator}`"
                    )))
                }
            }
        }

        let rows = values.iter().map(|v| v.len()).max().unwrap_or(0);
        let fields: Vec<Field> = columns
            .iter()
            .map(|(id, label, _)| {
                Field::new(*id, DataType::Float64, false).with_metadata(HashMap::from([(
                    LABEL_METADATA.to_string(),
                    (*label).to_string(),
                )]))
            })
            .collect();
        let arrays: Vec<ArrayRef> = values
            .iter()
            .map(|v| {
                let padded = v.iter().copied().chain(std::iter::repeat(f64::NAN)).take(rows);
                Arc::new(Float64Array::from_iter_values(padded)) as ArrayRef
            })
            .collect();

        let batch = if arrays.is_empty() {
            RecordBatch::new_empty(Arc::new(Schema::new(fields)))
        } else {
            RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
                .map_err(|e| missing(format!("cannot build record batch: {e}")))?
        };
        Ok(Dataset {
            output_id: output.id().to_string(),
            batch,
        })
    }
}

fn dedup<'s>(ids: impl Iterator<Item = &'s str>) -> Vec<(&'s str, &'s str, &'s str)> {
    let mut seen = Vec::new();
    for id in ids {
        if !seen.contains(&id) {
            seen.push(id);
        }
    }
    seen.into_iter().map(|id| (id, id, id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sedml::{Curve, DataSet, Plot2D, Report, Variable};

    fn document() -> SedDocument {
        SedDocument {
            data_generators: vec![
                DataGenerator {
                    id: "dg_time".to_string(),
                    variables: vec![Variable::time("t", "task")],
                    parameters: Vec::new(),
                    math: "t".to_string(),
                },
                DataGenerator {
                    id: "dg_a".to_string(),
                    variables: vec![Variable::target("a", "task", "/s[@id='A']")],
                    parameters: vec![crate::sedml::Parameter {
                        id: "scale".to_string(),
                        value: 10.0,
                    }],
                    math: "a * scale".to_string(),
                },
                DataGenerator {
                    id: "dg_other".to_string(),
                    variables: vec![Variable::target("b", "failed_task", "/s[@id='B']")],
                    parameters: Vec::new(),
                    math: "b".to_string(),
                },
            ],
            ..SedDocument::default()
        }
    }

    fn task_results() -> FxHashMap<String, VariableResults> {
        let mut results = VariableResults::default();
        results.insert("t".to_string(), vec![0.0, 1.0, 2.0]);
        results.insert("a".to_string(), vec![1.0, 0.5, 0.25]);
        [("task".to_string(), results)].into_iter().collect()
    }

    fn report(data_generators: &[&str]) -> Output {
        Output::Report(Report {
            id: "report".to_string(),
            data_sets: data_generators
                .iter()
                .map(|dg| DataSet {
                    id: format!("ds_{dg}"),
                    label: dg.to_uppercase(),
                    data_generator: (*dg).to_string(),
                })
                .collect(),
        })
    }

    #[test]
    fn test_report_columns_in_declared_order() {
        let data = evaluate_data_generators(&document(), &task_results());
        let dataset = ReportGenerator::new(&data).assemble(&report(&["dg_a", "dg_time"])).unwrap();

        assert_eq!(dataset.column_ids(), vec!["ds_dg_a", "ds_dg_time"]);
        assert_eq!(dataset.labels(), vec!["DG_A", "DG_TIME"]);
        assert_eq!(dataset.num_rows(), 3);
        assert_eq!(dataset.column("ds_dg_a").unwrap(), &[10.0, 5.0, 2.5]);
    }

    #[test]
    fn test_missing_variable_fails_output() {
        let data = evaluate_data_generators(&document(), &task_results());
        let err = ReportGenerator::new(&data)
            .assemble(&report(&["dg_time", "dg_other"]))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ReportAssemblyError);
        assert!(err.to_string().contains("failed_task"));
    }

    #[test]
    fn test_plot_tabulates_distinct_generators() {
        let data = evaluate_data_generators(&document(), &task_results());
        let plot = Output::Plot2D(Plot2D {
            id: "plot".to_string(),
            curves: vec![
                Curve {
                    id: "c1".to_string(),
                    x_data_generator: "dg_time".to_string(),
                    y_data_generator: "dg_a".to_string(),
                },
                Curve {
                    id: "c2".to_string(),
                    x_data_generator: "dg_time".to_string(),
                    y_data_generator: "dg_a".to_string(),
                },
            ],
        });
        let dataset = ReportGenerator::new(&data).assemble(&plot).unwrap();
        assert_eq!(dataset.column_ids(), vec!["dg_time", "dg_a"]);
    }

    #[test]
    fn test_shorter_columns_padded_with_nan() {
        let mut doc = document();
        doc.data_generators.push(DataGenerator {
            id: "dg_const".to_string(),
            variables: Vec::new(),
            parameters: Vec::new(),
            math: "42".to_string(),
        });
        let data = evaluate_data_generators(&doc, &task_results());
        let dataset = ReportGenerator::new(&data)
            .assemble(&report(&["dg_time", "dg_const"]))
            .unwrap();
        let column = dataset.column("ds_dg_const").unwrap();
        assert_eq!(column[0], 42.0);
        assert!(column[1].is_nan() && column[2].is_nan());
    }
}
