//! Parsed SED-ML document model
//!
//! This is the object graph handed in by the external SED-ML parser. Cross references
//! (task → model, data generator variable → task, ...) are by id. Everything derives
//! `Deserialize` so fixtures can be written as JSON.
//!
//! ```text
//! SedDocument
//!   ├── models ──────────< changes
//!   ├── simulations ─────> algorithm
//!   ├── tasks (Task | RepeatedTask ──< sub-tasks)
//!   ├── data_generators ─< variables ─> task
//!   └── outputs (Report | Plot2D | Plot3D) ─> data generators
//! ```

mod target;

pub use target::target_id;

use crate::algorithm::AlgorithmRequest;
use serde::{Deserialize, Serialize};

/// Symbol URN for simulation time
pub const TIME_SYMBOL: &str = "urn:sedml:symbol:time";

/// SBML language URN prefix
pub const SBML_LANGUAGE: &str = "urn:sedml:language:sbml";

/// One simulation experiment description
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SedDocument {
    /// Model references
    #[serde(default)]
    pub models: Vec<Model>,
    /// Simulations
    #[serde(default)]
    pub simulations: Vec<Simulation>,
    /// Tasks, in declaration order
    #[serde(default)]
    pub tasks: Vec<AbstractTask>,
    /// Data generators
    #[serde(default)]
    pub data_generators: Vec<DataGenerator>,
    /// Outputs, in declaration order
    #[serde(default)]
    pub outputs: Vec<Output>,
}

impl SedDocument {
    /// Look up a model by id
    #[must_use]
    pub fn model(&self, id: &str) -> Option<&Model> {
        self.models.iter().find(|m| m.id == id)
    }

    /// Look up a simulation by id
    #[must_use]
    pub fn simulation(&self, id: &str) -> Option<&Simulation> {
        self.simulations.iter().find(|s| s.id == id)
    }

    /// Look up a task by id
    #[must_use]
    pub fn task(&self, id: &str) -> Option<&AbstractTask> {
        self.tasks.iter().find(|t| t.id() == id)
    }

    /// Look up a data generator by id
    #[must_use]
    pub fn data_generator(&self, id: &str) -> Option<&DataGenerator> {
        self.data_generators.iter().find(|d| d.id == id)
    }

    /// Variables recorded from a task, across all data generators
    #[must_use]
    pub fn variables_of(&self, task_id: &str) -> Vec<&Variable> {
        self.data_generators
            .iter()
            .flat_map(|d| d.variables.iter())
            .filter(|v| v.task == task_id)
            .collect()
    }
}

/// Model reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    /// Model id
    pub id: String,
    /// Path of the model file, relative to the archive working directory
    pub source: String,
    /// Language URN
    pub language: String,
    /// Static changes applied before simulating
    #[serde(default)]
    pub changes: Vec<ModelChange>,
}

/// Declared model change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelChange {
    /// Set an attribute (parameter value, initial amount, ...)
    ChangeAttribute {
        /// XPath of the attribute
        target: String,
        /// New value, unparsed
        new_value: String,
    },
    /// Add an XML element
    AddXml {
        /// XPath of the parent element
        target: String,
        /// Element to add
        new_xml: String,
    },
    /// Replace an XML element
    ChangeXml {
        /// XPath of the element
        target: String,
        /// Replacement element
        new_xml: String,
    },
    /// Remove an XML element
    RemoveXml {
        /// XPath of the element
        target: String,
    },
}

impl ModelChange {
    /// Target XPath
    #[must_use]
    pub fn target(&self) -> &str {
        match self {
            Self::ChangeAttribute { target, .. }
            | Self::AddXml { target, .. }
            | Self::ChangeXml { target, .. }
            | Self::RemoveXml { target } => target,
        }
    }

    /// Attribute change shorthand
    #[must_use]
    pub fn attribute(target: impl Into<String>, new_value: impl Into<String>) -> Self {
        Self::ChangeAttribute {
            target: target.into(),
            new_value: new_value.into(),
        }
    }
}

/// Uniform time course simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Simulation {
    /// Simulation id
    pub id: String,
    /// Algorithm request
    pub algorithm: AlgorithmRequest,
    /// Time the integration starts at
    pub initial_time: f64,
    /// First reported time point
    pub output_start_time: f64,
    /// Last reported time point
    pub output_end_time: f64,
    /// Number of reporting intervals
    pub number_of_steps: usize,
}

/// Task or repeated task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AbstractTask {
    /// Model × simulation pairing
    Task(Task),
    /// Parameter scan over sub-tasks
    RepeatedTask(RepeatedTask),
}

impl AbstractTask {
    /// Task id
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Task(t) => &t.id,
            Self::RepeatedTask(t) => &t.id,
        }
    }
}

/// Model × simulation pairing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Task id
    pub id: String,
    /// Model id
    pub model: String,
    /// Simulation id
    pub simulation: String,
}

/// Task repeated over a range with per-iteration changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepeatedTask {
    /// Task id
    pub id: String,
    /// Iterated range
    pub range: Range,
    /// Changes applied at each iteration
    #[serde(default)]
    pub changes: Vec<SetValue>,
    /// Sub-tasks executed at each iteration
    pub sub_tasks: Vec<SubTask>,
}

/// Iterated range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Range {
    /// Range id, usable in set-value math
    pub id: String,
    /// Values
    #[serde(flatten)]
    pub kind: RangeKind,
}

/// Range values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RangeKind {
    /// Evenly spaced values, both ends included
    Uniform {
        /// First value
        start: f64,
        /// Last value
        end: f64,
        /// Number of intervals
        number_of_steps: usize,
    },
    /// Explicit values
    Vector {
        /// Values
        values: Vec<f64>,
    },
}

impl Range {
    /// Expanded range values
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn values(&self) -> Vec<f64> {
        match &self.kind {
            RangeKind::Uniform {
                start,
                end,
                number_of_steps,
            } => {
                if *number_of_steps == 0 {
                    return vec![*start];
                }
                let step = (end - start) / *number_of_steps as f64;
                (0..=*number_of_steps)
                    .map(|i| start + step * i as f64)
                    .collect()
            }
            RangeKind::Vector { values } => values.clone(),
        }
    }
}

/// Per-iteration model change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetValue {
    /// Model id
    pub model: String,
    /// XPath of the attribute
    pub target: String,
    /// Expression over the range id
    pub math: String,
}

/// Sub-task of a repeated task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTask {
    /// Referenced task id
    pub task: String,
    /// Execution order (ascending)
    #[serde(default)]
    pub order: i32,
}

/// Expression over task variables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataGenerator {
    /// Data generator id
    pub id: String,
    /// Variables
    #[serde(default)]
    pub variables: Vec<Variable>,
    /// Constant parameters
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    /// Math expression
    pub math: String,
}

/// Recorded task variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    /// Variable id
    pub id: String,
    /// Task id
    pub task: String,
    /// XPath target of a model element
    #[serde(default)]
    pub target: Option<String>,
    /// Symbol URN (e.g. time)
    #[serde(default)]
    pub symbol: Option<String>,
}

impl Variable {
    /// Variable addressing a model element
    #[must_use]
    pub fn target(id: impl Into<String>, task: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            task: task.into(),
            target: Some(target.into()),
            symbol: None,
        }
    }

    /// Variable recording simulation time
    #[must_use]
    pub fn time(id: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            task: task.into(),
            target: None,
            symbol: Some(TIME_SYMBOL.to_string()),
        }
    }
}

/// Constant data generator parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter id
    pub id: String,
    /// Value
    pub value: f64,
}

/// Declared output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Output {
    /// Tabular report
    Report(Report),
    /// 2D plot
    #[serde(rename = "plot2d")]
    Plot2D(Plot2D),
    /// 3D plot
    #[serde(rename = "plot3d")]
    Plot3D(Plot3D),
}

impl Output {
    /// Output id
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Report(o) => &o.id,
            Self::Plot2D(o) => &o.id,
            Self::Plot3D(o) => &o.id,
        }
    }

    /// Whether this is a plot
    #[must_use]
    pub const fn is_plot(&self) -> bool {
        matches!(self, Self::Plot2D(_) | Self::Plot3D(_))
    }
}

/// Tabular report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Report id
    pub id: String,
    /// Columns, in declared order
    pub data_sets: Vec<DataSet>,
}

/// Report column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSet {
    /// Data set id
    pub id: String,
    /// Column label
    pub label: String,
    /// Data generator id
    pub data_generator: String,
}

/// 2D plot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plot2D {
    /// Plot id
    pub id: String,
    /// Curves
    pub curves: Vec<Curve>,
}

/// 2D curve
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Curve {
    /// Curve id
    pub id: String,
    /// X data generator id
    pub x_data_generator: String,
    /// Y data generator id
    pub y_data_generator: String,
}

/// 3D plot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plot3D {
    /// Plot id
    pub id: String,
    /// Surfaces
    pub surfaces: Vec<Surface>,
}

/// 3D surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Surface {
    /// Surface id
    pub id: String,
    /// X data generator id
    pub x_data_generator: String,
    /// Y data generator id
    pub y_data_generator: String,
    /// Z data generator id
    pub z_data_generator: String,
}
