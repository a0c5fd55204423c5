//! # sedml-exec: SED-ML Experiment Execution
//!
//! Executes the simulation experiments described by SED-ML documents in a COMBINE
//! archive against a pluggable numerical backend, and produces tabular reports plus a
//! hierarchical execution log.
//!
//! ## Pipeline
//!
//! - **Algorithm resolution**: KiSAO requests are matched against the backend's
//!   capability table under a substitution policy ([`algorithm`])
//! - **Preprocessing**: model load, static changes, algorithm and time course are
//!   computed once per (model, simulation) pair and cached ([`task`])
//! - **Execution**: per-run overrides are applied to private copies of the cached model;
//!   repeated tasks iterate over ranges with reset semantics
//! - **Reports**: data generators are evaluated and outputs assembled into Arrow
//!   record batches ([`report`])
//! - **Logging**: every archive, document, task and output gets a status node ([`log`])
//!
//! Failures are contained at the smallest enclosing unit: a failed task fails its
//! dependent outputs, never its siblings.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use sedml_exec::archive::{ArchiveOrchestrator, CombineArchive};
//! use sedml_exec::backend::ReferenceBackend;
//! use sedml_exec::config::Config;
//! use sedml_exec::report::ReportWriter;
//! use std::sync::Arc;
//!
//! let config = Config::from_env()?;
//! sedml_exec::logging::init(config.verbosity);
//!
//! let archive = CombineArchive::new("/data/unpacked");
//! let formats = config.report_formats.clone();
//! let results = ArchiveOrchestrator::new(Arc::new(ReferenceBackend::new()), config).execute(&archive)?;
//! results.write(&ReportWriter::new("/data/out", formats))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod algorithm;
pub mod archive;
pub mod backend;
pub mod changes;
pub mod config;
pub mod document;
pub mod error;
pub mod log;
pub mod logging;
pub mod math;
pub mod report;
pub mod sedml;
pub mod task;

pub use error::{Error, Result};
