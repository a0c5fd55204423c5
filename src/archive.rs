//! Archive Orchestrator
//!
//! Executes every SED-ML document of a COMBINE archive in listed order against one
//! backend, with one preprocessing cache per execution. Documents are independent: a
//! failed document never stops the next one. Cancellation is cooperative and checked
//! before every document, task and output.
//!
//! ```rust,no_run
//! use sedml_exec::archive::{ArchiveOrchestrator, CombineArchive};
//! use sedml_exec::backend::ReferenceBackend;
//! use sedml_exec::config::Config;
//! use std::sync::Arc;
//!
//! let archive = CombineArchive::new("/data/archive");
//! let orchestrator = ArchiveOrchestrator::new(Arc::new(ReferenceBackend::new()), Config::from_env()?);
//! let results = orchestrator.execute(&archive)?;
//! println!("{}", results.log().to_json()?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::algorithm::AlgorithmCatalog;
use crate::backend::SimulationBackend;
use crate::config::Config;
use crate::document::{DocumentExecutor, DocumentResults};
use crate::error::{ErrorKind, ExecError};
use crate::log::{ErrorDetail, LogNode, NodeKind, Status};
use crate::report::{Dataset, ReportWriter};
use crate::sedml::SedDocument;
use crate::task::{PreprocessCache, Preprocessor, TaskExecutor};
use crate::Result;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Cooperative cancellation flag shared between a caller and an execution
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// New, not cancelled
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; units already running finish
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A document listed in an archive
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveDocument {
    /// Archive-relative location (e.g. `sims/a.sedml`)
    pub location: String,
    /// Parsed document
    pub document: SedDocument,
}

/// Unpacked COMBINE archive
#[derive(Debug, Clone, PartialEq)]
pub struct CombineArchive {
    /// Directory model sources are resolved against
    pub working_dir: PathBuf,
    /// SED-ML documents in listed order
    pub documents: Vec<ArchiveDocument>,
}

impl CombineArchive {
    /// Archive without documents
    #[must_use]
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            documents: Vec::new(),
        }
    }

    /// Append a document
    #[must_use]
    pub fn with_document(mut self, location: impl Into<String>, document: SedDocument) -> Self {
        self.documents.push(ArchiveDocument {
            location: location.into(),
            document,
        });
        self
    }
}

/// Datasets of every executed document plus the execution log
#[derive(Debug, Clone)]
pub struct ArchiveResults {
    documents: Vec<(String, Vec<Dataset>)>,
    log: LogNode,
    preprocess_builds: usize,
    preprocess_hits: usize,
}

impl ArchiveResults {
    /// Archive log root
    #[must_use]
    pub const fn log(&self) -> &LogNode {
        &self.log
    }

    /// Final archive status
    #[must_use]
    pub const fn status(&self) -> Status {
        self.log.status()
    }

    /// Look up an output by document location and output id
    #[must_use]
    pub fn dataset(&self, location: &str, output_id: &str) -> Option<&Dataset> {
        self.documents
            .iter()
            .find(|(loc, _)| loc == location)
            .and_then(|(_, datasets)| datasets.iter().find(|d| d.output_id() == output_id))
    }

    /// All outputs keyed `{location}/{output id}`, in execution order
    pub fn outputs(&self) -> impl Iterator<Item = (String, &Dataset)> {
        self.documents.iter().flat_map(|(location, datasets)| {
            datasets
                .iter()
                .map(move |d| (format!("{location}/{}", d.output_id()), d))
        })
    }

    /// Number of preprocessing builds performed
    #[must_use]
    pub const fn preprocess_builds(&self) -> usize {
        self.preprocess_builds
    }

    /// Number of preprocessing cache hits
    #[must_use]
    pub const fn preprocess_hits(&self) -> usize {
        self.preprocess_hits
    }

    /// Serialize every dataset and the log (`log.json`) below the writer's root
    ///
    /// # Errors
    /// Returns I/O, Arrow or Parquet errors
    pub fn write(&self, writer: &ReportWriter) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for (location, datasets) in &self.documents {
            for dataset in datasets {
                written.extend(writer.write(location, dataset)?);
            }
        }
        let log_path = writer.out_dir().join("log.json");
        self.log.write_json(&log_path)?;
        written.push(log_path);
        Ok(written)
    }
}

/// Executes archives against one backend
pub struct ArchiveOrchestrator<B: SimulationBackend> {
    backend: Arc<B>,
    catalog: Arc<AlgorithmCatalog>,
    config: Config,
    cancel: CancelToken,
}

impl<B: SimulationBackend + 'static> ArchiveOrchestrator<B> {
    /// Orchestrator over the built-in KiSAO catalog
    #[must_use]
    pub fn new(backend: Arc<B>, config: Config) -> Self {
        Self {
            backend,
            catalog: Arc::new(AlgorithmCatalog::kisao()),
            config,
            cancel: CancelToken::new(),
        }
    }

    /// Replace the algorithm catalog
    #[must_use]
    pub fn with_catalog(mut self, catalog: AlgorithmCatalog) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    /// Share a caller-owned cancellation token
    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that cancels executions of this orchestrator
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Execute every document of an archive
    ///
    /// # Errors
    /// Only structural errors escape; document, task and output failures are recorded
    /// in the returned log
    #[instrument(skip_all, fields(archive = %archive.working_dir.display()))]
    pub fn execute(&self, archive: &CombineArchive) -> Result<ArchiveResults> {
        let mut log = LogNode::new(archive_id(&archive.working_dir), NodeKind::Archive);
        log.start()?;
        info!(
            "Executing {} document(s) with policy {}",
            archive.documents.len(),
            self.config.algorithm_substitution_policy.as_str()
        );

        let cache = Arc::new(PreprocessCache::new());
        let preprocessor = Preprocessor::new(
            Arc::clone(&self.catalog),
            self.config.algorithm_substitution_policy,
            &archive.working_dir,
        );
        let tasks = TaskExecutor::new(
            Arc::clone(&self.backend),
            preprocessor,
            Arc::clone(&cache),
            self.config.task_timeout,
        );
        let documents = DocumentExecutor::new(&tasks, &self.config, &self.cancel);

        let mut outputs = Vec::with_capacity(archive.documents.len());
        for entry in &archive.documents {
            if self.cancel.is_cancelled() {
                let mut node = LogNode::new(&entry.location, NodeKind::Document);
                node.skip(Some(&ExecError::Cancelled {
                    unit: entry.location.clone(),
                }))?;
                log.push_child(node);
                continue;
            }
            let DocumentResults {
                location,
                datasets,
                log: node,
            } = documents.execute(&entry.location, &entry.document)?;
            if node.status() == Status::Failed {
                warn!("Document {location} did not execute successfully");
            }
            log.push_child(node);
            outputs.push((location, datasets));
        }

        let failed: Vec<&LogNode> = log
            .children()
            .iter()
            .filter(|c| c.status() == Status::Failed)
            .collect();
        if let Some(first) = failed.first() {
            let kind = first.error().map_or(ErrorKind::Cancelled, |e| e.kind);
            let detail = ErrorDetail {
                kind,
                message: format!(
                    "{} of {} document(s) did not execute successfully",
                    failed.len(),
                    archive.documents.len()
                ),
            };
            log.fail_with(detail)?;
        } else if self.cancel.is_cancelled() {
            log.fail_with(ErrorDetail {
                kind: ErrorKind::Cancelled,
                message: "execution was cancelled".to_string(),
            })?;
        } else {
            log.succeed()?;
        }

        info!(
            "Archive finished with status {:?} ({} preprocessing build(s), {} cache hit(s))",
            log.status(),
            cache.builds(),
            cache.hits()
        );
        Ok(ArchiveResults {
            documents: outputs,
            log,
            preprocess_builds: cache.builds(),
            preprocess_hits: cache.hits(),
        })
    }
}

fn archive_id(working_dir: &Path) -> String {
    working_dir
        .file_name()
        .map_or_else(|| working_dir.display().to_string(), |n| n.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ReferenceBackend;

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_empty_archive_succeeds() {
        let orchestrator = ArchiveOrchestrator::new(Arc::new(ReferenceBackend::new()), Config::default());
        let results = orchestrator.execute(&CombineArchive::new("/tmp/empty")).unwrap();
        assert_eq!(results.status(), Status::Succeeded);
        assert_eq!(results.log().id(), "empty");
        assert_eq!(results.outputs().count(), 0);
    }

    #[test]
    fn test_cancelled_before_start_skips_documents() {
        let orchestrator = ArchiveOrchestrator::new(Arc::new(ReferenceBackend::new()), Config::default());
        orchestrator.cancel_token().cancel();
        let archive = CombineArchive::new("/tmp/cancelled").with_document("a.sedml", SedDocument::default());

        let results = orchestrator.execute(&archive).unwrap();
        assert_eq!(results.status(), Status::Failed);
        assert_eq!(results.log().error().unwrap().kind, ErrorKind::Cancelled);
        assert_eq!(results.log().child("a.sedml").unwrap().status(), Status::Skipped);
    }
}
