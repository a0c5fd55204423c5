//! Execution log tree
//!
//! One [`LogNode`] per archive, document, task and output. A node is created QUEUED,
//! may start RUNNING, and transitions exactly once to a terminal state
//! (SUCCEEDED, FAILED, SKIPPED). Further transitions are rejected with `Error::Log`.
//!
//! ```text
//! archive
//!   └── document (location)
//!         ├── task
//!         └── output
//! ```

use crate::error::{ErrorKind, ExecError};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Status of a unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Created, not yet started
    Queued,
    /// In progress
    Running,
    /// Completed successfully
    Succeeded,
    /// Completed with an error
    Failed,
    /// Not executed
    Skipped,
}

impl Status {
    /// Whether no further transition is allowed
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }
}

/// Level of a node in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// COMBINE archive
    Archive,
    /// SED-ML document
    Document,
    /// Task
    Task,
    /// Report or plot
    Output,
}

/// Error recorded on a failed or skipped node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Failure kind
    pub kind: ErrorKind,
    /// Human readable message
    pub message: String,
}

impl From<&ExecError> for ErrorDetail {
    fn from(err: &ExecError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// One node of the execution log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogNode {
    id: String,
    kind: NodeKind,
    status: Status,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    duration_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    algorithm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    simulator_details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    children: Vec<LogNode>,
}

impl LogNode {
    /// Create a QUEUED node
    #[must_use]
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            status: Status::Queued,
            started_at: None,
            ended_at: None,
            duration_secs: None,
            error: None,
            algorithm: None,
            simulator_details: None,
            children: Vec::new(),
        }
    }

    /// Node id
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Node level
    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Current status
    #[must_use]
    pub const fn status(&self) -> Status {
        self.status
    }

    /// Recorded error, if any
    #[must_use]
    pub const fn error(&self) -> Option<&ErrorDetail> {
        self.error.as_ref()
    }

    /// Wall-clock duration in seconds, once terminal after running
    #[must_use]
    pub const fn duration_secs(&self) -> Option<f64> {
        self.duration_secs
    }

    /// Executed KiSAO algorithm id (task nodes)
    #[must_use]
    pub fn algorithm(&self) -> Option<&str> {
        self.algorithm.as_deref()
    }

    /// Backend method and arguments (task nodes)
    #[must_use]
    pub const fn simulator_details(&self) -> Option<&serde_json::Value> {
        self.simulator_details.as_ref()
    }

    /// Child nodes, in insertion order
    #[must_use]
    pub fn children(&self) -> &[Self] {
        &self.children
    }

    /// Look up a direct child by id
    #[must_use]
    pub fn child(&self, id: &str) -> Option<&Self> {
        self.children.iter().find(|c| c.id == id)
    }

    /// Number of direct children with the given status
    #[must_use]
    pub fn count(&self, status: Status) -> usize {
        self.children.iter().filter(|c| c.status == status).count()
    }

    /// Append a child node
    pub fn push_child(&mut self, child: Self) {
        self.children.push(child);
    }

    /// Record the algorithm that was executed
    pub fn set_algorithm(&mut self, kisao_id: impl Into<String>, details: serde_json::Value) {
        self.algorithm = Some(kisao_id.into());
        self.simulator_details = Some(details);
    }

    /// Transition QUEUED → RUNNING
    ///
    /// # Errors
    /// Returns `Error::Log` if the node was already started
    pub fn start(&mut self) -> Result<()> {
        if self.status != Status::Queued {
            return Err(Error::Log(format!(
                "{:?} `{}` cannot start from {:?}",
                self.kind, self.id, self.status
            )));
        }
        self.status = Status::Running;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Terminal transition to SUCCEEDED
    ///
    /// # Errors
    /// Returns `Error::Log` if the node is already terminal
    pub fn succeed(&mut self) -> Result<()> {
        self.finish(Status::Succeeded, None)
    }

    /// Terminal transition to FAILED with an error
    ///
    /// # Errors
    /// Returns `Error::Log` if the node is already terminal
    pub fn fail(&mut self, error: &ExecError) -> Result<()> {
        self.finish(Status::Failed, Some(ErrorDetail::from(error)))
    }

    /// Terminal transition to FAILED with an explicit detail
    ///
    /// # Errors
    /// Returns `Error::Log` if the node is already terminal
    pub fn fail_with(&mut self, detail: ErrorDetail) -> Result<()> {
        self.finish(Status::Failed, Some(detail))
    }

    /// Terminal transition to SKIPPED, optionally recording why
    ///
    /// # Errors
    /// Returns `Error::Log` if the node is already terminal
    pub fn skip(&mut self, reason: Option<&ExecError>) -> Result<()> {
        self.finish(Status::Skipped, reason.map(ErrorDetail::from))
    }

    #[allow(clippy::cast_precision_loss)]
    fn finish(&mut self, status: Status, error: Option<ErrorDetail>) -> Result<()> {
        if self.status.is_terminal() {
            return Err(Error::Log(format!(
                "{:?} `{}` is already {:?}",
                self.kind, self.id, self.status
            )));
        }
        let now = Utc::now();
        self.duration_secs = self
            .started_at
            .map(|start| (now - start).num_microseconds().unwrap_or(0) as f64 / 1e6);
        self.ended_at = Some(now);
        self.status = status;
        self.error = error;
        Ok(())
    }

    /// Serialize the tree as pretty JSON
    ///
    /// # Errors
    /// Returns a serialization error
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the tree as JSON to `path`
    ///
    /// # Errors
    /// Returns I/O or serialization errors
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let mut node = LogNode::new("task_1", NodeKind::Task);
        assert_eq!(node.status(), Status::Queued);
        node.start().unwrap();
        assert_eq!(node.status(), Status::Running);
        node.succeed().unwrap();
        assert_eq!(node.status(), Status::Succeeded);
        assert!(node.duration_secs().unwrap() >= 0.0);
    }

    #[test]
    fn test_terminal_exactly_once() {
        let mut node = LogNode::new("report", NodeKind::Output);
        node.start().unwrap();
        node.fail(&ExecError::ReportAssembly {
            output: "report".to_string(),
            reason: "missing".to_string(),
        })
        .unwrap();

        let err = node.succeed().unwrap_err();
        assert!(format!("{err}").contains("already Failed"));
        assert_eq!(node.status(), Status::Failed);
        assert_eq!(node.error().unwrap().kind, ErrorKind::ReportAssemblyError);
        assert!(node.start().is_err());
    }

    #[test]
    fn test_skip_from_queued_has_no_duration() {
        let mut node = LogNode::new("doc", NodeKind::Document);
        node.skip(None).unwrap();
        assert_eq!(node.status(), Status::Skipped);
        assert!(node.duration_secs().is_none());
    }

    #[test]
    fn test_json_shape() {
        let mut root = LogNode::new("archive", NodeKind::Archive);
        let mut task = LogNode::new("task_1", NodeKind::Task);
        task.set_algorithm(
            "KISAO_0000019",
            serde_json::json!({"method": "reference.CVODE", "arguments": {}}),
        );
        root.push_child(task);

        let json: serde_json::Value = serde_json::from_str(&root.to_json().unwrap()).unwrap();
        assert_eq!(json["status"], "QUEUED");
        assert_eq!(json["children"][0]["algorithm"], "KISAO_0000019");
        assert_eq!(json["children"][0]["simulator_details"]["method"], "reference.CVODE");
        assert_eq!(root.count(Status::Queued), 1);
    }
}
