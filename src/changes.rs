//! Model Change Applier
//!
//! Changes are applied to an owned copy of the model, in declaration order. On failure
//! the copy is dropped, so a caller's model is never left with a partial change set.

use crate::backend::SimulationBackend;
use crate::error::ExecError;
use crate::sedml::ModelChange;
use thiserror::Error;
use tracing::debug;

/// Why a single change could not be applied
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChangeFailure {
    /// The target does not address an element of the model
    #[error("target `{0}` not found")]
    TargetNotFound(String),

    /// The new value does not fit the target
    #[error("`{value}` is not a valid value for `{target}`")]
    TypeMismatch {
        /// Addressed element
        target: String,
        /// Offending value
        value: String,
    },

    /// The backend cannot apply this kind of change
    #[error("unsupported change: {0}")]
    Unsupported(String),
}

/// Apply `changes` to a working copy of `model` and return the copy
///
/// An empty change set returns an identical clone.
///
/// # Errors
/// Returns `ExecError::ModelChange` naming the first change that failed
pub fn apply_changes<B: SimulationBackend>(
    backend: &B,
    model_id: &str,
    model: &B::Model,
    changes: &[ModelChange],
) -> Result<B::Model, ExecError> {
    let mut working = model.clone();
    for change in changes {
        backend
            .apply_change(&mut working, change)
            .map_err(|reason| ExecError::ModelChange {
                model: model_id.to_string(),
                target: change.target().to_string(),
                reason,
            })?;
    }
    if !changes.is_empty() {
        debug!("Applied {} change(s) to model {model_id}", changes.len());
    }
    Ok(working)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ReactionNetwork, ReferenceBackend};
    use crate::error::ErrorKind;

    fn network() -> ReactionNetwork {
        ReactionNetwork::from_json(
            r#"{"species": [{"id": "A", "initial": 1.0}],
                "parameters": [{"id": "k", "value": 0.1}],
                "reactions": [{"id": "r", "reactants": ["A"], "rate_constant": "k"}]}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_empty_change_set_is_noop() {
        let backend = ReferenceBackend::new();
        let model = network();
        let changed = apply_changes(&backend, "m", &model, &[]).unwrap();
        assert_eq!(changed, model);
    }

    #[test]
    fn test_changes_applied_in_order() {
        let backend = ReferenceBackend::new();
        let model = network();
        let changes = vec![
            ModelChange::attribute("/p[@id='k']", "0.2"),
            ModelChange::attribute("/p[@id='k']", "0.3"),
        ];
        let changed = apply_changes(&backend, "m", &model, &changes).unwrap();
        assert_eq!(changed.parameters[0].value, 0.3);
        assert_eq!(model.parameters[0].value, 0.1);
    }

    #[test]
    fn test_failure_is_atomic() {
        let backend = ReferenceBackend::new();
        let model = network();
        let changes = vec![
            ModelChange::attribute("/s[@id='A']", "5"),
            ModelChange::attribute("/s[@id='Z']", "5"),
        ];
        let err = apply_changes(&backend, "m", &model, &changes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModelChangeError);
        assert!(err.to_string().contains("/s[@id='Z']"));
        assert_eq!(model.species[0].initial, 1.0);
    }
}
