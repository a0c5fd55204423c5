//! Tests for error types

use sedml_exec::algorithm::SubstitutionPolicy;
use sedml_exec::changes::ChangeFailure;
use sedml_exec::error::{ErrorKind, ExecError};
use sedml_exec::Error;
use std::time::Duration;

#[test]
fn test_config_error() {
    let error = Error::Config("bad policy".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Configuration error"));
    assert!(error_str.contains("bad policy"));
}

#[test]
fn test_io_error_conversion() {
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let error: Error = io_error.into();
    let error_str = format!("{error}");
    assert!(error_str.contains("IO error"));
    assert!(error_str.contains("file not found"));
}

#[test]
fn test_serialization_error_conversion() {
    let json_error = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
    let error: Error = json_error.into();
    assert!(format!("{error}").contains("Serialization error"));
}

#[test]
fn test_algorithm_unsupported_names_request_and_policy() {
    let error = ExecError::AlgorithmUnsupported {
        requested: "KISAO_0000029".to_string(),
        policy: SubstitutionPolicy::None,
        reason: "no substitute allowed".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("KISAO_0000029"));
    assert!(error_str.contains("NONE"));
    assert_eq!(error.kind(), ErrorKind::AlgorithmUnsupported);
}

#[test]
fn test_model_change_error_names_target() {
    let error = ExecError::ModelChange {
        model: "model_1".to_string(),
        target: "/sbml:sbml/sbml:model/sbml:listOfParameters/sbml:parameter[@id='k9']".to_string(),
        reason: ChangeFailure::TargetNotFound("k9".to_string()),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("model_1"));
    assert!(error_str.contains("[@id='k9']"));
    assert!(error_str.contains("not found"));
    assert_eq!(error.kind(), ErrorKind::ModelChangeError);
}

#[test]
fn test_timeout_error() {
    let error = ExecError::Timeout {
        task: "task_1".to_string(),
        limit: Duration::from_millis(250),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("task_1"));
    assert!(error_str.contains("250ms"));
    assert_eq!(error.kind(), ErrorKind::Timeout);
}

#[test]
fn test_every_variant_has_distinct_kind() {
    let errors = [
        ExecError::AlgorithmUnsupported {
            requested: String::new(),
            policy: SubstitutionPolicy::Any,
            reason: String::new(),
        },
        ExecError::InvalidSimulationSettings {
            simulation: String::new(),
            reason: String::new(),
        },
        ExecError::ModelLoad {
            model: String::new(),
            location: String::new(),
            reason: String::new(),
        },
        ExecError::ModelChange {
            model: String::new(),
            target: String::new(),
            reason: ChangeFailure::Unsupported(String::new()),
        },
        ExecError::SimulationExecution {
            task: String::new(),
            diagnostic: String::new(),
        },
        ExecError::UnsupportedVariable {
            task: String::new(),
            reason: String::new(),
        },
        ExecError::InvalidExpression {
            owner: String::new(),
            reason: String::new(),
        },
        ExecError::ReportAssembly {
            output: String::new(),
            reason: String::new(),
        },
        ExecError::Timeout {
            task: String::new(),
            limit: Duration::ZERO,
        },
        ExecError::Cancelled { unit: String::new() },
    ];
    let mut kinds: Vec<ErrorKind> = errors.iter().map(ExecError::kind).collect();
    kinds.dedup();
    assert_eq!(kinds.len(), errors.len());
}

#[test]
fn test_error_kind_serializes_by_name() {
    let json = serde_json::to_string(&ErrorKind::SimulationExecutionError).unwrap();
    assert_eq!(json, "\"SimulationExecutionError\"");
}
