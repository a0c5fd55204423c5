//! Run a small archive end to end with the reference backend
//!
//! Builds a two-document archive in a temp directory (a time course and a parameter
//! scan), executes it with configuration from the environment and writes reports plus
//! `log.json`.
//!
//! ```text
//! ALGORITHM_SUBSTITUTION_POLICY=NONE REPORT_FORMATS=csv,parquet cargo run --example run_archive
//! ```

use sedml_exec::archive::{ArchiveOrchestrator, CombineArchive};
use sedml_exec::backend::ReferenceBackend;
use sedml_exec::config::Config;
use sedml_exec::log::Status;
use sedml_exec::report::ReportWriter;
use sedml_exec::sedml::SedDocument;
use std::sync::Arc;

const NETWORK: &str = r#"{
    "species": [
        {"id": "S", "initial": 10.0},
        {"id": "E", "initial": 1.0, "fixed": true},
        {"id": "P", "initial": 0.0}
    ],
    "parameters": [{"id": "kcat", "value": 0.3}],
    "reactions": [{"id": "convert", "reactants": ["S", "E"], "products": ["P", "E"], "rate_constant": "kcat"}],
    "events": [{"id": "refill", "species": "P", "threshold": 9.0, "assignments": [{"species": "S", "value": 10.0}]}]
}"#;

fn time_course() -> serde_json::Value {
    serde_json::json!({
        "models": [{"id": "model", "source": "network.json", "language": "urn:sedml:language:sbml"}],
        "simulations": [{
            "id": "sim",
            "algorithm": {"kisao_id": "KISAO_0000019", "changes": [{"kisao_id": "KISAO_0000209", "new_value": "1e-8"}]},
            "initial_time": 0.0,
            "output_start_time": 0.0,
            "output_end_time": 20.0,
            "number_of_steps": 20
        }],
        "tasks": [{"type": "task", "id": "task", "model": "model", "simulation": "sim"}],
        "data_generators": [
            {"id": "time", "variables": [{"id": "t", "task": "task", "symbol": "urn:sedml:symbol:time"}], "math": "t"},
            {"id": "substrate", "variables": [{"id": "s", "task": "task", "target": "/model/species[@id='S']"}], "math": "s"},
            {"id": "product_pct", "variables": [{"id": "p", "task": "task", "target": "/model/species[@id='P']"}],
             "parameters": [{"id": "total", "value": 10.0}], "math": "100 * p / total"}
        ],
        "outputs": [
            {"type": "report", "id": "concentrations", "data_sets": [
                {"id": "time", "label": "Time", "data_generator": "time"},
                {"id": "S", "label": "Substrate", "data_generator": "substrate"},
                {"id": "P_pct", "label": "Product (%)", "data_generator": "product_pct"}
            ]},
            {"type": "plot2d", "id": "plot", "curves": [
                {"id": "curve", "x_data_generator": "time", "y_data_generator": "substrate"}
            ]}
        ]
    })
}

fn scan() -> serde_json::Value {
    serde_json::json!({
        "models": [{"id": "model", "source": "network.json", "language": "urn:sedml:language:sbml"}],
        "simulations": [{
            "id": "sim",
            "algorithm": {"kisao_id": "KISAO_0000088"},
            "initial_time": 0.0,
            "output_start_time": 5.0,
            "output_end_time": 10.0,
            "number_of_steps": 5
        }],
        "tasks": [
            {"type": "task", "id": "base", "model": "model", "simulation": "sim"},
            {"type": "repeated_task", "id": "scan",
             "range": {"id": "i", "type": "uniform", "start": 0.1, "end": 0.5, "number_of_steps": 4},
             "changes": [{"model": "model", "target": "/model/parameter[@id='kcat']", "math": "i"}],
             "sub_tasks": [{"task": "base", "order": 1}]}
        ],
        "data_generators": [
            {"id": "product", "variables": [{"id": "p", "task": "scan", "target": "/model/species[@id='P']"}], "math": "p"}
        ],
        "outputs": [
            {"type": "report", "id": "kcat_scan", "data_sets": [
                {"id": "P", "label": "Product", "data_generator": "product"}
            ]}
        ]
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    sedml_exec::logging::init(config.verbosity);

    let dir = std::env::temp_dir().join("sedml-exec-demo");
    std::fs::create_dir_all(&dir)?;
    std::fs::write(dir.join("network.json"), NETWORK)?;

    let archive = CombineArchive::new(&dir)
        .with_document("time_course.sedml", serde_json::from_value::<SedDocument>(time_course())?)
        .with_document("experiments/scan.sedml", serde_json::from_value::<SedDocument>(scan())?);

    let formats = config.report_formats.clone();
    let orchestrator = ArchiveOrchestrator::new(Arc::new(ReferenceBackend::new()), config);
    let results = orchestrator.execute(&archive)?;

    println!("Archive status: {:?}", results.status());
    for document in results.log().children() {
        println!("  {} {:?}", document.id(), document.status());
        for unit in document.children() {
            let algorithm = unit.algorithm().unwrap_or("-");
            println!("    {:<16} {:<10?} {algorithm}", unit.id(), unit.status());
            if let Some(error) = unit.error() {
                println!("      {:?}: {}", error.kind, error.message);
            }
        }
    }
    for (key, dataset) in results.outputs() {
        println!("{key}: {} row(s), columns {:?}", dataset.num_rows(), dataset.labels());
    }

    let out = dir.join("out");
    for path in results.write(&ReportWriter::new(&out, formats))? {
        println!("wrote {}", path.display());
    }

    if results.status() == Status::Failed {
        std::process::exit(1);
    }
    Ok(())
}
