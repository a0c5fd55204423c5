//! Property-based tests for sedml-exec
//!
//! - Resolver fidelity and strictness
//! - Change application without side effects
//! - Log node lifecycle
//! - Element-wise math
//!
//! Run with ProptestConfig::with_cases(100)

use proptest::prelude::*;
use rustc_hash::FxHashMap;
use sedml_exec::algorithm::{
    AlgorithmCatalog, AlgorithmRequest, AlgorithmResolver, ParameterValue, ResolveError, SubstitutionPolicy,
};
use sedml_exec::backend::{NetworkParameter, ReactionNetwork, ReferenceBackend, SimulationBackend, Species};
use sedml_exec::changes::apply_changes;
use sedml_exec::error::ExecError;
use sedml_exec::log::{LogNode, NodeKind, Status};
use sedml_exec::math::Expression;
use sedml_exec::sedml::{Range, RangeKind};

// ============================================================================
// Property Test Generators (Strategies)
// ============================================================================

fn arb_policy() -> impl Strategy<Value = SubstitutionPolicy> {
    prop::sample::select(SubstitutionPolicy::ALL.to_vec())
}

fn arb_network() -> impl Strategy<Value = ReactionNetwork> {
    (
        proptest::collection::vec(0.0f64..100.0, 1..6),
        proptest::collection::vec(0.0f64..10.0, 0..4),
    )
        .prop_map(|(amounts, values)| ReactionNetwork {
            species: amounts
                .into_iter()
                .enumerate()
                .map(|(i, initial)| Species {
                    id: format!("S{i}"),
                    initial,
                    fixed: i % 2 == 1,
                })
                .collect(),
            parameters: values
                .into_iter()
                .enumerate()
                .map(|(i, value)| NetworkParameter { id: format!("k{i}"), value })
                .collect(),
            ..ReactionNetwork::default()
        })
}

#[derive(Debug, Clone, Copy)]
enum Transition {
    Start,
    Succeed,
    Fail,
    Skip,
}

fn arb_transitions() -> impl Strategy<Value = Vec<Transition>> {
    proptest::collection::vec(
        prop_oneof![
            Just(Transition::Start),
            Just(Transition::Succeed),
            Just(Transition::Fail),
            Just(Transition::Skip),
        ],
        1..8,
    )
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Exact matches keep the algorithm and every recognised parameter
    #[test]
    fn prop_exact_match_is_faithful(
        index in 0usize..2,
        policy in arb_policy(),
        rtol in 1e-12f64..1e-2,
        mxstep in 1i64..1_000_000,
    ) {
        let catalog = AlgorithmCatalog::kisao();
        let backend = ReferenceBackend::new();
        let table = backend.algorithms();
        let algorithm = &table[index];
        let request = AlgorithmRequest::new(algorithm.kisao_id.clone())
            .with_change("KISAO_0000209", rtol.to_string())
            .with_change("KISAO_0000415", mxstep.to_string());

        let resolved = AlgorithmResolver::new(&catalog, table).resolve(&request, policy).unwrap();
        prop_assert_eq!(&resolved.kisao_id, &algorithm.kisao_id);
        prop_assert_eq!(resolved.matched_at, SubstitutionPolicy::None);
        prop_assert_eq!(resolved.parameters.len(), 2);
        prop_assert_eq!(&resolved.parameters[0].value, &ParameterValue::Float(rtol));
        prop_assert_eq!(&resolved.parameters[1].value, &ParameterValue::Integer(mxstep));
    }

    /// With substitution disabled, ids outside the backend table never resolve
    #[test]
    fn prop_none_policy_never_substitutes(number in 0u32..10_000_000) {
        let kisao_id = format!("KISAO_{number:07}");
        let catalog = AlgorithmCatalog::kisao();
        let backend = ReferenceBackend::new();
        let table = backend.algorithms();
        prop_assume!(table.iter().all(|a| a.kisao_id != kisao_id));

        let result = AlgorithmResolver::new(&catalog, table)
            .resolve(&AlgorithmRequest::new(kisao_id.clone()), SubstitutionPolicy::None);
        let is_unsupported = matches!(result, Err(ResolveError::Unsupported { ref requested, .. }) if *requested == kisao_id);
        prop_assert!(is_unsupported);
    }

    /// Applying no changes yields an identical model
    #[test]
    fn prop_empty_change_set_is_noop(network in arb_network()) {
        let backend = ReferenceBackend::new();
        let changed = apply_changes(&backend, "model", &network, &[]).unwrap();
        prop_assert_eq!(changed, network);
    }

    /// Log nodes reach exactly one terminal state and never leave it
    #[test]
    fn prop_log_node_terminal_once(transitions in arb_transitions()) {
        let error = ExecError::Cancelled { unit: "unit".to_string() };
        let mut node = LogNode::new("unit", NodeKind::Task);
        let mut terminal: Option<Status> = None;

        for transition in transitions {
            let before = node.status();
            let result = match transition {
                Transition::Start => node.start(),
                Transition::Succeed => node.succeed(),
                Transition::Fail => node.fail(&error),
                Transition::Skip => node.skip(None),
            };
            match terminal {
                Some(status) => {
                    prop_assert!(result.is_err());
                    prop_assert_eq!(node.status(), status);
                }
                None => {
                    if result.is_ok() && node.status().is_terminal() {
                        terminal = Some(node.status());
                    } else if result.is_err() {
                        prop_assert_eq!(node.status(), before);
                    }
                }
            }
        }
    }

    /// Data generator math is applied element-wise
    #[test]
    fn prop_series_math_elementwise(
        pairs in proptest::collection::vec((-1e3f64..1e3, -1e3f64..1e3), 1..50),
        scale in -10.0f64..10.0,
    ) {
        let (a, b): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
        let mut series: FxHashMap<&str, &[f64]> = FxHashMap::default();
        series.insert("a", &a);
        series.insert("b", &b);
        let mut parameters: FxHashMap<&str, f64> = FxHashMap::default();
        parameters.insert("scale", scale);

        let values = Expression::parse("scale * (a + b)")
            .unwrap()
            .eval_series(&series, &parameters)
            .unwrap();
        prop_assert_eq!(values.len(), a.len());
        for (i, value) in values.iter().enumerate() {
            let expected = scale * (a[i] + b[i]);
            prop_assert!((value - expected).abs() <= 1e-9 * expected.abs().max(1.0));
        }
    }

    /// Uniform ranges include both ends
    #[test]
    fn prop_uniform_range_bounds(start in -100.0f64..100.0, width in 0.1f64..100.0, steps in 1usize..50) {
        let range = Range {
            id: "r".to_string(),
            kind: RangeKind::Uniform { start, end: start + width, number_of_steps: steps },
        };
        let values = range.values();
        prop_assert_eq!(values.len(), steps + 1);
        prop_assert!((values[0] - start).abs() < 1e-9);
        prop_assert!((values[steps] - (start + width)).abs() < 1e-9);
    }
}
