//! Algorithm resolver
//!
//! Resolution is a pure function of (catalog, backend table, request, policy, model
//! features). The policy is always passed in; nothing is read from the environment.

use super::{
    AlgorithmCatalog, AlgorithmRequest, AlgorithmTerm, BackendAlgorithm, Equivalence,
    ParameterValue, SubstitutionPolicy,
};
use crate::backend::ModelFeatures;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Resolution failure
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    /// No backend algorithm is acceptable under the policy
    #[error("{reason}")]
    Unsupported {
        /// Requested KiSAO id
        requested: String,
        /// Most permissive level tried
        policy: SubstitutionPolicy,
        /// Human readable reason
        reason: String,
    },

    /// A parameter value does not parse as the declared type (strict policy only)
    #[error("`{value}` is not a valid {expected} value for parameter {parameter}")]
    InvalidParameterValue {
        /// KiSAO parameter id
        parameter: String,
        /// Raw value
        value: String,
        /// Expected type name
        expected: &'static str,
    },
}

/// Parameter accepted by the resolved algorithm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedParameter {
    /// KiSAO parameter id as requested
    pub kisao_id: String,
    /// Backend setting name
    pub backend_id: String,
    /// Raw value as requested
    pub raw: String,
    /// Parsed value
    pub value: ParameterValue,
}

/// Outcome of algorithm resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedAlgorithm {
    /// KiSAO id that was requested
    pub requested: String,
    /// KiSAO id that will be executed
    pub kisao_id: String,
    /// Backend-native algorithm name
    pub backend_id: String,
    /// Relaxation level at which the match was found
    pub matched_at: SubstitutionPolicy,
    /// Accepted parameters, in request order
    pub parameters: Vec<ResolvedParameter>,
}

impl ResolvedAlgorithm {
    /// Whether a different algorithm than the requested one will run
    #[must_use]
    pub fn is_substituted(&self) -> bool {
        self.kisao_id != self.requested
    }

    /// Look up an accepted parameter by backend setting name
    #[must_use]
    pub fn parameter(&self, backend_id: &str) -> Option<&ParameterValue> {
        self.parameters
            .iter()
            .find(|p| p.backend_id == backend_id)
            .map(|p| &p.value)
    }
}

/// Maps algorithm requests onto a backend's capability table
#[derive(Debug, Clone, Copy)]
pub struct AlgorithmResolver<'a> {
    catalog: &'a AlgorithmCatalog,
    table: &'a [BackendAlgorithm],
}

impl<'a> AlgorithmResolver<'a> {
    /// Create a resolver over a catalog and a backend table
    #[must_use]
    pub const fn new(catalog: &'a AlgorithmCatalog, table: &'a [BackendAlgorithm]) -> Self {
        Self { catalog, table }
    }

    /// Resolve a request for a model without special features
    ///
    /// # Errors
    /// Returns `ResolveError::Unsupported` if no level up to `policy` yields a candidate
    pub fn resolve(
        &self,
        request: &AlgorithmRequest,
        policy: SubstitutionPolicy,
    ) -> Result<ResolvedAlgorithm, ResolveError> {
        self.resolve_for(request, policy, ModelFeatures::default())
    }

    /// Resolve a request, taking the loaded model's features into account
    ///
    /// If the chosen algorithm cannot simulate a feature of the model and the policy
    /// allows at least `SIMILAR_VARIABLES`, the highest priority algorithm that can is
    /// used instead.
    ///
    /// # Errors
    /// Returns `ResolveError::Unsupported` if no acceptable algorithm exists, or
    /// `ResolveError::InvalidParameterValue` for malformed values under policy `NONE`
    pub fn resolve_for(
        &self,
        request: &AlgorithmRequest,
        policy: SubstitutionPolicy,
        features: ModelFeatures,
    ) -> Result<ResolvedAlgorithm, ResolveError> {
        let (mut chosen, mut matched_at) = self.select(request, policy)?;

        if features.events && !chosen.supports_events {
            if policy < SubstitutionPolicy::SimilarVariables {
                return Err(ResolveError::Unsupported {
                    requested: request.kisao_id.clone(),
                    policy,
                    reason: format!(
                        "{} ({}) cannot execute the simulation because the model has events",
                        chosen.backend_id, chosen.kisao_id
                    ),
                });
            }
            let fallback = self
                .catalog
                .prioritize(self.table)
                .into_iter()
                .find(|alg| alg.supports_events && alg.observables.is_superset(&chosen.observables))
                .ok_or_else(|| ResolveError::Unsupported {
                    requested: request.kisao_id.clone(),
                    policy,
                    reason: "no backend algorithm supports models with events".to_string(),
                })?;
            warn!(
                "{} ({}) will be used rather than {} ({}) because the model has events",
                fallback.backend_id, fallback.kisao_id, chosen.backend_id, chosen.kisao_id
            );
            chosen = fallback;
            matched_at = matched_at.max(SubstitutionPolicy::SimilarVariables);
        }

        let parameters = Self::map_parameters(request, chosen, policy)?;

        Ok(ResolvedAlgorithm {
            requested: request.kisao_id.clone(),
            kisao_id: chosen.kisao_id.clone(),
            backend_id: chosen.backend_id.clone(),
            matched_at,
            parameters,
        })
    }

    /// Walk the relaxation ladder; the first level with a candidate wins.
    fn select(
        &self,
        request: &AlgorithmRequest,
        policy: SubstitutionPolicy,
    ) -> Result<(&'a BackendAlgorithm, SubstitutionPolicy), ResolveError> {
        let requested = self.catalog.term(&request.kisao_id);
        let candidates = self.catalog.prioritize(self.table);

        for level in policy.ladder() {
            let equivalence = level.equivalence();
            if let Some(alg) = candidates
                .iter()
                .find(|alg| self.satisfies(&request.kisao_id, requested, alg, equivalence))
            {
                if level > SubstitutionPolicy::None {
                    warn!(
                        "Algorithm {} was substituted with {} ({}) at level {level}",
                        request.kisao_id, alg.kisao_id, alg.backend_id
                    );
                } else {
                    debug!("Algorithm {} matched exactly", request.kisao_id);
                }
                return Ok((*alg, level));
            }
        }

        let supported: Vec<&str> = self.table.iter().map(|a| a.kisao_id.as_str()).collect();
        Err(ResolveError::Unsupported {
            requested: request.kisao_id.clone(),
            policy,
            reason: format!(
                "Algorithm {} is not supported and no substitute is allowed at substitution level {policy}. \
                 Supported algorithms: {}",
                request.kisao_id,
                supported.join(", ")
            ),
        })
    }

    fn satisfies(
        &self,
        requested_id: &str,
        requested: Option<&AlgorithmTerm>,
        candidate: &BackendAlgorithm,
        equivalence: Equivalence,
    ) -> bool {
        let term = self.catalog.term(&candidate.kisao_id);
        let related = |same: fn(&AlgorithmTerm, &AlgorithmTerm) -> bool| {
            requested.zip(term).is_some_and(|(r, t)| same(r, t))
        };
        match equivalence {
            Equivalence::Exact => candidate.kisao_id == requested_id,
            Equivalence::SameMethod => related(|r, t| r.method == t.method),
            Equivalence::SameFamily => related(|r, t| r.family == t.family),
            Equivalence::SameVariables => {
                requested.is_some_and(|r| candidate.observables == r.observables)
            }
            Equivalence::SimilarVariables => {
                requested.is_some_and(|r| candidate.observables.is_superset(&r.observables))
            }
            Equivalence::SameFramework => related(|r, t| r.framework == t.framework),
            Equivalence::Any => true,
        }
    }

    fn map_parameters(
        request: &AlgorithmRequest,
        chosen: &BackendAlgorithm,
        policy: SubstitutionPolicy,
    ) -> Result<Vec<ResolvedParameter>, ResolveError> {
        if chosen.kisao_id != request.kisao_id {
            for change in &request.changes {
                warn!(
                    "Algorithm parameter {} was ignored because {} was substituted with {}",
                    change.kisao_id, request.kisao_id, chosen.kisao_id
                );
            }
            return Ok(Vec::new());
        }

        let mut parameters = Vec::with_capacity(request.changes.len());
        for change in &request.changes {
            let Some(spec) = chosen.parameter(&change.kisao_id) else {
                let accepted: Vec<String> = chosen
                    .parameters
                    .iter()
                    .map(|p| format!("{}: {} ({})", p.kisao_id, p.backend_id, p.name))
                    .collect();
                warn!(
                    "Algorithm parameter {} was ignored because it is not supported by {}. Accepted: {}",
                    change.kisao_id,
                    chosen.backend_id,
                    accepted.join(", ")
                );
                continue;
            };

            match spec.value_type.parse(&change.new_value) {
                Some(value) => parameters.push(ResolvedParameter {
                    kisao_id: change.kisao_id.clone(),
                    backend_id: spec.backend_id.clone(),
                    raw: change.new_value.clone(),
                    value,
                }),
                None if policy == SubstitutionPolicy::None => {
                    return Err(ResolveError::InvalidParameterValue {
                        parameter: change.kisao_id.clone(),
                        value: change.new_value.clone(),
                        expected: spec.value_type.as_str(),
                    });
                }
                None => warn!(
                    "`{}` was ignored because it is not a valid {} value for parameter {}",
                    change.new_value,
                    spec.value_type.as_str(),
                    change.kisao_id
                ),
            }
        }
        Ok(parameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::{ObservableKind, ParameterSpec, ValueType};

    fn table() -> Vec<BackendAlgorithm> {
        let ode = [ObservableKind::Concentration, ObservableKind::Amount, ObservableKind::Flux]
            .into_iter()
            .collect();
        vec![
            BackendAlgorithm {
                kisao_id: "KISAO_0000019".to_string(),
                backend_id: "CVODE".to_string(),
                observables: ode,
                parameters: vec![ParameterSpec::new(
                    "KISAO_0000209",
                    "cvode_reltol",
                    "relative tolerance",
                    ValueType::Float,
                )],
                supports_events: true,
            },
            BackendAlgorithm {
                kisao_id: "KISAO_0000088".to_string(),
                backend_id: "LSODA".to_string(),
                observables: [ObservableKind::Concentration, ObservableKind::Amount, ObservableKind::Flux]
                    .into_iter()
                    .collect(),
                parameters: vec![
                    ParameterSpec::new("KISAO_0000209", "lsoda_rtol", "relative tolerance", ValueType::Float),
                    ParameterSpec::new("KISAO_0000415", "lsoda_mxstep", "maximum steps", ValueType::Integer),
                ],
                supports_events: false,
            },
        ]
    }

    #[test]
    fn test_exact_match_keeps_parameters() {
        let catalog = AlgorithmCatalog::kisao();
        let table = table();
        let resolver = AlgorithmResolver::new(&catalog, &table);
        let request = AlgorithmRequest::new("KISAO_0000088").with_change("KISAO_0000209", "1e-8");

        let resolved = resolver.resolve(&request, SubstitutionPolicy::None).unwrap();
        assert_eq!(resolved.kisao_id, "KISAO_0000088");
        assert!(!resolved.is_substituted());
        assert_eq!(resolved.parameters.len(), 1);
        assert_eq!(resolved.parameter("lsoda_rtol"), Some(&ParameterValue::Float(1e-8)));
    }

    #[test]
    fn test_same_method_alias() {
        let catalog = AlgorithmCatalog::kisao();
        let table = table();
        let resolver = AlgorithmResolver::new(&catalog, &table);

        let resolved = resolver
            .resolve(&AlgorithmRequest::new("KISAO_0000089"), SubstitutionPolicy::SameMethod)
            .unwrap();
        assert_eq!(resolved.kisao_id, "KISAO_0000088");
        assert_eq!(resolved.matched_at, SubstitutionPolicy::SameMethod);
    }

    #[test]
    fn test_family_tie_break_uses_priority() {
        let catalog = AlgorithmCatalog::kisao();
        let table = table();
        let resolver = AlgorithmResolver::new(&catalog, &table);

        // LSODE shares the implicit family with both backend algorithms; LSODA ranks first.
        let resolved = resolver
            .resolve(&AlgorithmRequest::new("KISAO_0000094"), SubstitutionPolicy::SameMath)
            .unwrap();
        assert_eq!(resolved.kisao_id, "KISAO_0000088");
        assert_eq!(resolved.matched_at, SubstitutionPolicy::SameMath);
    }

    #[test]
    fn test_no_substitution_under_none() {
        let catalog = AlgorithmCatalog::kisao();
        let table = table();
        let resolver = AlgorithmResolver::new(&catalog, &table);

        let err = resolver
            .resolve(&AlgorithmRequest::new("KISAO_0000094"), SubstitutionPolicy::None)
            .unwrap_err();
        match err {
            ResolveError::Unsupported { requested, policy, .. } => {
                assert_eq!(requested, "KISAO_0000094");
                assert_eq!(policy, SubstitutionPolicy::None);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_stochastic_request_needs_any() {
        let catalog = AlgorithmCatalog::kisao();
        let table = table();
        let resolver = AlgorithmResolver::new(&catalog, &table);
        let request = AlgorithmRequest::new("KISAO_0000029");

        assert!(resolver.resolve(&request, SubstitutionPolicy::SameFramework).is_err());
        let resolved = resolver.resolve(&request, SubstitutionPolicy::Any).unwrap();
        assert_eq!(resolved.kisao_id, "KISAO_0000088");
        assert_eq!(resolved.matched_at, SubstitutionPolicy::Any);
    }

    #[test]
    fn test_unknown_parameter_dropped() {
        let catalog = AlgorithmCatalog::kisao();
        let table = table();
        let resolver = AlgorithmResolver::new(&catalog, &table);
        let request = AlgorithmRequest::new("KISAO_0000088")
            .with_change("KISAO_0000001", "3")
            .with_change("KISAO_0000415", "500");

        let resolved = resolver.resolve(&request, SubstitutionPolicy::None).unwrap();
        assert_eq!(resolved.parameters.len(), 1);
        assert_eq!(resolved.parameters[0].kisao_id, "KISAO_0000415");
    }

    #[test]
    fn test_invalid_value_strict_vs_lenient() {
        let catalog = AlgorithmCatalog::kisao();
        let table = table();
        let resolver = AlgorithmResolver::new(&catalog, &table);
        let request = AlgorithmRequest::new("KISAO_0000088").with_change("KISAO_0000209", "two e minus 8");

        let err = resolver.resolve(&request, SubstitutionPolicy::None).unwrap_err();
        assert!(err.to_string().contains("is not a valid float value"));

        let resolved = resolver
            .resolve(&request, SubstitutionPolicy::SimilarVariables)
            .unwrap();
        assert!(resolved.parameters.is_empty());
    }

    #[test]
    fn test_substitution_drops_parameters() {
        let catalog = AlgorithmCatalog::kisao();
        let table = table();
        let resolver = AlgorithmResolver::new(&catalog, &table);
        let request = AlgorithmRequest::new("KISAO_0000032").with_change("KISAO_0000209", "1e-6");

        let resolved = resolver
            .resolve(&request, SubstitutionPolicy::SimilarVariables)
            .unwrap();
        assert!(resolved.is_substituted());
        assert!(resolved.parameters.is_empty());
    }

    #[test]
    fn test_events_force_fallback() {
        let catalog = AlgorithmCatalog::kisao();
        let table = table();
        let resolver = AlgorithmResolver::new(&catalog, &table);
        let request = AlgorithmRequest::new("KISAO_0000088");
        let features = ModelFeatures { events: true };

        let resolved = resolver
            .resolve_for(&request, SubstitutionPolicy::SimilarVariables, features)
            .unwrap();
        assert_eq!(resolved.backend_id, "CVODE");

        let err = resolver
            .resolve_for(&request, SubstitutionPolicy::None, features)
            .unwrap_err();
        assert!(err.to_string().contains("model has events"));
    }
}
