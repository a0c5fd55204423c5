//! Algorithm catalog - the data the resolver works from
//!
//! Which KiSAO terms are related, and in which order backend algorithms win a tie, is
//! policy. It lives here as plain data so a deployment can supply its own ordering
//! without touching the resolver.

use super::ValueType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Kind of quantity an algorithm can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservableKind {
    /// Continuous concentration
    Concentration,
    /// Continuous amount
    Amount,
    /// Reaction flux
    Flux,
    /// Discrete particle number
    ParticleNumber,
    /// Probability distribution
    Probability,
}

/// A known KiSAO algorithm term
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmTerm {
    /// KiSAO id, e.g. `KISAO_0000019`
    pub kisao_id: String,
    /// Human readable name
    pub name: String,
    /// Method shared by alias terms
    pub method: String,
    /// Integration family
    pub family: String,
    /// Modeling framework
    pub framework: String,
    /// Observable kinds
    pub observables: BTreeSet<ObservableKind>,
}

impl AlgorithmTerm {
    fn new(
        kisao_id: &str,
        name: &str,
        method: &str,
        family: &str,
        framework: &str,
        observables: &[ObservableKind],
    ) -> Self {
        Self {
            kisao_id: kisao_id.to_string(),
            name: name.to_string(),
            method: method.to_string(),
            family: family.to_string(),
            framework: framework.to_string(),
            observables: observables.iter().copied().collect(),
        }
    }
}

/// Parameter an algorithm accepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// KiSAO parameter id, e.g. `KISAO_0000209`
    pub kisao_id: String,
    /// Backend setting name, e.g. `lsoda_rtol`
    pub backend_id: String,
    /// Human readable name
    pub name: String,
    /// Expected value type
    pub value_type: ValueType,
}

impl ParameterSpec {
    /// Create a parameter spec
    #[must_use]
    pub fn new(
        kisao_id: impl Into<String>,
        backend_id: impl Into<String>,
        name: impl Into<String>,
        value_type: ValueType,
    ) -> Self {
        Self {
            kisao_id: kisao_id.into(),
            backend_id: backend_id.into(),
            name: name.into(),
            value_type,
        }
    }
}

/// One row of a backend's capability table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendAlgorithm {
    /// KiSAO id implemented
    pub kisao_id: String,
    /// Backend-native name, e.g. `LSODA`
    pub backend_id: String,
    /// Observable kinds the backend can record with this algorithm
    pub observables: BTreeSet<ObservableKind>,
    /// Accepted parameters
    pub parameters: Vec<ParameterSpec>,
    /// Whether models with discrete events can be simulated
    pub supports_events: bool,
}

impl BackendAlgorithm {
    /// Look up an accepted parameter by KiSAO id
    #[must_use]
    pub fn parameter(&self, kisao_id: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.kisao_id == kisao_id)
    }
}

/// Known algorithm terms plus the tie-break priority among backend algorithms.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlgorithmCatalog {
    terms: Vec<AlgorithmTerm>,
    priority: Vec<String>,
}

impl AlgorithmCatalog {
    /// Create a catalog from terms and a priority order of KiSAO ids
    #[must_use]
    pub fn new(terms: Vec<AlgorithmTerm>, priority: Vec<String>) -> Self {
        Self { terms, priority }
    }

    /// Catalog of common KiSAO ODE and stochastic simulation terms.
    ///
    /// Priority prefers LSODA, then CVODE, then the explicit Runge-Kutta schemes.
    #[must_use]
    pub fn kisao() -> Self {
        use ObservableKind::{Amount, Concentration, Flux, ParticleNumber};
        let ode = [Concentration, Amount, Flux];
        let ssa = [Amount, ParticleNumber];

        let terms = vec![
            AlgorithmTerm::new("KISAO_0000019", "CVODE", "CVODE", "ode-implicit", "continuous", &ode),
            AlgorithmTerm::new("KISAO_0000496", "CVODES", "CVODE", "ode-implicit", "continuous", &ode),
            AlgorithmTerm::new("KISAO_0000088", "LSODA", "LSODA", "ode-implicit", "continuous", &ode),
            AlgorithmTerm::new("KISAO_0000089", "LSODAR", "LSODA", "ode-implicit", "continuous", &ode),
            AlgorithmTerm::new("KISAO_0000094", "Livermore solver", "LSODE", "ode-implicit", "continuous", &ode),
            AlgorithmTerm::new("KISAO_0000032", "explicit fourth-order Runge-Kutta", "RK4", "ode-explicit", "continuous", &ode),
            AlgorithmTerm::new("KISAO_0000030", "forward Euler", "EULER", "ode-explicit", "continuous", &ode),
            AlgorithmTerm::new("KISAO_0000086", "Fehlberg method", "RKF45", "ode-explicit", "continuous", &ode),
            AlgorithmTerm::new("KISAO_0000029", "Gillespie direct method", "SSA", "ssa", "discrete", &ssa),
            AlgorithmTerm::new("KISAO_0000027", "Gibson-Bruck next reaction", "NRM", "ssa", "discrete", &ssa),
            AlgorithmTerm::new("KISAO_0000039", "tau-leaping", "TAU", "ssa-approximate", "discrete", &ssa),
        ];

        let priority = ["KISAO_0000088", "KISAO_0000019", "KISAO_0000032", "KISAO_0000030"]
            .iter()
            .map(ToString::to_string)
            .collect();

        Self { terms, priority }
    }

    /// Look up a term by KiSAO id
    #[must_use]
    pub fn term(&self, kisao_id: &str) -> Option<&AlgorithmTerm> {
        self.terms.iter().find(|t| t.kisao_id == kisao_id)
    }

    /// Position of a KiSAO id in the tie-break order (unlisted ids sort last).
    #[must_use]
    pub fn rank(&self, kisao_id: &str) -> usize {
        self.priority
            .iter()
            .position(|id| id == kisao_id)
            .unwrap_or(self.priority.len())
    }

    /// Backend algorithms sorted by tie-break priority.
    ///
    /// Algorithms with equal rank keep their table order.
    #[must_use]
    pub fn prioritize<'a>(&self, backend: &'a [BackendAlgorithm]) -> Vec<&'a BackendAlgorithm> {
        let mut sorted: Vec<&BackendAlgorithm> = backend.iter().collect();
        sorted.sort_by_key(|alg| self.rank(&alg.kisao_id));
        sorted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kisao_catalog_terms() {
        let catalog = AlgorithmCatalog::kisao();
        let cvode = catalog.term("KISAO_0000019").unwrap();
        assert_eq!(cvode.method, "CVODE");
        assert_eq!(catalog.term("KISAO_0000496").unwrap().method, "CVODE");
        assert!(catalog.term("KISAO_9999999").is_none());
    }

    #[test]
    fn test_rank_unlisted_sorts_last() {
        let catalog = AlgorithmCatalog::kisao();
        assert_eq!(catalog.rank("KISAO_0000088"), 0);
        assert!(catalog.rank("KISAO_0000029") > catalog.rank("KISAO_0000030"));
    }

    #[test]
    fn test_prioritize_is_stable() {
        let catalog = AlgorithmCatalog::new(Vec::new(), vec!["B".to_string()]);
        let alg = |id: &str| BackendAlgorithm {
            kisao_id: id.to_string(),
            backend_id: id.to_string(),
            observables: BTreeSet::new(),
            parameters: Vec::new(),
            supports_events: false,
        };
        let table = vec![alg("A"), alg("C"), alg("B")];
        let ids: Vec<_> = catalog
            .prioritize(&table)
            .iter()
            .map(|a| a.kisao_id.as_str())
            .collect();
        assert_eq!(ids, vec!["B", "A", "C"]);
    }
}
