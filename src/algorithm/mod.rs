//! Algorithm requests and substitution policy
//!
//! A simulation names its algorithm abstractly with a KiSAO id plus parameter changes
//! keyed by KiSAO parameter ids. The [`resolver`] maps such a request onto one of the
//! algorithms a backend actually implements, relaxing the match step by step up to the
//! configured [`SubstitutionPolicy`].
//!
//! ## Relaxation ladder
//!
//! ```text
//! NONE ─> SAME_METHOD ─> SAME_MATH ─> ... ─> SIMILAR_VARIABLES ─> SAME_FRAMEWORK ─> ANY
//!  exact    same method    same family        variable superset    same framework    anything
//! ```

mod catalog;
mod resolver;

pub use catalog::{AlgorithmCatalog, AlgorithmTerm, BackendAlgorithm, ObservableKind, ParameterSpec};
pub use resolver::{AlgorithmResolver, ResolveError, ResolvedAlgorithm, ResolvedParameter};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ordered relaxation levels for algorithm substitution (KiSAO naming).
///
/// Later variants are strictly more permissive than earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubstitutionPolicy {
    /// Only the requested algorithm
    None,
    /// Alternative ids of the same method
    SameMethod,
    /// Same mathematical formulation
    SameMath,
    /// Similar numerical approximations
    SimilarApproximations,
    /// Different approximations of the same family
    DistinctApproximations,
    /// Different scales with identical observables
    DistinctScales,
    /// Identical observable variable kinds
    SameVariables,
    /// Observable variable kinds are covered by the substitute
    SimilarVariables,
    /// Same modeling framework (continuous / discrete)
    SameFramework,
    /// Any algorithm the backend implements
    Any,
}

/// Equivalence criterion tested at one relaxation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Equivalence {
    /// Identical KiSAO id
    Exact,
    /// Same method (alias ids)
    SameMethod,
    /// Same integration family
    SameFamily,
    /// Identical set of observable kinds
    SameVariables,
    /// Substitute observes at least the requested kinds
    SimilarVariables,
    /// Same framework
    SameFramework,
    /// No constraint
    Any,
}

impl SubstitutionPolicy {
    /// All levels, least to most permissive.
    pub const ALL: [Self; 10] = [
        Self::None,
        Self::SameMethod,
        Self::SameMath,
        Self::SimilarApproximations,
        Self::DistinctApproximations,
        Self::DistinctScales,
        Self::SameVariables,
        Self::SimilarVariables,
        Self::SameFramework,
        Self::Any,
    ];

    /// Criterion a substitute must satisfy at this level.
    #[must_use]
    pub const fn equivalence(self) -> Equivalence {
        match self {
            Self::None => Equivalence::Exact,
            Self::SameMethod => Equivalence::SameMethod,
            Self::SameMath | Self::SimilarApproximations | Self::DistinctApproximations => {
                Equivalence::SameFamily
            }
            Self::DistinctScales | Self::SameVariables => Equivalence::SameVariables,
            Self::SimilarVariables => Equivalence::SimilarVariables,
            Self::SameFramework => Equivalence::SameFramework,
            Self::Any => Equivalence::Any,
        }
    }

    /// Levels to walk, in order, when this policy is active.
    pub fn ladder(self) -> impl Iterator<Item = Self> {
        Self::ALL.into_iter().take_while(move |level| *level <= self)
    }

    /// KiSAO name of the level
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::SameMethod => "SAME_METHOD",
            Self::SameMath => "SAME_MATH",
            Self::SimilarApproximations => "SIMILAR_APPROXIMATIONS",
            Self::DistinctApproximations => "DISTINCT_APPROXIMATIONS",
            Self::DistinctScales => "DISTINCT_SCALES",
            Self::SameVariables => "SAME_VARIABLES",
            Self::SimilarVariables => "SIMILAR_VARIABLES",
            Self::SameFramework => "SAME_FRAMEWORK",
            Self::Any => "ANY",
        }
    }
}

impl Default for SubstitutionPolicy {
    fn default() -> Self {
        Self::SimilarVariables
    }
}

impl fmt::Display for SubstitutionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubstitutionPolicy {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        let wanted = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == wanted)
            .ok_or_else(|| {
                crate::Error::Config(format!(
                    "Unknown algorithm substitution policy `{s}`; expected one of {}",
                    Self::ALL.map(|l| l.as_str()).join(", ")
                ))
            })
    }
}

/// Declared change of one algorithm parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterChange {
    /// KiSAO id of the parameter
    pub kisao_id: String,
    /// New value, unparsed
    pub new_value: String,
}

impl ParameterChange {
    /// Create a parameter change
    #[must_use]
    pub fn new(kisao_id: impl Into<String>, new_value: impl Into<String>) -> Self {
        Self {
            kisao_id: kisao_id.into(),
            new_value: new_value.into(),
        }
    }
}

/// Abstract algorithm request of a simulation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmRequest {
    /// Requested KiSAO algorithm id
    pub kisao_id: String,
    /// Requested parameter changes, in declaration order
    #[serde(default)]
    pub changes: Vec<ParameterChange>,
}

impl AlgorithmRequest {
    /// Request an algorithm without parameter changes
    #[must_use]
    pub fn new(kisao_id: impl Into<String>) -> Self {
        Self {
            kisao_id: kisao_id.into(),
            changes: Vec::new(),
        }
    }

    /// Add a parameter change
    #[must_use]
    pub fn with_change(mut self, kisao_id: impl Into<String>, new_value: impl Into<String>) -> Self {
        self.changes.push(ParameterChange::new(kisao_id, new_value));
        self
    }
}

/// Value type of a backend algorithm parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// 64-bit float
    Float,
    /// 64-bit signed integer
    Integer,
    /// Boolean
    Boolean,
    /// Free text
    String,
}

impl ValueType {
    /// Type name for diagnostics
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::String => "string",
        }
    }

    /// Parse a raw string into a typed value
    ///
    /// Returns `None` if the string is not a valid value of this type.
    #[must_use]
    pub fn parse(self, raw: &str) -> Option<ParameterValue> {
        let raw = raw.trim();
        match self {
            Self::Float => raw.parse::<f64>().ok().map(ParameterValue::Float),
            Self::Integer => raw.parse::<i64>().ok().map(ParameterValue::Integer),
            Self::Boolean => match raw.to_ascii_lowercase().as_str() {
                "true" | "1" => Some(ParameterValue::Boolean(true)),
                "false" | "0" => Some(ParameterValue::Boolean(false)),
                _ => None,
            },
            Self::String => Some(ParameterValue::String(raw.to_string())),
        }
    }
}

/// Typed parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    /// Float value
    Float(f64),
    /// Integer value
    Integer(i64),
    /// Boolean value
    Boolean(bool),
    /// Text value
    String(String),
}

impl ParameterValue {
    /// Float view of numeric values
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Integer view of integer values
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_ordering() {
        assert!(SubstitutionPolicy::None < SubstitutionPolicy::SameMethod);
        assert!(SubstitutionPolicy::SimilarVariables < SubstitutionPolicy::Any);
        assert_eq!(SubstitutionPolicy::default(), SubstitutionPolicy::SimilarVariables);
    }

    #[test]
    fn test_ladder_stops_at_policy() {
        let levels: Vec<_> = SubstitutionPolicy::SameMath.ladder().collect();
        assert_eq!(
            levels,
            vec![
                SubstitutionPolicy::None,
                SubstitutionPolicy::SameMethod,
                SubstitutionPolicy::SameMath
            ]
        );
        assert_eq!(SubstitutionPolicy::None.ladder().count(), 1);
        assert_eq!(SubstitutionPolicy::Any.ladder().count(), 10);
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!(
            "similar_variables".parse::<SubstitutionPolicy>().unwrap(),
            SubstitutionPolicy::SimilarVariables
        );
        assert_eq!("ANY".parse::<SubstitutionPolicy>().unwrap(), SubstitutionPolicy::Any);
        assert!("SOMETIMES".parse::<SubstitutionPolicy>().is_err());
    }

    #[test]
    fn test_value_parsing() {
        assert_eq!(ValueType::Float.parse("1e-8"), Some(ParameterValue::Float(1e-8)));
        assert_eq!(ValueType::Float.parse("two e minus 8"), None);
        assert_eq!(ValueType::Integer.parse("500"), Some(ParameterValue::Integer(500)));
        assert_eq!(ValueType::Integer.parse("5.5"), None);
        assert_eq!(ValueType::Boolean.parse("TRUE"), Some(ParameterValue::Boolean(true)));
        assert_eq!(ValueType::Boolean.parse("yes"), None);
    }
}
