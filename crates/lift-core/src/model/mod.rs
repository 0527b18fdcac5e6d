//! Model collaborator abstraction
//!
//! The insight engine never computes probabilities itself. It asks a
//! [`ModelTrainer`] for trained models and talks to each [`Model`] through
//! short-lived [`InferenceSession`]s.
//!
//! # Architecture
//!
//! - `StructureSpec`: declarative description of the network to train
//! - `ModelTrainer` trait: learns a model from training row indexes
//! - `Model` trait: a trained model that can open inference sessions
//! - `InferenceSession` trait: evidence + queries against one model
//! - Implementations: `NaiveLatentModel` (exact inference) trained by `EmTrainer`
//!
//! Sessions are owned values. Dropping a session discards its evidence, so a
//! query scoped to one session can never leak evidence into the next one.

pub mod naive;
pub mod predict;

pub use naive::{EmOptions, EmTrainer, GaussianMixture, NaiveLatentModel, NaiveParameters};
pub use predict::{predict, Prediction, PredictionOutcome, TargetPrediction};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::evidence::{
    is_latent_cluster, DiscreteAssignment, EvidenceSet, CLUSTER_PREFIX, LATENT_CLUSTER,
    STATE_DELIMITER,
};
use crate::table::{ContinuousTable, DiscreteTable};

/// Default number of states of the latent `Cluster` parent
pub const DEFAULT_LATENT_STATES: usize = 10;

/// Default number of states of each `Cluster_<continuous>` parent
pub const DEFAULT_CLUSTER_STATES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    Discrete,
    Continuous,
}

impl VariableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariableKind::Discrete => "discrete",
            VariableKind::Continuous => "continuous",
        }
    }
}

/// One node of the network
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableSpec {
    pub name: String,
    pub kind: VariableKind,
    /// State names; empty for continuous variables
    pub states: Vec<String>,
}

/// Declarative naive network with latent parents
///
/// `Cluster` is the parent of every discrete variable and of one
/// `Cluster_<c>` node per continuous variable `c`, which in turn is the
/// parent of `c`.
#[derive(Debug, Clone, PartialEq)]
pub struct StructureSpec {
    variables: Vec<VariableSpec>,
    index: HashMap<String, usize>,
    latent_states: usize,
    cluster_states: usize,
}

impl StructureSpec {
    /// Build the naive structure from user variables
    ///
    /// `discrete` pairs each variable with its states; `continuous` names the
    /// continuous variables.
    pub fn naive_with_latent_parents(
        discrete: Vec<(String, Vec<String>)>,
        continuous: Vec<String>,
        latent_states: usize,
        cluster_states: usize,
    ) -> Result<Self> {
        if latent_states == 0 {
            return Err(Error::InvalidData(
                "latent cluster needs at least one state".to_string(),
            ));
        }
        if !continuous.is_empty() && cluster_states == 0 {
            return Err(Error::InvalidData(
                "continuous cluster parents need at least one state".to_string(),
            ));
        }

        let mut variables = vec![VariableSpec {
            name: LATENT_CLUSTER.to_string(),
            kind: VariableKind::Discrete,
            states: cluster_state_names(latent_states),
        }];

        for name in continuous {
            check_user_name(&name)?;
            variables.push(VariableSpec {
                name: format!("{}{}", CLUSTER_PREFIX, name),
                kind: VariableKind::Discrete,
                states: cluster_state_names(cluster_states),
            });
            variables.push(VariableSpec {
                name,
                kind: VariableKind::Continuous,
                states: vec![],
            });
        }

        for (name, states) in discrete {
            check_user_name(&name)?;
            if states.is_empty() {
                return Err(Error::InvalidData(format!(
                    "discrete variable '{}' has no states",
                    name
                )));
            }
            if let Some(bad) = states.iter().find(|s| s.contains(STATE_DELIMITER)) {
                return Err(Error::InvalidData(format!(
                    "state '{}' of '{}' contains the reserved delimiter",
                    bad, name
                )));
            }
            variables.push(VariableSpec {
                name,
                kind: VariableKind::Discrete,
                states,
            });
        }

        let mut index = HashMap::new();
        for (position, variable) in variables.iter().enumerate() {
            if index.insert(variable.name.clone(), position).is_some() {
                return Err(Error::InvalidData(format!(
                    "duplicate variable '{}'",
                    variable.name
                )));
            }
        }

        Ok(Self {
            variables,
            index,
            latent_states,
            cluster_states,
        })
    }

    /// All variables in query order
    pub fn variables(&self) -> &[VariableSpec] {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<&VariableSpec> {
        self.index.get(name).map(|&i| &self.variables[i])
    }

    pub fn variable_kind(&self, name: &str) -> Result<VariableKind> {
        self.variable(name)
            .map(|v| v.kind)
            .ok_or_else(|| Error::UnknownVariable(name.to_string()))
    }

    pub fn states_of(&self, name: &str) -> Result<&[String]> {
        let variable = self
            .variable(name)
            .ok_or_else(|| Error::UnknownVariable(name.to_string()))?;
        match variable.kind {
            VariableKind::Discrete => Ok(&variable.states),
            VariableKind::Continuous => Err(Error::TypeMismatch(format!(
                "variable '{}' is continuous and has no states",
                name
            ))),
        }
    }

    pub fn state_index(&self, variable: &str, state: &str) -> Option<usize> {
        self.variable(variable)?
            .states
            .iter()
            .position(|s| s == state)
    }

    /// Every other state of the assignment's variable, as assignments
    pub fn other_states_of(
        &self,
        assignment: &DiscreteAssignment,
    ) -> Result<Vec<DiscreteAssignment>> {
        Ok(self
            .states_of(&assignment.variable)?
            .iter()
            .filter(|s| **s != assignment.state)
            .map(|s| DiscreteAssignment::new(assignment.variable.clone(), s.clone()))
            .collect())
    }

    /// Observable discrete variables (latent parents excluded)
    pub fn discrete_variables(&self) -> impl Iterator<Item = &VariableSpec> {
        self.variables
            .iter()
            .filter(|v| v.kind == VariableKind::Discrete && !is_latent_cluster(&v.name))
    }

    pub fn continuous_variables(&self) -> impl Iterator<Item = &VariableSpec> {
        self.variables
            .iter()
            .filter(|v| v.kind == VariableKind::Continuous)
    }

    pub fn latent_states(&self) -> usize {
        self.latent_states
    }

    pub fn cluster_states(&self) -> usize {
        self.cluster_states
    }
}

fn cluster_state_names(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{}{}", LATENT_CLUSTER, i)).collect()
}

fn check_user_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidData("variable name cannot be empty".to_string()));
    }
    // a trailing '$' would merge into the delimiter: "p$" + "$$" + "x" reads back as ("p", "$x")
    if name.contains(STATE_DELIMITER) || name.ends_with('$') {
        return Err(Error::InvalidData(format!(
            "variable '{}' clashes with the reserved delimiter",
            name
        )));
    }
    if is_latent_cluster(name) {
        return Err(Error::InvalidData(format!(
            "variable name '{}' is reserved for latent parents",
            name
        )));
    }
    Ok(())
}

/// Variables to include in a query
#[derive(Debug, Clone, PartialEq, Default)]
pub enum QueryVariables {
    #[default]
    All,
    Only(Vec<String>),
}

/// Snapshot produced by one query
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResult {
    pub discrete: DiscreteTable,
    pub continuous: ContinuousTable,
}

/// Trait defining how models are trained
pub trait ModelTrainer {
    type Model: Model;

    /// Train a fresh model over the given training rows
    ///
    /// Training may be stochastic; latent labels are not stable between calls.
    fn train(&self, structure: &StructureSpec, rows: &[usize]) -> Result<Self::Model>;
}

/// A trained model
pub trait Model {
    fn structure(&self) -> &StructureSpec;

    /// Open an inference session with no evidence
    fn open_session(&self) -> Box<dyn InferenceSession + '_>;
}

/// Evidence and queries against one model
pub trait InferenceSession {
    /// Apply evidence on top of what is already set; last value per variable wins
    fn apply_evidence(&mut self, evidence: &EvidenceSet) -> Result<()>;

    fn clear_evidence(&mut self);

    fn execute(&mut self, variables: &QueryVariables) -> Result<QueryResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn structure() -> StructureSpec {
        StructureSpec::naive_with_latent_parents(
            vec![
                ("T".to_string(), vec!["yes".to_string(), "no".to_string()]),
                (
                    "X".to_string(),
                    vec!["a".to_string(), "b".to_string(), "c".to_string()],
                ),
            ],
            vec!["income".to_string()],
            4,
            3,
        )
        .unwrap()
    }

    #[test]
    fn test_naive_structure_layout() {
        let s = structure();
        let names: Vec<&str> = s.variables().iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["Cluster", "Cluster_income", "income", "T", "X"]);
        assert_eq!(s.states_of("Cluster").unwrap().len(), 4);
        assert_eq!(
            s.states_of("Cluster_income").unwrap(),
            &["Cluster0", "Cluster1", "Cluster2"]
        );
    }

    #[test]
    fn test_variable_kind() {
        let s = structure();
        assert_eq!(s.variable_kind("income").unwrap(), VariableKind::Continuous);
        assert_eq!(s.variable_kind("T").unwrap(), VariableKind::Discrete);
        assert!(matches!(
            s.variable_kind("missing"),
            Err(Error::UnknownVariable(_))
        ));
    }

    #[test]
    fn test_other_states_of() {
        let s = structure();
        let others = s
            .other_states_of(&DiscreteAssignment::new("X", "b"))
            .unwrap();
        let tokens: Vec<String> = others.iter().map(|a| a.to_token()).collect();
        assert_eq!(tokens, vec!["X$$a", "X$$c"]);
    }

    #[test]
    fn test_observable_variable_iterators() {
        let s = structure();
        let discrete: Vec<&str> = s.discrete_variables().map(|v| v.name.as_str()).collect();
        assert_eq!(discrete, vec!["T", "X"]);
        let continuous: Vec<&str> = s
            .continuous_variables()
            .map(|v| v.name.as_str())
            .collect();
        assert_eq!(continuous, vec!["income"]);
    }

    #[test]
    fn test_rejects_reserved_and_duplicate_names() {
        let reserved = StructureSpec::naive_with_latent_parents(
            vec![("Cluster_x".to_string(), vec!["a".to_string()])],
            vec![],
            2,
            3,
        );
        assert!(matches!(reserved, Err(Error::InvalidData(_))));

        let duplicate = StructureSpec::naive_with_latent_parents(
            vec![("income".to_string(), vec!["a".to_string()])],
            vec!["income".to_string()],
            2,
            3,
        );
        assert!(matches!(duplicate, Err(Error::InvalidData(_))));

        let bad_state = StructureSpec::naive_with_latent_parents(
            vec![("A".to_string(), vec!["x$$y".to_string()])],
            vec![],
            2,
            3,
        );
        assert!(matches!(bad_state, Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_rejects_names_ending_in_dollar() {
        let discrete = StructureSpec::naive_with_latent_parents(
            vec![("X$".to_string(), vec!["a".to_string()])],
            vec![],
            2,
            3,
        );
        assert!(matches!(discrete, Err(Error::InvalidData(_))));

        let continuous = StructureSpec::naive_with_latent_parents(
            vec![],
            vec!["price$".to_string()],
            2,
            3,
        );
        assert!(matches!(continuous, Err(Error::InvalidData(_))));

        // '$' elsewhere in a name is fine and still reads back whole
        let inner = StructureSpec::naive_with_latent_parents(
            vec![("$cost".to_string(), vec!["$low".to_string()])],
            vec![],
            2,
            3,
        )
        .unwrap();
        let token = DiscreteAssignment::new("$cost", "$low").to_token();
        let decoded = DiscreteAssignment::from_token(&token).unwrap();
        assert_eq!(inner.state_index(&decoded.variable, &decoded.state), Some(0));
    }
}
