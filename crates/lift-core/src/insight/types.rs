//! Types for the insight engine

use serde::Serialize;

use crate::cursor::{Record, Value};
use crate::table::Table;

/// One (variable, state) row of an evidence diff
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffRow {
    pub variable: String,
    pub state: String,
    /// Probability under the base evidence
    pub base_probability: f64,
    /// Probability under base + new evidence
    pub value: f64,
    /// `value - base_probability`
    pub difference: f64,
    /// Evidence token of this row
    pub variable_state: String,
    /// Continuous child, for `Cluster_<name>` rows
    pub continuous_variable_name: Option<String>,
    /// Child mean given this state; zero until backfilled
    pub mean: f64,
    /// Child variance given this state; zero until backfilled
    pub variance: f64,
}

impl Record for DiffRow {
    fn field(&self, column: &str) -> Value<'_> {
        match column {
            "variable" => Value::Text(&self.variable),
            "state" => Value::Text(&self.state),
            "base_probability" => Value::Number(self.base_probability),
            "value" => Value::Number(self.value),
            "difference" => Value::Number(self.difference),
            "variable_state" => Value::Text(&self.variable_state),
            "continuous_variable_name" => match &self.continuous_variable_name {
                Some(name) => Value::Text(name),
                None => Value::Missing,
            },
            "mean" => Value::Number(self.mean),
            "variance" => Value::Number(self.variance),
            _ => Value::Missing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContinuousDiffRow {
    pub variable: String,
    pub mean: f64,
    pub variance: f64,
    pub base_mean: f64,
    pub base_variance: f64,
}

impl Record for ContinuousDiffRow {
    fn field(&self, column: &str) -> Value<'_> {
        match column {
            "variable" => Value::Text(&self.variable),
            "mean" => Value::Number(self.mean),
            "variance" => Value::Number(self.variance),
            "base_mean" => Value::Number(self.base_mean),
            "base_variance" => Value::Number(self.base_variance),
            _ => Value::Missing,
        }
    }
}

pub type DiffTable = Table<DiffRow>;
pub type ContinuousDiffTable = Table<ContinuousDiffRow>;

/// Joined base/new query results
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DiffResult {
    pub discrete: DiffTable,
    pub continuous: ContinuousDiffTable,
}

/// Aggregated statistics for one ranked token
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InsightStats {
    /// Latent cluster state, described by its continuous child
    Cluster {
        mean: f64,
        variance: f64,
        sum_difference: f64,
    },
    Discrete {
        base_probability: f64,
        target_probability: f64,
        sum_difference: f64,
    },
}

impl InsightStats {
    pub fn sum_difference(&self) -> f64 {
        match self {
            InsightStats::Cluster { sum_difference, .. }
            | InsightStats::Discrete { sum_difference, .. } => *sum_difference,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedInsight {
    pub token: String,
    pub stats: InsightStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContinuousSummary {
    pub variable: String,
    pub mean: f64,
    pub variance: f64,
}

/// Trace of one greedy top-k run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinationResult {
    pub evidence: Vec<String>,
    /// Aligned with `evidence`
    pub difference: Vec<f64>,
    /// Target probability before each evidence item was added
    pub probability: Vec<f64>,
    pub max_probability: f64,
    /// Child moments for every `Cluster_*` item, in pick order
    pub continuous_variables: Vec<ContinuousSummary>,
}

/// One evidence item of a combination, flattened
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinationRow {
    pub variable: String,
    pub state: String,
    pub difference: f64,
    pub probability: f64,
    pub max_probability: f64,
    pub mean: Option<f64>,
    pub variance: Option<f64>,
}

/// Trace of one convergent search run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunTrace {
    pub evidence: Vec<String>,
    pub difference: Vec<f64>,
    /// Target probability once the run settled, or under all gathered
    /// evidence when it stopped first
    pub probability: f64,
    pub over_limit: bool,
    /// False when the run hit the depth limit or ran out of candidates
    pub converged: bool,
}
