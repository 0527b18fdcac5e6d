//! Insight Engine - what moves a target, and by how much
//!
//! Given a target `(variable, state)`, the engine trains models (or reuses
//! cached ones), diffs the network under the target against its alternate
//! states, and aggregates the differences across runs.
//!
//! ## Searches
//!
//! - **Exclusive states** - states that are near-impossible without the target
//! - **Bivariate combinations** - single states ranked by accumulated difference
//! - **Top variable combinations** - greedy fixed-depth evidence sequences
//! - **Variable combinations** - greedy sequences grown until the target settles
//!
//! Latent `Cluster_*` states are aggregated through their rank by continuous
//! mean, since raw cluster labels change between trainings.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use lift_core::insight::{rationalise, AutoInsight};
//!
//! let insight = AutoInsight::new(trainer, structure, dataset.row_indexes());
//! let target = DiscreteAssignment::new("churn", "yes");
//! let runs = insight.query_variable_combinations(&target, 3, 10, 4)?;
//! let ranked = rationalise(&runs, 20);
//! ```

pub mod cluster;
pub mod counter;
pub mod diff;
pub mod engine;
pub mod search;
pub mod types;

pub use cluster::{resolve_from_index, resolve_index};
pub use counter::{rationalise, FrequencyCounter, WeightedRun};
pub use diff::{conditional_moments, query_model_with_evidence, target_probability};
pub use engine::{AutoInsight, ExclusiveThresholds, InsightOptions, IterationPlan};
pub use search::{combination_rows, is_converged, MAX_CONVERGENCE_DP};
pub use types::{
    CombinationResult, CombinationRow, ContinuousDiffRow, ContinuousDiffTable, ContinuousSummary,
    DiffResult, DiffRow, DiffTable, InsightStats, RankedInsight, RunTrace,
};
