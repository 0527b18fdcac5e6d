//! Lift Core Library
//!
//! Sensitivity and insight analysis over latent-cluster Bayesian networks:
//! - Evidence tokens (`variable$$state`) and evidence sets
//! - Query result tables and a forward-only cursor over them
//! - Model collaborator traits, with a naive latent-parent reference model
//!   trained by expectation-maximisation
//! - Evidence-diff queries and stable cluster index resolution
//! - AutoInsight searches: exclusive states, bivariate ranking, greedy
//!   combinations and convergent combinations
//! - CSV datasets and TOML configuration

pub mod config;
pub mod cursor;
pub mod dataset;
pub mod error;
pub mod evidence;
pub mod insight;
pub mod model;
pub mod table;

/// Fixture models, datasets and a fixed trainer
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{default_config_path, LiftConfig};
pub use cursor::{Cursor, Record, RowSource, Value};
pub use dataset::Dataset;
pub use error::{Error, Result};
pub use evidence::{DiscreteAssignment, Evidence, EvidenceSet};
pub use insight::{
    rationalise, AutoInsight, CombinationResult, DiffResult, InsightOptions, RankedInsight,
    RunTrace,
};
pub use model::{
    EmOptions, EmTrainer, InferenceSession, Model, ModelTrainer, NaiveLatentModel,
    QueryResult, QueryVariables, StructureSpec, VariableKind,
};
pub use table::{ContinuousRow, ContinuousTable, DiscreteRow, DiscreteTable, Table};
