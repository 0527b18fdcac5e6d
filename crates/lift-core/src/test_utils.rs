//! Test utilities for lift-core
//!
//! Hand-parameterised models with known probabilities, a small dataset, and
//! a trainer that hands out fixture models instead of learning them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::model::{
    GaussianMixture, Model, ModelTrainer, NaiveLatentModel, NaiveParameters, StructureSpec,
};

fn states(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// `T ∈ {yes, no}`, `X ∈ {a, b}` over two latent clusters
///
/// Cluster0 always says `T=yes`, Cluster1 always `T=no`, and
/// `P(X=a | Cluster0) = P(X=b | Cluster1) = p`. So `P(T=yes) = 0.5` and
/// `P(T=yes | X=a) = p`.
pub fn tx_model(p: f64) -> NaiveLatentModel {
    let structure = StructureSpec::naive_with_latent_parents(
        vec![
            ("T".to_string(), states(&["yes", "no"])),
            ("X".to_string(), states(&["a", "b"])),
        ],
        vec![],
        2,
        3,
    )
    .expect("valid fixture structure");

    let mut discrete = HashMap::new();
    discrete.insert("T".to_string(), vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    discrete.insert("X".to_string(), vec![vec![p, 1.0 - p], vec![1.0 - p, p]]);

    NaiveLatentModel::from_parameters(
        structure,
        NaiveParameters {
            cluster_prior: vec![0.5, 0.5],
            discrete,
            continuous: HashMap::new(),
        },
    )
    .expect("valid fixture parameters")
}

const INCOME_MIXING: [[f64; 3]; 2] = [[0.7, 0.2, 0.1], [0.1, 0.2, 0.7]];
const INCOME_MEANS: [f64; 3] = [10.0, 50.0, 100.0];
const INCOME_VARIANCES: [f64; 3] = [4.0, 9.0, 16.0];

/// `T`, `X ∈ {a, b}`, `Y ∈ {u, v}` and continuous `income`, two latent clusters
///
/// `Cluster_income` states `Cluster0..2` carry means 10, 50 and 100.
pub fn income_model() -> NaiveLatentModel {
    income_model_with_order([0, 1, 2])
}

/// [`income_model`] with `Cluster_income` state `j` taking component `order[j]`
///
/// Every probability is unchanged; only the labels of the components move.
pub fn income_model_with_order(order: [usize; 3]) -> NaiveLatentModel {
    let structure = StructureSpec::naive_with_latent_parents(
        vec![
            ("T".to_string(), states(&["yes", "no"])),
            ("X".to_string(), states(&["a", "b"])),
            ("Y".to_string(), states(&["u", "v"])),
        ],
        vec!["income".to_string()],
        2,
        3,
    )
    .expect("valid fixture structure");

    let mut discrete = HashMap::new();
    discrete.insert("T".to_string(), vec![vec![0.8, 0.2], vec![0.2, 0.8]]);
    discrete.insert("X".to_string(), vec![vec![0.9, 0.1], vec![0.2, 0.8]]);
    discrete.insert("Y".to_string(), vec![vec![0.6, 0.4], vec![0.5, 0.5]]);

    let mut continuous = HashMap::new();
    continuous.insert(
        "income".to_string(),
        GaussianMixture {
            mixing: INCOME_MIXING
                .iter()
                .map(|row| order.iter().map(|&j| row[j]).collect())
                .collect(),
            means: order.iter().map(|&j| INCOME_MEANS[j]).collect(),
            variances: order.iter().map(|&j| INCOME_VARIANCES[j]).collect(),
        },
    );

    NaiveLatentModel::from_parameters(
        structure,
        NaiveParameters {
            cluster_prior: vec![0.5, 0.5],
            discrete,
            continuous,
        },
    )
    .expect("valid fixture parameters")
}

/// Two well separated segments: `yes`/`a` with low income, `no`/`b` with high
pub const SAMPLE_CSV: &str = "\
T,X,Y,income
yes,a,u,11.5
yes,a,u,9.0
yes,a,v,12.5
yes,a,u,10.0
yes,b,u,8.5
yes,a,,11.0
yes,a,u,9.5
yes,a,v,10.5
no,b,v,98.0
no,b,v,103.5
no,b,u,96.0
no,b,v,101.0
no,a,v,99.5
no,b,v,104.0
no,b,u,
no,b,v,97.5
";

pub fn sample_dataset() -> Dataset {
    Dataset::from_reader(SAMPLE_CSV.as_bytes()).expect("valid sample CSV")
}

/// Hands out clones of fixture models, round-robin
pub struct FixedTrainer {
    models: Vec<NaiveLatentModel>,
    calls: AtomicUsize,
}

impl FixedTrainer {
    pub fn new(models: Vec<NaiveLatentModel>) -> Self {
        Self {
            models,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `train` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ModelTrainer for FixedTrainer {
    type Model = NaiveLatentModel;

    fn train(&self, structure: &StructureSpec, _rows: &[usize]) -> Result<NaiveLatentModel> {
        if self.models.is_empty() {
            return Err(Error::Training("no fixture models".to_string()));
        }
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let model = &self.models[call % self.models.len()];
        if model.structure() != structure {
            return Err(Error::Training(
                "structure does not match the fixture model".to_string(),
            ));
        }
        Ok(model.clone())
    }
}
