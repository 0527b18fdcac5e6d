//! Naive network with latent parents
//!
//! `Cluster` is the root. Every observable discrete variable hangs off it
//! directly; every continuous variable `c` hangs off its own `Cluster_c`
//! node with a Gaussian per `Cluster_c` state. The tree is small enough that
//! inference is exact: one posterior over `Cluster` drives every marginal.
//!
//! [`EmTrainer`] learns the parameters by expectation-maximisation. Latent
//! labels are exchangeable, so two trainings over the same rows can swap
//! `Cluster0` and `Cluster2`; the insight engine deals with that through
//! cluster index resolution.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::evidence::{Evidence, EvidenceSet, CLUSTER_PREFIX, LATENT_CLUSTER};
use crate::table::{ContinuousRow, DiscreteRow};

use super::{
    InferenceSession, Model, ModelTrainer, QueryResult, QueryVariables, StructureSpec,
    VariableSpec,
};

/// ln(2π)
const LN_2PI: f64 = 1.837_877_066_409_345_5;

/// Gaussians of one continuous variable, selected by its `Cluster_c` parent
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianMixture {
    /// P(Cluster_c = j | Cluster = k), indexed `[k][j]`
    pub mixing: Vec<Vec<f64>>,
    pub means: Vec<f64>,
    pub variances: Vec<f64>,
}

/// Explicit parameters, keyed by variable name
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NaiveParameters {
    /// P(Cluster = k)
    pub cluster_prior: Vec<f64>,
    /// P(variable = s | Cluster = k), indexed `[k][s]`
    pub discrete: HashMap<String, Vec<Vec<f64>>>,
    pub continuous: HashMap<String, GaussianMixture>,
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Cluster,
    Discrete(usize),
    ClusterOf(usize),
    Continuous(usize),
}

/// Evidence in model coordinates; one entry per variable, so last write wins
#[derive(Debug, Clone)]
struct Observation {
    cluster: Option<usize>,
    discrete: Vec<Option<usize>>,
    cluster_states: Vec<Option<usize>>,
    continuous: Vec<Option<f64>>,
}

#[derive(Debug, Clone)]
pub struct NaiveLatentModel {
    structure: StructureSpec,
    slots: HashMap<String, Slot>,
    discrete_names: Vec<String>,
    continuous_names: Vec<String>,
    prior: Vec<f64>,
    cpts: Vec<Vec<Vec<f64>>>,
    mixtures: Vec<GaussianMixture>,
}

impl NaiveLatentModel {
    /// Model with uniform parameters and unit Gaussians
    fn uniform(structure: StructureSpec) -> Self {
        let k = structure.latent_states();
        let j = structure.cluster_states();

        let mut slots = HashMap::new();
        slots.insert(LATENT_CLUSTER.to_string(), Slot::Cluster);

        let mut discrete_names = Vec::new();
        let mut cpts = Vec::new();
        for variable in structure.discrete_variables() {
            slots.insert(variable.name.clone(), Slot::Discrete(discrete_names.len()));
            discrete_names.push(variable.name.clone());
            cpts.push(vec![uniform_distribution(variable.states.len()); k]);
        }

        let mut continuous_names = Vec::new();
        let mut mixtures = Vec::new();
        for variable in structure.continuous_variables() {
            let c = continuous_names.len();
            slots.insert(variable.name.clone(), Slot::Continuous(c));
            slots.insert(format!("{}{}", CLUSTER_PREFIX, variable.name), Slot::ClusterOf(c));
            continuous_names.push(variable.name.clone());
            mixtures.push(GaussianMixture {
                mixing: vec![uniform_distribution(j); k],
                means: vec![0.0; j],
                variances: vec![1.0; j],
            });
        }

        Self {
            prior: uniform_distribution(k),
            structure,
            slots,
            discrete_names,
            continuous_names,
            cpts,
            mixtures,
        }
    }

    /// Build a model from explicit parameters; rows are normalised
    pub fn from_parameters(structure: StructureSpec, parameters: NaiveParameters) -> Result<Self> {
        let mut model = Self::uniform(structure);
        let k = model.structure.latent_states();
        let j = model.structure.cluster_states();

        if parameters.cluster_prior.len() != k {
            return Err(Error::InvalidData(format!(
                "cluster prior has {} entries, expected {}",
                parameters.cluster_prior.len(),
                k
            )));
        }
        model.prior = normalise(&parameters.cluster_prior, LATENT_CLUSTER)?;

        for (d, name) in model.discrete_names.iter().enumerate() {
            let table = parameters
                .discrete
                .get(name)
                .ok_or_else(|| Error::InvalidData(format!("no parameters for '{}'", name)))?;
            let states = model.structure.states_of(name)?.len();
            if table.len() != k || table.iter().any(|row| row.len() != states) {
                return Err(Error::InvalidData(format!(
                    "parameters for '{}' must be {}x{}",
                    name, k, states
                )));
            }
            model.cpts[d] = table
                .iter()
                .map(|row| normalise(row, name))
                .collect::<Result<_>>()?;
        }

        for (c, name) in model.continuous_names.iter().enumerate() {
            let mixture = parameters
                .continuous
                .get(name)
                .ok_or_else(|| Error::InvalidData(format!("no parameters for '{}'", name)))?;
            if mixture.mixing.len() != k
                || mixture.mixing.iter().any(|row| row.len() != j)
                || mixture.means.len() != j
                || mixture.variances.len() != j
            {
                return Err(Error::InvalidData(format!(
                    "mixture for '{}' must have {}x{} mixing weights and {} components",
                    name, k, j, j
                )));
            }
            if mixture
                .variances
                .iter()
                .any(|v| !v.is_finite() || *v <= 0.0)
                || mixture.means.iter().any(|m| !m.is_finite())
            {
                return Err(Error::InvalidData(format!(
                    "mixture for '{}' needs finite means and positive variances",
                    name
                )));
            }
            model.mixtures[c] = GaussianMixture {
                mixing: mixture
                    .mixing
                    .iter()
                    .map(|row| normalise(row, name))
                    .collect::<Result<_>>()?,
                means: mixture.means.clone(),
                variances: mixture.variances.clone(),
            };
        }

        Ok(model)
    }

    /// Current parameters keyed by variable name
    pub fn parameters(&self) -> NaiveParameters {
        NaiveParameters {
            cluster_prior: self.prior.clone(),
            discrete: self
                .discrete_names
                .iter()
                .cloned()
                .zip(self.cpts.iter().cloned())
                .collect(),
            continuous: self
                .continuous_names
                .iter()
                .cloned()
                .zip(self.mixtures.iter().cloned())
                .collect(),
        }
    }

    fn empty_observation(&self) -> Observation {
        Observation {
            cluster: None,
            discrete: vec![None; self.discrete_names.len()],
            cluster_states: vec![None; self.continuous_names.len()],
            continuous: vec![None; self.continuous_names.len()],
        }
    }

    fn observe(&self, observation: &mut Observation, evidence: &Evidence) -> Result<()> {
        let slot = *self
            .slots
            .get(evidence.variable())
            .ok_or_else(|| Error::UnknownVariable(evidence.variable().to_string()))?;

        match evidence {
            Evidence::Discrete(assignment) => {
                let state = || {
                    self.structure
                        .state_index(&assignment.variable, &assignment.state)
                        .ok_or_else(|| Error::InvalidEvidence {
                            variable: assignment.variable.clone(),
                            state: assignment.state.clone(),
                        })
                };
                match slot {
                    Slot::Cluster => observation.cluster = Some(state()?),
                    Slot::Discrete(d) => observation.discrete[d] = Some(state()?),
                    Slot::ClusterOf(c) => observation.cluster_states[c] = Some(state()?),
                    Slot::Continuous(_) => {
                        return Err(Error::TypeMismatch(format!(
                            "cannot set state '{}' on continuous variable '{}'",
                            assignment.state, assignment.variable
                        )))
                    }
                }
            }
            Evidence::Continuous { variable, value } => {
                let Slot::Continuous(c) = slot else {
                    return Err(Error::TypeMismatch(format!(
                        "variable '{}' is not continuous",
                        variable
                    )));
                };
                if !value.is_finite() {
                    return Err(Error::InvalidData(format!(
                        "continuous evidence for '{}' must be finite",
                        variable
                    )));
                }
                observation.continuous[c] = Some(*value);
            }
        }
        Ok(())
    }

    /// Unnormalised ln P(Cluster = k, evidence)
    fn log_weights(&self, observation: &Observation) -> Vec<f64> {
        let mut weights: Vec<f64> = self.prior.iter().map(|p| p.ln()).collect();

        if let Some(observed) = observation.cluster {
            for (k, w) in weights.iter_mut().enumerate() {
                if k != observed {
                    *w = f64::NEG_INFINITY;
                }
            }
        }

        for (d, state) in observation.discrete.iter().enumerate() {
            if let Some(s) = state {
                for (k, w) in weights.iter_mut().enumerate() {
                    *w += self.cpts[d][k][*s].ln();
                }
            }
        }

        for (c, mixture) in self.mixtures.iter().enumerate() {
            let component = observation.cluster_states[c];
            let value = observation.continuous[c];
            if component.is_none() && value.is_none() {
                continue;
            }
            for (k, w) in weights.iter_mut().enumerate() {
                *w += log_sum_exp(&component_log_weights(mixture, k, component, value));
            }
        }

        weights
    }

    /// Posterior over `Cluster` and ln P(evidence)
    fn posterior(&self, observation: &Observation) -> Result<(Vec<f64>, f64)> {
        let weights = self.log_weights(observation);
        let total = log_sum_exp(&weights);
        if !total.is_finite() {
            return Err(Error::Inference(
                "evidence has zero probability under the model".to_string(),
            ));
        }
        Ok((weights.iter().map(|w| (w - total).exp()).collect(), total))
    }

    /// P(Cluster_c = j | evidence)
    fn component_posterior(&self, c: usize, observation: &Observation, posterior: &[f64]) -> Vec<f64> {
        let mixture = &self.mixtures[c];
        let mut out = vec![0.0; mixture.means.len()];
        for (k, r) in posterior.iter().enumerate() {
            if *r == 0.0 {
                continue;
            }
            let weights = component_log_weights(
                mixture,
                k,
                observation.cluster_states[c],
                observation.continuous[c],
            );
            let total = log_sum_exp(&weights);
            if !total.is_finite() {
                continue;
            }
            for (j, w) in weights.iter().enumerate() {
                out[j] += r * (w - total).exp();
            }
        }
        out
    }

    fn query(&self, observation: &Observation, variables: &QueryVariables) -> Result<QueryResult> {
        let selected: Vec<&VariableSpec> = match variables {
            QueryVariables::All => self.structure.variables().iter().collect(),
            QueryVariables::Only(names) => names
                .iter()
                .map(|name| {
                    self.structure
                        .variable(name)
                        .ok_or_else(|| Error::UnknownVariable(name.clone()))
                })
                .collect::<Result<_>>()?,
        };

        let (posterior, _) = self.posterior(observation)?;
        let mut result = QueryResult::default();

        for variable in selected {
            let slot = self.slots[&variable.name];
            let probabilities = match slot {
                Slot::Cluster => posterior.clone(),
                Slot::Discrete(d) => match observation.discrete[d] {
                    Some(s) => indicator(variable.states.len(), s),
                    None => (0..variable.states.len())
                        .map(|s| {
                            posterior
                                .iter()
                                .enumerate()
                                .map(|(k, r)| r * self.cpts[d][k][s])
                                .sum()
                        })
                        .collect(),
                },
                Slot::ClusterOf(c) => self.component_posterior(c, observation, &posterior),
                Slot::Continuous(c) => {
                    let (mean, variance) = match observation.continuous[c] {
                        Some(value) => (value, 0.0),
                        None => {
                            let weights = self.component_posterior(c, observation, &posterior);
                            mixture_moments(&self.mixtures[c], &weights)
                        }
                    };
                    result
                        .continuous
                        .push(ContinuousRow::new(variable.name.clone(), mean, variance));
                    continue;
                }
            };

            for (state, value) in variable.states.iter().zip(probabilities) {
                result
                    .discrete
                    .push(DiscreteRow::new(variable.name.clone(), state.clone(), value));
            }
        }

        Ok(result)
    }
}

impl Model for NaiveLatentModel {
    fn structure(&self) -> &StructureSpec {
        &self.structure
    }

    fn open_session(&self) -> Box<dyn InferenceSession + '_> {
        Box::new(NaiveSession {
            model: self,
            observation: self.empty_observation(),
        })
    }
}

struct NaiveSession<'m> {
    model: &'m NaiveLatentModel,
    observation: Observation,
}

impl InferenceSession for NaiveSession<'_> {
    fn apply_evidence(&mut self, evidence: &EvidenceSet) -> Result<()> {
        // all-or-nothing: a bad item leaves the session untouched
        let mut staged = self.observation.clone();
        for item in evidence {
            self.model.observe(&mut staged, item)?;
        }
        self.observation = staged;
        Ok(())
    }

    fn clear_evidence(&mut self) {
        self.observation = self.model.empty_observation();
    }

    fn execute(&mut self, variables: &QueryVariables) -> Result<QueryResult> {
        self.model.query(&self.observation, variables)
    }
}

/// Expectation-maximisation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmOptions {
    pub max_iterations: usize,
    /// Relative log-likelihood change that counts as converged
    pub tolerance: f64,
    /// Laplace pseudo-count added to every probability table cell
    pub smoothing: f64,
    pub min_variance: f64,
    /// Base seed; `None` draws from entropy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for EmOptions {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-6,
            smoothing: 0.01,
            min_variance: 1e-6,
            seed: None,
        }
    }
}

/// Trains [`NaiveLatentModel`]s from a shared dataset
pub struct EmTrainer {
    data: Arc<Dataset>,
    options: EmOptions,
    calls: AtomicU64,
}

impl EmTrainer {
    pub fn new(data: Arc<Dataset>, options: EmOptions) -> Self {
        Self {
            data,
            options,
            calls: AtomicU64::new(0),
        }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.data
    }

    pub fn options(&self) -> &EmOptions {
        &self.options
    }

    /// Fresh generator per training call; seeded runs stay reproducible
    fn next_rng(&self) -> StdRng {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.options.seed {
            Some(seed) => {
                StdRng::seed_from_u64(seed.wrapping_add(call.wrapping_mul(0x9e37_79b9_7f4a_7c15)))
            }
            None => StdRng::from_entropy(),
        }
    }

    fn encode_rows(&self, model: &NaiveLatentModel, rows: &[usize]) -> Result<Vec<Observation>> {
        let column = |name: &str| {
            self.data
                .column_index(name)
                .ok_or_else(|| Error::Training(format!("column '{}' not in dataset", name)))
        };
        let discrete_columns: Vec<usize> = model
            .discrete_names
            .iter()
            .map(|n| column(n))
            .collect::<Result<_>>()?;
        let continuous_columns: Vec<usize> = model
            .continuous_names
            .iter()
            .map(|n| column(n))
            .collect::<Result<_>>()?;

        let mut observations = Vec::with_capacity(rows.len());
        for &row in rows {
            if row >= self.data.len() {
                return Err(Error::Training(format!("training row {} out of range", row)));
            }
            let mut observation = model.empty_observation();

            for (d, &col) in discrete_columns.iter().enumerate() {
                if let Some(value) = self.data.cell(row, col) {
                    let name = &model.discrete_names[d];
                    let state = model.structure.state_index(name, value).ok_or_else(|| {
                        Error::Training(format!("value '{}' is not a state of '{}'", value, name))
                    })?;
                    observation.discrete[d] = Some(state);
                }
            }
            for (c, &col) in continuous_columns.iter().enumerate() {
                observation.continuous[c] = self
                    .data
                    .numeric(row, col)
                    .map_err(|e| Error::Training(e.to_string()))?;
            }

            observations.push(observation);
        }
        Ok(observations)
    }

    fn initialise(&self, model: &mut NaiveLatentModel, observations: &[Observation], rng: &mut StdRng) {
        let k = model.structure.latent_states();

        model.prior = random_distribution(rng, k);
        for cpt in model.cpts.iter_mut() {
            let states = cpt[0].len();
            for row in cpt.iter_mut() {
                *row = random_distribution(rng, states);
            }
        }

        for (c, mixture) in model.mixtures.iter_mut().enumerate() {
            let components = mixture.means.len();
            for row in mixture.mixing.iter_mut() {
                *row = random_distribution(rng, components);
            }

            let values: Vec<f64> = observations.iter().filter_map(|o| o.continuous[c]).collect();
            if values.is_empty() {
                continue;
            }
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let spread = variance.sqrt();
            let variance = if variance > self.options.min_variance {
                variance
            } else {
                1.0
            };

            for j in 0..components {
                let pick = values[rng.gen_range(0..values.len())];
                mixture.means[j] = pick + rng.gen_range(-0.1..0.1) * spread;
                mixture.variances[j] = variance;
            }
        }
    }

    fn expectation(
        &self,
        model: &NaiveLatentModel,
        observations: &[Observation],
    ) -> Result<(Statistics, f64)> {
        let mut stats = Statistics::zeroed(model);
        let mut log_likelihood = 0.0;

        for observation in observations {
            let (posterior, evidence) = model
                .posterior(observation)
                .map_err(|e| Error::Training(e.to_string()))?;
            log_likelihood += evidence;

            for (k, r) in posterior.iter().enumerate() {
                stats.prior[k] += r;
            }

            for (d, state) in observation.discrete.iter().enumerate() {
                for (k, r) in posterior.iter().enumerate() {
                    match state {
                        Some(s) => stats.cpts[d][k][*s] += r,
                        None => {
                            for (s, p) in model.cpts[d][k].iter().enumerate() {
                                stats.cpts[d][k][s] += r * p;
                            }
                        }
                    }
                }
            }

            for (c, mixture) in model.mixtures.iter().enumerate() {
                let value = observation.continuous[c];
                for (k, r) in posterior.iter().enumerate() {
                    if *r == 0.0 {
                        continue;
                    }
                    let weights = component_log_weights(mixture, k, None, value);
                    let total = log_sum_exp(&weights);
                    if !total.is_finite() {
                        continue;
                    }
                    for (j, w) in weights.iter().enumerate() {
                        let responsibility = r * (w - total).exp();
                        stats.mixing[c][k][j] += responsibility;
                        if let Some(x) = value {
                            stats.weight[c][j] += responsibility;
                            stats.sum[c][j] += responsibility * x;
                            stats.sum_sq[c][j] += responsibility * x * x;
                        }
                    }
                }
            }
        }

        Ok((stats, log_likelihood))
    }

    fn maximise(&self, model: &mut NaiveLatentModel, stats: &Statistics) {
        let alpha = self.options.smoothing;
        model.prior = smooth(&stats.prior, alpha);

        for (d, cpt) in model.cpts.iter_mut().enumerate() {
            for (k, row) in cpt.iter_mut().enumerate() {
                *row = smooth(&stats.cpts[d][k], alpha);
            }
        }

        for (c, mixture) in model.mixtures.iter_mut().enumerate() {
            for (k, row) in mixture.mixing.iter_mut().enumerate() {
                *row = smooth(&stats.mixing[c][k], alpha);
            }
            for j in 0..mixture.means.len() {
                let weight = stats.weight[c][j];
                if weight < 1e-9 {
                    continue;
                }
                let mean = stats.sum[c][j] / weight;
                mixture.means[j] = mean;
                mixture.variances[j] =
                    (stats.sum_sq[c][j] / weight - mean * mean).max(self.options.min_variance);
            }
        }
    }
}

impl ModelTrainer for EmTrainer {
    type Model = NaiveLatentModel;

    fn train(&self, structure: &StructureSpec, rows: &[usize]) -> Result<NaiveLatentModel> {
        if rows.is_empty() {
            return Err(Error::Training("no training rows".to_string()));
        }

        let mut model = NaiveLatentModel::uniform(structure.clone());
        let observations = self.encode_rows(&model, rows)?;
        let mut rng = self.next_rng();
        self.initialise(&mut model, &observations, &mut rng);

        let mut previous = f64::NEG_INFINITY;
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.options.max_iterations {
            let (stats, log_likelihood) = self.expectation(&model, &observations)?;
            self.maximise(&mut model, &stats);
            iterations += 1;

            if (log_likelihood - previous).abs()
                <= self.options.tolerance * (1.0 + log_likelihood.abs())
            {
                converged = true;
                previous = log_likelihood;
                break;
            }
            previous = log_likelihood;
        }

        debug!(
            rows = rows.len(),
            iterations,
            converged,
            log_likelihood = previous,
            "Trained naive latent model"
        );
        Ok(model)
    }
}

/// EM sufficient statistics
struct Statistics {
    prior: Vec<f64>,
    cpts: Vec<Vec<Vec<f64>>>,
    mixing: Vec<Vec<Vec<f64>>>,
    weight: Vec<Vec<f64>>,
    sum: Vec<Vec<f64>>,
    sum_sq: Vec<Vec<f64>>,
}

impl Statistics {
    fn zeroed(model: &NaiveLatentModel) -> Self {
        let k = model.prior.len();
        let components: Vec<usize> = model.mixtures.iter().map(|m| m.means.len()).collect();
        Self {
            prior: vec![0.0; k],
            cpts: model
                .cpts
                .iter()
                .map(|cpt| vec![vec![0.0; cpt[0].len()]; k])
                .collect(),
            mixing: components.iter().map(|&j| vec![vec![0.0; j]; k]).collect(),
            weight: components.iter().map(|&j| vec![0.0; j]).collect(),
            sum: components.iter().map(|&j| vec![0.0; j]).collect(),
            sum_sq: components.iter().map(|&j| vec![0.0; j]).collect(),
        }
    }
}

/// ln P(Cluster_c = j | Cluster = k) + ln N(value; j), restricted to an observed component
fn component_log_weights(
    mixture: &GaussianMixture,
    k: usize,
    component: Option<usize>,
    value: Option<f64>,
) -> Vec<f64> {
    (0..mixture.means.len())
        .map(|j| {
            if component.is_some_and(|observed| observed != j) {
                return f64::NEG_INFINITY;
            }
            let mut weight = mixture.mixing[k][j].ln();
            if let Some(x) = value {
                weight += log_normal(x, mixture.means[j], mixture.variances[j]);
            }
            weight
        })
        .collect()
}

fn mixture_moments(mixture: &GaussianMixture, weights: &[f64]) -> (f64, f64) {
    let mean: f64 = weights
        .iter()
        .zip(&mixture.means)
        .map(|(w, m)| w * m)
        .sum();
    let second: f64 = weights
        .iter()
        .zip(mixture.means.iter().zip(&mixture.variances))
        .map(|(w, (m, v))| w * (v + m * m))
        .sum();
    (mean, (second - mean * mean).max(0.0))
}

fn log_normal(x: f64, mean: f64, variance: f64) -> f64 {
    -0.5 * (LN_2PI + variance.ln() + (x - mean).powi(2) / variance)
}

fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

fn indicator(len: usize, hot: usize) -> Vec<f64> {
    (0..len).map(|i| if i == hot { 1.0 } else { 0.0 }).collect()
}

fn uniform_distribution(len: usize) -> Vec<f64> {
    vec![1.0 / len as f64; len]
}

fn random_distribution(rng: &mut StdRng, len: usize) -> Vec<f64> {
    let raw: Vec<f64> = (0..len).map(|_| rng.gen_range(0.5..1.5)).collect();
    let total: f64 = raw.iter().sum();
    raw.into_iter().map(|v| v / total).collect()
}

fn smooth(counts: &[f64], alpha: f64) -> Vec<f64> {
    let total: f64 = counts.iter().sum::<f64>() + alpha * counts.len() as f64;
    if total <= 0.0 {
        return uniform_distribution(counts.len());
    }
    counts.iter().map(|c| (c + alpha) / total).collect()
}

fn normalise(row: &[f64], name: &str) -> Result<Vec<f64>> {
    if row.iter().any(|p| !p.is_finite() || *p < 0.0) {
        return Err(Error::InvalidData(format!(
            "probabilities for '{}' must be finite and non-negative",
            name
        )));
    }
    let total: f64 = row.iter().sum();
    if total <= 0.0 {
        return Err(Error::InvalidData(format!(
            "probabilities for '{}' sum to zero",
            name
        )));
    }
    Ok(row.iter().map(|p| p / total).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::DiscreteAssignment;
    use crate::test_utils::{income_model, tx_model};

    fn probability(result: &QueryResult, variable: &str, state: &str) -> f64 {
        result
            .discrete
            .iter()
            .find(|r| r.variable == variable && r.state == state)
            .map(|r| r.value)
            .unwrap()
    }

    fn query(model: &NaiveLatentModel, tokens: &[&str]) -> QueryResult {
        let mut session = model.open_session();
        session
            .apply_evidence(&EvidenceSet::from_tokens(tokens).unwrap())
            .unwrap();
        session.execute(&QueryVariables::All).unwrap()
    }

    #[test]
    fn test_unconditioned_marginals() {
        let model = tx_model(0.9);
        let result = query(&model, &[]);
        assert!((probability(&result, "T", "yes") - 0.5).abs() < 1e-12);
        assert!((probability(&result, "X", "a") - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_conditional_probability() {
        let model = tx_model(0.9);
        let result = query(&model, &["X$$a"]);
        assert!((probability(&result, "T", "yes") - 0.9).abs() < 1e-12);
        assert_eq!(probability(&result, "X", "a"), 1.0);
        assert_eq!(probability(&result, "X", "b"), 0.0);
    }

    #[test]
    fn test_discrete_marginals_sum_to_one() {
        let model = income_model();
        let result = query(&model, &["X$$b", "Cluster_income$$Cluster1"]);
        let mut totals: HashMap<String, f64> = HashMap::new();
        for row in result.discrete.iter() {
            *totals.entry(row.variable.clone()).or_default() += row.value;
        }
        for (variable, total) in totals {
            assert!((total - 1.0).abs() < 1e-9, "{} sums to {}", variable, total);
        }
    }

    #[test]
    fn test_last_evidence_wins() {
        let model = tx_model(0.9);
        let result = query(&model, &["X$$a", "X$$b"]);
        assert_eq!(probability(&result, "X", "b"), 1.0);
        assert!((probability(&result, "T", "yes") - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_cluster_state_evidence_fixes_continuous_mean() {
        let model = income_model();
        let result = query(&model, &["Cluster_income$$Cluster2"]);
        let income = result
            .continuous
            .iter()
            .find(|r| r.variable == "income")
            .unwrap();
        assert!((income.mean - 100.0).abs() < 1e-9);
        assert!((income.variance - 16.0).abs() < 1e-9);
    }

    #[test]
    fn test_continuous_evidence() {
        let model = income_model();
        let mut session = model.open_session();
        let mut evidence = EvidenceSet::new();
        evidence.push_continuous("income", 100.0);
        session.apply_evidence(&evidence).unwrap();
        let result = session.execute(&QueryVariables::All).unwrap();

        let income = result.continuous.iter().next().unwrap();
        assert_eq!((income.mean, income.variance), (100.0, 0.0));
        // high income points at the component with mean 100, which k1 prefers
        assert!(probability(&result, "Cluster_income", "Cluster2") > 0.99);
        assert!(probability(&result, "Cluster", "Cluster1") > 0.5);
    }

    #[test]
    fn test_invalid_state_is_rejected_and_session_untouched() {
        let model = tx_model(0.9);
        let mut session = model.open_session();
        let err = session
            .apply_evidence(&EvidenceSet::from_tokens(["X$$a", "T$$maybe"]).unwrap())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidEvidence { .. }));

        let result = session.execute(&QueryVariables::All).unwrap();
        assert!((probability(&result, "X", "a") - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_type_mismatch() {
        let model = income_model();
        let mut session = model.open_session();

        let err = session
            .apply_evidence(&EvidenceSet::from_tokens(["income$$high"]).unwrap())
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch(_)));

        let mut continuous_on_discrete = EvidenceSet::new();
        continuous_on_discrete.push_continuous("X", 1.0);
        let err = session.apply_evidence(&continuous_on_discrete).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch(_)));
    }

    #[test]
    fn test_zero_probability_evidence() {
        let model = tx_model(0.9);
        let mut session = model.open_session();
        session
            .apply_evidence(&EvidenceSet::from_tokens(["T$$yes", "Cluster$$Cluster1"]).unwrap())
            .unwrap();
        assert!(matches!(
            session.execute(&QueryVariables::All),
            Err(Error::Inference(_))
        ));
    }

    #[test]
    fn test_clear_evidence() {
        let model = tx_model(0.9);
        let mut session = model.open_session();
        session
            .apply_evidence(&EvidenceSet::from_assignments([&DiscreteAssignment::new(
                "X", "a",
            )]))
            .unwrap();
        session.clear_evidence();
        let result = session.execute(&QueryVariables::All).unwrap();
        assert!((probability(&result, "T", "yes") - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_query_subset() {
        let model = income_model();
        let mut session = model.open_session();
        let result = session
            .execute(&QueryVariables::Only(vec!["income".to_string()]))
            .unwrap();
        assert!(result.discrete.is_empty());
        assert_eq!(result.continuous.len(), 1);

        assert!(matches!(
            session.execute(&QueryVariables::Only(vec!["nope".to_string()])),
            Err(Error::UnknownVariable(_))
        ));
    }

    #[test]
    fn test_from_parameters_validates_shape() {
        let model = tx_model(0.9);
        let mut parameters = model.parameters();
        parameters.cluster_prior = vec![1.0];
        assert!(matches!(
            NaiveLatentModel::from_parameters(model.structure().clone(), parameters),
            Err(Error::InvalidData(_))
        ));
    }

    #[test]
    fn test_em_training_is_seeded_and_normalised() {
        let data = Arc::new(crate::test_utils::sample_dataset());
        let structure = data
            .structure(
                &["T".to_string(), "X".to_string()],
                &["income".to_string()],
                2,
                3,
            )
            .unwrap();
        let rows = data.row_indexes();
        let options = EmOptions {
            seed: Some(7),
            ..Default::default()
        };

        let first = EmTrainer::new(data.clone(), options.clone())
            .train(&structure, &rows)
            .unwrap();
        let again = EmTrainer::new(data.clone(), options)
            .train(&structure, &rows)
            .unwrap();
        assert_eq!(first.parameters(), again.parameters());

        let parameters = first.parameters();
        assert!((parameters.cluster_prior.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        for table in parameters.discrete.values() {
            for row in table {
                assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_em_training_errors() {
        let data = Arc::new(crate::test_utils::sample_dataset());
        let structure = data
            .structure(&["T".to_string()], &[], 2, 3)
            .unwrap();
        let trainer = EmTrainer::new(data, EmOptions::default());

        assert!(matches!(
            trainer.train(&structure, &[]),
            Err(Error::Training(_))
        ));
        assert!(matches!(
            trainer.train(&structure, &[10_000]),
            Err(Error::Training(_))
        ));
    }
}
