//! AutoInsight - orchestrates training, diff queries and aggregation

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::evidence::{
    cluster_child, encode, is_latent_cluster, DiscreteAssignment, EvidenceSet, LATENT_CLUSTER,
};
use crate::model::{Model, ModelTrainer, StructureSpec, VariableKind};

use super::cluster::{resolve_from_index, resolve_index};
use super::counter::FrequencyCounter;
use super::diff::{conditional_moments, query_model_with_evidence};
use super::types::{DiffResult, DiffRow, DiffTable, InsightStats, RankedInsight};

/// Filter for exclusive-state discovery
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExclusiveThresholds {
    /// Rows must have `base_probability` strictly below this
    pub max_base_probability: f64,
    /// Exclusive lower bound on `difference`
    pub min_difference: f64,
    /// Exclusive upper bound on `difference`
    pub max_difference: f64,
}

impl Default for ExclusiveThresholds {
    fn default() -> Self {
        Self {
            max_base_probability: 0.008,
            min_difference: 0.005,
            max_difference: 1.0,
        }
    }
}

impl ExclusiveThresholds {
    pub fn admits(&self, row: &DiffRow) -> bool {
        row.base_probability < self.max_base_probability
            && row.difference > self.min_difference
            && row.difference < self.max_difference
    }
}

/// Engine tuning
#[derive(Debug, Clone, PartialEq)]
pub struct InsightOptions {
    pub exclusive: ExclusiveThresholds,
    /// A convergent run whose probability exceeds this counts as over limit.
    /// Probabilities are on the 0-1 scale.
    pub over_limit_threshold: f64,
}

impl Default for InsightOptions {
    fn default() -> Self {
        Self {
            exclusive: ExclusiveThresholds::default(),
            over_limit_threshold: 0.9,
        }
    }
}

/// Resolved iteration counts for one call
///
/// Cached models win: the number of iterations becomes the cache length, and
/// callers that ask for it have `top` clamped to the cache length as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationPlan {
    pub times: usize,
    pub top: usize,
}

impl IterationPlan {
    pub fn resolve(times: usize, top: usize, cached: Option<usize>, clamp_top: bool) -> Self {
        match cached {
            None => Self { times, top },
            Some(count) => {
                info!(
                    requested = times,
                    cached = count,
                    "The number of cached models sets the number of iterations"
                );
                let top = if clamp_top { top.min(count) } else { top };
                Self { times: count, top }
            }
        }
    }
}

/// Validated target with its evidence sets
pub(crate) struct TargetQuery {
    pub(crate) target: DiscreteAssignment,
    /// Every other state of the target variable
    pub(crate) alternates: EvidenceSet,
    /// Just the target state
    pub(crate) evidence: EvidenceSet,
}

/// Insight search over models produced by a [`ModelTrainer`]
pub struct AutoInsight<T: ModelTrainer> {
    trainer: T,
    structure: StructureSpec,
    training_rows: Vec<usize>,
    options: InsightOptions,
}

impl<T: ModelTrainer> AutoInsight<T> {
    pub fn new(trainer: T, structure: StructureSpec, training_rows: Vec<usize>) -> Self {
        Self {
            trainer,
            structure,
            training_rows,
            options: InsightOptions::default(),
        }
    }

    pub fn with_options(mut self, options: InsightOptions) -> Self {
        self.options = options;
        self
    }

    pub fn structure(&self) -> &StructureSpec {
        &self.structure
    }

    pub fn options(&self) -> &InsightOptions {
        &self.options
    }

    pub fn trainer(&self) -> &T {
        &self.trainer
    }

    /// Train one model over the configured rows
    pub fn train_model(&self) -> Result<Arc<T::Model>> {
        debug!(rows = self.training_rows.len(), "Training model");
        let model = self.trainer.train(&self.structure, &self.training_rows)?;
        Ok(Arc::new(model))
    }

    /// Check the target before any training happens
    pub(crate) fn target_query(&self, target: &DiscreteAssignment) -> Result<TargetQuery> {
        let variable = self.structure.variable(&target.variable).ok_or_else(|| {
            Error::InvalidTarget(format!("'{}' is not in the network", target.variable))
        })?;
        if variable.kind != VariableKind::Discrete {
            return Err(Error::InvalidTarget(format!(
                "Target variable '{}' is not discrete",
                target.variable
            )));
        }
        if !variable.states.contains(&target.state) {
            return Err(Error::InvalidTarget(format!(
                "'{}' is not a state of '{}'",
                target.state, target.variable
            )));
        }

        let alternates = self.structure.other_states_of(target)?;
        Ok(TargetQuery {
            target: target.clone(),
            alternates: EvidenceSet::from_assignments(&alternates),
            evidence: EvidenceSet::from_assignments([target]),
        })
    }

    pub(crate) fn model_for(
        &self,
        models: Option<&[Arc<T::Model>]>,
        iteration: usize,
    ) -> Result<Arc<T::Model>> {
        match models {
            Some(cache) => {
                debug!(iteration, "Pulled model from cache");
                cache.get(iteration).cloned().ok_or_else(|| {
                    Error::InvalidData(format!("no cached model for iteration {}", iteration))
                })
            }
            None => self.train_model(),
        }
    }

    /// Train (or reuse) models and diff the target against its alternates
    ///
    /// Each result's discrete rows are sorted by difference, descending, and
    /// `Cluster_*` rows carry the moments of their continuous child.
    pub fn train_and_diff(
        &self,
        target: &DiscreteAssignment,
        times: usize,
        models: Option<&[Arc<T::Model>]>,
    ) -> Result<Vec<(DiffResult, Arc<T::Model>)>> {
        let query = self.target_query(target)?;
        let plan = IterationPlan::resolve(times, 0, models.map(<[_]>::len), false);

        let mut features = Vec::with_capacity(plan.times);
        for iteration in 0..plan.times {
            let model = self.model_for(models, iteration)?;
            let diff = query_model_with_evidence(
                model.as_ref(),
                Some(&query.alternates),
                Some(&query.evidence),
            )?;
            let mut diff = backfill_cluster_moments(model.as_ref(), diff, &target.variable)?;
            diff.discrete
                .sort_by(|a, b| b.difference.total_cmp(&a.difference));

            debug!(iteration, rows = diff.discrete.len(), "Diffed target");
            features.push((diff, model));
        }
        Ok(features)
    }

    /// Models for later reuse through the `models` parameter of the queries
    pub fn create_model_cache(
        &self,
        target: &DiscreteAssignment,
        times: usize,
    ) -> Result<Vec<Arc<T::Model>>> {
        Ok(self
            .train_and_diff(target, times, None)?
            .into_iter()
            .map(|(_, model)| model)
            .collect())
    }

    /// States that are near-impossible without the target and gain materially with it
    pub fn query_exclusive_states(
        &self,
        target: &DiscreteAssignment,
        models: Option<&[Arc<T::Model>]>,
        times: usize,
        top: usize,
    ) -> Result<Vec<RankedInsight>> {
        let features = self.train_and_diff(target, times, models)?;
        let tables: Vec<&DiffTable> = features.iter().map(|(diff, _)| &diff.discrete).collect();

        let thresholds = self.options.exclusive;
        let counter = rank_states(tables.iter().copied(), &target.variable, |row| {
            thresholds.admits(row)
        })?;
        debug!(candidates = counter.len(), "Accumulated exclusive states");

        variable_frequency(&tables, &counter, top)
    }

    /// Every single state ranked by accumulated difference
    pub fn query_bivariate_combinations(
        &self,
        target: &DiscreteAssignment,
        models: Option<&[Arc<T::Model>]>,
        times: usize,
        top: usize,
    ) -> Result<Vec<RankedInsight>> {
        let features = self.train_and_diff(target, times, models)?;
        let tables: Vec<&DiffTable> = features.iter().map(|(diff, _)| &diff.discrete).collect();

        let counter = rank_states(tables.iter().copied(), &target.variable, |_| true)?;
        debug!(candidates = counter.len(), "Accumulated bivariate combinations");

        variable_frequency(&tables, &counter, top)
    }
}

/// Copy of `diff` with child moments filled in for `Cluster_*` rows
fn backfill_cluster_moments<M: Model + ?Sized>(
    model: &M,
    diff: DiffResult,
    target_variable: &str,
) -> Result<DiffResult> {
    let mut discrete = DiffTable::new();
    {
        let mut cursor = Cursor::new(&diff.discrete);
        while cursor.read() {
            let (Some(id), Some(row)) = (cursor.row_index(), cursor.row()) else {
                continue;
            };
            let mut row = row.clone();

            if row.variable != target_variable {
                if let Some(child) = cluster_child(&row.variable) {
                    let evidence = EvidenceSet::from_assignments([&DiscreteAssignment::new(
                        row.variable.clone(),
                        row.state.clone(),
                    )]);
                    let (mean, variance) = conditional_moments(model, &evidence, child)?;
                    row.mean = mean;
                    row.variance = variance;
                }
            }
            discrete.push_with_id(id, row);
        }
    }

    Ok(DiffResult {
        discrete,
        continuous: diff.continuous,
    })
}

/// Accumulate differences by token across tables
///
/// Rows of the target variable and of `Cluster` are skipped. `Cluster_*`
/// rows are keyed by their resolved index, which is computed over the full
/// table even when `keep` drops some of its rows.
pub(crate) fn rank_states<'a, I, F>(
    tables: I,
    target_variable: &str,
    keep: F,
) -> Result<FrequencyCounter>
where
    I: IntoIterator<Item = &'a DiffTable>,
    F: Fn(&DiffRow) -> bool,
{
    let mut counter = FrequencyCounter::new();
    for table in tables {
        let kept = table.filter(|row| keep(row));
        let mut cursor = Cursor::new(&kept);
        while cursor.read() {
            let variable = cursor.text("variable");
            if variable == target_variable || variable == LATENT_CLUSTER {
                continue;
            }

            if is_latent_cluster(variable) {
                let index = resolve_index(table, variable, cursor.text("state"))?;
                counter.add(encode(variable, &index.to_string()), cursor.number("difference"));
            } else {
                counter.add(cursor.text("variable_state"), cursor.number("difference"));
            }
        }
    }
    Ok(counter)
}

/// Re-express the top counter entries with statistics averaged over tables
pub(crate) fn variable_frequency(
    tables: &[&DiffTable],
    counter: &FrequencyCounter,
    top: usize,
) -> Result<Vec<RankedInsight>> {
    let mut ranked = Vec::new();

    for (token, sum_difference) in counter.most_common(top) {
        let assignment = DiscreteAssignment::from_token(&token)?;

        if is_latent_cluster(&assignment.variable) {
            let index: usize = assignment.state.parse().map_err(|_| {
                Error::ClusterResolution(format!("'{}' does not carry a cluster index", token))
            })?;

            let mut means = Vec::with_capacity(tables.len());
            let mut variances = Vec::with_capacity(tables.len());
            let mut state = assignment.state.clone();
            for table in tables {
                let row = resolve_from_index(*table, &assignment.variable, index)?;
                means.push(row.mean);
                variances.push(row.variance);
                state = row.state.clone();
            }

            ranked.push(RankedInsight {
                token: encode(&assignment.variable, &state),
                stats: InsightStats::Cluster {
                    mean: average(&means),
                    variance: average(&variances),
                    sum_difference,
                },
            });
        } else {
            let mut base = Vec::with_capacity(tables.len());
            let mut target = Vec::with_capacity(tables.len());
            for table in tables {
                let row = table
                    .iter()
                    .find(|r| r.variable == assignment.variable && r.state == assignment.state)
                    .ok_or_else(|| {
                        Error::SchemaMismatch(format!("'{}' missing from a diff table", token))
                    })?;
                base.push(row.base_probability);
                target.push(row.value);
            }

            ranked.push(RankedInsight {
                token,
                stats: InsightStats::Discrete {
                    base_probability: average(&base),
                    target_probability: average(&target),
                    sum_difference,
                },
            });
        }
    }

    Ok(ranked)
}

fn average(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}
