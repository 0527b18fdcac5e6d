//! Greedy evidence searches
//!
//! Both searches grow one evidence sequence per model, always committing to
//! the best-ranked next state and never backtracking. The top-k search stops
//! at a fixed depth; the convergent search stops once the target probability
//! settles.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cursor::Cursor;
use crate::error::Result;
use crate::evidence::{cluster_child, DiscreteAssignment, EvidenceSet, LATENT_CLUSTER};
use crate::model::{Model, ModelTrainer};

use super::diff::{conditional_moments, query_model_with_evidence, target_probability};
use super::engine::{AutoInsight, IterationPlan, TargetQuery};
use super::types::{CombinationResult, CombinationRow, ContinuousSummary, RunTrace};

/// Next evidence item chosen by a greedy step
struct Candidate {
    assignment: DiscreteAssignment,
    difference: f64,
}

/// Best-ranked state to add to `evidence`, if any row qualifies
fn greedy_step<M: Model + ?Sized>(
    model: &M,
    query: &TargetQuery,
    evidence: &EvidenceSet,
) -> Result<Option<Candidate>> {
    let base = evidence.chain(&query.alternates);
    let new = evidence.chain(&query.evidence);
    let mut diff = query_model_with_evidence(model, Some(&base), Some(&new))?;
    diff.discrete
        .sort_by(|a, b| b.difference.total_cmp(&a.difference));

    let mut cursor = Cursor::new(&diff.discrete);
    while cursor.read() {
        let variable = cursor.text("variable");
        if variable == query.target.variable || variable == LATENT_CLUSTER {
            continue;
        }
        return Ok(Some(Candidate {
            assignment: DiscreteAssignment::new(variable, cursor.text("state")),
            difference: cursor.number("difference"),
        }));
    }
    Ok(None)
}

/// Probabilities compare equal once rounded to `dp` decimal places
pub fn is_converged(previous: Option<f64>, current: Option<f64>, dp: u32) -> bool {
    match (previous, current) {
        (Some(p), Some(c)) => round_to(p, dp) == round_to(c, dp),
        _ => false,
    }
}

/// Finest rounding `is_converged` applies; f64 carries no more digits than this
pub const MAX_CONVERGENCE_DP: u32 = 15;

fn round_to(value: f64, dp: u32) -> f64 {
    let scale = 10f64.powi(dp.min(MAX_CONVERGENCE_DP) as i32);
    (value * scale).round() / scale
}

/// Flatten a combination into one row per evidence item
pub fn combination_rows(combination: &CombinationResult) -> Result<Vec<CombinationRow>> {
    combination
        .evidence
        .iter()
        .enumerate()
        .map(|(i, token)| {
            let assignment = DiscreteAssignment::from_token(token)?;
            let moments = cluster_child(&assignment.variable).and_then(|child| {
                combination
                    .continuous_variables
                    .iter()
                    .find(|c| c.variable == child)
            });

            Ok(CombinationRow {
                variable: assignment.variable,
                state: assignment.state,
                difference: combination.difference.get(i).copied().unwrap_or(0.0),
                probability: combination.probability.get(i).copied().unwrap_or(0.0),
                max_probability: combination.max_probability,
                mean: moments.map(|m| m.mean),
                variance: moments.map(|m| m.variance),
            })
        })
        .collect()
}

impl<T: ModelTrainer> AutoInsight<T> {
    /// Greedy top-k combinations, one per model, best `max_probability` first
    ///
    /// Returns the combinations and the models that produced them, aligned.
    pub fn query_top_variable_combinations(
        &self,
        target: &DiscreteAssignment,
        models: Option<&[Arc<T::Model>]>,
        times: usize,
        top: usize,
    ) -> Result<(Vec<CombinationResult>, Vec<Arc<T::Model>>)> {
        let query = self.target_query(target)?;
        let plan = IterationPlan::resolve(times, top, models.map(<[_]>::len), true);

        let mut runs = Vec::with_capacity(plan.times);
        for iteration in 0..plan.times {
            let model = self.model_for(models, iteration)?;
            let combination = greedy_combination(model.as_ref(), &query, plan.top)?;
            debug!(
                iteration,
                evidence = ?combination.evidence,
                max_probability = combination.max_probability,
                "Greedy combination"
            );
            runs.push((combination, model));
        }

        runs.sort_by(|a, b| b.0.max_probability.total_cmp(&a.0.max_probability));
        Ok(runs.into_iter().unzip())
    }

    /// Grow evidence per freshly trained model until the target probability settles
    ///
    /// Runs continue until `conditioned` runs end over the limit or
    /// `total_iterations_limit` runs have executed. Every run is returned.
    pub fn query_variable_combinations(
        &self,
        target: &DiscreteAssignment,
        conditioned: usize,
        total_iterations_limit: usize,
        diff_convergence_dp: u32,
    ) -> Result<Vec<RunTrace>> {
        let query = self.target_query(target)?;
        // every variable is in the evidence by then, so the probability cannot move
        let max_depth = self.structure().variables().len();
        let threshold = self.options().over_limit_threshold;

        let mut runs = Vec::new();
        let mut over_limit = 0;
        while over_limit < conditioned && runs.len() < total_iterations_limit {
            let model = self.train_model()?;
            let run = converge(
                model.as_ref(),
                &query,
                diff_convergence_dp,
                max_depth,
                threshold,
            )?;
            if run.over_limit {
                over_limit += 1;
            }
            debug!(
                iteration = runs.len() + 1,
                probability = run.probability,
                over_limit = run.over_limit,
                "Convergent run finished"
            );
            runs.push(run);
        }

        info!(runs = runs.len(), over_limit, "Convergent search finished");
        Ok(runs)
    }
}

fn greedy_combination<M: Model + ?Sized>(
    model: &M,
    query: &TargetQuery,
    depth: usize,
) -> Result<CombinationResult> {
    let mut evidence = EvidenceSet::new();
    let mut tokens = Vec::with_capacity(depth);
    let mut difference = Vec::with_capacity(depth);
    let mut probability = Vec::with_capacity(depth);
    let mut continuous_variables = Vec::new();

    for step in 0..depth {
        let p = target_probability(model, &evidence, &query.target)?;
        let Some(candidate) = greedy_step(model, query, &evidence)? else {
            warn!(step, "No candidate state left, stopping combination early");
            break;
        };

        let token = candidate.assignment.to_token();
        evidence.push(candidate.assignment.clone());

        if let Some(child) = cluster_child(&candidate.assignment.variable) {
            let (mean, variance) = conditional_moments(model, &evidence, child)?;
            continuous_variables.push(ContinuousSummary {
                variable: child.to_string(),
                mean,
                variance,
            });
        }

        probability.push(p);
        difference.push(candidate.difference);
        tokens.push(token);
    }

    let max_probability = probability
        .iter()
        .copied()
        .fold(None, |max: Option<f64>, p| Some(max.map_or(p, |m| m.max(p))))
        .unwrap_or(0.0);

    Ok(CombinationResult {
        evidence: tokens,
        difference,
        probability,
        max_probability,
        continuous_variables,
    })
}

fn converge<M: Model + ?Sized>(
    model: &M,
    query: &TargetQuery,
    dp: u32,
    max_depth: usize,
    threshold: f64,
) -> Result<RunTrace> {
    let mut evidence = EvidenceSet::new();
    let mut tokens = Vec::new();
    let mut difference = Vec::new();
    let mut previous = None;
    let mut current = None;
    let mut converged = false;

    loop {
        if is_converged(previous, current, dp) {
            converged = true;
            break;
        }
        if tokens.len() >= max_depth {
            warn!(depth = tokens.len(), "Run reached the depth limit without settling");
            break;
        }

        previous = current;
        let p = target_probability(model, &evidence, &query.target)?;
        current = Some(p);
        debug!(evidence = ?tokens, probability = p, "Convergence step");

        let Some(candidate) = greedy_step(model, query, &evidence)? else {
            warn!(depth = tokens.len(), "No candidate state left, stopping run early");
            break;
        };
        tokens.push(candidate.assignment.to_token());
        difference.push(candidate.difference);
        evidence.push(candidate.assignment);
    }

    // an unsettled run reports the probability under all the evidence it gathered
    let probability = match previous {
        Some(p) if converged => p,
        _ => target_probability(model, &evidence, &query.target)?,
    };
    Ok(RunTrace {
        evidence: tokens,
        difference,
        probability,
        over_limit: probability > threshold,
        converged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insight::engine::InsightOptions;
    use crate::model::NaiveLatentModel;
    use crate::test_utils::{income_model, tx_model, FixedTrainer};

    fn engine(models: Vec<NaiveLatentModel>) -> AutoInsight<FixedTrainer> {
        let structure = models[0].structure().clone();
        AutoInsight::new(FixedTrainer::new(models), structure, vec![0])
    }

    fn target() -> DiscreteAssignment {
        DiscreteAssignment::new("T", "yes")
    }

    #[test]
    fn test_is_converged() {
        assert!(!is_converged(None, None, 4));
        assert!(!is_converged(None, Some(0.5), 4));
        assert!(is_converged(Some(0.50001), Some(0.50004), 4));
        assert!(!is_converged(Some(0.5), Some(0.5002), 4));
    }

    #[test]
    fn test_is_converged_clamps_huge_dp() {
        assert!(is_converged(Some(0.5), Some(0.5), u32::MAX));
        assert!(is_converged(Some(0.25), Some(0.25), 400));
        assert!(!is_converged(Some(0.25), Some(0.2500001), 400));
    }

    #[test]
    fn test_run_stopped_by_depth_reports_probability_under_full_evidence() {
        let insight = engine(vec![tx_model(0.9)]);
        let query = insight.target_query(&target()).unwrap();
        let model = tx_model(0.9);

        // one step moves T from 0.5 to 0.9, so the run cannot settle within depth 1
        let run = converge(&model, &query, 4, 1, 0.85).unwrap();
        assert_eq!(run.evidence, vec!["X$$a"]);
        assert!(!run.converged);
        assert!((run.probability - 0.9).abs() < 1e-12);
        assert!(run.over_limit);

        let strict = converge(&model, &query, 4, 1, 0.95).unwrap();
        assert!(!strict.converged);
        assert!(!strict.over_limit);
    }

    #[test]
    fn test_greedy_first_pick_and_probabilities() {
        let insight = engine(vec![income_model()]);
        let (combinations, models) = insight
            .query_top_variable_combinations(&target(), None, 1, 3)
            .unwrap();

        assert_eq!(models.len(), 1);
        let combination = &combinations[0];
        assert_eq!(combination.evidence.len(), 3);
        assert_eq!(combination.evidence[0], "X$$a");
        assert!((combination.difference[0] - 0.42).abs() < 1e-9);
        assert!((combination.probability[0] - 0.5).abs() < 1e-12);
        assert!(combination.probability[1] > combination.probability[0]);

        let max = combination
            .probability
            .iter()
            .copied()
            .fold(f64::MIN, f64::max);
        assert_eq!(combination.max_probability, max);
        assert!(!combination.evidence.iter().any(|t| t.starts_with("T$$")));
        assert!(!combination.evidence.iter().any(|t| t.starts_with("Cluster$$")));
    }

    #[test]
    fn test_greedy_is_deterministic_for_a_fixed_model() {
        let insight = engine(vec![income_model()]);
        let cache = vec![Arc::new(income_model())];
        let (first, _) = insight
            .query_top_variable_combinations(&target(), Some(&cache), 1, 3)
            .unwrap();
        let (second, _) = insight
            .query_top_variable_combinations(&target(), Some(&cache), 1, 3)
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_cached_models_clamp_top() {
        let insight = engine(vec![income_model()]);
        let cache = vec![Arc::new(income_model()), Arc::new(income_model())];
        let (combinations, models) = insight
            .query_top_variable_combinations(&target(), Some(&cache), 5, 3)
            .unwrap();
        assert_eq!(combinations.len(), 2);
        assert_eq!(models.len(), 2);
        assert!(combinations.iter().all(|c| c.evidence.len() == 2));
        assert_eq!(insight.trainer().calls(), 0);
    }

    #[test]
    fn test_combinations_sorted_by_max_probability() {
        let insight = engine(vec![tx_model(0.6), tx_model(0.9), tx_model(0.7)]);
        let (combinations, models) = insight
            .query_top_variable_combinations(&target(), None, 3, 2)
            .unwrap();

        let maxima: Vec<f64> = combinations.iter().map(|c| c.max_probability).collect();
        assert!((maxima[0] - 0.9).abs() < 1e-12);
        assert!((maxima[1] - 0.7).abs() < 1e-12);
        assert!((maxima[2] - 0.6).abs() < 1e-12);

        // models travel with their combinations
        let p = target_probability(
            models[0].as_ref(),
            &EvidenceSet::from_tokens(["X$$a"]).unwrap(),
            &target(),
        )
        .unwrap();
        assert!((p - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_cluster_picks_record_child_moments() {
        let insight = engine(vec![income_model()]);
        let (combinations, _) = insight
            .query_top_variable_combinations(&target(), None, 1, 3)
            .unwrap();
        let combination = &combinations[0];

        let cluster_picks = combination
            .evidence
            .iter()
            .filter(|t| t.starts_with("Cluster_income$$"))
            .count();
        assert_eq!(combination.continuous_variables.len(), cluster_picks);

        for row in combination_rows(combination).unwrap() {
            if row.variable == "Cluster_income" {
                assert!(row.mean.is_some() && row.variance.is_some());
            } else {
                assert_eq!(row.mean, None);
            }
            assert_eq!(row.max_probability, combination.max_probability);
        }
    }

    #[test]
    fn test_combination_rows() {
        let combination = CombinationResult {
            evidence: vec!["X$$a".to_string(), "Cluster_income$$Cluster2".to_string()],
            difference: vec![0.4, 0.2],
            probability: vec![0.5, 0.7],
            max_probability: 0.7,
            continuous_variables: vec![ContinuousSummary {
                variable: "income".to_string(),
                mean: 100.0,
                variance: 16.0,
            }],
        };
        let rows = combination_rows(&combination).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].variable.as_str(), rows[0].state.as_str()), ("X", "a"));
        assert_eq!(rows[0].mean, None);
        assert_eq!(rows[1].mean, Some(100.0));
        assert_eq!(rows[1].variance, Some(16.0));
        assert_eq!(rows[1].probability, 0.7);
    }

    #[test]
    fn test_convergent_run_trace() {
        let insight = engine(vec![tx_model(0.95)]);
        let runs = insight
            .query_variable_combinations(&target(), 1, 10, 4)
            .unwrap();

        assert_eq!(runs.len(), 1);
        let run = &runs[0];
        // 0.5 unconditioned, 0.95 given X=a, then X=a again changes nothing
        assert_eq!(run.evidence, vec!["X$$a", "X$$a", "X$$a"]);
        assert!((run.difference[0] - 0.9).abs() < 1e-9);
        assert!((run.probability - 0.95).abs() < 1e-12);
        assert!(run.over_limit);
        assert!(run.converged);
    }

    #[test]
    fn test_convergence_stops_after_conditioned_over_limit_runs() {
        let insight = engine(vec![tx_model(0.95)]);
        let runs = insight
            .query_variable_combinations(&target(), 3, 10, 4)
            .unwrap();
        assert_eq!(runs.len(), 3);
        assert_eq!(insight.trainer().calls(), 3);
    }

    #[test]
    fn test_convergence_terminates_at_iteration_limit() {
        // never reaches the limit, so only total_iterations_limit stops it
        let insight = engine(vec![income_model()]);
        let runs = insight
            .query_variable_combinations(&target(), 3, 4, 4)
            .unwrap();
        assert_eq!(runs.len(), 4);
        assert!(runs.iter().all(|r| !r.over_limit));
        assert!(runs.iter().all(|r| r.probability < 0.9));
    }

    #[test]
    fn test_over_limit_threshold_is_a_probability() {
        // converges at 0.88: under the default 0.9, over a lowered 0.85
        let insight = engine(vec![tx_model(0.88)]);
        let runs = insight
            .query_variable_combinations(&target(), 1, 3, 4)
            .unwrap();
        assert_eq!(runs.len(), 3);
        assert!(runs.iter().all(|r| !r.over_limit));

        let lowered = engine(vec![tx_model(0.88)]).with_options(InsightOptions {
            over_limit_threshold: 0.85,
            ..Default::default()
        });
        let runs = lowered
            .query_variable_combinations(&target(), 1, 3, 4)
            .unwrap();
        assert_eq!(runs.len(), 1);
        assert!(runs[0].over_limit);
    }
}
