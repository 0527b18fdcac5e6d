//! Integration tests for lift-core
//!
//! These tests exercise the full load → train → search → rationalise workflow.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use lift_core::{
    insight::{combination_rows, query_model_with_evidence},
    model::{predict, NaiveParameters, PredictionOutcome},
    rationalise, AutoInsight, Dataset, DiscreteAssignment, EmOptions, EmTrainer, EvidenceSet,
    LiftConfig, Model, ModelTrainer, NaiveLatentModel, StructureSpec,
};

/// Customer segments: loyal low spenders and churning high spenders
fn churn_csv() -> &'static str {
    r#"churn,plan,support,spend
no,basic,none,12.0
no,basic,none,10.5
no,basic,low,11.0
no,basic,none,9.5
no,premium,none,13.0
no,basic,low,10.0
no,basic,none,12.5
no,basic,none,
yes,premium,high,88.0
yes,premium,high,92.5
yes,premium,low,90.0
yes,premium,high,95.0
yes,basic,high,87.5
yes,premium,high,91.0
yes,premium,,89.5
yes,premium,high,93.0"#
}

fn config() -> LiftConfig {
    let mut config = LiftConfig::from_toml(
        r#"
[data]
discrete = ["churn", "plan", "support"]
continuous = ["spend"]

[model]
latent_states = 2

[training]
seed = 11
max_iterations = 50
"#,
    )
    .expect("Failed to parse config");
    config.search.combination_times = 3;
    config
}

fn insight() -> (AutoInsight<EmTrainer>, Arc<Dataset>) {
    let data = Arc::new(Dataset::from_reader(churn_csv().as_bytes()).expect("Failed to load CSV"));
    let config = config();
    let structure = data
        .structure(
            &config.data.discrete,
            &config.data.continuous,
            config.model.latent_states,
            config.model.cluster_states,
        )
        .expect("Failed to build structure");

    let trainer = EmTrainer::new(data.clone(), config.training.clone());
    let insight = AutoInsight::new(trainer, structure, data.row_indexes())
        .with_options(config.search.insight_options());
    (insight, data)
}

fn churn() -> DiscreteAssignment {
    DiscreteAssignment::new("churn", "yes")
}

// =============================================================================
// Known-probability model
// =============================================================================

#[test]
fn test_diff_against_unconditioned_query() {
    let structure = StructureSpec::naive_with_latent_parents(
        vec![
            ("T".to_string(), vec!["yes".to_string(), "no".to_string()]),
            ("X".to_string(), vec!["a".to_string(), "b".to_string()]),
        ],
        vec![],
        2,
        3,
    )
    .unwrap();
    let mut discrete = HashMap::new();
    discrete.insert("T".to_string(), vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    discrete.insert("X".to_string(), vec![vec![0.9, 0.1], vec![0.1, 0.9]]);
    let model = NaiveLatentModel::from_parameters(
        structure,
        NaiveParameters {
            cluster_prior: vec![0.5, 0.5],
            discrete,
            continuous: HashMap::new(),
        },
    )
    .unwrap();

    // P(T=yes) = 0.5, P(T=yes | X=a) = 0.9
    let new = EvidenceSet::from_tokens(["X$$a"]).unwrap();
    let diff = query_model_with_evidence(&model, None, Some(&new)).unwrap();
    let yes = diff
        .discrete
        .iter()
        .find(|r| r.variable_state == "T$$yes")
        .unwrap();
    assert!((yes.difference - 0.4).abs() < 1e-9);

    // base evidence on T itself stays applied, so T cannot move
    let base = EvidenceSet::from_tokens(["T$$no"]).unwrap();
    let diff = query_model_with_evidence(&model, Some(&base), Some(&new)).unwrap();
    let yes = diff
        .discrete
        .iter()
        .find(|r| r.variable_state == "T$$yes")
        .unwrap();
    assert_eq!(yes.difference, 0.0);
}

// =============================================================================
// Trained models
// =============================================================================

#[test]
fn test_bivariate_ranking_with_trained_models() {
    let (insight, _) = insight();
    let ranked = insight
        .query_bivariate_combinations(&churn(), None, 2, 10)
        .expect("Bivariate search failed");

    assert!(!ranked.is_empty());
    for entry in &ranked {
        let assignment = DiscreteAssignment::from_token(&entry.token).unwrap();
        assert_ne!(assignment.variable, "churn");
        assert_ne!(assignment.variable, "Cluster");
        assert!(entry.stats.sum_difference().is_finite());
        if assignment.variable == "Cluster_spend" {
            assert!(assignment.state.starts_with("Cluster"));
        }
    }
    let sums: Vec<f64> = ranked.iter().map(|r| r.stats.sum_difference()).collect();
    assert!(sums.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn test_model_cache_reused_across_searches() {
    let (insight, _) = insight();
    let cache = insight
        .create_model_cache(&churn(), 2)
        .expect("Failed to build cache");
    assert_eq!(cache.len(), 2);

    let first = insight
        .query_exclusive_states(&churn(), Some(&cache), 1, 10)
        .unwrap();
    let second = insight
        .query_exclusive_states(&churn(), Some(&cache), 1, 10)
        .unwrap();
    assert_eq!(first, second);

    let (combinations, models) = insight
        .query_top_variable_combinations(&churn(), Some(&cache), 5, 3)
        .unwrap();
    assert_eq!(combinations.len(), 2);
    assert_eq!(models.len(), 2);
    // top is clamped to the cache size
    assert!(combinations.iter().all(|c| c.evidence.len() <= 2));
}

#[test]
fn test_top_variable_combinations_with_trained_models() {
    let (insight, _) = insight();
    let (combinations, models) = insight
        .query_top_variable_combinations(&churn(), None, 3, 3)
        .expect("Greedy search failed");

    assert_eq!(combinations.len(), 3);
    assert_eq!(models.len(), 3);
    let maxima: Vec<f64> = combinations.iter().map(|c| c.max_probability).collect();
    assert!(maxima.windows(2).all(|w| w[0] >= w[1]));

    for combination in &combinations {
        assert_eq!(combination.evidence.len(), combination.difference.len());
        assert_eq!(combination.evidence.len(), combination.probability.len());
        let rows = combination_rows(combination).unwrap();
        assert_eq!(rows.len(), combination.evidence.len());
    }

    let ranked = rationalise(&combinations, 5);
    assert!(ranked.len() <= 5);
}

#[test]
fn test_convergent_search_respects_iteration_limit() {
    let (insight, _) = insight();
    let runs = insight
        .query_variable_combinations(&churn(), 3, 4, 4)
        .expect("Convergent search failed");

    assert!(!runs.is_empty() && runs.len() <= 4);
    let over_limit = runs.iter().filter(|r| r.over_limit).count();
    assert!(runs.len() == 4 || over_limit == 3);
    for run in &runs {
        assert!(!run.evidence.is_empty());
        assert_eq!(run.evidence.len(), run.difference.len());
        assert_eq!(run.over_limit, run.probability > 0.9);
    }

    let ranked = rationalise(&runs, 20);
    let weights: Vec<f64> = ranked.iter().map(|(_, w)| *w).collect();
    assert!(weights.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn test_predict_over_dataset() {
    let (insight, data) = insight();
    let model = insight.train_model().unwrap();
    let targets = vec!["churn".to_string(), "spend".to_string()];
    let predictions = predict(model.as_ref(), &data, &data.row_indexes(), &targets).unwrap();

    assert_eq!(predictions.len(), data.len());
    for prediction in &predictions {
        match &prediction.outcome {
            PredictionOutcome::Predicted(values) => assert_eq!(values.len(), 2),
            PredictionOutcome::Failed(message) => panic!("row failed: {}", message),
        }
    }
    assert_eq!(model.structure().latent_states(), 2);
}

#[test]
fn test_invalid_target_is_rejected() {
    let (insight, _) = insight();
    assert!(insight
        .query_bivariate_combinations(&DiscreteAssignment::new("spend", "high"), None, 1, 10)
        .is_err());
}

#[test]
fn test_training_is_reproducible_with_seed() {
    let data = Arc::new(Dataset::from_reader(churn_csv().as_bytes()).unwrap());
    let structure = data
        .structure(&["churn".to_string()], &["spend".to_string()], 2, 3)
        .unwrap();
    let options = EmOptions {
        seed: Some(3),
        ..Default::default()
    };
    let rows = data.row_indexes();

    let a = EmTrainer::new(data.clone(), options.clone())
        .train(&structure, &rows)
        .unwrap();
    let b = EmTrainer::new(data, options)
        .train(&structure, &rows)
        .unwrap();
    assert_eq!(a.parameters(), b.parameters());
}

// =============================================================================
// Files
// =============================================================================

#[test]
fn test_dataset_and_config_from_files() {
    let dir = tempfile::tempdir().unwrap();

    let csv_path = dir.path().join("churn.csv");
    std::fs::write(&csv_path, churn_csv()).unwrap();
    let data = Dataset::from_path(&csv_path).unwrap();
    assert_eq!(data.len(), 16);
    assert_eq!(
        data.distinct_states("support").unwrap(),
        vec!["none", "low", "high"]
    );

    let config_path = dir.path().join("insight.toml");
    let mut file = std::fs::File::create(&config_path).unwrap();
    writeln!(file, "[data]\ndiscrete = [\"churn\"]\n[search]\ntop = 4").unwrap();
    let config = LiftConfig::load(Some(&config_path)).unwrap();
    assert_eq!(config.data.discrete, vec!["churn"]);
    assert_eq!(config.search.top, 4);
    assert_eq!(config.search.times, 1);
}
