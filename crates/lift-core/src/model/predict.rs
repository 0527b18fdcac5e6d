//! Row-by-row inference scan over a dataset
//!
//! One session serves the whole scan. Each row's evidence lives inside an
//! [`EvidenceScope`], which clears the session when it goes out of scope,
//! including on the error path.

use serde::Serialize;
use tracing::{debug, warn};

use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::evidence::EvidenceSet;

use super::{InferenceSession, Model, QueryResult, QueryVariables, StructureSpec, VariableKind};

/// Prediction for one target variable on one row
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetPrediction {
    Discrete {
        variable: String,
        /// Most likely state; first listed state wins ties
        state: String,
        probability: f64,
        probabilities: Vec<(String, f64)>,
    },
    Continuous {
        variable: String,
        mean: f64,
        variance: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionOutcome {
    Predicted(Vec<TargetPrediction>),
    /// The row's query failed; the scan carried on
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub row: usize,
    pub outcome: PredictionOutcome,
}

impl Prediction {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, PredictionOutcome::Failed(_))
    }
}

/// Evidence applied for the lifetime of the guard
struct EvidenceScope<'s, S: InferenceSession + ?Sized> {
    session: &'s mut S,
}

impl<'s, S: InferenceSession + ?Sized> EvidenceScope<'s, S> {
    fn apply(session: &'s mut S, evidence: &EvidenceSet) -> Result<Self> {
        let scope = Self { session };
        scope.session.apply_evidence(evidence)?;
        Ok(scope)
    }

    fn execute(&mut self, variables: &QueryVariables) -> Result<QueryResult> {
        self.session.execute(variables)
    }
}

impl<S: InferenceSession + ?Sized> Drop for EvidenceScope<'_, S> {
    fn drop(&mut self) {
        self.session.clear_evidence();
    }
}

/// Predict `targets` for each row, using every other observed column as evidence
///
/// Unknown targets fail the whole call. A row whose own query fails is
/// reported as [`PredictionOutcome::Failed`].
pub fn predict<M: Model + ?Sized>(
    model: &M,
    dataset: &Dataset,
    rows: &[usize],
    targets: &[String],
) -> Result<Vec<Prediction>> {
    if targets.is_empty() {
        return Err(Error::InvalidTarget("no prediction targets given".to_string()));
    }
    let structure = model.structure();
    for target in targets {
        structure
            .variable_kind(target)
            .map_err(|_| Error::InvalidTarget(format!("'{}' is not in the model", target)))?;
    }

    let query = QueryVariables::Only(targets.to_vec());
    let mut session = model.open_session();
    let mut predictions = Vec::with_capacity(rows.len());
    let mut failed = 0;

    for &row in rows {
        let outcome = match predict_row(&mut *session, dataset, structure, row, targets, &query) {
            Ok(values) => PredictionOutcome::Predicted(values),
            Err(e) => {
                warn!(row, error = %e, "Prediction failed for row");
                failed += 1;
                PredictionOutcome::Failed(e.to_string())
            }
        };
        predictions.push(Prediction { row, outcome });
    }

    debug!(rows = predictions.len(), failed, "Prediction scan complete");
    Ok(predictions)
}

fn predict_row<S: InferenceSession + ?Sized>(
    session: &mut S,
    dataset: &Dataset,
    structure: &StructureSpec,
    row: usize,
    targets: &[String],
    query: &QueryVariables,
) -> Result<Vec<TargetPrediction>> {
    let evidence = dataset.row_evidence(row, structure, targets)?;
    let mut scope = EvidenceScope::apply(session, &evidence)?;
    let result = scope.execute(query)?;

    targets
        .iter()
        .map(|target| match structure.variable_kind(target)? {
            VariableKind::Discrete => {
                let probabilities: Vec<(String, f64)> = result
                    .discrete
                    .iter()
                    .filter(|r| r.variable == *target)
                    .map(|r| (r.state.clone(), r.value))
                    .collect();
                let (state, probability) = probabilities
                    .iter()
                    .fold(None::<&(String, f64)>, |best, candidate| match best {
                        Some(b) if b.1 >= candidate.1 => Some(b),
                        _ => Some(candidate),
                    })
                    .cloned()
                    .ok_or_else(|| {
                        Error::SchemaMismatch(format!("no rows returned for '{}'", target))
                    })?;
                Ok(TargetPrediction::Discrete {
                    variable: target.clone(),
                    state,
                    probability,
                    probabilities,
                })
            }
            VariableKind::Continuous => {
                let row = result
                    .continuous
                    .iter()
                    .find(|r| r.variable == *target)
                    .ok_or_else(|| {
                        Error::SchemaMismatch(format!("no rows returned for '{}'", target))
                    })?;
                Ok(TargetPrediction::Continuous {
                    variable: target.clone(),
                    mean: row.mean,
                    variance: row.variance,
                })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{income_model, tx_model};

    fn dataset(rows: &[[&str; 2]]) -> Dataset {
        Dataset::from_records(
            vec!["T".to_string(), "X".to_string()],
            rows.iter()
                .map(|r| r.iter().map(|c| Some(c.to_string())).collect())
                .collect(),
        )
        .unwrap()
    }

    fn discrete(prediction: &Prediction) -> (String, f64) {
        match &prediction.outcome {
            PredictionOutcome::Predicted(values) => match &values[0] {
                TargetPrediction::Discrete {
                    state, probability, ..
                } => (state.clone(), *probability),
                other => panic!("unexpected prediction {:?}", other),
            },
            PredictionOutcome::Failed(message) => panic!("row failed: {}", message),
        }
    }

    #[test]
    fn test_predict_uses_row_evidence_and_clears_between_rows() {
        let model = tx_model(0.9);
        let data = dataset(&[["no", "a"], ["yes", ""], ["yes", "b"]]);
        let predictions = predict(&model, &data, &data.row_indexes(), &["T".to_string()]).unwrap();

        let (state, p) = discrete(&predictions[0]);
        assert_eq!(state, "yes");
        assert!((p - 0.9).abs() < 1e-12);

        // nothing observed: back to the prior, tie goes to the first state
        let (state, p) = discrete(&predictions[1]);
        assert_eq!(state, "yes");
        assert!((p - 0.5).abs() < 1e-12);

        let (state, p) = discrete(&predictions[2]);
        assert_eq!(state, "no");
        assert!((p - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_failed_row_is_tagged_and_scan_continues() {
        let model = tx_model(0.9);
        let data = dataset(&[["yes", "zzz"], ["yes", "a"]]);
        let predictions = predict(&model, &data, &[0, 1], &["T".to_string()]).unwrap();

        assert!(predictions[0].is_failed());
        assert!(!predictions[1].is_failed());
        assert_eq!(predictions[1].row, 1);
    }

    #[test]
    fn test_unknown_target_is_fatal() {
        let model = tx_model(0.9);
        let data = dataset(&[["yes", "a"]]);
        assert!(matches!(
            predict(&model, &data, &[0], &["nope".to_string()]),
            Err(Error::InvalidTarget(_))
        ));
        assert!(matches!(
            predict(&model, &data, &[0], &[]),
            Err(Error::InvalidTarget(_))
        ));
    }

    #[test]
    fn test_continuous_target() {
        let model = income_model();
        let data = Dataset::from_records(
            vec!["X".to_string(), "income".to_string()],
            vec![vec![Some("a".to_string()), Some("12.0".to_string())]],
        )
        .unwrap();
        let predictions = predict(&model, &data, &[0], &["income".to_string()]).unwrap();

        match &predictions[0].outcome {
            PredictionOutcome::Predicted(values) => match &values[0] {
                TargetPrediction::Continuous { mean, variance, .. } => {
                    // the observed income is the target, so it is not evidence
                    assert!(*mean > 10.0 && *mean < 100.0);
                    assert!(*variance > 0.0);
                }
                other => panic!("unexpected prediction {:?}", other),
            },
            PredictionOutcome::Failed(message) => panic!("row failed: {}", message),
        }
    }
}
