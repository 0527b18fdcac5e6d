//! Evidence-diff queries

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::evidence::{cluster_child, encode, DiscreteAssignment, EvidenceSet};
use crate::model::{Model, QueryResult, QueryVariables};

use super::types::{ContinuousDiffRow, ContinuousDiffTable, DiffResult, DiffRow, DiffTable};

/// Query `model` under `base`, then under `base` + `new`, and join the two
///
/// Both queries share one session, so `new` is applied on top of `base`.
/// Missing `new` evidence yields a diff of all zeros.
pub fn query_model_with_evidence<M: Model + ?Sized>(
    model: &M,
    base: Option<&EvidenceSet>,
    new: Option<&EvidenceSet>,
) -> Result<DiffResult> {
    let mut session = model.open_session();

    if let Some(evidence) = base {
        session.apply_evidence(evidence)?;
    }
    let base_result = session.execute(&QueryVariables::All)?;

    if let Some(evidence) = new {
        session.apply_evidence(evidence)?;
    }
    let new_result = session.execute(&QueryVariables::All)?;

    join(&base_result, &new_result)
}

/// Mean and variance of `variable` given `evidence`
pub fn conditional_moments<M: Model + ?Sized>(
    model: &M,
    evidence: &EvidenceSet,
    variable: &str,
) -> Result<(f64, f64)> {
    let mut session = model.open_session();
    session.apply_evidence(evidence)?;
    let result = session.execute(&QueryVariables::Only(vec![variable.to_string()]))?;

    let moments = result
        .continuous
        .iter()
        .find(|r| r.variable == variable)
        .map(|r| (r.mean, r.variance));
    moments.ok_or_else(|| Error::SchemaMismatch(format!("no continuous row for '{}'", variable)))
}

/// P(target | evidence)
pub fn target_probability<M: Model + ?Sized>(
    model: &M,
    evidence: &EvidenceSet,
    target: &DiscreteAssignment,
) -> Result<f64> {
    let mut session = model.open_session();
    session.apply_evidence(evidence)?;
    let result = session.execute(&QueryVariables::Only(vec![target.variable.clone()]))?;

    let probability = result
        .discrete
        .iter()
        .find(|r| r.variable == target.variable && r.state == target.state)
        .map(|r| r.value);
    probability.ok_or_else(|| Error::SchemaMismatch(format!("no row for target '{}'", target)))
}

fn join(base: &QueryResult, new: &QueryResult) -> Result<DiffResult> {
    if base.discrete.len() != new.discrete.len() || base.continuous.len() != new.continuous.len()
    {
        return Err(Error::SchemaMismatch(format!(
            "base query returned {}+{} rows, new query {}+{}",
            base.discrete.len(),
            base.continuous.len(),
            new.discrete.len(),
            new.continuous.len()
        )));
    }

    let base_discrete: HashMap<(&str, &str), f64> = base
        .discrete
        .iter()
        .map(|r| ((r.variable.as_str(), r.state.as_str()), r.value))
        .collect();

    let mut discrete = DiffTable::new();
    for row in new.discrete.iter() {
        let base_probability = *base_discrete
            .get(&(row.variable.as_str(), row.state.as_str()))
            .ok_or_else(|| {
                Error::SchemaMismatch(format!(
                    "'{}' has no base row",
                    encode(&row.variable, &row.state)
                ))
            })?;

        discrete.push(DiffRow {
            variable: row.variable.clone(),
            state: row.state.clone(),
            base_probability,
            value: row.value,
            difference: row.value - base_probability,
            variable_state: encode(&row.variable, &row.state),
            continuous_variable_name: cluster_child(&row.variable).map(str::to_string),
            mean: 0.0,
            variance: 0.0,
        });
    }

    let base_continuous: HashMap<&str, (f64, f64)> = base
        .continuous
        .iter()
        .map(|r| (r.variable.as_str(), (r.mean, r.variance)))
        .collect();

    let mut continuous = ContinuousDiffTable::new();
    for row in new.continuous.iter() {
        let (base_mean, base_variance) = *base_continuous
            .get(row.variable.as_str())
            .ok_or_else(|| {
                Error::SchemaMismatch(format!("continuous '{}' has no base row", row.variable))
            })?;

        continuous.push(ContinuousDiffRow {
            variable: row.variable.clone(),
            mean: row.mean,
            variance: row.variance,
            base_mean,
            base_variance,
        });
    }

    Ok(DiffResult {
        discrete,
        continuous,
    })
}
