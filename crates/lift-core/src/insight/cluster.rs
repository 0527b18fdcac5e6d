//! Stable indexes for latent cluster states
//!
//! Training assigns `Cluster0`, `Cluster1`, ... arbitrarily, so raw labels
//! cannot be compared across models. The order of the states by the mean of
//! their continuous child is stable, and that rank is what gets aggregated.

use crate::cursor::{Cursor, RowSource};
use crate::error::{Error, Result};

/// Rows of `variable`, sorted by `mean` ascending (stable)
fn ranked<'a, S: RowSource>(table: &'a S, variable: &str) -> Vec<(&'a str, f64, &'a S::Row)> {
    let mut cursor = Cursor::new(table);
    let mut rows = Vec::new();
    while cursor.read() {
        if cursor.text("variable") != variable {
            continue;
        }
        if let Some(row) = cursor.row() {
            rows.push((cursor.text("state"), cursor.number("mean"), row));
        }
    }
    rows.sort_by(|a, b| a.1.total_cmp(&b.1));
    rows
}

/// Rank of `state` among the states of `variable`
pub fn resolve_index<S: RowSource>(table: &S, variable: &str, state: &str) -> Result<usize> {
    ranked(table, variable)
        .iter()
        .position(|(s, _, _)| *s == state)
        .ok_or_else(|| {
            Error::ClusterResolution(format!(
                "state '{}' of '{}' not found",
                state, variable
            ))
        })
}

/// Row of `variable` at rank `index`
pub fn resolve_from_index<'a, S: RowSource>(
    table: &'a S,
    variable: &str,
    index: usize,
) -> Result<&'a S::Row> {
    let rows = ranked(table, variable);
    let count = rows.len();
    rows.into_iter()
        .nth(index)
        .map(|(_, _, row)| row)
        .ok_or_else(|| {
            Error::ClusterResolution(format!(
                "index {} out of range for '{}' ({} states)",
                index, variable, count
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insight::types::{DiffRow, DiffTable};

    fn row(variable: &str, state: &str, mean: f64) -> DiffRow {
        DiffRow {
            variable: variable.to_string(),
            state: state.to_string(),
            base_probability: 0.0,
            value: 0.0,
            difference: 0.0,
            variable_state: format!("{}$${}", variable, state),
            continuous_variable_name: Some("income".to_string()),
            mean,
            variance: mean / 10.0,
        }
    }

    fn table(labels: [&str; 3]) -> DiffTable {
        // means are fixed; only the labels attached to them move
        vec![
            row("X", "a", 1000.0),
            row("Cluster_income", labels[0], 50.0),
            row("Cluster_income", labels[1], 10.0),
            row("Cluster_income", labels[2], 100.0),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_resolve_index_ranks_by_mean() {
        let t = table(["Cluster0", "Cluster1", "Cluster2"]);
        assert_eq!(resolve_index(&t, "Cluster_income", "Cluster1").unwrap(), 0);
        assert_eq!(resolve_index(&t, "Cluster_income", "Cluster0").unwrap(), 1);
        assert_eq!(resolve_index(&t, "Cluster_income", "Cluster2").unwrap(), 2);
    }

    #[test]
    fn test_resolution_stable_under_label_permutation() {
        let original = table(["Cluster0", "Cluster1", "Cluster2"]);
        let swapped = table(["Cluster2", "Cluster1", "Cluster0"]);

        for index in 0..3 {
            let a = resolve_from_index(&original, "Cluster_income", index).unwrap();
            let b = resolve_from_index(&swapped, "Cluster_income", index).unwrap();
            assert_eq!(a.mean, b.mean);
        }
        // the state carrying mean 50 resolves to rank 1 whatever its label
        assert_eq!(resolve_index(&original, "Cluster_income", "Cluster0").unwrap(), 1);
        assert_eq!(resolve_index(&swapped, "Cluster_income", "Cluster2").unwrap(), 1);
    }

    #[test]
    fn test_inverse() {
        let t = table(["Cluster0", "Cluster1", "Cluster2"]);
        for state in ["Cluster0", "Cluster1", "Cluster2"] {
            let index = resolve_index(&t, "Cluster_income", state).unwrap();
            assert_eq!(resolve_from_index(&t, "Cluster_income", index).unwrap().state, state);
        }
    }

    #[test]
    fn test_resolution_errors() {
        let t = table(["Cluster0", "Cluster1", "Cluster2"]);
        assert!(matches!(
            resolve_index(&t, "Cluster_income", "Cluster9"),
            Err(Error::ClusterResolution(_))
        ));
        assert!(matches!(
            resolve_from_index(&t, "Cluster_income", 3),
            Err(Error::ClusterResolution(_))
        ));
    }
}
