//! Frequency counting and run rationalisation

use std::collections::HashMap;

use super::types::{CombinationResult, RunTrace};

/// Token -> accumulated signed weight
///
/// Iteration and tie-breaking follow first-insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrequencyCounter {
    entries: Vec<(String, f64)>,
    index: HashMap<String, usize>,
}

impl FrequencyCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, token: impl Into<String>, amount: f64) {
        let token = token.into();
        match self.index.get(&token) {
            Some(&i) => self.entries[i].1 += amount,
            None => {
                self.index.insert(token.clone(), self.entries.len());
                self.entries.push((token, amount));
            }
        }
    }

    /// Accumulated weight; zero for unseen tokens
    pub fn get(&self, token: &str) -> f64 {
        self.index
            .get(token)
            .map(|&i| self.entries[i].1)
            .unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fold another counter into this one
    pub fn merge(&mut self, other: FrequencyCounter) {
        for (token, amount) in other.entries {
            self.add(token, amount);
        }
    }

    /// Top `n` entries by weight, descending
    pub fn most_common(&self, n: usize) -> Vec<(String, f64)> {
        let mut entries = self.entries.clone();
        entries.sort_by(|a, b| b.1.total_cmp(&a.1));
        entries.truncate(n);
        entries
    }
}

/// A search run that can be rationalised
pub trait WeightedRun {
    fn evidence(&self) -> &[String];
    fn difference(&self) -> &[f64];
    /// Weight applied to every item of the run
    fn run_probability(&self) -> f64;
}

impl WeightedRun for RunTrace {
    fn evidence(&self) -> &[String] {
        &self.evidence
    }

    fn difference(&self) -> &[f64] {
        &self.difference
    }

    fn run_probability(&self) -> f64 {
        self.probability
    }
}

impl WeightedRun for CombinationResult {
    fn evidence(&self) -> &[String] {
        &self.evidence
    }

    fn difference(&self) -> &[f64] {
        &self.difference
    }

    fn run_probability(&self) -> f64 {
        self.max_probability
    }
}

/// Weight every evidence item by `difference * run probability`, summed over runs
pub fn rationalise<R: WeightedRun>(results: &[R], num: usize) -> Vec<(String, f64)> {
    let mut counter = FrequencyCounter::new();
    for run in results {
        let probability = run.run_probability();
        for (token, difference) in run.evidence().iter().zip(run.difference()) {
            counter.add(token.as_str(), difference * probability);
        }
    }
    counter.most_common(num)
}
