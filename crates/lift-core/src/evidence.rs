//! Evidence tokens and evidence sets
//!
//! A discrete observation is carried around as a single string token,
//! `"<variable>$$<state>"`. Tokens are the keys of every frequency counter in
//! the insight engine, so encoding must be deterministic and reversible.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Reserved separator between variable and state inside a token
pub const STATE_DELIMITER: &str = "$$";

/// Name of the latent parent of every variable in the naive structure
pub const LATENT_CLUSTER: &str = "Cluster";

/// Prefix of the per-continuous-variable latent parents
pub const CLUSTER_PREFIX: &str = "Cluster_";

/// Build a token from a variable and state
pub fn encode(variable: &str, state: &str) -> String {
    format!("{}{}{}", variable, STATE_DELIMITER, state)
}

/// Split a token into (variable, state)
///
/// The variable ends at the first delimiter. A state that itself contains the
/// delimiter is rejected rather than truncated. Tokens only read back whole
/// when the variable does not end in `$`; network variables are checked for
/// that when the structure is built.
pub fn decode(token: &str) -> Result<(&str, &str)> {
    let (variable, state) = token
        .split_once(STATE_DELIMITER)
        .ok_or_else(|| Error::Decode(token.to_string()))?;

    if state.contains(STATE_DELIMITER) {
        return Err(Error::Decode(token.to_string()));
    }

    Ok((variable, state))
}

/// True for the latent `Cluster` variable and every `Cluster_*` variable
pub fn is_latent_cluster(variable: &str) -> bool {
    variable == LATENT_CLUSTER || variable.starts_with(CLUSTER_PREFIX)
}

/// The continuous child of a `Cluster_<name>` variable, if any
pub fn cluster_child(variable: &str) -> Option<&str> {
    variable
        .strip_prefix(CLUSTER_PREFIX)
        .filter(|child| !child.is_empty())
}

/// A single discrete (variable, state) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiscreteAssignment {
    pub variable: String,
    pub state: String,
}

impl DiscreteAssignment {
    pub fn new(variable: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            state: state.into(),
        }
    }

    pub fn to_token(&self) -> String {
        encode(&self.variable, &self.state)
    }

    pub fn from_token(token: &str) -> Result<Self> {
        let (variable, state) = decode(token)?;
        Ok(Self::new(variable, state))
    }

    pub fn is_latent_cluster(&self) -> bool {
        is_latent_cluster(&self.variable)
    }
}

impl fmt::Display for DiscreteAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.variable, STATE_DELIMITER, self.state)
    }
}

impl FromStr for DiscreteAssignment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_token(s)
    }
}

/// One observation applied to a model
#[derive(Debug, Clone, PartialEq)]
pub enum Evidence {
    Discrete(DiscreteAssignment),
    Continuous { variable: String, value: f64 },
}

impl Evidence {
    pub fn variable(&self) -> &str {
        match self {
            Evidence::Discrete(assignment) => &assignment.variable,
            Evidence::Continuous { variable, .. } => variable,
        }
    }
}

impl From<DiscreteAssignment> for Evidence {
    fn from(assignment: DiscreteAssignment) -> Self {
        Evidence::Discrete(assignment)
    }
}

/// Ordered evidence; later items for the same variable win when applied
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvidenceSet {
    items: Vec<Evidence>,
}

impl EvidenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a list of discrete tokens
    pub fn from_tokens<I, S>(tokens: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for token in tokens {
            set.push(DiscreteAssignment::from_token(token.as_ref())?);
        }
        Ok(set)
    }

    pub fn from_assignments<'a, I>(assignments: I) -> Self
    where
        I: IntoIterator<Item = &'a DiscreteAssignment>,
    {
        Self {
            items: assignments
                .into_iter()
                .cloned()
                .map(Evidence::Discrete)
                .collect(),
        }
    }

    pub fn push(&mut self, evidence: impl Into<Evidence>) {
        self.items.push(evidence.into());
    }

    pub fn push_continuous(&mut self, variable: impl Into<String>, value: f64) {
        self.items.push(Evidence::Continuous {
            variable: variable.into(),
            value,
        });
    }

    /// Concatenate two sets, keeping order
    pub fn chain(&self, other: &EvidenceSet) -> EvidenceSet {
        let mut items = self.items.clone();
        items.extend(other.items.iter().cloned());
        EvidenceSet { items }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Evidence> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<'a> IntoIterator for &'a EvidenceSet {
    type Item = &'a Evidence;
    type IntoIter = std::slice::Iter<'a, Evidence>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
