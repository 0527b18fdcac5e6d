//! Query result tables
//!
//! A [`Table`] keeps each row's original id through sorts and filters, the
//! same way a dataframe keeps its index.

use serde::Serialize;

use crate::cursor::{Record, RowSource, Value};

/// Rows tagged with a stable id
#[derive(Debug, Clone, PartialEq)]
pub struct Table<R> {
    rows: Vec<(usize, R)>,
    next_id: usize,
}

impl<R> Default for Table<R> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            next_id: 0,
        }
    }
}

impl<R> Table<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row, returning its id
    pub fn push(&mut self, row: R) -> usize {
        let id = self.next_id;
        self.rows.push((id, row));
        self.next_id += 1;
        id
    }

    /// Append a row under an explicit id
    pub fn push_with_id(&mut self, id: usize, row: R) {
        self.rows.push((id, row));
        self.next_id = self.next_id.max(id + 1);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &R> {
        self.rows.iter().map(|(_, row)| row)
    }

    pub fn iter_indexed(&self) -> impl Iterator<Item = (usize, &R)> {
        self.rows.iter().map(|(id, row)| (*id, row))
    }

    pub fn get(&self, position: usize) -> Option<&R> {
        self.rows.get(position).map(|(_, row)| row)
    }

    /// Stable sort; row ids travel with their rows
    pub fn sort_by<F>(&mut self, mut compare: F)
    where
        F: FnMut(&R, &R) -> std::cmp::Ordering,
    {
        self.rows.sort_by(|(_, a), (_, b)| compare(a, b));
    }

    /// Copy of the rows matching `predicate`, ids preserved
    pub fn filter<F>(&self, mut predicate: F) -> Table<R>
    where
        R: Clone,
        F: FnMut(&R) -> bool,
    {
        Table {
            rows: self
                .rows
                .iter()
                .filter(|(_, row)| predicate(row))
                .cloned()
                .collect(),
            next_id: self.next_id,
        }
    }
}

impl<R> FromIterator<R> for Table<R> {
    fn from_iter<I: IntoIterator<Item = R>>(iter: I) -> Self {
        let mut table = Table::new();
        for row in iter {
            table.push(row);
        }
        table
    }
}

impl<R: Record> RowSource for Table<R> {
    type Row = R;

    fn rows(&self) -> Box<dyn Iterator<Item = (usize, &R)> + '_> {
        Box::new(self.rows.iter().map(|(id, row)| (*id, row)))
    }
}

impl<R: Serialize> Serialize for Table<R> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

/// Probability of one state of a discrete variable
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscreteRow {
    pub variable: String,
    pub state: String,
    pub value: f64,
}

impl DiscreteRow {
    pub fn new(variable: impl Into<String>, state: impl Into<String>, value: f64) -> Self {
        Self {
            variable: variable.into(),
            state: state.into(),
            value,
        }
    }
}

impl Record for DiscreteRow {
    fn field(&self, column: &str) -> Value<'_> {
        match column {
            "variable" => Value::Text(&self.variable),
            "state" => Value::Text(&self.state),
            "value" => Value::Number(self.value),
            _ => Value::Missing,
        }
    }
}

/// Marginal of a continuous variable
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContinuousRow {
    pub variable: String,
    pub mean: f64,
    pub variance: f64,
}

impl ContinuousRow {
    pub fn new(variable: impl Into<String>, mean: f64, variance: f64) -> Self {
        Self {
            variable: variable.into(),
            mean,
            variance,
        }
    }
}

impl Record for ContinuousRow {
    fn field(&self, column: &str) -> Value<'_> {
        match column {
            "variable" => Value::Text(&self.variable),
            "mean" => Value::Number(self.mean),
            "variance" => Value::Number(self.variance),
            _ => Value::Missing,
        }
    }
}

pub type DiscreteTable = Table<DiscreteRow>;
pub type ContinuousTable = Table<ContinuousRow>;
