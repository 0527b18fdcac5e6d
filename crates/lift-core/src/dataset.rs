//! Tabular training data loaded from CSV
//!
//! Cells are kept as written. Column kinds are not inferred here; callers say
//! which columns are discrete and which are continuous.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::ReaderBuilder;
use tracing::debug;

use crate::error::{Error, Result};
use crate::evidence::{DiscreteAssignment, EvidenceSet};
use crate::model::{StructureSpec, VariableKind};

/// In-memory dataset; row indexes are positions in file order
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    columns: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<Option<String>>>,
}

impl Dataset {
    /// Build from column names and raw rows (`None` or empty = missing)
    pub fn from_records(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Result<Self> {
        let mut index = HashMap::new();
        for (i, column) in columns.iter().enumerate() {
            if index.insert(column.clone(), i).is_some() {
                return Err(Error::InvalidData(format!("duplicate column '{}'", column)));
            }
        }

        let mut cleaned = Vec::with_capacity(rows.len());
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != columns.len() {
                return Err(Error::InvalidData(format!(
                    "row {} has {} cells, expected {}",
                    i,
                    row.len(),
                    columns.len()
                )));
            }
            cleaned.push(
                row.into_iter()
                    .map(|cell| cell.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()))
                    .collect(),
            );
        }

        Ok(Self {
            columns,
            index,
            rows: cleaned,
        })
    }

    /// Parse a headered CSV
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(reader);

        let columns: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
        let mut rows = Vec::new();

        for result in rdr.records() {
            let record = result?;
            rows.push(record.iter().map(|cell| Some(cell.to_string())).collect());
        }

        let dataset = Self::from_records(columns, rows)?;
        debug!(
            rows = dataset.len(),
            columns = dataset.columns.len(),
            "Loaded dataset"
        );
        Ok(dataset)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        Self::from_reader(File::open(path)?)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Every row index, in file order
    pub fn row_indexes(&self) -> Vec<usize> {
        (0..self.rows.len()).collect()
    }

    /// Raw cell text, `None` when missing
    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column)?.as_deref()
    }

    /// Numeric cell; text that does not parse is an error
    pub fn numeric(&self, row: usize, column: usize) -> Result<Option<f64>> {
        match self.cell(row, column) {
            None => Ok(None),
            Some(text) => text.parse::<f64>().map(Some).map_err(|_| {
                Error::InvalidData(format!(
                    "value '{}' in column '{}' is not numeric",
                    text, self.columns[column]
                ))
            }),
        }
    }

    fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| Error::InvalidData(format!("column '{}' not in dataset", name)))
    }

    /// Distinct non-missing values of a column, in first-appearance order
    pub fn distinct_states(&self, name: &str) -> Result<Vec<String>> {
        let column = self.require_column(name)?;
        let mut states: Vec<String> = Vec::new();
        for row in &self.rows {
            if let Some(value) = &row[column] {
                if !states.iter().any(|s| s == value) {
                    states.push(value.clone());
                }
            }
        }
        Ok(states)
    }

    /// Naive latent-parent structure over the named columns
    pub fn structure(
        &self,
        discrete: &[String],
        continuous: &[String],
        latent_states: usize,
        cluster_states: usize,
    ) -> Result<StructureSpec> {
        let mut discrete_specs = Vec::with_capacity(discrete.len());
        for name in discrete {
            discrete_specs.push((name.clone(), self.distinct_states(name)?));
        }
        for name in continuous {
            self.require_column(name)?;
        }

        StructureSpec::naive_with_latent_parents(
            discrete_specs,
            continuous.to_vec(),
            latent_states,
            cluster_states,
        )
    }

    /// Evidence observed on one row, skipping missing cells and `exclude`
    pub fn row_evidence(
        &self,
        row: usize,
        structure: &StructureSpec,
        exclude: &[String],
    ) -> Result<EvidenceSet> {
        if row >= self.rows.len() {
            return Err(Error::InvalidData(format!("row {} out of range", row)));
        }

        let mut evidence = EvidenceSet::new();
        let observable = structure
            .discrete_variables()
            .chain(structure.continuous_variables());

        for variable in observable {
            if exclude.iter().any(|e| *e == variable.name) {
                continue;
            }
            let Some(column) = self.column_index(&variable.name) else {
                continue;
            };

            match variable.kind {
                VariableKind::Discrete => {
                    if let Some(state) = self.cell(row, column) {
                        evidence.push(DiscreteAssignment::new(variable.name.clone(), state));
                    }
                }
                VariableKind::Continuous => {
                    if let Some(value) = self.numeric(row, column)? {
                        evidence.push_continuous(variable.name.clone(), value);
                    }
                }
            }
        }

        Ok(evidence)
    }
}
