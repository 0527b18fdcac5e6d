//! Sequential named-column access over query tables
//!
//! The engine reads result tables only through [`Cursor`]. A cursor pulls
//! rows from a [`RowSource`] iterator, so it works the same over a
//! materialised [`Table`](crate::table::Table) or a streaming backend.

/// A single cell as seen through a cursor
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    Text(&'a str),
    Number(f64),
    /// Unknown column, or the cursor is not positioned on a row
    Missing,
}

impl<'a> Value<'a> {
    pub fn as_str(&self) -> Option<&'a str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }
}

/// Column-addressable row
pub trait Record {
    /// Look up a column; unknown columns yield [`Value::Missing`]
    fn field(&self, column: &str) -> Value<'_>;
}

/// Anything that can produce `(row id, row)` pairs in table order
pub trait RowSource {
    type Row: Record;

    fn rows(&self) -> Box<dyn Iterator<Item = (usize, &Self::Row)> + '_>;
}

/// Forward-only reader, driven as `while cursor.read() { ... }`
pub struct Cursor<'a, S: RowSource> {
    source: &'a S,
    iter: Box<dyn Iterator<Item = (usize, &'a S::Row)> + 'a>,
    current: Option<(usize, &'a S::Row)>,
}

impl<'a, S: RowSource> Cursor<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self {
            source,
            iter: source.rows(),
            current: None,
        }
    }

    /// Advance to the next row; false once the source is exhausted
    pub fn read(&mut self) -> bool {
        self.current = self.iter.next();
        self.current.is_some()
    }

    /// Value of `column` on the current row, or [`Value::Missing`]
    pub fn get(&self, column: &str) -> Value<'a> {
        match self.current {
            Some((_, row)) => row.field(column),
            None => Value::Missing,
        }
    }

    /// Text value of `column`, empty when missing
    pub fn text(&self, column: &str) -> &'a str {
        self.get(column).as_str().unwrap_or("")
    }

    /// Numeric value of `column`, NaN when missing
    pub fn number(&self, column: &str) -> f64 {
        self.get(column).as_f64().unwrap_or(f64::NAN)
    }

    /// Row id in the originating table
    pub fn row_index(&self) -> Option<usize> {
        self.current.map(|(index, _)| index)
    }

    /// The current row itself
    pub fn row(&self) -> Option<&'a S::Row> {
        self.current.map(|(_, row)| row)
    }

    /// Rewind to before the first row
    pub fn reset(&mut self) {
        self.iter = self.source.rows();
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{DiscreteRow, Table};

    fn table() -> Table<DiscreteRow> {
        let mut t = Table::new();
        t.push(DiscreteRow::new("A", "x", 0.25));
        t.push(DiscreteRow::new("A", "y", 0.75));
        t.push(DiscreteRow::new("B", "z", 1.0));
        t
    }

    #[test]
    fn test_read_visits_every_row_in_order() {
        let t = table();
        let mut cursor = Cursor::new(&t);
        let mut states = vec![];
        while cursor.read() {
            states.push(cursor.text("state").to_string());
        }
        assert_eq!(states, vec!["x", "y", "z"]);
        assert!(!cursor.read());
    }

    #[test]
    fn test_missing_before_first_row_and_unknown_column() {
        let t = table();
        let mut cursor = Cursor::new(&t);
        assert!(cursor.get("variable").is_missing());
        assert_eq!(cursor.row_index(), None);

        assert!(cursor.read());
        assert!(cursor.get("no_such_column").is_missing());
        assert_eq!(cursor.get("value"), Value::Number(0.25));
    }

    #[test]
    fn test_row_index_is_table_id_not_visit_count() {
        let mut t = table();
        t.sort_by(|a, b| b.value.total_cmp(&a.value));

        let mut cursor = Cursor::new(&t);
        let mut ids = vec![];
        while cursor.read() {
            ids.push(cursor.row_index().unwrap());
        }
        assert_eq!(ids, vec![2, 1, 0]);
    }

    #[test]
    fn test_reset_rewinds() {
        let t = table();
        let mut cursor = Cursor::new(&t);
        while cursor.read() {}
        cursor.reset();
        assert!(cursor.get("state").is_missing());
        assert!(cursor.read());
        assert_eq!(cursor.text("state"), "x");
    }
}
