//! Column-typed in-memory tables.
//!
//! Every pipeline stage consumes and produces a [`Table`]: an ordered set of
//! equally long, named columns. Each column is tagged with its kind so that
//! numeric-only operations (aggregation, gap filling, lags, rolling windows)
//! can reject text columns up front instead of failing mid-computation.
//!
//! Missing cells are `None` in every column kind.

mod dates;
pub mod readers;
mod records;

use chrono::NaiveDate;
use thiserror::Error;

pub use dates::{format_date, parse_date};
pub use records::Record;

#[derive(Debug, Error, PartialEq)]
pub enum TableError {
    #[error("column `{0}` not found")]
    MissingColumn(String),

    #[error("column `{0}` already exists")]
    DuplicateColumn(String),

    #[error("column `{0}` is not numeric")]
    NotNumeric(String),

    #[error("column `{name}` has {actual} rows, expected {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
}

/// A single column of cells.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Date(Vec<Option<NaiveDate>>),
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Self::Date(v) => v.len(),
            Self::Numeric(v) => v.len(),
            Self::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_missing(&self, row: usize) -> bool {
        match self {
            Self::Date(v) => v[row].is_none(),
            Self::Numeric(v) => v[row].is_none(),
            Self::Text(v) => v[row].is_none(),
        }
    }

    /// The cell at `row` as a dynamically typed value.
    pub fn value(&self, row: usize) -> Value {
        match self {
            Self::Date(v) => v[row].map(Value::Date).unwrap_or(Value::Missing),
            Self::Numeric(v) => v[row].map(Value::Number).unwrap_or(Value::Missing),
            Self::Text(v) => v[row]
                .clone()
                .map(Value::Text)
                .unwrap_or(Value::Missing),
        }
    }

    /// Gather rows by index; `None` produces a missing cell.
    pub fn take(&self, indices: &[Option<usize>]) -> Self {
        fn gather<T: Clone>(values: &[Option<T>], indices: &[Option<usize>]) -> Vec<Option<T>> {
            indices
                .iter()
                .map(|i| i.and_then(|i| values[i].clone()))
                .collect()
        }

        match self {
            Self::Date(v) => Self::Date(gather(v, indices)),
            Self::Numeric(v) => Self::Numeric(gather(v, indices)),
            Self::Text(v) => Self::Text(gather(v, indices)),
        }
    }
}

/// A dynamically typed cell, used for join keys and record conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Missing,
    Number(f64),
    Text(String),
    Date(NaiveDate),
}

impl Value {
    /// A string form used as a join key, so that a numeric product id `7`
    /// matches the text `"7"`. Missing cells have no key.
    pub fn key(&self) -> Option<String> {
        match self {
            Self::Missing => None,
            Self::Number(n) => Some(n.to_string()),
            Self::Text(s) => Some(s.clone()),
            Self::Date(d) => Some(dates::format_date(*d)),
        }
    }
}

/// An ordered collection of named, equally long columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    names: Vec<String>,
    columns: Vec<Column>,
    rows: usize,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from `(name, column)` pairs.
    pub fn from_columns(
        columns: impl IntoIterator<Item = (String, Column)>,
    ) -> Result<Self, TableError> {
        let mut table = Self::new();
        for (name, column) in columns {
            table.push_column(name, column)?;
        }
        Ok(table)
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    fn position(&self, name: &str) -> Result<usize, TableError> {
        self.names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| TableError::MissingColumn(name.to_string()))
    }

    pub fn column(&self, name: &str) -> Result<&Column, TableError> {
        Ok(&self.columns[self.position(name)?])
    }

    pub fn column_mut(&mut self, name: &str) -> Result<&mut Column, TableError> {
        let idx = self.position(name)?;
        Ok(&mut self.columns[idx])
    }

    /// The values of a numeric column.
    pub fn numeric(&self, name: &str) -> Result<&[Option<f64>], TableError> {
        match self.column(name)? {
            Column::Numeric(values) => Ok(values),
            _ => Err(TableError::NotNumeric(name.to_string())),
        }
    }

    /// Iterate `(name, column)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.columns.iter())
    }

    /// Append a column. The first column fixes the row count.
    pub fn push_column(&mut self, name: impl Into<String>, column: Column) -> Result<(), TableError> {
        let name = name.into();
        if self.has_column(&name) {
            return Err(TableError::DuplicateColumn(name));
        }
        if !self.columns.is_empty() && column.len() != self.rows {
            return Err(TableError::LengthMismatch {
                name,
                expected: self.rows,
                actual: column.len(),
            });
        }
        self.rows = column.len();
        self.names.push(name);
        self.columns.push(column);
        Ok(())
    }

    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<(), TableError> {
        if from == to {
            return self.position(from).map(|_| ());
        }
        if self.has_column(to) {
            return Err(TableError::DuplicateColumn(to.to_string()));
        }
        let idx = self.position(from)?;
        self.names[idx] = to.to_string();
        Ok(())
    }

    /// Gather rows by index into a new table with the same schema.
    pub fn take_rows(&self, indices: &[Option<usize>]) -> Self {
        Self {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.take(indices)).collect(),
            rows: indices.len(),
        }
    }

    /// Keep only the rows for which `keep` returns true.
    pub fn filter_rows(&self, keep: impl Fn(usize) -> bool) -> Self {
        let indices: Vec<Option<usize>> = (0..self.rows).filter(|&i| keep(i)).map(Some).collect();
        self.take_rows(&indices)
    }

    /// Stable sort of all rows by a date column, missing dates last.
    pub fn sort_by_date(&self, date_column: &str) -> Result<Self, TableError> {
        let dates = match self.column(date_column)? {
            Column::Date(values) => values,
            _ => return Ok(self.clone()),
        };
        let mut order: Vec<usize> = (0..self.rows).collect();
        order.sort_by_key(|&i| (dates[i].is_none(), dates[i]));
        let indices: Vec<Option<usize>> = order.into_iter().map(Some).collect();
        Ok(self.take_rows(&indices))
    }

    /// A table holding only the first `n` rows.
    pub fn head(&self, n: usize) -> Self {
        let indices: Vec<Option<usize>> = (0..self.rows.min(n)).map(Some).collect();
        self.take_rows(&indices)
    }
}
