use serde_json::{Map, Number, Value as Json};

use super::{parse_date, Column, Table, TableError, Value};

/// One row as an ordered `column -> scalar` JSON object.
pub type Record = Map<String, Json>;

static NULL: Json = Json::Null;

impl Value {
    pub fn to_json(&self) -> Json {
        match self {
            Self::Missing => Json::Null,
            Self::Number(n) => Number::from_f64(*n).map(Json::Number).unwrap_or(Json::Null),
            Self::Text(s) => Json::String(s.clone()),
            Self::Date(d) => Json::String(super::format_date(*d)),
        }
    }
}

impl Table {
    /// Row-oriented JSON view, in column order.
    pub fn to_records(&self) -> Vec<Record> {
        (0..self.row_count())
            .map(|row| {
                self.iter()
                    .map(|(name, column)| (name.to_string(), column.value(row).to_json()))
                    .collect()
            })
            .collect()
    }

    /// Rebuild a table from records.
    ///
    /// `columns` fixes the column order; keys absent from a record are missing
    /// cells. Columns listed in `date_columns` are parsed as dates, everything
    /// else is numeric when every present cell is a JSON number and text
    /// otherwise.
    pub fn from_records(
        columns: &[String],
        records: &[Record],
        date_columns: &[&str],
    ) -> Result<Self, TableError> {
        Table::from_columns(columns.iter().map(|name| {
            let cells: Vec<&Json> = records
                .iter()
                .map(|r| r.get(name).unwrap_or(&NULL))
                .collect();

            let column = if date_columns.contains(&name.as_str()) {
                Column::Date(
                    cells
                        .iter()
                        .map(|c| c.as_str().and_then(parse_date))
                        .collect(),
                )
            } else {
                infer_column(&cells)
            };
            (name.clone(), column)
        }))
    }
}

pub(super) fn infer_column(cells: &[&Json]) -> Column {
    let all_numeric = cells.iter().all(|c| c.is_null() || c.is_number());
    if all_numeric {
        return Column::Numeric(cells.iter().map(|c| c.as_f64()).collect());
    }

    Column::Text(
        cells
            .iter()
            .map(|c| match c {
                Json::Null => None,
                Json::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            })
            .collect(),
    )
}
