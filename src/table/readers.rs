//! Readers that materialize raw sources into [`Table`]s.

use std::path::Path;

use anyhow::{bail, Context, Result};
use rusqlite::{types::ValueRef, Connection, OpenFlags};
use serde_json::Value as Json;

use super::records::infer_column;
use super::{Column, Record, Table};

/// Load a delimited or JSON file, dispatching on its extension.
pub fn read_file(path: &Path) -> Result<Table> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let table = match extension.as_str() {
        "csv" => read_csv(path)?,
        "json" => read_json(path)?,
        "xlsx" | "xls" => bail!(
            "spreadsheet sources are not supported, export {} as CSV",
            path.display()
        ),
        other => bail!("unsupported file type `{}` for {}", other, path.display()),
    };

    tracing::debug!(
        "Loaded {} rows x {} columns from {}",
        table.row_count(),
        table.column_names().len(),
        path.display()
    );
    Ok(table)
}

/// Load a CSV file with a header row.
///
/// A column is numeric when every non-empty cell parses as a number; otherwise
/// it is text. Empty cells are missing in both cases, and so are `NaN` and
/// infinite numbers.
pub fn read_csv(path: &Path) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("Failed to read header row of {}", path.display()))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    for (line, record) in reader.records().enumerate() {
        let record =
            record.with_context(|| format!("Malformed CSV row {} in {}", line + 2, path.display()))?;
        for (idx, column) in cells.iter_mut().enumerate() {
            let cell = record.get(idx).filter(|c| !c.is_empty()).map(str::to_string);
            column.push(cell);
        }
    }

    let mut table = Table::new();
    for (name, column) in headers.into_iter().zip(cells) {
        table.push_column(name, infer_text_column(column))?;
    }
    Ok(table)
}

fn infer_text_column(cells: Vec<Option<String>>) -> Column {
    let parsed: Option<Vec<Option<f64>>> = cells
        .iter()
        .map(|c| match c {
            None => Some(None),
            Some(s) => s.parse::<f64>().ok().map(|v| v.is_finite().then_some(v)),
        })
        .collect();

    match parsed {
        Some(values) => Column::Numeric(values),
        None => Column::Text(cells),
    }
}

/// Load a JSON array of flat objects.
pub fn read_json(path: &Path) -> Result<Table> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let parsed: Json = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse JSON in {}", path.display()))?;

    let Json::Array(items) = parsed else {
        bail!("{} must contain a JSON array of records", path.display());
    };

    let mut columns: Vec<String> = Vec::new();
    let mut records: Vec<Record> = Vec::with_capacity(items.len());
    for item in items {
        let Json::Object(record) = item else {
            bail!("{} contains a non-object record", path.display());
        };
        for key in record.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
        records.push(record);
    }

    Ok(Table::from_records(&columns, &records, &[])?)
}

/// Run a query (or read a whole table) from a SQLite database file.
pub fn read_sqlite(database: &Path, table: Option<&str>, query: Option<&str>) -> Result<Table> {
    let sql = match (query, table) {
        (Some(q), _) if !q.trim().is_empty() => q.to_string(),
        (_, Some(t)) => format!("SELECT * FROM \"{}\"", t.replace('"', "\"\"")),
        _ => bail!("a table name or a query is required"),
    };

    let conn = Connection::open_with_flags(database, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("Failed to open database {}", database.display()))?;
    let mut stmt = conn
        .prepare(&sql)
        .with_context(|| format!("Failed to prepare query: {}", sql))?;

    let names: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
    let mut cells: Vec<Vec<Json>> = vec![Vec::new(); names.len()];

    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        for (idx, column) in cells.iter_mut().enumerate() {
            let cell = match row.get_ref(idx)? {
                ValueRef::Null => Json::Null,
                ValueRef::Integer(i) => Json::from(i),
                ValueRef::Real(f) if f.is_finite() => Json::from(f),
                ValueRef::Real(_) => Json::Null,
                ValueRef::Text(t) => Json::String(String::from_utf8_lossy(t).into_owned()),
                ValueRef::Blob(_) => bail!("column `{}` holds binary data", names[idx]),
            };
            column.push(cell);
        }
    }

    let mut out = Table::new();
    for (name, column) in names.into_iter().zip(cells) {
        let refs: Vec<&Json> = column.iter().collect();
        out.push_column(name, infer_column(&refs))?;
    }
    Ok(out)
}
