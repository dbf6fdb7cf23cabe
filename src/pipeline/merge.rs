//! Horizontal merge of a primary table with secondary tables.

use std::collections::HashMap;

use super::error::{AtStage, PipelineError, PipelineResult, Stage};
use crate::table::{Column, Table};

/// A secondary table ready to merge: resampled and gap-filled at the primary's
/// granularity, with its date column already named like the primary's.
#[derive(Debug, Clone)]
pub struct MergeInput {
    pub table: Table,
    /// The secondary's own grouping key column, if any.
    pub group_column: Option<String>,
}

/// Left-join every secondary onto `primary`, in order.
///
/// Secondary columns other than the join keys get an `_add{N}` suffix, `N`
/// being the 1-based position of the secondary. When both sides have a
/// grouping key the join is on `(date, group)`; otherwise on date alone and
/// a secondary grouping key is treated as an ordinary column. Rows whose
/// date is missing are dropped from the result.
pub fn merge_horizontal(
    primary: Table,
    secondaries: Vec<MergeInput>,
    date_column: &str,
    group_column: Option<&str>,
) -> PipelineResult<Table> {
    let mut result = primary;

    for (idx, input) in secondaries.into_iter().enumerate() {
        let suffix = format!("_add{}", idx + 1);
        let mut right = input.table;

        if !right.has_column(date_column) {
            return Err(PipelineError::config(
                Stage::Merge,
                format!("secondary source {} has no `{}` column", idx + 1, date_column),
            ));
        }

        let joined_group = match (group_column, input.group_column.as_deref()) {
            (Some(primary_group), Some(secondary_group)) => {
                right
                    .rename_column(secondary_group, primary_group)
                    .at(Stage::Merge)?;
                Some(primary_group)
            }
            _ => None,
        };

        let mut keys = vec![date_column];
        keys.extend(joined_group);

        let renames: Vec<(String, String)> = right
            .column_names()
            .iter()
            .filter(|name| !keys.contains(&name.as_str()))
            .map(|name| (name.clone(), format!("{}{}", name, suffix)))
            .collect();
        for (from, to) in &renames {
            right.rename_column(from, to).at(Stage::Merge)?;
        }

        result = left_join(&result, &right, &keys)?;
        tracing::debug!(
            "Merged secondary source {} on {:?}, {} rows",
            idx + 1,
            keys,
            result.row_count()
        );
    }

    let dates = result.column(date_column).at(Stage::Merge)?.clone();
    Ok(result.filter_rows(|row| !dates.is_missing(row)))
}

fn row_key(table: &Table, keys: &[&str], row: usize) -> PipelineResult<Option<Vec<String>>> {
    let mut parts = Vec::with_capacity(keys.len());
    for key in keys {
        match table.column(key).at(Stage::Merge)?.value(row).key() {
            Some(part) => parts.push(part),
            None => return Ok(None),
        }
    }
    Ok(Some(parts))
}

/// Keep every left row, once per matching right row or once with missing
/// right cells when nothing matches.
fn left_join(left: &Table, right: &Table, keys: &[&str]) -> PipelineResult<Table> {
    let mut index: HashMap<Vec<String>, Vec<usize>> = HashMap::new();
    for row in 0..right.row_count() {
        if let Some(key) = row_key(right, keys, row)? {
            index.entry(key).or_default().push(row);
        }
    }

    let mut left_rows = Vec::with_capacity(left.row_count());
    let mut right_rows = Vec::with_capacity(left.row_count());
    for row in 0..left.row_count() {
        let matches = row_key(left, keys, row)?.and_then(|key| index.get(&key));
        match matches {
            Some(found) => {
                for &r in found {
                    left_rows.push(Some(row));
                    right_rows.push(Some(r));
                }
            }
            None => {
                left_rows.push(Some(row));
                right_rows.push(None);
            }
        }
    }

    let mut out = left.take_rows(&left_rows);
    for (name, column) in right.iter() {
        if keys.contains(&name) {
            continue;
        }
        let gathered: Column = column.take(&right_rows);
        out.push_column(name, gathered).at(Stage::Merge)?;
    }
    Ok(out)
}
