//! Reindexing onto a complete period grid and filling the holes.

use std::collections::HashMap;

use chrono::NaiveDate;

use super::error::{AtStage, PipelineError, PipelineResult, Stage};
use super::period;
use crate::models::{FillPolicy, Granularity};
use crate::table::{Column, Table};

/// Produce exactly one row per bucket label in `[start, end]`.
///
/// Rows of `table` whose date is not on the grid are discarded; labels with
/// no row are inserted. Numeric columns are then filled by `policy`, and any
/// numeric cell still missing afterwards becomes 0. Text columns keep their
/// gaps.
pub fn fill_gaps(
    table: &Table,
    date_column: &str,
    start: NaiveDate,
    end: NaiveDate,
    granularity: Granularity,
    policy: FillPolicy,
) -> PipelineResult<Table> {
    let Column::Date(dates) = table.column(date_column).at(Stage::GapFill)? else {
        return Err(PipelineError::config(
            Stage::GapFill,
            format!("column `{}` must hold resampled dates", date_column),
        ));
    };

    let mut by_date: HashMap<NaiveDate, usize> = HashMap::with_capacity(dates.len());
    for (row, date) in dates.iter().enumerate() {
        if let Some(date) = date {
            by_date.entry(*date).or_insert(row);
        }
    }

    let labels = period::grid(granularity, start, end);
    let indices: Vec<Option<usize>> = labels.iter().map(|d| by_date.get(d).copied()).collect();
    let inserted = indices.iter().filter(|i| i.is_none()).count();

    let mut out = table.take_rows(&indices);
    *out.column_mut(date_column).at(Stage::GapFill)? =
        Column::Date(labels.into_iter().map(Some).collect());

    let numeric: Vec<String> = out
        .iter()
        .filter(|(name, column)| *name != date_column && matches!(column, Column::Numeric(_)))
        .map(|(name, _)| name.to_string())
        .collect();

    for name in &numeric {
        if let Column::Numeric(values) = out.column_mut(name).at(Stage::GapFill)? {
            apply_policy(values, policy);
            zero_fill(values);
        }
    }

    tracing::debug!(
        "Gap fill ({}) produced {} rows, {} inserted",
        policy.as_str(),
        out.row_count(),
        inserted
    );
    Ok(out)
}

/// Fill missing cells in place according to `policy`.
///
/// `NaN` and infinite cells count as missing. Cells the policy cannot reach
/// (e.g. leading gaps under forward fill) stay missing; callers run
/// [`zero_fill`] afterwards.
pub fn apply_policy(values: &mut [Option<f64>], policy: FillPolicy) {
    for v in values.iter_mut() {
        if v.is_some_and(|x| !x.is_finite()) {
            *v = None;
        }
    }
    match policy {
        FillPolicy::Zero => zero_fill(values),
        FillPolicy::Forward => forward_fill(values),
        FillPolicy::Backward => backward_fill(values),
        FillPolicy::Mean => mean_fill(values),
        FillPolicy::Interpolate => interpolate(values),
    }
}

pub fn zero_fill(values: &mut [Option<f64>]) {
    for v in values.iter_mut().filter(|v| !v.is_some_and(f64::is_finite)) {
        *v = Some(0.0);
    }
}

fn forward_fill(values: &mut [Option<f64>]) {
    let mut last = None;
    for v in values.iter_mut() {
        match v {
            Some(x) => last = Some(*x),
            None => *v = last,
        }
    }
}

fn backward_fill(values: &mut [Option<f64>]) {
    let mut next = None;
    for v in values.iter_mut().rev() {
        match v {
            Some(x) => next = Some(*x),
            None => *v = next,
        }
    }
}

fn mean_fill(values: &mut [Option<f64>]) {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        return;
    }
    let mean = present.iter().sum::<f64>() / present.len() as f64;
    for v in values.iter_mut().filter(|v| v.is_none()) {
        *v = Some(mean);
    }
}

/// Linear interpolation by position between bracketing observations.
/// Trailing gaps hold the last observation; leading gaps are left alone.
fn interpolate(values: &mut [Option<f64>]) {
    let mut prev: Option<(usize, f64)> = None;
    let mut i = 0;
    while i < values.len() {
        let Some(current) = values[i] else {
            i += 1;
            continue;
        };
        if let Some((p, pv)) = prev {
            let span = (i - p) as f64;
            for (k, slot) in values.iter_mut().enumerate().take(i).skip(p + 1) {
                *slot = Some(pv + (current - pv) * (k - p) as f64 / span);
            }
        }
        prev = Some((i, current));
        i += 1;
    }

    if let Some((p, pv)) = prev {
        for slot in values.iter_mut().skip(p + 1) {
            *slot = Some(pv);
        }
    }
}
