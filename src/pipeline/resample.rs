//! Period resampling: one output row per period bucket present in the input.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use super::error::{AtStage, PipelineError, PipelineResult, Stage};
use super::period;
use crate::models::{AggregationFunction, Granularity};
use crate::table::{parse_date, Column, Table};

/// Bucket `table` by `date_column` and reduce each mapped column per bucket.
///
/// The output starts with the date column (holding bucket closing dates)
/// followed by the mapped columns in mapping order; unmapped columns are
/// dropped. Every date must parse: a single bad cell fails the whole call
/// rather than silently losing the row.
pub fn resample(
    table: &Table,
    date_column: &str,
    granularity: Granularity,
    aggregations: &[(String, AggregationFunction)],
) -> PipelineResult<Table> {
    let dates = parse_dates(table.column(date_column).at(Stage::Resample)?, date_column)?;

    let mut buckets: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
    for (row, date) in dates.iter().enumerate() {
        buckets
            .entry(period::label(granularity, *date))
            .or_default()
            .push(row);
    }

    let mut out = Table::new();
    out.push_column(
        date_column,
        Column::Date(buckets.keys().copied().map(Some).collect()),
    )
    .at(Stage::Resample)?;

    for (name, func) in aggregations {
        if name == date_column {
            return Err(PipelineError::config(
                Stage::Resample,
                format!("the date column `{}` cannot be aggregated", name),
            ));
        }
        let column = table.column(name).at(Stage::Resample)?;
        let reduced = reduce_column(column, name, *func, buckets.values())?;
        out.push_column(name.clone(), reduced).at(Stage::Resample)?;
    }

    tracing::debug!(
        "Resampled {} rows into {} {} buckets",
        table.row_count(),
        out.row_count(),
        granularity.as_str()
    );
    Ok(out)
}

/// Parse every cell of a date column, failing on the first missing or
/// unparsable one.
pub fn parse_dates(column: &Column, name: &str) -> PipelineResult<Vec<NaiveDate>> {
    let bad_cell = |row: usize, raw: String| {
        PipelineError::computation(
            Stage::Resample,
            format!("unparsable date {} in column `{}` at row {}", raw, name, row + 1),
        )
    };

    match column {
        Column::Date(values) => values
            .iter()
            .enumerate()
            .map(|(row, d)| d.ok_or_else(|| bad_cell(row, "<missing>".to_string())))
            .collect(),
        Column::Text(values) => values
            .iter()
            .enumerate()
            .map(|(row, raw)| match raw {
                Some(raw) => parse_date(raw).ok_or_else(|| bad_cell(row, format!("`{}`", raw))),
                None => Err(bad_cell(row, "<missing>".to_string())),
            })
            .collect(),
        // Numeric dates only make sense as compact `YYYYMMDD` integers.
        Column::Numeric(values) => values
            .iter()
            .enumerate()
            .map(|(row, v)| match v {
                Some(v) if v.fract() == 0.0 => {
                    let raw = format!("{}", *v as i64);
                    parse_date(&raw).ok_or_else(|| bad_cell(row, format!("`{}`", raw)))
                }
                Some(v) => Err(bad_cell(row, format!("`{}`", v))),
                None => Err(bad_cell(row, "<missing>".to_string())),
            })
            .collect(),
    }
}

fn reduce_column<'a>(
    column: &Column,
    name: &str,
    func: AggregationFunction,
    buckets: impl Iterator<Item = &'a Vec<usize>>,
) -> PipelineResult<Column> {
    match column {
        Column::Numeric(values) => Ok(Column::Numeric(
            buckets
                .map(|rows| {
                    let present: Vec<f64> = rows.iter().filter_map(|&r| values[r]).collect();
                    reduce(func, &present)
                })
                .collect(),
        )),
        _ if !func.accepts_text() => Err(PipelineError::config(
            Stage::Resample,
            format!(
                "aggregation `{}` requires a numeric column, `{}` is not numeric",
                func.as_str(),
                name
            ),
        )),
        _ if func == AggregationFunction::Count => Ok(Column::Numeric(
            buckets
                .map(|rows| Some(rows.iter().filter(|&&r| !column.is_missing(r)).count() as f64))
                .collect(),
        )),
        _ => {
            let firsts: Vec<Option<usize>> = buckets
                .map(|rows| rows.iter().copied().find(|&r| !column.is_missing(r)))
                .collect();
            Ok(column.take(&firsts))
        }
    }
}

/// Reduce the present values of one bucket.
pub fn reduce(func: AggregationFunction, values: &[f64]) -> Option<f64> {
    let n = values.len();
    match func {
        AggregationFunction::Sum => Some(values.iter().sum()),
        AggregationFunction::Count => Some(n as f64),
        AggregationFunction::First => values.first().copied(),
        _ if n == 0 => None,
        AggregationFunction::Mean => Some(values.iter().sum::<f64>() / n as f64),
        AggregationFunction::Min => values.iter().copied().reduce(f64::min),
        AggregationFunction::Max => values.iter().copied().reduce(f64::max),
        AggregationFunction::Median => {
            let mut sorted = values.to_vec();
            sorted.sort_by(f64::total_cmp);
            let mid = n / 2;
            if n % 2 == 0 {
                Some((sorted[mid - 1] + sorted[mid]) / 2.0)
            } else {
                Some(sorted[mid])
            }
        }
        AggregationFunction::Std => sample_std(values),
    }
}

/// Sample standard deviation (n - 1 denominator); `None` below two values.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    Some(var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn daily_sales() -> Table {
        // 2024-01-01 (Mon) .. 2024-01-10 (Wed), shuffled to check ordering.
        let days = [3, 1, 2, 4, 5, 6, 7, 8, 9, 10];
        Table::from_columns([
            (
                "date".to_string(),
                Column::Text(days.iter().map(|d| Some(format!("2024-01-{:02}", d))).collect()),
            ),
            (
                "units".to_string(),
                Column::Numeric(days.iter().map(|d| Some(*d as f64)).collect()),
            ),
            (
                "store".to_string(),
                Column::Text(days.iter().map(|d| Some(format!("s{}", d))).collect()),
            ),
            (
                "ignored".to_string(),
                Column::Numeric(vec![Some(0.0); days.len()]),
            ),
        ])
        .unwrap()
    }

    #[test]
    fn weekly_sum_produces_one_row_per_week() {
        let out = resample(
            &daily_sales(),
            "date",
            Granularity::Weekly,
            &[("units".to_string(), AggregationFunction::Sum)],
        )
        .unwrap();

        assert_eq!(out.column_names(), &["date", "units"]);
        assert_eq!(
            out.column("date").unwrap(),
            &Column::Date(vec![Some(ymd(2024, 1, 7)), Some(ymd(2024, 1, 14))])
        );
        assert_eq!(out.numeric("units").unwrap(), &[Some(28.0), Some(27.0)]);
    }

    #[test]
    fn first_takes_input_order_and_works_on_text() {
        let out = resample(
            &daily_sales(),
            "date",
            Granularity::Monthly,
            &[
                ("units".to_string(), AggregationFunction::First),
                ("store".to_string(), AggregationFunction::First),
            ],
        )
        .unwrap();

        assert_eq!(out.numeric("units").unwrap(), &[Some(3.0)]);
        assert_eq!(
            out.column("store").unwrap(),
            &Column::Text(vec![Some("s3".to_string())])
        );
    }

    #[test]
    fn numeric_functions_reject_text_columns() {
        let err = resample(
            &daily_sales(),
            "date",
            Granularity::Weekly,
            &[("store".to_string(), AggregationFunction::Mean)],
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Config { stage: Stage::Resample, .. }));
    }

    #[test]
    fn unparsable_dates_fail_the_call() {
        let table = Table::from_columns([
            (
                "date".to_string(),
                Column::Text(vec![Some("2024-01-01".into()), Some("yesterday".into())]),
            ),
            ("units".to_string(), Column::Numeric(vec![Some(1.0), Some(2.0)])),
        ])
        .unwrap();

        let err = resample(
            &table,
            "date",
            Granularity::Daily,
            &[("units".to_string(), AggregationFunction::Sum)],
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Computation { .. }));
        assert!(err.to_string().contains("yesterday"));
    }

    #[test]
    fn missing_mapped_column_is_a_config_error() {
        let err = resample(
            &daily_sales(),
            "date",
            Granularity::Weekly,
            &[("revenue".to_string(), AggregationFunction::Sum)],
        )
        .unwrap_err();
        assert!(err.to_string().contains("revenue"));
    }

    #[test]
    fn reducers_follow_sample_statistics() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(reduce(AggregationFunction::Mean, &values), Some(2.5));
        assert_eq!(reduce(AggregationFunction::Median, &values), Some(2.5));
        assert_eq!(reduce(AggregationFunction::Min, &values), Some(1.0));
        assert_eq!(reduce(AggregationFunction::Max, &values), Some(4.0));
        assert_eq!(reduce(AggregationFunction::Count, &values), Some(4.0));
        let std = reduce(AggregationFunction::Std, &values).unwrap();
        assert!((std - 1.290_994_448_735_805_6).abs() < 1e-12);

        assert_eq!(reduce(AggregationFunction::Sum, &[]), Some(0.0));
        assert_eq!(reduce(AggregationFunction::Mean, &[]), None);
        assert_eq!(reduce(AggregationFunction::Std, &[5.0]), None);
    }

    #[test]
    fn buckets_stay_within_input_span() {
        let table = daily_sales();
        let out = resample(
            &table,
            "date",
            Granularity::Weekly,
            &[("units".to_string(), AggregationFunction::Mean)],
        )
        .unwrap();

        let Column::Date(labels) = out.column("date").unwrap() else {
            panic!("date column must be typed");
        };
        for label in labels.iter().flatten() {
            let start = period::bucket_start(Granularity::Weekly, *label);
            assert!(start <= ymd(2024, 1, 10));
            assert!(*label >= ymd(2024, 1, 1));
        }
    }
}
