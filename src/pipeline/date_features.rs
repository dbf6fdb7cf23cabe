//! Calendar-derived feature columns.

use std::f64::consts::PI;

use chrono::{Datelike, NaiveDate};

use super::error::{AtStage, PipelineError, PipelineResult, Stage};
use crate::models::DateFeatureConfig;
use crate::table::{Column, Table};

pub type DateFeatureFn = fn(NaiveDate) -> f64;

fn month(d: NaiveDate) -> f64 {
    f64::from(d.month())
}

fn quarter(d: NaiveDate) -> f64 {
    f64::from((d.month() - 1) / 3 + 1)
}

fn year(d: NaiveDate) -> f64 {
    f64::from(d.year())
}

fn month_sin(d: NaiveDate) -> f64 {
    (2.0 * PI * month(d) / 12.0).sin()
}

fn month_cos(d: NaiveDate) -> f64 {
    (2.0 * PI * month(d) / 12.0).cos()
}

fn quarter_sin(d: NaiveDate) -> f64 {
    (2.0 * PI * quarter(d) / 4.0).sin()
}

fn quarter_cos(d: NaiveDate) -> f64 {
    (2.0 * PI * quarter(d) / 4.0).cos()
}

// No holiday calendar is bundled; these switches yield constant zero columns.
fn holiday_placeholder(_: NaiveDate) -> f64 {
    0.0
}

/// The ordered `(column name, compute fn)` pairs enabled by `config`.
pub fn date_feature_plan(config: &DateFeatureConfig) -> Vec<(String, DateFeatureFn)> {
    let catalog: [(bool, &str, DateFeatureFn); 12] = [
        (config.month, "month", month),
        (config.year, "year", year),
        (config.quarter, "quarter", quarter),
        (config.month_sin, "month_sin", month_sin),
        (config.month_cos, "month_cos", month_cos),
        (config.quarter_sin, "quarter_sin", quarter_sin),
        (config.quarter_cos, "quarter_cos", quarter_cos),
        (
            config.number_of_holidays_governmental,
            "number_of_holidays_governmental",
            holiday_placeholder,
        ),
        (
            config.number_of_holidays_religious,
            "number_of_holidays_religious",
            holiday_placeholder,
        ),
        (
            config.periods_until_next_governmental_holiday,
            "periods_until_next_governmental_holiday",
            holiday_placeholder,
        ),
        (
            config.periods_until_next_religious_holiday,
            "periods_until_next_religious_holiday",
            holiday_placeholder,
        ),
        (
            config.number_of_ramadan_days_in_month,
            "number_of_ramadan_days_in_month",
            holiday_placeholder,
        ),
    ];

    catalog
        .into_iter()
        .filter(|(enabled, _, _)| *enabled)
        .map(|(_, name, compute)| (format!("date_{}", name), compute))
        .collect()
}

/// Append the enabled date features to `table`, returning the new column names.
pub fn add_date_features(
    table: &mut Table,
    date_column: &str,
    config: &DateFeatureConfig,
) -> PipelineResult<Vec<String>> {
    let dates = match table.column(date_column).at(Stage::DateFeatures)? {
        Column::Date(dates) => dates.clone(),
        _ => {
            return Err(PipelineError::config(
                Stage::DateFeatures,
                format!("column `{}` does not hold dates", date_column),
            ))
        }
    };

    let mut added = Vec::new();
    for (name, compute) in date_feature_plan(config) {
        let values = dates.iter().map(|d| d.map(compute)).collect();
        table
            .push_column(name.clone(), Column::Numeric(values))
            .at(Stage::DateFeatures)?;
        added.push(name);
    }
    Ok(added)
}
