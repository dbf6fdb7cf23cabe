//! Lag, rolling-window, trend and change columns over numeric series.

use super::error::{AtStage, PipelineError, PipelineResult, Stage};
use super::resample::sample_std;
use crate::models::NumericalFeatureConfig;
use crate::table::{Column, Table};

/// One derived series, computed from a single target column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesFeature {
    Lag(usize),
    RollingMean(usize),
    RollingStd(usize),
    RollingMin(usize),
    RollingMax(usize),
    Trend(usize),
    Change(usize),
}

impl SeriesFeature {
    fn suffix(&self) -> String {
        match self {
            Self::Lag(k) => format!("lag_{}", k),
            Self::RollingMean(w) => format!("rolling_{}_mean", w),
            Self::RollingStd(w) => format!("rolling_{}_std", w),
            Self::RollingMin(w) => format!("rolling_{}_min", w),
            Self::RollingMax(w) => format!("rolling_{}_max", w),
            Self::Trend(p) => format!("trend_{}", p),
            Self::Change(p) => format!("change_{}", p),
        }
    }

    /// Rows the series must have for this feature to produce any value.
    fn rows_required(&self) -> usize {
        match *self {
            Self::Lag(k) | Self::Change(k) => k.saturating_add(1),
            Self::RollingMean(w)
            | Self::RollingStd(w)
            | Self::RollingMin(w)
            | Self::RollingMax(w)
            | Self::Trend(w) => w,
        }
    }

    /// Rows missing this feature are removed from the output. Change columns
    /// may legitimately stay missing (zero denominator) and are kept.
    pub fn drops_missing_rows(&self) -> bool {
        !matches!(self, Self::Change(_))
    }

    pub fn compute(&self, values: &[Option<f64>]) -> Vec<Option<f64>> {
        match *self {
            Self::Lag(k) => (0..values.len())
                .map(|t| if t >= k { values[t - k] } else { None })
                .collect(),
            Self::RollingMean(w) => rolling(values, w, |xs| {
                Some(xs.iter().sum::<f64>() / xs.len() as f64)
            }),
            Self::RollingStd(w) => rolling(values, w, sample_std),
            Self::RollingMin(w) => rolling(values, w, |xs| xs.iter().copied().reduce(f64::min)),
            Self::RollingMax(w) => rolling(values, w, |xs| xs.iter().copied().reduce(f64::max)),
            Self::Trend(p) => rolling(values, p, ols_slope),
            Self::Change(p) => (0..values.len())
                .map(|t| {
                    if t < p {
                        return None;
                    }
                    match (values[t], values[t - p]) {
                        (Some(now), Some(before)) if before != 0.0 => Some((now - before) / before),
                        _ => None,
                    }
                })
                .collect(),
        }
    }
}

/// Apply `f` over every full trailing window of `w` present values.
fn rolling(
    values: &[Option<f64>],
    w: usize,
    f: impl Fn(&[f64]) -> Option<f64>,
) -> Vec<Option<f64>> {
    let mut window = Vec::with_capacity(w);
    (0..values.len())
        .map(|t| {
            if t + 1 < w {
                return None;
            }
            window.clear();
            for v in &values[t + 1 - w..=t] {
                window.push((*v)?);
            }
            f(&window)
        })
        .collect()
}

/// Least squares slope of `ys` against `0..n`.
fn ols_slope(ys: &[f64]) -> Option<f64> {
    let n = ys.len() as f64;
    if ys.len() < 2 {
        return None;
    }
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = ys.iter().sum::<f64>() / n;
    let (mut cov, mut var) = (0.0, 0.0);
    for (i, y) in ys.iter().enumerate() {
        let dx = i as f64 - x_mean;
        cov += dx * (y - y_mean);
        var += dx * dx;
    }
    Some(cov / var)
}

/// Column name prefix for a target: lower-cased, spaces as underscores.
pub fn feature_prefix(column: &str) -> String {
    column.to_lowercase().replace(' ', "_")
}

/// `values` without repeats, in first-seen order.
fn distinct<T: PartialEq + Clone>(values: &[T]) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(values.len());
    for v in values {
        if !out.contains(v) {
            out.push(v.clone());
        }
    }
    out
}

/// The ordered `(column name, feature)` pairs `config` asks for on one target.
/// Repeated parameters yield a single column.
pub fn numerical_feature_plan(
    target: &str,
    config: &NumericalFeatureConfig,
) -> Vec<(String, SeriesFeature)> {
    let mut features: Vec<SeriesFeature> = distinct(&config.lag_periods)
        .into_iter()
        .map(SeriesFeature::Lag)
        .collect();

    for w in distinct(&config.rolling_windows) {
        if config.include_statistics {
            features.extend([
                SeriesFeature::RollingMean(w),
                SeriesFeature::RollingStd(w),
                SeriesFeature::RollingMin(w),
                SeriesFeature::RollingMax(w),
            ]);
        } else {
            features.push(SeriesFeature::RollingMean(w));
        }
    }

    if config.include_trend_features {
        features.extend(distinct(&config.trend_periods).into_iter().map(SeriesFeature::Trend));
    }
    features.extend(distinct(&config.change_periods).into_iter().map(SeriesFeature::Change));

    let prefix = feature_prefix(target);
    features
        .into_iter()
        .map(|f| {
            // Plain rolling means keep the short name.
            let suffix = match f {
                SeriesFeature::RollingMean(w) if !config.include_statistics => {
                    format!("rolling_{}", w)
                }
                _ => f.suffix(),
            };
            (format!("{}_{}", prefix, suffix), f)
        })
        .collect()
}

fn validate(config: &NumericalFeatureConfig) -> PipelineResult<()> {
    let groups = [
        ("lag_periods", &config.lag_periods, 1),
        ("rolling_windows", &config.rolling_windows, 1),
        ("trend_periods", &config.trend_periods, 2),
        ("change_periods", &config.change_periods, 1),
    ];
    for (name, values, min) in groups {
        if let Some(bad) = values.iter().find(|&&v| v < min) {
            return Err(PipelineError::config(
                Stage::NumericalFeatures,
                format!("{} must be at least {}, got {}", name, min, bad),
            ));
        }
    }
    Ok(())
}

/// Sort `table` by date, append numerical features for every target and drop
/// rows left without a lag, rolling or trend value.
///
/// Returns the new table and the generated column names in order.
pub fn add_numerical_features(
    table: &Table,
    date_column: &str,
    targets: &[String],
    config: &NumericalFeatureConfig,
) -> PipelineResult<(Table, Vec<String>)> {
    validate(config)?;

    let mut out = table.sort_by_date(date_column).at(Stage::NumericalFeatures)?;
    let rows = out.row_count();
    let mut added = Vec::new();
    let mut droppable = Vec::new();

    let targets = distinct(targets);
    for (i, target) in targets.iter().enumerate() {
        if let Some(other) = targets[..i]
            .iter()
            .find(|other| feature_prefix(other) == feature_prefix(target))
        {
            return Err(PipelineError::config(
                Stage::NumericalFeatures,
                format!(
                    "target columns `{}` and `{}` would produce the same feature names",
                    other, target
                ),
            ));
        }
    }

    for target in &targets {
        let values = match out.column(target) {
            Ok(Column::Numeric(values)) => values.clone(),
            Ok(_) => {
                return Err(PipelineError::config(
                    Stage::NumericalFeatures,
                    format!("target column `{}` is not numeric", target),
                ))
            }
            Err(e) => return Err(PipelineError::config(Stage::NumericalFeatures, e)),
        };

        for (name, feature) in numerical_feature_plan(target, config) {
            if feature.rows_required() > rows {
                return Err(PipelineError::computation(
                    Stage::NumericalFeatures,
                    format!(
                        "`{}` needs at least {} rows, the series has {}",
                        name,
                        feature.rows_required(),
                        rows
                    ),
                ));
            }
            out.push_column(name.clone(), Column::Numeric(feature.compute(&values)))
                .at(Stage::NumericalFeatures)?;
            if feature.drops_missing_rows() {
                droppable.push(name.clone());
            }
            added.push(name);
        }
    }

    let mut complete = vec![true; rows];
    for name in &droppable {
        let column = out.column(name).at(Stage::NumericalFeatures)?;
        for (row, keep) in complete.iter_mut().enumerate() {
            *keep = *keep && !column.is_missing(row);
        }
    }
    let out = out.filter_rows(|row| complete[row]);

    tracing::debug!(
        "Generated {} numerical features, {} of {} rows kept",
        added.len(),
        out.row_count(),
        rows
    );
    Ok((out, added))
}
