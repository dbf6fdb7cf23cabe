//! The aggregation and feature engineering pipeline.
//!
//! Raw sources flow through these stages:
//!
//! 1. [`resample`]: each source is bucketed into periods.
//! 2. [`gap_fill`]: secondaries are reindexed onto the primary's period grid.
//! 3. [`merge`]: secondaries are left-joined onto the primary.
//! 4. [`date_features`] and [`numerical_features`]: derived columns are
//!    appended to the stored aggregated table.
//!
//! Every stage is a pure function over [`Table`]s. [`run`] wires them to the
//! project bookkeeping and the artifact store.

pub mod date_features;
mod error;
pub mod gap_fill;
pub mod merge;
pub mod numerical_features;
pub mod period;
pub mod resample;
pub mod run;

pub use error::{PipelineError, PipelineResult, Stage};
pub use run::{run_aggregation, run_features, ArtifactStore};

use crate::models::{AggregationFunction, DateRange, FillPolicy, Granularity};
use crate::table::{Column, Table};
use error::AtStage;
use merge::MergeInput;

/// The project's main series and how to reduce it.
#[derive(Debug, Clone)]
pub struct PrimarySeries {
    pub table: Table,
    pub date_column: String,
    pub aggregations: Vec<(String, AggregationFunction)>,
    pub group_column: Option<String>,
}

/// An additional series merged onto the primary.
#[derive(Debug, Clone)]
pub struct SecondarySeries {
    pub table: Table,
    pub date_column: String,
    pub aggregations: Vec<(String, AggregationFunction)>,
    pub fill: FillPolicy,
    pub group_column: Option<String>,
}

/// Output of [`aggregate`].
#[derive(Debug, Clone)]
pub struct Aggregated {
    pub table: Table,
    /// First and last period of the resampled primary; `None` when it is empty.
    pub date_range: Option<DateRange>,
}

/// Resample the primary, align every secondary to its period grid and merge.
pub fn aggregate(
    primary: PrimarySeries,
    secondaries: Vec<SecondarySeries>,
    granularity: Granularity,
) -> PipelineResult<Aggregated> {
    let resampled = resample::resample(
        &primary.table,
        &primary.date_column,
        granularity,
        &primary.aggregations,
    )?;
    let date_range = date_span(&resampled, &primary.date_column);

    let mut inputs = Vec::with_capacity(secondaries.len());
    for secondary in secondaries {
        let mut aggregations = secondary.aggregations;
        if let Some(group) = &secondary.group_column {
            if !aggregations.iter().any(|(name, _)| name == group) {
                aggregations.push((group.clone(), AggregationFunction::First));
            }
        }

        let bucketed = resample::resample(
            &secondary.table,
            &secondary.date_column,
            granularity,
            &aggregations,
        )?;
        let mut aligned = match date_range {
            Some(range) => gap_fill::fill_gaps(
                &bucketed,
                &secondary.date_column,
                range.min,
                range.max,
                granularity,
                secondary.fill,
            )?,
            None => bucketed.head(0),
        };
        aligned
            .rename_column(&secondary.date_column, &primary.date_column)
            .at(Stage::Merge)?;

        inputs.push(MergeInput {
            table: aligned,
            group_column: secondary.group_column,
        });
    }

    let table = merge::merge_horizontal(
        resampled,
        inputs,
        &primary.date_column,
        primary.group_column.as_deref(),
    )?;
    Ok(Aggregated { table, date_range })
}

fn date_span(table: &Table, date_column: &str) -> Option<DateRange> {
    let Ok(Column::Date(dates)) = table.column(date_column) else {
        return None;
    };
    let min = dates.iter().flatten().min().copied()?;
    let max = dates.iter().flatten().max().copied()?;
    Some(DateRange { min, max })
}

