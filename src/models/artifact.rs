use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::aggregation::Granularity;
use super::features::FeatureConfig;
use crate::table::{Record, Table};

/// Number of rows returned by artifact GET endpoints.
pub const ARTIFACT_PREVIEW_ROWS: usize = 20;
/// Number of rows returned directly by an aggregation run.
pub const AGGREGATION_SAMPLE_ROWS: usize = 10;
/// Number of rows returned directly by a feature run.
pub const FEATURE_SAMPLE_ROWS: usize = 5;

/// A materialized table: its records plus the column list and row count
/// that always agree with them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactData {
    pub columns: Vec<String>,
    pub row_count: usize,
    pub data: Vec<Record>,
}

impl ArtifactData {
    pub fn from_table(table: &Table) -> Self {
        let data = table.to_records();
        Self {
            columns: table.column_names().to_vec(),
            row_count: data.len(),
            data,
        }
    }

    pub fn sample(&self, n: usize) -> Vec<Record> {
        self.data.iter().take(n).cloned().collect()
    }
}

/// The merged, period-aligned output of an aggregation run.
///
/// At most one is live per project; a new run replaces it wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedArtifact {
    pub id: Uuid,
    pub project_id: Uuid,
    pub period: Granularity,
    #[serde(flatten)]
    pub table: ArtifactData,
    pub created_at: DateTime<Utc>,
}

/// The feature-enriched table derived from the live aggregated artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureArtifact {
    pub id: Uuid,
    pub project_id: Uuid,
    #[serde(flatten)]
    pub table: ArtifactData,
    pub feature_config: FeatureConfig,
    pub created_at: DateTime<Utc>,
}

/// Truncated view of a stored aggregated artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedPreview {
    pub id: Uuid,
    pub project_id: Uuid,
    pub period: Granularity,
    pub row_count: usize,
    pub columns: Vec<String>,
    pub sample_data: Vec<Record>,
    pub created_at: DateTime<Utc>,
}

impl AggregatedArtifact {
    pub fn preview(&self, rows: usize) -> AggregatedPreview {
        AggregatedPreview {
            id: self.id,
            project_id: self.project_id,
            period: self.period,
            row_count: self.table.row_count,
            columns: self.table.columns.clone(),
            sample_data: self.table.sample(rows),
            created_at: self.created_at,
        }
    }
}

/// Truncated view of a stored feature artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturePreview {
    pub id: Uuid,
    pub project_id: Uuid,
    pub row_count: usize,
    pub columns: Vec<String>,
    pub sample_data: Vec<Record>,
    pub feature_config: FeatureConfig,
    pub created_at: DateTime<Utc>,
}

impl FeatureArtifact {
    pub fn preview(&self, rows: usize) -> FeaturePreview {
        FeaturePreview {
            id: self.id,
            project_id: self.project_id,
            row_count: self.table.row_count,
            columns: self.table.columns.clone(),
            sample_data: self.table.sample(rows),
            feature_config: self.feature_config.clone(),
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub min: NaiveDate,
    pub max: NaiveDate,
}

/// Response of an aggregation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationSummary {
    pub aggregated_data_id: Uuid,
    pub period: Granularity,
    pub row_count: usize,
    pub columns: Vec<String>,
    pub sample_data: Vec<Record>,
    pub date_range: Option<DateRange>,
}

/// Response of a feature generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSummary {
    pub feature_data_id: Uuid,
    /// Columns added by this run, in generation order.
    pub generated_features: Vec<String>,
    pub total_features: usize,
    pub row_count: usize,
    pub sample_data: Vec<Record>,
}
