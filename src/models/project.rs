use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::aggregation::Granularity;
use super::features::{DateFeatureConfig, NumericalFeatureConfig};
use crate::table::Record;

/// A modeling project built around one primary time series.
///
/// The project names where the primary data lives and which of its columns
/// carry the date, the target value and (optionally) a product key. The two
/// completion flags track whether the aggregated and feature artifacts are
/// currently live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub source: Option<DataSource>,
    pub date_column: Option<String>,
    pub value_column: Option<String>,
    /// Grouping key used to align multi-entity series.
    pub product_column: Option<String>,
    /// Granularity of the most recent successful aggregation.
    pub aggregation_period: Option<Granularity>,
    pub aggregation_completed: bool,
    pub features_generated: bool,
    /// Feature settings of the most recent successful feature run.
    pub date_features: Option<DateFeatureConfig>,
    pub numerical_features: Option<NumericalFeatureConfig>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Where a project's primary data is read from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "source_type", rename_all = "snake_case")]
pub enum DataSource {
    /// A CSV or JSON file on the local file system.
    File { file_path: String },
    /// A table or query in a SQLite database file.
    Db {
        database_path: String,
        table_name: Option<String>,
        query: Option<String>,
    },
}

impl DataSource {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::File { .. } => "file",
            Self::Db { .. } => "db",
        }
    }
}

/// Input for creating a new project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProjectInput {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub source: Option<DataSource>,
}

/// Input for updating an existing project. All fields are optional for partial updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProjectInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub source: Option<DataSource>,
    pub date_column: Option<String>,
    pub value_column: Option<String>,
    pub product_column: Option<String>,
}

/// Input for mapping the primary source's columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub date_column: String,
    pub value_column: String,
    pub product_column: Option<String>,
}

/// Shape and leading rows of a raw source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceInfo {
    pub source_type: String,
    pub columns: Vec<String>,
    pub row_count: usize,
    pub sample_data: Vec<Record>,
}
