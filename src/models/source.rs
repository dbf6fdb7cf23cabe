use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::aggregation::{AggregationFunction, FillPolicy};
use crate::table::Record;

/// An additional dataset merged alongside a project's primary series.
///
/// A secondary source is only used by aggregation once its date column and
/// at least one value column are mapped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecondarySource {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    /// CSV or JSON file holding the data.
    pub file_path: String,
    pub date_column: Option<String>,
    pub selected_columns: Vec<String>,
    /// Per-column reduction; selected columns without an entry use `mean`.
    pub column_aggregations: BTreeMap<String, AggregationFunction>,
    pub fill_method: FillPolicy,
    /// Grouping key, joined against the project's product column.
    pub product_column: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SecondarySource {
    pub fn is_mapped(&self) -> bool {
        self.date_column.is_some() && !self.selected_columns.is_empty()
    }

    /// The reduction for every selected column, in selection order.
    pub fn aggregations(&self) -> Vec<(String, AggregationFunction)> {
        self.selected_columns
            .iter()
            .map(|col| {
                let func = self
                    .column_aggregations
                    .get(col)
                    .copied()
                    .unwrap_or(AggregationFunction::Mean);
                (col.clone(), func)
            })
            .collect()
    }
}

/// Input for registering a secondary source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSecondarySourceInput {
    pub name: String,
    pub file_path: String,
}

/// Input for mapping a secondary source's columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapSourceColumnsInput {
    pub date_column: String,
    pub selected_columns: Vec<String>,
    #[serde(default)]
    pub column_aggregations: BTreeMap<String, AggregationFunction>,
    #[serde(default)]
    pub fill_method: FillPolicy,
    #[serde(default)]
    pub product_column: Option<String>,
}

/// Preview of a secondary source together with its current mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecondarySourcePreview {
    pub columns: Vec<String>,
    pub row_count: usize,
    pub sample_data: Vec<Record>,
    pub date_column: Option<String>,
    pub selected_columns: Vec<String>,
    pub column_aggregations: BTreeMap<String, AggregationFunction>,
}
