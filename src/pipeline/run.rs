//! Project-level pipeline runs: load sources, compute, persist the artifact.

use std::path::Path;

use chrono::Utc;
use uuid::Uuid;

use super::error::{AtStage, PipelineError, PipelineResult, Stage};
use super::{aggregate, date_features, numerical_features, PrimarySeries, SecondarySeries};
use crate::models::{
    AggregatedArtifact, AggregationConfig, AggregationFunction, AggregationSummary, ArtifactData,
    DataSource, FeatureArtifact, FeatureConfig, FeatureSummary, Project, SecondarySource,
    AGGREGATION_SAMPLE_ROWS, FEATURE_SAMPLE_ROWS,
};
use crate::table::{readers, Table};

/// Persistence needed by a pipeline run.
///
/// The `replace_*` methods must be atomic: the previous artifact of the
/// project is removed and the new one stored, together with the project's
/// completion flag, or nothing changes at all.
pub trait ArtifactStore {
    fn project(&self, id: Uuid) -> anyhow::Result<Option<Project>>;

    fn secondary_sources(&self, project_id: Uuid) -> anyhow::Result<Vec<SecondarySource>>;

    fn aggregated_artifact(&self, project_id: Uuid) -> anyhow::Result<Option<AggregatedArtifact>>;

    fn replace_aggregated(&self, artifact: &AggregatedArtifact) -> anyhow::Result<()>;

    fn replace_features(&self, artifact: &FeatureArtifact) -> anyhow::Result<()>;
}

/// Read a project's primary source.
pub fn load_source(source: &DataSource) -> PipelineResult<Table> {
    let loaded = match source {
        DataSource::File { file_path } => readers::read_file(Path::new(file_path)),
        DataSource::Db {
            database_path,
            table_name,
            query,
        } => readers::read_sqlite(
            Path::new(database_path),
            table_name.as_deref(),
            query.as_deref(),
        ),
    };
    loaded.map_err(|e| PipelineError::source_read(Stage::Load, format!("{:#}", e)))
}

/// Read a secondary source's file.
pub fn load_secondary(source: &SecondarySource) -> PipelineResult<Table> {
    readers::read_file(Path::new(&source.file_path)).map_err(|e| {
        PipelineError::source_read(Stage::Load, format!("source `{}`: {:#}", source.name, e))
    })
}

fn find_project<S: ArtifactStore + ?Sized>(store: &S, id: Uuid) -> PipelineResult<Project> {
    store.project(id)?.ok_or(PipelineError::ProjectNotFound(id))
}

fn required<'a>(value: &'a Option<String>, what: &str) -> PipelineResult<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| PipelineError::config(Stage::Load, format!("the {} column must be set", what)))
}

/// Aggregate a project's primary and mapped secondary sources and store the
/// result as the project's aggregated artifact.
pub fn run_aggregation<S: ArtifactStore + ?Sized>(
    store: &S,
    project_id: Uuid,
    config: &AggregationConfig,
) -> PipelineResult<AggregationSummary> {
    let project = find_project(store, project_id)?;
    let date_column = required(&project.date_column, "date")?;
    let value_column = required(&project.value_column, "value")?;
    let source = project
        .source
        .as_ref()
        .ok_or_else(|| PipelineError::config(Stage::Load, "the project has no data source"))?;
    let granularity = config.period.granularity();

    tracing::info!(
        "Aggregating project {} to {} periods ({} of `{}`)",
        project_id,
        granularity.as_str(),
        config.main_value_aggregation.as_str(),
        value_column
    );

    let table = load_source(source)?;
    let group_column = project
        .product_column
        .clone()
        .filter(|column| table.has_column(column));
    let mut aggregations = vec![(value_column.to_string(), config.main_value_aggregation)];
    if let Some(group) = &group_column {
        aggregations.push((group.clone(), AggregationFunction::First));
    }
    let primary = PrimarySeries {
        table,
        date_column: date_column.to_string(),
        aggregations,
        group_column,
    };

    let mut secondaries = Vec::new();
    for source in store.secondary_sources(project_id)? {
        let Some(source_date) = source.date_column.clone().filter(|_| source.is_mapped()) else {
            tracing::debug!("Skipping unmapped secondary source {}", source.name);
            continue;
        };
        secondaries.push(SecondarySeries {
            table: load_secondary(&source)?,
            date_column: source_date,
            aggregations: source.aggregations(),
            fill: source.fill_method,
            group_column: source.product_column.clone(),
        });
    }
    let merged_sources = secondaries.len();

    let aggregated = aggregate(primary, secondaries, granularity)?;
    let artifact = AggregatedArtifact {
        id: Uuid::new_v4(),
        project_id,
        period: granularity,
        table: ArtifactData::from_table(&aggregated.table),
        created_at: Utc::now(),
    };
    store.replace_aggregated(&artifact)?;

    tracing::info!(
        "Stored aggregated data {} for project {}: {} rows, {} secondary sources",
        artifact.id,
        project_id,
        artifact.table.row_count,
        merged_sources
    );

    Ok(AggregationSummary {
        aggregated_data_id: artifact.id,
        period: artifact.period,
        row_count: artifact.table.row_count,
        columns: artifact.table.columns.clone(),
        sample_data: artifact.table.sample(AGGREGATION_SAMPLE_ROWS),
        date_range: aggregated.date_range,
    })
}

/// Derive date and numerical features from the project's aggregated artifact
/// and store them as the project's feature artifact.
pub fn run_features<S: ArtifactStore + ?Sized>(
    store: &S,
    project_id: Uuid,
    config: &FeatureConfig,
) -> PipelineResult<FeatureSummary> {
    let project = find_project(store, project_id)?;
    let date_column = required(&project.date_column, "date")?;

    let not_aggregated =
        || PipelineError::config(Stage::Load, "aggregation must be completed before generating features");
    if !project.aggregation_completed {
        return Err(not_aggregated());
    }
    let aggregated = store
        .aggregated_artifact(project_id)?
        .ok_or_else(not_aggregated)?;

    tracing::info!(
        "Generating features for project {} from {} aggregated rows",
        project_id,
        aggregated.table.row_count
    );

    let mut table = Table::from_records(
        &aggregated.table.columns,
        &aggregated.table.data,
        &[date_column],
    )
    .at(Stage::Load)?;
    let mut generated =
        date_features::add_date_features(&mut table, date_column, &config.date_features)?;

    let numerical = &config.numerical_features;
    let targets: Vec<String> = if numerical.target_columns.is_empty() {
        project.value_column.iter().cloned().collect()
    } else {
        numerical.target_columns.clone()
    };
    let (table, added) =
        numerical_features::add_numerical_features(&table, date_column, &targets, numerical)?;
    generated.extend(added);

    let artifact = FeatureArtifact {
        id: Uuid::new_v4(),
        project_id,
        table: ArtifactData::from_table(&table),
        feature_config: config.clone(),
        created_at: Utc::now(),
    };
    store.replace_features(&artifact)?;

    tracing::info!(
        "Stored feature data {} for project {}: {} features, {} rows",
        artifact.id,
        project_id,
        generated.len(),
        artifact.table.row_count
    );

    Ok(FeatureSummary {
        feature_data_id: artifact.id,
        generated_features: generated,
        total_features: artifact.table.columns.len(),
        row_count: artifact.table.row_count,
        sample_data: artifact.table.sample(FEATURE_SAMPLE_ROWS),
    })
}
