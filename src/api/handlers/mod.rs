use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::db::Database;
use crate::models::*;
use crate::pipeline::{self, run, PipelineError};

/// Leading rows shown when previewing a primary source.
const SOURCE_PREVIEW_ROWS: usize = 5;
/// Leading rows shown when previewing a secondary source.
const SECONDARY_PREVIEW_ROWS: usize = 10;

type ApiResult<T> = Result<T, (StatusCode, String)>;

// ============================================================
// Error Handling
// ============================================================

/// Log an internal error and return a sanitized response to the client.
/// The full error is logged server-side for debugging, but clients only
/// see a generic message to avoid leaking internal details.
fn internal_error(e: impl std::fmt::Display) -> (StatusCode, String) {
    tracing::error!("Internal error: {:#}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

/// Pipeline failures caused by the request (bad source, mapping or
/// parameters) are returned to the client as-is.
fn pipeline_error(e: PipelineError) -> (StatusCode, String) {
    match e {
        PipelineError::ProjectNotFound(_) => (StatusCode::NOT_FOUND, "Project not found".to_string()),
        PipelineError::Store(err) => internal_error(format!("{:#}", err)),
        other => {
            tracing::warn!("Pipeline run rejected: {}", other);
            (StatusCode::BAD_REQUEST, other.to_string())
        }
    }
}

fn not_found(what: &str) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("{} not found", what))
}

/// Run blocking work (file reads, pipeline computation) off the async executor.
async fn blocking<T, F>(work: F) -> ApiResult<T>
where
    F: FnOnce() -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(internal_error)?
}

fn require_project(db: &Database, id: Uuid) -> ApiResult<Project> {
    db.get_project(id)
        .map_err(internal_error)?
        .ok_or_else(|| not_found("Project"))
}

fn require_source(db: &Database, id: Uuid) -> ApiResult<SecondarySource> {
    db.get_secondary_source(id)
        .map_err(internal_error)?
        .ok_or_else(|| not_found("Source"))
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Projects
// ============================================================

pub async fn list_projects(State(db): State<Database>) -> ApiResult<Json<Vec<Project>>> {
    db.get_all_projects().map(Json).map_err(internal_error)
}

pub async fn get_project(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Project>> {
    require_project(&db, id).map(Json)
}

pub async fn create_project(
    State(db): State<Database>,
    Json(input): Json<CreateProjectInput>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    if input.name.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Project name is required".to_string()));
    }
    db.create_project(input)
        .map(|p| (StatusCode::CREATED, Json(p)))
        .map_err(internal_error)
}

pub async fn update_project(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateProjectInput>,
) -> ApiResult<Json<Project>> {
    db.update_project(id, input)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("Project"))
}

pub async fn delete_project(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if db.delete_project(id).map_err(internal_error)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Project"))
    }
}

pub async fn set_project_columns(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
    Json(mapping): Json<ColumnMapping>,
) -> ApiResult<Json<Project>> {
    db.set_column_mapping(id, mapping)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("Project"))
}

pub async fn preview_project_source(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DataSourceInfo>> {
    let project = require_project(&db, id)?;
    let source = project.source.ok_or((
        StatusCode::BAD_REQUEST,
        "Project has no data source".to_string(),
    ))?;

    blocking(move || {
        let table = run::load_source(&source).map_err(pipeline_error)?;
        Ok(Json(DataSourceInfo {
            source_type: source.kind().to_string(),
            columns: table.column_names().to_vec(),
            row_count: table.row_count(),
            sample_data: table.head(SOURCE_PREVIEW_ROWS).to_records(),
        }))
    })
    .await
}

// ============================================================
// Secondary sources
// ============================================================

pub async fn list_sources(
    State(db): State<Database>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<Vec<SecondarySource>>> {
    require_project(&db, project_id)?;
    db.get_secondary_sources(project_id)
        .map(Json)
        .map_err(internal_error)
}

pub async fn create_source(
    State(db): State<Database>,
    Path(project_id): Path<Uuid>,
    Json(input): Json<CreateSecondarySourceInput>,
) -> ApiResult<(StatusCode, Json<SecondarySource>)> {
    require_project(&db, project_id)?;
    db.create_secondary_source(project_id, input)
        .map(|s| (StatusCode::CREATED, Json(s)))
        .map_err(internal_error)
}

pub async fn get_source(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SecondarySource>> {
    require_source(&db, id).map(Json)
}

pub async fn map_source_columns(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
    Json(input): Json<MapSourceColumnsInput>,
) -> ApiResult<Json<SecondarySource>> {
    if input.selected_columns.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "At least one column must be selected".to_string(),
        ));
    }
    db.map_secondary_columns(id, input)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("Source"))
}

pub async fn preview_source(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SecondarySourcePreview>> {
    let source = require_source(&db, id)?;

    blocking(move || {
        let table = run::load_secondary(&source).map_err(pipeline_error)?;
        Ok(Json(SecondarySourcePreview {
            columns: table.column_names().to_vec(),
            row_count: table.row_count(),
            sample_data: table.head(SECONDARY_PREVIEW_ROWS).to_records(),
            date_column: source.date_column,
            selected_columns: source.selected_columns,
            column_aggregations: source.column_aggregations,
        }))
    })
    .await
}

pub async fn delete_source(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if db.delete_secondary_source(id).map_err(internal_error)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Source"))
    }
}

// ============================================================
// Aggregation
// ============================================================

pub async fn aggregate(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
    Json(config): Json<AggregationConfig>,
) -> ApiResult<Json<AggregationSummary>> {
    blocking(move || {
        pipeline::run_aggregation(&db, id, &config)
            .map(Json)
            .map_err(pipeline_error)
    })
    .await
}

pub async fn get_aggregated_data(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AggregatedPreview>> {
    require_project(&db, id)?;
    db.get_aggregated_artifact(id)
        .map_err(internal_error)?
        .map(|artifact| Json(artifact.preview(ARTIFACT_PREVIEW_ROWS)))
        .ok_or((
            StatusCode::NOT_FOUND,
            "No aggregated data found".to_string(),
        ))
}

pub async fn delete_aggregated_data(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    require_project(&db, id)?;
    let deleted = db.delete_aggregated_artifact(id).map_err(internal_error)?;
    Ok(Json(serde_json::json!({
        "message": format!("Deleted {} aggregated data record(s)", deleted)
    })))
}

// ============================================================
// Features
// ============================================================

pub async fn generate_features(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
    Json(config): Json<FeatureConfig>,
) -> ApiResult<Json<FeatureSummary>> {
    blocking(move || {
        pipeline::run_features(&db, id, &config)
            .map(Json)
            .map_err(pipeline_error)
    })
    .await
}

pub async fn get_feature_data(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<FeaturePreview>> {
    require_project(&db, id)?;
    db.get_feature_artifact(id)
        .map_err(internal_error)?
        .map(|artifact| Json(artifact.preview(ARTIFACT_PREVIEW_ROWS)))
        .ok_or((StatusCode::NOT_FOUND, "No feature data found".to_string()))
}

pub async fn delete_feature_data(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    require_project(&db, id)?;
    let deleted = db.delete_feature_artifact(id).map_err(internal_error)?;
    Ok(Json(serde_json::json!({
        "message": format!("Deleted {} feature data record(s)", deleted)
    })))
}

// ============================================================
// Option catalogs
// ============================================================

pub async fn aggregation_options() -> Json<AggregationOptions> {
    Json(AggregationOptions::default())
}

pub async fn feature_options() -> Json<FeatureOptions> {
    Json(FeatureOptions::default())
}
