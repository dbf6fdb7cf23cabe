mod handlers;

use axum::{
    http::HeaderValue,
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::db::Database;

/// Router with permissive CORS, for local use and tests.
pub fn create_router(db: Database) -> Router {
    create_router_with_config(db, &AppConfig::local())
}

pub fn create_router_with_config(db: Database, config: &AppConfig) -> Router {
    let api = Router::new()
        // Projects
        .route(
            "/projects",
            get(handlers::list_projects).post(handlers::create_project),
        )
        .route(
            "/projects/{id}",
            get(handlers::get_project)
                .put(handlers::update_project)
                .delete(handlers::delete_project),
        )
        .route("/projects/{id}/columns", put(handlers::set_project_columns))
        .route(
            "/projects/{id}/source/preview",
            get(handlers::preview_project_source),
        )
        // Secondary sources
        .route(
            "/projects/{id}/sources",
            get(handlers::list_sources).post(handlers::create_source),
        )
        .route(
            "/sources/{id}",
            get(handlers::get_source).delete(handlers::delete_source),
        )
        .route("/sources/{id}/columns", put(handlers::map_source_columns))
        .route("/sources/{id}/preview", get(handlers::preview_source))
        // Pipeline runs and artifacts
        .route("/projects/{id}/aggregate", post(handlers::aggregate))
        .route(
            "/projects/{id}/aggregated-data",
            get(handlers::get_aggregated_data).delete(handlers::delete_aggregated_data),
        )
        .route("/projects/{id}/features", post(handlers::generate_features))
        .route(
            "/projects/{id}/feature-data",
            get(handlers::get_feature_data).delete(handlers::delete_feature_data),
        )
        // Option catalogs
        .route("/aggregation-options", get(handlers::aggregation_options))
        .route("/feature-options", get(handlers::feature_options))
        // Health
        .route("/health", get(handlers::health));

    Router::new().nest("/api/v1", api).with_state(db).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors_layer(config)),
    )
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let Some(origins) = &config.cors_origins else {
        return CorsLayer::permissive();
    };

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}
