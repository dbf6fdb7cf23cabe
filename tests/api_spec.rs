use std::path::Path;

use axum::http::StatusCode;
use axum_test::TestServer;
use ml_constructor::api::create_router;
use ml_constructor::db::Database;
use ml_constructor::models::*;
use serde_json::{json, Value};

fn setup() -> TestServer {
    let db = Database::open_memory().expect("Failed to create database");
    db.migrate().expect("Failed to migrate");
    let app = create_router(db);
    TestServer::new(app).expect("Failed to create test server")
}

fn write_file(dir: &Path, name: &str, content: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("Failed to write fixture");
    path.to_string_lossy().into_owned()
}

/// Ten days of sales starting Monday 2024-01-01.
fn sales_csv(dir: &Path) -> String {
    let mut content = String::from("date,units\n");
    for day in 1..=10 {
        content.push_str(&format!("2024-01-{:02},{}\n", day, day));
    }
    write_file(dir, "sales.csv", &content)
}

async fn create_test_project(server: &TestServer, file_path: Option<String>) -> Project {
    server
        .post("/api/v1/projects")
        .json(&CreateProjectInput {
            name: "Test Project".to_string(),
            description: None,
            source: file_path.map(|file_path| DataSource::File { file_path }),
        })
        .await
        .json::<Project>()
}

async fn create_mapped_project(server: &TestServer, file_path: String) -> Project {
    let project = create_test_project(server, Some(file_path)).await;
    server
        .put(&format!("/api/v1/projects/{}/columns", project.id))
        .json(&ColumnMapping {
            date_column: "date".to_string(),
            value_column: "units".to_string(),
            product_column: None,
        })
        .await
        .json::<Project>()
}

mod health {
    use super::*;

    #[tokio::test]
    async fn reports_ok() {
        let server = setup();

        let response = server.get("/api/v1/health").await;

        response.assert_status_ok();
        response.assert_json(&json!({ "status": "ok" }));
    }
}

mod projects {
    use super::*;

    #[tokio::test]
    async fn creates_and_fetches_a_project() {
        let server = setup();
        let project = create_test_project(&server, None).await;

        let response = server
            .get(&format!("/api/v1/projects/{}", project.id))
            .await;

        response.assert_status_ok();
        let found: Project = response.json();
        assert_eq!(found.id, project.id);
        assert!(!found.aggregation_completed);
    }

    #[tokio::test]
    async fn rejects_a_blank_name() {
        let server = setup();

        let response = server
            .post("/api/v1/projects")
            .json(&json!({ "name": "  " }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn returns_404_for_unknown_project() {
        let server = setup();

        let response = server
            .get(&format!("/api/v1/projects/{}", uuid::Uuid::new_v4()))
            .await;

        response.assert_status_not_found();
    }

    #[tokio::test]
    async fn maps_columns() {
        let server = setup();
        let project = create_test_project(&server, None).await;

        let response = server
            .put(&format!("/api/v1/projects/{}/columns", project.id))
            .json(&json!({ "date_column": "day", "value_column": "qty" }))
            .await;

        response.assert_status_ok();
        let updated: Project = response.json();
        assert_eq!(updated.date_column.as_deref(), Some("day"));
        assert_eq!(updated.value_column.as_deref(), Some("qty"));
    }

    #[tokio::test]
    async fn deletes_a_project() {
        let server = setup();
        let project = create_test_project(&server, None).await;

        server
            .delete(&format!("/api/v1/projects/{}", project.id))
            .await
            .assert_status(StatusCode::NO_CONTENT);

        server
            .get(&format!("/api/v1/projects/{}", project.id))
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn previews_the_primary_source() {
        let server = setup();
        let dir = tempfile::tempdir().unwrap();
        let project = create_test_project(&server, Some(sales_csv(dir.path()))).await;

        let response = server
            .get(&format!("/api/v1/projects/{}/source/preview", project.id))
            .await;

        response.assert_status_ok();
        let info: DataSourceInfo = response.json();
        assert_eq!(info.source_type, "file");
        assert_eq!(info.columns, vec!["date", "units"]);
        assert_eq!(info.row_count, 10);
        assert_eq!(info.sample_data.len(), 5);
    }

    #[tokio::test]
    async fn preview_without_source_is_a_bad_request() {
        let server = setup();
        let project = create_test_project(&server, None).await;

        server
            .get(&format!("/api/v1/projects/{}/source/preview", project.id))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }
}

mod sources {
    use super::*;

    #[tokio::test]
    async fn registers_maps_and_previews_a_source() {
        let server = setup();
        let dir = tempfile::tempdir().unwrap();
        let project = create_test_project(&server, None).await;
        let prices = write_file(dir.path(), "prices.csv", "day,price\n2024-01-01,10\n2024-01-08,20\n");

        let created = server
            .post(&format!("/api/v1/projects/{}/sources", project.id))
            .json(&CreateSecondarySourceInput {
                name: "prices".to_string(),
                file_path: prices,
            })
            .await;
        created.assert_status(StatusCode::CREATED);
        let source: SecondarySource = created.json();

        server
            .put(&format!("/api/v1/sources/{}/columns", source.id))
            .json(&json!({
                "date_column": "day",
                "selected_columns": ["price"],
                "column_aggregations": { "price": "max" },
                "fill_method": "interpolate"
            }))
            .await
            .assert_status_ok();

        let response = server
            .get(&format!("/api/v1/sources/{}/preview", source.id))
            .await;
        response.assert_status_ok();
        let preview: SecondarySourcePreview = response.json();
        assert_eq!(preview.columns, vec!["day", "price"]);
        assert_eq!(preview.row_count, 2);
        assert_eq!(preview.date_column.as_deref(), Some("day"));
        assert_eq!(
            preview.column_aggregations.get("price"),
            Some(&AggregationFunction::Max)
        );

        let listed: Vec<SecondarySource> = server
            .get(&format!("/api/v1/projects/{}/sources", project.id))
            .await
            .json();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].fill_method, FillPolicy::Interpolate);
    }

    #[tokio::test]
    async fn rejects_a_mapping_without_columns() {
        let server = setup();
        let project = create_test_project(&server, None).await;
        let source: SecondarySource = server
            .post(&format!("/api/v1/projects/{}/sources", project.id))
            .json(&json!({ "name": "empty", "file_path": "/data/empty.csv" }))
            .await
            .json();

        server
            .put(&format!("/api/v1/sources/{}/columns", source.id))
            .json(&json!({ "date_column": "day", "selected_columns": [] }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn returns_404_for_sources_of_unknown_project() {
        let server = setup();

        server
            .get(&format!("/api/v1/projects/{}/sources", uuid::Uuid::new_v4()))
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn deletes_a_source() {
        let server = setup();
        let project = create_test_project(&server, None).await;
        let source: SecondarySource = server
            .post(&format!("/api/v1/projects/{}/sources", project.id))
            .json(&json!({ "name": "prices", "file_path": "/data/prices.csv" }))
            .await
            .json();

        server
            .delete(&format!("/api/v1/sources/{}", source.id))
            .await
            .assert_status(StatusCode::NO_CONTENT);
        server
            .get(&format!("/api/v1/sources/{}", source.id))
            .await
            .assert_status_not_found();
    }
}

mod aggregation {
    use super::*;

    #[tokio::test]
    async fn aggregates_primary_and_secondary_to_weekly_rows() {
        let server = setup();
        let dir = tempfile::tempdir().unwrap();
        let project = create_mapped_project(&server, sales_csv(dir.path())).await;
        let prices = write_file(
            dir.path(),
            "prices.csv",
            "day,price\n2024-01-01,10\n2024-01-02,10\n2024-01-04,10\n2024-01-08,30\n2024-01-09,30\n2024-01-10,30\n",
        );
        let source: SecondarySource = server
            .post(&format!("/api/v1/projects/{}/sources", project.id))
            .json(&json!({ "name": "prices", "file_path": prices }))
            .await
            .json();
        server
            .put(&format!("/api/v1/sources/{}/columns", source.id))
            .json(&json!({ "date_column": "day", "selected_columns": ["price"] }))
            .await
            .assert_status_ok();

        let response = server
            .post(&format!("/api/v1/projects/{}/aggregate", project.id))
            .json(&json!({ "period": "daily_to_weekly" }))
            .await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["period"], json!("weekly"));
        assert_eq!(body["row_count"], json!(2));
        assert_eq!(body["columns"], json!(["date", "units", "price_add1"]));
        assert_eq!(
            body["sample_data"],
            json!([
                { "date": "2024-01-07", "units": 28.0, "price_add1": 10.0 },
                { "date": "2024-01-14", "units": 27.0, "price_add1": 30.0 }
            ])
        );
        assert_eq!(
            body["date_range"],
            json!({ "min": "2024-01-07", "max": "2024-01-14" })
        );
    }

    #[tokio::test]
    async fn serves_and_deletes_the_stored_artifact() {
        let server = setup();
        let dir = tempfile::tempdir().unwrap();
        let project = create_mapped_project(&server, sales_csv(dir.path())).await;
        server
            .post(&format!("/api/v1/projects/{}/aggregate", project.id))
            .json(&json!({ "period": "daily" }))
            .await
            .assert_status_ok();

        let response = server
            .get(&format!("/api/v1/projects/{}/aggregated-data", project.id))
            .await;
        response.assert_status_ok();
        let preview: AggregatedPreview = response.json();
        assert_eq!(preview.period, Granularity::Daily);
        assert_eq!(preview.row_count, 10);
        assert_eq!(preview.sample_data.len(), 10);

        server
            .delete(&format!("/api/v1/projects/{}/aggregated-data", project.id))
            .await
            .assert_status_ok();

        server
            .get(&format!("/api/v1/projects/{}/aggregated-data", project.id))
            .await
            .assert_status_not_found();
        let project: Project = server
            .get(&format!("/api/v1/projects/{}", project.id))
            .await
            .json();
        assert!(!project.aggregation_completed);
    }

    #[tokio::test]
    async fn returns_400_for_a_pipeline_failure() {
        let server = setup();
        let project = create_mapped_project(&server, "/nowhere/sales.csv".to_string()).await;

        let response = server
            .post(&format!("/api/v1/projects/{}/aggregate", project.id))
            .json(&json!({ "period": "monthly" }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(response.text().contains("load"));
    }

    #[tokio::test]
    async fn returns_404_for_unknown_project() {
        let server = setup();

        server
            .post(&format!("/api/v1/projects/{}/aggregate", uuid::Uuid::new_v4()))
            .json(&json!({ "period": "monthly" }))
            .await
            .assert_status_not_found();
    }
}

mod features {
    use super::*;

    #[tokio::test]
    async fn generates_features_after_aggregation() {
        let server = setup();
        let dir = tempfile::tempdir().unwrap();
        let project = create_mapped_project(&server, sales_csv(dir.path())).await;
        server
            .post(&format!("/api/v1/projects/{}/aggregate", project.id))
            .json(&json!({ "period": "daily", "main_value_aggregation": "sum" }))
            .await
            .assert_status_ok();

        let response = server
            .post(&format!("/api/v1/projects/{}/features", project.id))
            .json(&json!({
                "date_features": { "month": true, "month_sin": true },
                "numerical_features": { "lag_periods": [1], "include_statistics": true, "rolling_windows": [2] }
            }))
            .await;

        response.assert_status_ok();
        let summary: FeatureSummary = response.json();
        assert_eq!(
            summary.generated_features,
            vec![
                "date_month",
                "date_month_sin",
                "units_lag_1",
                "units_rolling_2_mean",
                "units_rolling_2_std",
                "units_rolling_2_min",
                "units_rolling_2_max",
            ]
        );
        assert_eq!(summary.row_count, 9);
        assert_eq!(summary.sample_data.len(), 5);

        let stored: FeaturePreview = server
            .get(&format!("/api/v1/projects/{}/feature-data", project.id))
            .await
            .json();
        assert_eq!(stored.row_count, 9);
        assert!(stored.feature_config.date_features.month);
    }

    #[tokio::test]
    async fn refuses_to_run_before_aggregation() {
        let server = setup();
        let dir = tempfile::tempdir().unwrap();
        let project = create_mapped_project(&server, sales_csv(dir.path())).await;

        server
            .post(&format!("/api/v1/projects/{}/features", project.id))
            .json(&json!({}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn deleting_feature_data_clears_the_flag() {
        let server = setup();
        let dir = tempfile::tempdir().unwrap();
        let project = create_mapped_project(&server, sales_csv(dir.path())).await;
        server
            .post(&format!("/api/v1/projects/{}/aggregate", project.id))
            .json(&json!({ "period": "daily" }))
            .await
            .assert_status_ok();
        server
            .post(&format!("/api/v1/projects/{}/features", project.id))
            .json(&json!({ "date_features": { "year": true } }))
            .await
            .assert_status_ok();

        server
            .delete(&format!("/api/v1/projects/{}/feature-data", project.id))
            .await
            .assert_status_ok();

        let project: Project = server
            .get(&format!("/api/v1/projects/{}", project.id))
            .await
            .json();
        assert!(!project.features_generated);
        assert!(project.aggregation_completed);
    }
}

mod options {
    use super::*;

    #[tokio::test]
    async fn lists_aggregation_options() {
        let server = setup();

        let options: Value = server.get("/api/v1/aggregation-options").await.json();

        assert_eq!(options["periods"].as_array().map(Vec::len), Some(6));
        assert_eq!(options["aggregation_functions"][0], json!("mean"));
        assert_eq!(
            options["fill_methods"],
            json!(["zero", "forward", "backward", "mean", "interpolate"])
        );
    }

    #[tokio::test]
    async fn lists_feature_options() {
        let server = setup();

        let options: Value = server.get("/api/v1/feature-options").await.json();

        assert_eq!(options["date_features"]["month"], json!("Month (1-12)"));
        let lags = options["numerical_options"]["lag_periods"].as_array().unwrap();
        assert_eq!(lags.first(), Some(&json!(1)));
        assert_eq!(lags.last(), Some(&json!(30)));
        assert_eq!(
            options["numerical_options"]["rolling_windows"][0],
            json!(3)
        );
    }
}
