use std::collections::BTreeMap;
use std::path::Path;

use ml_constructor::db::Database;
use ml_constructor::models::*;
use ml_constructor::pipeline::{run_aggregation, run_features, PipelineError, Stage};
use serde_json::json;
use speculate2::speculate;
use uuid::Uuid;

/// Ten consecutive days starting Monday 2024-01-01, units 1..=10.
const DAILY_SALES: &str = "date,units,sku\n\
2024-01-01,1,A\n2024-01-02,2,A\n2024-01-03,3,A\n2024-01-04,4,A\n2024-01-05,5,A\n\
2024-01-06,6,A\n2024-01-07,7,A\n2024-01-08,8,A\n2024-01-09,9,A\n2024-01-10,10,A\n";

/// Six of the same ten days.
const DAILY_PRICES: &str = "day,price\n\
2024-01-01,10\n2024-01-03,12\n2024-01-05,14\n2024-01-08,20\n2024-01-09,22\n2024-01-10,24\n";

fn write_file(dir: &Path, name: &str, content: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("Failed to write fixture");
    path.to_string_lossy().into_owned()
}

fn create_mapped_project(db: &Database, file_path: String) -> Project {
    let project = db
        .create_project(CreateProjectInput {
            name: "Sales".to_string(),
            description: None,
            source: Some(DataSource::File { file_path }),
        })
        .expect("Failed to create project");
    db.set_column_mapping(project.id, ColumnMapping {
        date_column: "date".to_string(),
        value_column: "units".to_string(),
        product_column: None,
    })
    .expect("Failed to map columns")
    .expect("Project missing")
}

fn add_price_source(db: &Database, project_id: Uuid, file_path: String, fill: FillPolicy) -> SecondarySource {
    let source = db
        .create_secondary_source(project_id, CreateSecondarySourceInput {
            name: "prices".to_string(),
            file_path,
        })
        .expect("Failed to create source");
    db.map_secondary_columns(source.id, MapSourceColumnsInput {
        date_column: "day".to_string(),
        selected_columns: vec!["price".to_string()],
        column_aggregations: BTreeMap::new(),
        fill_method: fill,
        product_column: None,
    })
    .expect("Failed to map source")
    .expect("Source missing")
}

fn weekly() -> AggregationConfig {
    AggregationConfig {
        period: AggregationPeriod::DailyToWeekly,
        main_value_aggregation: AggregationFunction::Sum,
    }
}

speculate! {
    before {
        let db = Database::open_memory().expect("Failed to create in-memory database");
        db.migrate().expect("Failed to run migrations");
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let sales = write_file(dir.path(), "sales.csv", DAILY_SALES);
    }

    describe "aggregation" {
        it "merges a sparse secondary into complete weekly rows" {
            let project = create_mapped_project(&db, sales.clone());
            let prices = write_file(dir.path(), "prices.csv", DAILY_PRICES);
            add_price_source(&db, project.id, prices, FillPolicy::Zero);

            let summary = run_aggregation(&db, project.id, &weekly()).expect("Aggregation failed");

            assert_eq!(summary.period, Granularity::Weekly);
            assert_eq!(summary.row_count, 2);
            assert_eq!(summary.columns, vec!["date", "units", "price_add1"]);
            assert_eq!(summary.sample_data[0], json!({"date": "2024-01-07", "units": 28.0, "price_add1": 12.0}).as_object().unwrap().clone());
            assert_eq!(summary.sample_data[1], json!({"date": "2024-01-14", "units": 27.0, "price_add1": 22.0}).as_object().unwrap().clone());
            for row in &summary.sample_data {
                assert!(row.values().all(|v| !v.is_null()));
            }

            let range = summary.date_range.expect("Range missing");
            assert_eq!(range.min.to_string(), "2024-01-07");
            assert_eq!(range.max.to_string(), "2024-01-14");
        }

        it "fills periods missing from a secondary by its policy" {
            let project = create_mapped_project(&db, sales.clone());
            let prices = write_file(dir.path(), "prices.csv", "day,price\n2024-01-02,5\n2024-01-04,7\n");
            add_price_source(&db, project.id, prices, FillPolicy::Forward);

            let summary = run_aggregation(&db, project.id, &weekly()).expect("Aggregation failed");

            let prices: Vec<f64> = summary.sample_data.iter()
                .map(|row| row["price_add1"].as_f64().expect("price must be numeric"))
                .collect();
            assert_eq!(prices, vec![6.0, 6.0]);
        }

        it "zero-fills a week the secondary never covers" {
            let project = create_mapped_project(&db, sales.clone());
            let prices = write_file(dir.path(), "prices.csv", "day,price\n2024-01-01,10\n2024-01-03,12\n2024-01-05,14\n");
            add_price_source(&db, project.id, prices, FillPolicy::Zero);

            let summary = run_aggregation(&db, project.id, &weekly()).expect("Aggregation failed");

            assert_eq!(summary.row_count, 2);
            assert_eq!(summary.sample_data[0], json!({"date": "2024-01-07", "units": 28.0, "price_add1": 12.0}).as_object().unwrap().clone());
            assert_eq!(summary.sample_data[1], json!({"date": "2024-01-14", "units": 27.0, "price_add1": 0.0}).as_object().unwrap().clone());
        }

        it "treats non-finite source numbers as gaps" {
            let project = create_mapped_project(&db, sales.clone());
            let prices = write_file(dir.path(), "prices.csv", "day,price\n2024-01-01,NaN\n2024-01-08,5\n2024-01-09,inf\n");
            add_price_source(&db, project.id, prices, FillPolicy::Zero);

            let summary = run_aggregation(&db, project.id, &weekly()).expect("Aggregation failed");

            let prices: Vec<f64> = summary.sample_data.iter()
                .map(|row| row["price_add1"].as_f64().expect("price must be numeric"))
                .collect();
            assert_eq!(prices, vec![0.0, 5.0]);
            let stored = db.get_aggregated_artifact(project.id).expect("Query failed").expect("Artifact missing");
            for row in &stored.table.data {
                assert!(row.values().all(|v| !v.is_null()));
            }
        }

        it "skips secondary sources that are not mapped" {
            let project = create_mapped_project(&db, sales.clone());
            db.create_secondary_source(project.id, CreateSecondarySourceInput {
                name: "unmapped".to_string(),
                file_path: "/nowhere/unmapped.csv".to_string(),
            }).expect("Failed to create source");

            let summary = run_aggregation(&db, project.id, &weekly()).expect("Aggregation failed");
            assert_eq!(summary.columns, vec!["date", "units"]);
        }

        it "carries the product column through with its first value" {
            let project = create_mapped_project(&db, sales.clone());
            db.set_column_mapping(project.id, ColumnMapping {
                date_column: "date".to_string(),
                value_column: "units".to_string(),
                product_column: Some("sku".to_string()),
            }).expect("Failed to map columns");

            let summary = run_aggregation(&db, project.id, &AggregationConfig {
                period: AggregationPeriod::Monthly,
                main_value_aggregation: AggregationFunction::Mean,
            }).expect("Aggregation failed");

            assert_eq!(summary.columns, vec!["date", "units", "sku"]);
            assert_eq!(summary.sample_data[0]["date"], json!("2024-01-31"));
            assert_eq!(summary.sample_data[0]["units"], json!(5.5));
            assert_eq!(summary.sample_data[0]["sku"], json!("A"));
        }

        it "marks the project aggregated and stores the artifact" {
            let project = create_mapped_project(&db, sales.clone());

            let summary = run_aggregation(&db, project.id, &weekly()).expect("Aggregation failed");

            let stored = db.get_aggregated_artifact(project.id).expect("Query failed").expect("Artifact missing");
            assert_eq!(stored.id, summary.aggregated_data_id);
            assert_eq!(stored.table.row_count, stored.table.data.len());
            let project = db.get_project(project.id).expect("Query failed").expect("Project missing");
            assert!(project.aggregation_completed);
            assert_eq!(project.aggregation_period, Some(Granularity::Weekly));
        }

        it "keeps the previous artifact when a run fails" {
            let project = create_mapped_project(&db, sales.clone());
            let first = run_aggregation(&db, project.id, &weekly()).expect("Aggregation failed");

            db.set_column_mapping(project.id, ColumnMapping {
                date_column: "date".to_string(),
                value_column: "revenue".to_string(),
                product_column: None,
            }).expect("Failed to map columns");
            let err = run_aggregation(&db, project.id, &weekly()).unwrap_err();

            assert!(matches!(err, PipelineError::Config { stage: Stage::Resample, .. }));
            let stored = db.get_aggregated_artifact(project.id).expect("Query failed").expect("Artifact missing");
            assert_eq!(stored.id, first.aggregated_data_id);
        }

        it "reports unreadable sources at the load stage" {
            let project = create_mapped_project(&db, dir.path().join("missing.csv").to_string_lossy().into_owned());

            let err = run_aggregation(&db, project.id, &weekly()).unwrap_err();
            assert!(matches!(err, PipelineError::SourceRead { stage: Stage::Load, .. }));
        }

        it "requires the date and value columns" {
            let project = db.create_project(CreateProjectInput {
                name: "Unmapped".to_string(),
                description: None,
                source: Some(DataSource::File { file_path: sales.clone() }),
            }).expect("Failed to create project");

            let err = run_aggregation(&db, project.id, &weekly()).unwrap_err();
            assert!(matches!(err, PipelineError::Config { .. }));
        }

        it "reports unknown projects" {
            let id = Uuid::new_v4();
            let err = run_aggregation(&db, id, &weekly()).unwrap_err();
            assert!(matches!(err, PipelineError::ProjectNotFound(missing) if missing == id));
        }
    }

    describe "features" {
        it "requires a completed aggregation" {
            let project = create_mapped_project(&db, sales.clone());

            let err = run_features(&db, project.id, &FeatureConfig::default()).unwrap_err();
            assert!(matches!(err, PipelineError::Config { .. }));
        }

        it "derives date and numerical columns from the aggregated data" {
            let project = create_mapped_project(&db, sales.clone());
            run_aggregation(&db, project.id, &AggregationConfig {
                period: AggregationPeriod::Daily,
                main_value_aggregation: AggregationFunction::Sum,
            }).expect("Aggregation failed");

            let config = FeatureConfig {
                date_features: DateFeatureConfig {
                    month: true,
                    quarter: true,
                    ..Default::default()
                },
                numerical_features: NumericalFeatureConfig {
                    lag_periods: vec![1, 2],
                    rolling_windows: vec![3],
                    change_periods: vec![1],
                    ..Default::default()
                },
            };
            let summary = run_features(&db, project.id, &config).expect("Feature run failed");

            assert_eq!(
                summary.generated_features,
                vec![
                    "date_month",
                    "date_quarter",
                    "units_lag_1",
                    "units_lag_2",
                    "units_rolling_3",
                    "units_change_1",
                ]
            );
            assert_eq!(summary.total_features, 8);
            // The first two days have no full three-day window.
            assert_eq!(summary.row_count, 8);
            assert_eq!(summary.sample_data.len(), FEATURE_SAMPLE_ROWS);
            assert_eq!(summary.sample_data[0]["units_lag_2"], json!(1.0));
            assert_eq!(summary.sample_data[0]["units_rolling_3"], json!(2.0));

            let project = db.get_project(project.id).expect("Query failed").expect("Project missing");
            assert!(project.features_generated);
            assert_eq!(project.numerical_features, Some(config.numerical_features.clone()));
        }

        it "rejects windows longer than the series" {
            let project = create_mapped_project(&db, sales.clone());
            run_aggregation(&db, project.id, &weekly()).expect("Aggregation failed");

            let config = FeatureConfig {
                numerical_features: NumericalFeatureConfig {
                    rolling_windows: vec![5],
                    ..Default::default()
                },
                ..Default::default()
            };
            let err = run_features(&db, project.id, &config).unwrap_err();

            assert!(matches!(err, PipelineError::Computation { stage: Stage::NumericalFeatures, .. }));
            assert!(db.get_feature_artifact(project.id).expect("Query failed").is_none());
        }
    }
}
