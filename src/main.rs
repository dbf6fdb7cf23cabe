use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use ml_constructor::config::AppConfig;
use ml_constructor::models::{AggregationConfig, AggregationFunction, AggregationPeriod, FeatureConfig};
use ml_constructor::{api, db, pipeline};

#[derive(Parser)]
#[command(name = "mlc")]
#[command(about = "Time-series aggregation and feature engineering for modeling projects")]
struct Cli {
    /// SQLite database file (overrides ML_CONSTRUCTOR_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Bind address (overrides ML_CONSTRUCTOR_HOST)
        #[arg(long)]
        host: Option<String>,

        /// Port for HTTP API (overrides ML_CONSTRUCTOR_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Aggregate a project's sources and store the result
    Aggregate {
        project_id: Uuid,

        /// Target period, e.g. daily_to_weekly or monthly
        #[arg(long, value_parser = parse_period)]
        period: AggregationPeriod,

        /// Reduction for the project's value column
        #[arg(long, default_value = "sum", value_parser = parse_function)]
        aggregation: AggregationFunction,
    },
    /// Generate features from a project's aggregated data
    Features {
        project_id: Uuid,

        /// JSON file holding `date_features` and `numerical_features`
        #[arg(long)]
        config: PathBuf,
    },
}

fn parse_period(s: &str) -> Result<AggregationPeriod, String> {
    AggregationPeriod::from_str(s).ok_or_else(|| {
        let accepted: Vec<&str> = AggregationPeriod::ALL.iter().map(|p| p.as_str()).collect();
        format!("expected one of {}", accepted.join(", "))
    })
}

fn parse_function(s: &str) -> Result<AggregationFunction, String> {
    AggregationFunction::from_str(s).ok_or_else(|| {
        let accepted: Vec<&str> = AggregationFunction::ALL.iter().map(|f| f.as_str()).collect();
        format!("expected one of {}", accepted.join(", "))
    })
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "ml_constructor=debug,tower_http=debug".into()),
    );

    // Logs go to stderr so subcommand output on stdout stays machine readable.
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn open_database(config: &AppConfig) -> anyhow::Result<db::Database> {
    let db = match &config.database_path {
        Some(path) => db::Database::open(path.clone())?,
        None => db::Database::open_default()?,
    };
    db.migrate()?;
    Ok(db)
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let db = open_database(&config)?;
    let app = api::create_router_with_config(db, &config);

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    tracing::info!("ML Constructor server listening on http://{}", address);

    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut config = AppConfig::from_env();
    if let Some(path) = cli.db {
        config.database_path = Some(path);
    }

    match cli.command {
        Some(Commands::Serve { host, port }) => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            serve(config).await?;
        }
        Some(Commands::Aggregate {
            project_id,
            period,
            aggregation,
        }) => {
            let db = open_database(&config)?;
            let run_config = AggregationConfig {
                period,
                main_value_aggregation: aggregation,
            };
            let summary = tokio::task::spawn_blocking(move || {
                pipeline::run_aggregation(&db, project_id, &run_config)
            })
            .await??;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Some(Commands::Features { project_id, config: path }) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let feature_config: FeatureConfig = serde_json::from_str(&raw)
                .with_context(|| format!("Invalid feature configuration in {}", path.display()))?;

            let db = open_database(&config)?;
            let summary = tokio::task::spawn_blocking(move || {
                pipeline::run_features(&db, project_id, &feature_config)
            })
            .await??;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        None => serve(config).await?,
    }

    Ok(())
}
