mod config;
mod error;
mod principal;
mod routes;
mod views;

use anyhow::{Context, Result};
use app_core::CoreBuilder;
use axum::{Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use config::ServerConfig;
use cr_single_instance::CrSingleInstance;
use db_sqlite::SqliteDb;
use routes::{AppState, api_router};
use serde::Serialize;
use std::process::ExitCode;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_error::ErrorLayer;
use tracing_log::LogTracer;
use tracing_subscriber::{EnvFilter, Registry, prelude::*};

fn init_tracing_bunyan() -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));

    // Name identifies the service in log streams
    let formatting_layer = BunyanFormattingLayer::new(
        "tournament-server".into(),
        std::io::stdout, // single sink: JSON to stdout
    );

    // Build a Bunyan-only subscriber:
    // - JsonStorageLayer: propagates span fields to child events
    // - BunyanFormattingLayer: strict Bunyan JSON output
    // - ErrorLayer: enrich errors with span context
    let subscriber = Registry::default()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(formatting_layer)
        .with(ErrorLayer::default());

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

// --- /health (service liveness) ---
#[instrument(name = "health")]
async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

// --- /health/db (database readiness) ---
#[derive(Serialize)]
struct DbStatus {
    db: &'static str,
}

#[instrument(name = "health_db", skip(app_state))]
async fn health_db(State(app_state): State<AppState>) -> impl IntoResponse {
    match app_state.core.database.ping_db().await {
        Ok(_) => (StatusCode::OK, axum::Json(DbStatus { db: "ok" })),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            axum::Json(DbStatus { db: "down" }),
        ),
    }
}

async fn run(config: ServerConfig) -> Result<()> {
    // initialize core state
    let db = SqliteDb::new(&config.database_path)
        .context("failed to open the database")?;
    db.run_migration().await.context("migration failed")?;
    let registry = CrSingleInstance::new();
    let core = CoreBuilder::new()
        .set_db(Arc::new(db))
        .set_cr(Arc::new(registry))
        .build();
    let app_state = AppState {
        core: Arc::new(core),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/health/db", get(health_db))
        .merge(api_router())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    info!(addr = %config.listen_addr, "listening on http server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .context("failed to bind listener")?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    // Load .env first if present; ignore if missing (Docker sets envs)
    let _ = dotenvy::dotenv();
    // map all log! calls in dependencies to tracing
    if let Err(e) = LogTracer::init() {
        eprintln!("failed to initialize log bridge: {e}");
        return ExitCode::from(1);
    }
    // Initialize Bunyan-only tracing before constructing anything else.
    if let Err(e) = init_tracing_bunyan() {
        eprintln!("failed to initialize tracing: {e}");
        return ExitCode::from(1);
    }

    // exit code 2: configuration problems, reported before any state exists
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::from(2);
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // exit code 1: fatal startup or serve failure
            error!(error = %e, "fatal server error");
            ExitCode::from(1)
        }
    }
}
