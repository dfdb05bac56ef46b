use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use dotenvy::dotenv;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tokio::net::TcpListener;
use tracing::{Instrument, error, info, info_span};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::analysis::trip_planner::PlaceholderEstimator;
use crate::api::{AppState, create_router};
use crate::background_services::gps_writer::spawn_gps_writer;
use crate::background_services::training::run_training;
use crate::config::{Cli, Command, DataPaths, ServeArgs, TrainArgs};

mod analysis;
mod api;
mod background_services;
mod config;
mod dal;
mod error;
mod model;
mod utils;

const SERVICE_NAME: &str = "transit_demand";

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    _ = dotenv();

    let Cli {
        data_dir,
        model_path,
        log_dir,
        command,
    } = Cli::parse();

    let (provider, _guard) = init_tracing(&log_dir)?;

    let paths = DataPaths::new(&data_dir);
    let result = match command {
        Command::Serve(args) => serve(paths, model_path, args).await,
        Command::Train(args) => train(paths, model_path, args).await,
    };

    if let Err(e) = &result {
        error!("{e:?}");
    }

    if let Some(provider) = provider {
        if let Err(e) = provider.shutdown() {
            eprintln!("failed to flush spans: {e}");
        }
    }

    result
}

/// Stdout and daily rolling file logs, plus OTLP span export when `OTLP_ENDPOINT` is set.
fn init_tracing(log_dir: &Path) -> Result<(Option<SdkTracerProvider>, WorkerGuard)> {
    let provider = match dotenvy::var("OTLP_ENDPOINT") {
        Ok(endpoint) => {
            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint)
                .with_timeout(Duration::from_millis(1000))
                .build()
                .context("building the OTLP span exporter")?;

            Some(
                SdkTracerProvider::builder()
                    .with_batch_exporter(exporter)
                    .with_resource(Resource::builder().with_service_name(SERVICE_NAME).build())
                    .build(),
            )
        }
        Err(_) => None,
    };

    let telemetry_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer(SERVICE_NAME)));

    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let appender = tracing_appender::rolling::daily(log_dir, "transit_demand.log");
    let (non_blocking_appender, guard) = tracing_appender::non_blocking(appender);

    // A layer that logs events to rolling files.
    let file_log = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_appender)
        .with_ansi(false)
        .pretty();

    Registry::default()
        .with(telemetry_layer)
        .with(file_log)
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    Ok((provider, guard))
}

async fn serve(paths: DataPaths, model_path: PathBuf, args: ServeArgs) -> Result<()> {
    let (gps_log, gps_writer) = spawn_gps_writer(paths.realtime_gps.clone());
    let estimator = Arc::new(PlaceholderEstimator::new(args.estimator_seed));

    let state = tokio::task::spawn_blocking(move || {
        AppState::load(
            &paths,
            &model_path,
            estimator,
            gps_log,
            args.max_walk_km,
            args.nearby_limit,
        )
    })
    .instrument(info_span!("Loading models and data"))
    .await?;

    let app = create_router(Arc::new(state));

    let listener = TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("binding {}", args.bind))?;

    info!("Listening on {}", args.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    // the router held the last log handle, the writer finishes its queue and exits
    gps_writer.await?;

    Ok(())
}

async fn train(paths: DataPaths, model_path: PathBuf, args: TrainArgs) -> Result<()> {
    let paths = paths.with_gtfs_dir(args.gtfs_dir.clone());
    let options = args.training_options();

    let summary = tokio::task::spawn_blocking(move || run_training(&paths, &model_path, &options))
        .instrument(info_span!("Training"))
        .await??;

    info!(
        "Trained on {} feature rows from {} pings over {} stops and {} routes",
        summary.feature_rows, summary.pings, summary.stops, summary.routes
    );
    info!(
        "Holdout MAE {:.2}, RMSE {:.2}, R² {:.3} on {} rows",
        summary.report.mae, summary.report.rmse, summary.report.r2, summary.report.test_rows
    );
    info!(
        "{} route suggestions from {} clusters",
        summary.suggestions, summary.clusters
    );

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }

    info!("Shutting down");
}
