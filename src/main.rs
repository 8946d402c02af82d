//! imgpress - An image compression service.
//!
//! This binary starts the HTTP server and configures all components.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use imgpress::{
    accounting::{LoggerTask, OutcomeLogger, PgRecordSink, TracingSink},
    config::Config,
    pipeline::{AdmissionController, WorkerPool},
    server::{create_router, AppState},
};

/// How long buffered accounting records may take to flush on shutdown.
const ACCOUNTING_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let limits = config.admission_limits();
    let pool_config = config.pool_config();

    info!("imgpress v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!(
        "  Output: {:?}, default quality {}",
        config.output_format, config.quality
    );
    info!(
        "  Limits: {} bytes max upload, {} in flight, {}s timeout",
        limits.max_upload_bytes,
        limits.queue_bound,
        limits.request_timeout.as_secs()
    );
    info!("  Allowed types: {}", limits.allowed_types.join(", "));
    info!("  Workers: {}", pool_config.workers);

    let (logger, logger_task) = match start_accounting(&config).await {
        Ok(started) => started,
        Err(e) => {
            error!("Accounting setup failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let codec = config.output_format.codec();
    let pool = WorkerPool::spawn(codec, logger.clone(), pool_config);
    let controller = Arc::new(AdmissionController::new(pool, logger, limits));

    let state = AppState::new(Arc::clone(&controller), config.quality);
    let router = create_router(state, config.router_config());

    let addr = config.bind_address();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    info!("Server listening on: http://{}", addr);
    info!(
        "  Try: curl -F file=@photo.jpg http://{}/compress -o photo.webp",
        addr
    );

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    info!("Draining transcode workers...");
    controller.shutdown().await;
    drop(controller);

    let stats = logger_task.join(ACCOUNTING_GRACE).await;
    info!(
        persisted = stats.persisted,
        dropped_overflow = stats.dropped_overflow,
        dropped_closed = stats.dropped_closed,
        dropped_failed = stats.dropped_failed,
        "Accounting flushed"
    );

    if let Err(e) = served {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Pick the accounting sink and start the outcome logger.
///
/// An unreachable database is not fatal: the service keeps compressing and
/// the logger retries and counts what it cannot write.
async fn start_accounting(
    config: &Config,
) -> Result<(OutcomeLogger, LoggerTask), imgpress::PersistenceError> {
    let logger_config = config.logger_config();

    let Some(url) = config.database_url() else {
        warn!("  Accounting: no database configured, records are logged only");
        return Ok(OutcomeLogger::spawn(TracingSink, logger_config));
    };

    let sink = PgRecordSink::connect_lazy(&url)?;
    match sink.ping().await {
        Ok(()) => info!("  Accounting: connected to PostgreSQL"),
        Err(e) => warn!(
            "  Accounting: database unavailable ({}), records will be retried",
            e
        ),
    }

    Ok(OutcomeLogger::spawn(sink, logger_config))
}

/// Resolve when the process receives Ctrl-C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "imgpress=debug,tower_http=debug"
    } else {
        "imgpress=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
