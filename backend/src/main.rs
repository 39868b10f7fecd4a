use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;

use stockdash_backend::app;
use stockdash_backend::config::AppConfig;
use stockdash_backend::external::python_engine::HttpAnalysisEngine;
use stockdash_backend::logging::{init_logging, LoggingConfig};
use stockdash_backend::services::job_scheduler_service::{JobContext, JobSchedulerService};
use stockdash_backend::state::AppState;
use stockdash_backend::store::PgAnalysisStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging FIRST
    init_logging(LoggingConfig::from_env())
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    let config = AppConfig::from_env().context("invalid configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to the database")?;

    if config.run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run migrations")?;
        tracing::info!("✅ Database migrations applied");
    }

    let engine = HttpAnalysisEngine::new(&config.engine)
        .context("failed to build analysis engine client")?;
    tracing::info!(
        "📊 Analysis engine at {} (period {}, timeout {}s)",
        config.engine.base_url,
        config.engine.period,
        config.engine.timeout.as_secs()
    );

    let addr = config.bind_addr();
    let job_max_runtime = config.job_max_runtime;
    let state = AppState::new(
        pool.clone(),
        Arc::new(PgAnalysisStore::new(pool.clone())),
        Arc::new(engine),
        config,
    );

    let mut scheduler = JobSchedulerService::new(JobContext {
        store: state.store.clone(),
        rate_limiters: vec![state.rate_limiter.clone(), state.analysis_rate_limiter.clone()],
        job_max_runtime,
    })
    .await?;
    scheduler.start().await?;

    let rate_limiters = [state.rate_limiter.clone(), state.analysis_rate_limiter.clone()];
    let app = app::create_app(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("🚀 Stock analysis backend running at http://{}/", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down...");
    for limiter in &rate_limiters {
        limiter.clear();
    }
    if let Err(e) = scheduler.stop().await {
        tracing::warn!("Scheduler did not stop cleanly: {}", e);
    }
    pool.close().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
