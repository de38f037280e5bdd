use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use work_orchestrator::api;
use work_orchestrator::config::ServerConfig;
use work_orchestrator::orchestrator::Orchestrator;
use work_orchestrator::plans::{FsPlanCatalog, PlanCatalog};
use work_orchestrator::vcs::{GitCli, HttpGitService, VersionControl};
use work_orchestrator::workers::{HandlerRegistry, LocalWorkerPool, WorkerPool};

/// Completions buffered between workers and the ledger funnel.
const COMPLETION_BUFFER: usize = 256;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::from_env()?;
    let _log_guard = init_tracing(&config);

    eprintln!("Work orchestrator v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://0.0.0.0:{}", config.port);
    eprintln!("   Data: {}", config.data_dir.display());
    eprintln!("   Plans: {}", config.plans_dir.display());
    eprintln!("   Workers: {}", config.worker_count);
    match &config.git_service_url {
        Some(url) => eprintln!("   Git: {url}"),
        None => eprintln!("   Git: local repository at {}", config.repo_path.display()),
    }

    run(config).await?;
    Ok(())
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Log to stderr, and to a daily rolling file when `WORK_LOG_DIR` is set.
///
/// The returned guard must live until exit so buffered file logs are flushed.
fn init_tracing(config: &ServerConfig) -> Option<WorkerGuard> {
    let Some(dir) = &config.log_dir else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_target(false)
            .init();
        return None;
    };

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "work-orchestrator.log"));
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer),
        )
        .init();
    Some(guard)
}

async fn run(config: ServerConfig) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .with_context(|| format!("creating data directory {}", config.data_dir.display()))?;

    let vcs: Arc<dyn VersionControl> = match &config.git_service_url {
        Some(url) => Arc::new(
            HttpGitService::new(url.clone(), config.git_timeout)
                .context("building git service client")?,
        ),
        None => Arc::new(GitCli::new(config.repo_path.clone(), config.git_timeout)),
    };

    let catalog: Arc<dyn PlanCatalog> = Arc::new(FsPlanCatalog::new(
        config.plans_dir.clone(),
        config.data_dir.clone(),
    ));

    let (completions_tx, completions_rx) = mpsc::channel(COMPLETION_BUFFER);
    let pool: Arc<dyn WorkerPool> = Arc::new(LocalWorkerPool::new(
        config.worker_count,
        HandlerRegistry::with_builtins(),
        completions_tx,
    ));

    let port = config.port;
    let orchestrator = Arc::new(
        Orchestrator::new(config, vcs, catalog, pool)
            .await
            .context("opening project registry")?,
    );
    let _background = orchestrator.start(completions_rx);

    let app = api::routes(Arc::clone(&orchestrator));
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("binding port {port}"))?;
    tracing::info!(port, "Command API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving command API")?;
    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
