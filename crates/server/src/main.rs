//! Accord server entry point.
//!
//! Runs the daily settlement scheduler and serves the health endpoints.
//! With `--run-once` it executes a single settlement pass and exits.

mod health;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use accord_common::Config;
use accord_core::{
    HttpVoteSource, Messenger, NotificationDispatcher, NotificationSettings, ProposalStore,
    SeederBootstrap, SettlementService, TallyThresholds, TelegramMessenger, UserStore,
    VoteSource,
};
use accord_db::repositories::{ProposalRepository, UserRepository};
use accord_queue::{JobExecutor, SchedulerConfig, SettlementExecutor, run_scheduler};
use anyhow::Context;
use chrono::Utc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "accord=debug,tower_http=info".into());
    let json = std::env::var("ACCORD_LOG_JSON").is_ok_and(|v| v == "1" || v == "true");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn build_settlement(
    config: &Config,
    db: &Arc<sea_orm::DatabaseConnection>,
) -> anyhow::Result<SettlementService> {
    let users: Arc<dyn UserStore> = Arc::new(UserRepository::new(Arc::clone(db)));
    let proposals: Arc<dyn ProposalStore> = Arc::new(ProposalRepository::new(Arc::clone(db)));
    let votes: Arc<dyn VoteSource> =
        Arc::new(HttpVoteSource::new(&config.vote_api).context("vote API client")?);
    let messenger: Arc<dyn Messenger> =
        Arc::new(TelegramMessenger::new(&config.telegram).context("Telegram client")?);

    let io_timeout = Duration::from_secs(config.scheduler.io_timeout_secs);
    let notifier = NotificationDispatcher::new(
        users.clone(),
        messenger,
        NotificationSettings::from_config(config),
        io_timeout,
    );

    Ok(SettlementService::new(
        users,
        proposals,
        votes,
        notifier,
        TallyThresholds::from(&config.governance),
        io_timeout,
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let run_once = std::env::args().skip(1).any(|arg| arg == "--run-once");
    info!(run_once, "Starting accord...");

    let config = Config::load().context("loading configuration")?;

    let db = accord_db::init(&config)
        .await
        .context("connecting to database")?;
    info!("Connected to database");

    info!("Running database migrations...");
    accord_db::migrate(&db).await.context("running migrations")?;
    info!("Migrations completed");

    let db = Arc::new(db);

    if !config.governance.initial_seeders.is_empty() {
        let bootstrap = SeederBootstrap::new(
            Arc::new(UserRepository::new(Arc::clone(&db))),
            Duration::from_secs(config.scheduler.io_timeout_secs),
        );
        let report = bootstrap
            .ensure_seeders(&config.governance.initial_seeders)
            .await
            .context("applying initial seeders")?;
        info!(
            created = report.created.len(),
            promoted = report.promoted.len(),
            unchanged = report.unchanged.len(),
            "Initial seeders applied"
        );
    }

    let executor = Arc::new(SettlementExecutor::new(build_settlement(&config, &db)?));

    if run_once {
        let report = executor.settle_proposals(Utc::now()).await?;
        info!(
            examined = report.examined,
            due = report.due,
            approved = report.approved,
            rejected = report.rejected,
            no_quorum = report.no_quorum,
            vote_fetch_failures = report.vote_fetch_failures,
            persistence_failures = report.persistence_failures,
            promotion_failures = report.promotion_failures,
            notifications_sent = report.notifications_sent,
            notifications_failed = report.notifications_failed,
            "Settlement pass finished"
        );
        return Ok(());
    }

    let scheduler = run_scheduler(SchedulerConfig::from(&config.scheduler), executor);
    let (scheduler_task, scheduler_state) = match scheduler {
        Some((task, state)) => (Some(task), Some(state)),
        None => (None, None),
    };

    let app = health::router(health::HealthState {
        db: Arc::clone(&db),
        scheduler: scheduler_state,
    })
    .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server.host/server.port")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(task) = scheduler_task {
        task.abort();
    }

    info!("Server shutdown complete");
    Ok(())
}
