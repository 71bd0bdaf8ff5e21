use std::net::SocketAddr;
use std::sync::Arc;

use agenda_channels::{DeliveryChannel, EmailChannel, LogChannel};
use agenda_core::{config::SmtpConfig, EMAIL_CHANNEL};
use agenda_scheduler::{ReminderScheduler, SchedulerEngine, SqliteLedger, SystemClock};
use clap::Parser;
use tracing::{info, warn};

mod app;
mod http;

#[derive(Parser)]
#[command(
    name = "agenda-gateway",
    version,
    about = "SmartAgenda: event reminders delivered by email"
)]
struct Cli {
    /// Path to agenda.toml (defaults to ~/.agenda/agenda.toml)
    #[arg(short, long, env = "AGENDA_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "agenda_gateway=info,agenda_scheduler=info,tower_http=debug".into()
            }),
        )
        .init();

    let cli = Cli::parse();
    let config = agenda_core::config::AgendaConfig::load(cli.config.as_deref())
        .unwrap_or_else(|e| {
            warn!("Config load failed ({}), using defaults", e);
            agenda_core::config::AgendaConfig::default()
        });

    // one SQLite file; every subsystem gets its own connection
    let db_path = &config.database.path;
    ensure_parent_dir(db_path)?;
    info!(path = %db_path, "opening SQLite database");

    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    agenda_events::db::init_db(&db)?;
    agenda_scheduler::db::init_db(&db)?;
    info!("database migrations complete");

    let events = agenda_events::EventStore::new(rusqlite::Connection::open(db_path)?)?;
    let ledger = Arc::new(SqliteLedger::new(rusqlite::Connection::open(db_path)?)?);
    let scheduler_events =
        Arc::new(agenda_events::EventStore::new(rusqlite::Connection::open(db_path)?)?);

    let engine = SchedulerEngine::new(
        scheduler_events,
        ledger.clone(),
        build_channel(&config.smtp),
        Arc::new(SystemClock),
        config.poll_interval(),
    );
    let scheduler = Arc::new(ReminderScheduler::new(engine));
    scheduler.start()?;

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    let state = Arc::new(app::AppState::new(config, events, ledger, scheduler.clone()));
    let router = app::build_router(state);

    info!("SmartAgenda gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down, waiting for the in-flight scheduler cycle");
    scheduler.stop().await;
    Ok(())
}

/// Email over SMTP, or a log-only stand-in when `smtp.dry_run` is set.
fn build_channel(smtp: &SmtpConfig) -> Arc<dyn DeliveryChannel> {
    if smtp.dry_run {
        info!("SMTP dry run enabled: reminders are logged, not sent");
        return Arc::new(LogChannel::new(EMAIL_CHANNEL));
    }
    let missing = smtp.missing_fields();
    if !missing.is_empty() {
        warn!(
            missing = %missing.join(", "),
            "SMTP settings incomplete; deliveries will be recorded as failed"
        );
    }
    Arc::new(EmailChannel::new(smtp.clone()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}

/// Ensure the parent directory for a file path exists.
fn ensure_parent_dir(path: &str) -> std::io::Result<()> {
    match std::path::Path::new(path).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}
