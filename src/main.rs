//! taskdesk CLI entry point.
//!
//! `start` runs the bot with its reminder loop and dashboard; the other
//! subcommands are one-shot maintenance tools.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use teloxide::Bot;
use tokio::sync::watch;
use tracing::{info, warn};

use taskdesk::config::Config;
use taskdesk::handlers::HandlerContext;
use taskdesk::notify::{Notifier, RecordingNotifier};
use taskdesk::reminders::{self, ReminderState};
use taskdesk::store::Store;
use taskdesk::telegram::{self, TelegramNotifier};
use taskdesk::dashboard;
use taskdesk::logging::{self, Service};

/// taskdesk: task assignment bot for organisational groups.
#[derive(Parser)]
#[command(name = "taskdesk", version, about)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Run the Telegram bot, the reminder loop and (if enabled) the dashboard.
    Start,
    /// Create or update the database schema and exit.
    Migrate,
    /// Run one overdue reminder pass and exit.
    Remind {
        /// Print who would be reminded instead of sending messages.
        #[arg(long)]
        dry_run: bool,
    },
    /// Serve the read-only dashboard only.
    Dashboard,
    /// Validate configuration and database, then exit.
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Start => handle_start().await,
        Command::Migrate => handle_migrate().await,
        Command::Remind { dry_run } => handle_remind(dry_run).await,
        Command::Dashboard => handle_dashboard().await,
        Command::Check => handle_check().await,
    }
}

/// Load and validate configuration.
fn load_config() -> anyhow::Result<Config> {
    let config = Config::load().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn open_store(config: &Config) -> anyhow::Result<Store> {
    Store::open(&config.database.path, config.database.max_connections)
        .await
        .with_context(|| format!("failed to open {}", config.database.path.display()))
}

/// Run the bot until Ctrl+C.
async fn handle_start() -> anyhow::Result<()> {
    let config = load_config()?;
    let _logging_guard = logging::init_service(Service::Bot, &config.paths.logs_dir)?;

    let token = config.require_bot_token()?.to_owned();
    if config.access.super_admin_ids.is_empty() {
        warn!("no super admin configured; nobody can approve registrations");
    }

    let store = open_store(&config).await?;
    let config = Arc::new(config);
    let bot = Bot::new(token);
    let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::new(bot.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let reminder_handle = if config.reminders.enabled {
        Some(tokio::spawn(reminders::run_reminders(
            store.clone(),
            Arc::clone(&config),
            Arc::clone(&notifier),
            shutdown_rx.clone(),
        )))
    } else {
        info!("reminders disabled");
        None
    };

    let dashboard_handle = if config.dashboard.enabled {
        let store = store.clone();
        let bind = config.dashboard.bind.clone();
        let rx = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = dashboard::serve(store, &bind, rx).await {
                warn!(error = %e, "dashboard stopped with error");
            }
        }))
    } else {
        None
    };

    info!(
        super_admins = config.access.super_admin_ids.len(),
        database = %config.database.path.display(),
        "taskdesk started"
    );

    let ctx = HandlerContext::new(store.clone(), Arc::clone(&config), notifier);
    let result = telegram::run_telegram(bot, ctx).await;

    let _ = shutdown_tx.send(true);
    for handle in [reminder_handle, dashboard_handle].into_iter().flatten() {
        if let Err(e) = handle.await {
            warn!(error = %e, "background task ended abnormally");
        }
    }
    store.close().await;
    info!("taskdesk stopped");
    result
}

/// Apply the schema.
async fn handle_migrate() -> anyhow::Result<()> {
    logging::init_cli();
    let config = load_config()?;
    let store = open_store(&config).await?;
    store.close().await;
    println!("Database ready at {}", config.database.path.display());
    Ok(())
}

/// One reminder pass.
async fn handle_remind(dry_run: bool) -> anyhow::Result<()> {
    logging::init_cli();
    let config = load_config()?;
    let store = open_store(&config).await?;
    let mut state = ReminderState::new();

    if dry_run {
        let recorder = RecordingNotifier::new();
        let summary =
            reminders::run_pass(&store, &config, &recorder, &mut state, Utc::now()).await?;
        for (user_id, message) in recorder.sent() {
            println!("-> {user_id}: {}", message.text.lines().next().unwrap_or(""));
        }
        println!(
            "{} task(s) overdue, {} message(s) would be sent",
            summary.reminded, summary.delivered
        );
    } else {
        let token = config.require_bot_token()?;
        let notifier = TelegramNotifier::new(Bot::new(token));
        let summary =
            reminders::run_pass(&store, &config, &notifier, &mut state, Utc::now()).await?;
        println!(
            "{} task(s) reminded, {} message(s) sent",
            summary.reminded, summary.delivered
        );
    }

    store.close().await;
    Ok(())
}

/// Serve the dashboard until Ctrl+C.
async fn handle_dashboard() -> anyhow::Result<()> {
    let config = load_config()?;
    let _logging_guard = logging::init_service(Service::Dashboard, &config.paths.logs_dir)?;
    let store = open_store(&config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    dashboard::serve(store.clone(), &config.dashboard.bind, shutdown_rx).await?;
    store.close().await;
    Ok(())
}

/// Validate configuration and database.
async fn handle_check() -> anyhow::Result<()> {
    logging::init_cli();
    let config = load_config()?;
    println!("Config: ok");

    match config.require_bot_token() {
        Ok(_) => println!("Bot token: set ({})", config.telegram.bot_token_env),
        Err(e) => println!("Bot token: missing ({e})"),
    }
    println!("Super admins: {}", config.access.super_admin_ids.len());

    let store = open_store(&config).await?;
    let stats = store.overall_stats().await?;
    println!(
        "Database: ok ({} task(s), {} user(s), {} group(s))",
        stats.total_tasks, stats.users, stats.groups
    );
    store.close().await;
    Ok(())
}
