//! # Daycycle: seven-day diary campaign bot
//!
//! Runs the campaign over Telegram: daily prompts, hourly reminders while a
//! response is missing, the nightly missed-day sweep and admin reporting.
//!
//! Usage:
//!   daycycle                              # ~/.daycycle/config.toml + TOKEN/ADMIN_ID env
//!   daycycle --config ./daycycle.toml     # Explicit config file
//!   daycycle --data-dir /var/lib/daycycle # Override where records and media live

mod admin;
mod bot;

use anyhow::{Result, bail};
use clap::Parser;
use daycycle_channels::TelegramChannel;
use daycycle_core::{DaycycleConfig, Transport};
use daycycle_scheduler::{
    DayCycleScheduler, JsonRecordStore, MediaStore, RecordStore, SchedulerSettings,
    SqliteRecordStore, Vocabulary,
};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::admin::AdminCommands;
use crate::bot::Bot;

#[derive(Parser)]
#[command(
    name = "daycycle",
    version,
    about = "🌿 Daycycle: seven-day diary campaign bot"
)]
struct Cli {
    /// Config file (default: ~/.daycycle/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Data directory for records and media (overrides storage.data_dir)
    #[arg(long)]
    data_dir: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

fn open_store(backend: &str, data_dir: &Path) -> Result<Box<dyn RecordStore>> {
    std::fs::create_dir_all(data_dir)?;
    let store: Box<dyn RecordStore> = match backend {
        "json" => Box::new(JsonRecordStore::in_dir(data_dir)),
        "sqlite" => Box::new(SqliteRecordStore::in_dir(data_dir)?),
        other => bail!("Unknown storage backend '{other}' (expected json or sqlite)"),
    };
    Ok(store)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "daycycle=debug,daycycle_scheduler=debug,daycycle_channels=debug"
    } else {
        "daycycle=info,daycycle_scheduler=info,daycycle_channels=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => DaycycleConfig::load_from(&PathBuf::from(expand_path(path)))?,
        None => DaycycleConfig::load()?,
    };
    config.apply_env();
    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir = expand_path(dir);
    }
    if config.telegram.bot_token.is_empty() {
        bail!("No bot token: set TOKEN or telegram.bot_token in the config file");
    }
    if !config.telegram.enabled {
        bail!("telegram.enabled is false, nothing to run");
    }

    let data_dir = config.storage.data_dir();
    let store = open_store(&config.storage.backend, &data_dir)?;
    tracing::info!("🚀 Daycycle v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("💾 Records: {} store in {}", store.name(), data_dir.display());
    if config.admin.admin_id.is_none() {
        tracing::warn!("⚠️ ADMIN_ID not set, admin commands disabled");
    }

    let telegram = TelegramChannel::new(config.telegram.clone());
    let transport: Arc<dyn Transport> = Arc::new(telegram.clone());
    let scheduler = DayCycleScheduler::builder(store, transport)
        .settings(SchedulerSettings::from_config(&config.campaign)?)
        .vocabulary(Vocabulary::from_config(&config.campaign))
        .content(config.content.clone())
        .media(MediaStore::new(config.storage.media_dir()))
        .build()?;

    let summary = scheduler.bootstrap_from_store().await?;
    if let Some(sweep_at) = summary.sweep_at {
        tracing::info!("🌙 Next missed-day sweep at {sweep_at}");
    }

    match telegram.get_me().await {
        Ok(me) => tracing::info!(
            "🤖 Connected as @{}",
            me.username.as_deref().unwrap_or("unknown")
        ),
        Err(e) => tracing::warn!("⚠️ getMe failed: {e}"),
    }

    let admin = AdminCommands::new(scheduler.clone(), telegram.clone(), config.admin.admin_id);
    let bot = Bot::new(scheduler.clone(), admin);
    let mut updates = telegram.start_polling();

    loop {
        tokio::select! {
            next = updates.next() => match next {
                Some(message) => bot.handle(message).await,
                None => {
                    tracing::warn!("⚠️ Polling stream ended");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("👋 Shutting down");
                break;
            }
        }
    }

    scheduler.shutdown().await;
    Ok(())
}
