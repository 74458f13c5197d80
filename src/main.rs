//! ticketd - support ticket bot for Discord.
//!
//! Staff post ticket panels; members open private ticket channels from them,
//! and the bot walks each ticket through close, reopen, transcript and delete.

mod config;
mod db;
mod error;
mod handlers;
mod http;
mod metrics;
mod network;
mod panel;
mod platform;
mod telemetry;
mod ticket;
mod views;

use crate::config::Config;
use crate::config::validation::validate;
use crate::db::Database;
use crate::handlers::Dispatcher;
use crate::network::Gateway;
use crate::panel::PanelRegistry;
use crate::platform::GuildId;
use crate::platform::discord::DiscordPlatform;
use crate::telemetry::spans;
use crate::ticket::{TicketEngine, TranscriptStager};
use serenity::all::{Client, GatewayIntents};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, error, info, warn};
use tracing_subscriber::EnvFilter;

/// How often abandoned ticket rows are purged after startup.
const RECOVERY_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    if let Err(errors) = validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        return Err(anyhow::anyhow!(
            "{} configuration error(s) in {config_path}",
            errors.len()
        ));
    }
    let token = config
        .discord
        .resolve_token()
        .ok_or_else(|| anyhow::anyhow!("no bot token configured"))?;

    info!(
        database = %config.database.path,
        guild = ?config.discord.command_guild,
        "Starting ticketd"
    );

    // Initialize database
    let db = Database::new(&config.database.path)
        .instrument(spans::startup("database"))
        .await?;

    metrics::init();
    if let Some(port) = config.metrics.port {
        tokio::spawn(http::run_metrics_server(port));
        info!(port, "Prometheus HTTP server started");
    } else {
        info!("Metrics endpoint disabled");
    }

    let platform = Arc::new(
        DiscordPlatform::connect(&token)
            .instrument(spans::startup("platform"))
            .await?,
    );

    let engine = Arc::new(TicketEngine::new(
        db.clone(),
        platform.clone(),
        TranscriptStager::new(config.transcripts.staging_dir()),
        config.tickets.clone(),
    ));
    let panels = Arc::new(PanelRegistry::new(db.clone(), platform));

    // Purge rows from creates interrupted by a previous shutdown before
    // accepting interactions, then keep doing so periodically.
    let purged = engine
        .recover_on_startup()
        .instrument(spans::startup("recovery"))
        .await?;
    info!(purged, "Startup recovery complete");
    {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(RECOVERY_INTERVAL);
            // The first tick completes immediately; startup already ran.
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = engine.recover_on_startup().await {
                    warn!(error = %e, "Failed to purge abandoned tickets");
                }
            }
        });
    }

    let dispatcher = Arc::new(Dispatcher::new(engine, panels));
    let gateway = Gateway::new(dispatcher, config.discord.command_guild.map(GuildId));

    let mut client = Client::builder(&token, GatewayIntents::GUILDS)
        .event_handler(gateway)
        .await?;
    let shard_manager = client.shard_manager.clone();

    tokio::select! {
        result = client.start() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
            shard_manager.shutdown_all().await;
        }
    }

    Ok(())
}
