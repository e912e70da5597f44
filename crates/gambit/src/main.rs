//! Main application entry point for the gambit chess server.
//!
//! Provides CLI interface, configuration loading, logging setup and the
//! server lifecycle with a periodic health report.

mod cli;
mod config;
mod signals;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use gambit_rooms::{SystemTimeSource, TimeSource};
use game_server::capabilities::{
    Capabilities, DisabledVerifier, InMemoryLedger, RelayerClient, SharedSecretVerifier,
    TokenVerifier,
};
use game_server::{GameServer, StatsSnapshot};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::CliArgs;
use config::{AppConfig, LoggingSettings};
use signals::setup_signal_handlers;

const HEALTH_REPORT_INTERVAL: Duration = Duration::from_secs(60);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Initialize logging system
fn setup_logging(config: &LoggingSettings) -> anyhow::Result<()> {
    let log_level = config.level.as_str();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if config.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()?;
    }

    info!("🔧 Logging initialized with level: {}", log_level);
    Ok(())
}

/// Picks the token verifier and the ledger backends from configuration.
fn build_capabilities(config: &AppConfig, time: Arc<dyn TimeSource>) -> Capabilities {
    let verifier: Arc<dyn TokenVerifier> = match &config.chain.auth_secret {
        Some(secret) => Arc::new(SharedSecretVerifier::new(secret.clone(), time)),
        None => {
            warn!("🔓 No auth_secret configured, session authentication is disabled");
            Arc::new(DisabledVerifier)
        }
    };

    match &config.chain.relayer_url {
        Some(url) => {
            info!("⛓️ Using relayer at {}", url);
            let relayer = Arc::new(RelayerClient::new(url, config.chain.request_timeout_ms));
            Capabilities {
                verifier,
                balances: relayer.clone(),
                settlement: relayer,
            }
        }
        None => {
            warn!("📒 No relayer_url configured, using the in-memory ledger");
            let ledger = Arc::new(InMemoryLedger::new(config.rooms.max_stake));
            Capabilities::in_memory(ledger, verifier)
        }
    }
}

fn log_stats(label: &str, stats: &StatsSnapshot, rooms: usize, connections: usize) {
    info!(
        rooms,
        connections,
        rooms_created = stats.rooms_created,
        rooms_finished = stats.rooms_finished,
        rooms_swept = stats.rooms_swept,
        moves = stats.moves_played,
        bets = stats.bets_placed,
        settlements_confirmed = stats.settlements_confirmed,
        settlements_failed = stats.settlements_failed,
        errors = stats.errors,
        rate_limited = stats.rate_limited,
        "📊 {}",
        label
    );
}

/// Main application struct
pub struct Application {
    config: AppConfig,
    server: Arc<GameServer>,
}

impl Application {
    /// Loads configuration, applies CLI overrides, installs logging and
    /// builds the server.
    pub async fn new(args: CliArgs) -> anyhow::Result<Self> {
        let mut config = AppConfig::load_from_file(&args.config_path)
            .await
            .with_context(|| format!("loading {}", args.config_path.display()))?;

        if let Some(bind_address) = args.bind_address {
            config.server.bind_address = bind_address;
        }
        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }
        if args.json_logs {
            config.logging.json_format = true;
        }

        config
            .validate()
            .map_err(|e| anyhow::anyhow!("Configuration validation failed: {e}"))?;

        setup_logging(&config.logging)?;

        let version = option_env!("CARGO_PKG_VERSION").unwrap_or("UNK");
        info!("♟️ Gambit Chess Server v{}", version);
        info!("📂 Config: {}", args.config_path.display());

        let time: Arc<dyn TimeSource> = Arc::new(SystemTimeSource::new());
        let capabilities = build_capabilities(&config, time.clone());
        let server = GameServer::new(config.to_server_config()?, capabilities, time);

        Ok(Self {
            config,
            server: Arc::new(server),
        })
    }

    /// Runs until a shutdown signal arrives.
    pub async fn run(self) -> anyhow::Result<()> {
        info!("📋 Configuration Summary:");
        info!("  🌐 Bind address: {}", self.config.server.bind_address);
        info!("  👥 Max connections: {}", self.config.server.max_connections);
        info!(
            "  ⏱️ Tick: {}ms | Sweep: {}s | Grace: {}s",
            self.config.server.tick_interval_ms,
            self.config.server.sweep_interval_secs,
            self.config.server.reconnect_grace_secs
        );
        info!(
            "  💰 Max stake: {} | House fee: {}bps",
            self.config.rooms.max_stake, self.config.rooms.house_fee_bps
        );
        info!("  🔐 Require auth: {}", self.config.server.require_auth);

        let server_handle = {
            let server = self.server.clone();
            tokio::spawn(async move {
                match server.start().await {
                    Ok(()) => info!("✅ Server completed successfully"),
                    Err(e) => {
                        error!("❌ Server error: {}", e);
                        std::process::exit(1);
                    }
                }
            })
        };

        let monitoring_handle = {
            let dispatcher = self.server.dispatcher();
            let connections = self.server.connection_manager();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(HEALTH_REPORT_INTERVAL);
                interval.tick().await;
                let mut last_moves = 0u64;

                loop {
                    interval.tick().await;
                    let stats = dispatcher.stats().snapshot();
                    log_stats(
                        "System Health",
                        &stats,
                        dispatcher.registry().len(),
                        connections.connection_count(),
                    );

                    let moves_this_period = stats.moves_played - last_moves;
                    last_moves = stats.moves_played;
                    if moves_this_period > 1000 {
                        info!(
                            "🔥 High activity detected - {} moves played this minute",
                            moves_this_period
                        );
                    }
                }
            })
        };

        info!(
            "🎮 Ready to accept connections on {}",
            self.config.server.bind_address
        );
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        setup_signal_handlers().await?;

        info!("🛑 Shutdown signal received, initiating graceful shutdown...");
        monitoring_handle.abort();
        self.server.shutdown().await?;

        if tokio::time::timeout(SHUTDOWN_GRACE, server_handle).await.is_err() {
            warn!("⏳ Server did not stop within {:?}", SHUTDOWN_GRACE);
        }

        let dispatcher = self.server.dispatcher();
        log_stats(
            "Final Statistics",
            &dispatcher.stats().snapshot(),
            dispatcher.registry().len(),
            self.server.connection_manager().connection_count(),
        );
        info!("👋 Gambit shutdown complete");
        Ok(())
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("❌ Failed to start application: {:?}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gambit_rooms::{ManualTimeSource, WalletAddress};
    use game_server::capabilities::BalanceOracle;

    #[tokio::test]
    async fn in_memory_backends_without_relayer() {
        let config = AppConfig::default();
        let time: Arc<dyn TimeSource> = Arc::new(ManualTimeSource::new(0));
        let capabilities = build_capabilities(&config, time);
        assert!(capabilities.verifier.verify("anything").await.is_err());
        assert_eq!(
            capabilities
                .balances
                .balance_of(&WalletAddress::parse("0xabc").unwrap())
                .await,
            Ok(config.rooms.max_stake)
        );
    }

    #[tokio::test]
    async fn application_builds_from_a_fresh_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let args = CliArgs {
            config_path: dir.path().join("config.toml"),
            bind_address: Some("127.0.0.1:0".to_string()),
            log_level: Some("warn".to_string()),
            json_logs: false,
        };
        let app = Application::new(args).await.unwrap();
        assert_eq!(app.config.server.bind_address, "127.0.0.1:0");
        assert_eq!(app.config.logging.level, "warn");
        assert!(dir.path().join("config.toml").exists());
    }
}
