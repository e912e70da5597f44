//! Configuration management for the gambit server.
//!
//! This module handles loading, validation, and conversion of server configuration
//! from TOML files and command-line arguments.

use gambit_rooms::policy::DEFAULT_MAX_STAKE;
use gambit_rooms::{RoomPolicy, TokenAmount};
use game_server::{ChainConfig, RateLimitConfig, ServerConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Application configuration loaded from TOML file.
///
/// Every section may be omitted; missing sections and fields take their
/// defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Network, cadence and session settings
    pub server: ServerSettings,
    /// Limits applied to every room
    pub rooms: RoomSettings,
    /// Per-connection action throttling
    pub rate_limit: RateLimitSettings,
    /// Relayer, token verification and settlement retry
    pub chain: ChainSettings,
    /// Logging configuration settings
    pub logging: LoggingSettings,
}

/// Server-specific configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Network address to bind the server to (e.g., "127.0.0.1:8080")
    pub bind_address: String,
    /// Maximum number of concurrent client connections
    pub max_connections: usize,
    /// Whether to use SO_REUSEPORT for multi-threaded accept loops
    pub use_reuse_port: bool,
    /// Clock broadcast cadence for running games, in milliseconds
    pub tick_interval_ms: u64,
    /// Interval between room garbage-collection sweeps
    pub sweep_interval_secs: u64,
    /// Inactivity after which any room is swept
    pub room_ttl_secs: u64,
    /// How long a room with no connected player waits for a reconnect
    pub reconnect_grace_secs: u64,
    /// Require an authenticated session for every room-mutating event
    pub require_auth: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            max_connections: 1000,
            use_reuse_port: false,
            tick_interval_ms: 100,
            sweep_interval_secs: 300,
            room_ttl_secs: 86_400,
            reconnect_grace_secs: 60,
            require_auth: false,
        }
    }
}

/// Room limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomSettings {
    pub min_minutes: u32,
    pub max_minutes: u32,
    pub max_increment_secs: u32,
    /// Largest stake, in smallest token units
    pub max_stake: TokenAmount,
    pub max_spectators: usize,
    pub max_chat_messages: usize,
    /// House cut of a won pot, in basis points
    pub house_fee_bps: u32,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            min_minutes: 1,
            max_minutes: 60,
            max_increment_secs: 60,
            max_stake: DEFAULT_MAX_STAKE,
            max_spectators: 100,
            max_chat_messages: 1000,
            house_fee_bps: 250,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub max_actions: u32,
    pub window_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        let defaults = RateLimitConfig::default();
        Self {
            enabled: defaults.enabled,
            max_actions: defaults.max_actions,
            window_secs: defaults.window_secs,
        }
    }
}

/// External chain collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainSettings {
    /// Base URL of the relayer; an in-memory ledger is used when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relayer_url: Option<String>,
    /// Shared secret for session tokens; authentication is disabled when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_secret: Option<String>,
    pub request_timeout_ms: u64,
    pub confirmation_timeout_ms: u64,
    pub settlement_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for ChainSettings {
    fn default() -> Self {
        let defaults = ChainConfig::default();
        Self {
            relayer_url: None,
            auth_secret: None,
            request_timeout_ms: defaults.request_timeout_ms,
            confirmation_timeout_ms: defaults.confirmation_timeout_ms,
            settlement_attempts: defaults.settlement_attempts,
            retry_base_delay_ms: defaults.retry_base_delay_ms,
            retry_max_delay_ms: defaults.retry_max_delay_ms,
        }
    }
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at the specified path
    /// and returns the default configuration.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// The loaded or default configuration, or an error if loading/creation failed.
    pub async fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Converts the application configuration to a game server configuration.
    ///
    /// # Returns
    ///
    /// A `ServerConfig` instance ready for use with the game server.
    pub fn to_server_config(&self) -> anyhow::Result<ServerConfig> {
        let rooms = RoomPolicy {
            min_minutes: self.rooms.min_minutes,
            max_minutes: self.rooms.max_minutes,
            max_increment_secs: self.rooms.max_increment_secs,
            max_stake: self.rooms.max_stake,
            max_spectators: self.rooms.max_spectators,
            max_chat_messages: self.rooms.max_chat_messages,
            house_fee_bps: self.rooms.house_fee_bps,
            reconnect_grace_ms: self.server.reconnect_grace_secs.saturating_mul(1000),
            room_ttl_ms: self.server.room_ttl_secs.saturating_mul(1000),
        };

        Ok(ServerConfig {
            bind_address: self.server.bind_address.parse()?,
            max_connections: self.server.max_connections,
            use_reuse_port: self.server.use_reuse_port,
            tick_interval_ms: self.server.tick_interval_ms,
            sweep_interval_secs: self.server.sweep_interval_secs,
            require_auth: self.server.require_auth,
            rooms,
            rate_limit: RateLimitConfig {
                enabled: self.rate_limit.enabled,
                max_actions: self.rate_limit.max_actions,
                window_secs: self.rate_limit.window_secs,
            },
            chain: ChainConfig {
                request_timeout_ms: self.chain.request_timeout_ms,
                confirmation_timeout_ms: self.chain.confirmation_timeout_ms,
                settlement_attempts: self.chain.settlement_attempts,
                retry_base_delay_ms: self.chain.retry_base_delay_ms,
                retry_max_delay_ms: self.chain.retry_max_delay_ms,
            },
        })
    }

    /// Validates the configuration for consistency and correctness.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is valid, or an error string describing the issue.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!(
                "Invalid bind address: {}",
                &self.server.bind_address
            ));
        }
        if self.server.max_connections == 0 {
            return Err("max_connections must be greater than zero".to_string());
        }
        if self.server.tick_interval_ms == 0 {
            return Err("tick_interval_ms must be greater than zero".to_string());
        }
        if self.server.room_ttl_secs == 0 {
            return Err("room_ttl_secs must be greater than zero".to_string());
        }

        if self.rooms.min_minutes == 0 || self.rooms.min_minutes > self.rooms.max_minutes {
            return Err("Room min_minutes must be between 1 and max_minutes".to_string());
        }
        if self.rooms.house_fee_bps > 10_000 {
            return Err("house_fee_bps cannot exceed 10000".to_string());
        }

        if self.rate_limit.enabled
            && (self.rate_limit.max_actions == 0 || self.rate_limit.window_secs == 0)
        {
            return Err("Rate limit window and max_actions must be greater than zero".to_string());
        }

        if self.chain.settlement_attempts == 0 {
            return Err("settlement_attempts must be at least 1".to_string());
        }
        if self.chain.retry_base_delay_ms > self.chain.retry_max_delay_ms {
            return Err("retry_base_delay_ms must not exceed retry_max_delay_ms".to_string());
        }
        if let Some(url) = &self.chain.relayer_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(format!("Invalid relayer URL: {url}"));
            }
        }
        if self.chain.auth_secret.as_deref() == Some("") {
            return Err("auth_secret cannot be empty".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}
