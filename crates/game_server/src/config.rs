//! Server configuration types and defaults.
//!
//! This module contains the server configuration structure and default values
//! used to initialize and customize the game server behavior.

use gambit_rooms::RoomPolicy;
use std::net::SocketAddr;

/// Configuration structure for the game server.
///
/// Contains all necessary parameters to configure server behavior including
/// network settings, room limits, clock cadence, garbage collection and the
/// external chain collaborators.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The socket address to bind the server to
    pub bind_address: SocketAddr,

    /// Maximum number of concurrent connections allowed
    pub max_connections: usize,

    /// Whether to use SO_REUSEPORT for multi-threaded accept loops
    pub use_reuse_port: bool,

    /// Interval between clock broadcasts for a running game
    pub tick_interval_ms: u64,

    /// Interval between garbage-collection sweeps of the room registry
    pub sweep_interval_secs: u64,

    /// Whether every room-mutating event requires an authenticated session
    pub require_auth: bool,

    /// Limits applied to every room
    pub rooms: RoomPolicy,

    /// Per-connection action throttling
    pub rate_limit: RateLimitConfig,

    /// Settlement retry behavior and external call timeouts
    pub chain: ChainConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8080)),
            max_connections: 1000,
            use_reuse_port: false,
            tick_interval_ms: 100,
            sweep_interval_secs: 300,
            require_auth: false,
            rooms: RoomPolicy::default(),
            rate_limit: RateLimitConfig::default(),
            chain: ChainConfig::default(),
        }
    }
}

/// Sliding-window rate limit applied to each connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Actions allowed per window
    pub max_actions: u32,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_actions: 30,
            window_secs: 10,
        }
    }
}

/// Timeouts and retry policy for the balance, verification and settlement
/// capabilities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    /// Upper bound on a single balance check or token verification
    pub request_timeout_ms: u64,
    /// Upper bound on waiting for a settlement receipt
    pub confirmation_timeout_ms: u64,
    /// Total settlement attempts before giving up
    pub settlement_attempts: u32,
    /// Delay before the first retry; doubles on each subsequent retry
    pub retry_base_delay_ms: u64,
    /// Cap on the retry delay
    pub retry_max_delay_ms: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 5_000,
            confirmation_timeout_ms: 60_000,
            settlement_attempts: 3,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 10_000,
        }
    }
}
