//! Utility functions for server creation.

use crate::capabilities::{Capabilities, DisabledVerifier, InMemoryLedger};
use crate::config::ServerConfig;
use crate::server::GameServer;
use gambit_rooms::{SystemTimeSource, TimeSource};
use std::sync::Arc;

/// Creates a server with default configuration, an in-memory ledger and
/// token authentication disabled.
///
/// # Returns
///
/// A new `GameServer` instance.
pub fn create_server() -> GameServer {
    let config = ServerConfig::default();
    let ledger = Arc::new(InMemoryLedger::new(config.rooms.max_stake));
    let capabilities = Capabilities::in_memory(ledger, Arc::new(DisabledVerifier));
    create_server_with_config(config, capabilities)
}

/// Creates a server with custom configuration and capabilities, using the
/// system clock.
///
/// # Arguments
///
/// * `config` - Server configuration to use
/// * `capabilities` - Token, balance and settlement backends
///
/// # Returns
///
/// A new `GameServer` instance.
pub fn create_server_with_config(config: ServerConfig, capabilities: Capabilities) -> GameServer {
    let time: Arc<dyn TimeSource> = Arc::new(SystemTimeSource::new());
    GameServer::new(config, capabilities, time)
}
