//! # Game Server - Chess Room Host
//!
//! The network edge and orchestration layer for wagered chess rooms. The
//! room state machine itself lives in `gambit_rooms`; this crate owns
//! everything around it.
//!
//! ## Architecture Overview
//!
//! * **Connection Manager** - WebSocket lifecycle and per-connection
//!   outbound queues
//! * **Messaging** - `{event, data}` envelopes validated into typed commands
//! * **Dispatcher** - Sessions, per-room serialization, clock tickers,
//!   lobby broadcasts and settlement tasks
//! * **Capabilities** - Token verification, balance checks and on-chain
//!   settlement behind async traits
//!
//! ### Message Flow
//!
//! 1. Client sends a WebSocket text frame `{"event": ..., "data": {...}}`
//! 2. The frame is rate limited, parsed and validated into a `Command`
//! 3. The dispatcher locks the target room and applies the command
//! 4. The resulting events are fanned out to the room, the requester or a
//!    single connection; effects start tickers or settlement
//!
//! Every rejected request yields exactly one `error` event carrying a
//! message and an error kind.
//!
//! ## Error Handling
//!
//! * [`ServerError`] - Network, configuration and internal failures
//! * [`GatewayError`] - Anything that refuses a single client request

pub use config::{ChainConfig, RateLimitConfig, ServerConfig};
pub use dispatcher::Dispatcher;
pub use error::{ExternalError, GatewayError, ServerError};
pub use server::GameServer;
pub use stats::{ServerStats, StatsSnapshot};
pub use utils::{create_server, create_server_with_config};

pub mod capabilities;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod messaging;
pub mod rate_limit;
pub mod server;
pub mod session;
pub mod settlement;
pub mod stats;
pub mod utils;
