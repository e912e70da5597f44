//! Connection management for client connections.
//!
//! This module handles the lifecycle of client connections: id assignment,
//! per-connection outbound queues and the delivery seam the dispatcher
//! writes through.

pub mod client;
pub mod manager;
pub mod response;

pub use client::ClientConnection;
pub use gambit_rooms::ConnectionId;
pub use manager::ConnectionManager;
pub use response::{ClientResponseSender, GameServerResponseSender};
