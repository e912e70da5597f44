//! Server implementation module.
//!
//! This module contains the core game server and the per-connection
//! WebSocket handler.

pub mod core;
pub mod handlers;

pub use core::GameServer;
