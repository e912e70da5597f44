//! Outbound delivery seam.
//!
//! The dispatcher never touches sockets. It hands serialized frames to a
//! [`ClientResponseSender`], which in production is backed by the
//! [`ConnectionManager`] and in tests by a recorder.

use super::manager::ConnectionManager;
use gambit_rooms::ConnectionId;
use std::sync::Arc;

/// Delivers serialized frames to clients.
pub trait ClientResponseSender: Send + Sync + std::fmt::Debug {
    /// Queues `payload` for one connection.
    ///
    /// # Returns
    ///
    /// `true` if the frame was queued, `false` if the connection is gone.
    fn send_to_client(&self, connection_id: ConnectionId, payload: String) -> bool;

    /// Queues `payload` for every open connection.
    fn broadcast(&self, payload: &str);

    /// Checks if a connection is currently open.
    fn is_connection_active(&self, connection_id: ConnectionId) -> bool;
}

/// Implementation of [`ClientResponseSender`] for the game server.
///
/// Wraps the connection manager so frames land on each connection's
/// outbound queue and are written by its writer task.
#[derive(Clone, Debug)]
pub struct GameServerResponseSender {
    /// Reference to the connection manager for looking up and messaging connections
    connection_manager: Arc<ConnectionManager>,
}

impl GameServerResponseSender {
    /// Creates a new response sender with the given connection manager.
    ///
    /// # Arguments
    ///
    /// * `connection_manager` - The connection manager to use for sending responses
    pub fn new(connection_manager: Arc<ConnectionManager>) -> Self {
        Self { connection_manager }
    }
}

impl ClientResponseSender for GameServerResponseSender {
    fn send_to_client(&self, connection_id: ConnectionId, payload: String) -> bool {
        self.connection_manager
            .send_to_connection(connection_id, payload)
    }

    fn broadcast(&self, payload: &str) {
        self.connection_manager.broadcast_to_all(payload);
    }

    fn is_connection_active(&self, connection_id: ConnectionId) -> bool {
        self.connection_manager.is_connected(connection_id)
    }
}
