//! Live connection registry.

use super::client::ClientConnection;
use dashmap::DashMap;
use gambit_rooms::ConnectionId;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Tracks every open WebSocket connection and its outbound queue.
///
/// Connection ids are assigned here, are never reused during the life of
/// the process and start at 1.
#[derive(Debug)]
pub struct ConnectionManager {
    connections: DashMap<ConnectionId, ClientConnection>,
    next_id: AtomicU64,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a new connection.
    ///
    /// # Arguments
    ///
    /// * `remote_addr` - The client's address
    ///
    /// # Returns
    ///
    /// The assigned id and the receiver the writer task drains.
    pub fn add_connection(
        &self,
        remote_addr: SocketAddr,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (connection, receiver) = ClientConnection::new(remote_addr);
        self.connections.insert(id, connection);
        info!(connection_id = id, %remote_addr, "🔗 Connection registered");
        (id, receiver)
    }

    pub fn remove_connection(&self, connection_id: ConnectionId) {
        if let Some((_, connection)) = self.connections.remove(&connection_id) {
            let lifetime = connection.connected_at.elapsed().unwrap_or_default();
            info!(
                connection_id,
                remote_addr = %connection.remote_addr,
                lifetime_secs = lifetime.as_secs(),
                "🔌 Connection removed"
            );
        }
    }

    /// Queues a frame for one connection. Returns `false` if it is gone.
    pub fn send_to_connection(&self, connection_id: ConnectionId, payload: String) -> bool {
        match self.connections.get(&connection_id) {
            Some(connection) => connection.send(payload),
            None => {
                debug!(connection_id, "Dropping frame for unknown connection");
                false
            }
        }
    }

    /// Queues a frame for every open connection.
    pub fn broadcast_to_all(&self, payload: &str) {
        for entry in self.connections.iter() {
            entry.value().send(payload.to_string());
        }
    }

    pub fn is_connected(&self, connection_id: ConnectionId) -> bool {
        self.connections.contains_key(&connection_id)
    }

    pub fn remote_addr(&self, connection_id: ConnectionId) -> Option<SocketAddr> {
        self.connections.get(&connection_id).map(|c| c.remote_addr)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[test]
    fn ids_are_unique_and_frames_are_queued() {
        let manager = ConnectionManager::new();
        let (a, mut rx_a) = manager.add_connection(addr());
        let (b, mut rx_b) = manager.add_connection(addr());
        assert_ne!(a, b);
        assert_eq!(manager.connection_count(), 2);

        assert!(manager.send_to_connection(a, "hello".into()));
        manager.broadcast_to_all("all");
        assert_eq!(rx_a.try_recv().unwrap(), "hello");
        assert_eq!(rx_a.try_recv().unwrap(), "all");
        assert_eq!(rx_b.try_recv().unwrap(), "all");

        manager.remove_connection(a);
        assert!(!manager.send_to_connection(a, "late".into()));
        assert!(!manager.is_connected(a));
        assert_eq!(manager.remote_addr(b), Some(addr()));
    }
}
