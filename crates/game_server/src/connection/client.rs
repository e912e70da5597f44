//! Client connection representation.
//!
//! This module defines the structure of individual client connections,
//! tracking their metadata and the outbound queue that feeds the socket
//! writer task.

use std::net::SocketAddr;
use std::time::SystemTime;
use tokio::sync::mpsc;

/// Represents an individual client connection to the server.
///
/// # Fields
///
/// * `remote_addr` - The network address of the connected client
/// * `connected_at` - Timestamp when the connection was established
/// * `sender` - Queue of serialized frames awaiting delivery
#[derive(Debug)]
pub struct ClientConnection {
    /// The remote network address of the client
    pub remote_addr: SocketAddr,

    /// When this connection was established
    pub connected_at: SystemTime,

    /// Outbound frames, drained by the connection's writer task
    sender: mpsc::UnboundedSender<String>,
}

impl ClientConnection {
    /// Creates a new client connection and the receiving half of its
    /// outbound queue.
    ///
    /// # Arguments
    ///
    /// * `remote_addr` - The network address of the connecting client
    ///
    /// # Returns
    ///
    /// The connection and the receiver its writer task should drain.
    pub fn new(remote_addr: SocketAddr) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                remote_addr,
                connected_at: SystemTime::now(),
                sender,
            },
            receiver,
        )
    }

    /// Queues a frame. Returns `false` once the writer task has gone away.
    pub fn send(&self, payload: String) -> bool {
        self.sender.send(payload).is_ok()
    }
}
