//! Session tracking.
//!
//! A session exists for every open connection. It starts anonymous, may be
//! bound to a verified wallet by `authenticate`, and remembers which rooms
//! the connection joined so a disconnect can be fanned out to each of them.

use dashmap::DashMap;
use gambit_rooms::{ConnectionId, RoomId, WalletAddress};
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Verified wallet, set by a successful `authenticate`.
    pub wallet: Option<WalletAddress>,
    pub rooms: HashSet<RoomId>,
    pub connected_at: u64,
}

#[derive(Debug, Default)]
pub struct SessionTracker {
    sessions: DashMap<ConnectionId, Session>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, connection_id: ConnectionId, now: u64) {
        self.sessions.insert(
            connection_id,
            Session {
                connected_at: now,
                ..Session::default()
            },
        );
        debug!(connection_id, "Session opened");
    }

    /// Removes the session, returning it so the caller can walk its rooms.
    pub fn close(&self, connection_id: ConnectionId) -> Option<Session> {
        self.sessions.remove(&connection_id).map(|(_, s)| s)
    }

    pub fn exists(&self, connection_id: ConnectionId) -> bool {
        self.sessions.contains_key(&connection_id)
    }

    /// Binds a verified wallet. Returns `false` if the session is gone.
    pub fn authenticate(&self, connection_id: ConnectionId, wallet: WalletAddress) -> bool {
        match self.sessions.get_mut(&connection_id) {
            Some(mut session) => {
                session.wallet = Some(wallet);
                true
            }
            None => false,
        }
    }

    pub fn wallet(&self, connection_id: ConnectionId) -> Option<WalletAddress> {
        self.sessions
            .get(&connection_id)
            .and_then(|s| s.wallet.clone())
    }

    pub fn join_room(&self, connection_id: ConnectionId, room_id: RoomId) {
        if let Some(mut session) = self.sessions.get_mut(&connection_id) {
            session.rooms.insert(room_id);
        }
    }

    pub fn leave_room(&self, connection_id: ConnectionId, room_id: &RoomId) {
        if let Some(mut session) = self.sessions.get_mut(&connection_id) {
            session.rooms.remove(room_id);
        }
    }

    pub fn rooms(&self, connection_id: ConnectionId) -> Vec<RoomId> {
        self.sessions
            .get(&connection_id)
            .map(|s| s.rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
