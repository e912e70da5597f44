//! Process-wide room registry.
//!
//! The registry is the only structure shared by every inbound flow. It maps
//! room ids to rooms, each behind its own async mutex so unrelated games
//! never contend. Lobby listing and sweeping snapshot the map first and lock
//! rooms one at a time afterwards; neither holds a map guard across an
//! await point.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::color::Color;
use crate::error::RoomError;
use crate::events::{LobbyEntry, TimeControl, Transition};
use crate::identity::{ConnectionId, RoomId, WalletAddress};
use crate::policy::RoomPolicy;
use crate::room::{NewRoom, Room, RoomStatus};
use crate::stake::TokenAmount;
use crate::time::TimeSource;

pub type RoomHandle = Arc<Mutex<Room>>;

const ID_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const GENERATED_ID_LEN: usize = 8;
const MAX_EXTERNAL_ID_LEN: usize = 64;

/// A room creation request.
#[derive(Debug, Clone)]
pub struct CreateRoom {
    pub creator: WalletAddress,
    pub connection: ConnectionId,
    pub time_control: TimeControl,
    pub stake: TokenAmount,
    /// On-chain game id, when the room mirrors an existing contract game.
    pub room_id: Option<RoomId>,
}

/// A room removed by [`RoomRegistry::sweep`], with what its members must
/// still be told.
#[derive(Debug)]
pub struct SweptRoom {
    pub id: RoomId,
    /// Still usable after removal, e.g. to record a refund settlement.
    pub room: RoomHandle,
    pub connections: Vec<ConnectionId>,
    pub transition: Transition,
}

#[derive(Debug)]
struct RegistryEntry {
    seq: u64,
    room: RoomHandle,
}

#[derive(Debug)]
pub struct RoomRegistry {
    rooms: DashMap<RoomId, RegistryEntry>,
    next_seq: AtomicU64,
    policy: Arc<RoomPolicy>,
    time: Arc<dyn TimeSource>,
}

impl RoomRegistry {
    pub fn new(policy: RoomPolicy, time: Arc<dyn TimeSource>) -> Self {
        Self {
            rooms: DashMap::new(),
            next_seq: AtomicU64::new(0),
            policy: Arc::new(policy),
            time,
        }
    }

    pub fn policy(&self) -> &RoomPolicy {
        &self.policy
    }

    pub fn time(&self) -> &Arc<dyn TimeSource> {
        &self.time
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Validates and registers a new room with the creator on a random
    /// color. Returns the handle together with the creator's replies.
    pub fn create(&self, request: CreateRoom) -> Result<(RoomHandle, Transition), RoomError> {
        self.policy.check_time_control(
            request.time_control.minutes,
            request.time_control.increment_secs,
        )?;
        self.policy.check_stake(request.stake)?;

        let creator_color = if rand::thread_rng().gen_bool(0.5) {
            Color::White
        } else {
            Color::Black
        };
        let make = |id: RoomId| {
            Room::new(
                NewRoom {
                    id,
                    creator: request.creator.clone(),
                    connection: request.connection,
                    creator_color,
                    time_control: request.time_control,
                    stake: request.stake,
                },
                self.policy.clone(),
                self.time.clone(),
            )
        };

        let (id, handle, transition) = match request.room_id.clone() {
            Some(id) => {
                validate_external_id(&id)?;
                match self.rooms.entry(id.clone()) {
                    Entry::Occupied(_) => return Err(RoomError::RoomExists(id)),
                    Entry::Vacant(slot) => {
                        let (handle, transition) = self.insert(slot, make(id.clone()));
                        (id, handle, transition)
                    }
                }
            }
            None => loop {
                let id = generate_room_id();
                if let Entry::Vacant(slot) = self.rooms.entry(id.clone()) {
                    let (handle, transition) = self.insert(slot, make(id.clone()));
                    break (id, handle, transition);
                }
                debug!(room_id = %id, "Generated room id collided, re-rolling");
            },
        };

        info!(
            room_id = %id,
            creator = %request.creator,
            color = %creator_color,
            stake = %request.stake,
            "🎲 Room created"
        );
        Ok((handle, transition))
    }

    fn insert(
        &self,
        slot: dashmap::mapref::entry::VacantEntry<'_, RoomId, RegistryEntry>,
        room: Room,
    ) -> (RoomHandle, Transition) {
        let transition = room.created();
        let handle = Arc::new(Mutex::new(room));
        slot.insert(RegistryEntry {
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            room: handle.clone(),
        });
        (handle, transition)
    }

    pub fn get(&self, id: &RoomId) -> Result<RoomHandle, RoomError> {
        self.rooms
            .get(id)
            .map(|entry| entry.room.clone())
            .ok_or_else(|| RoomError::RoomNotFound(id.clone()))
    }

    pub fn remove(&self, id: &RoomId) -> Option<RoomHandle> {
        self.rooms.remove(id).map(|(_, entry)| entry.room)
    }

    /// Summaries of every unfinished room, oldest first.
    pub async fn list_public(&self) -> Vec<LobbyEntry> {
        let mut lobby = Vec::new();
        for (_, handle) in self.snapshot() {
            let room = handle.lock().await;
            if room.status() != RoomStatus::Finished {
                lobby.push(room.lobby_entry());
            }
        }
        lobby
    }

    /// Removes rooms idle past the TTL or abandoned past the grace period.
    /// Unfinished rooms are closed first so their members get a result.
    pub async fn sweep(&self, now: u64) -> Vec<SweptRoom> {
        let mut swept = Vec::new();
        for (id, handle) in self.snapshot() {
            let mut room = handle.lock().await;
            if !room.is_expired(now) {
                continue;
            }
            let connections = room.member_connections();
            let transition = room.close();
            drop(room);
            self.rooms.remove(&id);
            info!(room_id = %id, "🧹 Room swept");
            swept.push(SweptRoom {
                id,
                room: handle.clone(),
                connections,
                transition,
            });
        }
        swept
    }

    fn snapshot(&self) -> Vec<(RoomId, RoomHandle)> {
        let mut entries: Vec<(u64, RoomId, RoomHandle)> = self
            .rooms
            .iter()
            .map(|e| (e.value().seq, e.key().clone(), e.value().room.clone()))
            .collect();
        entries.sort_by_key(|(seq, _, _)| *seq);
        entries.into_iter().map(|(_, id, room)| (id, room)).collect()
    }
}

fn validate_external_id(id: &RoomId) -> Result<(), RoomError> {
    let raw = id.as_str();
    let valid = !raw.is_empty()
        && raw.len() <= MAX_EXTERNAL_ID_LEN
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(RoomError::InvalidInput(format!("'{raw}' is not a valid room id")))
    }
}

/// Eight uppercase base-36 characters.
pub fn generate_room_id() -> RoomId {
    let mut rng = rand::thread_rng();
    let id: String = (0..GENERATED_ID_LEN)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect();
    RoomId::new(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualTimeSource;

    fn registry() -> (RoomRegistry, Arc<ManualTimeSource>) {
        let time = Arc::new(ManualTimeSource::new(0));
        (RoomRegistry::new(RoomPolicy::default(), time.clone()), time)
    }

    fn request(creator: &str, room_id: Option<&str>) -> CreateRoom {
        CreateRoom {
            creator: WalletAddress::parse(creator).unwrap(),
            connection: 1,
            time_control: TimeControl {
                minutes: 5,
                increment_secs: 0,
            },
            stake: TokenAmount::ZERO,
            room_id: room_id.map(RoomId::from),
        }
    }

    #[test]
    fn generated_ids_are_base36() {
        let id = generate_room_id();
        assert_eq!(id.as_str().len(), 8);
        assert!(id
            .as_str()
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[tokio::test]
    async fn external_ids_must_be_unique() {
        let (registry, _) = registry();
        registry.create(request("0xa", Some("game-7"))).unwrap();
        let err = registry.create(request("0xb", Some("game-7"))).unwrap_err();
        assert_eq!(err, RoomError::RoomExists(RoomId::from("game-7")));
        assert!(registry.create(request("0xb", Some("bad id!"))).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn out_of_range_time_control_is_rejected() {
        let (registry, _) = registry();
        let mut req = request("0xa", None);
        req.time_control.minutes = 0;
        assert!(matches!(
            registry.create(req),
            Err(RoomError::InvalidConfig(_))
        ));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn lobby_lists_in_creation_order() {
        let (registry, _) = registry();
        for id in ["first", "second", "third"] {
            registry.create(request("0xa", Some(id))).unwrap();
        }
        let ids: Vec<_> = registry
            .list_public()
            .await
            .into_iter()
            .map(|e| e.room_id.to_string())
            .collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn sweep_removes_idle_rooms() {
        let (registry, time) = registry();
        registry.create(request("0xa", Some("old"))).unwrap();
        time.advance(RoomPolicy::default().room_ttl_ms - 1);
        registry.create(request("0xb", Some("new"))).unwrap();
        time.advance(1);

        let swept = registry.sweep(time.now_ms()).await;
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].id, RoomId::from("old"));
        assert_eq!(swept[0].connections, vec![1]);
        assert_eq!(
            swept[0].transition.room_events().next().map(|e| e.name()),
            Some("gameOver")
        );
        assert!(registry.get(&RoomId::from("old")).is_err());
        assert!(registry.get(&RoomId::from("new")).is_ok());
    }
}
