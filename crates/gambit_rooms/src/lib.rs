//! # Gambit Rooms
//!
//! The authoritative state of real-time, optionally staked chess games.
//!
//! This crate owns everything about a game that must be decided by the
//! server rather than trusted from clients:
//!
//! * the position and move legality ([`rules::Board`], backed by shakmaty)
//! * the dual countdown clock with increment ([`clock::GameClock`])
//! * seats, spectators and live connections
//! * the wager lifecycle and settlement plan ([`stake`])
//! * the room registry with lobby listing and garbage collection
//!
//! It performs no I/O. Every [`room::Room`] handler returns a
//! [`events::Transition`] that lists outbound events and the effects the
//! host has to carry out (start a ticker, submit a settlement, refresh the
//! lobby). Time is read through an injected [`time::TimeSource`], so clock
//! behavior is fully testable without real delays.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use gambit_rooms::{
//!     CreateRoom, RoomPolicy, RoomRegistry, SystemTimeSource, TimeControl, TokenAmount,
//!     WalletAddress,
//! };
//!
//! # async fn demo() -> Result<(), gambit_rooms::RoomError> {
//! let registry = RoomRegistry::new(RoomPolicy::default(), Arc::new(SystemTimeSource::new()));
//! let (room, _replies) = registry.create(CreateRoom {
//!     creator: WalletAddress::parse("0xA11CE")?,
//!     connection: 1,
//!     time_control: TimeControl { minutes: 5, increment_secs: 3 },
//!     stake: TokenAmount::ZERO,
//!     room_id: None,
//! })?;
//! let mut room = room.lock().await;
//! room.join(WalletAddress::parse("0xB0B")?, 2, TokenAmount::ZERO)?;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod color;
pub mod error;
pub mod events;
pub mod identity;
pub mod policy;
pub mod registry;
pub mod room;
pub mod rules;
pub mod stake;
pub mod time;

pub use clock::{ClockSnapshot, GameClock};
pub use color::{ByColor, Color};
pub use error::{ClockError, ErrorKind, RoomError};
pub use events::{
    Audience, ChatEntry, ChatRole, Effect, EndReason, GameResult, GameStateView, LobbyEntry,
    MoveRecord, Outbound, Outcome, ServerEvent, TimeControl, Transition,
};
pub use identity::{ConnectionId, RoomId, WalletAddress};
pub use policy::RoomPolicy;
pub use registry::{CreateRoom, RoomHandle, RoomRegistry, SweptRoom};
pub use room::{Room, RoomStatus, SettlementReport};
pub use rules::{Board, PlayedMove, RulesError, Terminal};
pub use stake::{Payout, SettlementRequest, SettlementStatus, Stake, TokenAmount};
pub use time::{current_timestamp, ManualTimeSource, SystemTimeSource, TimeSource};
