//! Outbound event model.
//!
//! Room handlers never talk to the transport. They return a [`Transition`]
//! describing which [`ServerEvent`]s go to which [`Audience`] and which
//! [`Effect`]s the host must perform (clock ticking, settlement, lobby
//! refresh). The dispatcher resolves audiences to connections and carries
//! out the effects.

use serde::{Deserialize, Serialize};

use crate::clock::ClockSnapshot;
use crate::color::{ByColor, Color};
use crate::error::ErrorKind;
use crate::identity::{ConnectionId, RoomId, WalletAddress};
use crate::room::RoomStatus;
use crate::stake::{SettlementRequest, SettlementStatus, Stake, TokenAmount};

/// How a game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EndReason {
    Checkmate,
    Stalemate,
    InsufficientMaterial,
    ThreefoldRepetition,
    FiftyMoveRule,
    Agreement,
    Resignation,
    Time,
    Abandoned,
}

impl EndReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Checkmate => "checkmate",
            Self::Stalemate => "stalemate",
            Self::InsufficientMaterial => "insufficientMaterial",
            Self::ThreefoldRepetition => "threefoldRepetition",
            Self::FiftyMoveRule => "fiftyMoveRule",
            Self::Agreement => "agreement",
            Self::Resignation => "resignation",
            Self::Time => "time",
            Self::Abandoned => "abandoned",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Outcome {
    Win { winner: Color },
    Draw,
}

/// Final result of a game. Set exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameResult {
    pub outcome: Outcome,
    pub reason: EndReason,
}

impl GameResult {
    pub fn win(winner: Color, reason: EndReason) -> Self {
        Self {
            outcome: Outcome::Win { winner },
            reason,
        }
    }

    pub fn draw(reason: EndReason) -> Self {
        Self {
            outcome: Outcome::Draw,
            reason,
        }
    }

    pub fn winner(&self) -> Option<Color> {
        match self.outcome {
            Outcome::Win { winner } => Some(winner),
            Outcome::Draw => None,
        }
    }
}

/// One entry of the append-only move history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRecord {
    #[serde(rename = "move")]
    pub uci: String,
    #[serde(rename = "notation")]
    pub san: String,
    pub color: Color,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeControl {
    pub minutes: u32,
    pub increment_secs: u32,
}

impl TimeControl {
    pub fn base_ms(&self) -> u64 {
        u64::from(self.minutes) * 60_000
    }

    pub fn increment_ms(&self) -> u64 {
        u64::from(self.increment_secs) * 1_000
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    White,
    Black,
    Spectator,
    System,
}

impl From<Color> for ChatRole {
    fn from(color: Color) -> Self {
        match color {
            Color::White => Self::White,
            Color::Black => Self::Black,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEntry {
    pub id: String,
    pub room_id: RoomId,
    pub sender: Option<WalletAddress>,
    pub role: ChatRole,
    pub message: String,
    pub timestamp: u64,
}

/// Lightweight room summary for the lobby.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyEntry {
    pub room_id: RoomId,
    pub white_player: Option<WalletAddress>,
    pub black_player: Option<WalletAddress>,
    pub stakes: TokenAmount,
    /// Base time in minutes.
    pub time_control: u32,
    /// Increment in seconds.
    pub increment: u32,
    pub is_full: bool,
    pub is_started: bool,
    pub spectator_count: usize,
}

/// Full room snapshot sent on join, spectate and reconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateView {
    pub room_id: RoomId,
    pub fen: String,
    pub status: RoomStatus,
    pub players: ByColor<Option<WalletAddress>>,
    pub connected: ByColor<bool>,
    pub turn: Color,
    pub move_history: Vec<MoveRecord>,
    pub clock: ClockSnapshot,
    pub time_control: TimeControl,
    pub stake: Stake,
    pub result: Option<GameResult>,
    pub draw_offer: Option<Color>,
    pub spectator_count: usize,
    pub chat: Vec<ChatEntry>,
    pub settlement: SettlementStatus,
}

/// Every event the server sends, in `{"event": ..., "data": ...}` form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    LobbyUpdate {
        rooms: Vec<LobbyEntry>,
    },
    Authenticated {
        wallet_address: WalletAddress,
    },
    GameCreated {
        room_id: RoomId,
        color: Color,
        fen: String,
        time_control: TimeControl,
        stake: TokenAmount,
    },
    GameJoined {
        room_id: RoomId,
        color: Color,
        wallet_address: WalletAddress,
    },
    GameState(Box<GameStateView>),
    GameStarted {
        room_id: RoomId,
        clock: ClockSnapshot,
    },
    MoveMade {
        room_id: RoomId,
        fen: String,
        #[serde(rename = "move")]
        played: MoveRecord,
        move_history: Vec<MoveRecord>,
        is_game_over: bool,
        result: Option<GameResult>,
        clock: ClockSnapshot,
    },
    TimerUpdate {
        room_id: RoomId,
        white_remaining_ms: u64,
        black_remaining_ms: u64,
        active_color: Option<Color>,
    },
    GameOver {
        room_id: RoomId,
        reason: EndReason,
        winner: Option<Color>,
        fen: String,
    },
    DrawOffered {
        room_id: RoomId,
        by: Color,
    },
    DrawDeclined {
        room_id: RoomId,
        by: Color,
    },
    PlayerDisconnected {
        room_id: RoomId,
        color: Color,
        wallet_address: WalletAddress,
    },
    PlayerReconnected {
        room_id: RoomId,
        color: Color,
        wallet_address: WalletAddress,
    },
    StakesUpdated {
        room_id: RoomId,
        stake: Stake,
    },
    BetPlaced {
        room_id: RoomId,
        color: Color,
        wallet_address: WalletAddress,
    },
    ChatMessage(ChatEntry),
    TimeControlUpdated {
        room_id: RoomId,
        time_control: TimeControl,
    },
    SettlementConfirmed {
        room_id: RoomId,
        transaction: String,
    },
    SettlementFailed {
        room_id: RoomId,
        attempts: u32,
        message: String,
    },
    Error {
        message: String,
        #[serde(rename = "type")]
        kind: ErrorKind,
    },
}

impl ServerEvent {
    /// Wire name of the event, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::LobbyUpdate { .. } => "lobbyUpdate",
            Self::Authenticated { .. } => "authenticated",
            Self::GameCreated { .. } => "gameCreated",
            Self::GameJoined { .. } => "gameJoined",
            Self::GameState(_) => "gameState",
            Self::GameStarted { .. } => "gameStarted",
            Self::MoveMade { .. } => "moveMade",
            Self::TimerUpdate { .. } => "timerUpdate",
            Self::GameOver { .. } => "gameOver",
            Self::DrawOffered { .. } => "drawOffered",
            Self::DrawDeclined { .. } => "drawDeclined",
            Self::PlayerDisconnected { .. } => "playerDisconnected",
            Self::PlayerReconnected { .. } => "playerReconnected",
            Self::StakesUpdated { .. } => "stakesUpdated",
            Self::BetPlaced { .. } => "betPlaced",
            Self::ChatMessage(_) => "chatMessage",
            Self::TimeControlUpdated { .. } => "timeControlUpdated",
            Self::SettlementConfirmed { .. } => "settlementConfirmed",
            Self::SettlementFailed { .. } => "settlementFailed",
            Self::Error { .. } => "error",
        }
    }

    pub fn error(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self::Error {
            message: message.into(),
            kind,
        }
    }
}

/// Who receives an outbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Players and spectators of the room.
    Room,
    /// The connection whose request produced the event.
    Requester,
    /// A specific connection.
    Connection(ConnectionId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub audience: Audience,
    pub event: ServerEvent,
}

/// Work the host performs after a room handler returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// The room's clock is running; broadcast ticks until it stops.
    StartTicking,
    /// The room's clock stopped or paused.
    StopTicking,
    /// Submit the finished game's result to the chain.
    Settle(SettlementRequest),
    /// The public room list changed.
    LobbyChanged,
}

/// Result of a successful room operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transition {
    pub messages: Vec<Outbound>,
    pub effects: Vec<Effect>,
}

impl Transition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to_room(&mut self, event: ServerEvent) -> &mut Self {
        self.messages.push(Outbound {
            audience: Audience::Room,
            event,
        });
        self
    }

    pub fn to_requester(&mut self, event: ServerEvent) -> &mut Self {
        self.messages.push(Outbound {
            audience: Audience::Requester,
            event,
        });
        self
    }

    pub fn to_connection(&mut self, connection: ConnectionId, event: ServerEvent) -> &mut Self {
        self.messages.push(Outbound {
            audience: Audience::Connection(connection),
            event,
        });
        self
    }

    pub fn effect(&mut self, effect: Effect) -> &mut Self {
        if !self.effects.contains(&effect) {
            self.effects.push(effect);
        }
        self
    }

    pub fn extend(&mut self, other: Transition) -> &mut Self {
        self.messages.extend(other.messages);
        for effect in other.effects {
            self.effect(effect);
        }
        self
    }

    /// Events addressed to the whole room, in order.
    pub fn room_events(&self) -> impl Iterator<Item = &ServerEvent> {
        self.messages
            .iter()
            .filter(|m| m.audience == Audience::Room)
            .map(|m| &m.event)
    }

    pub fn has_effect(&self, effect: &Effect) -> bool {
        self.effects.contains(effect)
    }
}
