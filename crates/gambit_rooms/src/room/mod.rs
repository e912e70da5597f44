//! The room state machine.
//!
//! A [`Room`] owns one game: board, seats, live connections, spectators,
//! clock, stake, chat and history. Every handler validates against the
//! current state first and only then mutates, so a rejected request leaves
//! the room exactly as it was. Handlers return a [`Transition`]; nothing in
//! here performs I/O.
//!
//! Rooms are not internally synchronized. The registry wraps each one in
//! its own async mutex and callers hold it for the duration of a handler.

pub mod chat;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::clock::{ClockSnapshot, GameClock};
use crate::color::{ByColor, Color};
use crate::error::RoomError;
use crate::events::{
    ChatRole, Effect, EndReason, GameResult, GameStateView, LobbyEntry, MoveRecord, ServerEvent,
    TimeControl, Transition,
};
use crate::identity::{ConnectionId, RoomId, WalletAddress};
use crate::policy::RoomPolicy;
use crate::rules::{Board, RulesError, Terminal};
use crate::stake::{SettlementRequest, SettlementStatus, Stake, TokenAmount};
use crate::time::TimeSource;

pub use chat::{ChatLog, MAX_MESSAGE_CHARS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Waiting,
    Active,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spectator {
    pub wallet: Option<WalletAddress>,
    pub connection: ConnectionId,
    pub joined_at: u64,
}

/// Parameters for a new room, already validated by the caller.
#[derive(Debug, Clone)]
pub struct NewRoom {
    pub id: RoomId,
    pub creator: WalletAddress,
    pub connection: ConnectionId,
    pub creator_color: Color,
    pub time_control: TimeControl,
    pub stake: TokenAmount,
}

/// Outcome of an on-chain settlement attempt, fed back into the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementReport {
    Confirmed { transaction: String },
    Failed { attempts: u32, message: String },
}

#[derive(Debug)]
pub struct Room {
    id: RoomId,
    board: Board,
    players: ByColor<Option<WalletAddress>>,
    member_sockets: HashMap<WalletAddress, ConnectionId>,
    spectators: Vec<Spectator>,
    clock: GameClock,
    time_control: TimeControl,
    stake: Stake,
    move_history: Vec<MoveRecord>,
    status: RoomStatus,
    result: Option<GameResult>,
    draw_offer: Option<Color>,
    chat: ChatLog,
    settlement: SettlementStatus,
    created_at: u64,
    last_activity_at: u64,
    abandoned_at: Option<u64>,
    policy: Arc<RoomPolicy>,
    time: Arc<dyn TimeSource>,
}

impl Room {
    pub fn new(params: NewRoom, policy: Arc<RoomPolicy>, time: Arc<dyn TimeSource>) -> Self {
        let now = time.now_ms();
        let mut players = ByColor::new(None, None);
        *players.get_mut(params.creator_color) = Some(params.creator.clone());
        let mut member_sockets = HashMap::new();
        member_sockets.insert(params.creator, params.connection);

        Self {
            clock: GameClock::new(
                params.time_control.base_ms(),
                params.time_control.increment_ms(),
                time.clone(),
            ),
            chat: ChatLog::new(policy.max_chat_messages),
            id: params.id,
            board: Board::new(),
            players,
            member_sockets,
            spectators: Vec::new(),
            time_control: params.time_control,
            stake: Stake::new(params.stake),
            move_history: Vec::new(),
            status: RoomStatus::Waiting,
            result: None,
            draw_offer: None,
            settlement: SettlementStatus::None,
            created_at: now,
            last_activity_at: now,
            abandoned_at: None,
            policy,
            time,
        }
    }

    // ---- accessors ----

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn status(&self) -> RoomStatus {
        self.status
    }

    pub fn result(&self) -> Option<GameResult> {
        self.result
    }

    pub fn stake(&self) -> &Stake {
        &self.stake
    }

    pub fn move_history(&self) -> &[MoveRecord] {
        &self.move_history
    }

    pub fn clock(&self) -> &GameClock {
        &self.clock
    }

    pub fn time_control(&self) -> TimeControl {
        self.time_control
    }

    pub fn draw_offer(&self) -> Option<Color> {
        self.draw_offer
    }

    pub fn settlement(&self) -> &SettlementStatus {
        &self.settlement
    }

    pub fn player(&self, color: Color) -> Option<&WalletAddress> {
        self.players.get(color).as_ref()
    }

    pub fn turn(&self) -> Color {
        self.board.turn()
    }

    pub fn fen(&self) -> String {
        self.board.fen()
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn last_activity_at(&self) -> u64 {
        self.last_activity_at
    }

    pub fn abandoned_at(&self) -> Option<u64> {
        self.abandoned_at
    }

    pub fn spectator_count(&self) -> usize {
        self.spectators.len()
    }

    pub fn chat_len(&self) -> usize {
        self.chat.len()
    }

    /// Color seated by `wallet`, if any.
    pub fn seat_of(&self, wallet: &WalletAddress) -> Option<Color> {
        Color::ALL
            .into_iter()
            .find(|c| self.players.get(*c).as_ref() == Some(wallet))
    }

    pub fn is_connected(&self, color: Color) -> bool {
        self.players
            .get(color)
            .as_ref()
            .is_some_and(|w| self.member_sockets.contains_key(w))
    }

    /// Every connection that receives room broadcasts.
    pub fn member_connections(&self) -> Vec<ConnectionId> {
        let mut connections: Vec<ConnectionId> = self.member_sockets.values().copied().collect();
        for spectator in &self.spectators {
            if !connections.contains(&spectator.connection) {
                connections.push(spectator.connection);
            }
        }
        connections
    }

    pub fn lobby_entry(&self) -> LobbyEntry {
        LobbyEntry {
            room_id: self.id.clone(),
            white_player: self.players.white.clone(),
            black_player: self.players.black.clone(),
            stakes: self.stake.amount,
            time_control: self.time_control.minutes,
            increment: self.time_control.increment_secs,
            is_full: self.players.white.is_some() && self.players.black.is_some(),
            is_started: self.status != RoomStatus::Waiting,
            spectator_count: self.spectators.len(),
        }
    }

    pub fn state_view(&self) -> GameStateView {
        GameStateView {
            room_id: self.id.clone(),
            fen: self.board.fen(),
            status: self.status,
            players: self.players.clone(),
            connected: ByColor::new(
                self.is_connected(Color::White),
                self.is_connected(Color::Black),
            ),
            turn: self.board.turn(),
            move_history: self.move_history.clone(),
            clock: self.clock.snapshot(),
            time_control: self.time_control,
            stake: self.stake.clone(),
            result: self.result,
            draw_offer: self.draw_offer,
            spectator_count: self.spectators.len(),
            chat: self.chat.entries(),
            settlement: self.settlement.clone(),
        }
    }

    fn snapshot_event(&self) -> ServerEvent {
        ServerEvent::GameState(Box::new(self.state_view()))
    }

    /// Whether a sweep at `now` should remove this room.
    pub fn is_expired(&self, now: u64) -> bool {
        let idle = now.saturating_sub(self.last_activity_at) >= self.policy.room_ttl_ms;
        let abandoned = self
            .abandoned_at
            .is_some_and(|at| now.saturating_sub(at) >= self.policy.reconnect_grace_ms);
        idle || abandoned
    }

    // ---- handlers ----

    /// Replies sent to the creator right after registration.
    pub fn created(&self) -> Transition {
        let mut t = Transition::new();
        let color = if self.players.white.is_some() {
            Color::White
        } else {
            Color::Black
        };
        t.to_requester(ServerEvent::GameCreated {
            room_id: self.id.clone(),
            color,
            fen: self.board.fen(),
            time_control: self.time_control,
            stake: self.stake.amount,
        })
        .to_requester(self.snapshot_event())
        .effect(Effect::LobbyChanged);
        t
    }

    /// Seats `wallet` in the free color.
    ///
    /// `funded` is the amount the wallet's balance was verified to cover
    /// before the room lock was taken. If the stake grew in the meantime
    /// the join is refused with [`RoomError::StakeChanged`].
    pub fn join(
        &mut self,
        wallet: WalletAddress,
        connection: ConnectionId,
        funded: TokenAmount,
    ) -> Result<Transition, RoomError> {
        if self.status == RoomStatus::Finished {
            return Err(RoomError::GameFinished);
        }
        if self.seat_of(&wallet).is_some() {
            return Err(RoomError::AlreadyInRoom);
        }
        let color = Color::ALL
            .into_iter()
            .find(|c| self.players.get(*c).is_none())
            .ok_or(RoomError::RoomFull)?;
        if funded < self.stake.amount {
            return Err(RoomError::StakeChanged);
        }

        *self.players.get_mut(color) = Some(wallet.clone());
        self.member_sockets.insert(wallet.clone(), connection);
        self.spectators.retain(|s| s.connection != connection);
        self.abandoned_at = None;
        self.touch();
        info!(room_id = %self.id, %wallet, %color, "🙋 Player joined");

        let mut t = Transition::new();
        t.to_room(ServerEvent::GameJoined {
            room_id: self.id.clone(),
            color,
            wallet_address: wallet,
        })
        .effect(Effect::LobbyChanged);
        self.try_start(&mut t);
        t.to_requester(self.snapshot_event());
        Ok(t)
    }

    /// Plays `uci` for `wallet`. The move must arrive on the connection that
    /// currently holds the seat; a player who dropped has to reconnect
    /// first so the clock and the room's audience are restored.
    pub fn make_move(
        &mut self,
        wallet: &WalletAddress,
        connection: ConnectionId,
        uci: &str,
    ) -> Result<Transition, RoomError> {
        if self.status == RoomStatus::Finished {
            return Err(RoomError::GameFinished);
        }
        let color = self.seat_of(wallet).ok_or(RoomError::NotAPlayer)?;
        if self.member_sockets.get(wallet) != Some(&connection) {
            return Err(RoomError::StaleConnection);
        }
        if self.status == RoomStatus::Waiting {
            return Err(RoomError::GameNotStarted);
        }
        if self.board.turn() != color {
            return Err(RoomError::NotYourTurn);
        }
        if self.clock.active() != Some(color) {
            return Err(crate::error::ClockError::NoActiveColor.into());
        }

        let played = self.board.apply(uci).map_err(|e| match e {
            RulesError::BadNotation(m) => RoomError::InvalidMoveNotation(m),
            RulesError::Illegal(m) => RoomError::IllegalMove(m),
        })?;
        let record = MoveRecord {
            uci: played.uci,
            san: played.san,
            color,
            timestamp: self.time.now_ms(),
        };
        self.move_history.push(record.clone());
        self.touch();
        debug!(room_id = %self.id, mv = %record.uci, %color, "♟️ Move applied");

        let mut t = Transition::new();
        let terminal = self.board.terminal();
        match terminal {
            Some(_) => self.clock.stop(true),
            None => {
                if self.clock.is_paused() {
                    self.clock.resume()?;
                }
                let next = self.clock.switch()?;
                if !self.is_connected(next) {
                    self.clock.pause();
                    t.effect(Effect::StopTicking);
                } else if self.clock.is_running() {
                    t.effect(Effect::StartTicking);
                }
            }
        }

        let result = terminal.map(terminal_result);
        t.to_room(ServerEvent::MoveMade {
            room_id: self.id.clone(),
            fen: self.board.fen(),
            played: record,
            move_history: self.move_history.clone(),
            is_game_over: result.is_some(),
            result,
            clock: self.clock.snapshot(),
        });
        if let Some(result) = result {
            self.finish(result, false, &mut t);
        }
        Ok(t)
    }

    pub fn offer_draw(&mut self, wallet: &WalletAddress) -> Result<Transition, RoomError> {
        if self.status == RoomStatus::Finished {
            return Err(RoomError::GameFinished);
        }
        let color = self.seat_of(wallet).ok_or(RoomError::NotAPlayer)?;
        if self.status == RoomStatus::Waiting {
            return Err(RoomError::GameNotStarted);
        }
        if self.draw_offer.is_some() {
            return Err(RoomError::DrawAlreadyOffered);
        }
        self.draw_offer = Some(color);
        self.touch();

        let mut t = Transition::new();
        t.to_room(ServerEvent::DrawOffered {
            room_id: self.id.clone(),
            by: color,
        });
        Ok(t)
    }

    pub fn respond_to_draw(
        &mut self,
        wallet: &WalletAddress,
        accepted: bool,
    ) -> Result<Transition, RoomError> {
        let color = self.seat_of(wallet).ok_or(RoomError::NotAPlayer)?;
        match self.draw_offer {
            Some(offerer) if offerer != color => {}
            _ => return Err(RoomError::NoActiveOffer),
        }
        self.draw_offer = None;
        self.touch();

        let mut t = Transition::new();
        if accepted {
            self.finish(GameResult::draw(EndReason::Agreement), false, &mut t);
        } else {
            t.to_room(ServerEvent::DrawDeclined {
                room_id: self.id.clone(),
                by: color,
            });
        }
        Ok(t)
    }

    pub fn resign(&mut self, wallet: &WalletAddress) -> Result<Transition, RoomError> {
        if self.status == RoomStatus::Finished {
            return Err(RoomError::GameFinished);
        }
        let color = self.seat_of(wallet).ok_or(RoomError::NotAPlayer)?;
        self.touch();
        let mut t = Transition::new();
        self.finish(
            GameResult::win(color.opposite(), EndReason::Resignation),
            false,
            &mut t,
        );
        Ok(t)
    }

    /// Drops whatever `connection` was doing in this room. Never fails: a
    /// connection that is neither a player socket nor a spectator yields an
    /// empty transition.
    pub fn disconnect(&mut self, connection: ConnectionId) -> Transition {
        let mut t = Transition::new();

        let before = self.spectators.len();
        self.spectators.retain(|s| s.connection != connection);
        if self.spectators.len() != before {
            t.effect(Effect::LobbyChanged);
        }

        let wallet = self
            .member_sockets
            .iter()
            .find(|(_, c)| **c == connection)
            .map(|(w, _)| w.clone());
        let Some(wallet) = wallet else {
            return t;
        };
        self.member_sockets.remove(&wallet);
        let Some(color) = self.seat_of(&wallet) else {
            return t;
        };

        if self.status == RoomStatus::Active
            && self.clock.active() == Some(color)
            && self.clock.is_running()
        {
            self.clock.pause();
            t.effect(Effect::StopTicking);
        }
        if !self.is_connected(Color::White) && !self.is_connected(Color::Black) {
            self.abandoned_at = Some(self.time.now_ms());
            info!(room_id = %self.id, "🕳️ All players disconnected, grace period started");
        }

        t.to_room(ServerEvent::PlayerDisconnected {
            room_id: self.id.clone(),
            color,
            wallet_address: wallet,
        });
        t
    }

    pub fn reconnect(
        &mut self,
        wallet: WalletAddress,
        connection: ConnectionId,
    ) -> Result<Transition, RoomError> {
        let color = self.seat_of(&wallet).ok_or(RoomError::NotAPlayer)?;
        self.member_sockets.insert(wallet.clone(), connection);
        self.spectators.retain(|s| s.connection != connection);
        self.abandoned_at = None;
        self.touch();

        let mut t = Transition::new();
        if self.status == RoomStatus::Active
            && self.clock.is_paused()
            && self.is_connected(color.opposite())
        {
            self.clock.resume()?;
            t.effect(Effect::StartTicking);
        }
        t.to_room(ServerEvent::PlayerReconnected {
            room_id: self.id.clone(),
            color,
            wallet_address: wallet,
        })
        .to_requester(self.snapshot_event());
        Ok(t)
    }

    pub fn spectate(
        &mut self,
        wallet: Option<WalletAddress>,
        connection: ConnectionId,
    ) -> Result<Transition, RoomError> {
        let mut t = Transition::new();
        if !self.spectators.iter().any(|s| s.connection == connection) {
            if self.spectators.len() >= self.policy.max_spectators {
                return Err(RoomError::SpectatorLimit);
            }
            self.spectators.push(Spectator {
                wallet,
                connection,
                joined_at: self.time.now_ms(),
            });
            self.touch();
            t.effect(Effect::LobbyChanged);
        }
        t.to_requester(self.snapshot_event());
        Ok(t)
    }

    /// A spectator leaves; a player leaving is handled as a disconnect.
    pub fn leave(&mut self, connection: ConnectionId) -> Result<Transition, RoomError> {
        let is_spectator = self.spectators.iter().any(|s| s.connection == connection);
        let is_player = self.member_sockets.values().any(|c| *c == connection);
        if !is_spectator && !is_player {
            return Err(RoomError::NotAPlayer);
        }
        Ok(self.disconnect(connection))
    }

    pub fn chat(
        &mut self,
        wallet: Option<&WalletAddress>,
        connection: ConnectionId,
        message: &str,
    ) -> Result<Transition, RoomError> {
        let message = message.trim();
        if message.is_empty() || message.chars().count() > MAX_MESSAGE_CHARS {
            return Err(RoomError::InvalidInput(format!(
                "chat messages must be 1 to {MAX_MESSAGE_CHARS} characters"
            )));
        }
        let role = match wallet.and_then(|w| self.seat_of(w)) {
            Some(color) => ChatRole::from(color),
            None if self.spectators.iter().any(|s| s.connection == connection) => {
                ChatRole::Spectator
            }
            None => return Err(RoomError::NotAPlayer),
        };
        let now = self.time.now_ms();
        let entry = self
            .chat
            .push(&self.id, wallet.cloned(), role, message.to_string(), now);
        self.touch();

        let mut t = Transition::new();
        t.to_room(ServerEvent::ChatMessage(entry));
        Ok(t)
    }

    pub fn set_time_control(
        &mut self,
        wallet: &WalletAddress,
        time_control: TimeControl,
    ) -> Result<Transition, RoomError> {
        self.ensure_waiting_player(wallet)?;
        self.policy
            .check_time_control(time_control.minutes, time_control.increment_secs)?;
        self.time_control = time_control;
        self.clock
            .reset(time_control.base_ms(), time_control.increment_ms());
        self.touch();

        let mut t = Transition::new();
        t.to_room(ServerEvent::TimeControlUpdated {
            room_id: self.id.clone(),
            time_control,
        })
        .effect(Effect::LobbyChanged);
        Ok(t)
    }

    pub fn set_stakes(
        &mut self,
        wallet: &WalletAddress,
        amount: TokenAmount,
    ) -> Result<Transition, RoomError> {
        if self.stake.locked {
            return Err(RoomError::StakesLocked);
        }
        self.ensure_waiting_player(wallet)?;
        self.policy.check_stake(amount)?;
        self.stake.set_amount(amount)?;
        self.touch();

        let mut t = Transition::new();
        t.to_room(ServerEvent::StakesUpdated {
            room_id: self.id.clone(),
            stake: self.stake.clone(),
        })
        .effect(Effect::LobbyChanged);
        self.try_start(&mut t);
        Ok(t)
    }

    /// Places the bet of the player seated in `color`. `funded` works as in
    /// [`Room::join`].
    pub fn place_bet(
        &mut self,
        wallet: &WalletAddress,
        color: Color,
        funded: TokenAmount,
    ) -> Result<Transition, RoomError> {
        if self.status == RoomStatus::Finished {
            return Err(RoomError::GameFinished);
        }
        match self.seat_of(wallet) {
            None => return Err(RoomError::NotAPlayer),
            Some(seat) if seat != color => return Err(RoomError::WrongSeat(color)),
            Some(_) => {}
        }
        if self.stake.locked {
            return Err(RoomError::StakesLocked);
        }
        if self.status != RoomStatus::Waiting {
            return Err(RoomError::GameAlreadyStarted);
        }
        if funded < self.stake.amount {
            return Err(RoomError::StakeChanged);
        }
        let locked = self.stake.place_bet(color, wallet.clone())?;
        self.touch();
        info!(room_id = %self.id, %color, amount = %self.stake.amount, locked, "💰 Bet placed");

        let mut t = Transition::new();
        t.to_room(ServerEvent::BetPlaced {
            room_id: self.id.clone(),
            color,
            wallet_address: wallet.clone(),
        })
        .to_room(ServerEvent::StakesUpdated {
            room_id: self.id.clone(),
            stake: self.stake.clone(),
        })
        .effect(Effect::LobbyChanged);
        self.try_start(&mut t);
        Ok(t)
    }

    /// Advisory clock tick. Returns `None` when the clock is not running,
    /// which tells the ticker to stop. A flag fall finishes the game.
    pub fn tick(&mut self) -> Option<Transition> {
        if self.status != RoomStatus::Active || !self.clock.is_running() {
            return None;
        }
        let mut t = Transition::new();
        if let Some(flagged) = self.clock.flagged() {
            info!(room_id = %self.id, color = %flagged, "⌛ Flag fell");
            self.finish(GameResult::win(flagged.opposite(), EndReason::Time), false, &mut t);
            return Some(t);
        }
        let ClockSnapshot {
            white_remaining_ms,
            black_remaining_ms,
            active_color,
        } = self.clock.snapshot();
        t.to_room(ServerEvent::TimerUpdate {
            room_id: self.id.clone(),
            white_remaining_ms,
            black_remaining_ms,
            active_color,
        });
        Some(t)
    }

    /// Closes the room ahead of removal. An unfinished game ends as an
    /// abandoned draw so members always see a `gameOver`.
    pub fn close(&mut self) -> Transition {
        let mut t = Transition::new();
        if self.status != RoomStatus::Finished {
            self.finish(GameResult::draw(EndReason::Abandoned), false, &mut t);
        }
        t.effect(Effect::StopTicking).effect(Effect::LobbyChanged);
        t
    }

    pub fn record_settlement(&mut self, report: SettlementReport) -> Transition {
        let mut t = Transition::new();
        match report {
            SettlementReport::Confirmed { transaction } => {
                self.settlement = SettlementStatus::Confirmed {
                    transaction: transaction.clone(),
                };
                t.to_room(ServerEvent::SettlementConfirmed {
                    room_id: self.id.clone(),
                    transaction,
                });
            }
            SettlementReport::Failed { attempts, message } => {
                self.settlement = SettlementStatus::Failed {
                    attempts,
                    message: message.clone(),
                };
                t.to_room(ServerEvent::SettlementFailed {
                    room_id: self.id.clone(),
                    attempts,
                    message,
                });
            }
        }
        t
    }

    // ---- internals ----

    fn touch(&mut self) {
        self.last_activity_at = self.time.now_ms();
    }

    fn ensure_waiting_player(&self, wallet: &WalletAddress) -> Result<Color, RoomError> {
        if self.status == RoomStatus::Finished {
            return Err(RoomError::GameFinished);
        }
        let color = self.seat_of(wallet).ok_or(RoomError::NotAPlayer)?;
        if self.status != RoomStatus::Waiting {
            return Err(RoomError::GameAlreadyStarted);
        }
        Ok(color)
    }

    /// Moves a waiting room to active once both seats are filled and the
    /// stake (if any) is locked. White moves first.
    fn try_start(&mut self, t: &mut Transition) {
        let seated = self.players.white.is_some() && self.players.black.is_some();
        if self.status != RoomStatus::Waiting || !seated || !self.stake.ready() {
            return;
        }
        self.status = RoomStatus::Active;
        self.clock.start(Color::White);
        let now = self.time.now_ms();
        self.chat.system(&self.id, "Game started", now);
        info!(room_id = %self.id, stake = %self.stake.amount, "🏁 Game started");

        if self.is_connected(Color::White) && self.is_connected(Color::Black) {
            t.effect(Effect::StartTicking);
        } else {
            self.clock.pause();
        }
        t.to_room(ServerEvent::GameStarted {
            room_id: self.id.clone(),
            clock: self.clock.snapshot(),
        })
        .effect(Effect::LobbyChanged);
    }

    /// Records the result exactly once, stops the clock and queues
    /// settlement for staked games.
    fn finish(&mut self, result: GameResult, credit_increment: bool, t: &mut Transition) {
        if self.status == RoomStatus::Finished {
            return;
        }
        self.clock.stop(credit_increment);
        self.status = RoomStatus::Finished;
        self.result = Some(result);
        self.draw_offer = None;
        let now = self.time.now_ms();
        let note = match result.winner() {
            Some(winner) => format!("Game over: {winner} wins by {}", result.reason.as_str()),
            None => format!("Game over: draw by {}", result.reason.as_str()),
        };
        self.chat.system(&self.id, note, now);
        info!(
            room_id = %self.id,
            reason = result.reason.as_str(),
            winner = ?result.winner(),
            moves = self.move_history.len(),
            "🏆 Game finished"
        );

        t.to_room(ServerEvent::GameOver {
            room_id: self.id.clone(),
            reason: result.reason,
            winner: result.winner(),
            fen: self.board.fen(),
        })
        .effect(Effect::StopTicking)
        .effect(Effect::LobbyChanged);

        if let Some(request) = self.settlement_request(&result) {
            self.settlement = SettlementStatus::Pending;
            t.effect(Effect::Settle(request));
        }
    }

    fn settlement_request(&self, result: &GameResult) -> Option<SettlementRequest> {
        let has_bettor = Color::ALL.iter().any(|c| self.stake.bettor(*c).is_some());
        if self.stake.amount.is_zero() || !has_bettor {
            return None;
        }
        let winner = result.winner();
        let (payouts, house_fee) = self.stake.payouts(winner, self.policy.house_fee_bps);
        Some(SettlementRequest {
            room_id: self.id.clone(),
            winner,
            winner_wallet: winner.and_then(|c| self.players.get(c).clone()),
            reason: result.reason.as_str().to_string(),
            moves: self.move_history.iter().map(|m| m.uci.clone()).collect(),
            stake: self.stake.amount,
            bettors: Color::ALL
                .iter()
                .filter_map(|c| self.stake.bettor(*c).cloned())
                .collect(),
            payouts,
            house_fee,
        })
    }
}

fn terminal_result(terminal: Terminal) -> GameResult {
    match terminal {
        Terminal::Checkmate(winner) => GameResult::win(winner, EndReason::Checkmate),
        Terminal::Stalemate => GameResult::draw(EndReason::Stalemate),
        Terminal::InsufficientMaterial => GameResult::draw(EndReason::InsufficientMaterial),
        Terminal::ThreefoldRepetition => GameResult::draw(EndReason::ThreefoldRepetition),
        Terminal::FiftyMoveRule => GameResult::draw(EndReason::FiftyMoveRule),
    }
}
