//! Event dispatcher.
//!
//! Turns validated commands into room operations and room transitions into
//! delivered frames and background work.
//!
//! Every room-scoped command locks that room's mutex for the whole handler.
//! The mutex is fair, so commands for one room are applied one at a time
//! in arrival order while other rooms proceed in parallel. External calls
//! (balance checks, token verification) happen before the lock is taken;
//! the room handler re-validates whatever they established.
//!
//! Frames for a transition are queued while the room lock is still held,
//! which keeps per-room delivery order identical to mutation order. Lobby
//! refreshes lock every room and therefore always run after the lock is
//! released.

use dashmap::DashMap;
use gambit_rooms::{
    Audience, ConnectionId, CreateRoom, Effect, ErrorKind, Room, RoomError, RoomHandle, RoomId,
    RoomRegistry, ServerEvent, SettlementReport, SettlementRequest, TokenAmount, Transition,
    WalletAddress,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::capabilities::{with_timeout, Capabilities};
use crate::config::ServerConfig;
use crate::connection::ClientResponseSender;
use crate::error::GatewayError;
use crate::messaging::{parse_command, Command};
use crate::rate_limit::RateLimiter;
use crate::session::SessionTracker;
use crate::settlement::{settle, RetryConfig};
use crate::stats::ServerStats;

pub struct Dispatcher {
    registry: Arc<RoomRegistry>,
    sessions: SessionTracker,
    sender: Arc<dyn ClientResponseSender>,
    capabilities: Capabilities,
    rate_limiter: RateLimiter,
    stats: Arc<ServerStats>,
    /// Running clock broadcasters, tagged with a generation so a finishing
    /// ticker never removes its replacement.
    tickers: DashMap<RoomId, (u64, JoinHandle<()>)>,
    ticker_generation: AtomicU64,
    retry: RetryConfig,
    tick_interval: Duration,
    request_timeout_ms: u64,
    require_auth: bool,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("rooms", &self.registry.len())
            .field("sessions", &self.sessions.len())
            .field("tickers", &self.tickers.len())
            .finish()
    }
}

impl Dispatcher {
    pub fn new(
        config: &ServerConfig,
        registry: Arc<RoomRegistry>,
        sender: Arc<dyn ClientResponseSender>,
        capabilities: Capabilities,
        stats: Arc<ServerStats>,
    ) -> Self {
        let time = registry.time().clone();
        Self {
            rate_limiter: RateLimiter::new(config.rate_limit.clone(), time),
            registry,
            sessions: SessionTracker::new(),
            sender,
            capabilities,
            stats,
            tickers: DashMap::new(),
            ticker_generation: AtomicU64::new(0),
            retry: RetryConfig::from(&config.chain),
            tick_interval: Duration::from_millis(config.tick_interval_ms.max(1)),
            request_timeout_ms: config.chain.request_timeout_ms,
            require_auth: config.require_auth,
        }
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    pub fn stats(&self) -> &Arc<ServerStats> {
        &self.stats
    }

    /// Number of rooms whose clock is currently being broadcast.
    pub fn active_tickers(&self) -> usize {
        self.tickers
            .iter()
            .filter(|entry| !entry.value().1.is_finished())
            .count()
    }

    // ---- connection lifecycle ----

    pub fn on_connect(&self, connection_id: ConnectionId) {
        self.sessions
            .open(connection_id, self.registry.time().now_ms());
        ServerStats::bump(&self.stats.connections_accepted);
    }

    /// Handles one inbound text frame. Every rejection produces exactly one
    /// `error` event to the sender.
    pub async fn handle_text(self: &Arc<Self>, connection_id: ConnectionId, text: &str) {
        if !self.rate_limiter.check(connection_id) {
            self.reject(connection_id, "-", None, &GatewayError::RateLimited);
            return;
        }
        let command = match parse_command(text) {
            Ok(command) => command,
            Err(e) => {
                self.reject(connection_id, "-", None, &e);
                return;
            }
        };
        let event = command.name();
        let room_id = command.room_id().cloned();
        if let Err(e) = self.execute(connection_id, command).await {
            self.reject(connection_id, event, room_id.as_ref(), &e);
        }
    }

    /// Fans a closed connection out to every room its session joined.
    pub async fn on_disconnect(self: &Arc<Self>, connection_id: ConnectionId) {
        self.rate_limiter.forget(connection_id);
        let Some(session) = self.sessions.close(connection_id) else {
            return;
        };

        let mut lobby = false;
        for room_id in session.rooms {
            let Ok(handle) = self.registry.get(&room_id) else {
                continue;
            };
            let mut room = handle.lock().await;
            let transition = room.disconnect(connection_id);
            lobby |= self.publish(&room, &handle, None, transition);
        }
        if lobby {
            self.broadcast_lobby().await;
        }
        info!(connection_id, "👋 Session closed");
    }

    // ---- garbage collection ----

    /// Removes expired rooms, telling their members the result first.
    ///
    /// # Returns
    ///
    /// The number of rooms removed.
    pub async fn sweep(self: &Arc<Self>) -> usize {
        let now = self.registry.time().now_ms();
        let swept = self.registry.sweep(now).await;
        for room in &swept {
            self.deliver(&room.connections, None, &room.transition);
            self.apply_effects(&room.id, &room.room, &room.transition);
            for connection_id in &room.connections {
                self.sessions.leave_room(*connection_id, &room.id);
            }
            ServerStats::bump(&self.stats.rooms_swept);
        }
        if !swept.is_empty() {
            info!(count = swept.len(), remaining = self.registry.len(), "🧹 Sweep finished");
            self.broadcast_lobby().await;
        }
        swept.len()
    }

    /// Aborts every ticker. Settlement tasks are left to finish.
    pub fn shutdown(&self) {
        for entry in self.tickers.iter() {
            entry.value().1.abort();
        }
        self.tickers.clear();
    }

    // ---- command execution ----

    async fn execute(
        self: &Arc<Self>,
        conn: ConnectionId,
        command: Command,
    ) -> Result<(), GatewayError> {
        if !self.sessions.exists(conn) {
            return Err(GatewayError::SessionNotFound);
        }
        let session_wallet = self.sessions.wallet(conn);
        if let (Some(claimed), Some(verified)) = (command.claimed_wallet(), session_wallet.as_ref())
        {
            if claimed != verified {
                return Err(GatewayError::WalletMismatch);
            }
        }
        if self.require_auth && command.is_room_mutation() && session_wallet.is_none() {
            return Err(GatewayError::Unauthenticated);
        }

        match command {
            Command::GetLobby => {
                let rooms = self.registry.list_public().await;
                self.send(conn, &ServerEvent::LobbyUpdate { rooms });
            }
            Command::Authenticate { token } => {
                let wallet = with_timeout(
                    "token verification",
                    self.request_timeout_ms,
                    self.capabilities.verifier.verify(&token),
                )
                .await?;
                if !self.sessions.authenticate(conn, wallet.clone()) {
                    return Err(GatewayError::SessionNotFound);
                }
                info!(connection_id = conn, %wallet, "🔐 Session authenticated");
                self.send(
                    conn,
                    &ServerEvent::Authenticated {
                        wallet_address: wallet,
                    },
                );
            }
            Command::CreateGame {
                wallet,
                time_control,
                stake,
                room_id,
            } => {
                if !stake.is_zero() {
                    self.ensure_funded(&wallet, stake).await?;
                }
                let (handle, transition) = self.registry.create(CreateRoom {
                    creator: wallet,
                    connection: conn,
                    time_control,
                    stake,
                    room_id,
                })?;
                ServerStats::bump(&self.stats.rooms_created);

                let room = handle.lock().await;
                self.sessions.join_room(conn, room.id().clone());
                let lobby = self.publish(&room, &handle, Some(conn), transition);
                drop(room);
                if lobby {
                    self.broadcast_lobby().await;
                }
            }
            Command::JoinGame { room_id, wallet } => {
                let handle = self.registry.get(&room_id)?;
                let funded = self.funds_for(&handle, &wallet).await?;
                self.in_room(conn, &handle, |room| room.join(wallet, conn, funded))
                    .await?;
                self.sessions.join_room(conn, room_id);
            }
            Command::MakeMove {
                room_id,
                wallet,
                uci,
            } => {
                let handle = self.registry.get(&room_id)?;
                self.in_room(conn, &handle, |room| room.make_move(&wallet, conn, &uci))
                    .await?;
            }
            Command::OfferDraw { room_id, wallet } => {
                let handle = self.registry.get(&room_id)?;
                self.in_room(conn, &handle, |room| room.offer_draw(&wallet))
                    .await?;
            }
            Command::RespondToDraw {
                room_id,
                wallet,
                accepted,
            } => {
                let handle = self.registry.get(&room_id)?;
                self.in_room(conn, &handle, |room| room.respond_to_draw(&wallet, accepted))
                    .await?;
            }
            Command::Resign { room_id, wallet } => {
                let handle = self.registry.get(&room_id)?;
                self.in_room(conn, &handle, |room| room.resign(&wallet))
                    .await?;
            }
            Command::SetStakes {
                room_id,
                wallet,
                amount,
            } => {
                let wallet = wallet
                    .or(session_wallet)
                    .ok_or(GatewayError::Unauthenticated)?;
                let handle = self.registry.get(&room_id)?;
                self.in_room(conn, &handle, |room| room.set_stakes(&wallet, amount))
                    .await?;
            }
            Command::PlaceBet {
                room_id,
                wallet,
                color,
            } => {
                let handle = self.registry.get(&room_id)?;
                let funded = self.funds_for(&handle, &wallet).await?;
                self.in_room(conn, &handle, |room| room.place_bet(&wallet, color, funded))
                    .await?;
            }
            Command::Reconnect { room_id, wallet } => {
                let handle = self.registry.get(&room_id)?;
                self.in_room(conn, &handle, |room| room.reconnect(wallet, conn))
                    .await?;
                self.sessions.join_room(conn, room_id);
            }
            Command::Spectate { room_id, wallet } => {
                let handle = self.registry.get(&room_id)?;
                self.in_room(conn, &handle, |room| room.spectate(wallet, conn))
                    .await?;
                self.sessions.join_room(conn, room_id);
            }
            Command::Leave { room_id } => {
                let handle = self.registry.get(&room_id)?;
                self.in_room(conn, &handle, |room| room.leave(conn)).await?;
                self.sessions.leave_room(conn, &room_id);
            }
            Command::Chat {
                room_id,
                wallet,
                message,
            } => {
                let wallet = wallet.or(session_wallet);
                let handle = self.registry.get(&room_id)?;
                self.in_room(conn, &handle, |room| {
                    room.chat(wallet.as_ref(), conn, &message)
                })
                .await?;
            }
            Command::SetTimeControl {
                room_id,
                wallet,
                time_control,
            } => {
                let handle = self.registry.get(&room_id)?;
                self.in_room(conn, &handle, |room| {
                    room.set_time_control(&wallet, time_control)
                })
                .await?;
            }
        }
        Ok(())
    }

    /// Runs `op` under the room lock and publishes what it produced.
    async fn in_room<F>(
        self: &Arc<Self>,
        conn: ConnectionId,
        handle: &RoomHandle,
        op: F,
    ) -> Result<(), GatewayError>
    where
        F: FnOnce(&mut Room) -> Result<Transition, RoomError>,
    {
        let mut room = handle.lock().await;
        let transition = op(&mut *room)?;
        let lobby = self.publish(&room, handle, Some(conn), transition);
        drop(room);
        if lobby {
            self.broadcast_lobby().await;
        }
        Ok(())
    }

    /// The stake `wallet` was verified to cover. Zero-stake rooms skip the
    /// balance check entirely.
    async fn funds_for(
        &self,
        handle: &RoomHandle,
        wallet: &WalletAddress,
    ) -> Result<TokenAmount, GatewayError> {
        let required = handle.lock().await.stake().amount;
        if required.is_zero() {
            return Ok(TokenAmount::ZERO);
        }
        self.ensure_funded(wallet, required).await?;
        Ok(required)
    }

    async fn ensure_funded(
        &self,
        wallet: &WalletAddress,
        required: TokenAmount,
    ) -> Result<(), GatewayError> {
        let available = with_timeout(
            "balance check",
            self.request_timeout_ms,
            self.capabilities.balances.balance_of(wallet),
        )
        .await?;
        if available < required {
            return Err(RoomError::InsufficientFunds {
                required,
                available,
            }
            .into());
        }
        Ok(())
    }

    // ---- delivery ----

    /// Delivers a transition produced under `room`'s lock and starts its
    /// effects. Returns whether the lobby needs a refresh.
    fn publish(
        self: &Arc<Self>,
        room: &Room,
        handle: &RoomHandle,
        requester: Option<ConnectionId>,
        transition: Transition,
    ) -> bool {
        let members = room.member_connections();
        self.deliver(&members, requester, &transition);
        self.apply_effects(room.id(), handle, &transition)
    }

    fn deliver(
        &self,
        members: &[ConnectionId],
        requester: Option<ConnectionId>,
        transition: &Transition,
    ) {
        for outbound in &transition.messages {
            let Some(frame) = encode(&outbound.event) else {
                continue;
            };
            match outbound.audience {
                Audience::Room => {
                    for connection_id in members {
                        self.sender.send_to_client(*connection_id, frame.clone());
                    }
                }
                Audience::Requester => {
                    if let Some(connection_id) = requester {
                        self.sender.send_to_client(connection_id, frame);
                    }
                }
                Audience::Connection(connection_id) => {
                    self.sender.send_to_client(connection_id, frame);
                }
            }
        }
    }

    fn apply_effects(
        self: &Arc<Self>,
        room_id: &RoomId,
        handle: &RoomHandle,
        transition: &Transition,
    ) -> bool {
        for event in transition.room_events() {
            match event {
                ServerEvent::MoveMade { .. } => ServerStats::bump(&self.stats.moves_played),
                ServerEvent::GameOver { .. } => ServerStats::bump(&self.stats.rooms_finished),
                ServerEvent::BetPlaced { .. } => ServerStats::bump(&self.stats.bets_placed),
                _ => {}
            }
        }

        let mut lobby = false;
        for effect in &transition.effects {
            match effect {
                Effect::StartTicking => self.start_ticker(room_id.clone(), handle.clone()),
                Effect::StopTicking => self.stop_ticker(room_id),
                Effect::Settle(request) => self.spawn_settlement(handle.clone(), request.clone()),
                Effect::LobbyChanged => lobby = true,
            }
        }
        lobby
    }

    fn send(&self, connection_id: ConnectionId, event: &ServerEvent) {
        if let Some(frame) = encode(event) {
            self.sender.send_to_client(connection_id, frame);
        }
    }

    fn reject(
        &self,
        connection_id: ConnectionId,
        event: &str,
        room_id: Option<&RoomId>,
        error: &GatewayError,
    ) {
        let kind = error.kind();
        self.stats.record_error(kind);
        let room = room_id.map(RoomId::as_str).unwrap_or("-");
        let message = if kind == ErrorKind::InternalError {
            error!(connection_id, event, room_id = room, error = %error, "💥 Room handler failed");
            "internal error".to_string()
        } else {
            debug!(
                connection_id,
                event,
                room_id = room,
                kind = kind.as_str(),
                error = %error,
                "Request rejected"
            );
            error.to_string()
        };
        self.send(connection_id, &ServerEvent::error(message, kind));
    }

    pub async fn broadcast_lobby(&self) {
        let rooms = self.registry.list_public().await;
        if let Some(frame) = encode(&ServerEvent::LobbyUpdate { rooms }) {
            self.sender.broadcast(&frame);
        }
    }

    // ---- background tasks ----

    fn start_ticker(self: &Arc<Self>, room_id: RoomId, handle: RoomHandle) {
        let running = self
            .tickers
            .get(&room_id)
            .is_some_and(|entry| !entry.value().1.is_finished());
        if running {
            return;
        }
        let generation = self.ticker_generation.fetch_add(1, Ordering::Relaxed);
        let dispatcher = self.clone();
        let id = room_id.clone();
        let task = tokio::spawn(async move { dispatcher.run_ticker(id, handle, generation).await });
        self.tickers.insert(room_id, (generation, task));
    }

    fn stop_ticker(&self, room_id: &RoomId) {
        if let Some((_, (_, task))) = self.tickers.remove(room_id) {
            task.abort();
        }
    }

    /// Broadcasts the clock until the room stops ticking. A flag fall is
    /// detected here and finishes the game.
    async fn run_ticker(self: Arc<Self>, room_id: RoomId, handle: RoomHandle, generation: u64) {
        debug!(room_id = %room_id, "⏱️ Ticker started");
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await;

        loop {
            interval.tick().await;
            let mut room = handle.lock().await;
            let Some(mut transition) = room.tick() else {
                break;
            };
            // Stopping is this task's own exit, not an abort.
            let stop = transition.has_effect(&Effect::StopTicking);
            transition.effects.retain(|e| *e != Effect::StopTicking);
            let lobby = self.publish(&room, &handle, None, transition);
            drop(room);
            if lobby {
                self.broadcast_lobby().await;
            }
            if stop {
                break;
            }
        }

        self.tickers
            .remove_if(&room_id, |_, (current, _)| *current == generation);
        debug!(room_id = %room_id, "⏱️ Ticker stopped");
    }

    fn spawn_settlement(self: &Arc<Self>, handle: RoomHandle, request: SettlementRequest) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            info!(
                room_id = %request.room_id,
                stake = %request.stake,
                payouts = request.payouts.len(),
                "💸 Submitting settlement"
            );
            let report = settle(
                dispatcher.capabilities.settlement.as_ref(),
                &request,
                &dispatcher.retry,
            )
            .await;
            match report {
                SettlementReport::Confirmed { .. } => {
                    ServerStats::bump(&dispatcher.stats.settlements_confirmed)
                }
                SettlementReport::Failed { .. } => {
                    ServerStats::bump(&dispatcher.stats.settlements_failed)
                }
            }
            let mut room = handle.lock().await;
            let transition = room.record_settlement(report);
            dispatcher.publish(&room, &handle, None, transition);
        });
    }
}

fn encode(event: &ServerEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(frame) => Some(frame),
        Err(e) => {
            error!(event = event.name(), error = %e, "Failed to serialize event");
            None
        }
    }
}
