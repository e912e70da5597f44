use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use game_server::capabilities::{BalanceOracle, Capabilities, InMemoryLedger, SharedSecretVerifier};
use game_server::connection::{ClientResponseSender, ConnectionId};
use game_server::{Dispatcher, ServerConfig, ServerStats};
use gambit_rooms::{ManualTimeSource, RoomHandle, RoomId, RoomRegistry, TokenAmount, WalletAddress};
use serde_json::{json, Value};

#[derive(Debug, Default)]
struct RecordingSender {
    frames: Mutex<HashMap<ConnectionId, Vec<Value>>>,
    broadcasts: Mutex<Vec<Value>>,
}

impl ClientResponseSender for RecordingSender {
    fn send_to_client(&self, connection_id: ConnectionId, payload: String) -> bool {
        let value: Value = serde_json::from_str(&payload).unwrap();
        self.frames
            .lock()
            .unwrap()
            .entry(connection_id)
            .or_default()
            .push(value);
        true
    }

    fn broadcast(&self, payload: &str) {
        let value: Value = serde_json::from_str(payload).unwrap();
        self.broadcasts.lock().unwrap().push(value);
    }

    fn is_connection_active(&self, _connection_id: ConnectionId) -> bool {
        true
    }
}

impl RecordingSender {
    fn named(&self, connection_id: ConnectionId, event: &str) -> Vec<Value> {
        self.frames
            .lock()
            .unwrap()
            .get(&connection_id)
            .map(|frames| {
                frames
                    .iter()
                    .filter(|f| f["event"] == event)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn last(&self, connection_id: ConnectionId, event: &str) -> Value {
        self.named(connection_id, event)
            .pop()
            .unwrap_or_else(|| panic!("no {event} for connection {connection_id}"))
    }

    fn errors(&self, connection_id: ConnectionId) -> Vec<Value> {
        self.named(connection_id, "error")
    }

    /// Event names delivered to a connection, oldest first.
    fn names(&self, connection_id: ConnectionId) -> Vec<String> {
        self.frames
            .lock()
            .unwrap()
            .get(&connection_id)
            .map(|frames| {
                frames
                    .iter()
                    .filter_map(|f| f["event"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Asserts the clock went quiet once the game ended.
    fn assert_no_timer_after_game_over(&self, connection_id: ConnectionId) {
        let names = self.names(connection_id);
        let over = names
            .iter()
            .position(|n| n == "gameOver")
            .expect("gameOver delivered");
        assert!(!names[over..].iter().any(|n| n == "timerUpdate"));
    }
}

struct Harness {
    dispatcher: Arc<Dispatcher>,
    sender: Arc<RecordingSender>,
    time: Arc<ManualTimeSource>,
    ledger: Arc<InMemoryLedger>,
    verifier: Arc<SharedSecretVerifier>,
}

impl Harness {
    fn new(config: ServerConfig) -> Self {
        let time = Arc::new(ManualTimeSource::new(1_000_000));
        let ledger = Arc::new(InMemoryLedger::new(TokenAmount::new(1_000)));
        let verifier = Arc::new(SharedSecretVerifier::new("test-secret", time.clone()));
        let sender = Arc::new(RecordingSender::default());
        let registry = Arc::new(RoomRegistry::new(config.rooms.clone(), time.clone()));
        let dispatcher = Arc::new(Dispatcher::new(
            &config,
            registry,
            sender.clone(),
            Capabilities::in_memory(ledger.clone(), verifier.clone()),
            Arc::new(ServerStats::new()),
        ));
        Self {
            dispatcher,
            sender,
            time,
            ledger,
            verifier,
        }
    }

    async fn send(&self, conn: ConnectionId, event: &str, data: Value) {
        let frame = json!({ "event": event, "data": data }).to_string();
        self.dispatcher.handle_text(conn, &frame).await;
    }

    /// Opens connections 1 and 2, creates a room from 1 and joins it from 2.
    /// Returns the room id and the connection playing white.
    async fn started_game(&self, minutes: u32, stake: u64) -> (String, ConnectionId) {
        self.open_game((1, "0xalice"), (2, "0xbob"), minutes, stake)
            .await
    }

    async fn open_game(
        &self,
        creator: (ConnectionId, &str),
        joiner: (ConnectionId, &str),
        minutes: u32,
        stake: u64,
    ) -> (String, ConnectionId) {
        self.dispatcher.on_connect(creator.0);
        self.dispatcher.on_connect(joiner.0);
        self.send(
            creator.0,
            "createGame",
            json!({ "walletAddress": creator.1, "timeControlMinutes": minutes, "stake": stake }),
        )
        .await;
        let created = self.sender.last(creator.0, "gameCreated");
        let room_id = created["data"]["roomId"].as_str().unwrap().to_string();
        let white = if created["data"]["color"] == "white" {
            creator.0
        } else {
            joiner.0
        };

        self.send(
            joiner.0,
            "joinGame",
            json!({ "roomId": room_id, "walletAddress": joiner.1 }),
        )
        .await;
        (room_id, white)
    }

    fn room(&self, room_id: &str) -> RoomHandle {
        self.dispatcher
            .registry()
            .get(&RoomId::from(room_id))
            .unwrap()
    }
}

fn wallet_of(conn: ConnectionId) -> &'static str {
    if conn == 1 {
        "0xalice"
    } else {
        "0xbob"
    }
}

fn other(conn: ConnectionId) -> ConnectionId {
    if conn == 1 {
        2
    } else {
        1
    }
}

#[tokio::test(start_paused = true)]
async fn create_join_and_move() {
    let h = Harness::new(ServerConfig::default());
    let (room_id, white) = h.started_game(5, 0).await;
    let black = other(white);

    assert_eq!(h.sender.named(1, "gameJoined").len(), 1);
    assert_eq!(h.sender.named(2, "gameStarted").len(), 1);
    assert_eq!(h.sender.named(2, "gameState").len(), 1);
    assert!(!h.sender.broadcasts.lock().unwrap().is_empty());
    assert_eq!(h.dispatcher.active_tickers(), 1);

    h.send(
        black,
        "makeMove",
        json!({ "roomId": room_id, "move": "e7e5", "walletAddress": wallet_of(black) }),
    )
    .await;
    let errors = h.sender.errors(black);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["data"]["type"], "state_conflict_error");
    assert!(h.sender.named(white, "moveMade").is_empty());

    h.send(
        white,
        "makeMove",
        json!({ "roomId": room_id, "move": "e2e4", "walletAddress": wallet_of(white) }),
    )
    .await;
    let made = h.sender.last(black, "moveMade");
    assert_eq!(made["data"]["move"]["move"], "e2e4");
    assert_eq!(made["data"]["isGameOver"], false);
    assert_eq!(h.dispatcher.stats().snapshot().moves_played, 1);

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(!h.sender.named(white, "timerUpdate").is_empty());
}

#[tokio::test(start_paused = true)]
async fn malformed_and_unknown_frames_get_one_error_each() {
    let h = Harness::new(ServerConfig::default());
    h.dispatcher.on_connect(7);

    h.dispatcher.handle_text(7, "not json").await;
    h.send(7, "teleport", json!({})).await;
    h.send(7, "makeMove", json!({ "roomId": "ABCDEFGH", "move": "e2", "walletAddress": "0xa" }))
        .await;

    let errors = h.sender.errors(7);
    assert_eq!(errors.len(), 3);
    assert!(errors.iter().all(|e| e["data"]["type"] == "validation_error"));
}

#[tokio::test(start_paused = true)]
async fn unknown_room_is_not_found() {
    let h = Harness::new(ServerConfig::default());
    h.dispatcher.on_connect(1);
    h.send(1, "joinGame", json!({ "roomId": "NOPE1234", "walletAddress": "0xalice" }))
        .await;
    assert_eq!(h.sender.last(1, "error")["data"]["type"], "not_found_error");
}

#[tokio::test(start_paused = true)]
async fn rate_limit_rejects_excess_actions() {
    let mut config = ServerConfig::default();
    config.rate_limit.max_actions = 3;
    let h = Harness::new(config);
    h.dispatcher.on_connect(1);

    for _ in 0..4 {
        h.send(1, "getLobby", Value::Null).await;
    }
    assert_eq!(h.sender.named(1, "lobbyUpdate").len(), 3);
    assert_eq!(h.sender.last(1, "error")["data"]["type"], "rate_limit_error");

    h.time.advance(10_001);
    h.send(1, "getLobby", Value::Null).await;
    assert_eq!(h.sender.named(1, "lobbyUpdate").len(), 4);
}

#[tokio::test(start_paused = true)]
async fn authenticated_session_pins_the_wallet() {
    let h = Harness::new(ServerConfig::default());
    h.dispatcher.on_connect(1);

    let token = h
        .verifier
        .issue(&WalletAddress::parse("0xalice").unwrap(), 10_000);
    h.send(1, "authenticate", json!({ "token": token })).await;
    assert_eq!(
        h.sender.last(1, "authenticated")["data"]["walletAddress"],
        "0xalice"
    );

    h.send(
        1,
        "createGame",
        json!({ "walletAddress": "0xmallory", "timeControlMinutes": 5 }),
    )
    .await;
    assert_eq!(h.sender.last(1, "error")["data"]["type"], "authorization_error");
    assert!(h.dispatcher.registry().is_empty());

    h.send(
        1,
        "createGame",
        json!({ "walletAddress": "0xALICE", "timeControlMinutes": 5 }),
    )
    .await;
    assert_eq!(h.sender.named(1, "gameCreated").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn bad_token_is_an_external_error() {
    let h = Harness::new(ServerConfig::default());
    h.dispatcher.on_connect(1);
    h.send(1, "authenticate", json!({ "token": "0xalice.10000.00" })).await;
    assert_eq!(
        h.sender.last(1, "error")["data"]["type"],
        "external_service_error"
    );
    assert!(h.dispatcher.sessions().wallet(1).is_none());
}

#[tokio::test(start_paused = true)]
async fn require_auth_blocks_anonymous_mutations() {
    let config = ServerConfig {
        require_auth: true,
        ..ServerConfig::default()
    };
    let h = Harness::new(config);
    h.dispatcher.on_connect(1);

    h.send(1, "getLobby", Value::Null).await;
    assert_eq!(h.sender.named(1, "lobbyUpdate").len(), 1);

    h.send(
        1,
        "createGame",
        json!({ "walletAddress": "0xalice", "timeControlMinutes": 5 }),
    )
    .await;
    assert_eq!(h.sender.last(1, "error")["data"]["type"], "authorization_error");
}

#[tokio::test(start_paused = true)]
async fn staked_join_checks_the_balance() {
    let h = Harness::new(ServerConfig::default());
    h.ledger
        .set_balance(WalletAddress::parse("0xbob").unwrap(), TokenAmount::new(5));
    h.dispatcher.on_connect(1);
    h.dispatcher.on_connect(2);

    h.send(
        1,
        "createGame",
        json!({ "walletAddress": "0xalice", "timeControlMinutes": 5, "stake": 100 }),
    )
    .await;
    let room_id = h.sender.last(1, "gameCreated")["data"]["roomId"]
        .as_str()
        .unwrap()
        .to_string();

    h.send(2, "joinGame", json!({ "roomId": room_id, "walletAddress": "0xbob" }))
        .await;
    assert_eq!(h.sender.last(2, "error")["data"]["type"], "state_conflict_error");
    assert!(h.sender.named(1, "gameJoined").is_empty());
}

#[tokio::test(start_paused = true)]
async fn staked_game_settles_after_resignation() {
    let h = Harness::new(ServerConfig::default());
    let (room_id, white) = h.started_game(5, 100).await;
    let black = other(white);
    assert!(h.sender.named(1, "gameStarted").is_empty());

    for (conn, color) in [(white, "white"), (black, "black")] {
        h.send(
            conn,
            "placeBet",
            json!({ "roomId": room_id, "walletAddress": wallet_of(conn), "color": color }),
        )
        .await;
    }
    assert_eq!(h.sender.named(1, "gameStarted").len(), 1);
    assert_eq!(h.dispatcher.stats().snapshot().bets_placed, 2);

    h.send(
        black,
        "resign",
        json!({ "roomId": room_id, "walletAddress": wallet_of(black) }),
    )
    .await;
    let over = h.sender.last(white, "gameOver");
    assert_eq!(over["data"]["reason"], "resignation");
    assert_eq!(over["data"]["winner"], "white");

    tokio::time::sleep(Duration::from_millis(500)).await;
    h.sender.assert_no_timer_after_game_over(white);
    h.sender.assert_no_timer_after_game_over(black);
    let confirmed = h.sender.last(black, "settlementConfirmed");
    assert!(confirmed["data"]["transaction"]
        .as_str()
        .unwrap()
        .starts_with("0x"));

    let settlements = h.ledger.settlements();
    assert_eq!(settlements.len(), 1);
    assert_eq!(settlements[0].house_fee, TokenAmount::new(5));
    let winner = WalletAddress::parse(wallet_of(white)).unwrap();
    let loser = WalletAddress::parse(wallet_of(black)).unwrap();
    assert_eq!(
        h.ledger.balance_of(&winner).await,
        Ok(TokenAmount::new(1_095))
    );
    assert_eq!(h.ledger.balance_of(&loser).await, Ok(TokenAmount::new(900)));
    assert_eq!(h.dispatcher.stats().snapshot().settlements_confirmed, 1);
}

#[tokio::test(start_paused = true)]
async fn disconnect_pauses_the_clock() {
    let h = Harness::new(ServerConfig::default());
    let (room_id, white) = h.started_game(5, 0).await;
    let black = other(white);
    assert_eq!(h.dispatcher.active_tickers(), 1);

    h.dispatcher.on_disconnect(white).await;
    assert_eq!(h.dispatcher.active_tickers(), 0);
    assert_eq!(
        h.sender.last(black, "playerDisconnected")["data"]["color"],
        "white"
    );

    h.time.advance(30_000);
    h.dispatcher.on_connect(9);
    h.send(
        9,
        "reconnectToGame",
        json!({ "roomId": room_id, "walletAddress": wallet_of(white) }),
    )
    .await;
    let state = h.sender.last(9, "gameState");
    assert_eq!(state["data"]["clock"]["whiteRemainingMs"], 300_000);
    assert_eq!(h.dispatcher.active_tickers(), 1);
    assert_eq!(
        h.sender.last(black, "playerReconnected")["data"]["color"],
        "white"
    );
}

#[tokio::test(start_paused = true)]
async fn flag_fall_is_detected_by_the_ticker() {
    let h = Harness::new(ServerConfig::default());
    let (_room_id, white) = h.started_game(1, 0).await;
    let black = other(white);

    h.time.advance(60_000);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let over = h.sender.last(black, "gameOver");
    assert_eq!(over["data"]["reason"], "time");
    assert_eq!(over["data"]["winner"], "black");
    assert_eq!(h.dispatcher.active_tickers(), 0);
    assert_eq!(h.dispatcher.stats().snapshot().rooms_finished, 1);

    let updates = h.sender.named(black, "timerUpdate").len();
    h.time.advance(5_000);
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert_eq!(h.sender.named(black, "timerUpdate").len(), updates);
    h.sender.assert_no_timer_after_game_over(white);
    h.sender.assert_no_timer_after_game_over(black);
}

#[tokio::test(start_paused = true)]
async fn a_dropped_player_must_reconnect_before_moving() {
    let h = Harness::new(ServerConfig::default());
    let (room_id, white) = h.started_game(1, 0).await;
    let black = other(white);

    h.dispatcher.on_disconnect(white).await;
    assert_eq!(h.dispatcher.active_tickers(), 0);

    h.dispatcher.on_connect(9);
    let opening = json!({ "roomId": room_id, "move": "e2e4", "walletAddress": wallet_of(white) });
    h.send(9, "makeMove", opening.clone()).await;
    assert_eq!(h.sender.last(9, "error")["data"]["type"], "authorization_error");
    assert!(h.sender.named(black, "moveMade").is_empty());
    assert!(h.room(&room_id).lock().await.move_history().is_empty());

    h.send(
        9,
        "reconnectToGame",
        json!({ "roomId": room_id, "walletAddress": wallet_of(white) }),
    )
    .await;
    h.send(9, "makeMove", opening).await;
    assert_eq!(h.sender.named(9, "moveMade").len(), 1);
    assert_eq!(h.sender.named(black, "moveMade").len(), 1);
    assert_eq!(h.dispatcher.active_tickers(), 1);

    // Black's clock is the one running now and must still be able to flag.
    h.time.advance(60_000);
    tokio::time::sleep(Duration::from_millis(200)).await;
    let over = h.sender.last(9, "gameOver");
    assert_eq!(over["data"]["reason"], "time");
    assert_eq!(over["data"]["winner"], "white");
    assert_eq!(h.dispatcher.active_tickers(), 0);
}

#[tokio::test(start_paused = true)]
async fn concurrent_moves_in_one_room_are_serialized() {
    let h = Harness::new(ServerConfig::default());
    let (room_id, white) = h.started_game(5, 0).await;
    let black = other(white);

    let e4 = json!({ "roomId": room_id, "move": "e2e4", "walletAddress": wallet_of(white) });
    let d4 = json!({ "roomId": room_id, "move": "d2d4", "walletAddress": wallet_of(white) });
    tokio::join!(
        h.send(white, "makeMove", e4),
        h.send(white, "makeMove", d4)
    );

    assert_eq!(h.sender.named(black, "moveMade").len(), 1);
    let errors = h.sender.errors(white);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["data"]["type"], "state_conflict_error");
    assert_eq!(h.room(&room_id).lock().await.move_history().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn a_busy_room_does_not_hold_up_another() {
    let h = Harness::new(ServerConfig::default());
    let (first, first_white) = h.started_game(5, 0).await;
    let (second, second_white) = h.open_game((3, "0xcarol"), (4, "0xdave"), 5, 0).await;
    let second_black = if second_white == 3 { 4 } else { 3 };
    let second_wallet = if second_white == 3 { "0xcarol" } else { "0xdave" };

    let held = h.room(&first);
    let guard = held.lock().await;

    h.send(
        second_white,
        "makeMove",
        json!({ "roomId": second, "move": "e2e4", "walletAddress": second_wallet }),
    )
    .await;
    assert_eq!(h.sender.named(second_black, "moveMade").len(), 1);

    let waiting = tokio::time::timeout(
        Duration::from_millis(500),
        h.send(
            first_white,
            "makeMove",
            json!({ "roomId": first, "move": "e2e4", "walletAddress": wallet_of(first_white) }),
        ),
    )
    .await;
    assert!(waiting.is_err());
    assert!(h.sender.named(other(first_white), "moveMade").is_empty());

    drop(guard);
    h.send(
        first_white,
        "makeMove",
        json!({ "roomId": first, "move": "e2e4", "walletAddress": wallet_of(first_white) }),
    )
    .await;
    assert_eq!(h.sender.named(other(first_white), "moveMade").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn abandoned_rooms_are_swept() {
    let h = Harness::new(ServerConfig::default());
    let (_room_id, _white) = h.started_game(5, 0).await;

    h.dispatcher.on_disconnect(1).await;
    h.dispatcher.on_disconnect(2).await;
    assert_eq!(h.dispatcher.sweep().await, 0);

    h.time.advance(60_001);
    assert_eq!(h.dispatcher.sweep().await, 1);
    assert!(h.dispatcher.registry().is_empty());
    assert_eq!(h.dispatcher.stats().snapshot().rooms_swept, 1);
}
