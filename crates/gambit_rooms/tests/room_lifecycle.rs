use std::sync::Arc;

use gambit_rooms::{
    Color, CreateRoom, Effect, EndReason, ErrorKind, GameResult, ManualTimeSource, RoomError,
    RoomPolicy, RoomRegistry, RoomStatus, ServerEvent, SettlementReport, SettlementStatus,
    TimeControl, TimeSource, TokenAmount, WalletAddress,
};

struct Game {
    registry: RoomRegistry,
    time: Arc<ManualTimeSource>,
    white: WalletAddress,
    black: WalletAddress,
    white_conn: u64,
    black_conn: u64,
    room: gambit_rooms::RoomHandle,
}

fn wallet(s: &str) -> WalletAddress {
    WalletAddress::parse(s).unwrap()
}

/// Creates a room for `0xcreator`, joins `0xjoiner`, and works out who got
/// which color.
async fn game(minutes: u32, increment_secs: u32, stake: u128) -> Game {
    let time = Arc::new(ManualTimeSource::new(5_000_000));
    let registry = RoomRegistry::new(RoomPolicy::default(), time.clone());
    let (room, created) = registry
        .create(CreateRoom {
            creator: wallet("0xCreator"),
            connection: 1,
            time_control: TimeControl {
                minutes,
                increment_secs,
            },
            stake: TokenAmount::new(stake),
            room_id: None,
        })
        .unwrap();
    assert!(created.has_effect(&Effect::LobbyChanged));

    let funded = TokenAmount::new(stake);
    room.lock()
        .await
        .join(wallet("0xJoiner"), 2, funded)
        .unwrap();

    let (white, black) = {
        let r = room.lock().await;
        (
            r.player(Color::White).cloned().unwrap(),
            r.player(Color::Black).cloned().unwrap(),
        )
    };
    let (white_conn, black_conn) = if white == wallet("0xcreator") {
        (1, 2)
    } else {
        (2, 1)
    };
    Game {
        registry,
        time,
        white,
        black,
        white_conn,
        black_conn,
        room,
    }
}

#[tokio::test]
async fn first_move_then_resignation() {
    let g = game(5, 0, 0).await;
    let mut room = g.room.lock().await;
    assert_eq!(room.status(), RoomStatus::Active);

    room.make_move(&g.white, g.white_conn, "e2e4").unwrap();
    assert_eq!(room.move_history().len(), 1);
    assert_eq!(room.turn(), Color::Black);

    let t = room.resign(&g.black).unwrap();
    assert_eq!(room.status(), RoomStatus::Finished);
    assert_eq!(
        room.result(),
        Some(GameResult::win(Color::White, EndReason::Resignation))
    );
    assert!(t.has_effect(&Effect::StopTicking));
    assert!(!room.clock().is_running());
    assert!(room.tick().is_none());
}

#[tokio::test]
async fn turn_parity_matches_history() {
    let g = game(5, 0, 0).await;
    let mut room = g.room.lock().await;
    let moves = [
        (&g.white, g.white_conn, "e2e4"),
        (&g.black, g.black_conn, "e7e5"),
        (&g.white, g.white_conn, "g1f3"),
        (&g.black, g.black_conn, "b8c6"),
        (&g.white, g.white_conn, "f1b5"),
    ];
    for (n, (who, conn, mv)) in moves.into_iter().enumerate() {
        room.make_move(who, conn, mv).unwrap();
        let expected = if (n + 1) % 2 == 0 {
            Color::White
        } else {
            Color::Black
        };
        assert_eq!(room.turn(), expected);
        assert_eq!(room.clock().active(), Some(expected));
    }

    let before = room.fen();
    let err = room.make_move(&g.white, g.white_conn, "d2d4").unwrap_err();
    assert_eq!(err, RoomError::NotYourTurn);
    assert_eq!(err.kind(), ErrorKind::StateConflictError);
    assert_eq!(room.fen(), before);
    assert_eq!(room.move_history().len(), 5);
}

#[tokio::test]
async fn draw_by_agreement_then_stale_response() {
    let g = game(5, 0, 0).await;
    let mut room = g.room.lock().await;

    room.offer_draw(&g.white).unwrap();
    assert_eq!(
        room.respond_to_draw(&g.white, true),
        Err(RoomError::NoActiveOffer)
    );
    room.respond_to_draw(&g.black, true).unwrap();
    assert_eq!(room.status(), RoomStatus::Finished);
    assert_eq!(room.result().map(|r| r.reason), Some(EndReason::Agreement));
    assert_eq!(
        room.respond_to_draw(&g.black, true),
        Err(RoomError::NoActiveOffer)
    );
}

#[tokio::test]
async fn declined_draw_clears_offer() {
    let g = game(5, 0, 0).await;
    let mut room = g.room.lock().await;
    room.offer_draw(&g.black).unwrap();
    let t = room.respond_to_draw(&g.white, false).unwrap();
    assert_eq!(room.draw_offer(), None);
    assert_eq!(room.status(), RoomStatus::Active);
    assert!(matches!(
        t.room_events().next(),
        Some(ServerEvent::DrawDeclined { by: Color::White, .. })
    ));
}

#[tokio::test]
async fn flag_fall_ends_the_game_once() {
    let g = game(1, 0, 0).await;
    let mut room = g.room.lock().await;

    g.time.advance(30_000);
    match room.tick().unwrap().room_events().next() {
        Some(ServerEvent::TimerUpdate {
            white_remaining_ms,
            black_remaining_ms,
            ..
        }) => {
            assert_eq!(*white_remaining_ms, 30_000);
            assert_eq!(*black_remaining_ms, 60_000);
        }
        other => panic!("expected timerUpdate, got {other:?}"),
    }

    g.time.advance(30_000);
    let t = room.tick().unwrap();
    let events: Vec<_> = t.room_events().collect();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        ServerEvent::GameOver {
            reason: EndReason::Time,
            winner: Some(Color::Black),
            ..
        }
    ));
    assert_eq!(
        room.result(),
        Some(GameResult::win(Color::Black, EndReason::Time))
    );

    g.time.advance(1_000);
    assert!(room.tick().is_none());
    assert_eq!(room.clock().remaining(Color::White), 0);
}

#[tokio::test]
async fn clock_spent_grows_while_active() {
    let g = game(3, 0, 0).await;
    let room = g.room.lock().await;
    let spent = |r: &gambit_rooms::Room| {
        2 * 180_000 - r.clock().remaining(Color::White) - r.clock().remaining(Color::Black)
    };
    let first = spent(&*room);
    g.time.advance(250);
    let second = spent(&*room);
    assert!(second > first);
}

#[tokio::test]
async fn reconnection_does_not_charge_the_gap() {
    let g = game(5, 0, 0).await;
    let mut room = g.room.lock().await;
    g.time.advance(20_000);
    room.disconnect(g.white_conn);
    g.time.advance(120_000);
    room.reconnect(g.white.clone(), 42).unwrap();
    assert_eq!(room.clock().remaining(Color::White), 280_000);
    assert!(room.clock().is_running());
}

#[tokio::test]
async fn staked_game_locks_and_settles() {
    let stake = 1_000_000u128;
    let g = game(5, 0, stake).await;
    let mut room = g.room.lock().await;
    assert_eq!(room.status(), RoomStatus::Waiting);

    let funded = TokenAmount::new(stake);
    assert_eq!(
        room.place_bet(&g.white, Color::Black, funded),
        Err(RoomError::WrongSeat(Color::Black))
    );
    room.place_bet(&g.white, Color::White, funded).unwrap();
    let t = room.place_bet(&g.black, Color::Black, funded).unwrap();
    assert!(room.stake().locked);
    assert_eq!(room.status(), RoomStatus::Active);
    assert!(t.has_effect(&Effect::StartTicking));

    for _ in 0..2 {
        assert_eq!(
            room.set_stakes(&g.white, TokenAmount::new(5)),
            Err(RoomError::StakesLocked)
        );
    }
    assert_eq!(room.stake().amount, TokenAmount::new(stake));

    let t = room.resign(&g.white).unwrap();
    let request = t
        .effects
        .iter()
        .find_map(|e| match e {
            Effect::Settle(request) => Some(request.clone()),
            _ => None,
        })
        .expect("settlement requested");
    assert_eq!(request.winner, Some(Color::Black));
    assert_eq!(request.winner_wallet.as_ref(), Some(&g.black));
    assert_eq!(request.payouts[0].amount, TokenAmount::new(1_950_000));
    assert_eq!(room.settlement(), &SettlementStatus::Pending);

    room.record_settlement(SettlementReport::Failed {
        attempts: 3,
        message: "relayer unavailable".into(),
    });
    assert!(matches!(
        room.settlement(),
        SettlementStatus::Failed { attempts: 3, .. }
    ));
    assert_eq!(
        room.result(),
        Some(GameResult::win(Color::Black, EndReason::Resignation))
    );
}

#[tokio::test]
async fn stake_change_while_checking_balance_is_refused() {
    let g = game(5, 0, 100).await;
    let mut room = g.room.lock().await;
    room.place_bet(&g.white, Color::White, TokenAmount::new(100))
        .unwrap();
    // Stake was raised after the black player's balance was checked.
    room.set_stakes(&g.white, TokenAmount::new(200)).unwrap();
    assert_eq!(
        room.place_bet(&g.black, Color::Black, TokenAmount::new(100)),
        Err(RoomError::StakeChanged)
    );
    assert!(room.stake().black_bettor.is_none());
    assert!(room.stake().white_bettor.is_none());
}

#[tokio::test]
async fn abandoned_rooms_are_swept_after_grace() {
    let g = game(5, 0, 0).await;
    {
        let mut room = g.room.lock().await;
        room.disconnect(1);
        room.disconnect(2);
    }
    let grace = RoomPolicy::default().reconnect_grace_ms;

    g.time.advance(grace - 1);
    assert!(g.registry.sweep(g.time.now_ms()).await.is_empty());

    g.time.advance(1);
    let swept = g.registry.sweep(g.time.now_ms()).await;
    assert_eq!(swept.len(), 1);
    assert!(matches!(
        swept[0].transition.room_events().next(),
        Some(ServerEvent::GameOver {
            reason: EndReason::Abandoned,
            winner: None,
            ..
        })
    ));
    assert!(g.registry.is_empty());
    assert_eq!(g.room.lock().await.status(), RoomStatus::Finished);
}
