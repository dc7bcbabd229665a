#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! End-to-end tests of the client against an in-memory hub.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{init_tracing, next_link, test_config, Dial, LoopbackConnector, ServerLink, PATIENCE};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};
use truth_or_dare_client::call::invoke;
use truth_or_dare_client::protocol::HubMessage;
use truth_or_dare_client::{
    ClientOperation, ConnectionManager, ConnectionState, CreateRoomParams, ErrorCode, EventKind,
    HubSession, Inconsistency, JoinRoomParams, LinkStatus, ReconnectPolicy, RoomHub, RoomStatus,
    TruthOrDareError,
};

fn start_game_op() -> ClientOperation {
    ClientOperation::StartGame {
        room_id: "r-1".into(),
        player_id: "p-1".into(),
    }
}

async fn started_session(
    connector: &Arc<LoopbackConnector>,
    links: &mut tokio::sync::mpsc::UnboundedReceiver<ServerLink>,
) -> (Arc<HubSession>, ServerLink) {
    let session = Arc::new(HubSession::new(&test_config(), connector.clone()));
    session.start().await.unwrap();
    let link = next_link(links).await;
    (session, link)
}

async fn wait_for_state(hub: &RoomHub, state: ConnectionState) {
    let mut rx = hub.subscribe_connection();
    tokio::time::timeout(PATIENCE, rx.wait_for(|s| *s == state))
        .await
        .unwrap_or_else(|_| panic!("state never became {state:?}"))
        .unwrap();
}

/// Wait for a spawned call to finish.
async fn settled<T>(task: tokio::task::JoinHandle<T>) -> T {
    tokio::time::timeout(PATIENCE, task)
        .await
        .expect("call never settled")
        .unwrap()
}

fn players_json() -> serde_json::Value {
    json!([
        { "playerId": "p-1", "playerName": "Ana", "isHost": true },
        { "playerId": "p-2", "playerName": "Ben" }
    ])
}

// ── Connection lifecycle ────────────────────────────────────────────

#[tokio::test]
async fn concurrent_callers_share_one_dial() {
    init_tracing();
    let (connector, _links) = LoopbackConnector::new();
    connector.slow_down(Duration::from_millis(50));
    let manager = Arc::new(ConnectionManager::new(test_config(), connector.clone()));

    let calls = (0..5).map(|_| {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.ensure_connection().await })
    });
    let sessions: Vec<_> = futures_util::future::join_all(calls)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(connector.dials(), 1);
    assert!(sessions.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert_eq!(manager.state(), ConnectionState::Connected);

    // Already connected: no further dial.
    manager.ensure_connection().await.unwrap();
    assert_eq!(connector.dials(), 1);
}

#[tokio::test]
async fn rejected_handshake_surfaces_as_connection_error() {
    let (connector, _links) = LoopbackConnector::new();
    connector.script([Dial::RejectHandshake("protocol not supported".into())]);
    let hub = RoomHub::with_connector(test_config(), connector.clone());

    let err = assert_err!(hub.connect().await);
    assert!(err.is_connection(), "got {err:?}");
    assert!(err.to_string().contains("protocol not supported"));
    assert_eq!(hub.connection_state(), ConnectionState::Disconnected);

    // The next attempt dials again and succeeds.
    assert_ok!(hub.connect().await);
    assert_eq!(connector.dials(), 2);
    assert_eq!(hub.connection_state(), ConnectionState::Connected);
}

#[tokio::test]
async fn session_start_reports_handshake_error() {
    let (connector, _links) = LoopbackConnector::new();
    connector.script([Dial::RejectHandshake("nope".into())]);
    let session = HubSession::new(&test_config(), connector.clone());

    let err = assert_err!(session.start().await);
    assert!(matches!(err, TruthOrDareError::Handshake(ref e) if e == "nope"));
}

#[tokio::test]
async fn lost_link_reconnects_and_keeps_handlers() {
    init_tracing();
    let (connector, mut links) = LoopbackConnector::new();
    let config = test_config().with_reconnect(
        ReconnectPolicy::default()
            .with_delays(Duration::from_millis(100), Duration::from_millis(200)),
    );
    let hub = RoomHub::with_connector(config, connector.clone());
    assert_ok!(hub.connect().await);
    let first = next_link(&mut links).await;

    first.hang_up();
    wait_for_state(&hub, ConnectionState::Reconnecting).await;
    let second = next_link(&mut links).await;
    wait_for_state(&hub, ConnectionState::Connected).await;
    assert_eq!(connector.dials(), 2);

    // The projection is still subscribed on the new link.
    second.push("PlayerListUpdated", players_json());
    let mut snapshots = hub.room().subscribe();
    tokio::time::timeout(PATIENCE, snapshots.wait_for(|s| s.players.len() == 2))
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn exhausted_reconnect_rejects_pending_calls() {
    init_tracing();
    let (connector, mut links) = LoopbackConnector::new();
    connector.script([Dial::Accept]);
    connector.then_always(Dial::Refuse);
    let config = test_config().with_reconnect(
        ReconnectPolicy::default()
            .with_delays(Duration::from_millis(5), Duration::from_millis(10))
            .with_max_attempts(2),
    );
    let hub = Arc::new(RoomHub::with_connector(config, connector.clone()));
    assert_ok!(hub.connect().await);
    let mut link = next_link(&mut links).await;

    let pending = {
        let hub = Arc::clone(&hub);
        tokio::spawn(async move { hub.start_game("r-1", "p-1").await })
    };
    let (target, _) = link.next_invocation().await.unwrap();
    assert_eq!(target, "StartGame");
    link.hang_up();

    let outcome = settled(pending).await;
    assert!(matches!(outcome, Err(TruthOrDareError::ConnectionClosed)));
    wait_for_state(&hub, ConnectionState::Disconnected).await;
    // One initial dial plus two reconnect attempts.
    assert_eq!(connector.dials(), 3);
}

#[tokio::test]
async fn call_whose_frame_dies_with_the_link_is_rejected() {
    init_tracing();
    let (connector, mut links) = LoopbackConnector::new();
    connector.script([Dial::AcceptBrokenSend]);
    let hub = RoomHub::with_connector(test_config(), connector.clone());
    assert_ok!(hub.connect().await);
    let _first = next_link(&mut links).await;

    let outcome = tokio::time::timeout(PATIENCE, hub.start_game("r-1", "p-1"))
        .await
        .expect("call never settled");
    assert!(
        matches!(outcome, Err(TruthOrDareError::ConnectionClosed)),
        "got {outcome:?}"
    );

    // Only the room projection stays subscribed.
    let session = hub.manager().session().unwrap();
    assert_eq!(session.handler_count(EventKind::StartGameSuccess), 1);
    assert_eq!(session.handler_count(EventKind::OperationFailed), 1);

    // The session came back on its own; a retried call goes through.
    let mut second = next_link(&mut links).await;
    wait_for_state(&hub, ConnectionState::Connected).await;
    assert_eq!(connector.dials(), 2);
    let hub = Arc::new(hub);
    let retry = {
        let hub = Arc::clone(&hub);
        tokio::spawn(async move { hub.start_game("r-1", "p-1").await })
    };
    let (target, _) = second.next_invocation().await.unwrap();
    assert_eq!(target, "StartGame");
    second.push("StartGameSuccess", json!({ "message": "started" }));
    let retried = settled(retry).await;
    assert_ok!(retried);
}

#[tokio::test]
async fn call_sent_before_the_link_drops_is_rejected() {
    let (connector, mut links) = LoopbackConnector::new();
    let hub = Arc::new(RoomHub::with_connector(test_config(), connector.clone()));
    assert_ok!(hub.connect().await);
    let mut first = next_link(&mut links).await;

    let pending = {
        let hub = Arc::clone(&hub);
        tokio::spawn(async move { hub.start_game("r-1", "p-1").await })
    };
    let (target, _) = first.next_invocation().await.unwrap();
    assert_eq!(target, "StartGame");
    first.hang_up();

    let outcome = settled(pending).await;
    assert!(matches!(outcome, Err(TruthOrDareError::ConnectionClosed)));

    // The answer would have come on the old link; the new one never replays it.
    let _second = next_link(&mut links).await;
    wait_for_state(&hub, ConnectionState::Connected).await;
}

#[tokio::test]
async fn call_during_reconnect_goes_out_on_the_new_link() {
    init_tracing();
    let (connector, mut links) = LoopbackConnector::new();
    let config = test_config().with_reconnect(
        ReconnectPolicy::default()
            .with_delays(Duration::from_millis(100), Duration::from_millis(200)),
    );
    let hub = Arc::new(RoomHub::with_connector(config, connector.clone()));
    assert_ok!(hub.connect().await);
    let first = next_link(&mut links).await;

    first.hang_up();
    wait_for_state(&hub, ConnectionState::Reconnecting).await;
    let pending = {
        let hub = Arc::clone(&hub);
        tokio::spawn(async move { hub.start_game("r-1", "p-1").await })
    };

    let mut second = next_link(&mut links).await;
    let (target, _) = second.next_invocation().await.unwrap();
    assert_eq!(target, "StartGame");
    second.push("StartGameSuccess", json!({ "message": "started" }));

    let ack = settled(pending).await;
    let ack = assert_ok!(ack);
    assert_eq!(ack.message(), Some("started"));
    assert_eq!(connector.dials(), 2);
}

#[tokio::test]
async fn call_during_exhausted_reconnect_is_rejected() {
    let (connector, mut links) = LoopbackConnector::new();
    connector.script([Dial::Accept]);
    connector.then_always(Dial::Refuse);
    let config = test_config().with_reconnect(
        ReconnectPolicy::default()
            .with_delays(Duration::from_millis(100), Duration::from_millis(200))
            .with_max_attempts(2),
    );
    let hub = Arc::new(RoomHub::with_connector(config, connector.clone()));
    assert_ok!(hub.connect().await);
    let first = next_link(&mut links).await;

    first.hang_up();
    wait_for_state(&hub, ConnectionState::Reconnecting).await;
    let pending = {
        let hub = Arc::clone(&hub);
        tokio::spawn(async move { hub.start_game("r-1", "p-1").await })
    };

    let outcome = tokio::time::timeout(PATIENCE, pending)
        .await
        .expect("call hung after reconnect gave up")
        .unwrap();
    let err = assert_err!(outcome);
    assert!(err.is_connection(), "got {err:?}");
    assert_eq!(hub.connection_state(), ConnectionState::Disconnected);
    // Initial dial, two reconnect attempts, then the call's own fresh attempt.
    assert_eq!(connector.dials(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn link_lost_during_connect_is_not_reported_as_connected() {
    let (connector, _links) = LoopbackConnector::new();
    connector.script([Dial::AcceptThenHangUp]);
    let config = test_config().with_reconnect(
        ReconnectPolicy::default()
            .with_delays(Duration::from_secs(2), Duration::from_secs(4)),
    );
    let hub = RoomHub::with_connector(config, connector.clone());
    assert_ok!(hub.connect().await);

    wait_for_state(&hub, ConnectionState::Reconnecting).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(hub.connection_state(), ConnectionState::Reconnecting);
    assert_eq!(connector.dials(), 1);
}

#[tokio::test]
async fn server_close_without_reconnect_ends_session() {
    let (connector, mut links) = LoopbackConnector::new();
    let hub = RoomHub::with_connector(test_config(), connector.clone());
    assert_ok!(hub.connect().await);
    let link = next_link(&mut links).await;

    link.push_frame(
        HubMessage::Close {
            error: Some("kicked".into()),
            allow_reconnect: false,
        }
        .to_frame()
        .unwrap(),
    );

    wait_for_state(&hub, ConnectionState::Disconnected).await;
    assert_eq!(connector.dials(), 1);
    let session = hub.manager().session().unwrap();
    assert_eq!(session.status(), LinkStatus::Closed);
}

#[tokio::test]
async fn server_silence_counts_as_lost_link() {
    let (connector, mut links) = LoopbackConnector::new();
    let config = test_config()
        .with_reconnect(ReconnectPolicy::disabled())
        .with_server_timeout(Duration::from_millis(80));
    let hub = RoomHub::with_connector(config, connector.clone());
    assert_ok!(hub.connect().await);
    let _link = next_link(&mut links).await;

    wait_for_state(&hub, ConnectionState::Disconnected).await;
}

#[tokio::test]
async fn keepalive_pings_are_sent() {
    let (connector, mut links) = LoopbackConnector::new();
    let config = test_config().with_keepalive_interval(Duration::from_millis(20));
    let hub = RoomHub::with_connector(config, connector.clone());
    assert_ok!(hub.connect().await);
    let mut link = next_link(&mut links).await;

    let mut saw_ping = false;
    for _ in 0..4 {
        if link.next_record().await == Some(HubMessage::Ping) {
            saw_ping = true;
            break;
        }
    }
    assert!(saw_ping);
}

#[tokio::test]
async fn shutdown_rejects_pending_call() {
    let (connector, mut links) = LoopbackConnector::new();
    let hub = Arc::new(RoomHub::with_connector(test_config(), connector.clone()));
    assert_ok!(hub.connect().await);
    let mut link = next_link(&mut links).await;

    let pending = {
        let hub = Arc::clone(&hub);
        tokio::spawn(async move { hub.end_game("r-1", "p-1").await })
    };
    link.next_invocation().await.unwrap();
    hub.shutdown().await;

    let outcome = settled(pending).await;
    assert!(matches!(outcome, Err(TruthOrDareError::ConnectionClosed)));
    assert_eq!(hub.connection_state(), ConnectionState::Disconnected);
}

// ── Event-correlated calls ──────────────────────────────────────────

#[tokio::test]
async fn call_on_unstarted_session_leaves_no_handlers() {
    let (connector, _links) = LoopbackConnector::new();
    let session = Arc::new(HubSession::new(&test_config(), connector.clone()));

    let err = invoke(
        &session,
        start_game_op(),
        EventKind::StartGameSuccess,
        EventKind::OperationFailed,
        None,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, TruthOrDareError::NotConnected));
    assert_eq!(session.handler_count(EventKind::StartGameSuccess), 0);
    assert_eq!(session.handler_count(EventKind::OperationFailed), 0);
}

#[tokio::test]
async fn first_event_settles_and_handlers_are_removed() {
    let (connector, mut links) = LoopbackConnector::new();
    let (session, mut link) = started_session(&connector, &mut links).await;

    let call = {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            invoke(
                &session,
                start_game_op(),
                EventKind::StartGameSuccess,
                EventKind::OperationFailed,
                None,
            )
            .await
        })
    };
    link.next_invocation().await.unwrap();
    link.push_batch(&[
        ("StartGameSuccess", json!({ "message": "started" })),
        (
            "OperationFailed",
            json!({ "statusCode": 400, "errors": { "errorCode": 1006, "message": "late" } }),
        ),
    ]);

    let event = call.await.unwrap().unwrap();
    assert_eq!(event.kind(), EventKind::StartGameSuccess);
    assert_eq!(session.handler_count(EventKind::StartGameSuccess), 0);
    assert_eq!(session.handler_count(EventKind::OperationFailed), 0);
}

#[tokio::test]
async fn one_failure_event_rejects_every_pending_call() {
    let (connector, mut links) = LoopbackConnector::new();
    let (session, mut link) = started_session(&connector, &mut links).await;

    let spawn_call = |op: ClientOperation, success: EventKind| {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            invoke(&session, op, success, EventKind::OperationFailed, None).await
        })
    };
    let start = spawn_call(start_game_op(), EventKind::StartGameSuccess);
    link.next_invocation().await.unwrap();
    let question = spawn_call(
        ClientOperation::GetRandomQuestionForRoom {
            room_id: "r-1".into(),
            player_id: "p-1".into(),
            question_type: Default::default(),
        },
        EventKind::GetQuestionSuccess,
    );
    link.next_invocation().await.unwrap();

    link.push(
        "OperationFailed",
        json!({ "statusCode": 400, "errors": { "errorCode": 1016, "message": "not your turn" } }),
    );

    for handle in [start, question] {
        let err = handle.await.unwrap().unwrap_err();
        assert_eq!(err.envelope().unwrap().code(), Some(ErrorCode::NotYourTurn));
    }
    assert_eq!(session.handler_count(EventKind::OperationFailed), 0);
}

#[tokio::test]
async fn call_times_out_when_configured() {
    let (connector, mut links) = LoopbackConnector::new();
    let config = test_config().with_call_timeout(Duration::from_millis(50));
    let hub = RoomHub::with_connector(config, connector.clone());
    assert_ok!(hub.connect().await);
    let _link = next_link(&mut links).await;

    let err = hub.next_player("r-1", "p-1").await.unwrap_err();
    assert!(matches!(err, TruthOrDareError::Timeout));
    let session = hub.manager().session().unwrap();
    // Only the room projection stays subscribed.
    assert_eq!(session.handler_count(EventKind::NextPlayerSuccess), 1);
    assert_eq!(session.handler_count(EventKind::OperationFailed), 1);
}

#[tokio::test]
async fn operation_failed_reaches_caller_and_projection() {
    let (connector, mut links) = LoopbackConnector::new();
    let hub = Arc::new(RoomHub::with_connector(test_config(), connector.clone()));
    assert_ok!(hub.connect().await);
    let mut link = next_link(&mut links).await;

    let pending = {
        let hub = Arc::clone(&hub);
        tokio::spawn(async move { hub.start_game("r-1", "p-2").await })
    };
    link.next_invocation().await.unwrap();
    link.push(
        "OperationFailed",
        json!({ "statusCode": 403, "errors": { "errorCode": 1006, "message": "host only" } }),
    );

    let err = pending.await.unwrap().unwrap_err();
    let envelope = err.envelope().unwrap();
    assert_eq!(envelope.code(), Some(ErrorCode::RoomRequiredHost));
    assert_eq!(envelope.message(), "host only");
    assert_eq!(hub.room().last_error().as_ref(), Some(envelope));
}

// ── Full round trip ─────────────────────────────────────────────────

/// Plays the hub for one room, answering each operation the way the server does.
async fn play_hub(mut link: ServerLink) {
    while let Some((target, args)) = link.next_invocation().await {
        match target.as_str() {
            "CreateRoom" => {
                let host = json!([{ "playerId": "p-1", "playerName": "Ana", "isHost": true }]);
                let created = json!({ "roomId": "r-1", "message": "created" });
                link.push_batch(&[("PlayerListUpdated", host), ("CreateRoomSuccess", created)]);
            }
            "JoinRoom" => {
                let ben = json!({ "playerId": "p-2", "playerName": "Ben" });
                link.push_batch(&[
                    ("PlayerJoined", ben),
                    ("PlayerListUpdated", players_json()),
                    ("JoinRoomSuccess", json!({ "message": "joined" })),
                ]);
            }
            "StartGame" => {
                let started = json!({ "currentPlayerId": "p-1", "currentPlayerName": "Ana" });
                link.push_batch(&[
                    ("GameStarted", started),
                    ("StartGameSuccess", json!({ "message": "started" })),
                ]);
            }
            "GetRandomQuestionForRoom" => {
                let kind = args.get(2).and_then(|v| v.as_str()).unwrap_or("truth");
                link.push_batch(&[
                    (
                        "QuestionAssigned",
                        json!({
                            "playerId": "p-1",
                            "playerName": "Ana",
                            "questionId": "q-7",
                            "questionText": "Worst haircut?",
                            "questionType": kind,
                            "isLastQuestion": true
                        }),
                    ),
                    (
                        "GetQuestionSuccess",
                        json!({
                            "questionId": "q-7",
                            "questionText": "Worst haircut?",
                            "questionType": kind
                        }),
                    ),
                ]);
            }
            "NextPlayer" => {
                let turn = json!({ "nextPlayerId": "p-2", "nextPlayerName": "Ben" });
                link.push_batch(&[
                    ("NextPlayerTurn", turn),
                    ("NextPlayerSuccess", json!({ "message": "ok" })),
                ]);
            }
            "EndGame" => {
                let summary = json!({ "message": "bye", "totalQuestions": 1, "playerStats": {} });
                link.push_batch(&[
                    ("GameEnded", summary),
                    ("EndGameSuccess", json!({ "message": "ended" })),
                ]);
            }
            "ResetGame" => {
                let reset = json!({ "message": "again", "players": players_json() });
                link.push_batch(&[
                    ("GameReset", reset),
                    ("ResetGameSuccess", json!({ "message": "reset" })),
                ]);
            }
            "SendMessage" => {
                let text = args.get(1).cloned().unwrap_or_default();
                link.push("ReceiveMessage", json!({ "playerName": "Ana", "message": text }));
            }
            _ => {}
        }
    }
}

#[tokio::test]
async fn room_round_trip_updates_projection() {
    init_tracing();
    let (connector, mut links) = LoopbackConnector::new();
    let hub = RoomHub::with_connector(test_config(), connector.clone());
    assert_ok!(hub.connect().await);
    tokio::spawn(play_hub(next_link(&mut links).await));
    let room = hub.room();

    let created = hub
        .create_room(CreateRoomParams::new("Friday", "p-1", "Ana"))
        .await
        .unwrap();
    assert_eq!(created.room_id, "r-1");
    let snap = room.snapshot();
    assert_eq!(snap.room_id.as_deref(), Some("r-1"));
    assert!(snap.is_host);
    assert_eq!(snap.players.len(), 1);

    let joined = hub
        .join_room(JoinRoomParams::new("r-1", "p-2", "Ben"))
        .await
        .unwrap();
    assert_eq!(joined.message(), Some("joined"));
    assert_eq!(room.snapshot().players.len(), 2);

    hub.start_game("r-1", "p-1").await.unwrap();
    let snap = room.snapshot();
    assert_eq!(snap.status, RoomStatus::Playing);
    assert!(snap.is_turn_of("p-1"));
    assert_eq!(snap.current_player_name.as_deref(), Some("Ana"));

    let question = hub
        .get_random_question("r-1", "p-1", truth_or_dare_client::QuestionType::Dare)
        .await
        .unwrap();
    assert_eq!(question.question_text, "Worst haircut?");
    let snap = room.snapshot();
    let drawn = snap.question.as_ref().map(|q| q.text.as_str());
    assert_eq!(drawn, Some("Worst haircut?"));
    assert!(snap.end_of_game_pending);

    hub.next_player("r-1", "p-1").await.unwrap();
    let snap = room.snapshot();
    assert!(snap.is_turn_of("p-2"));
    assert!(snap.question.is_none());

    hub.end_game("r-1", "p-1").await.unwrap();
    let snap = room.snapshot();
    assert_eq!(snap.status, RoomStatus::Ended);
    assert!(snap.current_turn.is_none());
    let total = snap.summary.as_ref().and_then(|s| s.total_questions);
    assert_eq!(total, Some(1));

    hub.reset_game("r-1", "p-1").await.unwrap();
    let snap = room.snapshot();
    assert_eq!(snap.status, RoomStatus::Waiting);
    assert!(snap.summary.is_none());
    assert_eq!(snap.players.len(), 2);

    hub.send_message("r-1", "gg").await.unwrap();
    tokio::time::timeout(PATIENCE, async {
        while !room.journal().iter().any(|e| e.text == "Ana: gg") {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(connector.dials(), 1);
    assert!(room.take_inconsistencies().is_empty());
}

#[tokio::test]
async fn turn_for_unknown_player_is_flagged() {
    let (connector, mut links) = LoopbackConnector::new();
    let hub = RoomHub::with_connector(test_config(), connector.clone());
    assert_ok!(hub.connect().await);
    let link = next_link(&mut links).await;

    link.push_batch(&[
        ("PlayerListUpdated", players_json()),
        ("GameStarted", json!({ "currentPlayerId": "p-1" })),
        (
            "NextPlayerTurn",
            json!({ "nextPlayerId": "ghost", "nextPlayerName": "Ghost" }),
        ),
    ]);

    let mut snapshots = hub.room().subscribe();
    let play = snapshots.wait_for(|s| s.status == RoomStatus::Playing);
    tokio::time::timeout(PATIENCE, play).await.unwrap().unwrap();
    drop(snapshots);
    // Records of one frame are applied together, so the turn event is in.
    let snap = hub.room().snapshot();
    assert!(snap.is_turn_of("p-1"));
    assert_eq!(
        hub.room().take_inconsistencies(),
        vec![Inconsistency::UnknownTurnPlayer {
            player_id: "ghost".into(),
            event: EventKind::NextPlayerTurn,
        }]
    );
}
