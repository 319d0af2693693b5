//! Online session flows against a scripted backend: reconciliation,
//! rejection handling, connectivity transitions, and terminal
//! reporting. Virtual time keeps the polling cadence instant.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use boxrush_client::{
    MatchResult, RejectReason, SessionController, SessionHandle, SessionNotice, SessionUpdate,
    StatePayload, StateTransition, SyncError, TerminalReason, TurnOwner,
};
use common::{online_bootstrap, state, ScriptedSyncClient};

async fn next_update(handle: &mut SessionHandle, secs: u64) -> Option<SessionUpdate> {
    tokio::time::timeout(Duration::from_secs(secs), handle.recv())
        .await
        .ok()
        .flatten()
}

#[tokio::test(start_paused = true)]
async fn repeated_polls_of_the_same_state_produce_one_transition() {
    let client = Arc::new(ScriptedSyncClient::new());
    client.script_fetch(Ok(state(&[2, 4], 3, 1)));

    let mut handle =
        SessionController::start_online(online_bootstrap(Some(0)), client.clone()).unwrap();

    let first = next_update(&mut handle, 30).await.expect("initial sync");
    match first {
        SessionUpdate::Transition(StateTransition::Moved { moves, turn, .. }) => {
            assert_eq!(moves.len(), 2);
            assert_eq!(turn, TurnOwner::Seat(1));
        }
        other => panic!("expected the synced board, got {other:?}"),
    }

    // The fallback poll keeps re-fetching the same payload; none of
    // those repeats may surface.
    assert!(next_update(&mut handle, 10).await.is_none());
    assert!(
        client.fetch_calls.load(Ordering::SeqCst) > 2,
        "polling kept running while updates stayed quiet"
    );
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn rejected_roll_surfaces_notice_and_resyncs() {
    let client = Arc::new(ScriptedSyncClient::new());
    client.script_fetch(Ok(state(&[0, 0], 0, 0)));
    client.script_roll(Err(SyncError::Rejected(RejectReason::NotYourTurn)));

    let mut handle =
        SessionController::start_online(online_bootstrap(Some(0)), client.clone()).unwrap();

    let first = next_update(&mut handle, 30).await.expect("initial sync");
    assert!(matches!(
        first,
        SessionUpdate::Transition(StateTransition::TurnSynced {
            turn: TurnOwner::Seat(0)
        })
    ));

    handle.roll().await;
    let notice = next_update(&mut handle, 30).await.expect("rejection notice");
    assert_eq!(notice, SessionUpdate::Notice(SessionNotice::NotYourTurn));
    assert_eq!(client.roll_calls.load(Ordering::SeqCst), 1);

    // The forced resync repeats the known state, so nothing else shows.
    assert!(next_update(&mut handle, 5).await.is_none());
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn winner_payload_reports_won_then_ends_exactly_once() {
    let client = Arc::new(ScriptedSyncClient::new());
    client.script_fetch(Ok(StatePayload {
        positions: Some(vec![7, 3]),
        winner: Some(0),
        last_roll: Some(2),
        ..StatePayload::default()
    }));

    let mut handle =
        SessionController::start_online(online_bootstrap(Some(0)), client.clone()).unwrap();

    let mut endings = Vec::new();
    let mut saw_won = false;
    while let Some(update) = next_update(&mut handle, 30).await {
        match update {
            SessionUpdate::Transition(StateTransition::Won { seat, .. }) => {
                assert_eq!(seat, 0);
                saw_won = true;
            }
            SessionUpdate::Ended(result) => endings.push(result),
            other => panic!("unexpected update {other:?}"),
        }
    }
    assert!(saw_won);
    assert_eq!(endings, vec![MatchResult::Win { seat: 0 }]);
}

#[tokio::test(start_paused = true)]
async fn unknown_match_aborts_the_session() {
    let client = Arc::new(ScriptedSyncClient::new());
    client.script_fetch(Err(SyncError::Terminal(TerminalReason::MatchNotFound)));

    let mut handle =
        SessionController::start_online(online_bootstrap(Some(0)), client.clone()).unwrap();

    let mut ended = None;
    while let Some(update) = next_update(&mut handle, 60).await {
        if let SessionUpdate::Ended(result) = update {
            ended = Some(result);
        }
    }
    assert_eq!(ended, Some(MatchResult::Aborted));
}

#[tokio::test(start_paused = true)]
async fn forfeit_reports_the_survivor_as_winner() {
    let client = Arc::new(ScriptedSyncClient::new());
    client.script_fetch(Ok(state(&[1, 1], 2, 1)));
    client.script_forfeit(Ok(StatePayload {
        winner: Some(1),
        ..StatePayload::default()
    }));

    let mut handle =
        SessionController::start_online(online_bootstrap(Some(0)), client.clone()).unwrap();

    // Initial board.
    assert!(next_update(&mut handle, 30).await.is_some());

    handle.forfeit().await;
    let mut ended = None;
    while let Some(update) = next_update(&mut handle, 30).await {
        if let SessionUpdate::Ended(result) = update {
            ended = Some(result);
        }
    }
    assert_eq!(ended, Some(MatchResult::Loss { winner: Some(1) }));
}

#[tokio::test(start_paused = true)]
async fn heartbeat_strikes_report_reconnecting_then_connected() {
    let client = Arc::new(ScriptedSyncClient::new());
    client.script_fetch(Ok(state(&[0, 0], 0, 1)));
    client.set_alive(false);

    let mut handle =
        SessionController::start_online(online_bootstrap(Some(0)), client.clone()).unwrap();

    // Initial board, then three missed beats.
    assert!(next_update(&mut handle, 30).await.is_some());
    let notice = loop {
        match next_update(&mut handle, 60).await.expect("reconnect notice") {
            SessionUpdate::Notice(n) => break n,
            SessionUpdate::Transition(_) => continue,
            other => panic!("unexpected update {other:?}"),
        }
    };
    assert_eq!(notice, SessionNotice::Reconnecting);

    client.set_alive(true);
    let notice = loop {
        match next_update(&mut handle, 60).await.expect("recovery notice") {
            SessionUpdate::Notice(n) => break n,
            SessionUpdate::Transition(_) => continue,
            other => panic!("unexpected update {other:?}"),
        }
    };
    assert_eq!(notice, SessionNotice::Connected);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn idle_window_verifies_turn_then_auto_rolls() {
    let client = Arc::new(ScriptedSyncClient::new());
    client.script_fetch(Ok(state(&[1, 0], 2, 0)));
    client.script_roll(Ok(state(&[2, 0], 1, 1)));

    let mut bootstrap = online_bootstrap(Some(0));
    bootstrap.tuning.idle_timeout = Duration::from_millis(200);
    let mut handle = SessionController::start_online(bootstrap, client.clone()).unwrap();

    // Initial board; it is our turn, so the idle timer arms.
    assert!(next_update(&mut handle, 30).await.is_some());

    // Nobody touches the session. The idle window elapses, the turn
    // is re-verified against the backend, and the roll goes out.
    let update = next_update(&mut handle, 30).await.expect("auto-roll result");
    match update {
        SessionUpdate::Transition(StateTransition::Moved { moves, turn, .. }) => {
            assert_eq!(moves.len(), 1);
            assert_eq!(turn, TurnOwner::Seat(1));
        }
        other => panic!("expected the auto-rolled move, got {other:?}"),
    }
    assert_eq!(client.roll_calls.load(Ordering::SeqCst), 1);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn transient_roll_failure_rearms_the_idle_window() {
    let client = Arc::new(ScriptedSyncClient::new());
    client.script_fetch(Ok(state(&[1, 0], 2, 0)));
    client.script_roll(Err(SyncError::transient("connection reset")));
    client.script_roll(Ok(state(&[2, 0], 3, 1)));

    let mut bootstrap = online_bootstrap(Some(0));
    bootstrap.tuning.idle_timeout = Duration::from_millis(200);
    let mut handle = SessionController::start_online(bootstrap, client.clone()).unwrap();

    // Initial board; our turn, idle timer armed.
    assert!(next_update(&mut handle, 30).await.is_some());

    // First idle window: the auto-roll submission dies on the wire and
    // the follow-up resync dedups against the unchanged board. The
    // next window must still fire and retry.
    let update = next_update(&mut handle, 60).await.expect("retried auto-roll");
    match update {
        SessionUpdate::Transition(StateTransition::Moved { turn, .. }) => {
            assert_eq!(turn, TurnOwner::Seat(1));
        }
        other => panic!("expected the retried move, got {other:?}"),
    }
    assert_eq!(
        client.roll_calls.load(Ordering::SeqCst),
        2,
        "one failed submission plus one retry"
    );
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn backend_confirmed_seat_overrides_the_hint() {
    let client = Arc::new(ScriptedSyncClient::new());
    client.script_fetch(Ok(StatePayload {
        positions: Some(vec![0, 0]),
        turn: Some(1),
        player_index: Some(1),
        ..StatePayload::default()
    }));
    client.script_roll(Ok(StatePayload {
        positions: Some(vec![0, 0]),
        spawn: true,
        actor: Some(1),
        roll: Some(1),
        turn: Some(0),
        ..StatePayload::default()
    }));

    // The matchmaking hint says seat 0; the backend says seat 1.
    let mut handle =
        SessionController::start_online(online_bootstrap(Some(0)), client.clone()).unwrap();

    let first = next_update(&mut handle, 30).await.expect("initial sync");
    assert!(matches!(
        first,
        SessionUpdate::Transition(StateTransition::TurnSynced {
            turn: TurnOwner::Seat(1)
        })
    ));

    // Seat 1 is us now, so the roll goes through instead of bouncing
    // off a not-your-turn check.
    handle.roll().await;
    let update = next_update(&mut handle, 30).await.expect("spawn transition");
    match update {
        SessionUpdate::Transition(StateTransition::Spawned { seat, roll, turn }) => {
            assert_eq!(seat, 1);
            assert_eq!(roll, Some(1));
            assert_eq!(turn, TurnOwner::Seat(0));
        }
        other => panic!("expected spawn, got {other:?}"),
    }
    assert_eq!(client.roll_calls.load(Ordering::SeqCst), 1);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn seat_is_derived_from_the_player_roster_when_unconfirmed() {
    let client = Arc::new(ScriptedSyncClient::new());
    client.script_fetch(Ok(StatePayload {
        positions: Some(vec![0, 0]),
        turn: Some(1),
        player_ids: Some(vec![
            serde_json::Value::from(9),
            serde_json::Value::from("42"),
        ]),
        ..StatePayload::default()
    }));
    client.script_roll(Ok(state(&[0, 1], 1, 0)));

    let mut bootstrap = online_bootstrap(None);
    bootstrap.local_player_id = Some("42".into());
    let mut handle = SessionController::start_online(bootstrap, client.clone()).unwrap();

    assert!(next_update(&mut handle, 30).await.is_some());

    handle.roll().await;
    let mut submitted = false;
    while let Some(update) = next_update(&mut handle, 10).await {
        match update {
            SessionUpdate::Notice(SessionNotice::NotYourTurn) => {
                panic!("roster-derived seat should have made this our turn")
            }
            SessionUpdate::Transition(_) => {
                submitted = true;
                break;
            }
            other => panic!("unexpected update {other:?}"),
        }
    }
    assert!(submitted);
    assert_eq!(client.roll_calls.load(Ordering::SeqCst), 1);
    handle.shutdown().await;
}
