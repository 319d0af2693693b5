//! Session controller: the single task that owns a match.
//!
//! All mutation of [`MatchState`] happens here, serialized through one
//! inbound queue. Background workers (push listener, heartbeat, HTTP
//! calls, timers) never touch state; they send messages. The embedding
//! application drives the session through [`SessionHandle`] and
//! consumes [`SessionUpdate`]s.

pub(crate) mod bot;
pub mod events;
pub(crate) mod reconcile;
pub(crate) mod scheduler;

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SessionBootstrap;
use crate::domain::rules::{apply_roll, next_active_seat, RollEvent};
use crate::domain::state::{MatchState, Mode, RollPhase, Seat, TurnOwner};
use crate::domain::transition::{result_for, CoinMove, MatchResult, StateTransition};
use crate::error::{RejectReason, SyncError};
use crate::protocol::StatePayload;
use crate::session::bot::DiceBot;
use crate::session::events::{Inbound, RollOrigin, SessionCommand, SessionNotice, SessionUpdate};
use crate::session::reconcile::{IgnoreReason, Reconciled};
use crate::session::scheduler::TurnScheduler;
use crate::sync::client::SyncClient;
use crate::sync::heartbeat::spawn_heartbeat;
use crate::sync::push::{spawn_push_listener, PushConfig};

const INBOUND_CAPACITY: usize = 64;
const UPDATE_CAPACITY: usize = 64;

/// Entry point for standing up sessions.
pub struct SessionController;

impl SessionController {
    /// Local match against bots; the human is seat 0 and the starting
    /// seat is drawn at random.
    pub fn start_offline(bootstrap: SessionBootstrap) -> SessionHandle {
        let dice = DiceBot::new(bootstrap.rng_seed);
        let all_seats: Vec<Seat> = (0..bootstrap.num_players as Seat).collect();
        let start_seat = dice.pick_start_seat(&all_seats);
        let state = MatchState::new_offline(bootstrap.num_players, start_seat);
        Session::spawn(state, None, None, None, dice, bootstrap)
    }

    /// Mirror of a backend match. Requires a match id; identity is
    /// confirmed from the first trusted payload.
    pub fn start_online(
        bootstrap: SessionBootstrap,
        client: Arc<dyn SyncClient>,
    ) -> Result<SessionHandle, SyncError> {
        let match_id = bootstrap
            .match_id
            .clone()
            .ok_or_else(|| SyncError::protocol("online session requires a match id"))?;
        let dice = DiceBot::new(bootstrap.rng_seed);
        let state = MatchState::new_online(bootstrap.num_players, bootstrap.local_seat);
        let player_id = bootstrap.local_player_id.clone();
        Ok(Session::spawn(
            state,
            Some(client),
            Some(match_id),
            player_id,
            dice,
            bootstrap,
        ))
    }
}

/// The embedding application's side of a running session.
pub struct SessionHandle {
    tx: mpsc::Sender<Inbound>,
    updates: mpsc::Receiver<SessionUpdate>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Next update, or `None` once the session task has exited.
    pub async fn recv(&mut self) -> Option<SessionUpdate> {
        self.updates.recv().await
    }

    pub async fn roll(&self) {
        self.command(SessionCommand::Roll(RollOrigin::Manual)).await;
    }

    pub async fn forfeit(&self) {
        self.command(SessionCommand::Forfeit).await;
    }

    pub async fn abandon(&self) {
        self.command(SessionCommand::Abandon).await;
    }

    pub async fn command(&self, cmd: SessionCommand) {
        let _ = self.tx.send(Inbound::Command(cmd)).await;
    }

    /// Tear the session down without waiting for a result.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

struct Session {
    state: MatchState,
    client: Option<Arc<dyn SyncClient>>,
    match_id: Option<String>,
    local_player_id: Option<String>,
    bootstrap: SessionBootstrap,
    dice: DiceBot,
    scheduler: TurnScheduler,
    tx: mpsc::Sender<Inbound>,
    updates: mpsc::Sender<SessionUpdate>,
    cancel: CancellationToken,
    /// Debounce anchor for manual roll taps.
    last_manual_roll: Option<Instant>,
    /// Origin of the roll currently awaiting a backend response.
    pending_roll: Option<RollOrigin>,
    reconnecting: bool,
    ended: bool,
}

impl Session {
    fn spawn(
        state: MatchState,
        client: Option<Arc<dyn SyncClient>>,
        match_id: Option<String>,
        local_player_id: Option<String>,
        dice: DiceBot,
        bootstrap: SessionBootstrap,
    ) -> SessionHandle {
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        let (update_tx, update_rx) = mpsc::channel(UPDATE_CAPACITY);
        let cancel = CancellationToken::new();

        let session = Session {
            state,
            client,
            match_id,
            local_player_id,
            bootstrap,
            dice,
            scheduler: TurnScheduler::new(tx.clone()),
            tx: tx.clone(),
            updates: update_tx,
            cancel: cancel.clone(),
            last_manual_roll: None,
            pending_roll: None,
            reconnecting: false,
            ended: false,
        };

        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            session.run(rx, task_cancel).await;
        });

        SessionHandle {
            tx,
            updates: update_rx,
            cancel,
            task,
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Inbound>, cancel: CancellationToken) {
        self.start_background_workers();

        if self.state.mode == Mode::Offline {
            let turn = self.state.turn;
            info!(?turn, players = self.state.num_players, "offline match started");
            self.emit(SessionUpdate::Transition(StateTransition::TurnSynced {
                turn,
            }))
            .await;
            self.arm_turn_timer();
        }

        loop {
            let msg = tokio::select! {
                _ = cancel.cancelled() => break,
                msg = rx.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
            };
            self.handle(msg).await;
            if self.ended {
                break;
            }
        }

        self.scheduler.cancel();
        self.cancel.cancel();
    }

    /// Online sessions run a push listener, a heartbeat, and an
    /// initial trusted fetch; offline sessions run nothing.
    fn start_background_workers(&self) {
        let (Some(client), Some(match_id)) = (&self.client, &self.match_id) else {
            return;
        };
        let tuning = &self.bootstrap.tuning;
        spawn_push_listener(
            Arc::clone(client),
            PushConfig {
                backend_url: self.bootstrap.backend_url.clone(),
                match_id: match_id.clone(),
                token: self.bootstrap.token.clone(),
                poll_interval: tuning.poll_interval,
            },
            self.tx.clone(),
            self.cancel.clone(),
        );
        spawn_heartbeat(
            Arc::clone(client),
            match_id.clone(),
            tuning.heartbeat_interval,
            tuning.heartbeat_strikes,
            self.tx.clone(),
            self.cancel.clone(),
        );
        self.spawn_resync();
    }

    async fn handle(&mut self, msg: Inbound) {
        match msg {
            Inbound::Command(cmd) => self.handle_command(cmd).await,
            Inbound::ServerState { payload, trusted } => {
                self.apply_payload(&payload, trusted).await;
            }
            Inbound::RollResolved(result) => self.handle_roll_resolved(result).await,
            Inbound::ForfeitResolved(result) => self.handle_forfeit_resolved(result).await,
            Inbound::IdleFired { epoch } => self.handle_idle(epoch).await,
            Inbound::BotRoll { seat, epoch } => self.handle_bot_roll(seat, epoch).await,
            Inbound::AdvanceTurn { epoch } => self.handle_advance(epoch),
            Inbound::TurnVerified { epoch, result } => self.handle_turn_verified(epoch, result).await,
            Inbound::ConnectivityLost => {
                self.reconnecting = true;
                self.emit(SessionUpdate::Notice(SessionNotice::Reconnecting))
                    .await;
                self.spawn_resync();
            }
            Inbound::ConnectivityRestored => {
                if self.reconnecting {
                    self.reconnecting = false;
                    self.emit(SessionUpdate::Notice(SessionNotice::Connected))
                        .await;
                }
                self.spawn_resync();
            }
            Inbound::SyncFailed(err) => {
                if err.is_terminal() {
                    warn!(error = %err, "background sync hit a terminal error");
                    self.end(MatchResult::Aborted).await;
                } else {
                    debug!(error = %err, "background sync error");
                }
            }
        }
    }

    async fn handle_command(&mut self, cmd: SessionCommand) {
        if self.state.is_terminal() {
            return;
        }
        match cmd {
            SessionCommand::Roll(origin) => self.handle_roll_request(origin).await,
            SessionCommand::Forfeit => self.handle_forfeit_request().await,
            SessionCommand::Abandon => self.handle_abandon().await,
        }
    }

    async fn handle_roll_request(&mut self, origin: RollOrigin) {
        if origin.is_manual() && !self.debounce_manual() {
            return;
        }
        if self.state.roll_phase != RollPhase::Idle {
            debug!(phase = ?self.state.roll_phase, "roll request while locked");
            return;
        }
        match self.state.mode {
            Mode::Offline => {
                let Some(me) = self.state.local_seat else {
                    return;
                };
                if !self.state.turn.is_seat(me) {
                    if origin.is_manual() {
                        self.emit(SessionUpdate::Notice(SessionNotice::NotYourTurn))
                            .await;
                    }
                    return;
                }
                self.offline_roll(me).await;
            }
            Mode::Online => self.online_roll(origin).await,
        }
    }

    /// Manual taps inside the debounce window are dropped outright.
    fn debounce_manual(&mut self) -> bool {
        let now = Instant::now();
        if let Some(last) = self.last_manual_roll {
            if now.duration_since(last) < self.bootstrap.tuning.roll_debounce {
                debug!("manual roll debounced");
                return false;
            }
        }
        self.last_manual_roll = Some(now);
        true
    }

    async fn online_roll(&mut self, origin: RollOrigin) {
        if !self.state.is_local_turn() {
            if origin.is_manual() {
                self.emit(SessionUpdate::Notice(SessionNotice::NotYourTurn))
                    .await;
                self.spawn_resync();
            }
            return;
        }
        let (Some(client), Some(match_id)) = (&self.client, &self.match_id) else {
            return;
        };
        self.state.roll_phase = RollPhase::AwaitingResponse;
        self.pending_roll = Some(origin);
        self.scheduler.cancel();
        let client = Arc::clone(client);
        let match_id = match_id.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = client.submit_roll(&match_id).await;
            let _ = tx.send(Inbound::RollResolved(result)).await;
        });
    }

    /// Evaluate one offline roll through the board rules, emit exactly
    /// one transition, and hold the board in its settling window.
    async fn offline_roll(&mut self, seat: Seat) {
        let roll = self.dice.roll_die();
        let outcome = apply_roll(&self.state.positions, &self.state.spawned, seat, roll);
        self.state.positions = outcome.new_positions;
        self.state.spawned = outcome.new_spawned;

        if matches!(outcome.event, RollEvent::Win) {
            let moves = vec![CoinMove {
                seat,
                from: self.state.positions[seat as usize].saturating_sub(roll),
                to: self.state.positions[seat as usize],
            }];
            self.state.winner = Some(seat);
            self.state.finished = true;
            self.emit(SessionUpdate::Transition(StateTransition::Won {
                seat,
                moves,
            }))
            .await;
            self.end(result_for(self.state.local_seat, Some(seat))).await;
            return;
        }

        let next = next_active_seat(seat, self.state.num_players, &self.state.forfeited)
            .map(TurnOwner::Seat)
            .unwrap_or(TurnOwner::Unresolved);
        self.state.turn = next;

        let (transition, lock) = match outcome.event {
            RollEvent::Spawn => (
                StateTransition::Spawned {
                    seat,
                    roll: Some(roll),
                    turn: next,
                },
                self.bootstrap.tuning.move_lock,
            ),
            RollEvent::SkippedSpawn => (
                StateTransition::SpawnSkipped {
                    seat,
                    roll,
                    turn: next,
                },
                self.bootstrap.tuning.move_lock,
            ),
            RollEvent::Danger { .. } => (
                StateTransition::DangerReset {
                    seat,
                    roll,
                    turn: next,
                },
                self.bootstrap.tuning.danger_lock,
            ),
            RollEvent::Overshoot { .. } => (
                StateTransition::Overshot {
                    seat,
                    roll,
                    turn: next,
                },
                self.bootstrap.tuning.move_lock,
            ),
            RollEvent::Move { from, to, captured } => {
                let mut moves = vec![CoinMove { seat, from, to }];
                for &victim in &captured {
                    moves.push(CoinMove {
                        seat: victim,
                        from: to,
                        to: 0,
                    });
                }
                (
                    StateTransition::Moved {
                        actor: Some(seat),
                        roll: Some(roll),
                        moves,
                        captured,
                        turn: next,
                    },
                    self.bootstrap.tuning.move_lock,
                )
            }
            RollEvent::Win => unreachable!("handled above"),
        };

        self.state.roll_phase = RollPhase::LockedForAnimation;
        self.emit(SessionUpdate::Transition(transition)).await;
        self.scheduler.schedule_advance(lock);
    }

    /// Offline settling window elapsed: unlock and arm the next seat.
    fn handle_advance(&mut self, epoch: u64) {
        if !self.scheduler.is_current(epoch) || self.state.is_terminal() {
            return;
        }
        self.state.roll_phase = RollPhase::Idle;
        self.arm_turn_timer();
    }

    /// Arm the idle timer for the local seat or the pacing timer for a
    /// bot seat, per the current turn owner. Online sessions only ever
    /// arm the idle side.
    fn arm_turn_timer(&mut self) {
        if self.state.is_terminal() {
            self.scheduler.cancel();
            return;
        }
        match (self.state.turn, self.state.local_seat) {
            (TurnOwner::Seat(turn), Some(me)) if turn == me => {
                self.scheduler.schedule_idle(self.bootstrap.tuning.idle_timeout);
            }
            (TurnOwner::Seat(turn), _) if self.state.mode == Mode::Offline => {
                let delay = self.dice.pacing_delay(
                    self.bootstrap.tuning.bot_delay_min,
                    self.bootstrap.tuning.bot_delay_max,
                );
                self.scheduler.schedule_bot(turn, delay);
            }
            _ => self.scheduler.cancel(),
        }
    }

    async fn handle_bot_roll(&mut self, seat: Seat, epoch: u64) {
        if !self.scheduler.is_current(epoch)
            || self.state.is_terminal()
            || self.state.mode != Mode::Offline
        {
            return;
        }
        if !self.state.turn.is_seat(seat) || self.state.roll_phase != RollPhase::Idle {
            return;
        }
        self.offline_roll(seat).await;
    }

    async fn handle_idle(&mut self, epoch: u64) {
        if !self.scheduler.is_current(epoch)
            || self.state.is_terminal()
            || self.state.roll_phase != RollPhase::Idle
            || !self.state.is_local_turn()
        {
            return;
        }
        match self.state.mode {
            Mode::Offline => {
                if let Some(me) = self.state.local_seat {
                    debug!(seat = me, "idle window elapsed, auto-rolling");
                    self.offline_roll(me).await;
                }
            }
            Mode::Online => {
                // Verify turn ownership before acting on a stale view.
                let (Some(client), Some(match_id)) = (&self.client, &self.match_id) else {
                    return;
                };
                let client = Arc::clone(client);
                let match_id = match_id.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = client.fetch_state(&match_id).await;
                    let _ = tx.send(Inbound::TurnVerified { epoch, result }).await;
                });
            }
        }
    }

    async fn handle_turn_verified(
        &mut self,
        epoch: u64,
        result: Result<StatePayload, SyncError>,
    ) {
        if !self.scheduler.is_current(epoch) || self.state.is_terminal() {
            return;
        }
        match result {
            Ok(payload) => {
                self.apply_payload(&payload, true).await;
                if self.ended {
                    return;
                }
                if self.state.is_local_turn() && self.state.roll_phase == RollPhase::Idle {
                    debug!("idle auto-roll confirmed, submitting");
                    self.online_roll(RollOrigin::Timer).await;
                }
            }
            Err(err) if err.is_terminal() => self.end(MatchResult::Aborted).await,
            Err(err) => {
                // Could not verify; re-arm and try again next window.
                debug!(error = %err, "idle verification failed");
                self.arm_turn_timer();
            }
        }
    }

    async fn handle_roll_resolved(&mut self, result: Result<StatePayload, SyncError>) {
        let origin = self.pending_roll.take().unwrap_or(RollOrigin::Manual);
        if self.state.roll_phase == RollPhase::AwaitingResponse {
            self.state.roll_phase = RollPhase::Idle;
        }
        if self.state.is_terminal() {
            return;
        }
        match result {
            Ok(payload) => {
                // A push may have delivered this payload already; the
                // signature dedup makes reapplication inert.
                self.apply_payload(&payload, true).await;
            }
            Err(SyncError::Rejected(RejectReason::NotYourTurn)) => {
                if origin.is_manual() {
                    self.emit(SessionUpdate::Notice(SessionNotice::NotYourTurn))
                        .await;
                }
                self.spawn_resync();
                self.arm_turn_timer();
            }
            Err(SyncError::Rejected(RejectReason::MatchNotActive)) => {
                debug!("roll rejected: match not active; resyncing");
                self.spawn_resync();
                self.arm_turn_timer();
            }
            Err(err) if err.is_terminal() => {
                warn!(error = %err, "roll hit a terminal error");
                self.end(MatchResult::Aborted).await;
            }
            Err(err) => {
                // Ambiguous outcome: the roll may or may not have been
                // applied. Never assume; fetch the truth. The resync
                // usually dedups against the unchanged board, so the
                // idle window must be re-armed here, not there.
                debug!(error = %err, "roll submission unresolved; resyncing");
                self.spawn_resync();
                self.arm_turn_timer();
            }
        }
    }

    async fn handle_forfeit_request(&mut self) {
        match self.state.mode {
            Mode::Offline => {
                let Some(me) = self.state.local_seat else {
                    return;
                };
                self.state.mark_forfeited(me);
                let active = self.state.active_seats();
                let winner = if active.len() == 1 {
                    active.first().copied()
                } else {
                    None
                };
                self.end(MatchResult::Loss { winner }).await;
            }
            Mode::Online => {
                let (Some(client), Some(match_id)) = (&self.client, &self.match_id) else {
                    return;
                };
                self.scheduler.cancel();
                let client = Arc::clone(client);
                let match_id = match_id.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = client.forfeit(&match_id).await;
                    let _ = tx.send(Inbound::ForfeitResolved(result)).await;
                });
            }
        }
    }

    async fn handle_forfeit_resolved(&mut self, result: Result<StatePayload, SyncError>) {
        let winner = match result {
            Ok(payload) => payload
                .winner
                .filter(|w| (*w as usize) < self.state.num_players),
            Err(err) => {
                // The intent to leave is local-authoritative; a failed
                // notification still ends the session.
                warn!(error = %err, "forfeit notification failed");
                None
            }
        };
        self.end(MatchResult::Loss { winner }).await;
    }

    async fn handle_abandon(&mut self) {
        if let (Some(client), Some(match_id)) = (&self.client, &self.match_id) {
            let client = Arc::clone(client);
            let match_id = match_id.clone();
            // Fire and forget; the session does not wait.
            tokio::spawn(async move {
                let _ = client.abandon(&match_id).await;
            });
        }
        self.end(MatchResult::Aborted).await;
    }

    /// Reconcile one authoritative payload into the mirror.
    async fn apply_payload(&mut self, payload: &StatePayload, trusted: bool) {
        if self.state.is_terminal() {
            return;
        }
        self.adopt_identity(payload, trusted);
        match reconcile::apply(&mut self.state, payload) {
            Reconciled::Ignored(reason) => {
                if reason == IgnoreReason::Duplicate {
                    debug!("duplicate payload ignored");
                }
            }
            Reconciled::Terminal {
                result,
                winner,
                moves,
            } => {
                if let Some(seat) = winner {
                    self.emit(SessionUpdate::Transition(StateTransition::Won {
                        seat,
                        moves,
                    }))
                    .await;
                }
                self.end(result).await;
            }
            Reconciled::Update(transition) => {
                // Whatever was in flight, the authoritative state wins.
                self.state.roll_phase = RollPhase::Idle;
                if let StateTransition::Forfeited { seat, .. } = &transition {
                    self.emit(SessionUpdate::Notice(SessionNotice::SeatForfeited {
                        seat: *seat,
                    }))
                    .await;
                }
                self.emit(SessionUpdate::Transition(transition)).await;
                self.arm_turn_timer();
            }
        }
    }

    /// The server-confirmed seat always wins over the matchmaking
    /// hint; the player-id roster is a weaker fallback.
    fn adopt_identity(&mut self, payload: &StatePayload, trusted: bool) {
        if trusted {
            if let Some(idx) = payload.player_index {
                if (idx as usize) < self.state.num_players {
                    if self.state.local_seat != Some(idx) {
                        info!(seat = idx, "seat confirmed by backend");
                    }
                    self.state.local_seat = Some(idx);
                    return;
                }
            }
        }
        if self.state.local_seat.is_none() {
            if let Some(id) = &self.local_player_id {
                if let Some(idx) = payload.seat_of_player(id) {
                    if (idx as usize) < self.state.num_players {
                        info!(seat = idx, "seat derived from player roster");
                        self.state.local_seat = Some(idx);
                    }
                }
            }
        }
    }

    /// On-demand resync; the response arrives as a trusted payload.
    fn spawn_resync(&self) {
        let (Some(client), Some(match_id)) = (&self.client, &self.match_id) else {
            return;
        };
        let client = Arc::clone(client);
        let match_id = match_id.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            match client.fetch_state(&match_id).await {
                Ok(payload) => {
                    let _ = tx
                        .send(Inbound::ServerState {
                            payload,
                            trusted: true,
                        })
                        .await;
                }
                Err(err) if err.is_terminal() => {
                    let _ = tx.send(Inbound::SyncFailed(err)).await;
                }
                Err(err) => debug!(error = %err, "resync failed"),
            }
        });
    }

    /// Report the terminal result exactly once and stop everything.
    async fn end(&mut self, result: MatchResult) {
        if self.ended {
            return;
        }
        self.ended = true;
        self.state.finished = true;
        self.scheduler.cancel();
        info!(?result, "session ended");
        let _ = self.updates.send(SessionUpdate::Ended(result)).await;
    }

    async fn emit(&mut self, update: SessionUpdate) {
        if self.updates.send(update).await.is_err() {
            // Nobody is listening; wind the session down.
            self.ended = true;
        }
    }
}
