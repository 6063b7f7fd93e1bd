//! Lifecycle of one live match connection.
//!
//! A session resolves which seat the local player occupies, keeps the
//! state mirror fed, forwards the opponent's actions and presence, and
//! supervises reconnection. All remote signals are multiplexed onto a
//! single [`SessionEvent`] channel so the embedder consumes one stream.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tandem_schema::paths;
use tandem_schema::{Action, GameState, Match, MatchId, PlayerId, Presence, Seat};
use tandem_store::Store;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::SyncError;
use crate::events::{Notice, NoticeSink, SessionEvent};
use crate::mirror::StateMirror;
use crate::relock;

pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Base reconnect delay; attempt `n` waits `n` times this.
pub const RECONNECT_DELAY_STEP: Duration = Duration::from_millis(2000);

/// Session connection lifecycle. `Connecting` spans
/// [`SyncSession::begin`]; a constructed session starts `Connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Reconnecting = 3,
}

enum Probe {
    Connected,
    Retry,
    /// The match record vanished; reconnecting is pointless.
    Gone,
}

pub struct SyncSession {
    store: Arc<dyn Store>,
    match_id: MatchId,
    player_id: PlayerId,
    opponent_id: PlayerId,
    seat: Seat,
    mirror: Arc<StateMirror>,
    notices: NoticeSink,
    state: AtomicU8,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
}

impl std::fmt::Debug for SyncSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSession")
            .field("match_id", &self.match_id)
            .field("player_id", &self.player_id)
            .field("opponent_id", &self.opponent_id)
            .field("seat", &self.seat)
            .finish_non_exhaustive()
    }
}

impl SyncSession {
    /// Open a session for `player_id` in `match_id`.
    ///
    /// The match is fetched once to resolve the caller's seat by plain id
    /// equality — failing that resolution is fatal for the session, not
    /// retried. Four subscriptions are then attached: game state, the
    /// action log (opponent's new records only), the opponent's presence,
    /// and the transport's connectivity signal.
    pub async fn begin(
        store: Arc<dyn Store>,
        match_id: MatchId,
        player_id: PlayerId,
        notices: NoticeSink,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<SessionEvent>), SyncError> {
        let raw = store
            .get(&paths::match_root(&match_id))
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("matches/{match_id}")))?;
        let record: Match = serde_json::from_value(raw)?;

        let seat = record
            .seat_of(&player_id)
            .ok_or_else(|| SyncError::NotInMatch(match_id.clone()))?;
        let opponent_id = record.player_in(seat.opponent()).clone();

        let mirror = Arc::new(StateMirror::new(store.clone(), &match_id));
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let session = Arc::new(Self {
            store,
            match_id,
            player_id,
            opponent_id,
            seat,
            mirror,
            notices,
            state: AtomicU8::new(SessionState::Connected as u8),
            tasks: std::sync::Mutex::new(Vec::new()),
            events_tx,
        });

        session.register_presence().await?;
        session.spawn_state_task();
        session.spawn_actions_task();
        session.spawn_presence_task();
        session.spawn_connectivity_task();

        tracing::info!(match_id = %session.match_id, seat = ?seat, "session started");
        Ok((session, events_rx))
    }

    // === Accessors ===

    pub fn state(&self) -> SessionState {
        match self.state.load(Ordering::SeqCst) {
            0 => SessionState::Disconnected,
            1 => SessionState::Connecting,
            3 => SessionState::Reconnecting,
            _ => SessionState::Connected,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    pub fn match_id(&self) -> &MatchId {
        &self.match_id
    }

    pub fn player_id(&self) -> &PlayerId {
        &self.player_id
    }

    pub fn opponent_id(&self) -> &PlayerId {
        &self.opponent_id
    }

    pub fn seat(&self) -> Seat {
        self.seat
    }

    pub fn mirror(&self) -> &Arc<StateMirror> {
        &self.mirror
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn emit(&self, event: SessionEvent) {
        if self.events_tx.send(event).is_err() {
            tracing::debug!("session event with no consumer");
        }
    }

    // === Presence ===

    async fn register_presence(&self) -> Result<(), SyncError> {
        let path = paths::presence(&self.player_id);
        self.store
            .set(
                &path,
                serde_json::to_value(Presence::online(Some(self.match_id.clone())))?,
            )
            .await?;
        // Ungraceful disconnects flip us offline without client help.
        self.store
            .on_disconnect_set(&path, serde_json::to_value(Presence::offline())?)
            .await?;
        Ok(())
    }

    // === Subscriptions ===

    fn spawn_state_task(self: &Arc<Self>) {
        let session = Arc::clone(self);
        let mut feed = self.store.watch(&paths::match_state(&self.match_id));
        let handle = tokio::spawn(async move {
            while let Some(value) = feed.rx.recv().await {
                if value.is_null() {
                    continue;
                }
                match serde_json::from_value::<GameState>(value) {
                    Ok(state) => {
                        session.mirror.adopt_remote(state);
                        session.emit(SessionEvent::StateChanged);
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "unreadable game state snapshot")
                    }
                }
            }
        });
        relock(&self.tasks).push(handle);
    }

    fn spawn_actions_task(self: &Arc<Self>) {
        let session = Arc::clone(self);
        let mut feed = self.store.watch_children(&paths::match_actions(&self.match_id));
        let attached_at = feed.attached_at;
        let handle = tokio::spawn(async move {
            while let Some(event) = feed.rx.recv().await {
                let action: Action = match serde_json::from_value(event.value) {
                    Ok(action) => action,
                    Err(err) => {
                        tracing::warn!(key = %event.key, error = %err, "unreadable action record");
                        continue;
                    }
                };
                // Records from before this listener attached are history
                // the session does not replay.
                if action.timestamp.millis().is_some_and(|ts| ts < attached_at) {
                    continue;
                }
                // Own actions were already applied optimistically.
                if action.player_id == session.player_id {
                    continue;
                }
                session.emit(SessionEvent::OpponentAction(action));
            }
        });
        relock(&self.tasks).push(handle);
    }

    fn spawn_presence_task(self: &Arc<Self>) {
        let session = Arc::clone(self);
        let mut feed = self.store.watch(&paths::presence(&self.opponent_id));
        let handle = tokio::spawn(async move {
            let mut last_seen_online: Option<bool> = None;
            while let Some(value) = feed.rx.recv().await {
                if value.is_null() {
                    continue;
                }
                let presence: Presence = match serde_json::from_value(value) {
                    Ok(presence) => presence,
                    Err(err) => {
                        tracing::warn!(error = %err, "unreadable presence record");
                        continue;
                    }
                };
                if last_seen_online == Some(presence.online) {
                    continue;
                }
                session.emit(SessionEvent::Presence {
                    player: session.opponent_id.clone(),
                    online: presence.online,
                });
                // Only a mid-session flip is worth telling the player.
                if last_seen_online.is_some() {
                    session.notices.push(if presence.online {
                        Notice::OpponentOnline
                    } else {
                        Notice::OpponentOffline
                    });
                }
                last_seen_online = Some(presence.online);
            }
        });
        relock(&self.tasks).push(handle);
    }

    fn spawn_connectivity_task(self: &Arc<Self>) {
        let session = Arc::clone(self);
        let mut connectivity = self.store.connectivity();
        let handle = tokio::spawn(async move {
            while connectivity.changed().await.is_ok() {
                let connected = *connectivity.borrow();
                session.emit(SessionEvent::Connectivity(connected));
                if !connected {
                    session.set_state(SessionState::Reconnecting);
                    session.reconnect_with_backoff().await;
                }
            }
        });
        relock(&self.tasks).push(handle);
    }

    // === Reconnection ===

    async fn reconnect_with_backoff(&self) {
        for attempt in 1..=MAX_RECONNECT_ATTEMPTS {
            tokio::time::sleep(RECONNECT_DELAY_STEP * attempt).await;
            match self.probe().await {
                Probe::Connected => {
                    tracing::info!(attempt, "reconnected");
                    self.notices.push(Notice::Reconnected);
                    return;
                }
                Probe::Gone => {
                    self.set_state(SessionState::Disconnected);
                    self.notices.push(Notice::ReturnToLobby);
                    return;
                }
                Probe::Retry => {
                    tracing::warn!(
                        attempt,
                        max_attempts = MAX_RECONNECT_ATTEMPTS,
                        "reconnection attempt failed"
                    );
                }
            }
        }
        self.set_state(SessionState::Disconnected);
        tracing::error!("reconnection attempts exhausted; manual refresh required");
        self.emit(SessionEvent::ReconnectExhausted);
        self.notices.push(Notice::ConnectionLost);
    }

    /// One immediate reconnection attempt, outside the backoff schedule.
    /// Wire this to the platform's generic "network became available"
    /// signal.
    pub async fn network_available(&self) {
        if self.is_connected() {
            return;
        }
        match self.probe().await {
            Probe::Connected => self.notices.push(Notice::Reconnected),
            Probe::Gone => {
                self.set_state(SessionState::Disconnected);
                self.notices.push(Notice::ReturnToLobby);
            }
            Probe::Retry => {}
        }
    }

    async fn probe(&self) -> Probe {
        match self.store.get(&paths::match_root(&self.match_id)).await {
            Ok(Some(_)) => {
                if let Err(err) = self.register_presence().await {
                    tracing::warn!(error = %err, "presence re-registration failed");
                    return Probe::Retry;
                }
                self.set_state(SessionState::Connected);
                Probe::Connected
            }
            Ok(None) => {
                tracing::error!(match_id = %self.match_id, "match vanished while reconnecting");
                Probe::Gone
            }
            Err(err) => {
                tracing::debug!(error = %err, "reconnect probe failed");
                Probe::Retry
            }
        }
    }

    // === Teardown ===

    /// Detach every listener, cancel the last-will, and flip presence to
    /// offline. The session is unusable afterwards.
    pub async fn close(&self) {
        for handle in relock(&self.tasks).drain(..) {
            handle.abort();
        }
        let path = paths::presence(&self.player_id);
        if let Err(err) = self.store.cancel_on_disconnect(&path).await {
            tracing::warn!(error = %err, "could not cancel presence last-will");
        }
        match serde_json::to_value(Presence::offline()) {
            Ok(value) => {
                if let Err(err) = self.store.set(&path, value).await {
                    tracing::warn!(error = %err, "could not flip presence offline");
                }
            }
            Err(err) => tracing::warn!(error = %err, "could not encode offline presence"),
        }
        self.set_state(SessionState::Disconnected);
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        for handle in relock(&self.tasks).drain(..) {
            handle.abort();
        }
    }
}
