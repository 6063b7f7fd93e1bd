//! Optimistic execution with rollback.
//!
//! Every turn action is applied locally the moment the player takes it,
//! with a snapshot of the mutable game fields captured first. The cloud
//! validation collaborator later confirms or rejects the broadcast
//! record; a rejection (or a transport failure during the broadcast
//! itself) restores the snapshot exactly. Each action moves through a
//! small lifecycle: applied-locally, then confirmed, rolled back, or —
//! after sitting unconfirmed past the pruning window — assumed
//! confirmed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::{Map, Value};
use tandem_schema::{ActionId, ActionKind, GameState};
use tokio::time::Instant;

use crate::error::SyncError;
use crate::events::{Notice, NoticeSink};
use crate::pipeline::ActionPipeline;
use crate::relock;

/// How long an unconfirmed action's snapshot is kept. This bounds
/// memory, it is not a correctness mechanism: confirmations are expected
/// well inside the window.
pub const PENDING_TTL: Duration = Duration::from_millis(5000);

/// The locally mutable game fields: both players' full state, scores,
/// turn ownership (inside [`GameState`]), and the per-turn flags.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LocalState {
    pub game: GameState,
    pub has_attached_energy_this_turn: bool,
    pub has_played_supporter_this_turn: bool,
}

/// An immutable capture of [`LocalState`] taken before an optimistic
/// action. Restoring it reproduces the pre-action state exactly;
/// equality is structural, so tests can compare captures directly.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    game: GameState,
    has_attached_energy_this_turn: bool,
    has_played_supporter_this_turn: bool,
}

impl StateSnapshot {
    pub fn capture(state: &LocalState) -> Self {
        Self {
            game: state.game.clone(),
            has_attached_energy_this_turn: state.has_attached_energy_this_turn,
            has_played_supporter_this_turn: state.has_played_supporter_this_turn,
        }
    }

    pub fn restore(&self, state: &mut LocalState) {
        state.game = self.game.clone();
        state.has_attached_energy_this_turn = self.has_attached_energy_this_turn;
        state.has_played_supporter_this_turn = self.has_played_supporter_this_turn;
    }
}

/// Terminal state of one optimistically-applied action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Confirmed by the validation collaborator.
    Confirmed,
    /// Rejected; the pre-action snapshot was restored.
    RolledBack { reason: String },
}

struct PendingAction {
    snapshot: StateSnapshot,
    kind: ActionKind,
    applied_at: Instant,
}

pub struct Validator {
    pipeline: Option<Arc<ActionPipeline>>,
    local: Arc<Mutex<LocalState>>,
    pending: Mutex<HashMap<ActionId, PendingAction>>,
    notices: NoticeSink,
}

impl Validator {
    /// Single-player mode: effects run directly, nothing is broadcast,
    /// nothing can be rejected.
    pub fn offline(local: Arc<Mutex<LocalState>>, notices: NoticeSink) -> Self {
        Self {
            pipeline: None,
            local,
            pending: Mutex::new(HashMap::new()),
            notices,
        }
    }

    pub fn online(
        pipeline: Arc<ActionPipeline>,
        local: Arc<Mutex<LocalState>>,
        notices: NoticeSink,
    ) -> Self {
        Self {
            pipeline: Some(pipeline),
            local,
            pending: Mutex::new(HashMap::new()),
            notices,
        }
    }

    pub fn local(&self) -> Arc<Mutex<LocalState>> {
        Arc::clone(&self.local)
    }

    /// Apply `local_effect` optimistically and broadcast the action.
    ///
    /// Online, the sequence is: snapshot under a fresh action id, run the
    /// effect (an effect error is recorded and tagged on the payload, it
    /// does not abort the broadcast), then broadcast. A transport-level
    /// broadcast failure restores the snapshot immediately and surfaces
    /// "action not saved"; a semantic rejection arrives later through
    /// [`handle_rejection`](Self::handle_rejection).
    pub async fn execute_with_validation<F>(
        &self,
        kind: ActionKind,
        payload: Value,
        local_effect: F,
    ) -> Result<(), SyncError>
    where
        F: FnOnce(&mut LocalState) -> Result<(), SyncError>,
    {
        let Some(pipeline) = &self.pipeline else {
            let mut state = relock(&self.local);
            return local_effect(&mut state);
        };

        self.prune_stale();

        let action_id = generate_action_id();
        let snapshot = StateSnapshot::capture(&relock(&self.local));
        relock(&self.pending).insert(
            action_id.clone(),
            PendingAction {
                snapshot: snapshot.clone(),
                kind,
                applied_at: Instant::now(),
            },
        );

        let local_error = {
            let mut state = relock(&self.local);
            local_effect(&mut state).err()
        };
        if let Some(err) = &local_error {
            tracing::error!(kind = kind.as_str(), error = %err, "optimistic execution failed");
        }

        let tagged = tag_payload(payload, &action_id, local_error.is_none());
        match pipeline.broadcast(kind, tagged).await {
            Ok(_) => Ok(()),
            Err(err) => {
                {
                    let mut state = relock(&self.local);
                    snapshot.restore(&mut state);
                }
                relock(&self.pending).remove(&action_id);
                self.notices.push(Notice::ActionNotSaved);
                Err(err)
            }
        }
    }

    /// The collaborator rejected `action_id`: restore its snapshot and
    /// tell the player why. Unknown ids — already confirmed or pruned —
    /// are a no-op.
    pub fn handle_rejection(
        &self,
        action_id: &ActionId,
        reason: Option<&str>,
    ) -> Option<ActionOutcome> {
        let pending = relock(&self.pending).remove(action_id)?;
        {
            let mut state = relock(&self.local);
            pending.snapshot.restore(&mut state);
        }
        let reason = reason.unwrap_or("Invalid action").to_string();
        tracing::warn!(action_id = %action_id, kind = pending.kind.as_str(), %reason, "action rejected; state rolled back");
        self.notices.push(Notice::ActionRejected {
            reason: reason.clone(),
        });
        Some(ActionOutcome::RolledBack { reason })
    }

    /// The collaborator accepted `action_id`: the optimistic application
    /// stands and no rollback will ever be needed.
    pub fn handle_validated(&self, action_id: &ActionId) -> Option<ActionOutcome> {
        relock(&self.pending)
            .remove(action_id)
            .map(|_| ActionOutcome::Confirmed)
    }

    pub fn is_pending(&self, action_id: &ActionId) -> bool {
        relock(&self.pending).contains_key(action_id)
    }

    fn prune_stale(&self) {
        let now = Instant::now();
        relock(&self.pending).retain(|action_id, pending| {
            if now.duration_since(pending.applied_at) > PENDING_TTL {
                // Unconfirmed past the window: assumed accepted.
                tracing::warn!(
                    action_id = %action_id,
                    kind = pending.kind.as_str(),
                    "pending action pruned without confirmation"
                );
                false
            } else {
                true
            }
        });
    }
}

fn generate_action_id() -> ActionId {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    ActionId(format!("{millis}-{:08x}", rand::random::<u32>()))
}

fn tag_payload(payload: Value, action_id: &ActionId, local_executed: bool) -> Value {
    let mut map = match payload {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("data".to_string(), other);
            map
        }
    };
    map.insert("actionId".to_string(), Value::from(action_id.0.clone()));
    map.insert("localExecuted".to_string(), Value::from(local_executed));
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_schema::Card;

    fn notices() -> NoticeSink {
        NoticeSink::channel().0
    }

    #[tokio::test]
    async fn test_offline_mode_runs_effect_directly() {
        let local = Arc::new(Mutex::new(LocalState::default()));
        let validator = Validator::offline(Arc::clone(&local), notices());

        validator
            .execute_with_validation(ActionKind::DrawCards, Value::Null, |state| {
                state.game.player1.hand.push(Card::new("Pikachu", "A1", "1"));
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(relock(&local).game.player1.hand.len(), 1);
        assert!(relock(&validator.pending).is_empty());
    }

    #[test]
    fn test_snapshot_restore_is_exact() {
        let mut state = LocalState::default();
        state.game.p1_points = 2;
        state.has_attached_energy_this_turn = true;
        let snapshot = StateSnapshot::capture(&state);

        state.game.p1_points = 3;
        state.game.player1.hand.push(Card::new("Pikachu", "A1", "1"));
        state.has_attached_energy_this_turn = false;

        snapshot.restore(&mut state);
        assert_eq!(StateSnapshot::capture(&state), snapshot);
        assert_eq!(state.game.p1_points, 2);
        assert!(state.game.player1.hand.is_empty());
        assert!(state.has_attached_energy_this_turn);
    }

    #[test]
    fn test_tag_payload_wraps_non_objects() {
        let id = ActionId::from("a-1");
        let tagged = tag_payload(serde_json::json!({ "x": 1 }), &id, true);
        assert_eq!(tagged["x"], 1);
        assert_eq!(tagged["actionId"], "a-1");
        assert_eq!(tagged["localExecuted"], true);

        let tagged = tag_payload(Value::Null, &id, false);
        assert_eq!(tagged["localExecuted"], false);

        let tagged = tag_payload(serde_json::json!(7), &id, true);
        assert_eq!(tagged["data"], 7);
    }

    #[test]
    fn test_rejection_for_unknown_id_is_noop() {
        let local = Arc::new(Mutex::new(LocalState::default()));
        let validator = Validator::offline(Arc::clone(&local), notices());
        assert_eq!(
            validator.handle_rejection(&ActionId::from("ghost"), Some("nope")),
            None
        );
    }

    #[test]
    fn test_action_ids_are_unique() {
        let a = generate_action_id();
        let b = generate_action_id();
        assert_ne!(a, b);
    }
}
