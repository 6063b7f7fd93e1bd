//! Server-authoritative turn arbitration.
//!
//! Whose turn it is lives in one place: the match record's
//! `currentPlayer` field, written only by the turn-processing
//! collaborator. The arbiter reads it fresh for every check and refuses
//! to let a locally-initiated action even start when it is not the
//! caller's turn — before any optimistic mutation, before any broadcast.

use std::future::Future;
use std::sync::Arc;

use serde_json::json;
use tandem_schema::paths;
use tandem_schema::{ActionKind, Match};

use crate::error::SyncError;
use crate::events::{Notice, NoticeSink};
use crate::pipeline::ActionPipeline;
use crate::session::SyncSession;

struct Online {
    session: Arc<SyncSession>,
    pipeline: Arc<ActionPipeline>,
}

pub struct TurnArbiter {
    online: Option<Online>,
    notices: NoticeSink,
}

impl TurnArbiter {
    /// Single-player mode: it is always the caller's turn.
    pub fn offline(notices: NoticeSink) -> Self {
        Self {
            online: None,
            notices,
        }
    }

    pub fn online(
        session: Arc<SyncSession>,
        pipeline: Arc<ActionPipeline>,
        notices: NoticeSink,
    ) -> Self {
        Self {
            online: Some(Online { session, pipeline }),
            notices,
        }
    }

    /// Whether the local player currently holds the turn. This is a
    /// fresh fetch, not a mirror read: the check must not trust a
    /// snapshot that might predate a turn flip.
    pub async fn is_my_turn(&self) -> bool {
        let Some(online) = &self.online else {
            return true;
        };
        let path = paths::match_root(online.session.match_id());
        match online.session.store().get(&path).await {
            Ok(Some(raw)) => match serde_json::from_value::<Match>(raw) {
                Ok(record) => record.current_player == *online.session.player_id(),
                Err(err) => {
                    tracing::error!(error = %err, "unreadable match record in turn check");
                    false
                }
            },
            Ok(None) => false,
            Err(err) => {
                tracing::warn!(error = %err, "turn check failed");
                false
            }
        }
    }

    /// Run `action` only on the caller's turn. A refused call emits the
    /// "not your turn" notice and returns `Ok(None)` without invoking
    /// the wrapped function — the check happens before any optimistic
    /// local mutation it would perform.
    pub async fn guard<T, F, Fut>(&self, action: F) -> Result<Option<T>, SyncError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        if !self.is_my_turn().await {
            self.notices.push(Notice::NotYourTurn);
            return Ok(None);
        }
        action().await.map(Some)
    }

    /// Broadcast the end of the caller's turn. The next-player rotation
    /// is computed by the turn-processing collaborator, which writes the
    /// new `currentPlayer`/`turnNumber` back to the match; the session
    /// observes that write like any other state change.
    pub async fn end_turn(&self) -> Result<(), SyncError> {
        let Some(online) = &self.online else {
            return Ok(());
        };
        if !self.is_my_turn().await {
            self.notices.push(Notice::NotYourTurn);
            return Ok(());
        }
        online.pipeline.broadcast(ActionKind::EndTurn, json!({})).await?;
        Ok(())
    }

    pub async fn start_turn(&self) -> Result<(), SyncError> {
        let Some(online) = &self.online else {
            return Ok(());
        };
        online
            .pipeline
            .broadcast(ActionKind::StartTurn, json!({}))
            .await?;
        Ok(())
    }
}
