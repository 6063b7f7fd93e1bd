//! The action broadcast/queue/retry pipeline.
//!
//! Local intents become [`Action`] records appended to the per-match log.
//! When the transport is down an intent is queued in order rather than
//! dropped; the queue drains on the network-available signal, strictly
//! FIFO, stopping at the first failure. A successful send clears the
//! whole queue — connectivity is back and the backlog's moment has
//! passed.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use serde_json::Value;
use tandem_schema::paths;
use tandem_schema::{Action, ActionKind};
use tokio::task::JoinHandle;

use crate::error::SyncError;
use crate::relock;
use crate::session::SyncSession;

/// What happened to a broadcast request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastOutcome {
    /// Appended to the remote action log.
    Sent,
    /// Transport down; queued for the next drain.
    Queued,
}

#[derive(Debug, Clone)]
struct QueuedAction {
    kind: ActionKind,
    payload: Value,
}

pub struct ActionPipeline {
    session: Arc<SyncSession>,
    queue: std::sync::Mutex<VecDeque<QueuedAction>>,
    draining: AtomicBool,
    drain_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ActionPipeline {
    pub fn new(session: Arc<SyncSession>) -> Arc<Self> {
        let pipeline = Arc::new(Self {
            session,
            queue: std::sync::Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
            drain_task: std::sync::Mutex::new(None),
        });

        // Drain automatically whenever connectivity comes back.
        let weak: Weak<ActionPipeline> = Arc::downgrade(&pipeline);
        let mut connectivity = pipeline.session.store().connectivity();
        let mut was_connected = *connectivity.borrow();
        let handle = tokio::spawn(async move {
            while connectivity.changed().await.is_ok() {
                let connected = *connectivity.borrow();
                if connected && !was_connected {
                    match weak.upgrade() {
                        Some(pipeline) => pipeline.process_queue().await,
                        None => break,
                    }
                }
                was_connected = connected;
            }
        });
        *relock(&pipeline.drain_task) = Some(handle);

        pipeline
    }

    /// Append an action to the remote log, or queue it if the transport
    /// is unavailable. Hard failures (permission, malformed records)
    /// propagate — those are not retryable by waiting.
    pub async fn broadcast(
        &self,
        kind: ActionKind,
        payload: Value,
    ) -> Result<BroadcastOutcome, SyncError> {
        if !self.session.is_connected() {
            self.enqueue(kind, payload);
            return Ok(BroadcastOutcome::Queued);
        }

        match self.push_action(kind, payload.clone()).await {
            Ok(()) => {
                let backlog = {
                    let mut queue = relock(&self.queue);
                    let backlog = queue.len();
                    queue.clear();
                    backlog
                };
                if backlog > 0 {
                    tracing::debug!(backlog, "broadcast succeeded; queue cleared");
                }
                Ok(BroadcastOutcome::Sent)
            }
            Err(err @ (SyncError::Unavailable | SyncError::Timeout)) => {
                tracing::warn!(kind = kind.as_str(), error = %err, "broadcast queued for retry");
                self.enqueue(kind, payload);
                Ok(BroadcastOutcome::Queued)
            }
            Err(err) => Err(err),
        }
    }

    /// Drain the queue strictly in FIFO order. The first failure puts
    /// that action back at the front and stops — later actions are never
    /// sent ahead of an earlier one.
    pub async fn process_queue(&self) {
        if self.draining.swap(true, Ordering::SeqCst) {
            return;
        }
        loop {
            let Some(next) = relock(&self.queue).pop_front() else {
                break;
            };
            match self.push_action(next.kind, next.payload.clone()).await {
                Ok(()) => {
                    relock(&self.queue).clear();
                }
                Err(err) => {
                    tracing::warn!(
                        kind = next.kind.as_str(),
                        error = %err,
                        "queued action failed to send; drain stopped"
                    );
                    relock(&self.queue).push_front(next);
                    break;
                }
            }
        }
        self.draining.store(false, Ordering::SeqCst);
    }

    /// Entry point for the platform's "network became available" signal.
    pub async fn network_available(&self) {
        self.process_queue().await;
    }

    pub fn queued_len(&self) -> usize {
        relock(&self.queue).len()
    }

    fn enqueue(&self, kind: ActionKind, payload: Value) {
        relock(&self.queue).push_back(QueuedAction { kind, payload });
    }

    async fn push_action(&self, kind: ActionKind, payload: Value) -> Result<(), SyncError> {
        let action = Action::new(
            self.session.match_id().clone(),
            self.session.player_id().clone(),
            kind,
            payload,
        );
        self.session
            .store()
            .push(
                &paths::match_actions(self.session.match_id()),
                serde_json::to_value(&action)?,
            )
            .await?;
        Ok(())
    }
}

impl Drop for ActionPipeline {
    fn drop(&mut self) {
        if let Some(handle) = relock(&self.drain_task).take() {
            handle.abort();
        }
    }
}
