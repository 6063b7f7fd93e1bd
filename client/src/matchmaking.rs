//! Skill-proximity matchmaking over the shared queue.
//!
//! Every waiting player writes one entry keyed by their user id; pairing
//! is client-driven — each client scans the queue for the closest skill
//! score and races to claim the pair. The race is closed by the store's
//! atomic multi-path removal: whichever attempt removes both entries
//! first wins, and the loser's `NotFound` simply means "no match this
//! round".

use std::sync::Arc;

use serde_json::Value;
use tandem_schema::paths;
use tandem_schema::{
    Card, Match, MatchId, PlayerId, QueueEntry, QueueStatus, UserProfile, expand_deck,
};
use tandem_store::{Store, StoreError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::SyncError;
use crate::relock;

#[derive(Debug, Clone)]
pub enum MatchmakingEvent {
    MatchFound {
        match_id: MatchId,
        player1: PlayerId,
        player2: PlayerId,
    },
}

pub struct Matchmaking {
    store: Arc<dyn Store>,
    user_id: PlayerId,
    inner: std::sync::Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    in_queue: bool,
    entry: Option<QueueEntry>,
    tasks: Vec<JoinHandle<()>>,
}

impl Matchmaking {
    pub fn new(store: Arc<dyn Store>, user_id: PlayerId) -> Arc<Self> {
        Arc::new(Self {
            store,
            user_id,
            inner: std::sync::Mutex::new(Inner::default()),
        })
    }

    /// Join the queue with the chosen loadout and immediately attempt a
    /// pairing. Further pairing attempts fire reactively whenever a new
    /// entry appears, so two players queueing at the same time still
    /// converge. Returns the event channel that announces the match.
    pub async fn join_queue(
        self: &Arc<Self>,
        deck: Vec<Card>,
        energy: Vec<String>,
    ) -> Result<mpsc::UnboundedReceiver<MatchmakingEvent>, SyncError> {
        if self.is_in_queue() {
            return Err(SyncError::AlreadyQueued);
        }
        // The loadout must be able to form a match at all.
        expand_deck(&deck)?;

        // A skill lookup failure must never block queueing.
        let skill_level = self.lookup_skill().await;
        let entry = QueueEntry::new(self.user_id.clone(), skill_level, deck, energy);

        // Baseline before the entry write: anything different appearing
        // under activeMatch afterwards is our new match.
        let prior_active = match self.store.get(&paths::user_active_match(&self.user_id)).await {
            Ok(value) => value.and_then(|v| v.as_str().map(str::to_string)),
            Err(_) => None,
        };

        self.store
            .set(
                &paths::queue_user(&self.user_id),
                serde_json::to_value(&entry)?,
            )
            .await?;
        {
            let mut inner = relock(&self.inner);
            inner.in_queue = true;
            inner.entry = Some(entry);
        }
        tracing::info!(user = %self.user_id, skill_level, "joined matchmaking queue");

        let (tx, rx) = mpsc::unbounded_channel();
        self.spawn_queue_watcher();
        self.spawn_active_match_watcher(tx, prior_active);

        self.try_find_match().await?;
        Ok(rx)
    }

    pub fn is_in_queue(&self) -> bool {
        relock(&self.inner).in_queue
    }

    /// Remove the queue entry and stop all pairing activity. Removal
    /// failures are logged, not fatal — the entry may already be gone.
    pub async fn leave_queue(&self) {
        let was_queued = {
            let inner = relock(&self.inner);
            inner.in_queue
        };
        if was_queued {
            if let Err(err) = self.store.remove(&paths::queue_user(&self.user_id)).await {
                tracing::warn!(error = %err, "failed to remove own queue entry");
            }
        }
        let mut inner = relock(&self.inner);
        inner.in_queue = false;
        inner.entry = None;
        for task in inner.tasks.drain(..) {
            task.abort();
        }
    }

    async fn lookup_skill(&self) -> i64 {
        match self.store.get(&paths::user_profile(&self.user_id)).await {
            Ok(Some(raw)) => match serde_json::from_value::<UserProfile>(raw) {
                Ok(profile) => profile.skill_level(),
                Err(err) => {
                    tracing::warn!(error = %err, "unreadable profile; skill defaults to 0");
                    0
                }
            },
            Ok(None) => 0,
            Err(err) => {
                tracing::warn!(error = %err, "profile lookup failed; skill defaults to 0");
                0
            }
        }
    }

    /// One pairing pass: scan all other waiting entries for the minimum
    /// absolute skill difference (first encountered wins ties) and try
    /// to claim the pair.
    pub async fn try_find_match(&self) -> Result<Option<MatchId>, SyncError> {
        let my_entry = {
            let inner = relock(&self.inner);
            if !inner.in_queue {
                return Ok(None);
            }
            inner.entry.clone()
        };
        let Some(my_entry) = my_entry else {
            return Ok(None);
        };

        let Some(raw_queue) = self.store.get(&paths::queue()).await? else {
            return Ok(None);
        };
        let Some(entries) = raw_queue.as_object() else {
            return Ok(None);
        };

        let mut best: Option<QueueEntry> = None;
        let mut best_diff = i64::MAX;
        for (key, raw) in entries {
            if key == self.user_id.as_str() {
                continue;
            }
            let entry: QueueEntry = match serde_json::from_value(raw.clone()) {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(key = %key, error = %err, "skipping unreadable queue entry");
                    continue;
                }
            };
            if entry.status != QueueStatus::Waiting {
                continue;
            }
            let diff = (entry.skill_level - my_entry.skill_level).abs();
            if diff < best_diff {
                best_diff = diff;
                best = Some(entry);
            }
        }

        match best {
            Some(candidate) => self.create_match_from_queue(&my_entry, &candidate).await,
            None => Ok(None),
        }
    }

    /// Claim both entries and write the match. The atomic removal is the
    /// critical step: under two concurrent pairing attempts exactly one
    /// removal succeeds, and the loser treats `NotFound` as "no match
    /// found this round".
    async fn create_match_from_queue(
        &self,
        mine: &QueueEntry,
        theirs: &QueueEntry,
    ) -> Result<Option<MatchId>, SyncError> {
        // Both loadouts must expand before anything is removed.
        expand_deck(&mine.deck)?;
        expand_deck(&theirs.deck)?;

        let both = [
            paths::queue_user(&self.user_id),
            paths::queue_user(&theirs.user_id),
        ];
        match self.store.remove_all(&both).await {
            Ok(()) => {}
            Err(StoreError::NotFound(path)) => {
                tracing::debug!(%path, "pairing race lost; no match this round");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        }

        let match_id = MatchId(self.store.generate_key());
        let record = Match::new(
            match_id.clone(),
            self.user_id.clone(),
            theirs.user_id.clone(),
            None,
            &mine.deck,
            mine.energy.clone(),
            &theirs.deck,
            theirs.energy.clone(),
        )?;
        self.store
            .set(&paths::match_root(&match_id), serde_json::to_value(&record)?)
            .await?;
        self.store
            .set(
                &paths::user_active_match(&self.user_id),
                Value::from(match_id.0.clone()),
            )
            .await?;
        self.store
            .set(
                &paths::user_active_match(&theirs.user_id),
                Value::from(match_id.0.clone()),
            )
            .await?;

        {
            let mut inner = relock(&self.inner);
            inner.in_queue = false;
            inner.entry = None;
        }
        tracing::info!(%match_id, opponent = %theirs.user_id, "match formed from queue");
        Ok(Some(match_id))
    }

    /// Re-attempt pairing whenever a new entry appears, not just at join
    /// time.
    fn spawn_queue_watcher(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let me = self.user_id.clone();
        let mut feed = self.store.watch_children(&paths::queue());
        let handle = tokio::spawn(async move {
            while let Some(event) = feed.rx.recv().await {
                if event.key == me.as_str() {
                    continue;
                }
                let Some(matchmaking) = weak.upgrade() else {
                    break;
                };
                if !matchmaking.is_in_queue() {
                    continue;
                }
                if let Err(err) = matchmaking.try_find_match().await {
                    tracing::error!(error = %err, "reactive pairing attempt failed");
                }
            }
        });
        relock(&self.inner).tasks.push(handle);
    }

    /// Both the pairing winner and the paired partner learn about the
    /// match the same way: their `activeMatch` pointer changes.
    fn spawn_active_match_watcher(
        self: &Arc<Self>,
        tx: mpsc::UnboundedSender<MatchmakingEvent>,
        prior_active: Option<String>,
    ) {
        let weak = Arc::downgrade(self);
        let mut feed = self.store.watch(&paths::user_active_match(&self.user_id));
        let handle = tokio::spawn(async move {
            while let Some(value) = feed.rx.recv().await {
                let Some(id) = value.as_str() else {
                    continue;
                };
                if prior_active.as_deref() == Some(id) {
                    continue;
                }
                let match_id = MatchId::from(id);
                let Some(matchmaking) = weak.upgrade() else {
                    break;
                };
                let raw = match matchmaking.store.get(&paths::match_root(&match_id)).await {
                    Ok(Some(raw)) => raw,
                    Ok(None) => continue,
                    Err(err) => {
                        tracing::warn!(error = %err, "could not fetch freshly assigned match");
                        continue;
                    }
                };
                let record: Match = match serde_json::from_value(raw) {
                    Ok(record) => record,
                    Err(err) => {
                        tracing::error!(error = %err, "unreadable match record");
                        continue;
                    }
                };
                {
                    let mut inner = relock(&matchmaking.inner);
                    inner.in_queue = false;
                    inner.entry = None;
                }
                let _ = tx.send(MatchmakingEvent::MatchFound {
                    match_id,
                    player1: record.player1_id,
                    player2: record.player2_id,
                });
                break;
            }
        });
        relock(&self.inner).tasks.push(handle);
    }
}
