//! Room lifecycle: create, join by code, promote to a match, leave.
//!
//! Rooms are the direct-invite path into a match. A code is six draws
//! from a confusion-free alphabet, checked for uniqueness against every
//! live room before the room is created; the creation itself is the
//! store's atomic single-path create, so two hosts can never share a
//! room id.

use std::sync::Arc;

use rand::Rng;
use serde_json::{Map, Value, json};
use tandem_schema::paths;
use tandem_schema::{
    Card, Match, MatchId, PlayerId, ROOM_CODE_ALPHABET, ROOM_CODE_LEN, Room, RoomId, RoomStatus,
};
use tandem_store::{Store, StoreError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::SyncError;
use crate::relock;

/// How many code draws to try before giving up.
pub const ROOM_CODE_ATTEMPTS: u32 = 10;

type CodeGenerator = Box<dyn Fn() -> String + Send + Sync>;

fn random_room_code() -> String {
    let mut rng = rand::thread_rng();
    (0..ROOM_CODE_LEN)
        .map(|_| ROOM_CODE_ALPHABET[rng.gen_range(0..ROOM_CODE_ALPHABET.len())] as char)
        .collect()
}

#[derive(Clone)]
struct CurrentRoom {
    room_id: RoomId,
    room_code: String,
}

pub struct Lobby {
    store: Arc<dyn Store>,
    user_id: PlayerId,
    code_gen: CodeGenerator,
    inner: std::sync::Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    current: Option<CurrentRoom>,
    tasks: Vec<JoinHandle<()>>,
}

impl Lobby {
    pub fn new(store: Arc<dyn Store>, user_id: PlayerId) -> Arc<Self> {
        Self::with_code_generator(store, user_id, Box::new(random_room_code))
    }

    /// Injectable code source, for deterministic collision handling in
    /// tests.
    pub fn with_code_generator(
        store: Arc<dyn Store>,
        user_id: PlayerId,
        code_gen: CodeGenerator,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            user_id,
            code_gen,
            inner: std::sync::Mutex::new(Inner::default()),
        })
    }

    pub fn current_room(&self) -> Option<RoomId> {
        relock(&self.inner).current.as_ref().map(|c| c.room_id.clone())
    }

    pub fn current_code(&self) -> Option<String> {
        relock(&self.inner)
            .current
            .as_ref()
            .map(|c| c.room_code.clone())
    }

    /// Whether any live room already holds `code`. A permission-denied
    /// read answers "available": creation still goes through and a true
    /// duplicate would surface there.
    async fn is_code_available(&self, code: &str) -> Result<bool, SyncError> {
        let rooms = match self.store.get(&paths::rooms()).await {
            Ok(rooms) => rooms,
            Err(StoreError::PermissionDenied(path)) => {
                tracing::warn!(%path, "cannot read rooms for code check; assuming available");
                return Ok(true);
            }
            Err(err) => return Err(err.into()),
        };
        let taken = rooms
            .as_ref()
            .and_then(Value::as_object)
            .is_some_and(|map| {
                map.values()
                    .any(|room| room.get("roomCode").and_then(Value::as_str) == Some(code))
            });
        Ok(!taken)
    }

    async fn generate_unique_code(&self) -> Result<String, SyncError> {
        for _ in 0..ROOM_CODE_ATTEMPTS {
            let code = (self.code_gen)();
            if self.is_code_available(&code).await? {
                return Ok(code);
            }
        }
        Err(SyncError::RoomCodeExhausted(ROOM_CODE_ATTEMPTS))
    }

    /// Create a `waiting` room owned by the caller. Returns the room id,
    /// its join code, and a feed of room snapshots (the host watches it
    /// to see the guest arrive).
    pub async fn create_room(
        &self,
        deck: Option<Vec<Card>>,
        energy: Vec<String>,
    ) -> Result<(RoomId, String, mpsc::UnboundedReceiver<Room>), SyncError> {
        let room_code = self.generate_unique_code().await?;
        let room_id = RoomId(self.store.generate_key());
        let room = Room::new(
            room_id.clone(),
            self.user_id.clone(),
            room_code.clone(),
            deck,
            energy,
        );
        self.store
            .create(&paths::room(&room_id), serde_json::to_value(&room)?)
            .await?;

        let feed = self.attach_room_watcher(&room_id);
        relock(&self.inner).current = Some(CurrentRoom {
            room_id: room_id.clone(),
            room_code: room_code.clone(),
        });
        tracing::info!(%room_id, %room_code, "room created");
        Ok((room_id, room_code, feed))
    }

    /// Join a waiting room as the guest. The join flips the room to
    /// `ready`.
    pub async fn join_room_by_code(
        &self,
        room_code: &str,
        deck: Option<Vec<Card>>,
        energy: Vec<String>,
    ) -> Result<(RoomId, mpsc::UnboundedReceiver<Room>), SyncError> {
        let rooms = self
            .store
            .get(&paths::rooms())
            .await?
            .unwrap_or_else(|| Value::Object(Map::new()));
        let raw = rooms
            .as_object()
            .and_then(|map| {
                map.values()
                    .find(|room| room.get("roomCode").and_then(Value::as_str) == Some(room_code))
            })
            .ok_or_else(|| SyncError::NotFound(format!("room with code {room_code}")))?;
        let room: Room = serde_json::from_value(raw.clone())?;

        if room.status != RoomStatus::Waiting {
            return Err(SyncError::RoomNotAvailable);
        }
        if room.player1_id == self.user_id {
            return Err(SyncError::AlreadyInRoom);
        }
        if room.player2_id.is_some() {
            return Err(SyncError::RoomFull);
        }

        let mut updates = Map::new();
        updates.insert("player2Id".to_string(), Value::from(self.user_id.0.clone()));
        updates.insert("player2Deck".to_string(), serde_json::to_value(&deck)?);
        updates.insert("player2Energy".to_string(), serde_json::to_value(&energy)?);
        updates.insert("status".to_string(), json!("ready"));
        self.store.update(&paths::room(&room.room_id), updates).await?;

        let feed = self.attach_room_watcher(&room.room_id);
        relock(&self.inner).current = Some(CurrentRoom {
            room_id: room.room_id.clone(),
            room_code: room_code.to_string(),
        });
        tracing::info!(room_id = %room.room_id, "joined room");
        Ok((room.room_id, feed))
    }

    /// Promote a `ready` room into a match: the match is written from
    /// the room's stored selections, the room flips to `in-progress`
    /// with a back-reference, and the caller's active-match pointer is
    /// set. Either member may start.
    pub async fn start_game_from_room(&self) -> Result<MatchId, SyncError> {
        let current = relock(&self.inner)
            .current
            .clone()
            .ok_or(SyncError::NotInRoom)?;

        let raw = self
            .store
            .get(&paths::room(&current.room_id))
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("rooms/{}", current.room_id)))?;
        let room: Room = serde_json::from_value(raw)?;

        if room.status != RoomStatus::Ready {
            return Err(SyncError::RoomNotReady);
        }
        if !room.is_member(&self.user_id) {
            return Err(SyncError::NotInRoom);
        }
        let guest = room.player2_id.clone().ok_or(SyncError::RoomNotReady)?;

        let match_id = MatchId(self.store.generate_key());
        let record = Match::new(
            match_id.clone(),
            room.player1_id.clone(),
            guest,
            Some(room.room_id.clone()),
            &room.player1_deck.clone().unwrap_or_default(),
            room.player1_energy.clone(),
            &room.player2_deck.clone().unwrap_or_default(),
            room.player2_energy.clone(),
        )?;
        self.store
            .set(&paths::match_root(&match_id), serde_json::to_value(&record)?)
            .await?;

        let mut updates = Map::new();
        updates.insert("status".to_string(), json!("in-progress"));
        updates.insert("matchId".to_string(), Value::from(match_id.0.clone()));
        self.store.update(&paths::room(&room.room_id), updates).await?;

        // Only the caller's own pointer; the other member sets theirs
        // when their room feed shows the promotion.
        self.store
            .set(
                &paths::user_active_match(&self.user_id),
                Value::from(match_id.0.clone()),
            )
            .await?;

        tracing::info!(%match_id, room_id = %room.room_id, "room promoted to match");
        Ok(match_id)
    }

    /// Leave the current room. The host leaving deletes the room
    /// outright; the guest leaving reverts it to `waiting` with the
    /// guest slot cleared.
    pub async fn leave_room(&self) -> Result<(), SyncError> {
        let current = {
            let mut inner = relock(&self.inner);
            for task in inner.tasks.drain(..) {
                task.abort();
            }
            inner.current.take()
        };
        let Some(current) = current else {
            return Ok(());
        };

        match self.store.get(&paths::room(&current.room_id)).await {
            Ok(Some(raw)) => {
                let room: Room = serde_json::from_value(raw)?;
                if room.player1_id == self.user_id {
                    self.store.remove(&paths::room(&current.room_id)).await?;
                } else if room.player2_id.as_ref() == Some(&self.user_id) {
                    let mut updates = Map::new();
                    updates.insert("player2Id".to_string(), Value::Null);
                    updates.insert("status".to_string(), json!("waiting"));
                    self.store.update(&paths::room(&current.room_id), updates).await?;
                }
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(error = %err, "could not read room while leaving"),
        }
        Ok(())
    }

    fn attach_room_watcher(&self, room_id: &RoomId) -> mpsc::UnboundedReceiver<Room> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut feed = self.store.watch(&paths::room(room_id));
        let handle = tokio::spawn(async move {
            while let Some(value) = feed.rx.recv().await {
                if value.is_null() {
                    // Room deleted (host left).
                    break;
                }
                match serde_json::from_value::<Room>(value) {
                    Ok(room) => {
                        if tx.send(room).is_err() {
                            break;
                        }
                    }
                    Err(err) => tracing::warn!(error = %err, "unreadable room record"),
                }
            }
        });
        relock(&self.inner).tasks.push(handle);
        rx
    }
}
