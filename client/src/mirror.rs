//! The in-process authoritative snapshot of a match's game state.
//!
//! The mirror is fed whole-object snapshots by the session's state
//! subscription and is the only thing the rest of the client reads game
//! state from. Writes go the other way: path-scoped updates to the store,
//! with the touched paths marked "in flight" for the duration of the
//! round trip so a stale remote snapshot cannot transiently roll back a
//! local write that is still propagating.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};
use tandem_schema::paths::{self, Path};
use tandem_schema::{
    Card, DiscardPile, GameState, MatchId, PlayerField, PlayerId, PlayerState, Seat, TurnInfo,
};
use tandem_store::Store;

use crate::error::SyncError;
use crate::relock;

type StateListener = Box<dyn Fn(&GameState, Option<&GameState>) + Send>;

/// Handle returned by [`StateMirror::subscribe`]; pass it back to
/// [`StateMirror::unsubscribe`] to stop receiving callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

/// A partial write to one player's state. Unset fields are left alone;
/// the mirror merges against its current snapshot before writing, since
/// the store's `update` only merges one level deep.
#[derive(Debug, Clone, Default)]
pub struct PlayerStateUpdate {
    pub deck: Option<Vec<Card>>,
    pub hand: Option<Vec<Card>>,
    pub discard: Option<DiscardPile>,
    pub energy_types: Option<Vec<String>>,
    pub current_turn_energy: Option<Option<String>>,
    pub next_turn_energy: Option<Option<String>>,
}

impl PlayerStateUpdate {
    fn fields(&self) -> Vec<PlayerField> {
        let mut out = Vec::new();
        if self.deck.is_some() {
            out.push(PlayerField::Deck);
        }
        if self.hand.is_some() {
            out.push(PlayerField::Hand);
        }
        if self.discard.is_some() {
            out.push(PlayerField::Discard);
        }
        if self.energy_types.is_some() {
            out.push(PlayerField::EnergyTypes);
        }
        if self.current_turn_energy.is_some() {
            out.push(PlayerField::CurrentTurnEnergy);
        }
        if self.next_turn_energy.is_some() {
            out.push(PlayerField::NextTurnEnergy);
        }
        out
    }

    fn apply(&self, target: &mut PlayerState) {
        if let Some(deck) = &self.deck {
            target.deck = deck.clone();
        }
        if let Some(hand) = &self.hand {
            target.hand = hand.clone();
        }
        if let Some(discard) = &self.discard {
            target.discard = discard.clone();
        }
        if let Some(energy_types) = &self.energy_types {
            target.energy_types = energy_types.clone();
        }
        if let Some(current) = &self.current_turn_energy {
            target.current_turn_energy = current.clone();
        }
        if let Some(next) = &self.next_turn_energy {
            target.next_turn_energy = next.clone();
        }
    }
}

/// Partial write to the turn bookkeeping at the top of the game state.
#[derive(Debug, Clone, Default)]
pub struct TurnInfoUpdate {
    pub current_player: Option<PlayerId>,
    pub turn_number: Option<u32>,
    pub first_player: Option<PlayerId>,
}

pub struct StateMirror {
    store: Arc<dyn Store>,
    state_path: Path,
    state: Mutex<Option<GameState>>,
    listeners: Mutex<Listeners>,
    in_flight: Mutex<HashSet<(Seat, PlayerField)>>,
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(SubscriptionId, StateListener)>,
}

impl StateMirror {
    pub fn new(store: Arc<dyn Store>, match_id: &MatchId) -> Self {
        Self {
            store,
            state_path: paths::match_state(match_id),
            state: Mutex::new(None),
            listeners: Mutex::new(Listeners::default()),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    // === Remote snapshots ===

    /// Adopt a remote snapshot, preserving any path currently marked as
    /// being locally written: for those paths the previous local value
    /// wins over the (possibly stale) remote one. Everything else adopts
    /// the remote value verbatim.
    pub(crate) fn adopt_remote(&self, mut incoming: GameState) {
        let previous = {
            let mut held = relock(&self.state);
            let previous = held.clone();

            if let Some(prev) = &previous {
                let marked = relock(&self.in_flight);
                for &(seat, field) in marked.iter() {
                    tracing::debug!(?seat, ?field, "preserving in-flight local value");
                    incoming
                        .player_mut(seat)
                        .copy_field_from(prev.player(seat), field);
                }
            }

            *held = Some(incoming.clone());
            previous
        };
        self.notify(&incoming, previous.as_ref());
    }

    fn notify(&self, new_state: &GameState, old_state: Option<&GameState>) {
        let listeners = relock(&self.listeners);
        for (_, listener) in &listeners.entries {
            listener(new_state, old_state);
        }
    }

    // === Subscriptions ===

    /// Register a change listener, called with `(new, previous)` on every
    /// adopted snapshot — and immediately with the current state if one
    /// is already held. Callbacks run on the session's dispatch task and
    /// must not subscribe or unsubscribe from inside.
    pub fn subscribe(
        &self,
        listener: impl Fn(&GameState, Option<&GameState>) + Send + 'static,
    ) -> SubscriptionId {
        let current = relock(&self.state).clone();
        let mut listeners = relock(&self.listeners);
        let id = SubscriptionId(listeners.next_id);
        listeners.next_id += 1;
        if let Some(state) = &current {
            listener(state, None);
        }
        listeners.entries.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        relock(&self.listeners).entries.retain(|(lid, _)| *lid != id);
    }

    // === In-flight bookkeeping ===

    /// Mark paths as being locally written; remote snapshots will not
    /// overwrite them until [`clear_in_flight`](Self::clear_in_flight).
    /// The path-scoped writers below do this automatically for the
    /// duration of their own round trip.
    pub fn mark_in_flight(&self, seat: Seat, fields: &[PlayerField]) {
        let mut marked = relock(&self.in_flight);
        for &field in fields {
            marked.insert((seat, field));
        }
    }

    pub fn clear_in_flight(&self, seat: Seat, fields: &[PlayerField]) {
        let mut marked = relock(&self.in_flight);
        for field in fields {
            marked.remove(&(seat, *field));
        }
    }

    // === Read accessors ===

    pub fn state(&self) -> Option<GameState> {
        relock(&self.state).clone()
    }

    pub fn player_state(&self, seat: Seat) -> Option<PlayerState> {
        relock(&self.state).as_ref().map(|s| s.player(seat).clone())
    }

    pub fn deck(&self, seat: Seat) -> Vec<Card> {
        self.player_state(seat).map(|p| p.deck).unwrap_or_default()
    }

    pub fn hand(&self, seat: Seat) -> Vec<Card> {
        self.player_state(seat).map(|p| p.hand).unwrap_or_default()
    }

    pub fn discard(&self, seat: Seat) -> DiscardPile {
        self.player_state(seat).map(|p| p.discard).unwrap_or_default()
    }

    pub fn energy_types(&self, seat: Seat) -> Vec<String> {
        self.player_state(seat)
            .map(|p| p.energy_types)
            .unwrap_or_default()
    }

    /// `(player1, player2)` score counters.
    pub fn points(&self) -> (u32, u32) {
        relock(&self.state)
            .as_ref()
            .map(|s| (s.p1_points, s.p2_points))
            .unwrap_or((0, 0))
    }

    pub fn turn_info(&self) -> TurnInfo {
        relock(&self.state)
            .as_ref()
            .map(GameState::turn_info)
            .unwrap_or_default()
    }

    // === Writers ===

    /// Full overwrite, used for initial setup and resets.
    pub async fn replace_state(&self, state: &GameState) -> Result<(), SyncError> {
        self.store
            .set(&self.state_path, serde_json::to_value(state)?)
            .await?;
        Ok(())
    }

    /// Path-scoped write of one player's fields. The touched paths are
    /// held in flight until the store acknowledges the write.
    pub async fn update_player_fields(
        &self,
        seat: Seat,
        update: PlayerStateUpdate,
    ) -> Result<(), SyncError> {
        let mut merged = self.player_state(seat).unwrap_or_default();
        update.apply(&mut merged);

        let fields = update.fields();
        self.mark_in_flight(seat, &fields);

        let mut updates = Map::new();
        updates.insert(seat.key().to_string(), serde_json::to_value(&merged)?);
        let result = self.store.update(&self.state_path, updates).await;

        self.clear_in_flight(seat, &fields);
        result.map_err(SyncError::from)
    }

    pub async fn update_points(&self, seat: Seat, points: u32) -> Result<(), SyncError> {
        let key = match seat {
            Seat::Player1 => "p1Points",
            Seat::Player2 => "p2Points",
        };
        let mut updates = Map::new();
        updates.insert(key.to_string(), Value::from(points));
        self.store.update(&self.state_path, updates).await?;
        Ok(())
    }

    pub async fn update_turn_info(&self, update: TurnInfoUpdate) -> Result<(), SyncError> {
        let mut updates = Map::new();
        if let Some(current) = update.current_player {
            updates.insert("currentPlayer".to_string(), Value::from(current.0));
        }
        if let Some(turn) = update.turn_number {
            updates.insert("turnNumber".to_string(), Value::from(turn));
        }
        if let Some(first) = update.first_player {
            updates.insert("firstPlayer".to_string(), Value::from(first.0));
        }
        if updates.is_empty() {
            return Ok(());
        }
        self.store.update(&self.state_path, updates).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tandem_store::MemoryStore;

    fn mirror() -> StateMirror {
        StateMirror::new(MemoryStore::new(), &MatchId::from("m1"))
    }

    fn state_with_hand(cards: &[&str]) -> GameState {
        let mut state = GameState::default();
        state.player1.hand = cards.iter().map(|n| Card::new(n, "A1", "1")).collect();
        state
    }

    #[test]
    fn test_subscribe_fires_immediately_when_state_held() {
        let mirror = mirror();
        mirror.adopt_remote(GameState::default());

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        mirror.subscribe(move |_, old| {
            assert!(old.is_none());
            seen.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listeners_get_new_and_previous() {
        let mirror = mirror();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        mirror.subscribe(move |new, old| {
            match seen.fetch_add(1, Ordering::SeqCst) {
                0 => assert!(old.is_none()),
                _ => {
                    assert_eq!(old.unwrap().player1.hand.len(), 0);
                    assert_eq!(new.player1.hand.len(), 1);
                }
            }
        });

        mirror.adopt_remote(GameState::default());
        mirror.adopt_remote(state_with_hand(&["Pikachu"]));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe_stops_callbacks() {
        let mirror = mirror();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let id = mirror.subscribe(move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        mirror.unsubscribe(id);
        mirror.adopt_remote(GameState::default());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_in_flight_paths_survive_stale_snapshot() {
        let mirror = mirror();
        // Local state already reflects a two-card hand.
        mirror.adopt_remote(state_with_hand(&["Pikachu", "Bulbasaur"]));

        mirror.mark_in_flight(Seat::Player1, &[PlayerField::Hand]);

        // A stale remote snapshot arrives: empty hand, but new points.
        let mut stale = GameState::default();
        stale.p1_points = 2;
        mirror.adopt_remote(stale);

        // The marked path kept the local value; the rest adopted remote.
        assert_eq!(mirror.hand(Seat::Player1).len(), 2);
        assert_eq!(mirror.points().0, 2);

        // Once cleared, remote wins again.
        mirror.clear_in_flight(Seat::Player1, &[PlayerField::Hand]);
        mirror.adopt_remote(GameState::default());
        assert!(mirror.hand(Seat::Player1).is_empty());
    }

    #[test]
    fn test_unmarked_fields_of_same_player_adopt_remote() {
        let mirror = mirror();
        let mut local = state_with_hand(&["Pikachu"]);
        local.player1.current_turn_energy = Some("electric".to_string());
        mirror.adopt_remote(local);

        mirror.mark_in_flight(Seat::Player1, &[PlayerField::Hand]);
        let mut remote = GameState::default();
        remote.player1.current_turn_energy = Some("water".to_string());
        mirror.adopt_remote(remote);

        assert_eq!(mirror.hand(Seat::Player1).len(), 1);
        assert_eq!(
            mirror.player_state(Seat::Player1).unwrap().current_turn_energy,
            Some("water".to_string())
        );
    }

    #[tokio::test]
    async fn test_update_player_fields_merges_before_writing() {
        let store = MemoryStore::new();
        let match_id = MatchId::from("m1");
        let mirror = StateMirror::new(store.clone(), &match_id);
        mirror.replace_state(&state_with_hand(&["Pikachu"])).await.unwrap();
        mirror.adopt_remote(state_with_hand(&["Pikachu"]));

        let update = PlayerStateUpdate {
            current_turn_energy: Some(Some("electric".to_string())),
            ..Default::default()
        };
        mirror.update_player_fields(Seat::Player1, update).await.unwrap();

        let raw = store
            .get(&paths::match_state(&match_id))
            .await
            .unwrap()
            .unwrap();
        let written: GameState = serde_json::from_value(raw).unwrap();
        // The untouched hand survived the player-subtree write.
        assert_eq!(written.player1.hand.len(), 1);
        assert_eq!(
            written.player1.current_turn_energy,
            Some("electric".to_string())
        );
    }

    #[tokio::test]
    async fn test_update_turn_info_writes_scoped_keys() {
        let store = MemoryStore::new();
        let match_id = MatchId::from("m1");
        let mirror = StateMirror::new(store.clone(), &match_id);
        mirror.replace_state(&GameState::default()).await.unwrap();

        mirror
            .update_turn_info(TurnInfoUpdate {
                current_player: Some(PlayerId::from("bob")),
                turn_number: Some(2),
                first_player: None,
            })
            .await
            .unwrap();

        let raw = store
            .get(&paths::match_state(&match_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(raw["currentPlayer"], "bob");
        assert_eq!(raw["turnNumber"], 2);
    }
}
