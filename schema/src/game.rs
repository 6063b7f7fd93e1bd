use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::card::Card;
use crate::ids::PlayerId;

/// Which of the two match seats a client occupies.
///
/// Seats are positional ("player1"/"player2" in the stored record), not
/// tied to any particular user id; [`crate::Match::seat_of`] resolves a
/// user to a seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Seat {
    Player1,
    Player2,
}

impl Seat {
    pub fn opponent(self) -> Seat {
        match self {
            Seat::Player1 => Seat::Player2,
            Seat::Player2 => Seat::Player1,
        }
    }

    /// Key of this seat's subtree inside a stored `GameState`.
    pub fn key(self) -> &'static str {
        match self {
            Seat::Player1 => "player1",
            Seat::Player2 => "player2",
        }
    }
}

/// The per-player mutable fields, used to scope in-flight preservation
/// to exactly the paths a local write is touching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerField {
    Deck,
    Hand,
    Discard,
    EnergyTypes,
    CurrentTurnEnergy,
    NextTurnEnergy,
}

/// Discarded cards plus a per-energy-type count of discarded energy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscardPile {
    #[serde(default)]
    pub cards: Vec<Card>,
    #[serde(default)]
    pub energy_counts: BTreeMap<String, u32>,
}

/// One player's half of the game state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    #[serde(default)]
    pub deck: Vec<Card>,
    #[serde(default)]
    pub hand: Vec<Card>,
    #[serde(default)]
    pub discard: DiscardPile,
    /// The energy types this player declared for the match.
    #[serde(default)]
    pub energy_types: Vec<String>,
    #[serde(default)]
    pub current_turn_energy: Option<String>,
    #[serde(default)]
    pub next_turn_energy: Option<String>,
}

impl PlayerState {
    /// A fresh seat: full (expanded) deck, everything else empty.
    pub fn new(deck: Vec<Card>, energy_types: Vec<String>) -> Self {
        Self {
            deck,
            energy_types,
            ..Self::default()
        }
    }

    /// Overwrite one field with `other`'s value, leaving the rest alone.
    pub fn copy_field_from(&mut self, other: &PlayerState, field: PlayerField) {
        match field {
            PlayerField::Deck => self.deck = other.deck.clone(),
            PlayerField::Hand => self.hand = other.hand.clone(),
            PlayerField::Discard => self.discard = other.discard.clone(),
            PlayerField::EnergyTypes => self.energy_types = other.energy_types.clone(),
            PlayerField::CurrentTurnEnergy => {
                self.current_turn_energy = other.current_turn_energy.clone()
            }
            PlayerField::NextTurnEnergy => {
                self.next_turn_energy = other.next_turn_energy.clone()
            }
        }
    }
}

/// Current turn bookkeeping, as read from the mirrored state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TurnInfo {
    pub current_player: Option<PlayerId>,
    pub turn_number: u32,
    pub first_player: Option<PlayerId>,
}

/// The full shared game state of one match, nested under
/// `matches/{id}/gameState`.
///
/// Invariant: `current_player` always names exactly one of the two match
/// players, and `turn_number` only ever moves up, by one per transition.
/// Both fields are written by the turn-processing collaborator, never
/// directly by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub player1: PlayerState,
    pub player2: PlayerState,
    #[serde(default)]
    pub p1_points: u32,
    #[serde(default)]
    pub p2_points: u32,
    #[serde(default)]
    pub current_player: Option<PlayerId>,
    #[serde(default)]
    pub first_player: Option<PlayerId>,
    #[serde(default = "first_turn")]
    pub turn_number: u32,
}

fn first_turn() -> u32 {
    1
}

impl GameState {
    pub fn new(player1: PlayerState, player2: PlayerState) -> Self {
        Self {
            player1,
            player2,
            p1_points: 0,
            p2_points: 0,
            current_player: None,
            first_player: None,
            turn_number: 1,
        }
    }

    pub fn player(&self, seat: Seat) -> &PlayerState {
        match seat {
            Seat::Player1 => &self.player1,
            Seat::Player2 => &self.player2,
        }
    }

    pub fn player_mut(&mut self, seat: Seat) -> &mut PlayerState {
        match seat {
            Seat::Player1 => &mut self.player1,
            Seat::Player2 => &mut self.player2,
        }
    }

    pub fn points(&self, seat: Seat) -> u32 {
        match seat {
            Seat::Player1 => self.p1_points,
            Seat::Player2 => self.p2_points,
        }
    }

    pub fn turn_info(&self) -> TurnInfo {
        TurnInfo {
            current_player: self.current_player.clone(),
            turn_number: self.turn_number,
            first_player: self.first_player.clone(),
        }
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new(PlayerState::default(), PlayerState::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seat_opponent() {
        assert_eq!(Seat::Player1.opponent(), Seat::Player2);
        assert_eq!(Seat::Player2.opponent(), Seat::Player1);
    }

    #[test]
    fn test_copy_field_from() {
        let mut a = PlayerState::default();
        let mut b = PlayerState::default();
        b.hand = vec![Card::new("Pikachu", "A1", "1")];
        b.deck = vec![Card::new("Bulbasaur", "A1", "2")];

        a.copy_field_from(&b, PlayerField::Hand);
        assert_eq!(a.hand, b.hand);
        assert!(a.deck.is_empty());
    }

    #[test]
    fn test_wire_shape_uses_camel_case() {
        let state = GameState::default();
        let json = serde_json::to_value(&state).unwrap();
        assert!(json.get("p1Points").is_some());
        assert!(json.get("turnNumber").is_some());
        assert!(json["player1"].get("energyTypes").is_some());
    }

    #[test]
    fn test_sparse_record_deserializes() {
        // Records written before a field existed come back with defaults.
        let json = serde_json::json!({ "player1": {}, "player2": {} });
        let state: GameState = serde_json::from_value(json).unwrap();
        assert_eq!(state.turn_number, 1);
        assert_eq!(state.p1_points, 0);
        assert!(state.current_player.is_none());
    }
}
