use serde::{Deserialize, Serialize};

use crate::card::{Card, DeckError, expand_deck};
use crate::game::{GameState, PlayerState, Seat};
use crate::ids::{MatchId, PlayerId, RoomId};
use crate::timestamp::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchStatus {
    InProgress,
    Finished,
}

/// An active (or finished) game between two paired players.
///
/// Created exactly once by whichever path paired the players — a lobby
/// room or the matchmaking queue — and never deleted by a client;
/// cleanup is time-based and external. `current_player` is the
/// mutual-exclusion token for turn order: only its holder's actions are
/// trusted by the validation collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub match_id: MatchId,
    pub player1_id: PlayerId,
    pub player2_id: PlayerId,
    #[serde(default)]
    pub room_id: Option<RoomId>,
    pub status: MatchStatus,
    pub current_player: PlayerId,
    pub turn_number: u32,
    pub created_at: Timestamp,
    #[serde(default)]
    pub finished_at: Option<Timestamp>,
    #[serde(default)]
    pub winner: Option<PlayerId>,
    pub game_state: GameState,
}

impl Match {
    /// Build a fresh match. Both decks are expanded to canonical form
    /// here; an undersized deck refuses the whole match.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        match_id: MatchId,
        player1_id: PlayerId,
        player2_id: PlayerId,
        room_id: Option<RoomId>,
        player1_deck: &[Card],
        player1_energy: Vec<String>,
        player2_deck: &[Card],
        player2_energy: Vec<String>,
    ) -> Result<Self, DeckError> {
        let player1 = PlayerState::new(expand_deck(player1_deck)?, player1_energy);
        let player2 = PlayerState::new(expand_deck(player2_deck)?, player2_energy);

        let mut game_state = GameState::new(player1, player2);
        game_state.current_player = Some(player1_id.clone());

        Ok(Self {
            match_id,
            player1_id: player1_id.clone(),
            player2_id,
            room_id,
            status: MatchStatus::InProgress,
            current_player: player1_id,
            turn_number: 1,
            created_at: Timestamp::server(),
            finished_at: None,
            winner: None,
            game_state,
        })
    }

    /// Which seat `player` occupies, by plain id equality.
    pub fn seat_of(&self, player: &PlayerId) -> Option<Seat> {
        if self.player1_id == *player {
            Some(Seat::Player1)
        } else if self.player2_id == *player {
            Some(Seat::Player2)
        } else {
            None
        }
    }

    pub fn player_in(&self, seat: Seat) -> &PlayerId {
        match seat {
            Seat::Player1 => &self.player1_id,
            Seat::Player2 => &self.player2_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::MIN_DECK_SIZE;

    fn deck() -> Vec<Card> {
        vec![Card::with_quantity("Bulbasaur", "A1", "2", MIN_DECK_SIZE as u32)]
    }

    fn sample() -> Match {
        Match::new(
            MatchId::from("m1"),
            PlayerId::from("alice"),
            PlayerId::from("bob"),
            None,
            &deck(),
            vec!["grass".to_string()],
            &deck(),
            vec!["fire".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_new_match_expands_decks_and_seats_player1_first() {
        let m = sample();
        assert_eq!(m.game_state.player1.deck.len(), MIN_DECK_SIZE);
        assert!(m.game_state.player1.deck.iter().all(|c| c.quantity == 1));
        assert_eq!(m.current_player, PlayerId::from("alice"));
        assert_eq!(m.game_state.current_player, Some(PlayerId::from("alice")));
        assert_eq!(m.turn_number, 1);
        assert_eq!(m.status, MatchStatus::InProgress);
    }

    #[test]
    fn test_undersized_deck_refuses_match() {
        let short = vec![Card::with_quantity("Pikachu", "A1", "1", 3)];
        let result = Match::new(
            MatchId::from("m1"),
            PlayerId::from("alice"),
            PlayerId::from("bob"),
            None,
            &short,
            vec![],
            &deck(),
            vec![],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_seat_resolution_is_id_equality() {
        let m = sample();
        assert_eq!(m.seat_of(&PlayerId::from("alice")), Some(Seat::Player1));
        assert_eq!(m.seat_of(&PlayerId::from("bob")), Some(Seat::Player2));
        assert_eq!(m.seat_of(&PlayerId::from("mallory")), None);
    }

    #[test]
    fn test_status_wire_strings() {
        let json = serde_json::to_value(MatchStatus::InProgress).unwrap();
        assert_eq!(json, serde_json::json!("in-progress"));
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["currentPlayer"], "alice");
        assert!(json.get("gameState").is_some());
    }
}
