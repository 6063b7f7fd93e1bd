use serde::{Deserialize, Serialize};

use crate::card::Card;
use crate::ids::{MatchId, PlayerId, RoomId};
use crate::timestamp::Timestamp;

/// Alphabet for human-shareable room codes. 0, O, 1, and I are excluded
/// because they are easy to misread over voice or screenshots.
pub const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub const ROOM_CODE_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoomStatus {
    /// Host is alone, waiting for a guest.
    Waiting,
    /// Both seats filled; the host can start the game.
    Ready,
    /// Promoted into a match (`match_id` set).
    InProgress,
}

/// A pre-match lobby created by one player and joined via a short code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub room_id: RoomId,
    pub host_id: PlayerId,
    pub player1_id: PlayerId,
    #[serde(default)]
    pub player2_id: Option<PlayerId>,
    pub status: RoomStatus,
    pub room_code: String,
    #[serde(default)]
    pub player1_deck: Option<Vec<Card>>,
    #[serde(default)]
    pub player1_energy: Vec<String>,
    #[serde(default)]
    pub player2_deck: Option<Vec<Card>>,
    #[serde(default)]
    pub player2_energy: Vec<String>,
    pub created_at: Timestamp,
    #[serde(default)]
    pub match_id: Option<MatchId>,
}

impl Room {
    pub fn new(
        room_id: RoomId,
        host_id: PlayerId,
        room_code: String,
        player1_deck: Option<Vec<Card>>,
        player1_energy: Vec<String>,
    ) -> Self {
        Self {
            room_id,
            player1_id: host_id.clone(),
            host_id,
            player2_id: None,
            status: RoomStatus::Waiting,
            room_code,
            player1_deck,
            player1_energy,
            player2_deck: None,
            player2_energy: Vec::new(),
            created_at: Timestamp::server(),
            match_id: None,
        }
    }

    pub fn is_member(&self, player: &PlayerId) -> bool {
        self.player1_id == *player || self.player2_id.as_ref() == Some(player)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alphabet_excludes_confusable_characters() {
        for c in [b'0', b'O', b'1', b'I'] {
            assert!(!ROOM_CODE_ALPHABET.contains(&c));
        }
        assert_eq!(ROOM_CODE_ALPHABET.len(), 32);
    }

    #[test]
    fn test_status_wire_strings() {
        assert_eq!(
            serde_json::to_value(RoomStatus::InProgress).unwrap(),
            serde_json::json!("in-progress")
        );
        assert_eq!(
            serde_json::to_value(RoomStatus::Waiting).unwrap(),
            serde_json::json!("waiting")
        );
    }

    #[test]
    fn test_new_room_is_waiting_and_hosted() {
        let room = Room::new(
            RoomId::from("r1"),
            PlayerId::from("alice"),
            "ABCDEF".to_string(),
            None,
            vec![],
        );
        assert_eq!(room.status, RoomStatus::Waiting);
        assert_eq!(room.player1_id, room.host_id);
        assert!(room.player2_id.is_none());
        assert!(room.is_member(&PlayerId::from("alice")));
        assert!(!room.is_member(&PlayerId::from("bob")));
    }
}
