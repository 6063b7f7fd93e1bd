use serde::{Deserialize, Serialize};

use crate::card::Card;
use crate::ids::PlayerId;
use crate::timestamp::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Waiting,
    Matched,
}

/// One waiting player in the matchmaking queue, keyed by user id under
/// `matchmaking/queue/{uid}`. The chosen loadout travels with the entry
/// so the pairing winner can build the match without another read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub user_id: PlayerId,
    /// Lifetime wins minus losses at the moment of queueing.
    pub skill_level: i64,
    #[serde(default)]
    pub deck: Vec<Card>,
    #[serde(default)]
    pub energy: Vec<String>,
    pub joined_at: Timestamp,
    pub status: QueueStatus,
}

impl QueueEntry {
    pub fn new(user_id: PlayerId, skill_level: i64, deck: Vec<Card>, energy: Vec<String>) -> Self {
        Self {
            user_id,
            skill_level,
            deck,
            energy,
            joined_at: Timestamp::server(),
            status: QueueStatus::Waiting,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_wire_shape() {
        let entry = QueueEntry::new(PlayerId::from("alice"), -3, vec![], vec!["water".into()]);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["userId"], "alice");
        assert_eq!(json["skillLevel"], -3);
        assert_eq!(json["status"], "waiting");
        assert_eq!(json["joinedAt"], serde_json::json!({ ".sv": "timestamp" }));
    }
}
