use serde::{Deserialize, Serialize};

use crate::ids::PlayerId;
use crate::timestamp::Timestamp;

/// Account profile under `users/{uid}/profile`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: PlayerId,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub losses: u32,
    pub created_at: Timestamp,
}

impl UserProfile {
    /// Matchmaking skill score: lifetime wins minus losses.
    pub fn skill_level(&self) -> i64 {
        i64::from(self.wins) - i64::from(self.losses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skill_level_can_go_negative() {
        let profile: UserProfile = serde_json::from_value(serde_json::json!({
            "uid": "alice",
            "wins": 2,
            "losses": 7,
            "createdAt": 1700000000000u64,
        }))
        .unwrap();
        assert_eq!(profile.skill_level(), -5);
    }
}
