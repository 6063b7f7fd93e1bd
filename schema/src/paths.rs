//! The store's path layout, in one place.
//!
//! ```text
//! users/{uid}/profile
//! users/{uid}/activeMatch
//! rooms/{roomId}
//! matches/{matchId}/gameState
//! matches/{matchId}/actions        (append-only)
//! matchmaking/queue/{uid}
//! presence/{uid}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::{MatchId, PlayerId, RoomId};

/// A slash-separated location in the replicated store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(String);

impl Path {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn child(&self, segment: &str) -> Path {
        Path(format!("{}/{}", self.0, segment))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Whether `self` is `other` or a descendant of it.
    pub fn starts_with(&self, other: &Path) -> bool {
        let mut mine = self.segments();
        for theirs in other.segments() {
            if mine.next() != Some(theirs) {
                return false;
            }
        }
        true
    }

    /// Whether `self` is a direct child of `other`.
    pub fn is_child_of(&self, other: &Path) -> bool {
        self.starts_with(other) && self.segments().count() == other.segments().count() + 1
    }

    pub fn leaf(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn user(uid: &PlayerId) -> Path {
    Path(format!("users/{uid}"))
}

pub fn user_profile(uid: &PlayerId) -> Path {
    Path(format!("users/{uid}/profile"))
}

pub fn user_active_match(uid: &PlayerId) -> Path {
    Path(format!("users/{uid}/activeMatch"))
}

pub fn rooms() -> Path {
    Path("rooms".to_string())
}

pub fn room(room_id: &RoomId) -> Path {
    Path(format!("rooms/{room_id}"))
}

pub fn matches() -> Path {
    Path("matches".to_string())
}

pub fn match_root(match_id: &MatchId) -> Path {
    Path(format!("matches/{match_id}"))
}

pub fn match_state(match_id: &MatchId) -> Path {
    Path(format!("matches/{match_id}/gameState"))
}

pub fn match_actions(match_id: &MatchId) -> Path {
    Path(format!("matches/{match_id}/actions"))
}

pub fn queue() -> Path {
    Path("matchmaking/queue".to_string())
}

pub fn queue_user(uid: &PlayerId) -> Path {
    Path(format!("matchmaking/queue/{uid}"))
}

pub fn presence(uid: &PlayerId) -> Path {
    Path(format!("presence/{uid}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let uid = PlayerId::from("alice");
        assert_eq!(user_profile(&uid).as_str(), "users/alice/profile");
        assert_eq!(user_active_match(&uid).as_str(), "users/alice/activeMatch");
        assert_eq!(queue_user(&uid).as_str(), "matchmaking/queue/alice");
        let mid = MatchId::from("m1");
        assert_eq!(match_state(&mid).as_str(), "matches/m1/gameState");
        assert_eq!(match_actions(&mid).as_str(), "matches/m1/actions");
    }

    #[test]
    fn test_prefix_relations() {
        let root = match_root(&MatchId::from("m1"));
        let state = match_state(&MatchId::from("m1"));
        assert!(state.starts_with(&root));
        assert!(!root.starts_with(&state));
        assert!(state.is_child_of(&root));
        assert!(!state.is_child_of(&matches()));
        // Segment-wise, not string-prefix-wise.
        assert!(!Path::new("matches/m10").starts_with(&Path::new("matches/m1")));
    }

    #[test]
    fn test_leaf() {
        assert_eq!(match_actions(&MatchId::from("m1")).leaf(), "actions");
        assert_eq!(Path::new("rooms").leaf(), "rooms");
    }
}
