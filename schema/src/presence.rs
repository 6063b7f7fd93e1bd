use serde::{Deserialize, Serialize};

use crate::ids::MatchId;
use crate::timestamp::Timestamp;

/// Per-player liveness record under `presence/{uid}`.
///
/// Written online at connect; the offline form is also registered as the
/// transport's last-will so an ungraceful disconnect flips it without
/// client help.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub online: bool,
    pub last_seen: Timestamp,
    #[serde(default)]
    pub match_id: Option<MatchId>,
}

impl Presence {
    pub fn online(match_id: Option<MatchId>) -> Self {
        Self {
            online: true,
            last_seen: Timestamp::server(),
            match_id,
        }
    }

    pub fn offline() -> Self {
        Self {
            online: false,
            last_seen: Timestamp::server(),
            match_id: None,
        }
    }
}
