use tandem_schema::{DeckError, MatchId};
use tandem_store::StoreError;
use thiserror::Error;

use crate::events::Notice;

/// Closed taxonomy for every sync-engine operation.
///
/// Recovery policy per variant: `Unavailable` is queued and retried by
/// the action pipeline; `Rejected` is rolled back by the validator;
/// `Timeout` is retryable by the caller; everything else is surfaced via
/// [`notice_for`] — never retried, never dropped.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("transport unavailable")]
    Unavailable,

    #[error("permission denied")]
    PermissionDenied,

    #[error("not authenticated")]
    Unauthenticated,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("request timed out")]
    Timeout,

    #[error("action rejected: {reason}")]
    Rejected { reason: String },

    #[error("data integrity: {0}")]
    DataIntegrity(String),

    #[error("not a participant in match {0}")]
    NotInMatch(MatchId),

    #[error("no active session")]
    NoSession,

    #[error("not your turn")]
    NotYourTurn,

    #[error("already in the matchmaking queue")]
    AlreadyQueued,

    #[error("not in a room")]
    NotInRoom,

    #[error("room is not available")]
    RoomNotAvailable,

    #[error("room is not ready")]
    RoomNotReady,

    #[error("room is full")]
    RoomFull,

    #[error("already in this room")]
    AlreadyInRoom,

    #[error("no free room code after {0} attempts")]
    RoomCodeExhausted(u32),

    #[error("malformed record: {0}")]
    Corrupt(#[from] serde_json::Error),
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable => SyncError::Unavailable,
            StoreError::PermissionDenied(_) => SyncError::PermissionDenied,
            StoreError::Unauthenticated => SyncError::Unauthenticated,
            StoreError::NotFound(path) => SyncError::NotFound(path.to_string()),
            StoreError::AlreadyExists(path) => {
                SyncError::DataIntegrity(format!("value already exists at {path}"))
            }
            StoreError::Timeout => SyncError::Timeout,
            StoreError::Serialization(e) => SyncError::Corrupt(e),
        }
    }
}

impl From<DeckError> for SyncError {
    fn from(err: DeckError) -> Self {
        SyncError::DataIntegrity(err.to_string())
    }
}

/// The single dispatch point from an error to its user-facing notice.
///
/// Exhaustive on purpose: adding a variant to [`SyncError`] forces a
/// decision here about what the player sees.
pub fn notice_for(err: &SyncError) -> Notice {
    match err {
        SyncError::Unavailable | SyncError::Timeout => Notice::ActionNotSaved,
        SyncError::PermissionDenied => {
            Notice::Generic("You do not have permission for this action.".to_string())
        }
        SyncError::Unauthenticated => Notice::SignInRequired,
        SyncError::NotFound(_) | SyncError::NotInMatch(_) => Notice::ReturnToLobby,
        SyncError::Rejected { reason } => Notice::ActionRejected {
            reason: reason.clone(),
        },
        SyncError::NotYourTurn => Notice::NotYourTurn,
        SyncError::DataIntegrity(msg) => Notice::Generic(msg.clone()),
        SyncError::NoSession
        | SyncError::AlreadyQueued
        | SyncError::NotInRoom
        | SyncError::RoomNotAvailable
        | SyncError::RoomNotReady
        | SyncError::RoomFull
        | SyncError::AlreadyInRoom => Notice::Generic(err.to_string()),
        SyncError::RoomCodeExhausted(_) => Notice::Generic(err.to_string()),
        SyncError::Corrupt(_) => Notice::Generic("Game data is corrupted.".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_into_taxonomy() {
        let err: SyncError = StoreError::Unavailable.into();
        assert!(matches!(err, SyncError::Unavailable));
        let err: SyncError = StoreError::NotFound(tandem_schema::Path::new("rooms/r1")).into();
        assert!(matches!(err, SyncError::NotFound(_)));
    }

    #[test]
    fn test_rejection_notice_carries_reason() {
        let notice = notice_for(&SyncError::Rejected {
            reason: "Not your turn".to_string(),
        });
        assert_eq!(
            notice,
            Notice::ActionRejected {
                reason: "Not your turn".to_string()
            }
        );
    }

    #[test]
    fn test_not_found_returns_to_lobby() {
        assert_eq!(
            notice_for(&SyncError::NotFound("matches/m1".to_string())),
            Notice::ReturnToLobby
        );
    }
}
