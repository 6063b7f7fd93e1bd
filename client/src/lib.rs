//! Sync engine for a two-player card game over a shared replicated store.
//!
//! Two clients that do not trust each other keep divergent optimistic
//! views of one match consistent with a single authoritative remote copy
//! — without a central server process in the loop for every move.
//!
//! ```text
//! tandem-schema (record shapes)      tandem-store (transport seam)
//!        │                                  │
//!        └───────────────┬──────────────────┘
//!                        ▼
//!               tandem-client ← THIS CRATE
//!        ┌───────────────┼────────────────────┐
//!        ▼               ▼                    ▼
//!   SyncSession     ActionPipeline        Matchmaking / Lobby
//!   StateMirror     Validator (rollback)  (pre-match pairing)
//!                   TurnArbiter
//! ```
//!
//! # Main types
//!
//! - [`SyncSession`] — lifecycle of one live match connection: seat
//!   resolution, the four subscriptions (state, actions, presence,
//!   connectivity), reconnection with backoff.
//! - [`StateMirror`] — the in-process snapshot of the match's game
//!   state, with in-flight preservation of locally-written paths.
//! - [`ActionPipeline`] — broadcast/queue/retry for the append-only
//!   action log.
//! - [`Validator`] — optimistic execution with typed snapshot/rollback;
//!   the cloud validation collaborator confirms or rejects through
//!   [`Validator::handle_validated`] / [`Validator::handle_rejection`].
//! - [`TurnArbiter`] — server-authoritative turn checks, performed
//!   before any optimistic mutation.
//! - [`Matchmaking`] / [`Lobby`] — the two paths that pair players into
//!   a match.
//!
//! Every component reports user-facing conditions through a shared
//! [`NoticeSink`] and typed [`SyncError`]s; nothing is surfaced as a
//! bare string and no failure path is silent.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod error;
pub mod events;
pub mod lobby;
pub mod matchmaking;
pub mod mirror;
pub mod pipeline;
pub mod session;
pub mod turn;
pub mod validator;


pub use error::{SyncError, notice_for};
pub use events::{Notice, NoticeSink, SessionEvent};
pub use lobby::{Lobby, ROOM_CODE_ATTEMPTS};
pub use matchmaking::{Matchmaking, MatchmakingEvent};
pub use mirror::{PlayerStateUpdate, StateMirror, SubscriptionId, TurnInfoUpdate};
pub use pipeline::{ActionPipeline, BroadcastOutcome};
pub use session::{MAX_RECONNECT_ATTEMPTS, RECONNECT_DELAY_STEP, SessionState, SyncSession};
pub use turn::TurnArbiter;
pub use validator::{ActionOutcome, LocalState, PENDING_TTL, StateSnapshot, Validator};

/// Lock a mutex, tolerating poisoning: an earlier panic in a listener
/// must not take the whole client down with it.
pub(crate) fn relock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
