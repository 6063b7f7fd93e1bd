//! Canonical record shapes for the Tandem replicated store.
//!
//! Every record a Tandem client reads or writes lives here: matches and
//! their nested game state, the append-only action log, lobby rooms, the
//! matchmaking queue, presence, and user profiles. Field names serialize
//! exactly as the store lays them out (camelCase keys, kebab-case status
//! strings, snake_case action tags), so records written by this crate are
//! byte-compatible with the live database.
//!
//! The one non-trivial invariant owned by this crate is deck expansion
//! ([`expand_deck`]): converting a quantity-bearing deck list into its
//! canonical one-entry-per-physical-card form, refusing decks that expand
//! below [`MIN_DECK_SIZE`].

pub mod action;
pub mod card;
pub mod game;
pub mod ids;
pub mod matches;
pub mod paths;
pub mod presence;
pub mod queue;
pub mod room;
pub mod timestamp;
pub mod user;

pub use action::{Action, ActionKind};
pub use card::{Card, DeckError, MIN_DECK_SIZE, expand_deck};
pub use game::{DiscardPile, GameState, PlayerField, PlayerState, Seat, TurnInfo};
pub use ids::{ActionId, MatchId, PlayerId, RoomId};
pub use matches::{Match, MatchStatus};
pub use paths::Path;
pub use presence::Presence;
pub use queue::{QueueEntry, QueueStatus};
pub use room::{ROOM_CODE_ALPHABET, ROOM_CODE_LEN, Room, RoomStatus};
pub use timestamp::Timestamp;
pub use user::UserProfile;
