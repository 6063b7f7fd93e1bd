//! Deck list import for Tandem.
//!
//! Two pieces: [`parse_decklist`] turns pasted Limitless-style text into
//! structured [`Card`]s ready for `tandem_schema::expand_deck`, and
//! [`CardFetcher`] resolves card metadata (image, rarity, HP) from the
//! TCGdex API with an in-process cache.

mod fetch;
mod list;

pub use fetch::{CardData, CardFetcher, FetchError};
pub use list::parse_decklist;

pub use tandem_schema::Card;
