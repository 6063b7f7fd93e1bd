use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum number of physical cards a legal deck expands to.
pub const MIN_DECK_SIZE: usize = 20;

/// One card reference in a deck, hand, or discard pile.
///
/// Canonical form carries `quantity: 1` and one entry per physical copy;
/// deck lists as entered by players are quantity-bearing and go through
/// [`expand_deck`] before they touch a match record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub name: String,
    pub set: String,
    /// Card number within the set. Older records wrote this field as
    /// `num`; the alias folds both spellings into the canonical name.
    #[serde(alias = "num")]
    pub number: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

impl Card {
    pub fn new(name: &str, set: &str, number: &str) -> Self {
        Self {
            name: name.to_string(),
            set: set.to_string(),
            number: number.to_string(),
            quantity: 1,
        }
    }

    pub fn with_quantity(name: &str, set: &str, number: &str, quantity: u32) -> Self {
        Self {
            quantity,
            ..Self::new(name, set, number)
        }
    }

    fn is_well_formed(&self) -> bool {
        !self.name.is_empty() && !self.set.is_empty() && !self.number.is_empty()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeckError {
    #[error("deck expands to {got} cards, at least {MIN_DECK_SIZE} required")]
    TooSmall { got: usize },
}

/// Expand a quantity-bearing deck into one entry per physical card.
///
/// Entries missing a name, set, or number are skipped; a quantity of zero
/// counts as one. The result always carries `quantity: 1` on every entry,
/// which makes expansion idempotent: feeding an already-expanded deck back
/// in returns it unchanged.
///
/// A deck that expands below [`MIN_DECK_SIZE`] is a data-integrity defect
/// and is refused rather than silently accepted.
pub fn expand_deck(raw: &[Card]) -> Result<Vec<Card>, DeckError> {
    let mut out = Vec::new();
    for card in raw {
        if !card.is_well_formed() {
            continue;
        }
        let copies = card.quantity.max(1);
        for _ in 0..copies {
            out.push(Card {
                quantity: 1,
                ..card.clone()
            });
        }
    }

    if out.len() < MIN_DECK_SIZE {
        return Err(DeckError::TooSmall { got: out.len() });
    }
    Ok(out)
}
