use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use serde_json::Value;
use tandem_schema::Card;
use thiserror::Error;

const DEFAULT_BASE_URL: &str = "https://api.tcgdex.net/v2/en";

/// The Pocket series id on TCGdex; only its sets are playable here.
const POCKET_SERIES: &str = "tcgp";

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("card index request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected card index payload")]
    BadIndex,
}

/// Card metadata as the UI wants it. `missing` marks cards the API does
/// not know (or that fall outside the Pocket series) — callers render a
/// placeholder instead of failing the whole deck.
#[derive(Debug, Clone, PartialEq)]
pub struct CardData {
    pub card: Card,
    pub image: String,
    pub rarity: String,
    pub hp: Option<u32>,
    pub card_type: String,
    pub missing: bool,
}

impl CardData {
    fn missing(card: &Card) -> Self {
        Self {
            card: card.clone(),
            image: String::new(),
            rarity: String::new(),
            hp: None,
            card_type: String::new(),
            missing: true,
        }
    }

    /// Build from a TCGdex card response. The API's name wins over the
    /// pasted one when present.
    fn from_response(card: &Card, body: &Value) -> Self {
        let mut card = card.clone();
        if let Some(name) = body.get("name").and_then(Value::as_str) {
            card.name = name.to_string();
        }
        let image = body
            .get("image")
            .and_then(Value::as_str)
            .map(|base| format!("{base}/high.png"))
            .unwrap_or_default();
        Self {
            card,
            image,
            rarity: body
                .get("rarity")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            hp: body.get("hp").and_then(Value::as_u64).map(|hp| hp as u32),
            card_type: body
                .get("category")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            missing: false,
        }
    }
}

/// TCGdex lookups with an in-process cache keyed `SET-NUMBER`.
pub struct CardFetcher {
    client: reqwest::Client,
    base_url: String,
    sets: Mutex<HashSet<String>>,
    cache: Mutex<HashMap<String, CardData>>,
}

impl CardFetcher {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            sets: Mutex::new(HashSet::new()),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Load the Pocket set index once; repeated calls are no-ops.
    pub async fn load_sets(&self) -> Result<(), FetchError> {
        if !self.sets_loaded() {
            let url = format!("{}/series/{POCKET_SERIES}", self.base_url);
            let body: Value = self.client.get(&url).send().await?.json().await?;
            let ids = body
                .get("sets")
                .and_then(Value::as_array)
                .ok_or(FetchError::BadIndex)?
                .iter()
                .filter_map(|set| set.get("id").and_then(Value::as_str))
                .map(str::to_string);
            self.lock_sets().extend(ids);
        }
        Ok(())
    }

    /// Fetch one card's metadata. Cards outside the Pocket series and
    /// cards the API does not know come back marked `missing` rather
    /// than as errors.
    pub async fn fetch(&self, card: &Card) -> Result<CardData, FetchError> {
        self.load_sets().await?;

        if !self.lock_sets().contains(&card.set) {
            return Ok(CardData::missing(card));
        }

        let key = format!("{}-{}", card.set, card.number);
        if let Some(hit) = self.lock_cache().get(&key) {
            return Ok(hit.clone());
        }

        let url = format!("{}/sets/{}/{}", self.base_url, card.set, card.number);
        let data = match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => match response.json::<Value>().await
            {
                Ok(body) => CardData::from_response(card, &body),
                Err(_) => CardData::missing(card),
            },
            _ => CardData::missing(card),
        };

        if !data.missing {
            self.lock_cache().insert(key, data.clone());
        }
        Ok(data)
    }

    /// Seed the set index directly; lets embedders (and tests) skip the
    /// network round trip.
    pub fn prime_sets<I: IntoIterator<Item = String>>(&self, ids: I) {
        self.lock_sets().extend(ids);
    }

    fn sets_loaded(&self) -> bool {
        !self.lock_sets().is_empty()
    }

    fn lock_sets(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.sets.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<String, CardData>> {
        self.cache.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for CardFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_response_prefers_api_fields() {
        let card = Card::new("pikachu", "A1", "96");
        let body = json!({
            "name": "Pikachu ex",
            "image": "https://assets.tcgdex.net/en/tcgp/A1/096",
            "rarity": "Double Rare",
            "hp": 120,
            "category": "Pokemon",
        });
        let data = CardData::from_response(&card, &body);
        assert_eq!(data.card.name, "Pikachu ex");
        assert_eq!(data.image, "https://assets.tcgdex.net/en/tcgp/A1/096/high.png");
        assert_eq!(data.hp, Some(120));
        assert_eq!(data.card_type, "Pokemon");
        assert!(!data.missing);
    }

    #[test]
    fn test_from_response_tolerates_sparse_payloads() {
        let card = Card::new("Pikachu", "A1", "96");
        let data = CardData::from_response(&card, &json!({}));
        assert_eq!(data.card.name, "Pikachu");
        assert!(data.image.is_empty());
        assert_eq!(data.hp, None);
    }

    #[tokio::test]
    async fn test_cards_outside_the_pocket_series_are_marked_missing() {
        let fetcher = CardFetcher::with_base_url("http://localhost:0");
        fetcher.prime_sets(["A1".to_string()]);

        let data = fetcher
            .fetch(&Card::new("Charizard", "swsh3", "20"))
            .await
            .unwrap();
        assert!(data.missing);
        assert!(data.image.is_empty());
    }
}
