use serde::{Deserialize, Serialize};

/// Sentinel key the store recognizes in written values.
pub const SERVER_VALUE_KEY: &str = ".sv";

/// A server-assigned timestamp.
///
/// Writers carry [`Timestamp::server`], which serializes to the store's
/// `{".sv":"timestamp"}` placeholder and is resolved against the store
/// clock at write time. Reads always observe a resolved `At` value in
/// epoch milliseconds. Code must never assume a numeric value is
/// available synchronously after a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    At(u64),
    Sentinel(ServerValue),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerValue {
    #[serde(rename = ".sv")]
    pub kind: String,
}

impl Timestamp {
    /// The to-be-resolved sentinel.
    pub fn server() -> Self {
        Timestamp::Sentinel(ServerValue {
            kind: "timestamp".to_string(),
        })
    }

    /// Resolved milliseconds, or `None` for a sentinel that has not been
    /// through a store write yet.
    pub fn millis(&self) -> Option<u64> {
        match self {
            Timestamp::At(ms) => Some(*ms),
            Timestamp::Sentinel(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_wire_form() {
        let json = serde_json::to_value(Timestamp::server()).unwrap();
        assert_eq!(json, serde_json::json!({ ".sv": "timestamp" }));
    }

    #[test]
    fn test_resolved_roundtrip() {
        let ts: Timestamp = serde_json::from_value(serde_json::json!(1700000000123u64)).unwrap();
        assert_eq!(ts, Timestamp::At(1700000000123));
        assert_eq!(ts.millis(), Some(1700000000123));
    }

    #[test]
    fn test_sentinel_has_no_millis() {
        assert_eq!(Timestamp::server().millis(), None);
    }
}
