//! Identifiers on both sides of the bridge.
//!
//! Marketplace trade ids, trading-protocol offer ids, and asset ids all arrive
//! as opaque strings. They are kept as distinct newtypes so a trade id can never
//! be passed where an offer id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Marketplace trade identifier (registry key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TradeId(String);

impl TradeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TradeId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Trading-protocol offer identifier, assigned when an offer is sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OfferId(String);

impl OfferId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OfferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OfferId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Inventory asset identifier of the item being handed over.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AssetId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let id = TradeId::new("601113");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"601113\"");

        let offer: OfferId = serde_json::from_str("\"6150120593\"").unwrap();
        assert_eq!(offer.as_str(), "6150120593");
    }

    #[test]
    fn test_id_display() {
        assert_eq!(AssetId::from("123").to_string(), "123");
        assert_eq!(TradeId::from("T1").to_string(), "T1");
    }
}
