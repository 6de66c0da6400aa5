//! `GET /me` response parsing.

use serde::Deserialize;
use tracing::warn;

use floatsync_core::Trade;

use crate::error::MarketResult;

/// Raw `/me` payload. Account data under `user` is ignored.
#[derive(Debug, Deserialize)]
struct RawMeResponse {
    #[serde(default)]
    pending_offers: u32,
    #[serde(default)]
    trades_to_send: Vec<serde_json::Value>,
}

/// Snapshot entry rejected at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuarantinedEntry {
    /// Position in `trades_to_send`.
    pub index: usize,
    /// Trade id, if the entry had a readable one.
    pub trade_id: Option<String>,
    /// Parse or validation failure.
    pub reason: String,
}

/// One poll cycle's view of the marketplace queue.
#[derive(Debug, Clone, Default)]
pub struct TradesSnapshot {
    /// Well-formed trades, in marketplace order.
    pub trades: Vec<Trade>,
    /// Entries that failed to parse.
    pub quarantined: Vec<QuarantinedEntry>,
    /// Offers the marketplace believes are pending.
    pub pending_offers: u32,
}

impl TradesSnapshot {
    /// Snapshot made of well-formed trades only.
    pub fn from_trades(trades: Vec<Trade>) -> Self {
        Self {
            trades,
            ..Default::default()
        }
    }

    /// Parse a `/me` body, quarantining entries that are not valid trades.
    pub fn from_me_body(body: serde_json::Value) -> MarketResult<Self> {
        let raw: RawMeResponse = serde_json::from_value(body)?;

        let mut snapshot = Self {
            pending_offers: raw.pending_offers,
            ..Default::default()
        };

        for (index, entry) in raw.trades_to_send.into_iter().enumerate() {
            let trade_id = entry
                .get("id")
                .and_then(|v| v.as_str())
                .map(str::to_string);

            match Trade::from_value(entry) {
                Ok(trade) => snapshot.trades.push(trade),
                Err(e) => {
                    warn!(index, trade_id = ?trade_id, error = %e, "Quarantining trade entry");
                    snapshot.quarantined.push(QuarantinedEntry {
                        index,
                        trade_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn trade_json(id: &str, asset: &str) -> serde_json::Value {
        json!({
            "id": id,
            "created_at": "2024-03-01T12:00:00Z",
            "state": "queued",
            "contract": { "id": "c", "item": { "asset_id": asset } },
            "trade_url": "https://steamcommunity.com/tradeoffer/new/?partner=1&token=t"
        })
    }

    #[test]
    fn test_parse_me_body() {
        let body = json!({
            "pending_offers": 2,
            "user": { "steam_id": "7656", "balance": 100 },
            "trades_to_send": [trade_json("T1", "123"), trade_json("T2", "456")]
        });

        let snapshot = TradesSnapshot::from_me_body(body).unwrap();
        assert_eq!(snapshot.pending_offers, 2);
        assert_eq!(snapshot.trades.len(), 2);
        assert!(snapshot.quarantined.is_empty());
        assert_eq!(snapshot.trades[1].asset_id().as_str(), "456");
    }

    #[test]
    fn test_malformed_entries_are_quarantined() {
        let body = json!({
            "trades_to_send": [
                trade_json("T1", "123"),
                { "id": "T2", "state": "queued" },
                trade_json("T3", ""),
                42
            ]
        });

        let snapshot = TradesSnapshot::from_me_body(body).unwrap();
        assert_eq!(snapshot.trades.len(), 1);
        assert_eq!(snapshot.quarantined.len(), 3);
        assert_eq!(snapshot.quarantined[0].trade_id.as_deref(), Some("T2"));
        assert_eq!(snapshot.quarantined[1].index, 2);
        assert_eq!(snapshot.quarantined[2].trade_id, None);
    }

    #[test]
    fn test_missing_queue_is_empty() {
        let snapshot = TradesSnapshot::from_me_body(json!({ "user": {} })).unwrap();
        assert!(snapshot.trades.is_empty());
    }

    #[test]
    fn test_non_object_body_is_error() {
        assert!(TradesSnapshot::from_me_body(json!([1, 2])).is_err());
    }
}
