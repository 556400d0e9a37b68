//! Response types for the signal gateway API.

use rust_decimal::Decimal;
use serde::Deserialize;

/// Signal entry from the /signals endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalResponse {
    pub symbol: String,
    /// "BUY" or "SELL"
    pub direction: String,
    pub strength: f64,
    #[serde(default)]
    pub volume_score: f64,
    pub atr: Decimal,
    pub price: Decimal,
    /// Unix seconds
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub confluence: Vec<String>,
}

/// Quote from the /quote/{symbol} endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    #[serde(default)]
    pub bid: Option<Decimal>,
    #[serde(default)]
    pub ask: Option<Decimal>,
    #[serde(default)]
    pub last: Option<Decimal>,
    #[serde(default)]
    pub atr: Option<Decimal>,
    #[serde(default)]
    pub timestamp: i64,
}

impl QuoteResponse {
    /// Mid when both sides are present, otherwise the last trade.
    pub fn price(&self) -> Option<Decimal> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) if bid > Decimal::ZERO && ask > Decimal::ZERO => {
                Some((bid + ask) / Decimal::TWO)
            }
            _ => self.last.filter(|p| *p > Decimal::ZERO),
        }
    }
}
