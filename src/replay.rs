//! Recorded-session replay.
//!
//! A replay file holds evaluation cycles, each with the signals seen and the
//! price ticks that followed. The governor runs against it with paper
//! execution, and the resulting session statistics are returned.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;

use crate::api::{Notifier, PaperExecution, PriceFeed, SignalSource};
use crate::bot::{Collaborators, Governor};
use crate::metrics::SessionStats;
use crate::models::{Quote, Signal};
use crate::trading::GovernorConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayFile {
    pub cycles: Vec<ReplayCycle>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayCycle {
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub signals: Vec<Signal>,
    #[serde(default)]
    pub ticks: Vec<ReplayTick>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayTick {
    pub at: DateTime<Utc>,
    /// symbol -> price
    pub prices: HashMap<String, Decimal>,
}

impl ReplayFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse replay file {}", path.display()))
    }
}

#[derive(Default)]
struct FeedState {
    signals: Vec<Signal>,
    prices: HashMap<String, Decimal>,
    now: Option<DateTime<Utc>>,
}

/// Signal source and price feed backed by the replay file.
#[derive(Default)]
pub struct ReplayFeed {
    state: Mutex<FeedState>,
}

impl ReplayFeed {
    fn start_cycle(&self, cycle: &ReplayCycle) {
        let mut state = self.state.lock();
        state.now = Some(cycle.at);
        state.signals = cycle.signals.clone();
        // A signal's price is the latest known quote for its symbol
        for signal in &cycle.signals {
            state.prices.insert(signal.symbol.clone(), signal.price);
        }
    }

    fn apply_tick(&self, tick: &ReplayTick) {
        let mut state = self.state.lock();
        state.now = Some(tick.at);
        state
            .prices
            .extend(tick.prices.iter().map(|(s, p)| (s.clone(), *p)));
    }
}

#[async_trait]
impl SignalSource for ReplayFeed {
    async fn fetch_signals(&self, _symbols: &[String], _timeframes: &[String]) -> Result<Vec<Signal>> {
        Ok(std::mem::take(&mut self.state.lock().signals))
    }
}

#[async_trait]
impl PriceFeed for ReplayFeed {
    async fn quote(&self, symbol: &str) -> Result<Option<Quote>> {
        let state = self.state.lock();
        Ok(state.prices.get(symbol).map(|price| Quote {
            price: *price,
            atr: None,
            timestamp: state.now.unwrap_or_else(Utc::now),
        }))
    }
}

/// Run every cycle and tick of `file` through a fresh governor.
pub async fn run_replay(
    file: &ReplayFile,
    config: GovernorConfig,
    notifier: Arc<dyn Notifier>,
) -> Result<SessionStats> {
    let Some(first) = file.cycles.first() else {
        return Ok(SessionStats::default());
    };

    let feed = Arc::new(ReplayFeed::default());
    let collaborators = Collaborators {
        signals: feed.clone(),
        prices: feed.clone(),
        execution: Arc::new(PaperExecution::new()),
        notifier,
    };
    let governor = Governor::new(config, collaborators, first.at);

    for cycle in &file.cycles {
        feed.start_cycle(cycle);
        let report = governor.run_cycle(cycle.at).await?;
        info!(at = %cycle.at, opened = report.opened, "Replayed cycle");

        for tick in &cycle.ticks {
            feed.apply_tick(tick);
            governor.process_ticks(tick.at).await;
        }
    }

    let open = governor.open_positions();
    if !open.is_empty() {
        info!(open = open.len(), "Replay ended with positions still open");
    }
    Ok(governor.session_stats())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ChannelNotifier;
    use rust_decimal_macros::dec;

    const SESSION: &str = r#"{
        "cycles": [
            {
                "at": "2024-03-04T10:00:00Z",
                "signals": [
                    {
                        "symbol": "EURUSDm",
                        "raw_direction": "SELL",
                        "strength_score": 8.5,
                        "volume_score": 4.0,
                        "atr": "0.0010",
                        "price": "1.1000",
                        "timestamp": "2024-03-04T10:00:00Z",
                        "timeframe_confluence": "M5+M15"
                    }
                ],
                "ticks": [
                    { "at": "2024-03-04T10:05:00Z", "prices": { "EURUSDm": "1.1016" } },
                    { "at": "2024-03-04T10:10:00Z", "prices": { "EURUSDm": "1.0984" } }
                ]
            }
        ]
    }"#;

    #[tokio::test]
    async fn test_replay_session() {
        let file: ReplayFile = serde_json::from_str(SESSION).unwrap();
        let (notifier, _rx) = ChannelNotifier::channel();

        let stats = run_replay(&file, GovernorConfig::default(), Arc::new(notifier)).await.unwrap();

        // Buy 0.03 at 1.1000: half off at 1.1016 (+2.40), rest stopped at 1.0984 (-2.40)
        assert_eq!(stats.total_trades, 1);
        assert_eq!(stats.total_pnl, dec!(0));
    }

    #[tokio::test]
    async fn test_empty_replay() {
        let file: ReplayFile = serde_json::from_str(r#"{ "cycles": [] }"#).unwrap();
        let (notifier, _rx) = ChannelNotifier::channel();
        let stats = run_replay(&file, GovernorConfig::default(), Arc::new(notifier)).await.unwrap();
        assert_eq!(stats.total_trades, 0);
    }

    #[test]
    fn test_feed_prices_follow_ticks() {
        let file: ReplayFile = serde_json::from_str(SESSION).unwrap();
        let feed = ReplayFeed::default();
        feed.start_cycle(&file.cycles[0]);
        feed.apply_tick(&file.cycles[0].ticks[0]);

        let quote = tokio_test::block_on(feed.quote("EURUSDm")).unwrap().unwrap();
        assert_eq!(quote.price, dec!(1.1016));
        assert!(tokio_test::block_on(feed.quote("GBPUSDm")).unwrap().is_none());
    }
}
