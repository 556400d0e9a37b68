//! Collaborator boundary: signal source, price feed, execution sink, notifications.
//!
//! The governance core only talks to these traits. Blocking I/O lives behind
//! them and is never awaited while a ledger or position lock is held.

mod events;
mod gateway_client;
mod notifier;
mod paper;
mod types;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Fill, ModifyOrCloseIntent, OrderIntent, Quote, Signal};

pub use events::GovernanceEvent;
pub use gateway_client::GatewayClient;
pub use notifier::{ChannelNotifier, Notifier};
pub use paper::PaperExecution;

/// Produces one batch of scored signals per evaluation cycle.
#[async_trait]
pub trait SignalSource: Send + Sync {
    async fn fetch_signals(&self, symbols: &[String], timeframes: &[String]) -> Result<Vec<Signal>>;
}

/// Current price and ATR per symbol. `None` means no data right now.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn quote(&self, symbol: &str) -> Result<Option<Quote>>;
}

/// Places entries and applies exit instructions at the broker.
#[async_trait]
pub trait ExecutionSink: Send + Sync {
    async fn place_order(&self, order: &OrderIntent) -> Result<Fill>;

    async fn modify_or_close(&self, instruction: &ModifyOrCloseIntent) -> Result<Fill>;
}
