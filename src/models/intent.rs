//! Intents flowing from the governance core to the execution collaborator.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Direction, PositionId};

/// A directed candidate awaiting admission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeIntent {
    pub symbol: String,
    pub direction: Direction,
    pub strength_score: f64,
    pub volume_score: f64,
    pub entry_price_hint: Decimal,
    pub atr: Decimal,

    /// Position in the ranked candidate list (0 = best); set during admission
    #[serde(default)]
    pub priority_rank: usize,

    /// Strength at or above the priority threshold
    #[serde(default)]
    pub priority: bool,
}

/// A sized order for the execution sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderIntent {
    pub symbol: String,
    pub direction: Direction,
    pub lot_size: Decimal,
    pub entry_price_hint: Decimal,
    pub stop_price: Decimal,
    pub take_profit_prices: [Decimal; 3],
}

/// What to do with an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitAction {
    /// Close part of the position
    ClosePartial,
    /// Close everything that remains
    CloseAll,
    /// Move the protective stop only
    ModifyStop,
}

/// Instruction for an open position, emitted by the exit state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifyOrCloseIntent {
    pub position_id: PositionId,
    pub symbol: String,
    pub action: ExitAction,

    /// Fraction of the original size to close (zero for stop modifications)
    pub fraction: Decimal,

    /// Lots to close, derived from `fraction`
    pub lots: Decimal,

    /// New protective stop, if this instruction moves it
    pub new_stop: Option<Decimal>,

    /// Price of the tick that triggered the instruction
    pub reference_price: Decimal,
}

/// Fill confirmation returned by the execution sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: String,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Current price and volatility for a symbol.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Quote {
    pub price: Decimal,
    #[serde(default)]
    pub atr: Option<Decimal>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}
