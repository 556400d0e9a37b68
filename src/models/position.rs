//! Open position owned by the governance core.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Direction;

/// Arena key for positions.
pub type PositionId = u64;

/// Highest take-profit tier reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TpStage {
    None,
    Tp1Hit,
    Tp2Hit,
    Tp3Hit,
}

/// Exit state machine states, ordered by progression.
///
/// `StoppedOut` and `Tp3Hit` are both immediately followed by `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitState {
    OpenNoTp,
    Tp1Hit,
    Tp2Hit,
    Tp3Hit,
    StoppedOut,
    Closed,
}

impl ExitState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExitState::Closed)
    }
}

/// Stop and target prices for a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitLevels {
    pub stop: Decimal,
    pub tp1: Decimal,
    pub tp2: Decimal,
    pub tp3: Decimal,
    /// Distance kept between price and the trailing stop
    pub trail_distance: Decimal,
}

impl ExitLevels {
    pub fn take_profits(&self) -> [Decimal; 3] {
        [self.tp1, self.tp2, self.tp3]
    }
}

/// An open position and its exit progression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub initial_stop_price: Decimal,
    pub atr_at_entry: Decimal,

    /// Strength x session multiplier applied to every stop/target distance
    pub distance_multiplier: Decimal,

    /// Lots filled at entry
    pub lot_size: Decimal,

    /// Dollar value of one pip for one lot
    pub pip_value: Decimal,

    /// Price increment of one pip
    pub pip_size: Decimal,

    /// Dollar risk reserved in the ledger for this position
    pub risk_amount: Decimal,

    pub levels: ExitLevels,

    /// Fraction of the original size still open, in (0, 1]
    pub remaining_size_fraction: Decimal,

    pub tp_stage: TpStage,
    pub state: ExitState,

    /// Protective stop currently in force
    pub current_stop: Decimal,

    pub trailing_active: bool,
    pub trailing_stop_price: Option<Decimal>,

    /// P&L realized so far by partial closes
    pub realized_pnl: Decimal,

    /// Broker order id of the entry
    pub order_id: String,

    pub opened_at: DateTime<Utc>,
}

impl Position {
    /// P&L in dollars of closing `fraction` of the original size at `price`.
    pub fn pnl_for(&self, price: Decimal, fraction: Decimal) -> Decimal {
        if self.pip_size.is_zero() {
            return Decimal::ZERO;
        }
        let pips = (price - self.entry_price) * self.direction.sign() / self.pip_size;
        pips * self.pip_value * self.lot_size * fraction
    }

    /// Open P&L of the remaining size at `price`.
    pub fn unrealized_at(&self, price: Decimal) -> Decimal {
        self.pnl_for(price, self.remaining_size_fraction)
    }

    /// Lots corresponding to a fraction of the original size.
    pub fn lots_for(&self, fraction: Decimal) -> Decimal {
        self.lot_size * fraction
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_terminal() || self.remaining_size_fraction <= Decimal::ZERO
    }
}
