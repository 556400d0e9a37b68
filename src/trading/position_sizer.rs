//! Fixed-dollar-risk position sizing.
//!
//! A stop-loss hit costs at most `fixed_risk_amount`. The raw size is rounded
//! down to the broker's lot step; rounding up would silently exceed the budget.

use rust_decimal::Decimal;

use crate::error::GovernanceError;

use super::InstrumentSpec;

/// Calculator for lot sizes.
#[derive(Debug, Clone)]
pub struct PositionSizer {
    fixed_risk_amount: Decimal,
}

impl PositionSizer {
    /// Create a new position sizer for a fixed dollar risk per trade.
    pub fn new(fixed_risk_amount: Decimal) -> Self {
        Self { fixed_risk_amount }
    }

    /// Lot size for the configured risk.
    pub fn size(
        &self,
        entry_price: Decimal,
        stop_price: Decimal,
        instrument: &InstrumentSpec,
    ) -> Result<Decimal, GovernanceError> {
        size_for_risk(self.fixed_risk_amount, entry_price, stop_price, instrument)
    }

    /// Dollar loss if `lot_size` is stopped out over the given distance.
    pub fn risk_of(
        lot_size: Decimal,
        entry_price: Decimal,
        stop_price: Decimal,
        instrument: &InstrumentSpec,
    ) -> Decimal {
        let pips = (entry_price - stop_price).abs() / instrument.pip_size;
        lot_size * pips * instrument.pip_value
    }
}

/// Size a trade so that hitting `stop_price` loses at most `fixed_risk_amount`.
///
/// lot = risk / (stop_distance_pips * pip_value), rounded down to the lot step.
fn size_for_risk(
    fixed_risk_amount: Decimal,
    entry_price: Decimal,
    stop_price: Decimal,
    instrument: &InstrumentSpec,
) -> Result<Decimal, GovernanceError> {
    let stop_distance = (entry_price - stop_price).abs();
    if stop_distance <= Decimal::ZERO || instrument.pip_size <= Decimal::ZERO {
        return Err(GovernanceError::InvalidStopDistance {
            entry: entry_price,
            stop: stop_price,
        });
    }

    let stop_pips = stop_distance / instrument.pip_size;
    let per_lot_risk = stop_pips * instrument.pip_value;
    if per_lot_risk <= Decimal::ZERO {
        return Err(GovernanceError::InvalidStopDistance {
            entry: entry_price,
            stop: stop_price,
        });
    }

    let raw = fixed_risk_amount / per_lot_risk;
    let mut lots = round_down_to_step(raw, instrument.lot_step);

    if let Some(max_lot) = instrument.max_lot {
        lots = lots.min(round_down_to_step(max_lot, instrument.lot_step));
    }

    if lots < instrument.min_lot || lots <= Decimal::ZERO {
        return Err(GovernanceError::SizeBelowMinimum {
            size: lots,
            minimum: instrument.min_lot,
        });
    }

    Ok(lots.normalize())
}

fn round_down_to_step(value: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    (value / step).floor() * step
}
