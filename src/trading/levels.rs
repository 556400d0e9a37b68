//! Stop/target placement: ATR multiples scaled by signal strength and trading session.

use chrono::{DateTime, Timelike, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::GovernanceError;
use crate::models::{Direction, ExitLevels, OrderIntent, TradeIntent};

use super::{
    ExitConfig, GovernorConfig, InstrumentSpec, MultiplierConfig, PositionSizer, SessionConfig,
};

/// Market session by UTC hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TradingSession {
    Asian,
    LondonPreMarket,
    London,
    LondonNyOverlap,
    NewYork,
    Quiet,
}

impl TradingSession {
    pub fn at(now: DateTime<Utc>) -> Self {
        match now.hour() {
            0..=5 => Self::Asian,
            6..=7 => Self::LondonPreMarket,
            8..=11 => Self::London,
            12..=15 => Self::LondonNyOverlap,
            16..=19 => Self::NewYork,
            _ => Self::Quiet,
        }
    }

    pub fn multiplier(&self, sessions: &SessionConfig) -> Decimal {
        match self {
            Self::Asian => sessions.asian,
            Self::LondonPreMarket | Self::London => sessions.london,
            Self::LondonNyOverlap => sessions.overlap,
            Self::NewYork => sessions.new_york,
            Self::Quiet => sessions.quiet,
        }
    }
}

/// Multiplier for a signal strength tier.
pub fn strength_multiplier(strength: f64, multipliers: &MultiplierConfig) -> Decimal {
    if strength >= 9.0 {
        multipliers.ultra
    } else if strength >= 8.0 {
        multipliers.strong
    } else if strength >= 7.0 {
        multipliers.standard
    } else {
        multipliers.weak
    }
}

/// Combined distance multiplier for a candidate, or 1 when multipliers are disabled.
pub fn distance_multiplier(
    strength: f64,
    now: DateTime<Utc>,
    multipliers: &MultiplierConfig,
    sessions: &SessionConfig,
) -> Decimal {
    if !multipliers.enabled {
        return Decimal::ONE;
    }
    strength_multiplier(strength, multipliers) * TradingSession::at(now).multiplier(sessions)
}

/// Compute stop, targets, and trail distance from an entry price.
///
/// Every distance is `atr * multiple * multiplier`; the multiplier never touches lot size.
pub fn exit_levels(
    direction: Direction,
    entry: Decimal,
    atr: Decimal,
    multiplier: Decimal,
    exits: &ExitConfig,
) -> ExitLevels {
    let unit = atr * multiplier;
    ExitLevels {
        stop: direction.adverse(entry, unit * exits.stop_atr),
        tp1: direction.favorable(entry, unit * exits.tp1_atr),
        tp2: direction.favorable(entry, unit * exits.tp2_atr),
        tp3: direction.favorable(entry, unit * exits.tp3_atr),
        trail_distance: unit * exits.trail_atr,
    }
}

/// A candidate with levels and size worked out, ready to become an order.
#[derive(Debug, Clone, Serialize)]
pub struct TradePlan {
    pub symbol: String,
    pub direction: Direction,
    pub strength_score: f64,
    pub entry_price: Decimal,
    pub atr: Decimal,
    pub distance_multiplier: Decimal,
    pub levels: ExitLevels,
    pub lot_size: Decimal,
    pub instrument: InstrumentSpec,
    /// Dollar loss if the initial stop is hit at `lot_size`
    pub risk_amount: Decimal,
}

impl TradePlan {
    /// Place levels for `intent` and size it to the fixed dollar risk.
    ///
    /// Fails when the stop distance is degenerate or the size rounds below the
    /// broker minimum; either way the candidate must be skipped.
    pub fn build(
        intent: &TradeIntent,
        now: DateTime<Utc>,
        config: &GovernorConfig,
    ) -> Result<Self, GovernanceError> {
        let multiplier = distance_multiplier(
            intent.strength_score,
            now,
            &config.multipliers,
            &config.sessions,
        );
        let entry = intent.entry_price_hint;
        let levels = exit_levels(intent.direction, entry, intent.atr, multiplier, &config.exits);
        let instrument = config.instruments.spec_for(&intent.symbol);
        let lot_size = PositionSizer::new(config.risk.fixed_risk_amount).size(
            entry,
            levels.stop,
            &instrument,
        )?;

        Ok(Self {
            symbol: intent.symbol.clone(),
            direction: intent.direction,
            strength_score: intent.strength_score,
            entry_price: entry,
            atr: intent.atr,
            distance_multiplier: multiplier,
            levels,
            lot_size,
            instrument,
            risk_amount: PositionSizer::risk_of(lot_size, entry, levels.stop, &instrument),
        })
    }

    pub fn order(&self) -> OrderIntent {
        OrderIntent {
            symbol: self.symbol.clone(),
            direction: self.direction,
            lot_size: self.lot_size,
            entry_price_hint: self.entry_price,
            stop_price: self.levels.stop,
            take_profit_prices: self.levels.take_profits(),
        }
    }
}
