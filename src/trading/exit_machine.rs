//! Exit state machine: stop loss, three take-profit tiers and a trailing stop.
//!
//! Positions only move forward through `ExitState`; the stop only tightens.
//! Every close is booked in the risk ledger in proportion to the fraction closed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

use crate::models::{
    ExitAction, ExitState, Fill, ModifyOrCloseIntent, Position, PositionId, TpStage,
};

use super::{exit_levels, CloseRelease, ExitConfig, RiskLedger, TradePlan};

/// What drove an exit step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    TakeProfit1,
    TakeProfit2,
    TakeProfit3,
    StopLoss,
    TrailingStop,
    /// Trailing stop moved without a state change
    TrailRatchet,
    /// Strong opposing signal
    Reversal,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::TakeProfit1 => "tp1",
            ExitReason::TakeProfit2 => "tp2",
            ExitReason::TakeProfit3 => "tp3",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TrailingStop => "trailing_stop",
            ExitReason::TrailRatchet => "trail_ratchet",
            ExitReason::Reversal => "reversal",
        }
    }
}

/// One step taken by the state machine, with its instruction for the execution sink.
#[derive(Debug, Clone, Serialize)]
pub struct ExitTransition {
    pub from: ExitState,
    pub to: ExitState,
    pub reason: ExitReason,
    pub price: Decimal,
    pub instruction: ModifyOrCloseIntent,
    /// P&L realized by this step
    pub realized_pnl: Decimal,
}

impl ExitTransition {
    pub fn closes_position(&self) -> bool {
        self.instruction.action == ExitAction::CloseAll
    }
}

/// Drives positions through their exits and books closes in the ledger.
#[derive(Debug, Clone)]
pub struct ExitStateMachine {
    config: ExitConfig,
    ledger: Arc<RiskLedger>,
}

impl ExitStateMachine {
    pub fn new(config: ExitConfig, ledger: Arc<RiskLedger>) -> Self {
        Self { config, ledger }
    }

    /// Create the position for a filled plan.
    ///
    /// Levels are re-anchored on the fill price with the plan's distances.
    pub fn open_position(
        &self,
        id: PositionId,
        plan: &TradePlan,
        fill: &Fill,
        reserved_risk: Decimal,
    ) -> Position {
        let levels = exit_levels(
            plan.direction,
            fill.price,
            plan.atr,
            plan.distance_multiplier,
            &self.config,
        );

        Position {
            id,
            symbol: plan.symbol.clone(),
            direction: plan.direction,
            entry_price: fill.price,
            initial_stop_price: levels.stop,
            atr_at_entry: plan.atr,
            distance_multiplier: plan.distance_multiplier,
            lot_size: plan.lot_size,
            pip_value: plan.instrument.pip_value,
            pip_size: plan.instrument.pip_size,
            risk_amount: reserved_risk,
            levels,
            remaining_size_fraction: Decimal::ONE,
            tp_stage: TpStage::None,
            state: ExitState::OpenNoTp,
            current_stop: levels.stop,
            trailing_active: false,
            trailing_stop_price: None,
            realized_pnl: Decimal::ZERO,
            order_id: fill.order_id.clone(),
            opened_at: fill.timestamp,
        }
    }

    /// Evaluate a price tick against the position's stop and targets.
    pub fn on_price(&self, position: &mut Position, price: Decimal) -> Vec<ExitTransition> {
        let mut transitions = Vec::new();
        if position.is_closed() {
            return transitions;
        }

        let direction = position.direction;

        if direction.stopped(price, position.current_stop) {
            let reason = if position.trailing_active {
                ExitReason::TrailingStop
            } else {
                ExitReason::StopLoss
            };
            transitions.push(self.close_remaining(position, price, reason, ExitState::StoppedOut));
            return transitions;
        }

        if position.tp_stage < TpStage::Tp1Hit && direction.reached(price, position.levels.tp1) {
            transitions.push(self.take_tp1(position, price));
        }

        if position.tp_stage == TpStage::Tp1Hit && direction.reached(price, position.levels.tp2) {
            transitions.push(self.take_tp2(position, price));
        }

        if position.tp_stage == TpStage::Tp2Hit && direction.reached(price, position.levels.tp3) {
            transitions.push(self.close_remaining(
                position,
                price,
                ExitReason::TakeProfit3,
                ExitState::Tp3Hit,
            ));
            return transitions;
        }

        if let Some(ratchet) = self.ratchet_trailing(position, price) {
            transitions.push(ratchet);
        }

        self.ledger.mark_unrealized(position.id, position.unrealized_at(price));
        transitions
    }

    /// Close whatever remains of a position outside the normal ladder.
    pub fn force_close(
        &self,
        position: &mut Position,
        price: Decimal,
        reason: ExitReason,
    ) -> Option<ExitTransition> {
        if position.is_closed() {
            return None;
        }
        Some(self.close_remaining(position, price, reason, ExitState::Closed))
    }

    fn take_tp1(&self, position: &mut Position, price: Decimal) -> ExitTransition {
        let from = position.state;
        let fraction = position.remaining_size_fraction * self.config.tp1_close_of_remaining;

        let mut new_stop = None;
        if self.config.breakeven_after_tp1
            && position.direction.tightens(position.entry_price, position.current_stop)
        {
            position.current_stop = position.entry_price;
            new_stop = Some(position.entry_price);
        }

        position.tp_stage = TpStage::Tp1Hit;
        position.state = ExitState::Tp1Hit;
        self.ledger.mark_symbol_succeeded(&position.symbol);

        self.book_partial(position, from, price, fraction, ExitReason::TakeProfit1, new_stop)
    }

    fn take_tp2(&self, position: &mut Position, price: Decimal) -> ExitTransition {
        let from = position.state;
        let fraction = self
            .config
            .tp2_close_of_original
            .min(position.remaining_size_fraction);

        let candidate = position.direction.adverse(price, position.levels.trail_distance);
        let mut new_stop = None;
        if position.direction.tightens(candidate, position.current_stop) {
            position.current_stop = candidate;
            new_stop = Some(candidate);
        }
        position.trailing_active = true;
        position.trailing_stop_price = Some(position.current_stop);

        position.tp_stage = TpStage::Tp2Hit;
        position.state = ExitState::Tp2Hit;

        self.book_partial(position, from, price, fraction, ExitReason::TakeProfit2, new_stop)
    }

    fn ratchet_trailing(&self, position: &mut Position, price: Decimal) -> Option<ExitTransition> {
        if !position.trailing_active {
            return None;
        }
        let candidate = position.direction.adverse(price, position.levels.trail_distance);
        if !position.direction.tightens(candidate, position.current_stop) {
            return None;
        }

        debug!(
            position_id = position.id,
            symbol = %position.symbol,
            old_stop = %position.current_stop,
            new_stop = %candidate,
            "Trailing stop ratcheted"
        );
        position.current_stop = candidate;
        position.trailing_stop_price = Some(candidate);

        Some(ExitTransition {
            from: position.state,
            to: position.state,
            reason: ExitReason::TrailRatchet,
            price,
            instruction: ModifyOrCloseIntent {
                position_id: position.id,
                symbol: position.symbol.clone(),
                action: ExitAction::ModifyStop,
                fraction: Decimal::ZERO,
                lots: Decimal::ZERO,
                new_stop: Some(candidate),
                reference_price: price,
            },
            realized_pnl: Decimal::ZERO,
        })
    }

    fn book_partial(
        &self,
        position: &mut Position,
        from: ExitState,
        price: Decimal,
        fraction: Decimal,
        reason: ExitReason,
        new_stop: Option<Decimal>,
    ) -> ExitTransition {
        let realized = position.pnl_for(price, fraction);
        position.remaining_size_fraction -= fraction;
        position.realized_pnl += realized;

        self.ledger.release_on_close(&CloseRelease {
            position_id: position.id,
            symbol: position.symbol.clone(),
            realized_pnl: realized,
            risk_released: position.risk_amount * fraction,
            unrealized_after: position.unrealized_at(price),
            position_closed: false,
            trade_pnl: None,
        });

        info!(
            position_id = position.id,
            symbol = %position.symbol,
            reason = reason.as_str(),
            price = %price,
            fraction = %fraction,
            pnl = %realized,
            remaining = %position.remaining_size_fraction,
            "Partial close"
        );

        ExitTransition {
            from,
            to: position.state,
            reason,
            price,
            instruction: ModifyOrCloseIntent {
                position_id: position.id,
                symbol: position.symbol.clone(),
                action: ExitAction::ClosePartial,
                fraction,
                lots: position.lots_for(fraction),
                new_stop,
                reference_price: price,
            },
            realized_pnl: realized,
        }
    }

    fn close_remaining(
        &self,
        position: &mut Position,
        price: Decimal,
        reason: ExitReason,
        to: ExitState,
    ) -> ExitTransition {
        let from = position.state;
        let fraction = position.remaining_size_fraction;
        let realized = position.pnl_for(price, fraction);

        position.remaining_size_fraction = Decimal::ZERO;
        position.realized_pnl += realized;
        if to == ExitState::Tp3Hit {
            position.tp_stage = TpStage::Tp3Hit;
        }
        // TP3_HIT and STOPPED_OUT are both followed immediately by CLOSED
        position.state = ExitState::Closed;

        self.ledger.release_on_close(&CloseRelease {
            position_id: position.id,
            symbol: position.symbol.clone(),
            realized_pnl: realized,
            risk_released: position.risk_amount * fraction,
            unrealized_after: Decimal::ZERO,
            position_closed: true,
            trade_pnl: Some(position.realized_pnl),
        });

        info!(
            position_id = position.id,
            symbol = %position.symbol,
            reason = reason.as_str(),
            price = %price,
            pnl = %realized,
            trade_pnl = %position.realized_pnl,
            "Position closed"
        );

        ExitTransition {
            from,
            to,
            reason,
            price,
            instruction: ModifyOrCloseIntent {
                position_id: position.id,
                symbol: position.symbol.clone(),
                action: ExitAction::CloseAll,
                fraction,
                lots: position.lots_for(fraction),
                new_stop: None,
                reference_price: price,
            },
            realized_pnl: realized,
        }
    }
}

/// Age of a position at `now`, for logging.
pub fn holding_minutes(position: &Position, now: DateTime<Utc>) -> i64 {
    (now - position.opened_at).num_minutes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Direction;
    use crate::trading::{InstrumentConfig, RiskConfig};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn setup(config: ExitConfig) -> (ExitStateMachine, Arc<RiskLedger>) {
        let ledger = Arc::new(RiskLedger::new(RiskConfig::default(), Utc::now()));
        (ExitStateMachine::new(config, ledger.clone()), ledger)
    }

    fn open(machine: &ExitStateMachine, ledger: &RiskLedger, direction: Direction) -> Position {
        let config = ExitConfig::default();
        let entry = dec!(1.2000);
        let atr = dec!(0.0040);
        let levels = exit_levels(direction, entry, atr, Decimal::ONE, &config);
        let plan = TradePlan {
            symbol: "EURUSDm".to_string(),
            direction,
            strength_score: 8.5,
            entry_price: entry,
            atr,
            distance_multiplier: Decimal::ONE,
            levels,
            lot_size: dec!(0.08),
            instrument: InstrumentConfig::default().spec_for("EURUSDm"),
            risk_amount: dec!(4.8),
        };
        let reservation = ledger.reserve("EURUSDm", dec!(5)).unwrap();
        let fill = Fill {
            order_id: "paper-1".to_string(),
            price: entry,
            timestamp: Utc::now(),
        };
        let position = machine.open_position(1, &plan, &fill, reservation.risk());
        ledger.confirm(reservation, 1);
        position
    }

    #[test]
    fn test_tp1_closes_half() {
        let (machine, ledger) = setup(ExitConfig::default());
        let mut pos = open(&machine, &ledger, Direction::Buy);

        assert_eq!(pos.levels.tp1, dec!(1.2060));
        assert_eq!(pos.levels.tp2, dec!(1.2120));
        assert_eq!(pos.levels.tp3, dec!(1.2180));
        assert_eq!(pos.levels.stop, dec!(1.1940));

        let steps = machine.on_price(&mut pos, dec!(1.2061));
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].to, ExitState::Tp1Hit);
        assert_eq!(steps[0].instruction.action, ExitAction::ClosePartial);
        assert_eq!(steps[0].instruction.fraction, dec!(0.5));
        assert_eq!(pos.state, ExitState::Tp1Hit);
        assert_eq!(pos.remaining_size_fraction, dec!(0.5));

        // 61 pips * $10 * 0.08 * 0.5
        assert_eq!(ledger.snapshot().daily_realized_pnl, dec!(24.4));
    }

    #[test]
    fn test_full_ladder() {
        let (machine, ledger) = setup(ExitConfig::default());
        let mut pos = open(&machine, &ledger, Direction::Buy);

        machine.on_price(&mut pos, dec!(1.2060));
        let steps = machine.on_price(&mut pos, dec!(1.2120));
        assert_eq!(steps[0].to, ExitState::Tp2Hit);
        assert_eq!(steps[0].instruction.fraction, dec!(0.3));
        assert!(pos.trailing_active);
        // 1.2120 - 0.0060
        assert_eq!(pos.current_stop, dec!(1.2060));
        assert_eq!(pos.remaining_size_fraction, dec!(0.2));

        let steps = machine.on_price(&mut pos, dec!(1.2180));
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].to, ExitState::Tp3Hit);
        assert!(steps[0].closes_position());
        assert_eq!(steps[0].instruction.fraction, dec!(0.2));
        assert_eq!(pos.state, ExitState::Closed);
        assert!(pos.is_closed());
        assert_eq!(ledger.snapshot().open_trade_count, 0);
    }

    #[test]
    fn test_gap_through_two_targets() {
        let (machine, ledger) = setup(ExitConfig::default());
        let mut pos = open(&machine, &ledger, Direction::Sell);

        let steps = machine.on_price(&mut pos, dec!(1.1870));
        let states: Vec<_> = steps.iter().map(|s| s.to).collect();
        assert_eq!(states, vec![ExitState::Tp1Hit, ExitState::Tp2Hit]);
        assert_eq!(pos.remaining_size_fraction, dec!(0.2));
    }

    #[test]
    fn test_stop_loss_closes_everything() {
        let (machine, ledger) = setup(ExitConfig::default());
        let mut pos = open(&machine, &ledger, Direction::Buy);

        let steps = machine.on_price(&mut pos, dec!(1.1935));
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].to, ExitState::StoppedOut);
        assert_eq!(steps[0].reason, ExitReason::StopLoss);
        assert_eq!(steps[0].instruction.fraction, Decimal::ONE);
        assert_eq!(pos.state, ExitState::Closed);
        assert!(machine.on_price(&mut pos, dec!(1.2200)).is_empty());
    }

    #[test]
    fn test_monotonic_and_trailing_never_loosens() {
        let (machine, ledger) = setup(ExitConfig::default());
        let mut pos = open(&machine, &ledger, Direction::Buy);

        let path = [
            dec!(1.2010), dec!(1.2065), dec!(1.2030), dec!(1.2125), dec!(1.2150),
            dec!(1.2130), dec!(1.2170), dec!(1.2140), dec!(1.2160), dec!(1.2105),
        ];

        let mut last_state = pos.state;
        let mut last_stop = pos.current_stop;
        for price in path {
            machine.on_price(&mut pos, price);
            assert!(pos.state >= last_state, "state went backward at {}", price);
            if pos.trailing_active && !pos.is_closed() {
                assert!(pos.current_stop >= last_stop, "stop loosened at {}", price);
            }
            last_state = pos.state;
            last_stop = pos.current_stop;
        }
        // 1.2170 - 0.0060 = 1.2110 trail, crossed by 1.2105
        assert_eq!(pos.state, ExitState::Closed);
    }

    #[test]
    fn test_sell_trailing_only_moves_down() {
        let (machine, ledger) = setup(ExitConfig::default());
        let mut pos = open(&machine, &ledger, Direction::Sell);
        assert_eq!(pos.current_stop, dec!(1.2060));

        let path = [
            dec!(1.1990), dec!(1.1935), dec!(1.1970), dec!(1.1875), dec!(1.1850),
            dec!(1.1870), dec!(1.1830), dec!(1.1860), dec!(1.1840),
        ];

        let mut last_stop = pos.current_stop;
        for price in path {
            machine.on_price(&mut pos, price);
            assert!(pos.current_stop <= last_stop, "stop moved up at {}", price);
            last_stop = pos.current_stop;
        }
        assert!(pos.trailing_active);
        // 1.1830 + 0.0060
        assert_eq!(pos.current_stop, dec!(1.1890));
        assert_eq!(pos.state, ExitState::Tp2Hit);

        let steps = machine.on_price(&mut pos, dec!(1.1895));
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].reason, ExitReason::TrailingStop);
        assert_eq!(steps[0].to, ExitState::StoppedOut);
        assert_eq!(steps[0].instruction.fraction, dec!(0.2));
        assert_eq!(pos.state, ExitState::Closed);
        assert_eq!(ledger.snapshot().open_trade_count, 0);
    }

    #[test]
    fn test_breakeven_after_tp1() {
        let config = ExitConfig {
            breakeven_after_tp1: true,
            ..Default::default()
        };
        let (machine, ledger) = setup(config);
        let mut pos = open(&machine, &ledger, Direction::Buy);

        let steps = machine.on_price(&mut pos, dec!(1.2062));
        assert_eq!(steps[0].instruction.new_stop, Some(dec!(1.2000)));

        let steps = machine.on_price(&mut pos, dec!(1.1999));
        assert_eq!(steps[0].to, ExitState::StoppedOut);
        assert_eq!(steps[0].instruction.fraction, dec!(0.5));
    }

    #[test]
    fn test_stop_out_books_drawdown() {
        let (machine, ledger) = setup(ExitConfig::default());
        ledger.release_on_close(&CloseRelease {
            position_id: 42,
            symbol: "GBPUSDm".to_string(),
            realized_pnl: dec!(-19),
            risk_released: Decimal::ZERO,
            unrealized_after: Decimal::ZERO,
            position_closed: false,
            trade_pnl: None,
        });
        let mut pos = open(&machine, &ledger, Direction::Buy);
        // 10 pip stop at 0.05 lots loses exactly $5
        pos.current_stop = dec!(1.1990);
        pos.lot_size = dec!(0.05);

        let steps = machine.on_price(&mut pos, dec!(1.1990));
        assert_eq!(steps[0].realized_pnl, dec!(-5));
        assert_eq!(ledger.snapshot().daily_pnl(), dec!(-24));
        assert!(!ledger.can_admit("AUDUSDm"));
    }

    #[test]
    fn test_force_close_on_reversal() {
        let (machine, ledger) = setup(ExitConfig::default());
        let mut pos = open(&machine, &ledger, Direction::Sell);
        let step = machine.force_close(&mut pos, dec!(1.1990), ExitReason::Reversal).unwrap();
        assert_eq!(step.reason, ExitReason::Reversal);
        assert!(pos.is_closed());
        assert!(machine.force_close(&mut pos, dec!(1.1990), ExitReason::Reversal).is_none());
    }
}
