//! Structured events emitted to the notification sink.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::GovernanceError;
use crate::metrics::SessionStats;
use crate::models::{Direction, ExitState, PositionId, Signal, TradeIntent};
use crate::trading::{ExitReason, ExitTransition, SkipReason, TradePlan};

/// Everything an operator might want to hear about flows through this enum.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GovernanceEvent {
    SignalSkipped {
        symbol: String,
        raw_direction: Direction,
        strength: f64,
        volume: f64,
        reason: SkipReason,
    },
    TradeAdmitted {
        symbol: String,
        direction: Direction,
        strength: f64,
        priority: bool,
        lot_size: Decimal,
        stop: Decimal,
        take_profits: [Decimal; 3],
    },
    CandidateRejected {
        symbol: String,
        direction: Direction,
        strength: f64,
        kind: &'static str,
        reason: String,
    },
    ExecutionFailed {
        symbol: String,
        position_id: Option<PositionId>,
        error: String,
    },
    PositionOpened {
        position_id: PositionId,
        symbol: String,
        direction: Direction,
        entry: Decimal,
        lot_size: Decimal,
        stop: Decimal,
    },
    TakeProfitHit {
        position_id: PositionId,
        symbol: String,
        tier: u8,
        price: Decimal,
        fraction: Decimal,
        pnl: Decimal,
    },
    StopMoved {
        position_id: PositionId,
        symbol: String,
        new_stop: Decimal,
    },
    PositionClosed {
        position_id: PositionId,
        symbol: String,
        reason: ExitReason,
        final_state: ExitState,
        price: Decimal,
        pnl: Decimal,
    },
    DrawdownLimitReached {
        daily_pnl: Decimal,
        limit: Decimal,
    },
    StaleState {
        symbol: String,
        position_id: PositionId,
    },
    DaySummary {
        date: NaiveDate,
        realized_pnl: Decimal,
        trades_opened: u32,
        stats: SessionStats,
    },
}

impl GovernanceEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            GovernanceEvent::SignalSkipped { .. } => "signal_skipped",
            GovernanceEvent::TradeAdmitted { .. } => "trade_admitted",
            GovernanceEvent::CandidateRejected { .. } => "candidate_rejected",
            GovernanceEvent::ExecutionFailed { .. } => "execution_failed",
            GovernanceEvent::PositionOpened { .. } => "position_opened",
            GovernanceEvent::TakeProfitHit { .. } => "take_profit_hit",
            GovernanceEvent::StopMoved { .. } => "stop_moved",
            GovernanceEvent::PositionClosed { .. } => "position_closed",
            GovernanceEvent::DrawdownLimitReached { .. } => "drawdown_limit_reached",
            GovernanceEvent::StaleState { .. } => "stale_state",
            GovernanceEvent::DaySummary { .. } => "day_summary",
        }
    }

    pub fn skipped(signal: &Signal, reason: SkipReason) -> Self {
        GovernanceEvent::SignalSkipped {
            symbol: signal.symbol.clone(),
            raw_direction: signal.raw_direction,
            strength: signal.strength_score,
            volume: signal.volume_score,
            reason,
        }
    }

    pub fn admitted(intent: &TradeIntent, plan: &TradePlan) -> Self {
        GovernanceEvent::TradeAdmitted {
            symbol: plan.symbol.clone(),
            direction: plan.direction,
            strength: plan.strength_score,
            priority: intent.priority,
            lot_size: plan.lot_size,
            stop: plan.levels.stop,
            take_profits: plan.levels.take_profits(),
        }
    }

    pub fn rejected(intent: &TradeIntent, error: &GovernanceError) -> Self {
        GovernanceEvent::CandidateRejected {
            symbol: intent.symbol.clone(),
            direction: intent.direction,
            strength: intent.strength_score,
            kind: error.kind(),
            reason: error.to_string(),
        }
    }

    /// Events describing an exit step.
    ///
    /// TP3 reports both the target hit and the close it causes.
    pub fn for_transition(step: &ExitTransition) -> Vec<Self> {
        let instruction = &step.instruction;
        let tier = match step.reason {
            ExitReason::TakeProfit1 => Some(1),
            ExitReason::TakeProfit2 => Some(2),
            ExitReason::TakeProfit3 => Some(3),
            _ => None,
        };

        let mut events = Vec::with_capacity(2);
        if let Some(tier) = tier {
            events.push(GovernanceEvent::TakeProfitHit {
                position_id: instruction.position_id,
                symbol: instruction.symbol.clone(),
                tier,
                price: step.price,
                fraction: instruction.fraction,
                pnl: step.realized_pnl,
            });
        }
        if step.reason == ExitReason::TrailRatchet {
            events.push(GovernanceEvent::StopMoved {
                position_id: instruction.position_id,
                symbol: instruction.symbol.clone(),
                new_stop: instruction.new_stop.unwrap_or_default(),
            });
        }
        if step.closes_position() {
            events.push(GovernanceEvent::PositionClosed {
                position_id: instruction.position_id,
                symbol: instruction.symbol.clone(),
                reason: step.reason,
                final_state: step.to,
                price: step.price,
                pnl: step.realized_pnl,
            });
        }
        events
    }
}
