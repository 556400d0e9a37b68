//! Failure taxonomy of the governance core.
//!
//! None of these are fatal: every variant degrades to "skip this candidate" or
//! "leave this position as-is" plus a notification.

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

/// Why the risk ledger refused a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    BelowMinimumStrength,
    ConcurrencyLimit,
    DailyDrawdownLimit,
    DailyProfitTarget,
    DailyTradeLimit,
    SymbolTradedToday,
    SymbolDailyLimit,
    SymbolAlreadyOpen,
    SymbolSucceededToday,
    InsufficientRiskBudget,
    OutsideTradingWindow,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RejectReason::BelowMinimumStrength => "signal strength below minimum",
            RejectReason::ConcurrencyLimit => "max concurrent trades reached",
            RejectReason::DailyDrawdownLimit => "daily drawdown limit reached",
            RejectReason::DailyProfitTarget => "daily profit target reached",
            RejectReason::DailyTradeLimit => "daily trade limit reached",
            RejectReason::SymbolTradedToday => "symbol already traded today",
            RejectReason::SymbolDailyLimit => "symbol daily trade limit reached",
            RejectReason::SymbolAlreadyOpen => "symbol already has an open position",
            RejectReason::SymbolSucceededToday => "symbol already hit a target today",
            RejectReason::InsufficientRiskBudget => "trade risk would exceed drawdown headroom",
            RejectReason::OutsideTradingWindow => "outside trading hours",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Error)]
pub enum GovernanceError {
    #[error("invalid stop distance: entry {entry} stop {stop}")]
    InvalidStopDistance { entry: Decimal, stop: Decimal },

    #[error("size {size} below broker minimum {minimum}")]
    SizeBelowMinimum { size: Decimal, minimum: Decimal },

    #[error("admission rejected: {0}")]
    AdmissionRejected(RejectReason),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("no price data for {symbol}")]
    StaleState { symbol: String },
}

impl GovernanceError {
    /// Short machine-readable kind for notifications.
    pub fn kind(&self) -> &'static str {
        match self {
            GovernanceError::InvalidStopDistance { .. } => "invalid_stop_distance",
            GovernanceError::SizeBelowMinimum { .. } => "size_below_minimum",
            GovernanceError::AdmissionRejected(_) => "admission_rejected",
            GovernanceError::ExecutionFailed(_) => "execution_failed",
            GovernanceError::StaleState { .. } => "stale_state",
        }
    }
}
