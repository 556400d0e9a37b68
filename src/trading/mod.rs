//! Trading logic: direction policy, sizing, risk ledger, admission, exits.

mod admission;
mod config;
mod direction;
mod exit_machine;
mod levels;
mod position_sizer;
mod risk_ledger;

pub use admission::{AdmissionController, AdmissionOutcome};
pub use config::{
    ExitConfig, GovernorConfig, InstrumentConfig, InstrumentSpec, MultiplierConfig, RiskConfig,
    SessionConfig, SignalConfig,
};
pub use direction::{DirectionPolicy, PolicyMode, Resolution, SkipReason};
pub use exit_machine::{holding_minutes, ExitReason, ExitStateMachine, ExitTransition};
pub use levels::{
    distance_multiplier, exit_levels, strength_multiplier, TradePlan, TradingSession,
};
pub use position_sizer::PositionSizer;
pub use risk_ledger::{CloseRelease, DaySummary, Reservation, RiskLedger, RiskSnapshot};
