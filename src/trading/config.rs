//! Governance configuration, read once at process start.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{ensure, Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::PolicyMode;

/// Top-level configuration for the governor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Symbols requested from the signal source each cycle
    pub symbols: Vec<String>,

    /// Timeframes the signal source should confirm across
    pub timeframes: Vec<String>,

    /// Active direction policy for the whole run
    pub policy: PolicyMode,

    pub risk: RiskConfig,
    pub signals: SignalConfig,
    pub exits: ExitConfig,
    pub multipliers: MultiplierConfig,
    pub sessions: SessionConfig,
    pub instruments: InstrumentConfig,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            symbols: [
                "EURUSDm", "GBPUSDm", "USDJPYm", "USDCHFm", "AUDUSDm", "USDCADm", "NZDUSDm",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            timeframes: vec!["M5".to_string(), "M15".to_string(), "H1".to_string()],
            policy: PolicyMode::Contrarian,
            risk: RiskConfig::default(),
            signals: SignalConfig::default(),
            exits: ExitConfig::default(),
            multipliers: MultiplierConfig::default(),
            sessions: SessionConfig::default(),
            instruments: InstrumentConfig::default(),
        }
    }
}

impl GovernorConfig {
    /// Load configuration from a JSON file, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                serde_json::from_str::<Self>(&raw)
                    .with_context(|| format!("Failed to parse config file {}", path.display()))?
            }
            None => Self::default(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the governor cannot honor.
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.symbols.is_empty(), "symbol universe is empty");
        ensure!(self.risk.fixed_risk_amount > Decimal::ZERO, "fixed_risk_amount must be positive");
        ensure!(self.risk.max_concurrent_trades > 0, "max_concurrent_trades must be at least 1");
        ensure!(self.risk.max_daily_drawdown > Decimal::ZERO, "max_daily_drawdown must be positive");
        ensure!(
            (0.0..=10.0).contains(&self.signals.min_signal_strength),
            "min_signal_strength must be within 0-10"
        );
        ensure!(
            self.signals.priority_threshold >= self.signals.min_signal_strength,
            "priority_threshold must not be below min_signal_strength"
        );

        let e = &self.exits;
        ensure!(e.stop_atr > Decimal::ZERO, "stop_atr must be positive");
        ensure!(
            Decimal::ZERO < e.tp1_atr && e.tp1_atr < e.tp2_atr && e.tp2_atr < e.tp3_atr,
            "take-profit multiples must be strictly increasing"
        );
        ensure!(
            Decimal::ZERO < e.tp1_close_of_remaining && e.tp1_close_of_remaining < Decimal::ONE,
            "tp1_close_of_remaining must be within (0, 1)"
        );
        ensure!(
            Decimal::ZERO < e.tp2_close_of_original
                && e.tp2_close_of_original < Decimal::ONE - e.tp1_close_of_remaining,
            "tp2_close_of_original must leave size open for TP3"
        );
        ensure!(e.trail_atr > Decimal::ZERO, "trail_atr must be positive");

        let s = &self.sessions;
        ensure!(
            s.trading_start_hour < s.trading_end_hour && s.trading_end_hour <= 24,
            "trading window must satisfy start < end <= 24"
        );

        let i = &self.instruments;
        ensure!(i.lot_step > Decimal::ZERO, "lot_step must be positive");
        ensure!(i.min_lot > Decimal::ZERO, "min_lot must be positive");

        Ok(())
    }
}

/// Daily risk budget and admission limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Dollar loss if a position's stop is hit
    pub fixed_risk_amount: Decimal,

    pub max_concurrent_trades: usize,

    /// Dollar loss per UTC day after which no new trades are admitted
    pub max_daily_drawdown: Decimal,

    pub one_trade_per_symbol_per_day: bool,

    pub max_trades_per_day: Option<u32>,

    pub max_trades_per_symbol_per_day: Option<u32>,

    /// Stop admitting once the day's P&L reaches this amount
    pub daily_profit_target: Option<Decimal>,

    /// Block a symbol for the rest of the day once one of its positions hits TP1
    pub stop_symbol_after_success: bool,

    /// Also refuse a trade whose full stop-out would breach the drawdown limit
    pub reserve_against_drawdown: bool,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            fixed_risk_amount: dec!(5),
            max_concurrent_trades: 2,
            max_daily_drawdown: dec!(20),
            one_trade_per_symbol_per_day: false,
            max_trades_per_day: None,
            max_trades_per_symbol_per_day: None,
            daily_profit_target: None,
            stop_symbol_after_success: false,
            reserve_against_drawdown: false,
        }
    }
}

/// Signal quality thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub min_signal_strength: f64,

    /// Candidates at or above this strength are admitted ahead of all others
    pub priority_threshold: f64,

    /// Minimum volume score in volume-gated direct mode
    pub volume_threshold: f64,

    /// Close an open position when a strong opposing signal arrives
    pub reversal_exit: bool,

    pub reversal_strength: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            min_signal_strength: 8.0,
            priority_threshold: 9.0,
            volume_threshold: 8.0,
            reversal_exit: false,
            reversal_strength: 7.0,
        }
    }
}

/// ATR multiples and close fractions for the exit ladder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitConfig {
    pub stop_atr: Decimal,
    pub tp1_atr: Decimal,
    pub tp2_atr: Decimal,
    pub tp3_atr: Decimal,

    /// Share of the remaining size closed at TP1
    pub tp1_close_of_remaining: Decimal,

    /// Share of the original size closed at TP2
    pub tp2_close_of_original: Decimal,

    /// Distance between price and the trailing stop, in ATR
    pub trail_atr: Decimal,

    /// Move the stop to entry when TP1 is hit
    pub breakeven_after_tp1: bool,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            stop_atr: dec!(1.5),
            tp1_atr: dec!(1.5),
            tp2_atr: dec!(3.0),
            tp3_atr: dec!(4.5),
            tp1_close_of_remaining: dec!(0.5),
            tp2_close_of_original: dec!(0.3),
            trail_atr: dec!(1.5),
            breakeven_after_tp1: false,
        }
    }
}

/// Strength-tier multipliers for stop/target distances.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiplierConfig {
    /// Off by default: distances are the raw ATR multiples of the exit ladder
    pub enabled: bool,

    /// Strength below 7.0
    pub weak: Decimal,
    /// Strength 7.0 to 7.9
    pub standard: Decimal,
    /// Strength 8.0 to 8.9
    pub strong: Decimal,
    /// Strength 9.0 and above
    pub ultra: Decimal,
}

impl Default for MultiplierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            weak: dec!(0.8),
            standard: dec!(1.0),
            strong: dec!(1.2),
            ultra: dec!(1.5),
        }
    }
}

/// Trading window and per-session distance multipliers (UTC hours).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub trading_start_hour: u32,
    pub trading_end_hour: u32,

    pub asian: Decimal,
    pub london: Decimal,
    pub overlap: Decimal,
    pub new_york: Decimal,
    pub quiet: Decimal,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            trading_start_hour: 0,
            trading_end_hour: 24,
            asian: dec!(0.7),
            london: dec!(1.2),
            overlap: dec!(1.3),
            new_york: dec!(1.1),
            quiet: dec!(0.7),
        }
    }
}

/// Broker contract details for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    /// Price increment of one pip
    pub pip_size: Decimal,
    /// Dollar value of one pip for one lot
    pub pip_value: Decimal,
    pub min_lot: Decimal,
    pub lot_step: Decimal,
    pub max_lot: Option<Decimal>,
}

/// Instrument defaults plus per-symbol overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    pub pip_value: Decimal,
    pub min_lot: Decimal,
    pub lot_step: Decimal,
    pub max_lot: Option<Decimal>,
    pub overrides: HashMap<String, InstrumentSpec>,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            pip_value: dec!(10),
            min_lot: dec!(0.01),
            lot_step: dec!(0.01),
            max_lot: None,
            overrides: HashMap::new(),
        }
    }
}

impl InstrumentConfig {
    /// Contract details for a symbol. JPY-quoted pairs use a 0.01 pip.
    pub fn spec_for(&self, symbol: &str) -> InstrumentSpec {
        if let Some(spec) = self.overrides.get(symbol) {
            return *spec;
        }

        let pip_size = if symbol.to_ascii_uppercase().contains("JPY") {
            dec!(0.01)
        } else {
            dec!(0.0001)
        };

        InstrumentSpec {
            pip_size,
            pip_value: self.pip_value,
            min_lot: self.min_lot,
            lot_step: self.lot_step,
            max_lot: self.max_lot,
        }
    }
}
