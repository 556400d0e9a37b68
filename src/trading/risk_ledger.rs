//! Daily risk budget shared by admission and exit management.
//!
//! Every mutation goes through one `parking_lot::Mutex`, so a check-and-reserve
//! from the admission path cannot interleave with a close from the tick path.
//! Guards are never held across an `.await`.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{GovernanceError, RejectReason};
use crate::models::PositionId;

use super::RiskConfig;

/// A slot and risk amount held for a candidate between admission and fill.
///
/// Must be consumed by [`RiskLedger::confirm`] or [`RiskLedger::rollback`].
#[derive(Debug)]
#[must_use = "a reservation must be confirmed or rolled back"]
pub struct Reservation {
    symbol: String,
    risk: Decimal,
    trading_day: NaiveDate,
    previous_trade_date: Option<NaiveDate>,
}

impl Reservation {
    pub fn risk(&self) -> Decimal {
        self.risk
    }
}

/// Ledger update for a full or partial close.
#[derive(Debug, Clone)]
pub struct CloseRelease {
    pub position_id: PositionId,
    pub symbol: String,
    /// P&L realized by this close only
    pub realized_pnl: Decimal,
    /// Share of the position's reserved risk freed by this close
    pub risk_released: Decimal,
    /// Open P&L of whatever is still open after the close
    pub unrealized_after: Decimal,
    /// Whether this close ended the position
    pub position_closed: bool,
    /// Total P&L of the trade, set on the final close
    pub trade_pnl: Option<Decimal>,
}

/// The finished day, returned once by rollover.
#[derive(Debug, Clone, Serialize)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub realized_pnl: Decimal,
    pub trades_opened: u32,
    pub closed_trade_pnls: Vec<Decimal>,
}

/// Read-only view of the ledger.
#[derive(Debug, Clone, Serialize)]
pub struct RiskSnapshot {
    pub trading_day: NaiveDate,
    pub daily_realized_pnl: Decimal,
    pub daily_unrealized_pnl: Decimal,
    pub open_trade_count: usize,
    pub max_concurrent_trades: usize,
    pub max_daily_drawdown: Decimal,
    pub reserved_risk: Decimal,
    pub trades_today: u32,
    pub trading_blocked: bool,
}

impl RiskSnapshot {
    pub fn daily_pnl(&self) -> Decimal {
        self.daily_realized_pnl + self.daily_unrealized_pnl
    }
}

#[derive(Debug)]
struct LedgerState {
    trading_day: NaiveDate,
    daily_realized_pnl: Decimal,
    unrealized: HashMap<PositionId, Decimal>,
    /// Open positions plus outstanding reservations
    open_trade_count: usize,
    reserved_risk: Decimal,
    open_symbols: HashSet<String>,
    per_symbol_last_trade_date: HashMap<String, NaiveDate>,
    per_symbol_trades_today: HashMap<String, u32>,
    daily_trade_count: u32,
    successful_symbols: HashSet<String>,
    closed_trade_pnls: Vec<Decimal>,
    drawdown_notified: bool,
}

impl LedgerState {
    fn new(trading_day: NaiveDate) -> Self {
        Self {
            trading_day,
            daily_realized_pnl: Decimal::ZERO,
            unrealized: HashMap::new(),
            open_trade_count: 0,
            reserved_risk: Decimal::ZERO,
            open_symbols: HashSet::new(),
            per_symbol_last_trade_date: HashMap::new(),
            per_symbol_trades_today: HashMap::new(),
            daily_trade_count: 0,
            successful_symbols: HashSet::new(),
            closed_trade_pnls: Vec::new(),
            drawdown_notified: false,
        }
    }

    fn daily_pnl(&self) -> Decimal {
        self.daily_realized_pnl + self.unrealized.values().copied().sum::<Decimal>()
    }

    fn drawdown_breached(&self, limits: &RiskConfig) -> bool {
        self.daily_pnl() <= -limits.max_daily_drawdown
    }

    fn check(&self, limits: &RiskConfig, symbol: &str) -> Result<(), RejectReason> {
        if self.drawdown_breached(limits) {
            return Err(RejectReason::DailyDrawdownLimit);
        }
        if let Some(target) = limits.daily_profit_target {
            if self.daily_pnl() >= target {
                return Err(RejectReason::DailyProfitTarget);
            }
        }
        if self.open_trade_count >= limits.max_concurrent_trades {
            return Err(RejectReason::ConcurrencyLimit);
        }
        if let Some(max) = limits.max_trades_per_day {
            if self.daily_trade_count >= max {
                return Err(RejectReason::DailyTradeLimit);
            }
        }
        if self.open_symbols.contains(symbol) {
            return Err(RejectReason::SymbolAlreadyOpen);
        }
        if limits.one_trade_per_symbol_per_day
            && self.per_symbol_last_trade_date.get(symbol) == Some(&self.trading_day)
        {
            return Err(RejectReason::SymbolTradedToday);
        }
        if let Some(max) = limits.max_trades_per_symbol_per_day {
            if self.per_symbol_trades_today.get(symbol).copied().unwrap_or(0) >= max {
                return Err(RejectReason::SymbolDailyLimit);
            }
        }
        if self.successful_symbols.contains(symbol) {
            return Err(RejectReason::SymbolSucceededToday);
        }
        Ok(())
    }

    fn mark_traded(&mut self, symbol: &str, date: NaiveDate) -> Option<NaiveDate> {
        let previous = self.per_symbol_last_trade_date.insert(symbol.to_string(), date);
        if date == self.trading_day {
            *self.per_symbol_trades_today.entry(symbol.to_string()).or_insert(0) += 1;
            self.daily_trade_count += 1;
        }
        previous
    }
}

/// Process-wide risk budget for one trading day.
#[derive(Debug)]
pub struct RiskLedger {
    limits: RiskConfig,
    state: Mutex<LedgerState>,
}

impl RiskLedger {
    pub fn new(limits: RiskConfig, now: DateTime<Utc>) -> Self {
        Self {
            limits,
            state: Mutex::new(LedgerState::new(now.date_naive())),
        }
    }

    /// Whether a new trade on `symbol` would pass every gate right now.
    pub fn can_admit(&self, symbol: &str) -> bool {
        self.admission_check(symbol).is_ok()
    }

    /// Like [`can_admit`](Self::can_admit), but says which gate is closed.
    pub fn admission_check(&self, symbol: &str) -> Result<(), RejectReason> {
        self.state.lock().check(&self.limits, symbol)
    }

    /// Atomically check the gates and hold a slot plus `trade_risk` for `symbol`.
    pub fn reserve(&self, symbol: &str, trade_risk: Decimal) -> Result<Reservation, GovernanceError> {
        let mut state = self.state.lock();
        state
            .check(&self.limits, symbol)
            .map_err(GovernanceError::AdmissionRejected)?;

        if self.limits.reserve_against_drawdown {
            let worst_case = state.daily_pnl() - state.reserved_risk - trade_risk;
            if worst_case < -self.limits.max_daily_drawdown {
                return Err(GovernanceError::AdmissionRejected(
                    RejectReason::InsufficientRiskBudget,
                ));
            }
        }

        let trading_day = state.trading_day;
        state.open_trade_count += 1;
        state.reserved_risk += trade_risk;
        state.open_symbols.insert(symbol.to_string());
        let previous_trade_date = state.mark_traded(symbol, trading_day);

        debug!(
            symbol = %symbol,
            risk = %trade_risk,
            open = state.open_trade_count,
            "Reserved risk slot"
        );

        Ok(Reservation {
            symbol: symbol.to_string(),
            risk: trade_risk,
            trading_day,
            previous_trade_date,
        })
    }

    /// The reserved trade filled and is now tracked as `position_id`.
    pub fn confirm(&self, reservation: Reservation, position_id: PositionId) {
        let mut state = self.state.lock();
        state.unrealized.insert(position_id, Decimal::ZERO);
        debug!(symbol = %reservation.symbol, position_id, "Reservation confirmed");
    }

    /// Undo a reservation whose order was not filled.
    pub fn rollback(&self, reservation: Reservation) {
        let mut state = self.state.lock();
        state.open_trade_count = state.open_trade_count.saturating_sub(1);
        state.reserved_risk -= reservation.risk;
        state.open_symbols.remove(&reservation.symbol);

        // Counters of a day that already rolled over are gone; leave them.
        if reservation.trading_day == state.trading_day {
            state.daily_trade_count = state.daily_trade_count.saturating_sub(1);
            if let Some(count) = state.per_symbol_trades_today.get_mut(&reservation.symbol) {
                *count = count.saturating_sub(1);
            }
            match reservation.previous_trade_date {
                Some(date) => {
                    state
                        .per_symbol_last_trade_date
                        .insert(reservation.symbol.clone(), date);
                }
                None => {
                    state.per_symbol_last_trade_date.remove(&reservation.symbol);
                }
            }
        }

        info!(symbol = %reservation.symbol, "Reservation rolled back");
    }

    /// Book a full or partial close.
    pub fn release_on_close(&self, release: &CloseRelease) {
        let mut state = self.state.lock();
        state.daily_realized_pnl += release.realized_pnl;
        state.reserved_risk -= release.risk_released;

        if release.position_closed {
            state.open_trade_count = state.open_trade_count.saturating_sub(1);
            state.open_symbols.remove(&release.symbol);
            state.unrealized.remove(&release.position_id);
            if let Some(pnl) = release.trade_pnl {
                state.closed_trade_pnls.push(pnl);
            }
        } else {
            state
                .unrealized
                .insert(release.position_id, release.unrealized_after);
        }

        debug!(
            symbol = %release.symbol,
            realized = %release.realized_pnl,
            daily_realized = %state.daily_realized_pnl,
            open = state.open_trade_count,
            "Released on close"
        );
    }

    /// Update the open P&L of a position.
    pub fn mark_unrealized(&self, position_id: PositionId, pnl: Decimal) {
        let mut state = self.state.lock();
        if let Some(mark) = state.unrealized.get_mut(&position_id) {
            *mark = pnl;
        } else {
            state.unrealized.insert(position_id, pnl);
        }
    }

    pub fn mark_symbol_traded(&self, symbol: &str, date: NaiveDate) {
        self.state.lock().mark_traded(symbol, date);
    }

    /// Block `symbol` for the rest of the day after a target hit.
    pub fn mark_symbol_succeeded(&self, symbol: &str) {
        if self.limits.stop_symbol_after_success {
            let mut state = self.state.lock();
            if state.successful_symbols.insert(symbol.to_string()) {
                info!(symbol = %symbol, "Symbol blocked for the day after reaching target");
            }
        }
    }

    /// Returns the daily P&L the first time the drawdown gate closes each day.
    pub fn take_drawdown_breach(&self) -> Option<Decimal> {
        let mut state = self.state.lock();
        if state.drawdown_notified || !state.drawdown_breached(&self.limits) {
            return None;
        }
        state.drawdown_notified = true;
        let pnl = state.daily_pnl();
        warn!(
            daily_pnl = %pnl,
            limit = %self.limits.max_daily_drawdown,
            "Daily drawdown limit reached, admission closed"
        );
        Some(pnl)
    }

    /// Reset the daily counters when `now` falls on a later UTC day.
    ///
    /// Open positions and their slots carry over. Returns the finished day's
    /// summary, or `None` when the day has not changed.
    pub fn rollover_if_new_day(&self, now: DateTime<Utc>) -> Option<DaySummary> {
        let today = now.date_naive();
        let mut state = self.state.lock();
        if today <= state.trading_day {
            return None;
        }

        let summary = DaySummary {
            date: state.trading_day,
            realized_pnl: state.daily_realized_pnl,
            trades_opened: state.daily_trade_count,
            closed_trade_pnls: std::mem::take(&mut state.closed_trade_pnls),
        };

        state.trading_day = today;
        state.daily_realized_pnl = Decimal::ZERO;
        // Marks are refreshed on the next tick
        for mark in state.unrealized.values_mut() {
            *mark = Decimal::ZERO;
        }
        state.per_symbol_trades_today.clear();
        state.daily_trade_count = 0;
        state.successful_symbols.clear();
        state.drawdown_notified = false;

        info!(
            day = %summary.date,
            realized = %summary.realized_pnl,
            trades = summary.trades_opened,
            carried_over = state.open_trade_count,
            "Trading day rolled over"
        );

        Some(summary)
    }

    pub fn snapshot(&self) -> RiskSnapshot {
        let state = self.state.lock();
        let unrealized = state.unrealized.values().copied().sum();
        RiskSnapshot {
            trading_day: state.trading_day,
            daily_realized_pnl: state.daily_realized_pnl,
            daily_unrealized_pnl: unrealized,
            open_trade_count: state.open_trade_count,
            max_concurrent_trades: self.limits.max_concurrent_trades,
            max_daily_drawdown: self.limits.max_daily_drawdown,
            reserved_risk: state.reserved_risk,
            trades_today: state.daily_trade_count,
            trading_blocked: state.drawdown_breached(&self.limits),
        }
    }
}
