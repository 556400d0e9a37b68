//! Governor runner: the evaluation cycle and the price-tick path.
//!
//! Handles:
//! - Pulling signals once per cycle and resolving their direction
//! - Sizing, admitting and placing new trades
//! - Driving open positions through their exits on every price tick
//! - Day rollover, drawdown notification and the daily summary

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Timelike, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::api::{ExecutionSink, GovernanceEvent, Notifier, PriceFeed, SignalSource};
use crate::error::{GovernanceError, RejectReason};
use crate::metrics::SessionStats;
use crate::models::{Direction, Position, PositionId, Signal, TradeIntent};
use crate::trading::{
    holding_minutes, AdmissionController, DaySummary, DirectionPolicy, ExitReason,
    ExitStateMachine, ExitTransition, GovernorConfig, Resolution, RiskLedger, TradePlan,
};

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Seconds between evaluation cycles
    pub cycle_interval_secs: u64,

    /// Seconds between price ticks for open positions
    pub tick_interval_secs: u64,

    pub governor: GovernorConfig,
}

/// External collaborators the governor talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub signals: Arc<dyn SignalSource>,
    pub prices: Arc<dyn PriceFeed>,
    pub execution: Arc<dyn ExecutionSink>,
    pub notifier: Arc<dyn Notifier>,
}

/// What one evaluation cycle did.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub signals: usize,
    pub skipped: usize,
    pub candidates: usize,
    pub admitted: usize,
    pub rejected: usize,
    pub opened: usize,
    pub execution_failures: usize,
    pub reversals: usize,
}

/// What one price-tick pass did.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub evaluated: usize,
    pub transitions: usize,
    pub closed: usize,
    pub stale: usize,
}

/// Owns the risk ledger and the position arena; everything else is borrowed.
pub struct Governor {
    config: GovernorConfig,
    policy: DirectionPolicy,
    ledger: Arc<RiskLedger>,
    admission: AdmissionController,
    exits: ExitStateMachine,
    positions: DashMap<PositionId, Position>,
    next_position_id: AtomicU64,
    collaborators: Collaborators,

    /// P&L of every trade closed since start, in close order
    closed_pnls: Mutex<Vec<Decimal>>,

    shutdown: Arc<AtomicBool>,
}

impl Governor {
    pub fn new(config: GovernorConfig, collaborators: Collaborators, now: DateTime<Utc>) -> Self {
        let ledger = Arc::new(RiskLedger::new(config.risk.clone(), now));
        let policy = DirectionPolicy::new(config.policy, config.signals.clone());
        let admission = AdmissionController::new(
            ledger.clone(),
            &config.signals,
            config.risk.fixed_risk_amount,
        );
        let exits = ExitStateMachine::new(config.exits.clone(), ledger.clone());

        Self {
            config,
            policy,
            ledger,
            admission,
            exits,
            positions: DashMap::new(),
            next_position_id: AtomicU64::new(1),
            collaborators,
            closed_pnls: Mutex::new(Vec::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn ledger(&self) -> &RiskLedger {
        &self.ledger
    }

    pub fn open_positions(&self) -> Vec<Position> {
        let mut positions: Vec<Position> = self.positions.iter().map(|p| p.value().clone()).collect();
        positions.sort_by_key(|p| p.id);
        positions
    }

    pub fn session_stats(&self) -> SessionStats {
        SessionStats::from_pnls(&self.closed_pnls.lock())
    }

    fn notify(&self, event: GovernanceEvent) {
        self.collaborators.notifier.notify(event);
    }

    /// Main run loop: cycles and ticks on their own intervals until shutdown.
    pub async fn run(&self, cycle_every: Duration, tick_every: Duration) -> Result<()> {
        info!(
            policy = self.policy.mode().as_str(),
            symbols = self.config.symbols.len(),
            cycle_secs = cycle_every.as_secs(),
            tick_secs = tick_every.as_secs(),
            "Starting governor run loop"
        );

        let mut cycle_interval = interval(cycle_every);
        let mut tick_interval = interval(tick_every);
        cycle_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Register shutdown handler
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
            shutdown.store(true, Ordering::SeqCst);
        });

        while !self.shutdown.load(Ordering::SeqCst) {
            tokio::select! {
                _ = cycle_interval.tick() => {
                    if let Err(e) = self.run_cycle(Utc::now()).await {
                        error!(error = %e, "Error in evaluation cycle");
                    }
                }
                _ = tick_interval.tick() => {
                    self.process_ticks(Utc::now()).await;
                }
            }
        }

        let snapshot = self.ledger.snapshot();
        info!(
            open_positions = self.positions.len(),
            daily_pnl = %snapshot.daily_pnl(),
            "Governor stopped; open positions are left at the broker"
        );
        Ok(())
    }

    fn within_trading_window(&self, now: DateTime<Utc>) -> bool {
        let hour = now.hour();
        let sessions = &self.config.sessions;
        hour >= sessions.trading_start_hour && hour < sessions.trading_end_hour
    }

    fn roll_day(&self, now: DateTime<Utc>) {
        if let Some(summary) = self.ledger.rollover_if_new_day(now) {
            self.notify(day_summary_event(summary));
        }
    }

    fn check_drawdown(&self) {
        if let Some(daily_pnl) = self.ledger.take_drawdown_breach() {
            self.notify(GovernanceEvent::DrawdownLimitReached {
                daily_pnl,
                limit: self.config.risk.max_daily_drawdown,
            });
        }
    }

    /// One evaluation cycle: signals in, orders out.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleReport> {
        self.roll_day(now);
        let mut report = CycleReport::default();

        let signals = self
            .collaborators
            .signals
            .fetch_signals(&self.config.symbols, &self.config.timeframes)
            .await?;
        let signals = self.one_per_symbol(signals);
        report.signals = signals.len();

        let mut candidates = Vec::new();
        let mut reversals = Vec::new();
        for signal in &signals {
            match self.policy.resolve(signal) {
                Resolution::Skipped(reason) => {
                    debug!(symbol = %signal.symbol, reason = %reason, "Signal skipped");
                    report.skipped += 1;
                    self.notify(GovernanceEvent::skipped(signal, reason));
                }
                Resolution::Execute(direction) => {
                    if self.is_reversal(signal, direction) {
                        reversals.push((signal.symbol.clone(), signal.price));
                    }
                    candidates.push(TradeIntent {
                        symbol: signal.symbol.clone(),
                        direction,
                        strength_score: signal.strength_score,
                        volume_score: signal.volume_score,
                        entry_price_hint: signal.price,
                        atr: signal.atr,
                        priority_rank: 0,
                        priority: false,
                    });
                }
            }
        }

        for (symbol, price) in reversals {
            if self.close_on_reversal(&symbol, price).await {
                report.reversals += 1;
            }
        }

        report.candidates = candidates.len();
        if candidates.is_empty() {
            self.check_drawdown();
            return Ok(report);
        }

        if !self.within_trading_window(now) {
            let err = GovernanceError::AdmissionRejected(RejectReason::OutsideTradingWindow);
            for intent in &candidates {
                self.notify(GovernanceEvent::rejected(intent, &err));
            }
            report.rejected = candidates.len();
            debug!(hour = now.hour(), "Outside trading window, no admissions");
            self.check_drawdown();
            return Ok(report);
        }

        // Size before admission so an unsizable candidate never takes a slot
        let mut plans: HashMap<String, TradePlan> = HashMap::new();
        let mut sizable = Vec::with_capacity(candidates.len());
        for intent in candidates {
            // Admission rejects it with the closed gate as the reason
            if !self.ledger.can_admit(&intent.symbol) {
                sizable.push(intent);
                continue;
            }
            match TradePlan::build(&intent, now, &self.config) {
                Ok(plan) => {
                    plans.insert(intent.symbol.clone(), plan);
                    sizable.push(intent);
                }
                Err(e) => {
                    warn!(symbol = %intent.symbol, error = %e, "Candidate cannot be sized");
                    report.rejected += 1;
                    self.notify(GovernanceEvent::rejected(&intent, &e));
                }
            }
        }

        let outcome = self.admission.admit(sizable);
        report.admitted = outcome.admitted.len();
        report.rejected += outcome.rejected.len();
        for (intent, err) in &outcome.rejected {
            self.notify(GovernanceEvent::rejected(intent, err));
        }

        for (intent, reservation) in outcome.admitted {
            let Some(plan) = plans.get(&intent.symbol) else {
                self.ledger.rollback(reservation);
                continue;
            };
            self.notify(GovernanceEvent::admitted(&intent, plan));

            match self.collaborators.execution.place_order(&plan.order()).await {
                Ok(fill) => {
                    let id = self.next_position_id.fetch_add(1, Ordering::SeqCst);
                    let position = self.exits.open_position(id, plan, &fill, reservation.risk());
                    self.ledger.confirm(reservation, id);

                    info!(
                        position_id = id,
                        symbol = %position.symbol,
                        direction = %position.direction,
                        entry = %position.entry_price,
                        lots = %position.lot_size,
                        stop = %position.current_stop,
                        tp1 = %position.levels.tp1,
                        "Position opened"
                    );
                    self.notify(GovernanceEvent::PositionOpened {
                        position_id: id,
                        symbol: position.symbol.clone(),
                        direction: position.direction,
                        entry: position.entry_price,
                        lot_size: position.lot_size,
                        stop: position.current_stop,
                    });
                    self.positions.insert(id, position);
                    report.opened += 1;
                }
                Err(e) => {
                    let err = GovernanceError::ExecutionFailed(e.to_string());
                    error!(symbol = %intent.symbol, error = %err, "Order failed, reservation rolled back");
                    self.ledger.rollback(reservation);
                    report.execution_failures += 1;
                    self.notify(GovernanceEvent::ExecutionFailed {
                        symbol: intent.symbol.clone(),
                        position_id: None,
                        error: err.to_string(),
                    });
                }
            }
        }

        self.check_drawdown();

        info!(
            signals = report.signals,
            skipped = report.skipped,
            admitted = report.admitted,
            opened = report.opened,
            rejected = report.rejected,
            "Cycle complete"
        );
        Ok(report)
    }

    /// Keep the strongest signal per symbol from the configured universe.
    fn one_per_symbol(&self, signals: Vec<Signal>) -> Vec<Signal> {
        let mut best: HashMap<String, Signal> = HashMap::new();
        for signal in signals {
            if !self.config.symbols.contains(&signal.symbol) {
                debug!(symbol = %signal.symbol, "Signal for symbol outside universe ignored");
                continue;
            }
            match best.get(&signal.symbol) {
                Some(existing) if existing.strength_score >= signal.strength_score => {}
                _ => {
                    best.insert(signal.symbol.clone(), signal);
                }
            }
        }
        let mut out: Vec<Signal> = best.into_values().collect();
        out.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        out
    }

    fn is_reversal(&self, signal: &Signal, direction: Direction) -> bool {
        if !self.config.signals.reversal_exit
            || signal.strength_score < self.config.signals.reversal_strength
        {
            return false;
        }
        self.positions
            .iter()
            .any(|p| p.symbol == signal.symbol && p.direction != direction && !p.is_closed())
    }

    async fn close_on_reversal(&self, symbol: &str, price: Decimal) -> bool {
        let id = self
            .positions
            .iter()
            .find(|p| p.symbol == symbol)
            .map(|p| p.id);
        let Some(id) = id else {
            return false;
        };

        let step = {
            let Some(mut position) = self.positions.get_mut(&id) else {
                return false;
            };
            self.exits.force_close(&mut position, price, ExitReason::Reversal)
        };

        match step {
            Some(step) => {
                info!(position_id = id, symbol = %symbol, "Closing on strong opposing signal");
                self.dispatch(vec![step]).await;
                self.remove_if_closed(id);
                true
            }
            None => false,
        }
    }

    /// Evaluate every open position against a fresh quote.
    pub async fn process_ticks(&self, now: DateTime<Utc>) -> TickReport {
        self.roll_day(now);
        let mut report = TickReport::default();

        let open: Vec<(PositionId, String)> = self
            .positions
            .iter()
            .map(|p| (p.id, p.symbol.clone()))
            .collect();
        if open.is_empty() {
            return report;
        }

        let quotes = futures::future::join_all(
            open.iter().map(|(_, symbol)| self.collaborators.prices.quote(symbol)),
        )
        .await;

        for ((id, symbol), quote) in open.into_iter().zip(quotes) {
            let price = match quote {
                Ok(Some(quote)) => quote.price,
                Ok(None) => {
                    self.report_stale(id, &symbol, None);
                    report.stale += 1;
                    continue;
                }
                Err(e) => {
                    self.report_stale(id, &symbol, Some(e));
                    report.stale += 1;
                    continue;
                }
            };

            let steps = {
                let Some(mut position) = self.positions.get_mut(&id) else {
                    continue;
                };
                self.exits.on_price(&mut position, price)
            };
            report.evaluated += 1;
            report.transitions += steps.len();

            self.dispatch(steps).await;
            if self.remove_if_closed(id) {
                report.closed += 1;
            }
        }

        self.check_drawdown();
        report
    }

    fn report_stale(&self, id: PositionId, symbol: &str, error: Option<anyhow::Error>) {
        let err = GovernanceError::StaleState {
            symbol: symbol.to_string(),
        };
        match error {
            Some(e) => warn!(position_id = id, error = %e, "{}, position left unchanged", err),
            None => warn!(position_id = id, "{}, position left unchanged", err),
        }
        self.notify(GovernanceEvent::StaleState {
            symbol: symbol.to_string(),
            position_id: id,
        });
    }

    /// Send exit instructions to the broker. No lock is held here.
    async fn dispatch(&self, steps: Vec<ExitTransition>) {
        for step in steps {
            for event in GovernanceEvent::for_transition(&step) {
                self.notify(event);
            }
            if let Err(e) = self
                .collaborators
                .execution
                .modify_or_close(&step.instruction)
                .await
            {
                let err = GovernanceError::ExecutionFailed(e.to_string());
                error!(
                    position_id = step.instruction.position_id,
                    symbol = %step.instruction.symbol,
                    action = ?step.instruction.action,
                    error = %err,
                    "Exit instruction failed"
                );
                self.notify(GovernanceEvent::ExecutionFailed {
                    symbol: step.instruction.symbol.clone(),
                    position_id: Some(step.instruction.position_id),
                    error: err.to_string(),
                });
            }
        }
    }

    fn remove_if_closed(&self, id: PositionId) -> bool {
        match self.positions.remove_if(&id, |_, p| p.is_closed()) {
            Some((_, position)) => {
                info!(
                    position_id = id,
                    symbol = %position.symbol,
                    pnl = %position.realized_pnl,
                    held_minutes = holding_minutes(&position, Utc::now()),
                    "Position removed"
                );
                self.closed_pnls.lock().push(position.realized_pnl);
                true
            }
            None => false,
        }
    }
}

fn day_summary_event(summary: DaySummary) -> GovernanceEvent {
    let stats = SessionStats::from_pnls(&summary.closed_trade_pnls);
    GovernanceEvent::DaySummary {
        date: summary.date,
        realized_pnl: summary.realized_pnl,
        trades_opened: summary.trades_opened,
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ChannelNotifier;
    use crate::models::{Fill, ModifyOrCloseIntent, OrderIntent, Quote};
    use crate::trading::PolicyMode;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use tokio::sync::mpsc::UnboundedReceiver;

    #[derive(Default)]
    struct Scripted {
        signals: Mutex<Vec<Signal>>,
        prices: Mutex<HashMap<String, Decimal>>,
        fail_orders_for: Mutex<Vec<String>>,
        instructions: Mutex<Vec<ModifyOrCloseIntent>>,
    }

    #[async_trait]
    impl SignalSource for Scripted {
        async fn fetch_signals(&self, _: &[String], _: &[String]) -> Result<Vec<Signal>> {
            Ok(self.signals.lock().clone())
        }
    }

    #[async_trait]
    impl PriceFeed for Scripted {
        async fn quote(&self, symbol: &str) -> Result<Option<Quote>> {
            Ok(self.prices.lock().get(symbol).map(|price| Quote {
                price: *price,
                atr: None,
                timestamp: Utc::now(),
            }))
        }
    }

    #[async_trait]
    impl ExecutionSink for Scripted {
        async fn place_order(&self, order: &OrderIntent) -> Result<Fill> {
            if self.fail_orders_for.lock().contains(&order.symbol) {
                anyhow::bail!("broker rejected {}", order.symbol);
            }
            Ok(Fill {
                order_id: format!("test-{}", order.symbol),
                price: order.entry_price_hint,
                timestamp: Utc::now(),
            })
        }

        async fn modify_or_close(&self, instruction: &ModifyOrCloseIntent) -> Result<Fill> {
            self.instructions.lock().push(instruction.clone());
            Ok(Fill {
                order_id: "test-close".to_string(),
                price: instruction.reference_price,
                timestamp: Utc::now(),
            })
        }
    }

    fn signal(symbol: &str, direction: Direction, strength: f64, volume: f64) -> Signal {
        Signal {
            symbol: symbol.to_string(),
            raw_direction: direction,
            strength_score: strength,
            volume_score: volume,
            atr: dec!(0.0010),
            price: dec!(1.1000),
            timestamp: Utc::now(),
            timeframe_confluence: "M5+M15".to_string(),
        }
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, hour, 0, 0).unwrap()
    }

    fn governor(
        config: GovernorConfig,
    ) -> (Governor, Arc<Scripted>, UnboundedReceiver<GovernanceEvent>) {
        let scripted = Arc::new(Scripted::default());
        let (notifier, rx) = ChannelNotifier::channel();
        let collaborators = Collaborators {
            signals: scripted.clone(),
            prices: scripted.clone(),
            execution: scripted.clone(),
            notifier: Arc::new(notifier),
        };
        (Governor::new(config, collaborators, at(9)), scripted, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<GovernanceEvent>) -> Vec<GovernanceEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_contrarian_cycle_opens_inverse_trades() {
        let (gov, scripted, mut rx) = governor(GovernorConfig::default());
        *scripted.signals.lock() = vec![
            signal("EURUSDm", Direction::Buy, 8.6, 3.0),
            signal("GBPUSDm", Direction::Sell, 9.3, 3.0),
            signal("USDCHFm", Direction::Buy, 6.0, 9.0),
        ];

        let report = gov.run_cycle(at(10)).await.unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.opened, 2);

        // Priority candidate fills first
        let positions = gov.open_positions();
        assert_eq!(positions[0].symbol, "GBPUSDm");
        assert_eq!(positions[0].direction, Direction::Buy);
        assert_eq!(positions[1].symbol, "EURUSDm");
        assert_eq!(positions[1].direction, Direction::Sell);

        let kinds: Vec<_> = drain(&mut rx).iter().map(|e| e.kind()).collect();
        assert!(kinds.contains(&"signal_skipped"));
        assert_eq!(kinds.iter().filter(|k| **k == "position_opened").count(), 2);
    }

    #[tokio::test]
    async fn test_volume_gated_cycle() {
        let mut config = GovernorConfig::default();
        config.policy = PolicyMode::VolumeGated;
        let (gov, scripted, _rx) = governor(config);
        *scripted.signals.lock() = vec![
            signal("EURUSDm", Direction::Sell, 9.5, 7.9),
            signal("GBPUSDm", Direction::Sell, 8.1, 8.4),
        ];

        let report = gov.run_cycle(at(10)).await.unwrap();
        assert_eq!(report.skipped, 1);
        let positions = gov.open_positions();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].symbol, "GBPUSDm");
        assert_eq!(positions[0].direction, Direction::Sell);
    }

    #[tokio::test]
    async fn test_failed_order_rolls_back_only_that_candidate() {
        let (gov, scripted, mut rx) = governor(GovernorConfig::default());
        *scripted.signals.lock() = vec![
            signal("EURUSDm", Direction::Buy, 9.1, 3.0),
            signal("GBPUSDm", Direction::Buy, 8.8, 3.0),
            signal("USDJPYm", Direction::Buy, 8.2, 3.0),
        ];
        scripted.fail_orders_for.lock().push("EURUSDm".to_string());

        let report = gov.run_cycle(at(10)).await.unwrap();
        assert_eq!(report.admitted, 2);
        assert_eq!(report.execution_failures, 1);
        assert_eq!(report.opened, 1);

        let snapshot = gov.ledger().snapshot();
        assert_eq!(snapshot.open_trade_count, 1);
        assert_eq!(gov.open_positions()[0].symbol, "GBPUSDm");
        assert!(drain(&mut rx).iter().any(|e| e.kind() == "execution_failed"));

        // The freed slot is available next cycle
        scripted.fail_orders_for.lock().clear();
        *scripted.signals.lock() = vec![signal("USDJPYm", Direction::Buy, 8.2, 3.0)];
        let report = gov.run_cycle(at(10)).await.unwrap();
        assert_eq!(report.opened, 1);
        assert_eq!(gov.ledger().snapshot().open_trade_count, 2);
    }

    #[tokio::test]
    async fn test_ticks_drive_exits_and_release_slots() {
        let (gov, scripted, mut rx) = governor(GovernorConfig::default());
        *scripted.signals.lock() = vec![signal("EURUSDm", Direction::Sell, 8.5, 3.0)];
        gov.run_cycle(at(10)).await.unwrap();
        // Contrarian buy at 1.1000, ATR 0.0010: stop 1.0985, TP1 1.1015
        let position = &gov.open_positions()[0];
        assert_eq!(position.direction, Direction::Buy);
        assert_eq!(position.levels.tp1, dec!(1.1015));

        scripted.prices.lock().insert("EURUSDm".to_string(), dec!(1.1016));
        let report = gov.process_ticks(at(10)).await;
        assert_eq!(report.transitions, 1);
        assert_eq!(gov.open_positions()[0].remaining_size_fraction, dec!(0.5));

        scripted.prices.lock().insert("EURUSDm".to_string(), dec!(1.0984));
        let report = gov.process_ticks(at(11)).await;
        assert_eq!(report.closed, 1);
        assert!(gov.open_positions().is_empty());
        assert_eq!(gov.ledger().snapshot().open_trade_count, 0);
        assert_eq!(scripted.instructions.lock().len(), 2);
        assert_eq!(gov.session_stats().total_trades, 1);

        let kinds: Vec<_> = drain(&mut rx).iter().map(|e| e.kind()).collect();
        assert!(kinds.contains(&"take_profit_hit"));
        assert!(kinds.contains(&"position_closed"));
    }

    #[tokio::test]
    async fn test_missing_quote_leaves_position_unchanged() {
        let (gov, scripted, mut rx) = governor(GovernorConfig::default());
        *scripted.signals.lock() = vec![signal("EURUSDm", Direction::Sell, 8.5, 3.0)];
        gov.run_cycle(at(10)).await.unwrap();
        let before = gov.open_positions()[0].clone();

        let report = gov.process_ticks(at(10)).await;
        assert_eq!(report.stale, 1);
        let after = &gov.open_positions()[0];
        assert_eq!(after.state, before.state);
        assert_eq!(after.current_stop, before.current_stop);
        assert!(drain(&mut rx).iter().any(|e| e.kind() == "stale_state"));
    }

    #[tokio::test]
    async fn test_drawdown_blocks_rest_of_day_then_resets() {
        let mut config = GovernorConfig::default();
        config.risk.max_concurrent_trades = 5;
        // A 15 pip stop at 0.03 lots loses $4.50
        config.risk.max_daily_drawdown = dec!(4);
        let (gov, scripted, mut rx) = governor(config);

        *scripted.signals.lock() = vec![signal("EURUSDm", Direction::Sell, 8.5, 3.0)];
        gov.run_cycle(at(10)).await.unwrap();
        scripted.prices.lock().insert("EURUSDm".to_string(), dec!(1.0980));
        gov.process_ticks(at(10)).await;
        assert!(gov.ledger().snapshot().trading_blocked);

        *scripted.signals.lock() = vec![signal("GBPUSDm", Direction::Sell, 9.5, 3.0)];
        let report = gov.run_cycle(at(12)).await.unwrap();
        assert_eq!(report.opened, 0);
        let events = drain(&mut rx);
        assert_eq!(
            events.iter().filter(|e| e.kind() == "drawdown_limit_reached").count(),
            1
        );

        let next_day = Utc.with_ymd_and_hms(2024, 3, 5, 1, 0, 0).unwrap();
        let report = gov.run_cycle(next_day).await.unwrap();
        assert_eq!(report.opened, 1);
        assert!(drain(&mut rx).iter().any(|e| e.kind() == "day_summary"));
    }

    #[tokio::test]
    async fn test_outside_trading_window() {
        let mut config = GovernorConfig::default();
        config.sessions.trading_start_hour = 7;
        config.sessions.trading_end_hour = 20;
        let (gov, scripted, _rx) = governor(config);
        *scripted.signals.lock() = vec![signal("EURUSDm", Direction::Sell, 9.0, 3.0)];

        let report = gov.run_cycle(at(22)).await.unwrap();
        assert_eq!(report.opened, 0);
        assert_eq!(report.rejected, 1);
    }

    #[tokio::test]
    async fn test_drawdown_reported_outside_trading_window() {
        let mut config = GovernorConfig::default();
        config.sessions.trading_start_hour = 7;
        config.sessions.trading_end_hour = 20;
        let (gov, scripted, mut rx) = governor(config);

        gov.ledger().release_on_close(&crate::trading::CloseRelease {
            position_id: 99,
            symbol: "USDCADm".to_string(),
            realized_pnl: dec!(-21),
            risk_released: Decimal::ZERO,
            unrealized_after: Decimal::ZERO,
            position_closed: false,
            trade_pnl: None,
        });
        *scripted.signals.lock() = vec![signal("EURUSDm", Direction::Sell, 9.0, 3.0)];

        gov.run_cycle(at(22)).await.unwrap();
        let events = drain(&mut rx);
        assert_eq!(
            events.iter().filter(|e| e.kind() == "drawdown_limit_reached").count(),
            1
        );
    }

    #[tokio::test]
    async fn test_default_levels_are_raw_atr_multiples() {
        let mut config = GovernorConfig::default();
        // A 60 pip stop needs more than $5 to reach the minimum lot
        config.risk.fixed_risk_amount = dec!(10);
        let (gov, scripted, mut rx) = governor(config);

        let mut sell = signal("EURUSDm", Direction::Sell, 8.5, 3.0);
        sell.price = dec!(1.2000);
        sell.atr = dec!(0.0040);
        *scripted.signals.lock() = vec![sell];
        gov.run_cycle(at(10)).await.unwrap();

        let position = &gov.open_positions()[0];
        assert_eq!(position.direction, Direction::Buy);
        assert_eq!(position.levels.tp1, dec!(1.2060));
        assert_eq!(position.levels.tp2, dec!(1.2120));
        assert_eq!(position.levels.tp3, dec!(1.2180));
        assert_eq!(position.current_stop, dec!(1.1940));

        scripted.prices.lock().insert("EURUSDm".to_string(), dec!(1.2061));
        let report = gov.process_ticks(at(10)).await;
        assert_eq!(report.transitions, 1);
        let position = &gov.open_positions()[0];
        assert_eq!(position.tp_stage, crate::models::TpStage::Tp1Hit);
        assert_eq!(position.remaining_size_fraction, dec!(0.5));
        assert!(drain(&mut rx).iter().any(|e| matches!(
            e,
            GovernanceEvent::TakeProfitHit { tier: 1, .. }
        )));
    }

    #[tokio::test]
    async fn test_reversal_exit() {
        let mut config = GovernorConfig::default();
        config.signals.reversal_exit = true;
        let (gov, scripted, _rx) = governor(config);

        *scripted.signals.lock() = vec![signal("EURUSDm", Direction::Sell, 8.5, 3.0)];
        gov.run_cycle(at(10)).await.unwrap();
        assert_eq!(gov.open_positions()[0].direction, Direction::Buy);

        // Contrarian of a BUY is a SELL, opposing the open buy
        *scripted.signals.lock() = vec![signal("EURUSDm", Direction::Buy, 8.5, 3.0)];
        let report = gov.run_cycle(at(11)).await.unwrap();
        assert_eq!(report.reversals, 1);
        let positions = gov.open_positions();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].direction, Direction::Sell);
    }

    #[tokio::test]
    async fn test_unsizable_candidate_does_not_take_slot() {
        let mut config = GovernorConfig::default();
        config.risk.max_concurrent_trades = 1;
        let (gov, scripted, _rx) = governor(config);

        let mut wide = signal("EURUSDm", Direction::Buy, 9.8, 3.0);
        // 60 pip stop: $5 buys less than the minimum lot
        wide.atr = dec!(0.0040);
        *scripted.signals.lock() = vec![wide, signal("GBPUSDm", Direction::Buy, 8.3, 3.0)];

        let report = gov.run_cycle(at(10)).await.unwrap();
        assert_eq!(report.opened, 1);
        assert_eq!(gov.open_positions()[0].symbol, "GBPUSDm");
    }
}
