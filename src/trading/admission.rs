//! Per-cycle admission: rank directed candidates and grant risk slots.

use std::cmp::Ordering;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::error::{GovernanceError, RejectReason};
use crate::models::TradeIntent;

use super::{Reservation, RiskLedger, SignalConfig};

/// Result of one admission pass.
#[derive(Debug, Default)]
pub struct AdmissionOutcome {
    /// Admitted candidates in admission order, each holding its reservation
    pub admitted: Vec<(TradeIntent, Reservation)>,
    pub rejected: Vec<(TradeIntent, GovernanceError)>,
}

#[cfg(test)]
impl AdmissionOutcome {
    pub fn admitted_symbols(&self) -> Vec<&str> {
        self.admitted.iter().map(|(i, _)| i.symbol.as_str()).collect()
    }
}

/// Walks the ranked candidate list and reserves ledger slots.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    ledger: Arc<RiskLedger>,
    min_signal_strength: f64,
    priority_threshold: f64,
    fixed_risk_amount: Decimal,
}

impl AdmissionController {
    pub fn new(ledger: Arc<RiskLedger>, signals: &SignalConfig, fixed_risk_amount: Decimal) -> Self {
        Self {
            ledger,
            min_signal_strength: signals.min_signal_strength,
            priority_threshold: signals.priority_threshold,
            fixed_risk_amount,
        }
    }

    /// Filter, rank and admit this cycle's candidates.
    pub fn admit(&self, candidates: Vec<TradeIntent>) -> AdmissionOutcome {
        let mut outcome = AdmissionOutcome::default();

        let (eligible, weak): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|c| c.strength_score >= self.min_signal_strength);

        for intent in weak {
            outcome.rejected.push((
                intent,
                GovernanceError::AdmissionRejected(RejectReason::BelowMinimumStrength),
            ));
        }

        for intent in self.rank(eligible) {
            match self.ledger.reserve(&intent.symbol, self.fixed_risk_amount) {
                Ok(reservation) => {
                    info!(
                        symbol = %intent.symbol,
                        direction = %intent.direction,
                        strength = intent.strength_score,
                        rank = intent.priority_rank,
                        priority = intent.priority,
                        "Candidate admitted"
                    );
                    outcome.admitted.push((intent, reservation));
                }
                Err(e) => {
                    debug!(symbol = %intent.symbol, reason = %e, "Candidate rejected");
                    outcome.rejected.push((intent, e));
                }
            }
        }

        outcome
    }

    /// Stable ranking: priority candidates first, then strength, volume, symbol.
    pub fn rank(&self, mut candidates: Vec<TradeIntent>) -> Vec<TradeIntent> {
        candidates.sort_by(compare_candidates);

        let (mut ranked, rest): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|c| c.strength_score >= self.priority_threshold);
        for intent in ranked.iter_mut() {
            intent.priority = true;
        }
        ranked.extend(rest.into_iter().map(|mut intent| {
            intent.priority = false;
            intent
        }));

        for (rank, intent) in ranked.iter_mut().enumerate() {
            intent.priority_rank = rank;
        }
        ranked
    }
}

fn compare_candidates(a: &TradeIntent, b: &TradeIntent) -> Ordering {
    b.strength_score
        .total_cmp(&a.strength_score)
        .then_with(|| b.volume_score.total_cmp(&a.volume_score))
        .then_with(|| a.symbol.cmp(&b.symbol))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Direction;
    use crate::trading::RiskConfig;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn intent(symbol: &str, strength: f64, volume: f64) -> TradeIntent {
        TradeIntent {
            symbol: symbol.to_string(),
            direction: Direction::Buy,
            strength_score: strength,
            volume_score: volume,
            entry_price_hint: dec!(1.1000),
            atr: dec!(0.0012),
            priority_rank: 0,
            priority: false,
        }
    }

    fn controller(max_concurrent: usize) -> (AdmissionController, Arc<RiskLedger>) {
        let limits = RiskConfig {
            max_concurrent_trades: max_concurrent,
            ..Default::default()
        };
        let ledger = Arc::new(RiskLedger::new(limits, Utc::now()));
        let controller = AdmissionController::new(ledger.clone(), &SignalConfig::default(), dec!(5));
        (controller, ledger)
    }

    #[test]
    fn test_strongest_takes_last_slot() {
        let (controller, ledger) = controller(2);
        let held = ledger.reserve("USDCADm", dec!(5)).unwrap();

        let outcome = controller.admit(vec![intent("GBPUSDm", 8.2, 9.0), intent("EURUSDm", 9.5, 5.0)]);

        assert_eq!(outcome.admitted_symbols(), vec!["EURUSDm"]);
        assert_eq!(outcome.rejected.len(), 1);
        let (rejected, err) = &outcome.rejected[0];
        assert_eq!(rejected.symbol, "GBPUSDm");
        assert!(matches!(
            err,
            GovernanceError::AdmissionRejected(RejectReason::ConcurrencyLimit)
        ));
        ledger.rollback(held);
    }

    #[test]
    fn test_below_minimum_rejected() {
        let (controller, _ledger) = controller(2);
        let outcome = controller.admit(vec![intent("EURUSDm", 7.9, 10.0)]);
        assert!(outcome.admitted.is_empty());
        assert!(matches!(
            outcome.rejected[0].1,
            GovernanceError::AdmissionRejected(RejectReason::BelowMinimumStrength)
        ));
    }

    #[test]
    fn test_ranking_ties() {
        let (controller, _ledger) = controller(2);
        let ranked = controller.rank(vec![
            intent("USDJPYm", 8.5, 6.0),
            intent("AUDUSDm", 8.5, 6.0),
            intent("EURUSDm", 8.5, 9.0),
            intent("GBPUSDm", 9.2, 1.0),
        ]);
        let order: Vec<_> = ranked.iter().map(|i| i.symbol.as_str()).collect();
        assert_eq!(order, vec!["GBPUSDm", "EURUSDm", "AUDUSDm", "USDJPYm"]);
        assert!(ranked[0].priority);
        assert!(!ranked[1].priority);
        assert_eq!(ranked[3].priority_rank, 3);
    }

    #[test]
    fn test_never_exceeds_concurrency() {
        let (controller, ledger) = controller(2);
        let candidates = ["EURUSDm", "GBPUSDm", "USDJPYm", "AUDUSDm", "NZDUSDm"]
            .iter()
            .enumerate()
            .map(|(i, s)| intent(s, 8.0 + i as f64 * 0.3, 8.0))
            .collect();

        let outcome = controller.admit(candidates);
        assert_eq!(outcome.admitted.len(), 2);
        assert_eq!(outcome.rejected.len(), 3);
        assert!(ledger.snapshot().open_trade_count <= 2);
        // 9.2 and 8.9
        assert_eq!(outcome.admitted_symbols(), vec!["NZDUSDm", "AUDUSDm"]);
    }
}
