//! Session statistics over closed-trade P&L: win rate, profit factor, drawdown.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use statrs::statistics::Statistics;

/// Summary statistics for a set of closed trades.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionStats {
    pub total_trades: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    pub total_pnl: Decimal,
    pub win_rate: f64,
    pub avg_win: Decimal,
    pub avg_loss: Decimal,
    pub profit_factor: f64,
    pub expectancy: Decimal,

    /// Mean and sample standard deviation of per-trade P&L
    pub mean_pnl: f64,
    pub std_dev_pnl: f64,

    /// Largest peak-to-trough fall of the cumulative P&L curve, in dollars
    pub max_drawdown: Decimal,
}

impl SessionStats {
    /// Compute statistics from closed-trade P&Ls in close order.
    pub fn from_pnls(pnls: &[Decimal]) -> Self {
        let mut stats = Self::default();
        if pnls.is_empty() {
            return stats;
        }

        let (wins, losses): (Vec<Decimal>, Vec<Decimal>) =
            pnls.iter().partition(|&&p| p > Decimal::ZERO);

        stats.total_trades = pnls.len() as u32;
        stats.winning_trades = wins.len() as u32;
        stats.losing_trades = losses.len() as u32;
        stats.total_pnl = pnls.iter().copied().sum();
        stats.win_rate = wins.len() as f64 / pnls.len() as f64;
        stats.expectancy = stats.total_pnl / Decimal::from(stats.total_trades);

        if !wins.is_empty() {
            stats.avg_win = wins.iter().copied().sum::<Decimal>() / Decimal::from(wins.len() as u32);
        }
        if !losses.is_empty() {
            stats.avg_loss = losses.iter().map(|l| l.abs()).sum::<Decimal>()
                / Decimal::from(losses.len() as u32);
        }

        let gross_profit: Decimal = wins.iter().copied().sum();
        let gross_loss: Decimal = losses.iter().map(|l| l.abs()).sum();
        if gross_loss > Decimal::ZERO {
            stats.profit_factor =
                gross_profit.to_f64().unwrap_or(0.0) / gross_loss.to_f64().unwrap_or(1.0);
        } else if gross_profit > Decimal::ZERO {
            stats.profit_factor = f64::INFINITY;
        }

        let values: Vec<f64> = pnls.iter().filter_map(|p| p.to_f64()).collect();
        stats.mean_pnl = values.iter().mean();
        if values.len() >= 2 {
            stats.std_dev_pnl = values.iter().std_dev();
        }

        stats.max_drawdown = max_drawdown(pnls);
        stats
    }
}

fn max_drawdown(pnls: &[Decimal]) -> Decimal {
    let mut equity = Decimal::ZERO;
    let mut peak = Decimal::ZERO;
    let mut max_dd = Decimal::ZERO;

    for pnl in pnls {
        equity += pnl;
        if equity > peak {
            peak = equity;
        }
        max_dd = max_dd.max(peak - equity);
    }
    max_dd
}

impl std::fmt::Display for SessionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n{:=^50}", " SESSION ")?;
        writeln!(f, "Trades:        {}", self.total_trades)?;
        writeln!(f, "Winners:       {} ({:.1}%)", self.winning_trades, self.win_rate * 100.0)?;
        writeln!(f, "Losers:        {}", self.losing_trades)?;
        writeln!(f, "Total P&L:     ${:.2}", self.total_pnl)?;
        writeln!(f, "Avg Win:       ${:.2}", self.avg_win)?;
        writeln!(f, "Avg Loss:      ${:.2}", self.avg_loss)?;
        writeln!(f, "Profit Factor: {:.2}", self.profit_factor)?;
        writeln!(f, "Expectancy:    ${:.2}", self.expectancy)?;
        writeln!(f, "P&L Std Dev:   ${:.2}", self.std_dev_pnl)?;
        writeln!(f, "Max Drawdown:  ${:.2}", self.max_drawdown)?;
        writeln!(f, "{:=^50}", "")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_session_stats() {
        let pnls = vec![dec!(12), dec!(-5), dec!(24.4), dec!(-5), dec!(8.6)];
        let stats = SessionStats::from_pnls(&pnls);

        assert_eq!(stats.total_trades, 5);
        assert_eq!(stats.winning_trades, 3);
        assert_eq!(stats.losing_trades, 2);
        assert_eq!(stats.total_pnl, dec!(35));
        assert!((stats.win_rate - 0.6).abs() < 1e-9);
        assert_eq!(stats.avg_loss, dec!(5));
        assert!((stats.profit_factor - 4.5).abs() < 1e-9);
        assert!((stats.mean_pnl - 7.0).abs() < 1e-9);
        assert!(stats.std_dev_pnl > 0.0);
    }

    #[test]
    fn test_max_drawdown() {
        let pnls = vec![dec!(10), dec!(-5), dec!(-5), dec!(3), dec!(-6)];
        // peak 10, trough -3
        assert_eq!(SessionStats::from_pnls(&pnls).max_drawdown, dec!(13));
    }

    #[test]
    fn test_empty() {
        let stats = SessionStats::from_pnls(&[]);
        assert_eq!(stats.total_trades, 0);
        assert_eq!(stats.total_pnl, Decimal::ZERO);
    }
}
