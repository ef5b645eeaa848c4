//! Performance analytics derived from closed trades and portfolio-value
//! snapshots. Pure functions over explicit inputs — no lock, no clock.

use chrono::{DateTime, Utc};
use qtx_schemas::{Micros, TradeRecord};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Clone, Debug, PartialEq)]
pub struct PerformanceSummary {
    pub sharpe_ratio: Option<f64>,
    pub max_drawdown_pct: Option<f64>,
    pub max_drawdown_dollars: Option<Micros>,
    pub win_rate: Option<f64>,
    pub avg_win: Option<Micros>,
    pub avg_loss: Option<Micros>,
    pub total_trades: usize,
    pub realized_pnl: Micros,
    pub cash: Micros,
    pub equity: Micros,
}

/// Annualized Sharpe ratio from per-trade returns `pnl_i / initial_cash`.
/// `None` with fewer than two closed trades (sample stddev undefined).
pub fn sharpe_ratio(trades: &[TradeRecord], initial_cash: Micros) -> Option<f64> {
    if trades.len() < 2 || initial_cash.raw() <= 0 {
        return None;
    }

    let returns: Vec<f64> = trades
        .iter()
        .map(|t| t.pnl.to_f64() / initial_cash.to_f64())
        .collect();

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let stddev = variance.sqrt();

    if stddev == 0.0 {
        return None;
    }

    let ann_mean = mean * TRADING_DAYS_PER_YEAR;
    let ann_std = stddev * TRADING_DAYS_PER_YEAR.sqrt();
    Some(ann_mean / ann_std)
}

/// Maximum peak-to-trough drawdown over an ordered sequence of
/// `(timestamp, portfolio_value)` snapshots. Returns the drawdown as a
/// negative fraction (e.g. `-0.12` for a 12% drawdown) and its dollar
/// amount. `None` for fewer than one snapshot.
pub fn max_drawdown(snapshots: &[(DateTime<Utc>, Micros)]) -> Option<(f64, Micros)> {
    if snapshots.is_empty() {
        return None;
    }

    let mut peak = snapshots[0].1;
    let mut worst_pct = 0.0_f64;
    let mut worst_dollars = Micros::ZERO;

    for &(_, value) in snapshots {
        if value.raw() > peak.raw() {
            peak = value;
        }
        if peak.raw() <= 0 {
            continue;
        }
        let drawdown_dollars = peak - value;
        let drawdown_pct = drawdown_dollars.to_f64() / peak.to_f64();
        if drawdown_pct > worst_pct {
            worst_pct = drawdown_pct;
            worst_dollars = drawdown_dollars;
        }
    }

    Some((-worst_pct, worst_dollars))
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WinLossStats {
    pub win_rate: Option<f64>,
    pub avg_win: Option<Micros>,
    pub avg_loss: Option<Micros>,
}

pub fn win_loss_stats(trades: &[TradeRecord]) -> WinLossStats {
    let mut wins = Vec::new();
    let mut losses = Vec::new();

    for trade in trades {
        if trade.pnl.raw() > 0 {
            wins.push(trade.pnl);
        } else if trade.pnl.raw() < 0 {
            losses.push(trade.pnl);
        }
    }

    let total = wins.len() + losses.len();
    let win_rate = if total > 0 {
        Some(wins.len() as f64 / total as f64)
    } else {
        None
    };

    let avg_win = mean_micros(&wins);
    let avg_loss = mean_micros(&losses);

    WinLossStats {
        win_rate,
        avg_win,
        avg_loss,
    }
}

fn mean_micros(values: &[Micros]) -> Option<Micros> {
    if values.is_empty() {
        return None;
    }
    let sum: i128 = values.iter().map(|m| m.raw() as i128).sum();
    Some(Micros::new((sum / values.len() as i128) as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 2, 9, 30, 0).unwrap()
    }

    fn trade(pnl: f64) -> TradeRecord {
        TradeRecord {
            symbol: "AAPL".to_string(),
            pnl: Micros::from_f64(pnl),
            opened_at: now(),
            closed_at: now(),
            entry_price: Micros::from_f64(100.0),
            exit_price: Micros::from_f64(100.0 + pnl),
        }
    }

    #[test]
    fn sharpe_is_none_below_two_samples() {
        assert_eq!(sharpe_ratio(&[trade(10.0)], Micros::from_f64(100_000.0)), None);
    }

    #[test]
    fn sharpe_is_positive_for_consistently_winning_trades() {
        let trades = vec![trade(100.0), trade(120.0), trade(90.0), trade(110.0)];
        let sharpe = sharpe_ratio(&trades, Micros::from_f64(100_000.0)).unwrap();
        assert!(sharpe > 0.0);
    }

    #[test]
    fn max_drawdown_tracks_running_peak() {
        let snapshots = vec![
            (now(), Micros::from_f64(100_000.0)),
            (now(), Micros::from_f64(110_000.0)),
            (now(), Micros::from_f64(99_000.0)),
            (now(), Micros::from_f64(105_000.0)),
        ];
        let (pct, dollars) = max_drawdown(&snapshots).unwrap();
        // (110_000 - 99_000) / 110_000
        assert!((pct - (-0.1)).abs() < 1e-9);
        assert_eq!(dollars, Micros::from_f64(11_000.0));
    }

    #[test]
    fn win_rate_and_averages_split_on_sign() {
        let trades = vec![trade(100.0), trade(-50.0), trade(200.0), trade(-50.0)];
        let stats = win_loss_stats(&trades);
        assert_eq!(stats.win_rate, Some(0.5));
        assert_eq!(stats.avg_win, Some(Micros::from_f64(150.0)));
        assert_eq!(stats.avg_loss, Some(Micros::from_f64(-50.0)));
    }

    #[test]
    fn empty_trades_produce_no_stats() {
        let stats = win_loss_stats(&[]);
        assert_eq!(stats.win_rate, None);
        assert_eq!(stats.avg_win, None);
    }
}
