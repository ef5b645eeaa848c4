//! Ledger facade — owns the invariant-checking boundary around the raw
//! weighted-average-cost accounting in [`crate::accounting`].
//!
//! `Ledger` enforces invariants on every append (positive quantity and
//! price, non-negative commission, non-empty symbol) and exposes a
//! minimal write surface (`record_fill`) plus read-only snapshots. The
//! accounting math itself lives in `accounting.rs`; this module never
//! touches a `Position`'s fields directly.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use qtx_schemas::{Micros, Position, Side, TradeRecord};

use crate::accounting::apply_fill;
use crate::metrics::{self, ExposureBreach, MarkMap};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    NonPositiveQuantity { quantity: i64 },
    NonPositivePrice,
    NegativeCommission,
    EmptySymbol,
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerError::NonPositiveQuantity { quantity } => {
                write!(f, "ledger invariant: quantity must be > 0, got {quantity}")
            }
            LedgerError::NonPositivePrice => {
                write!(f, "ledger invariant: price must be > 0")
            }
            LedgerError::NegativeCommission => {
                write!(f, "ledger invariant: commission must be >= 0")
            }
            LedgerError::EmptySymbol => write!(f, "ledger invariant: symbol must not be empty"),
        }
    }
}

impl std::error::Error for LedgerError {}

/// Read-only view of the ledger's derived state at a point in time.
#[derive(Clone, Debug, PartialEq)]
pub struct LedgerSnapshot {
    pub cash: Micros,
    pub realized_pnl: Micros,
    pub positions: BTreeMap<String, Position>,
    pub fill_count: usize,
}

impl LedgerSnapshot {
    pub fn quantity(&self, symbol: &str) -> i64 {
        self.positions.get(symbol).map(|p| p.quantity).unwrap_or(0)
    }

    pub fn is_flat(&self) -> bool {
        self.positions.values().all(Position::is_flat)
    }
}

/// Append-only, deterministic ledger. Two ledgers fed the same sequence
/// of fills end up in identical states; no IO, no clock reads beyond
/// the caller-supplied timestamp.
#[derive(Clone, Debug)]
pub struct Ledger {
    cash: Micros,
    realized_pnl: Micros,
    positions: BTreeMap<String, Position>,
    fill_count: usize,
    closed_trades: Vec<TradeRecord>,
}

impl Ledger {
    pub fn new(initial_cash: Micros) -> Self {
        Ledger {
            cash: initial_cash,
            realized_pnl: Micros::ZERO,
            positions: BTreeMap::new(),
            fill_count: 0,
            closed_trades: Vec::new(),
        }
    }

    /// Record one fill, updating cash, the symbol's position, and
    /// realized PnL. `commission` is subtracted from cash directly; it
    /// does not affect cost basis.
    pub fn record_fill(
        &mut self,
        symbol: &str,
        side: Side,
        quantity: i64,
        price: Micros,
        commission: Micros,
        now: DateTime<Utc>,
    ) -> Result<Micros, LedgerError> {
        if symbol.trim().is_empty() {
            return Err(LedgerError::EmptySymbol);
        }
        if quantity <= 0 {
            return Err(LedgerError::NonPositiveQuantity { quantity });
        }
        if price.raw() <= 0 {
            return Err(LedgerError::NonPositivePrice);
        }
        if commission.raw() < 0 {
            return Err(LedgerError::NegativeCommission);
        }

        let position = self
            .positions
            .entry(symbol.to_string())
            .or_insert_with(|| Position::flat(symbol, now));

        let was_open = !position.is_flat();
        let opened_at = position.opened_at;

        let effect = apply_fill(position, side, quantity, price, now);

        let notional = price.scale(quantity as f64);
        self.cash = match side {
            Side::Buy => self.cash - notional - commission,
            Side::Sell => self.cash + notional - commission,
        };
        self.realized_pnl = self.realized_pnl + effect.realized_pnl;
        self.fill_count += 1;

        if was_open && position.is_flat() {
            self.closed_trades.push(TradeRecord {
                symbol: symbol.to_string(),
                pnl: effect.realized_pnl,
                opened_at,
                closed_at: now,
                entry_price: position.avg_cost,
                exit_price: price,
            });
        }

        Ok(effect.realized_pnl)
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            cash: self.cash,
            realized_pnl: self.realized_pnl,
            positions: self.positions.clone(),
            fill_count: self.fill_count,
        }
    }

    pub fn cash(&self) -> Micros {
        self.cash
    }

    pub fn realized_pnl(&self) -> Micros {
        self.realized_pnl
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn closed_trades(&self) -> &[TradeRecord] {
        &self.closed_trades
    }

    pub fn is_flat(&self) -> bool {
        self.positions.values().all(Position::is_flat)
    }

    pub fn equity(&self, marks: &MarkMap) -> Micros {
        metrics::compute_equity(self.cash, &self.positions, marks)
    }

    pub fn unrealized_pnl(&self, marks: &MarkMap) -> Micros {
        metrics::compute_unrealized_pnl(&self.positions, marks)
    }

    pub fn enforce_max_gross_exposure(
        &self,
        marks: &MarkMap,
        max_gross: Micros,
    ) -> Result<(), ExposureBreach> {
        metrics::enforce_max_gross_exposure(&self.positions, marks, max_gross)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::marks;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 2, 9, 30, 0).unwrap()
    }

    #[test]
    fn rejects_zero_quantity() {
        let mut l = Ledger::new(Micros::from_f64(100_000.0));
        let err = l.record_fill("AAPL", Side::Buy, 0, Micros::from_f64(100.0), Micros::ZERO, now());
        assert_eq!(err, Err(LedgerError::NonPositiveQuantity { quantity: 0 }));
    }

    #[test]
    fn rejects_empty_symbol() {
        let mut l = Ledger::new(Micros::from_f64(100_000.0));
        let err = l.record_fill("", Side::Buy, 10, Micros::from_f64(100.0), Micros::ZERO, now());
        assert_eq!(err, Err(LedgerError::EmptySymbol));
    }

    #[test]
    fn buy_reduces_cash_by_notional_and_commission() {
        let mut l = Ledger::new(Micros::from_f64(100_000.0));
        l.record_fill(
            "AAPL",
            Side::Buy,
            10,
            Micros::from_f64(100.0),
            Micros::from_f64(1.0),
            now(),
        )
        .unwrap();

        assert_eq!(l.cash(), Micros::from_f64(98_999.0));
        assert_eq!(l.position("AAPL").unwrap().quantity, 10);
    }

    #[test]
    fn closing_a_position_records_a_trade() {
        let mut l = Ledger::new(Micros::from_f64(100_000.0));
        l.record_fill("AAPL", Side::Buy, 10, Micros::from_f64(100.0), Micros::ZERO, now())
            .unwrap();
        l.record_fill("AAPL", Side::Sell, 10, Micros::from_f64(120.0), Micros::ZERO, now())
            .unwrap();

        assert!(l.is_flat());
        assert_eq!(l.realized_pnl(), Micros::from_f64(200.0));
        assert_eq!(l.closed_trades().len(), 1);
        assert_eq!(l.closed_trades()[0].pnl, Micros::from_f64(200.0));
    }

    #[test]
    fn equity_tracks_mark_to_market_value() {
        let mut l = Ledger::new(Micros::from_f64(100_000.0));
        l.record_fill("AAPL", Side::Buy, 10, Micros::from_f64(100.0), Micros::ZERO, now())
            .unwrap();

        let mk = marks([("AAPL", Micros::from_f64(110.0))]);
        assert_eq!(l.equity(&mk), Micros::from_f64(100_100.0));
    }

    #[test]
    fn snapshot_is_a_consistent_read_only_copy() {
        let mut l = Ledger::new(Micros::from_f64(10_000.0));
        l.record_fill("AAPL", Side::Buy, 5, Micros::from_f64(100.0), Micros::ZERO, now())
            .unwrap();

        let snap = l.snapshot();
        assert_eq!(snap.quantity("AAPL"), 5);
        assert!(!snap.is_flat());
        assert_eq!(snap.fill_count, 1);
    }
}
