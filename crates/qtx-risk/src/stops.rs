//! Protective stop calculation and trailing-stop bookkeeping.
//!
//! One stop per symbol is tracked at a time; re-attaching replaces the
//! existing stop atomically (there is no intermediate state where both
//! the old and new stop exist).

use std::collections::BTreeMap;

use qtx_schemas::{Micros, Side, Stop, StopKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopError {
    NoStopForSymbol,
}

impl std::fmt::Display for StopError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopError::NoStopForSymbol => write!(f, "no stop attached for symbol"),
        }
    }
}

impl std::error::Error for StopError {}

/// `entry * (1 - pct)` for a long, `entry * (1 + pct)` for a short.
pub fn fixed_pct_stop_price(entry: Micros, side: Side, pct: f64) -> Micros {
    match side {
        Side::Buy => entry.scale(1.0 - pct),
        Side::Sell => entry.scale(1.0 + pct),
    }
}

/// `entry - k*atr` for a long, `entry + k*atr` for a short.
pub fn atr_stop_price(entry: Micros, side: Side, atr: Micros, k: f64) -> Micros {
    let offset = atr.scale(k);
    match side {
        Side::Buy => entry - offset,
        Side::Sell => entry + offset,
    }
}

/// `|entry - stop| * shares`.
pub fn risk_dollars(entry: Micros, stop_price: Micros, shares: i64) -> Micros {
    let diff = if entry.raw() >= stop_price.raw() {
        entry - stop_price
    } else {
        stop_price - entry
    };
    diff.scale(shares.unsigned_abs() as f64)
}

fn build_stop(
    symbol: &str,
    entry: Micros,
    shares: i64,
    side: Side,
    kind: StopKind,
    stop_price: Micros,
) -> Stop {
    Stop {
        symbol: symbol.to_string(),
        entry_price: entry,
        stop_price,
        position_size: shares,
        risk_dollars: risk_dollars(entry, stop_price, shares),
        kind,
        order_id: None,
        armed: true,
    }
}

/// Compute a fresh stop without attaching it.
pub fn calculate_stop(
    symbol: &str,
    entry: Micros,
    shares: i64,
    side: Side,
    kind: StopKind,
    pct: Option<f64>,
    atr: Option<(Micros, f64)>,
) -> Stop {
    let stop_price = match kind {
        StopKind::FixedPct => fixed_pct_stop_price(entry, side, pct.unwrap_or(0.0)),
        StopKind::Atr => {
            let (atr_value, k) = atr.unwrap_or((Micros::ZERO, 0.0));
            atr_stop_price(entry, side, atr_value, k)
        }
        StopKind::Trailing => fixed_pct_stop_price(entry, side, pct.unwrap_or(0.0)),
    };
    build_stop(symbol, entry, shares, side, kind, stop_price)
}

/// Tracks at most one active stop per symbol.
#[derive(Default, Debug)]
pub struct StopManager {
    stops: BTreeMap<String, (Stop, Side)>,
}

impl StopManager {
    pub fn new() -> Self {
        StopManager::default()
    }

    /// Attach a stop, replacing any existing one for the same symbol.
    pub fn attach(&mut self, stop: Stop, side: Side) {
        self.stops.insert(stop.symbol.clone(), (stop, side));
    }

    pub fn remove(&mut self, symbol: &str) -> Option<Stop> {
        self.stops.remove(symbol).map(|(stop, _)| stop)
    }

    pub fn get(&self, symbol: &str) -> Option<&Stop> {
        self.stops.get(symbol).map(|(stop, _)| stop)
    }

    /// Advance a trailing stop toward `current_price`, never retreating.
    /// No-op for non-trailing stops or symbols with no attached stop.
    pub fn update_trailing(&mut self, symbol: &str, current_price: Micros) -> Result<(), StopError> {
        let (stop, side) = self.stops.get_mut(symbol).ok_or(StopError::NoStopForSymbol)?;
        if stop.kind != StopKind::Trailing {
            return Ok(());
        }

        match side {
            Side::Buy => {
                let favorable_delta = current_price - stop.entry_price;
                if favorable_delta.raw() > 0 {
                    let candidate = stop.stop_price + favorable_delta;
                    if candidate.raw() > stop.stop_price.raw() {
                        stop.entry_price = current_price;
                        stop.stop_price = candidate;
                    }
                }
            }
            Side::Sell => {
                let favorable_delta = stop.entry_price - current_price;
                if favorable_delta.raw() > 0 {
                    let candidate = stop.stop_price - favorable_delta;
                    if candidate.raw() < stop.stop_price.raw() {
                        stop.entry_price = current_price;
                        stop.stop_price = candidate;
                    }
                }
            }
        }
        Ok(())
    }

    /// Whether `current_price` has crossed the stop.
    pub fn check_triggered(&self, symbol: &str, current_price: Micros) -> bool {
        let Some((stop, side)) = self.stops.get(symbol) else {
            return false;
        };
        if !stop.armed {
            return false;
        }
        match side {
            Side::Buy => current_price.raw() <= stop.stop_price.raw(),
            Side::Sell => current_price.raw() >= stop.stop_price.raw(),
        }
    }
}
