//! Equity and exposure metrics derived from a set of positions and marks.

use std::collections::BTreeMap;

use qtx_schemas::{Micros, Position};

/// Mark-price map: symbol -> last known price.
pub type MarkMap = BTreeMap<String, Micros>;

pub fn marks<I, S>(items: I) -> MarkMap
where
    I: IntoIterator<Item = (S, Micros)>,
    S: Into<String>,
{
    items.into_iter().map(|(s, p)| (s.into(), p)).collect()
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ExposureMetrics {
    pub gross: Micros,
    pub net: Micros,
}

/// gross = sum |qty| * mark, net = sum qty * mark.
pub fn compute_exposure(positions: &BTreeMap<String, Position>, marks: &MarkMap) -> ExposureMetrics {
    let mut gross = Micros::ZERO;
    let mut net = Micros::ZERO;

    for (symbol, pos) in positions {
        let mark = marks.get(symbol).copied().unwrap_or(Micros::ZERO);
        let signed = mark.scale(pos.quantity as f64);
        net = net + signed;
        gross = gross + Micros::new(signed.raw().abs());
    }

    ExposureMetrics { gross, net }
}

/// Unrealized PnL across every open position: (mark - avg_cost) * qty.
pub fn compute_unrealized_pnl(positions: &BTreeMap<String, Position>, marks: &MarkMap) -> Micros {
    let mut total = Micros::ZERO;
    for (symbol, pos) in positions {
        if pos.is_flat() {
            continue;
        }
        let mark = marks.get(symbol).copied().unwrap_or(pos.avg_cost);
        let diff = mark - pos.avg_cost;
        total = total + diff.scale(pos.quantity as f64);
    }
    total
}

/// equity = cash + market value of all open positions.
pub fn compute_equity(cash: Micros, positions: &BTreeMap<String, Position>, marks: &MarkMap) -> Micros {
    let mut equity = cash;
    for (symbol, pos) in positions {
        let mark = marks.get(symbol).copied().unwrap_or(pos.avg_cost);
        equity = equity + mark.scale(pos.quantity as f64);
    }
    equity
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ExposureBreach {
    pub gross: Micros,
    pub max_gross: Micros,
}

/// Enforce a maximum gross exposure; does not mutate anything.
pub fn enforce_max_gross_exposure(
    positions: &BTreeMap<String, Position>,
    marks: &MarkMap,
    max_gross: Micros,
) -> Result<(), ExposureBreach> {
    let exposure = compute_exposure(positions, marks);
    if exposure.gross > max_gross {
        Err(ExposureBreach {
            gross: exposure.gross,
            max_gross,
        })
    } else {
        Ok(())
    }
}
