//! Weighted-average-cost position accounting.
//!
//! Unlike FIFO lot accounting, a position here is a single running
//! (quantity, average cost) pair per symbol. A fill on the same side as
//! the existing position blends into the average cost; a fill on the
//! opposite side realizes PnL against the average cost for the portion
//! it closes, and — if it overshoots — flips the position and opens a
//! fresh average cost at the fill price for the remainder.

use chrono::{DateTime, Utc};
use qtx_schemas::{Micros, Position, Side};

/// The realized PnL and any cash delta produced by applying one fill.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FillEffect {
    pub realized_pnl: Micros,
}

/// Apply one fill to `position` in place (creating it fresh if
/// `position.quantity == 0`), returning the realized PnL this fill
/// produced. Commission is the caller's concern — it adjusts cash but
/// not cost basis, matching the original's separate commission ledger.
pub fn apply_fill(
    position: &mut Position,
    side: Side,
    quantity: i64,
    price: Micros,
    now: DateTime<Utc>,
) -> FillEffect {
    debug_assert!(quantity > 0);

    let delta = side.sign() * quantity;
    let q0 = position.quantity;

    position.updated_at = now;

    if q0 == 0 {
        position.quantity = delta;
        position.avg_cost = price;
        position.opened_at = now;
        return FillEffect {
            realized_pnl: Micros::ZERO,
        };
    }

    let same_direction = (q0 > 0) == (delta > 0);

    if same_direction {
        let new_qty = q0 + delta;
        let blended = blend_cost(q0, position.avg_cost, delta, price);
        position.quantity = new_qty;
        position.avg_cost = blended;
        return FillEffect {
            realized_pnl: Micros::ZERO,
        };
    }

    // Opposite direction: closes all or part of the existing position.
    let closing_qty = delta.unsigned_abs().min(q0.unsigned_abs()) as i64;
    let realized = realize(q0, position.avg_cost, price, closing_qty);
    position.realized_pnl = position.realized_pnl + realized;

    let remaining_existing = q0.unsigned_abs() as i64 - closing_qty;
    let overshoot = delta.unsigned_abs() as i64 - closing_qty;

    if remaining_existing > 0 {
        // Partial close: direction and average cost unchanged.
        position.quantity = q0 - closing_qty * q0.signum();
    } else if overshoot > 0 {
        // Position flips: the overshoot opens a new position at the fill price.
        position.quantity = overshoot * delta.signum();
        position.avg_cost = price;
        position.opened_at = now;
    } else {
        // Exactly flat.
        position.quantity = 0;
        position.avg_cost = Micros::ZERO;
    }

    FillEffect {
        realized_pnl: realized,
    }
}

/// Weighted blend of two same-direction cost bases.
fn blend_cost(q0: i64, c0: Micros, delta: i64, price: Micros) -> Micros {
    let q0_abs = q0.unsigned_abs() as i128;
    let delta_abs = delta.unsigned_abs() as i128;
    let new_qty_abs = q0_abs + delta_abs;
    if new_qty_abs == 0 {
        return Micros::ZERO;
    }
    let weighted = q0_abs * c0.raw() as i128 + delta_abs * price.raw() as i128;
    Micros::new((weighted / new_qty_abs) as i64)
}

/// Realized PnL for closing `closing_qty` units of a position whose
/// signed quantity is `q0` and average cost is `c0`, at fill price `price`.
fn realize(q0: i64, c0: Micros, price: Micros, closing_qty: i64) -> Micros {
    let diff = if q0 > 0 {
        price.raw() as i128 - c0.raw() as i128
    } else {
        c0.raw() as i128 - price.raw() as i128
    };
    let pnl = diff * closing_qty as i128;
    Micros::new(pnl.clamp(i64::MIN as i128, i64::MAX as i128) as i64)
}
