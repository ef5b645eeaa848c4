//! PaperTrader's own fill-price model. Deliberately simpler than
//! `qtx_execution::slippage` (that model serves the scheduler/router's
//! pre/post-trade estimates); this one only needs to produce a
//! plausible fill for a single synchronous placement.

use qtx_schemas::{Micros, Side};

const BASE_SLIPPAGE: f64 = 0.0001;
const SIZE_FACTOR: f64 = 0.0002;
const NOISE_AMPLITUDE: f64 = 0.0001;

/// `base + size_factor * sqrt(qty/1000)`, perturbed by a small amount of
/// noise (order fills are not perfectly deterministic in a live market),
/// floored at `min_slippage`, then scaled by `volatility_multiplier`.
/// `rng` should return a uniform sample in `[0, 1)`.
pub fn calculate_fill_price(
    market_price: Micros,
    side: Side,
    quantity: i64,
    min_slippage: f64,
    volatility_multiplier: f64,
    rng: &mut impl FnMut() -> f64,
) -> Micros {
    let size_term = SIZE_FACTOR * (quantity as f64 / 1000.0).max(0.0).sqrt();
    let noise = (rng() - 0.5) * 2.0 * NOISE_AMPLITUDE;
    let raw = BASE_SLIPPAGE + size_term + noise;
    let floored = raw.max(min_slippage);
    let slippage_fraction = floored * volatility_multiplier;

    match side {
        Side::Buy => market_price.scale(1.0 + slippage_fraction),
        Side::Sell => market_price.scale(1.0 - slippage_fraction),
    }
}

pub fn default_rng() -> impl FnMut() -> f64 {
    || rand::random::<f64>()
}
