//! Paper-fill slippage model.
//!
//! Combines four additive cost components — bid/ask spread, market
//! impact, urgency premium, and a volatility adjustment — into a single
//! basis-point cost, then applies it to the quoted price to produce a
//! simulated fill. All of it is pure arithmetic; no broker or clock
//! access happens here.

use qtx_schemas::{Micros, OrderType, Side};

const MAX_MARKET_IMPACT_BPS: f64 = 100.0;
const FALLBACK_IMPACT_BPS: f64 = 10.0;
const DEFAULT_IMPACT_COEFFICIENT: f64 = 0.1;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FillQuality {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl FillQuality {
    pub fn from_total_bps(total_bps: f64) -> Self {
        if total_bps < 90.0 {
            FillQuality::Excellent
        } else if total_bps < 110.0 {
            FillQuality::Good
        } else if total_bps < 130.0 {
            FillQuality::Fair
        } else {
            FillQuality::Poor
        }
    }
}

/// Inputs for one slippage calculation.
#[derive(Clone, Debug)]
pub struct SlippageInput {
    pub current_price: Micros,
    pub quantity: i64,
    pub side: Side,
    pub order_type: OrderType,
    pub base_spread_bps: f64,
    /// Annualized-style volatility expressed as a fraction (e.g. 0.2 = 20%).
    pub volatility: f64,
    pub avg_daily_volume: i64,
    /// >1.0 increases cost for urgent fills; only applied to MARKET orders.
    pub urgency_multiplier: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SlippageBreakdown {
    pub spread_cost_bps: f64,
    pub market_impact_bps: f64,
    pub urgency_premium_bps: f64,
    pub volatility_adjustment_bps: f64,
    pub total_bps: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SlippageResult {
    pub breakdown: SlippageBreakdown,
    pub dollar_slippage: Micros,
    pub fill_price: Micros,
    pub quality: FillQuality,
}

pub fn calculate(input: &SlippageInput) -> SlippageResult {
    let spread_cost_bps = input.base_spread_bps * (1.0 + input.volatility * 2.0);

    let market_impact_bps = if input.avg_daily_volume > 0 {
        let participation_rate = input.quantity as f64 / input.avg_daily_volume as f64;
        (DEFAULT_IMPACT_COEFFICIENT * participation_rate.max(0.0).sqrt() * 10_000.0)
            .min(MAX_MARKET_IMPACT_BPS)
    } else {
        FALLBACK_IMPACT_BPS
    };

    let urgency_premium_bps = if input.order_type == OrderType::Market {
        spread_cost_bps * (input.urgency_multiplier - 1.0)
    } else {
        0.0
    };

    let volatility_adjustment_bps = input.base_spread_bps * input.volatility;

    let total_bps =
        spread_cost_bps + market_impact_bps + urgency_premium_bps + volatility_adjustment_bps;

    let breakdown = SlippageBreakdown {
        spread_cost_bps,
        market_impact_bps,
        urgency_premium_bps,
        volatility_adjustment_bps,
        total_bps,
    };

    let slippage_pct = total_bps / 10_000.0;
    let dollar_slippage = input
        .current_price
        .scale(slippage_pct)
        .scale(input.quantity as f64);

    let fill_price = match input.side {
        Side::Buy => input.current_price.scale(1.0 + slippage_pct),
        Side::Sell => input.current_price.scale(1.0 - slippage_pct),
    };

    SlippageResult {
        breakdown,
        dollar_slippage,
        fill_price,
        quality: FillQuality::from_total_bps(total_bps),
    }
}

/// Sorted-middle-element median (not interpolated) in basis points.
pub fn median_bps(mut samples: Vec<f64>) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    samples.sort_by(|a, b| a.partial_cmp(b).unwrap());
    Some(samples[samples.len() / 2])
}

/// One realized slippage observation: an `Estimate` paired with the
/// fill price that was actually obtained.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SlippageRecord {
    pub side: Side,
    pub expected_price: Micros,
    pub actual_price: Micros,
    pub order_type: OrderType,
    pub bps: f64,
    pub dollars: Micros,
}

/// Aggregate statistics over a set of [`SlippageRecord`]s.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SlippageStats {
    pub count: usize,
    pub mean_bps: f64,
    pub median_bps: f64,
    pub max_bps: f64,
    pub sum_dollars: Micros,
    pub buy_mean_bps: Option<f64>,
    pub sell_mean_bps: Option<f64>,
}

/// Per-symbol slippage tracking: every `RecordActual` call appends a
/// record; `statistics`/`report` aggregate over the recorded history,
/// optionally filtered by symbol.
#[derive(Default)]
pub struct SlippageHistory {
    records: Vec<(String, SlippageRecord)>,
}

impl SlippageHistory {
    pub fn new() -> Self {
        SlippageHistory { records: Vec::new() }
    }

    /// `RecordActual(symbol, qty, side, expected_price, actual_price, order_type)`.
    /// Appends a record with its realized bps and dollar cost computed
    /// from the expected-vs-actual spread, signed the same way BUY/SELL
    /// slippage is signed in `calculate`.
    pub fn record_actual(
        &mut self,
        symbol: &str,
        qty: i64,
        side: Side,
        expected_price: Micros,
        actual_price: Micros,
        order_type: OrderType,
    ) {
        let expected = expected_price.to_f64();
        let signed_fraction = match side {
            Side::Buy => (actual_price.to_f64() - expected) / expected,
            Side::Sell => (expected - actual_price.to_f64()) / expected,
        };
        let bps = signed_fraction * 10_000.0;
        let dollars = expected_price.scale(signed_fraction.abs()).scale(qty as f64);

        self.records.push((
            symbol.to_string(),
            SlippageRecord {
                side,
                expected_price,
                actual_price,
                order_type,
                bps,
                dollars,
            },
        ));
    }

    fn filtered(&self, symbol: Option<&str>) -> impl Iterator<Item = &SlippageRecord> {
        self.records
            .iter()
            .filter(move |(s, _)| symbol.map_or(true, |sym| s == sym))
            .map(|(_, r)| r)
    }

    /// Aggregate statistics over the recorded history, optionally
    /// restricted to one symbol. `None` when nothing has been recorded
    /// for the filter.
    pub fn statistics(&self, symbol: Option<&str>) -> Option<SlippageStats> {
        let records: Vec<&SlippageRecord> = self.filtered(symbol).collect();
        if records.is_empty() {
            return None;
        }

        let bps_values: Vec<f64> = records.iter().map(|r| r.bps).collect();
        let count = bps_values.len();
        let mean_bps = bps_values.iter().sum::<f64>() / count as f64;
        let median = median_bps(bps_values.clone())?;
        let max_bps = bps_values.iter().cloned().fold(f64::MIN, f64::max);
        let sum_dollars = records
            .iter()
            .fold(Micros::ZERO, |acc, r| acc + r.dollars);

        let buy_bps: Vec<f64> = records.iter().filter(|r| r.side == Side::Buy).map(|r| r.bps).collect();
        let sell_bps: Vec<f64> = records.iter().filter(|r| r.side == Side::Sell).map(|r| r.bps).collect();
        let buy_mean_bps = (!buy_bps.is_empty()).then(|| buy_bps.iter().sum::<f64>() / buy_bps.len() as f64);
        let sell_mean_bps = (!sell_bps.is_empty()).then(|| sell_bps.iter().sum::<f64>() / sell_bps.len() as f64);

        Some(SlippageStats {
            count,
            mean_bps,
            median_bps: median,
            max_bps,
            sum_dollars,
            buy_mean_bps,
            sell_mean_bps,
        })
    }

    /// A symbol's full statistics report; `None` if nothing has been
    /// recorded for it yet.
    pub fn report(&self, symbol: &str) -> Option<SlippageStats> {
        self.statistics(Some(symbol))
    }
}
