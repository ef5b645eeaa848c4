//! Kelly-criterion position sizing with a fractional-Kelly, portfolio-heat,
//! and absolute-dollar cap pipeline.
//!
//! Every cap in [`size_position`] runs unconditionally and in a fixed
//! order — each step can only shrink the candidate size, never grow it.
//! The function never errors: bad inputs produce a zero-size,
//! `valid: false` result carrying a reason, matching the "reject without
//! throwing" contract callers rely on to keep evaluating other symbols.

use qtx_config::KellyConfig;
use qtx_schemas::Micros;

/// Per-call sizing request.
#[derive(Clone, Debug)]
pub struct KellyInput {
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    /// Fraction of full Kelly to risk, e.g. `0.5` for half-Kelly.
    pub fraction: f64,
    pub portfolio_value: Micros,
    pub current_heat: f64,
    /// Existing position value in this symbol, if any — added back to
    /// available heat since a re-sizing replaces rather than stacks.
    pub existing_position_value: Micros,
    pub stock_price: Option<Micros>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct KellyResult {
    pub valid: bool,
    pub position_size: Micros,
    pub shares: Option<i64>,
    pub kelly_pct: f64,
    pub adjusted_pct: f64,
    pub rationale: String,
    pub warnings: Vec<String>,
}

impl KellyResult {
    fn zero(rationale: impl Into<String>) -> Self {
        KellyResult {
            valid: false,
            position_size: Micros::ZERO,
            shares: None,
            kelly_pct: 0.0,
            adjusted_pct: 0.0,
            rationale: rationale.into(),
            warnings: Vec::new(),
        }
    }
}

pub fn size_position(input: &KellyInput, config: &KellyConfig) -> KellyResult {
    if !(0.0..=1.0).contains(&input.win_rate) {
        return KellyResult::zero(format!(
            "win_rate {} outside valid range [0,1]",
            input.win_rate
        ));
    }
    if input.avg_win <= 0.0 {
        return KellyResult::zero("avg_win must be positive");
    }
    if input.avg_loss <= 0.0 {
        return KellyResult::zero("avg_loss must be positive");
    }
    if !(0.0..=1.0).contains(&input.fraction) {
        return KellyResult::zero(format!(
            "fraction {} outside valid range [0,1]",
            input.fraction
        ));
    }

    let win_loss_ratio = input.avg_win / input.avg_loss;
    let loss_rate = 1.0 - input.win_rate;
    let kelly_pct = (input.win_rate * win_loss_ratio - loss_rate) / win_loss_ratio;

    let mut warnings = Vec::new();
    if !(0.1..=0.9).contains(&input.win_rate) {
        warnings.push(format!(
            "win_rate {} is outside the typical [0.1, 0.9] band; sizing may be unreliable",
            input.win_rate
        ));
    }

    if kelly_pct <= 0.0 {
        return KellyResult {
            valid: true,
            position_size: Micros::ZERO,
            shares: None,
            kelly_pct,
            adjusted_pct: 0.0,
            rationale: "negative or zero Kelly edge: no position".to_string(),
            warnings,
        };
    }

    // 1) fractional Kelly
    let fractional = kelly_pct * input.fraction;

    // 2) per-position cap
    let capped_pct = fractional.min(config.max_position_pct);

    let portfolio_value = input.portfolio_value.to_f64();
    let mut dollars = portfolio_value * capped_pct;

    // 3) portfolio-heat cap, crediting back the symbol's existing allocation
    let available_capacity =
        (config.max_total_exposure - input.current_heat) * portfolio_value
            + input.existing_position_value.to_f64();
    dollars = dollars.min(available_capacity.max(0.0));

    // 4) absolute dollar caps — min check first, then max
    if dollars < config.min_position_size {
        return KellyResult {
            valid: true,
            position_size: Micros::ZERO,
            shares: None,
            kelly_pct,
            adjusted_pct: 0.0,
            rationale: format!(
                "sized position ${dollars:.2} falls below the minimum ${:.2}",
                config.min_position_size
            ),
            warnings,
        };
    }
    dollars = dollars.min(config.max_position_size);

    // 5) share rounding, then recompute dollars from whole shares
    let (final_dollars, shares) = match input.stock_price {
        Some(price) if price.raw() > 0 => {
            let shares = (dollars / price.to_f64()).floor() as i64;
            (price.to_f64() * shares as f64, Some(shares))
        }
        _ => (dollars, None),
    };

    let adjusted_pct = if portfolio_value > 0.0 {
        final_dollars / portfolio_value
    } else {
        0.0
    };

    KellyResult {
        valid: true,
        position_size: Micros::from_f64(final_dollars),
        shares,
        kelly_pct,
        adjusted_pct,
        rationale: format!(
            "sized at {:.2}% of portfolio (full Kelly {:.2}%, fraction {:.2})",
            adjusted_pct * 100.0,
            kelly_pct * 100.0,
            input.fraction
        ),
        warnings,
    }
}
