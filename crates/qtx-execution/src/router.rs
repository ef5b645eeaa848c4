//! Strategy selection: given an order and the current quote, decide
//! which scheduling algorithm should carry it and build the resulting
//! plan. Everything here is pure — no broker or clock access.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use qtx_config::{RouterConfig, TwapConfig, VwapConfig};
use qtx_schemas::{ExecutionPlan, Micros, OrderType, PlanStatus, Side, Slice, SliceStatus, Strategy};

use crate::slippage::{self, SlippageHistory, SlippageInput, SlippageResult, SlippageStats};
use crate::twap::{self, TwapSpec};
use crate::vwap::{self, VolumeProfile};

const ICEBERG_CHUNKS: i64 = 10;
const ICEBERG_VARIANCE: f64 = 0.0005;
const LIMIT_OFFSET: f64 = 0.001;
const VWAP_PARTICIPATION_THRESHOLD: f64 = 0.01;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Urgency {
    Immediate,
    Low,
    Normal,
    High,
}

#[derive(Clone, Debug)]
pub struct RouteRequest {
    pub execution_id: String,
    pub symbol: String,
    pub side: Side,
    pub quantity: i64,
    pub price: Micros,
    pub urgency: Urgency,
    /// Average daily volume in shares, when known. Drives the
    /// VWAP-vs-ICEBERG split for large orders; `None` or non-positive
    /// means "unknown".
    pub adv: Option<f64>,
}

/// The plan plus, for strategies that submit LIMIT child orders, the
/// limit price to use for each slice id. TWAP/VWAP/MARKET slices carry
/// no entry here.
#[derive(Clone, Debug)]
pub struct RouteDecision {
    pub plan: ExecutionPlan,
    pub limit_prices: BTreeMap<u32, Micros>,
}

/// Stateful wrapper around [`route`] that owns the slippage history the
/// router is responsible for: it records the pre-trade estimate,
/// the post-trade actual, and keeps the running per-symbol statistics.
#[derive(Default)]
pub struct Router {
    history: SlippageHistory,
}

impl Router {
    pub fn new() -> Self {
        Router {
            history: SlippageHistory::new(),
        }
    }

    /// Route `request` and compute its pre-trade slippage estimate from
    /// `slippage_input` in the same call — the estimate is returned to
    /// the caller, who pairs it with the eventual fill via
    /// [`Router::record_actual`] once it is known.
    pub fn route(
        &self,
        request: &RouteRequest,
        router_cfg: &RouterConfig,
        twap_cfg: &TwapConfig,
        vwap_cfg: &VwapConfig,
        slippage_input: &SlippageInput,
        now: DateTime<Utc>,
    ) -> (RouteDecision, SlippageResult) {
        let estimate = slippage::calculate(slippage_input);
        let decision = route(request, router_cfg, twap_cfg, vwap_cfg, now);
        (decision, estimate)
    }

    /// Record the fill actually obtained for a routed order, appending
    /// the realized slippage to the symbol's history.
    pub fn record_actual(
        &mut self,
        symbol: &str,
        qty: i64,
        side: Side,
        expected_price: Micros,
        actual_price: Micros,
        order_type: OrderType,
    ) {
        self.history
            .record_actual(symbol, qty, side, expected_price, actual_price, order_type);
    }

    /// Aggregate slippage statistics, optionally restricted to one symbol.
    pub fn slippage_stats(&self, symbol: Option<&str>) -> Option<SlippageStats> {
        self.history.statistics(symbol)
    }
}

/// `price * (1 - offset)` for a BUY, `price * (1 + offset)` for a SELL —
/// a passive resting price on the far side of the spread.
fn passive_limit_price(side: Side, price: Micros, offset: f64) -> Micros {
    match side {
        Side::Buy => price.scale(1.0 - offset),
        Side::Sell => price.scale(1.0 + offset),
    }
}

/// Choose a strategy for `request` per the router's first-match-wins
/// decision tree, then build the corresponding plan:
///
/// - `IMMEDIATE` urgency → MARKET, regardless of size
/// - notional below `small_order_threshold` → MARKET
/// - `LOW` urgency → passive LIMIT, one slice
/// - notional at/above `large_order_threshold` → VWAP if ADV is known
///   and participation exceeds 1%, else ICEBERG (10 hidden LIMIT chunks)
/// - otherwise → TWAP, window/slice count keyed off urgency
pub fn route(
    request: &RouteRequest,
    router_cfg: &RouterConfig,
    twap_cfg: &TwapConfig,
    vwap_cfg: &VwapConfig,
    now: DateTime<Utc>,
) -> RouteDecision {
    let notional = request.price.to_f64() * request.quantity as f64;

    if request.urgency == Urgency::Immediate {
        return market_decision(request, now);
    }

    if notional < router_cfg.small_order_threshold {
        return market_decision(request, now);
    }

    if request.urgency == Urgency::Low {
        return limit_decision(request, now);
    }

    if notional >= router_cfg.large_order_threshold {
        let participation = request
            .adv
            .filter(|adv| *adv > 0.0)
            .map(|adv| request.quantity as f64 / adv);
        return match participation {
            Some(p) if p > VWAP_PARTICIPATION_THRESHOLD => vwap_decision(request, vwap_cfg, now),
            _ => iceberg_decision(request, now),
        };
    }

    twap_decision(request, twap_cfg, now)
}

fn market_decision(request: &RouteRequest, now: DateTime<Utc>) -> RouteDecision {
    let slice = Slice {
        id: 0,
        quantity: request.quantity,
        scheduled_at: now,
        status: SliceStatus::Pending,
        order_id: None,
        fill_price: None,
        fill_time: None,
        expected_volume_pct: None,
    };
    let plan = ExecutionPlan {
        execution_id: request.execution_id.clone(),
        symbol: request.symbol.clone(),
        side: request.side,
        total_quantity: request.quantity,
        strategy: Strategy::Market,
        slices: vec![slice],
        status: PlanStatus::Running,
        start: now,
        end: None,
    };
    RouteDecision {
        plan,
        limit_prices: BTreeMap::new(),
    }
}

fn limit_decision(request: &RouteRequest, now: DateTime<Utc>) -> RouteDecision {
    let limit_price = passive_limit_price(request.side, request.price, LIMIT_OFFSET);
    let slice = Slice {
        id: 0,
        quantity: request.quantity,
        scheduled_at: now,
        status: SliceStatus::Pending,
        order_id: None,
        fill_price: None,
        fill_time: None,
        expected_volume_pct: None,
    };
    let plan = ExecutionPlan {
        execution_id: request.execution_id.clone(),
        symbol: request.symbol.clone(),
        side: request.side,
        total_quantity: request.quantity,
        strategy: Strategy::Limit,
        slices: vec![slice],
        status: PlanStatus::Running,
        start: now,
        end: None,
    };
    let mut limit_prices = BTreeMap::new();
    limit_prices.insert(0, limit_price);
    RouteDecision { plan, limit_prices }
}

fn twap_decision(request: &RouteRequest, twap_cfg: &TwapConfig, now: DateTime<Utc>) -> RouteDecision {
    let (window_minutes, num_slices) = match request.urgency {
        Urgency::High => (30, 6),
        _ => (
            twap_cfg.default_time_window_minutes,
            twap_cfg.default_num_slices,
        ),
    };
    let spec = TwapSpec {
        total_quantity: request.quantity,
        num_slices,
        window_minutes,
        timing_randomization_seconds: twap_cfg.timing_randomization_seconds,
    };
    let plan = twap::new_plan(
        request.execution_id.clone(),
        request.symbol.clone(),
        request.side,
        &spec,
        now,
    );
    RouteDecision {
        plan,
        limit_prices: BTreeMap::new(),
    }
}

fn vwap_decision(request: &RouteRequest, vwap_cfg: &VwapConfig, now: DateTime<Utc>) -> RouteDecision {
    let profile: VolumeProfile = if vwap_cfg.volume_profile.is_empty() {
        vwap::default_profile()
    } else {
        vwap_cfg.volume_profile.clone()
    };
    let plan = vwap::new_plan(
        request.execution_id.clone(),
        request.symbol.clone(),
        request.side,
        request.quantity,
        now,
        390,
        &profile,
    );
    RouteDecision {
        plan,
        limit_prices: BTreeMap::new(),
    }
}

/// `uniform(-variance, variance)` via an injected RNG closure, so tests
/// can pin the sequence.
fn iceberg_decision_with_rng(request: &RouteRequest, now: DateTime<Utc>, mut rng: impl FnMut() -> f64) -> RouteDecision {
    let num_chunks = ICEBERG_CHUNKS;
    let base_size = request.quantity / num_chunks;
    let remainder = request.quantity % num_chunks;

    let mut slices = Vec::with_capacity(num_chunks as usize);
    let mut limit_prices = BTreeMap::new();

    for i in 0..num_chunks {
        let quantity = base_size + if i < remainder { 1 } else { 0 };
        let variance = rng();
        let raw = request.price.scale(1.0 + variance);
        let clamped = clamp_iceberg_price(request.side, request.price, raw);

        slices.push(Slice {
            id: i as u32,
            quantity,
            scheduled_at: now,
            status: SliceStatus::Pending,
            order_id: None,
            fill_price: None,
            fill_time: None,
            expected_volume_pct: None,
        });
        limit_prices.insert(i as u32, clamped);
    }

    let plan = ExecutionPlan {
        execution_id: request.execution_id.clone(),
        symbol: request.symbol.clone(),
        side: request.side,
        total_quantity: request.quantity,
        strategy: Strategy::Iceberg,
        slices,
        status: PlanStatus::Running,
        start: now,
        end: None,
    };

    RouteDecision { plan, limit_prices }
}

fn iceberg_decision(request: &RouteRequest, now: DateTime<Utc>) -> RouteDecision {
    iceberg_decision_with_rng(request, now, || {
        rand::random::<f64>() * 2.0 * ICEBERG_VARIANCE - ICEBERG_VARIANCE
    })
}

/// BUY chunks never rest above `price * 1.001`; SELL chunks never rest
/// below `price * 0.999`.
fn clamp_iceberg_price(side: Side, base_price: Micros, candidate: Micros) -> Micros {
    match side {
        Side::Buy => {
            let ceiling = base_price.scale(1.0 + LIMIT_OFFSET);
            if candidate.raw() > ceiling.raw() {
                ceiling
            } else {
                candidate
            }
        }
        Side::Sell => {
            let floor = base_price.scale(1.0 - LIMIT_OFFSET);
            if candidate.raw() < floor.raw() {
                floor
            } else {
                candidate
            }
        }
    }
}
