use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use qtx_config::Configuration;
use qtx_execution::MarketDataSource;
use qtx_portfolio::{compute_exposure, Ledger, MarkMap};
use qtx_risk::{calculate_stop, size_position, CircuitBreaker, KellyInput, KellyResult, StopManager};
use qtx_schemas::{Alert, AlertSeverity, BreakerKind, Micros, OrderType, Side, StopKind, TradeRecord};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::analytics::{self, PerformanceSummary};
use crate::hours::is_market_hours;
use crate::slippage;

/// The maximum number of in-memory portfolio-value snapshots kept for
/// drawdown analytics. Older samples remain in `qtx-db` if persistence
/// is configured; only the trailing window matters for a live
/// dashboard.
const SNAPSHOT_HISTORY_CAP: usize = 5_000;

#[derive(Debug, Clone, PartialEq)]
pub enum PlacementRejection {
    InvalidQuantity,
    OutsideMarketHours,
    Halted(String),
    CircuitBreakerTripped(Vec<BreakerKind>),
    NoPriceAvailable,
    NotMarketable,
    InsufficientCash,
    InsufficientPosition,
    InvariantViolation(String),
}

impl std::fmt::Display for PlacementRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlacementRejection::InvalidQuantity => write!(f, "quantity must be positive"),
            PlacementRejection::OutsideMarketHours => write!(f, "outside market hours"),
            PlacementRejection::Halted(reason) => write!(f, "trading halted: {reason}"),
            PlacementRejection::CircuitBreakerTripped(kinds) => {
                write!(f, "circuit breaker tripped: {kinds:?}")
            }
            PlacementRejection::NoPriceAvailable => write!(f, "no market price available"),
            PlacementRejection::NotMarketable => write!(f, "limit price not marketable"),
            PlacementRejection::InsufficientCash => write!(f, "insufficient cash"),
            PlacementRejection::InsufficientPosition => write!(f, "insufficient position to sell"),
            PlacementRejection::InvariantViolation(reason) => write!(f, "invariant violation: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BreakerStatus {
    pub trading_allowed: bool,
    pub breakers_tripped: Vec<BreakerKind>,
    pub reasons: Vec<String>,
    pub warnings: Vec<String>,
}

/// A Kelly-sizing request for one symbol.
#[derive(Clone, Debug)]
pub struct SizingRequest {
    pub symbol: String,
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    /// Fraction of full Kelly to risk; defaults to half-Kelly (`0.5`).
    pub fraction: Option<f64>,
}

struct TraderState {
    ledger: Ledger,
    circuit_breaker: Option<CircuitBreaker>,
    stop_manager: Option<StopManager>,
    last_price: BTreeMap<String, Micros>,
    snapshots: Vec<(DateTime<Utc>, Micros)>,
    alerts: Vec<Alert>,
    initial_cash: Micros,
    halted: bool,
    halted_reason: Option<String>,
}

impl TraderState {
    fn fresh(config: &Configuration, now: DateTime<Utc>) -> Self {
        let initial_cash = Micros::from_f64(config.initial_cash);
        TraderState {
            ledger: Ledger::new(initial_cash),
            circuit_breaker: config
                .enable_risk_systems
                .then(|| CircuitBreaker::new(config.breaker.clone(), now, initial_cash)),
            stop_manager: config.enable_risk_systems.then(StopManager::new),
            last_price: BTreeMap::new(),
            snapshots: Vec::new(),
            alerts: Vec::new(),
            initial_cash,
            halted: false,
            halted_reason: None,
        }
    }

    fn marks(&self) -> MarkMap {
        self.last_price.clone()
    }

    fn push_snapshot(&mut self, now: DateTime<Utc>, value: Micros) {
        self.snapshots.push((now, value));
        if self.snapshots.len() > SNAPSHOT_HISTORY_CAP {
            self.snapshots.remove(0);
        }
    }

    fn halt(&mut self, now: DateTime<Utc>, reason: String) {
        self.halted = true;
        self.halted_reason = Some(reason.clone());
        self.alerts.push(Alert {
            id: format!("HALT-{}", now.timestamp_millis()),
            timestamp: now,
            severity: AlertSeverity::Critical,
            kind: "invariant_violation".to_string(),
            message: reason,
            details: Default::default(),
            acknowledged: false,
        });
    }
}

/// Top-level intent handler: gate -> size -> route -> ledger -> analytics.
///
/// Generic over the market-data source so tests can plug in a
/// deterministic double; `qtx-db` persistence is optional (pass `None`
/// to run in-memory only).
pub struct PaperTrader {
    config: Configuration,
    market_data: Box<dyn MarketDataSource>,
    db: Option<sqlx::SqlitePool>,
    state: Mutex<TraderState>,
}

impl PaperTrader {
    pub fn new(
        config: Configuration,
        market_data: Box<dyn MarketDataSource>,
        db: Option<sqlx::SqlitePool>,
        now: DateTime<Utc>,
    ) -> Self {
        let state = TraderState::fresh(&config, now);
        PaperTrader {
            config,
            market_data,
            db,
            state: Mutex::new(state),
        }
    }

    pub async fn place_market_order(
        &self,
        symbol: &str,
        quantity: i64,
        side: Side,
        auto_stop: bool,
        stop_pct: Option<f64>,
        now: DateTime<Utc>,
    ) -> Option<Uuid> {
        match self
            .place_order_checked(symbol, quantity, side, OrderType::Market, None, auto_stop, stop_pct, now)
            .await
        {
            Ok(id) => Some(id),
            Err(reason) => {
                tracing::warn!(symbol, ?reason, "order rejected");
                None
            }
        }
    }

    pub async fn place_limit_order(
        &self,
        symbol: &str,
        quantity: i64,
        side: Side,
        limit_price: Micros,
        now: DateTime<Utc>,
    ) -> Option<Uuid> {
        match self
            .place_order_checked(symbol, quantity, side, OrderType::Limit, Some(limit_price), false, None, now)
            .await
        {
            Ok(id) => Some(id),
            Err(reason) => {
                tracing::warn!(symbol, ?reason, "order rejected");
                None
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn place_order_checked(
        &self,
        symbol: &str,
        quantity: i64,
        side: Side,
        order_type: OrderType,
        limit_price: Option<Micros>,
        auto_stop: bool,
        stop_pct: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<Uuid, PlacementRejection> {
        if quantity <= 0 {
            return Err(PlacementRejection::InvalidQuantity);
        }
        if self.config.enforce_market_hours && !is_market_hours(now) {
            return Err(PlacementRejection::OutsideMarketHours);
        }

        // Quote lookup happens outside the lock; only the fallback read
        // and every mutation need exclusive access.
        let quote_price = match self.market_data.latest_quote(symbol).await {
            Ok(Some(quote)) => Some(quote.last),
            Ok(None) | Err(_) => None,
        };

        let mut state = self.state.lock().await;

        if state.halted {
            return Err(PlacementRejection::Halted(
                state.halted_reason.clone().unwrap_or_default(),
            ));
        }

        if let Some(breaker) = state.circuit_breaker.as_mut() {
            let equity = state.ledger.equity(&state.last_price);
            let check = breaker.check(now, equity, None);
            if !check.allowed {
                return Err(PlacementRejection::CircuitBreakerTripped(check.tripped));
            }
        }

        let price = match quote_price {
            Some(price) => {
                state.last_price.insert(symbol.to_string(), price);
                price
            }
            None => match state.last_price.get(symbol) {
                Some(price) => *price,
                None => return Err(PlacementRejection::NoPriceAvailable),
            },
        };

        let fill_price = match order_type {
            OrderType::Market => {
                let mut rng = slippage::default_rng();
                slippage::calculate_fill_price(
                    price,
                    side,
                    quantity,
                    self.config.min_slippage,
                    self.config.slippage_volatility_multiplier,
                    &mut rng,
                )
            }
            OrderType::Limit => {
                let limit_price = limit_price.expect("limit order always carries a limit price");
                let marketable = match side {
                    Side::Buy => limit_price.raw() >= price.raw(),
                    Side::Sell => limit_price.raw() <= price.raw(),
                };
                if !marketable {
                    return Err(PlacementRejection::NotMarketable);
                }
                limit_price
            }
            OrderType::Stop => unreachable!("PaperTrader only places market and limit orders"),
        };

        let commission = Micros::from_f64(
            self.config.commission_per_trade + self.config.commission_per_share * quantity as f64,
        );

        let notional = fill_price
            .checked_mul_qty(quantity)
            .ok_or_else(|| PlacementRejection::InvariantViolation("notional overflow".to_string()))?;

        match side {
            Side::Buy => {
                let required = notional + commission;
                if state.ledger.cash().raw() < required.raw() {
                    return Err(PlacementRejection::InsufficientCash);
                }
            }
            Side::Sell => {
                let held = state.ledger.position(symbol).map(|p| p.quantity).unwrap_or(0);
                if held < quantity {
                    return Err(PlacementRejection::InsufficientPosition);
                }
            }
        }

        let trades_before = state.ledger.closed_trades().len();
        if let Err(err) = state
            .ledger
            .record_fill(symbol, side, quantity, fill_price, commission, now)
        {
            let reason = err.to_string();
            state.halt(now, reason.clone());
            return Err(PlacementRejection::InvariantViolation(reason));
        }

        let order_id = Uuid::new_v4();

        if side == Side::Buy && auto_stop {
            if let Some(stop_manager) = state.stop_manager.as_mut() {
                let stop = calculate_stop(
                    symbol,
                    fill_price,
                    quantity,
                    side,
                    StopKind::FixedPct,
                    stop_pct,
                    None,
                );
                stop_manager.attach(stop, side);
            }
        }

        let newly_closed: Option<TradeRecord> = if state.ledger.closed_trades().len() > trades_before {
            state.ledger.closed_trades().last().cloned()
        } else {
            None
        };

        if let Some(trade) = newly_closed.clone() {
            if let Some(breaker) = state.circuit_breaker.as_mut() {
                breaker.record_trade(trade);
            }
        }

        let equity = state.ledger.equity(&state.marks());
        state.push_snapshot(now, equity);

        if let Some(pool) = self.db.clone() {
            if let Some(position) = state.ledger.position(symbol).cloned() {
                if let Err(err) = qtx_db::upsert_position(&pool, &position).await {
                    tracing::error!(error = %err, symbol, "failed to persist position");
                }
            }
            if let Some(trade) = newly_closed {
                if let Err(err) = qtx_db::insert_trade(&pool, Uuid::new_v4(), side, &trade).await {
                    tracing::error!(error = %err, symbol, "failed to persist trade");
                }
            }
            if let Err(err) =
                qtx_db::insert_snapshot(&pool, Uuid::new_v4(), now, equity, state.ledger.cash()).await
            {
                tracing::error!(error = %err, "failed to persist snapshot");
            }
        }

        Ok(order_id)
    }

    pub async fn check_circuit_breakers(&self, now: DateTime<Utc>) -> BreakerStatus {
        if !self.config.enable_risk_systems {
            return BreakerStatus {
                trading_allowed: true,
                breakers_tripped: Vec::new(),
                reasons: Vec::new(),
                warnings: vec!["Risk systems disabled".to_string()],
            };
        }

        let mut state = self.state.lock().await;
        let equity = state.ledger.equity(&state.marks());
        let Some(breaker) = state.circuit_breaker.as_mut() else {
            return BreakerStatus {
                trading_allowed: true,
                breakers_tripped: Vec::new(),
                reasons: Vec::new(),
                warnings: vec!["Risk systems disabled".to_string()],
            };
        };

        let result = breaker.check(now, equity, None);
        BreakerStatus {
            trading_allowed: result.allowed,
            breakers_tripped: result.tripped,
            reasons: result.reasons,
            warnings: result.warnings.into_iter().map(|a| a.message).collect(),
        }
    }

    pub async fn calculate_position_size(&self, request: SizingRequest, _now: DateTime<Utc>) -> KellyResult {
        let quoted_price = self
            .market_data
            .latest_quote(&request.symbol)
            .await
            .ok()
            .flatten()
            .map(|q| q.last);

        let state = self.state.lock().await;
        let marks = state.marks();
        let equity = state.ledger.equity(&marks);
        let snapshot = state.ledger.snapshot();
        let exposure = compute_exposure(&snapshot.positions, &marks);
        let heat = if equity.raw() > 0 {
            exposure.gross.to_f64() / equity.to_f64()
        } else {
            0.0
        };

        let existing_value = state
            .ledger
            .position(&request.symbol)
            .map(|position| {
                let mark = marks.get(&request.symbol).copied().unwrap_or(position.avg_cost);
                mark.scale(position.quantity.unsigned_abs() as f64)
            })
            .unwrap_or(Micros::ZERO);

        let stock_price = quoted_price.or_else(|| state.last_price.get(&request.symbol).copied());

        let input = KellyInput {
            win_rate: request.win_rate,
            avg_win: request.avg_win,
            avg_loss: request.avg_loss,
            fraction: request.fraction.unwrap_or(0.5),
            portfolio_value: equity,
            current_heat: heat,
            existing_position_value: existing_value,
            stock_price,
        };

        size_position(&input, &self.config.kelly)
    }

    pub async fn get_performance_summary(&self) -> PerformanceSummary {
        let state = self.state.lock().await;
        let trades = state.ledger.closed_trades();
        let stats = analytics::win_loss_stats(trades);
        let sharpe = analytics::sharpe_ratio(trades, state.initial_cash);
        let drawdown = analytics::max_drawdown(&state.snapshots);
        let equity = state.ledger.equity(&state.marks());

        PerformanceSummary {
            sharpe_ratio: sharpe,
            max_drawdown_pct: drawdown.map(|(pct, _)| pct),
            max_drawdown_dollars: drawdown.map(|(_, dollars)| dollars),
            win_rate: stats.win_rate,
            avg_win: stats.avg_win,
            avg_loss: stats.avg_loss,
            total_trades: trades.len(),
            realized_pnl: state.ledger.realized_pnl(),
            cash: state.ledger.cash(),
            equity,
        }
    }

    pub async fn alerts(&self) -> Vec<Alert> {
        self.state.lock().await.alerts.clone()
    }

    pub async fn is_halted(&self) -> bool {
        self.state.lock().await.halted
    }

    pub async fn reset_portfolio(&self, now: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        *state = TraderState::fresh(&self.config, now);
    }
}
