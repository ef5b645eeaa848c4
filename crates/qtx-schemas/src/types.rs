//! Entity types shared across the execution, risk, and portfolio crates.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::micros::Micros;

/// Order side.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Sign applied to a fill quantity when accumulating a position: +1 for
    /// a buy, -1 for a sell.
    pub fn sign(self) -> i64 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    Stop,
}

/// Time in force.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tif {
    Day,
    Gtc,
    Ioc,
}

/// Execution strategy selected by the router.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    Market,
    Twap,
    Vwap,
    Limit,
    Iceberg,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Strategy::Market => "MARKET",
            Strategy::Twap => "TWAP",
            Strategy::Vwap => "VWAP",
            Strategy::Limit => "LIMIT",
            Strategy::Iceberg => "ICEBERG",
        };
        write!(f, "{s}")
    }
}

/// Immutable request descriptor. Created by the router, never destroyed
/// (persisted for audit).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub quantity: i64,
    pub order_type: OrderType,
    pub limit_price: Option<Micros>,
    pub tif: Tif,
    pub created_at: DateTime<Utc>,
}

/// Append-only execution report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub price: Micros,
    pub quantity: i64,
    pub commission: Micros,
}

/// An open or closed position for one symbol.
///
/// Invariant: `quantity == sum of signed fill quantities`; `avg_cost`
/// resets to zero when `quantity` crosses through zero; cost basis
/// includes commission.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: i64,
    pub avg_cost: Micros,
    pub realized_pnl: Micros,
    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    pub fn flat(symbol: impl Into<String>, now: DateTime<Utc>) -> Self {
        Position {
            symbol: symbol.into(),
            quantity: 0,
            avg_cost: Micros::ZERO,
            realized_pnl: Micros::ZERO,
            opened_at: now,
            updated_at: now,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == 0
    }
}

/// Slice lifecycle state. Mirrors the original's string discriminator
/// (`PENDING`/`EXECUTED`/`CANCELLED`/`FAILED`) as a closed enum.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SliceStatus {
    Pending,
    Executed,
    Cancelled,
    Failed,
}

/// A single child order produced by a scheduling algorithm.
///
/// Invariant: `sum(slice.quantity) over a plan's slices == plan.total_quantity`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Slice {
    pub id: u32,
    pub quantity: i64,
    pub scheduled_at: DateTime<Utc>,
    pub status: SliceStatus,
    pub order_id: Option<Uuid>,
    pub fill_price: Option<Micros>,
    pub fill_time: Option<DateTime<Utc>>,
    /// VWAP only: the profile fraction this slice represents.
    pub expected_volume_pct: Option<f64>,
}

/// Execution plan lifecycle state.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanStatus {
    Running,
    Completed,
    Cancelled,
    Failed,
}

/// A parent order split into slices by a scheduling algorithm. A plan
/// owns its slices.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub execution_id: String,
    pub symbol: String,
    pub side: Side,
    pub total_quantity: i64,
    pub strategy: Strategy,
    pub slices: Vec<Slice>,
    pub status: PlanStatus,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

/// Stop-loss order kind.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopKind {
    FixedPct,
    Atr,
    Trailing,
}

/// A protective stop attached to one open position. One stop per symbol
/// in the basic model; replacement overwrites.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub symbol: String,
    pub entry_price: Micros,
    pub stop_price: Micros,
    pub position_size: i64,
    pub risk_dollars: Micros,
    pub kind: StopKind,
    pub order_id: Option<Uuid>,
    pub armed: bool,
}

/// Alert severity.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

/// A monitor- or breaker-generated alert.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub severity: AlertSeverity,
    pub kind: String,
    pub message: String,
    pub details: BTreeMap<String, String>,
    pub acknowledged: bool,
}

/// Circuit breaker kind. `Manual` is operator-invoked only.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BreakerKind {
    DailyLoss,
    MaxDrawdown,
    ConsecutiveLosses,
    VolatilitySpike,
    RapidDrawdown,
    Manual,
}

impl BreakerKind {
    pub const ALL: [BreakerKind; 6] = [
        BreakerKind::DailyLoss,
        BreakerKind::MaxDrawdown,
        BreakerKind::ConsecutiveLosses,
        BreakerKind::VolatilitySpike,
        BreakerKind::RapidDrawdown,
        BreakerKind::Manual,
    ];

    /// Breaker kinds eligible for automatic reset (new day / cooldown).
    pub fn auto_reset_eligible(self) -> bool {
        matches!(self, BreakerKind::DailyLoss | BreakerKind::VolatilitySpike)
    }
}

impl fmt::Display for BreakerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BreakerKind::DailyLoss => "daily_loss",
            BreakerKind::MaxDrawdown => "max_drawdown",
            BreakerKind::ConsecutiveLosses => "consecutive_losses",
            BreakerKind::VolatilitySpike => "volatility_spike",
            BreakerKind::RapidDrawdown => "rapid_drawdown",
            BreakerKind::Manual => "manual",
        };
        write!(f, "{s}")
    }
}

/// Per-breaker ARMED/TRIPPED state snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BreakerState {
    pub kind: BreakerKind,
    pub tripped: bool,
    pub tripped_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub confirmation_code: Option<String>,
}

impl BreakerState {
    pub fn armed(kind: BreakerKind) -> Self {
        BreakerState {
            kind,
            tripped: false,
            tripped_at: None,
            reason: None,
            confirmation_code: None,
        }
    }
}

/// Closed-trade aggregate used by performance analytics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub pnl: Micros,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub entry_price: Micros,
    pub exit_price: Micros,
}
