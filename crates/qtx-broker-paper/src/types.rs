use chrono::{DateTime, Utc};
use qtx_execution::OrderStatus;
use qtx_schemas::{Micros, OrderType, Side};
use uuid::Uuid;

/// Knobs the simulated fill model draws on. None of these are broker
/// behavior — they stand in for the commission schedule and the
/// spread/volatility assumptions a live broker's fills would reveal on
/// their own.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PaperBrokerConfig {
    pub base_spread_bps: f64,
    pub assumed_volatility: f64,
    pub urgency_multiplier: f64,
    pub commission_per_trade: f64,
    pub commission_per_share: f64,
}

impl Default for PaperBrokerConfig {
    fn default() -> Self {
        PaperBrokerConfig {
            base_spread_bps: 5.0,
            assumed_volatility: 0.2,
            urgency_multiplier: 1.0,
            commission_per_trade: 1.0,
            commission_per_share: 0.005,
        }
    }
}

/// One order's mutable state as tracked by the paper broker.
#[derive(Clone, Debug, PartialEq)]
pub struct PaperOrder {
    pub id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub quantity: i64,
    pub order_type: OrderType,
    pub limit_price: Option<Micros>,
    pub status: OrderStatus,
    pub filled_avg_price: Option<Micros>,
    pub filled_qty: i64,
    pub commission: Micros,
    pub submitted_at: DateTime<Utc>,
}
