//! External boundary the scheduler and router submit orders through.
//!
//! `BrokerAdapter` is the only way child orders leave this crate. It is
//! object-safe so callers can hold `Arc<dyn BrokerAdapter>` and swap a
//! paper implementation for a live one without touching scheduler code.

use async_trait::async_trait;
use qtx_schemas::{Micros, OrderType, Side};
use uuid::Uuid;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OrderStatus {
    New,
    Partial,
    Filled,
    Cancelled,
    Rejected,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderStatusReport {
    pub status: OrderStatus,
    pub filled_avg_price: Option<Micros>,
    pub filled_qty: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    #[error("broker call failed: {0}")]
    Upstream(String),
}

/// Submits, queries, and cancels child orders against a broker, real or
/// simulated. A `None` return from `submit` means the broker refused
/// the order outright (not found, malformed) rather than a transport
/// failure — transport failures are `Err`.
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    async fn submit(
        &self,
        symbol: &str,
        quantity: i64,
        side: Side,
        order_type: OrderType,
        limit_price: Option<Micros>,
    ) -> Result<Option<Uuid>, BrokerError>;

    async fn status(&self, order_id: Uuid) -> Result<OrderStatusReport, BrokerError>;

    async fn cancel(&self, order_id: Uuid) -> Result<bool, BrokerError>;
}
