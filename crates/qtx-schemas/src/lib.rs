//! Shared value types for the execution, sizing, and risk-containment engine.

mod error;
mod micros;
mod types;

pub use error::QtxError;
pub use micros::Micros;
pub use types::{
    Alert, AlertSeverity, BreakerKind, BreakerState, ExecutionPlan, Fill, Order, OrderType,
    PlanStatus, Position, Side, Slice, SliceStatus, Stop, StopKind, Strategy, Tif, TradeRecord,
};
