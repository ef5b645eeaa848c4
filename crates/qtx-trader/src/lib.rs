//! `PaperTrader`: the top-level intent handler that gates every order
//! through market-hours and circuit-breaker checks, sizes and fills it
//! with a simple slippage model, and keeps the ledger, stop manager,
//! and circuit breaker in sync.
//!
//! The risk components (`CircuitBreaker`, `StopManager`, Kelly sizing)
//! never hold a reference back to the trader — every call passes in
//! the exact state it needs (current equity, an explicit timestamp),
//! which is what breaks the PaperTrader <-> risk-component cycle: the
//! components simply never formed one.

mod analytics;
mod hours;
mod slippage;
mod trader;

pub use analytics::{max_drawdown, sharpe_ratio, win_loss_stats, PerformanceSummary, WinLossStats};
pub use hours::is_market_hours;
pub use trader::{BreakerStatus, PaperTrader, PlacementRejection, SizingRequest};
