//! Position sizing, protective stops, and the global circuit breaker.
//!
//! Pure, deterministic logic: every function here takes its inputs
//! explicitly (no hidden clock reads, no IO) so callers in
//! `qtx-trader` can drive it with injected timestamps in tests.

mod breaker;
mod kelly;
mod stops;

pub use breaker::{BreakerError, CheckResult, CircuitBreaker};
pub use kelly::{size_position, KellyInput, KellyResult};
pub use stops::{atr_stop_price, calculate_stop, fixed_pct_stop_price, risk_dollars, StopError, StopManager};
