//! Weighted-average-cost portfolio accounting: fill-driven ledger,
//! realized/unrealized PnL, and equity/exposure metrics.
//!
//! Pure and deterministic — no IO, no clock reads beyond caller-supplied
//! timestamps, no broker wiring. Callers own the append boundary by
//! going through [`Ledger::record_fill`], which enforces invariants on
//! every call.

mod accounting;
mod metrics;
pub mod ledger;

pub use ledger::{Ledger, LedgerError, LedgerSnapshot};
pub use metrics::{
    compute_equity, compute_exposure, compute_unrealized_pnl, enforce_max_gross_exposure, marks,
    ExposureBreach, ExposureMetrics, MarkMap,
};
