//! Order placement: slicing algorithms, the slippage model that
//! simulates a fill, the strategy router that picks between them, and
//! the post-trade monitor that scores the results.

mod broker;
mod marketdata;
mod monitor;
mod plan;
mod router;
mod slippage;
mod twap;
mod vwap;

pub use broker::{BrokerAdapter, BrokerError, OrderStatus, OrderStatusReport};
pub use marketdata::{Bar, MarketDataError, MarketDataSource, Quote, Timeframe};
pub use monitor::{DailySummary, ExecutionMonitor, ExecutionRecord, PerformanceDashboard, QualityScore};
pub use plan::{PlanError, PlanTracker, SliceEvent};
pub use router::{route, RouteDecision, RouteRequest, Router, Urgency};
pub use slippage::{
    calculate, median_bps, FillQuality, SlippageBreakdown, SlippageHistory, SlippageInput,
    SlippageRecord, SlippageResult, SlippageStats,
};
pub use twap::{default_jitter, CancelRegistry, CancelToken, TwapSpec};
pub use twap::{new_plan as new_twap_plan, plan_slices as twap_slices, run as run_twap};
pub use vwap::{default_profile, realized_vwap, report_execution as report_vwap_execution, vwap_deviation, VolumeProfile};
pub use vwap::{new_plan as new_vwap_plan, plan_slices as vwap_slices, run as run_vwap};
