use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use qtx_config::MonitorConfig;
use qtx_execution::{
    default_profile, new_vwap_plan, report_vwap_execution, run_vwap, BrokerAdapter, BrokerError,
    CancelToken, ExecutionMonitor, OrderStatus, OrderStatusReport, PlanTracker,
};
use qtx_schemas::{AlertSeverity, Micros, OrderType, PlanStatus, Side, SliceStatus};
use uuid::Uuid;

/// Fills every slice at a fixed price, regardless of size; a start deep
/// in the past keeps `run_vwap`'s per-slice wait from ever sleeping.
struct MockFillAtPrice(Micros);

#[async_trait]
impl BrokerAdapter for MockFillAtPrice {
    async fn submit(
        &self,
        _symbol: &str,
        _quantity: i64,
        _side: Side,
        _order_type: OrderType,
        _limit_price: Option<Micros>,
    ) -> Result<Option<Uuid>, BrokerError> {
        Ok(Some(Uuid::new_v4()))
    }

    async fn status(&self, _order_id: Uuid) -> Result<OrderStatusReport, BrokerError> {
        Ok(OrderStatusReport {
            status: OrderStatus::Filled,
            filled_avg_price: Some(self.0),
            filled_qty: 0,
        })
    }

    async fn cancel(&self, _order_id: Uuid) -> Result<bool, BrokerError> {
        Ok(true)
    }
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 2, 9, 30, 0).unwrap()
}

#[tokio::test]
async fn scenario_vwap_run_executes_all_slices_at_the_mock_price() {
    let plan = new_vwap_plan("EXEC-V1".to_string(), "AAPL".to_string(), Side::Buy, 1000, start(), 60, &default_profile());
    let mut tracker = PlanTracker::new(plan);
    let broker = MockFillAtPrice(Micros::from_f64(150.0));
    run_vwap(&mut tracker, &broker, &CancelToken::new()).await;

    let plan = &tracker.plan;
    assert_eq!(plan.status, PlanStatus::Completed);
    assert!(plan.slices.iter().all(|s| s.status == SliceStatus::Executed));
    let total: i64 = plan.slices.iter().map(|s| s.quantity).sum();
    assert_eq!(total, 1000);
}

#[tokio::test]
async fn scenario_vwap_run_then_reports_a_deviation_alert_to_the_monitor() {
    // A non-uniform arrival price vs. a flat fill price produces a
    // sizable deviation once the plan is reported to the monitor.
    let plan = new_vwap_plan("EXEC-V2".to_string(), "AAPL".to_string(), Side::Buy, 200, start(), 60, &default_profile());
    let mut tracker = PlanTracker::new(plan);
    let broker = MockFillAtPrice(Micros::from_f64(100.0));
    run_vwap(&mut tracker, &broker, &CancelToken::new()).await;

    let mut monitor = ExecutionMonitor::new(MonitorConfig {
        vwap_deviation_threshold: 0.005,
        ..MonitorConfig::default()
    });
    let alerts = report_vwap_execution(&tracker.plan, Micros::from_f64(106.0), &mut monitor, start());

    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, "VWAP_DEVIATION");
    assert_eq!(alerts[0].severity, AlertSeverity::Critical);
}
