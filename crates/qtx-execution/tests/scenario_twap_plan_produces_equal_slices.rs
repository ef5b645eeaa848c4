use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use qtx_execution::{
    new_twap_plan, run_twap, BrokerAdapter, BrokerError, CancelToken, OrderStatus, OrderStatusReport,
    PlanTracker, TwapSpec,
};
use qtx_schemas::{Micros, OrderType, PlanStatus, Side, SliceStatus};
use uuid::Uuid;

/// Fills every market order instantly at a fixed mock price; a day in
/// the past keeps `run_twap`'s per-slice wait from ever actually
/// sleeping.
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
async fn scenario_twap_plan_produces_equal_slices() {
    let spec = TwapSpec {
        total_quantity: 1000,
        num_slices: 10,
        window_minutes: 60,
        timing_randomization_seconds: 0,
    };

    let plan = new_twap_plan("EXEC-1".to_string(), "AAPL".to_string(), Side::Buy, &spec, start());
    assert_eq!(plan.slices.len(), 10);
    assert!(plan.slices.iter().all(|s| s.quantity == 100));

    let mut tracker = PlanTracker::new(plan);
    let broker = MockFillAtPrice(Micros::from_f64(150.25));
    run_twap(&mut tracker, &broker, &CancelToken::new()).await;

    let plan = &tracker.plan;
    assert_eq!(plan.status, PlanStatus::Completed);
    assert!(plan.slices.iter().all(|s| s.status == SliceStatus::Executed));

    let executed_quantity: i64 = plan.slices.iter().map(|s| s.quantity).sum();
    assert_eq!(executed_quantity, 1000);

    let slices_executed = plan.slices.iter().filter(|s| s.status == SliceStatus::Executed).count();
    let slices_failed = plan.slices.iter().filter(|s| s.status == SliceStatus::Failed).count();
    assert_eq!(slices_executed, 10);
    assert_eq!(slices_failed, 0);

    let avg_price = plan
        .slices
        .iter()
        .filter_map(|s| s.fill_price)
        .fold(Micros::ZERO, |acc, p| acc + p)
        .scale(1.0 / plan.slices.len() as f64);
    assert_eq!(avg_price, Micros::from_f64(150.25));
}
