use chrono::{DateTime, TimeZone, Utc};
use qtx_config::MonitorConfig;
use qtx_execution::{realized_vwap, vwap_deviation, ExecutionMonitor, ExecutionRecord};
use qtx_schemas::{AlertSeverity, ExecutionPlan, Micros, PlanStatus, Side, Slice, SliceStatus, Strategy};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 2, 9, 30, 0).unwrap()
}

fn plan_with_fills(fills: &[(i64, f64)]) -> ExecutionPlan {
    let slices = fills
        .iter()
        .enumerate()
        .map(|(i, (qty, price))| Slice {
            id: i as u32,
            quantity: *qty,
            scheduled_at: now(),
            status: SliceStatus::Executed,
            order_id: None,
            fill_price: Some(Micros::from_f64(*price)),
            fill_time: Some(now()),
            expected_volume_pct: None,
        })
        .collect();

    ExecutionPlan {
        execution_id: "EXEC-VWAP".to_string(),
        symbol: "AAPL".to_string(),
        side: Side::Buy,
        total_quantity: fills.iter().map(|(q, _)| q).sum(),
        strategy: Strategy::Vwap,
        slices,
        status: PlanStatus::Completed,
        start: now(),
        end: Some(now()),
    }
}

fn equal_weight_average(fills: &[(i64, f64)]) -> f64 {
    fills.iter().map(|(_, p)| p).sum::<f64>() / fills.len() as f64
}

#[test]
fn scenario_small_deviation_stays_below_warning() {
    let fills = [(50, 100.0), (100, 102.0), (50, 105.0)];
    let plan = plan_with_fills(&fills);

    let vwap = realized_vwap(&plan).unwrap();
    assert_eq!(vwap, Micros::from_f64(102.25));

    let avg_price = Micros::from_f64(equal_weight_average(&fills));
    let deviation = vwap_deviation(&plan, avg_price).unwrap();
    assert!((deviation - 0.00078).abs() < 0.0005);

    let mut monitor = ExecutionMonitor::new(MonitorConfig {
        vwap_deviation_threshold: 0.005,
        ..MonitorConfig::default()
    });
    let alerts = monitor.record_execution(
        ExecutionRecord {
            execution_id: plan.execution_id.clone(),
            succeeded: true,
            slippage_bps: 0.0,
            duration_minutes: 5.0,
            vwap_deviation: Some(deviation),
        },
        now(),
    );
    assert!(alerts.is_empty());
}

#[test]
fn scenario_vwap_deviation_alert() {
    // Same quantities, but the last fill jumps to 120 instead of 105.
    let fills = [(50, 100.0), (100, 102.0), (50, 120.0)];
    let plan = plan_with_fills(&fills);

    let vwap = realized_vwap(&plan).unwrap();
    assert_eq!(vwap, Micros::from_f64(106.0));

    let avg_price = Micros::from_f64(equal_weight_average(&fills));
    let deviation = vwap_deviation(&plan, avg_price).unwrap();
    assert!((deviation - 0.0125).abs() < 0.001);

    let mut monitor = ExecutionMonitor::new(MonitorConfig {
        vwap_deviation_threshold: 0.005,
        ..MonitorConfig::default()
    });
    let alerts = monitor.record_execution(
        ExecutionRecord {
            execution_id: plan.execution_id.clone(),
            succeeded: true,
            slippage_bps: 0.0,
            duration_minutes: 5.0,
            vwap_deviation: Some(deviation),
        },
        now(),
    );

    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, AlertSeverity::Critical);
    assert_eq!(alerts[0].kind, "VWAP_DEVIATION");
}
