//! Volume-weighted-average-price scheduler: slices sized against an
//! intraday volume profile instead of equal time buckets.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use qtx_schemas::{Alert, ExecutionPlan, Micros, OrderType, PlanStatus, Side, Slice, SliceStatus, Strategy};
use tracing::{info, warn};

use crate::broker::BrokerAdapter;
use crate::monitor::{ExecutionMonitor, ExecutionRecord};
use crate::plan::{PlanTracker, SliceEvent};
use crate::twap::CancelToken;

/// `"HH:MM-HH:MM"` -> fraction of the day's volume in that half-hour window.
pub type VolumeProfile = BTreeMap<String, f64>;

/// Built-in U-shaped profile: heaviest at the open and close, flat midday.
pub fn default_profile() -> VolumeProfile {
    [
        ("09:30-10:00", 0.15),
        ("10:00-10:30", 0.10),
        ("10:30-11:00", 0.07),
        ("11:00-11:30", 0.06),
        ("11:30-12:00", 0.05),
        ("12:00-12:30", 0.05),
        ("12:30-13:00", 0.05),
        ("13:00-13:30", 0.05),
        ("13:30-14:00", 0.06),
        ("14:00-14:30", 0.07),
        ("14:30-15:00", 0.08),
        ("15:00-15:30", 0.08),
        ("15:30-16:00", 0.13),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

fn parse_window(window: &str) -> Option<(NaiveTime, NaiveTime)> {
    let (start_str, end_str) = window.split_once('-')?;
    let start = NaiveTime::parse_from_str(start_str, "%H:%M").ok()?;
    let end = NaiveTime::parse_from_str(end_str, "%H:%M").ok()?;
    Some((start, end))
}

struct PlannedWindow {
    label: String,
    start: DateTime<Utc>,
    fraction: f64,
}

/// Filter the profile to windows inside `[start, start+window_minutes]`,
/// renormalize the remaining fractions to sum to 1.0.
fn windows_in_range(profile: &VolumeProfile, start: DateTime<Utc>, window_minutes: i64) -> Vec<PlannedWindow> {
    let end = start + Duration::minutes(window_minutes);
    let day = start.date_naive();

    let mut filtered: Vec<PlannedWindow> = profile
        .iter()
        .filter_map(|(label, fraction)| {
            let (window_start, _) = parse_window(label)?;
            let instant = day.and_time(window_start).and_utc();
            if instant >= start && instant <= end {
                Some(PlannedWindow {
                    label: label.clone(),
                    start: instant,
                    fraction: *fraction,
                })
            } else {
                None
            }
        })
        .collect();

    filtered.sort_by_key(|w| w.start);

    let total: f64 = filtered.iter().map(|w| w.fraction).sum();
    if total > 0.0 {
        for w in &mut filtered {
            w.fraction /= total;
        }
    }
    filtered
}

pub fn plan_slices(
    total_quantity: i64,
    start: DateTime<Utc>,
    window_minutes: i64,
    profile: &VolumeProfile,
) -> Vec<Slice> {
    let windows = windows_in_range(profile, start, window_minutes);
    if windows.is_empty() {
        return Vec::new();
    }

    let mut allocated = 0i64;
    let n = windows.len();
    let mut slices: Vec<Slice> = windows
        .iter()
        .enumerate()
        .map(|(i, w)| {
            let quantity = if i + 1 == n {
                total_quantity - allocated
            } else {
                let q = (total_quantity as f64 * w.fraction).round() as i64;
                allocated += q;
                q
            };
            Slice {
                id: i as u32,
                quantity,
                scheduled_at: w.start,
                status: SliceStatus::Pending,
                order_id: None,
                fill_price: None,
                fill_time: None,
                expected_volume_pct: Some(w.fraction),
            }
        })
        .collect();

    // Residual allocation may have gone to the last slice with a
    // negative quantity in a pathological case (profile covers almost
    // no quantity); clamp defensively rather than emit a negative slice.
    if let Some(last) = slices.last_mut() {
        if last.quantity < 0 {
            last.quantity = 0;
        }
    }

    slices
}

pub fn new_plan(
    execution_id: String,
    symbol: String,
    side: Side,
    total_quantity: i64,
    start: DateTime<Utc>,
    window_minutes: i64,
    profile: &VolumeProfile,
) -> ExecutionPlan {
    let slices = plan_slices(total_quantity, start, window_minutes, profile);
    ExecutionPlan {
        execution_id,
        symbol,
        side,
        total_quantity,
        strategy: Strategy::Vwap,
        slices,
        status: PlanStatus::Running,
        start,
        end: None,
    }
}

/// `Σ q·p / Σ q` over executed slices.
pub fn realized_vwap(plan: &ExecutionPlan) -> Option<Micros> {
    let mut weighted = 0i128;
    let mut total_qty = 0i64;
    for slice in &plan.slices {
        if let Some(price) = slice.fill_price {
            weighted += price.raw() as i128 * slice.quantity as i128;
            total_qty += slice.quantity;
        }
    }
    if total_qty == 0 {
        return None;
    }
    Some(Micros::new((weighted / total_qty as i128) as i64))
}

/// `(avg_price - vwap_price) / vwap_price`.
pub fn vwap_deviation(plan: &ExecutionPlan, avg_price: Micros) -> Option<f64> {
    let vwap = realized_vwap(plan)?;
    if vwap.raw() == 0 {
        return None;
    }
    Some((avg_price.to_f64() - vwap.to_f64()) / vwap.to_f64())
}

/// Run every slice of `tracker.plan` sequentially, identically to
/// `twap::run`: wait until `scheduled_at`, submit a MARKET child order,
/// record the fill. A cancellation request is honored at the top of
/// each iteration, before the wait.
pub async fn run(tracker: &mut PlanTracker, broker: &dyn BrokerAdapter, cancel: &CancelToken) {
    let slice_ids: Vec<u32> = tracker.plan.slices.iter().map(|s| s.id).collect();
    let symbol = tracker.plan.symbol.clone();
    let side = tracker.plan.side;

    for slice_id in slice_ids {
        if cancel.is_cancelled() {
            info!(execution_id = %tracker.plan.execution_id, "vwap cancelled before slice {slice_id}");
            tracker.cancel_remaining(Utc::now());
            return;
        }

        let scheduled_at = tracker
            .plan
            .slices
            .iter()
            .find(|s| s.id == slice_id)
            .map(|s| s.scheduled_at)
            .expect("slice id came from this plan");
        wait_until(scheduled_at).await;

        if cancel.is_cancelled() {
            tracker.cancel_remaining(Utc::now());
            return;
        }

        let quantity = tracker
            .plan
            .slices
            .iter()
            .find(|s| s.id == slice_id)
            .map(|s| s.quantity)
            .expect("slice id came from this plan");

        let submission = broker
            .submit(&symbol, quantity, side, OrderType::Market, None)
            .await;

        let event_id = format!("{}-slice-{}", tracker.plan.execution_id, slice_id);
        match submission {
            Ok(Some(order_id)) => match broker.status(order_id).await {
                Ok(status) if status.filled_avg_price.is_some() => {
                    let _ = tracker.apply_slice_event(
                        slice_id,
                        SliceEvent::Executed {
                            order_id,
                            fill_price: status.filled_avg_price.unwrap(),
                            at: Utc::now(),
                        },
                        Some(&event_id),
                        Utc::now(),
                    );
                }
                _ => {
                    warn!(%order_id, slice_id, "vwap slice submitted but no fill price available");
                    let _ = tracker.apply_slice_event(slice_id, SliceEvent::Failed, Some(&event_id), Utc::now());
                }
            },
            _ => {
                warn!(slice_id, "vwap slice failed to submit");
                let _ = tracker.apply_slice_event(slice_id, SliceEvent::Failed, Some(&event_id), Utc::now());
            }
        }
    }
}

async fn wait_until(scheduled_at: DateTime<Utc>) {
    let now = Utc::now();
    if scheduled_at > now {
        let wait = (scheduled_at - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;
    }
}

/// After a completed (or failed/cancelled) VWAP plan, compute the
/// realized VWAP against `arrival_price` and report the deviation to
/// `monitor`, which raises a WARNING (or CRITICAL past double its
/// configured threshold) alert when `|deviation|` exceeds it. Returns
/// whatever alerts that call raised; an empty plan with no executed
/// slices raises none.
pub fn report_execution(
    plan: &ExecutionPlan,
    arrival_price: Micros,
    monitor: &mut ExecutionMonitor,
    now: DateTime<Utc>,
) -> Vec<Alert> {
    let Some(deviation) = vwap_deviation(plan, arrival_price) else {
        return Vec::new();
    };

    let duration_minutes = plan
        .end
        .map(|end| (end - plan.start).num_seconds() as f64 / 60.0)
        .unwrap_or(0.0);

    monitor.record_execution(
        ExecutionRecord {
            execution_id: plan.execution_id.clone(),
            succeeded: plan.status == PlanStatus::Completed,
            slippage_bps: 0.0,
            duration_minutes,
            vwap_deviation: Some(deviation),
        },
        now,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn open() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 2, 9, 30, 0).unwrap()
    }

    #[test]
    fn full_day_window_covers_every_profile_bucket() {
        let profile = default_profile();
        let slices = plan_slices(1000, open(), 390, &profile);
        assert_eq!(slices.len(), 13);
        assert_eq!(slices.iter().map(|s| s.quantity).sum::<i64>(), 1000);
    }

    #[test]
    fn partial_window_renormalizes_remaining_fractions() {
        let profile = default_profile();
        // Only the first two half-hour buckets fall in range.
        let slices = plan_slices(1000, open(), 60, &profile);
        assert_eq!(slices.len(), 2);
        assert_eq!(slices.iter().map(|s| s.quantity).sum::<i64>(), 1000);
    }

    #[test]
    fn slices_quantities_vary_with_profile_weight() {
        let profile = default_profile();
        let slices = plan_slices(10_000, open(), 390, &profile);
        // 09:30-10:00 (0.15) should get noticeably more than 12:00-12:30 (0.05).
        assert!(slices[0].quantity > slices[6].quantity);
    }

    #[test]
    fn realized_vwap_is_quantity_weighted() {
        let mut plan = new_plan("e1".into(), "AAPL".into(), Side::Buy, 100, open(), 60, &default_profile());
        plan.slices[0].fill_price = Some(Micros::from_f64(100.0));
        plan.slices[0].quantity = 50;
        plan.slices[1].fill_price = Some(Micros::from_f64(110.0));
        plan.slices[1].quantity = 50;

        let vwap = realized_vwap(&plan).unwrap();
        assert_eq!(vwap, Micros::from_f64(105.0));
    }

    #[test]
    fn empty_window_produces_no_slices() {
        let profile = default_profile();
        let late = open() + Duration::hours(20);
        let slices = plan_slices(100, late, 30, &profile);
        assert!(slices.is_empty());
    }
}
