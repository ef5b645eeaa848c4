//! Time-weighted-average-price scheduler: equal slices across a fixed window.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use qtx_schemas::{ExecutionPlan, OrderType, PlanStatus, Side, Slice, SliceStatus, Strategy};
use tracing::{info, warn};

use crate::broker::BrokerAdapter;
use crate::plan::{PlanTracker, SliceEvent};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TwapSpec {
    pub total_quantity: i64,
    pub num_slices: u32,
    pub window_minutes: i64,
    pub timing_randomization_seconds: i64,
}

/// Build the slice plan: base size `total_quantity / num_slices`, the
/// remainder distributed one-per-slice to the first slices, evenly
/// spaced across `window_minutes`. `jitter` supplies the per-slice
/// timing jitter in seconds and is never called for slice 0.
pub fn plan_slices(
    spec: &TwapSpec,
    start: DateTime<Utc>,
    mut jitter: impl FnMut() -> i64,
) -> Vec<Slice> {
    let num_slices = spec.num_slices.max(1) as i64;
    let base_size = spec.total_quantity / num_slices;
    let remainder = spec.total_quantity % num_slices;
    let interval = Duration::seconds((spec.window_minutes * 60) / num_slices);

    (0..num_slices)
        .map(|i| {
            let quantity = base_size + if i < remainder { 1 } else { 0 };
            let mut scheduled_at = start + interval * i as i32;
            if i > 0 {
                scheduled_at += Duration::seconds(jitter());
            }
            Slice {
                id: i as u32,
                quantity,
                scheduled_at,
                status: SliceStatus::Pending,
                order_id: None,
                fill_price: None,
                fill_time: None,
                expected_volume_pct: None,
            }
        })
        .collect()
}

/// Build a `rand`-backed jitter closure bounded to `[-max_seconds, max_seconds]`.
pub fn default_jitter(max_seconds: i64) -> impl FnMut() -> i64 {
    move || {
        if max_seconds <= 0 {
            0
        } else {
            rand::random::<i64>().rem_euclid(2 * max_seconds + 1) - max_seconds
        }
    }
}

pub fn new_plan(execution_id: String, symbol: String, side: Side, spec: &TwapSpec, start: DateTime<Utc>) -> ExecutionPlan {
    let slices = plan_slices(spec, start, default_jitter(spec.timing_randomization_seconds));
    ExecutionPlan {
        execution_id,
        symbol,
        side,
        total_quantity: spec.total_quantity,
        strategy: Strategy::Twap,
        slices,
        status: PlanStatus::Running,
        start,
        end: None,
    }
}

/// A flag any task holding a clone can set to request cancellation of
/// the remaining, not-yet-submitted slices of a running plan.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// `execution_id`-keyed cancellation surface shared by both schedulers:
/// whoever spawns a plan's execution task registers its `CancelToken`
/// here, and `Cancel(execution_id)` looks it up and flips it without
/// the caller needing to hold on to the token itself.
#[derive(Default)]
pub struct CancelRegistry {
    tokens: Mutex<BTreeMap<String, CancelToken>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        CancelRegistry {
            tokens: Mutex::new(BTreeMap::new()),
        }
    }

    /// Register the token driving `execution_id`'s running plan,
    /// returning a clone the caller hands to `run`.
    pub fn register(&self, execution_id: impl Into<String>) -> CancelToken {
        let token = CancelToken::new();
        self.tokens.lock().unwrap().insert(execution_id.into(), token.clone());
        token
    }

    /// `Cancel(execution_id) -> bool`: flips the registered token and
    /// reports whether one was found. A plan that already finished (and
    /// was deregistered) or never existed returns `false`.
    pub fn cancel(&self, execution_id: &str) -> bool {
        match self.tokens.lock().unwrap().get(execution_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Drop the bookkeeping for a plan once its execution task has
    /// finished (completed, cancelled, or failed).
    pub fn deregister(&self, execution_id: &str) {
        self.tokens.lock().unwrap().remove(execution_id);
    }
}

/// Run every slice of `tracker.plan` sequentially: wait until
/// `scheduled_at`, submit a MARKET child order, record the fill. A
/// cancellation request is honored at the top of each iteration,
/// before the wait. A slice with no returned order id is marked FAILED
/// and execution proceeds to the next slice rather than aborting.
pub async fn run(
    tracker: &mut PlanTracker,
    broker: &dyn BrokerAdapter,
    cancel: &CancelToken,
) {
    let slice_ids: Vec<u32> = tracker.plan.slices.iter().map(|s| s.id).collect();
    let symbol = tracker.plan.symbol.clone();
    let side = tracker.plan.side;

    for slice_id in slice_ids {
        if cancel.is_cancelled() {
            info!(execution_id = %tracker.plan.execution_id, "twap cancelled before slice {slice_id}");
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
                    warn!(%order_id, slice_id, "twap slice submitted but no fill price available");
                    let _ = tracker.apply_slice_event(slice_id, SliceEvent::Failed, Some(&event_id), Utc::now());
                }
            },
            _ => {
                warn!(slice_id, "twap slice failed to submit");
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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 2, 9, 30, 0).unwrap()
    }

    #[test]
    fn slice_sizes_split_remainder_across_first_slices() {
        let spec = TwapSpec {
            total_quantity: 103,
            num_slices: 10,
            window_minutes: 60,
            timing_randomization_seconds: 0,
        };
        let slices = plan_slices(&spec, start(), || 0);
        let sizes: Vec<i64> = slices.iter().map(|s| s.quantity).collect();
        assert_eq!(sizes.iter().sum::<i64>(), 103);
        assert_eq!(&sizes[..3], &[11, 11, 11]);
        assert_eq!(&sizes[3..], &[10; 7]);
    }

    #[test]
    fn slices_are_evenly_spaced_across_the_window() {
        let spec = TwapSpec {
            total_quantity: 100,
            num_slices: 10,
            window_minutes: 60,
            timing_randomization_seconds: 0,
        };
        let slices = plan_slices(&spec, start(), || 0);
        assert_eq!(slices[1].scheduled_at - slices[0].scheduled_at, Duration::minutes(6));
    }

    #[test]
    fn first_slice_is_never_jittered() {
        let spec = TwapSpec {
            total_quantity: 10,
            num_slices: 2,
            window_minutes: 10,
            timing_randomization_seconds: 30,
        };
        let slices = plan_slices(&spec, start(), || 30);
        assert_eq!(slices[0].scheduled_at, start());
        assert_eq!(slices[1].scheduled_at, start() + Duration::minutes(5) + Duration::seconds(30));
    }

    #[test]
    fn cancel_token_reports_cancellation() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn registry_cancel_flips_the_registered_token() {
        let registry = CancelRegistry::new();
        let token = registry.register("exec-1");
        assert!(!token.is_cancelled());
        assert!(registry.cancel("exec-1"));
        assert!(token.is_cancelled());
    }

    #[test]
    fn registry_cancel_on_unknown_execution_id_returns_false() {
        let registry = CancelRegistry::new();
        assert!(!registry.cancel("never-registered"));
    }

    #[test]
    fn deregistered_execution_id_can_no_longer_be_cancelled() {
        let registry = CancelRegistry::new();
        registry.register("exec-1");
        registry.deregister("exec-1");
        assert!(!registry.cancel("exec-1"));
    }
}
