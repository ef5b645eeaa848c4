//! Explicit state machine for a [`Slice`] and the [`ExecutionPlan`] that
//! owns it. Every broker callback is applied through
//! [`PlanTracker::apply_slice_event`], which enforces legal transitions
//! and dedups replayed events by id — the same idempotent-replay shape
//! used for live order lifecycles elsewhere in this codebase.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use qtx_schemas::{ExecutionPlan, Micros, PlanStatus, Slice, SliceStatus};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("illegal slice transition: slice {slice_id} is {from:?}, cannot apply {event}")]
    IllegalTransition {
        slice_id: u32,
        from: SliceStatus,
        event: String,
    },
    #[error("no slice with id {0}")]
    UnknownSlice(u32),
}

/// An event a broker callback or the cancellation path applies to one slice.
#[derive(Debug, Clone, PartialEq)]
pub enum SliceEvent {
    Executed {
        order_id: Uuid,
        fill_price: Micros,
        at: DateTime<Utc>,
    },
    Failed,
    Cancelled,
}

impl std::fmt::Display for SliceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SliceEvent::Executed { .. } => write!(f, "Executed"),
            SliceEvent::Failed => write!(f, "Failed"),
            SliceEvent::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Wraps an [`ExecutionPlan`], owning the idempotent-replay bookkeeping
/// and deriving the plan's aggregate status from its slices.
#[derive(Debug, Clone)]
pub struct PlanTracker {
    pub plan: ExecutionPlan,
    applied: HashSet<String>,
}

impl PlanTracker {
    pub fn new(plan: ExecutionPlan) -> Self {
        PlanTracker {
            plan,
            applied: HashSet::new(),
        }
    }

    /// Apply one event to the slice with id `slice_id`, at time `now`
    /// (used only to stamp `plan.end` if this event completes the
    /// plan). `event_id`, when supplied, dedups replays — a repeat is a
    /// silent no-op.
    pub fn apply_slice_event(
        &mut self,
        slice_id: u32,
        event: SliceEvent,
        event_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), PlanError> {
        if let Some(id) = event_id {
            if self.applied.contains(id) {
                return Ok(());
            }
        }

        let slice = self
            .plan
            .slices
            .iter_mut()
            .find(|s| s.id == slice_id)
            .ok_or(PlanError::UnknownSlice(slice_id))?;

        match (slice.status, &event) {
            (SliceStatus::Pending, SliceEvent::Executed { order_id, fill_price, at }) => {
                slice.status = SliceStatus::Executed;
                slice.order_id = Some(*order_id);
                slice.fill_price = Some(*fill_price);
                slice.fill_time = Some(*at);
            }
            (SliceStatus::Pending, SliceEvent::Failed) => {
                slice.status = SliceStatus::Failed;
            }
            (SliceStatus::Pending, SliceEvent::Cancelled) => {
                slice.status = SliceStatus::Cancelled;
            }
            (from, event) => {
                return Err(PlanError::IllegalTransition {
                    slice_id,
                    from,
                    event: event.to_string(),
                });
            }
        }

        if let Some(id) = event_id {
            self.applied.insert(id.to_string());
        }

        self.recompute_plan_status(now);
        Ok(())
    }

    /// Mark every still-pending slice cancelled and the plan cancelled.
    pub fn cancel_remaining(&mut self, now: DateTime<Utc>) {
        for slice in &mut self.plan.slices {
            if slice.status == SliceStatus::Pending {
                slice.status = SliceStatus::Cancelled;
            }
        }
        self.recompute_plan_status(now);
    }

    fn recompute_plan_status(&mut self, now: DateTime<Utc>) {
        if self.plan.status != PlanStatus::Running {
            return;
        }
        let any_pending = self
            .plan
            .slices
            .iter()
            .any(|s| s.status == SliceStatus::Pending);
        if any_pending {
            return;
        }

        let any_executed = self
            .plan
            .slices
            .iter()
            .any(|s| s.status == SliceStatus::Executed);
        let any_cancelled = self
            .plan
            .slices
            .iter()
            .any(|s| s.status == SliceStatus::Cancelled);

        self.plan.status = if any_executed {
            PlanStatus::Completed
        } else if any_cancelled {
            PlanStatus::Cancelled
        } else {
            PlanStatus::Failed
        };
        self.plan.end = Some(now);
    }
}
