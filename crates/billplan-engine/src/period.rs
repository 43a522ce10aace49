//! Billing period calculation.
//!
//! Given an anchor, an interval, and floor constraints, this module computes
//! the concrete `[start, end)` period containing "now". One-off prices have
//! no period. The start is clamped so a period never begins before the
//! provider-side subscription existed; the end is clamped so it never lands
//! before the active cycle-anchor floor (e.g. a trial end), except when the
//! anchor is still the floating sentinel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use billplan_core::BillingInterval;

use crate::context::{BillingContext, CycleAnchor};

/// A half-open billing period `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingPeriod {
    /// Inclusive start of the period.
    pub start: DateTime<Utc>,

    /// Exclusive end of the period.
    pub end: DateTime<Utc>,
}

impl BillingPeriod {
    /// Total length of the period in whole seconds.
    #[must_use]
    pub fn total_seconds(&self) -> i64 {
        (self.end - self.start).num_seconds()
    }

    /// Seconds remaining after `at`, clamped to the period.
    #[must_use]
    pub fn remaining_seconds(&self, at: DateTime<Utc>) -> i64 {
        let at = at.clamp(self.start, self.end);
        (self.end - at).num_seconds()
    }
}

/// Floor constraints applied to a computed period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeriodFloors {
    /// The period start never precedes this (provider subscription start).
    pub subscription_started_at: Option<DateTime<Utc>>,

    /// The period end never precedes this (active cycle-anchor floor,
    /// e.g. a trial end). Ignored when the anchor is the sentinel.
    pub anchor_floor: Option<DateTime<Utc>>,
}

impl PeriodFloors {
    /// Extract the floors a context implies.
    #[must_use]
    pub fn from_context(ctx: &BillingContext) -> Self {
        let subscription = ctx.provider.subscription.as_ref();
        Self {
            subscription_started_at: subscription.map(|s| s.started_at),
            anchor_floor: subscription.and_then(|s| s.trial_ends_at),
        }
    }
}

/// Compute the billing period containing `now` for a price.
///
/// Returns `None` for one-off prices (`interval` is `None`); they have no
/// period. An `interval_count` of zero is treated as one.
#[must_use]
pub fn compute_period(
    anchor: CycleAnchor,
    interval: Option<BillingInterval>,
    interval_count: u32,
    now: DateTime<Utc>,
    floors: PeriodFloors,
) -> Option<BillingPeriod> {
    let interval = interval?;
    let count = interval_count.max(1);

    let anchor_ts = anchor.resolve(now);
    let mut start = anchor_ts;

    // Walk whole cycles from the anchor until `start <= now < end`.
    if start <= now {
        loop {
            let next = interval.advance(start, count);
            if next > now {
                break;
            }
            start = next;
        }
    } else {
        while start > now {
            start = interval.retreat(start, count);
        }
    }
    let mut end = interval.advance(start, count);

    if let Some(floor) = floors.subscription_started_at {
        if start < floor {
            warn!(
                period_start = %start,
                floor = %floor,
                "period start precedes subscription start, clamping"
            );
            start = floor;
        }
    }

    // The sentinel anchor has no committed cycle to clamp the end against.
    if !anchor.is_unset() {
        if let Some(floor) = floors.anchor_floor {
            if end < floor {
                warn!(
                    period_end = %end,
                    floor = %floor,
                    "period end precedes anchor floor, clamping"
                );
                end = floor;
            }
        }
    }

    Some(BillingPeriod { start, end })
}
