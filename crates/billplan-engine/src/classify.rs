//! Change-direction classification and proration policy lookup.
//!
//! Direction is decided purely from the usage scalars: strictly greater new
//! usage is an upgrade, anything else takes the downgrade (no-op safe)
//! path. A swap to a cheaper price with a higher allocation still
//! classifies as an upgrade; only usage deltas are consulted.
//!
//! The policy lookup is a pure table over the price's configured
//! increase/decrease behavior. It has no side effects and is idempotent.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use billplan_core::{OnDecrease, OnIncrease, Price};

use crate::context::AllocatedInvoiceContext;

/// Which way an entitlement change moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeDirection {
    /// Usage strictly increased.
    Upgrade,

    /// Usage decreased or stayed equal.
    Downgrade,
}

impl ChangeDirection {
    /// Classify from the previous and new usage scalars.
    ///
    /// Equality is classified as `Downgrade`: the downgrade path is no-op
    /// safe, so an unchanged quantity produces no mutation and no charge.
    #[must_use]
    pub fn from_usage(previous_usage: Decimal, new_usage: Decimal) -> Self {
        if new_usage > previous_usage {
            Self::Upgrade
        } else {
            Self::Downgrade
        }
    }

    /// Classify an allocated-invoice context.
    #[must_use]
    pub fn from_context(ctx: &AllocatedInvoiceContext) -> Self {
        Self::from_usage(ctx.previous_usage, ctx.new_usage)
    }

    /// Whether this is the upgrade direction.
    #[must_use]
    pub const fn is_upgrade(&self) -> bool {
        matches!(self, Self::Upgrade)
    }
}

/// The resolved proration policy for one price and direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProrationPolicy {
    /// Whether monetary amounts are prorated over the remaining period.
    pub apply_proration: bool,

    /// Whether the whole plan short-circuits to no line items and no
    /// entitlement mutation (the change takes effect at renewal).
    pub skip_line_items: bool,

    /// Whether a downgrade issues replaceable seat credits instead of a
    /// refund.
    pub create_replaceables: bool,
}

/// Resolve the proration policy configured on `price` for `direction`.
#[must_use]
pub fn proration_policy(price: &Price, direction: ChangeDirection) -> ProrationPolicy {
    match direction {
        ChangeDirection::Upgrade => match price.on_increase {
            OnIncrease::BillImmediately => ProrationPolicy {
                apply_proration: false,
                skip_line_items: false,
                create_replaceables: false,
            },
            OnIncrease::ProrateImmediately => ProrationPolicy {
                apply_proration: true,
                skip_line_items: false,
                create_replaceables: false,
            },
            OnIncrease::BillNextCycle => ProrationPolicy {
                apply_proration: false,
                skip_line_items: true,
                create_replaceables: false,
            },
        },
        ChangeDirection::Downgrade => match price.on_decrease {
            OnDecrease::ProrateImmediately => ProrationPolicy {
                apply_proration: true,
                skip_line_items: false,
                create_replaceables: false,
            },
            OnDecrease::RetainSeatCredit => ProrationPolicy {
                apply_proration: false,
                skip_line_items: false,
                create_replaceables: true,
            },
            OnDecrease::NoImmediateEffect => ProrationPolicy {
                apply_proration: false,
                skip_line_items: true,
                create_replaceables: false,
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billplan_core::{BillingInterval, FeatureId, ProductId};
    use rust_decimal_macros::dec;

    fn seat_price(on_increase: OnIncrease, on_decrease: OnDecrease) -> Price {
        Price::allocation(
            ProductId::generate(),
            FeatureId::generate(),
            "Seats",
            dec!(10),
            dec!(3),
            BillingInterval::Month,
        )
        .with_proration(on_increase, on_decrease)
    }

    #[test]
    fn strictly_greater_usage_is_upgrade() {
        assert!(ChangeDirection::from_usage(dec!(3), dec!(5)).is_upgrade());
        assert!(!ChangeDirection::from_usage(dec!(5), dec!(3)).is_upgrade());
    }

    #[test]
    fn equal_usage_takes_downgrade_path() {
        assert_eq!(
            ChangeDirection::from_usage(dec!(4), dec!(4)),
            ChangeDirection::Downgrade
        );
    }

    #[test]
    fn fractional_usage_compares_exactly() {
        assert!(ChangeDirection::from_usage(dec!(2.5), dec!(2.51)).is_upgrade());
        assert!(!ChangeDirection::from_usage(dec!(2.51), dec!(2.5)).is_upgrade());
    }

    #[test]
    fn policy_lookup_is_deterministic() {
        let price = seat_price(OnIncrease::ProrateImmediately, OnDecrease::RetainSeatCredit);
        let first = proration_policy(&price, ChangeDirection::Upgrade);
        let second = proration_policy(&price, ChangeDirection::Upgrade);
        assert_eq!(first, second);
        assert!(first.apply_proration);
        assert!(!first.skip_line_items);
    }

    #[test]
    fn bill_next_cycle_skips_everything() {
        let price = seat_price(OnIncrease::BillNextCycle, OnDecrease::NoImmediateEffect);
        assert!(proration_policy(&price, ChangeDirection::Upgrade).skip_line_items);
        assert!(proration_policy(&price, ChangeDirection::Downgrade).skip_line_items);
    }

    #[test]
    fn retained_seat_credit_creates_replaceables_without_refund() {
        let price = seat_price(OnIncrease::BillImmediately, OnDecrease::RetainSeatCredit);
        let policy = proration_policy(&price, ChangeDirection::Downgrade);
        assert!(policy.create_replaceables);
        assert!(!policy.apply_proration);
        assert!(!policy.skip_line_items);
    }
}
