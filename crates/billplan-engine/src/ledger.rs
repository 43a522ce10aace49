//! Replaceable seat ledger.
//!
//! For allocation-based entitlements, the ledger decides how many
//! previously purchased seat credits are consumed on an upgrade, or newly
//! issued on a downgrade, and the resulting balance delta. It deletes at
//! most what exists and never fabricates debt; counts are clamped, not
//! raised as errors, since partial state is expected here.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use billplan_core::{EntitlementId, Replaceable, ReplaceableId};

use crate::classify::{ChangeDirection, ProrationPolicy};
use crate::context::AllocatedInvoiceContext;

/// The replaceable side of an entitlement mutation.
///
/// An upgrade deletes consumed credits; a downgrade inserts new ones.
/// The two never appear together, which the sum type makes unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op", content = "replaceables")]
pub enum ReplaceableMutation {
    /// Credits consumed by an upgrade, to be deleted.
    Delete(Vec<ReplaceableId>),

    /// Credits issued by a downgrade, to be inserted.
    Insert(Vec<Replaceable>),
}

/// A planned mutation of one customer entitlement.
///
/// The balance delta always matches the replaceable list: `-n` for `n`
/// deletions, `+n` for `n` insertions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementUpdate {
    /// The entitlement being changed.
    pub entitlement_id: EntitlementId,

    /// Signed balance change to apply.
    pub balance_change: Decimal,

    /// The replaceables to delete or insert.
    pub mutation: ReplaceableMutation,
}

/// Plan the entitlement mutation for an allocation change.
///
/// Returns `None` when neither branch produces a change: an upgrade that
/// consumes no credits, or a downgrade whose policy does not issue them.
/// Callers treat absence as "no entitlement mutation needed", not as an
/// error.
#[must_use]
pub fn plan_entitlement_update(
    ctx: &AllocatedInvoiceContext,
    policy: &ProrationPolicy,
) -> Option<EntitlementUpdate> {
    match ChangeDirection::from_context(ctx) {
        ChangeDirection::Upgrade => {
            let new_overage_usage = (ctx.new_overage - ctx.previous_overage).max(Decimal::ZERO);
            // Whole credits only; a fractional remainder consumes nothing.
            let wanted = new_overage_usage.to_usize().unwrap_or(0);
            let take = wanted.min(ctx.entitlement.replaceables.len());
            if take == 0 {
                return None;
            }

            // Oldest first, by existing order.
            let delete: Vec<ReplaceableId> = ctx
                .entitlement
                .replaceables
                .iter()
                .take(take)
                .map(|r| r.id)
                .collect();

            debug!(
                entitlement_id = %ctx.entitlement.id,
                wanted,
                deleted = delete.len(),
                "consuming replaceable seat credits for upgrade"
            );

            Some(EntitlementUpdate {
                entitlement_id: ctx.entitlement.id,
                balance_change: -Decimal::from(delete.len()),
                mutation: ReplaceableMutation::Delete(delete),
            })
        }
        ChangeDirection::Downgrade => {
            if !policy.create_replaceables {
                return None;
            }
            let freed = (ctx.previous_overage - ctx.new_overage).max(Decimal::ZERO);
            let num_to_create = freed.to_usize().unwrap_or(0);
            if num_to_create == 0 {
                return None;
            }

            let insert: Vec<Replaceable> = (0..num_to_create)
                .map(|_| Replaceable::issued(ctx.entitlement.id, ctx.context.now))
                .collect();

            debug!(
                entitlement_id = %ctx.entitlement.id,
                created = insert.len(),
                "issuing replaceable seat credits for downgrade"
            );

            Some(EntitlementUpdate {
                entitlement_id: ctx.entitlement.id,
                balance_change: Decimal::from(insert.len()),
                mutation: ReplaceableMutation::Insert(insert),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billplan_core::{CustomerEntitlement, CustomerId, DeductionUpdate, FeatureId, PriceId, ProductId};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    use crate::context::BillingContext;

    fn seat_context(
        allowance: Decimal,
        balance: Decimal,
        delta: Decimal,
        credits: usize,
    ) -> AllocatedInvoiceContext {
        let mut ent = CustomerEntitlement::new(
            CustomerId::generate(),
            ProductId::generate(),
            FeatureId::generate(),
            Some(PriceId::generate()),
            allowance,
            Utc::now(),
        );
        ent.balance = balance;
        for _ in 0..credits {
            ent.replaceables.push(Replaceable::issued(ent.id, Utc::now()));
        }
        let update = DeductionUpdate::new(ent.id, delta);
        let ctx = BillingContext::new(ent.customer_id, Utc::now());
        AllocatedInvoiceContext::from_update(ctx, ent, update)
    }

    fn allow_replaceables() -> ProrationPolicy {
        ProrationPolicy {
            apply_proration: false,
            skip_line_items: false,
            create_replaceables: true,
        }
    }

    fn no_replaceables() -> ProrationPolicy {
        ProrationPolicy {
            apply_proration: true,
            skip_line_items: false,
            create_replaceables: false,
        }
    }

    #[test]
    fn upgrade_consumes_available_credit() {
        // previous_overage=0, new_overage=1, two credits available.
        let ctx = seat_context(dec!(3), dec!(0), dec!(-1), 2);
        let update = plan_entitlement_update(&ctx, &no_replaceables()).unwrap();

        assert_eq!(update.balance_change, dec!(-1));
        match update.mutation {
            ReplaceableMutation::Delete(ids) => assert_eq!(ids.len(), 1),
            ReplaceableMutation::Insert(_) => panic!("upgrade must delete, not insert"),
        }
    }

    #[test]
    fn upgrade_consumes_oldest_credits_first() {
        let ctx = seat_context(dec!(3), dec!(-1), dec!(-2), 3);
        let expected: Vec<ReplaceableId> = ctx
            .entitlement
            .replaceables
            .iter()
            .take(2)
            .map(|r| r.id)
            .collect();

        let update = plan_entitlement_update(&ctx, &no_replaceables()).unwrap();
        assert_eq!(update.mutation, ReplaceableMutation::Delete(expected));
        assert_eq!(update.balance_change, dec!(-2));
    }

    #[test]
    fn upgrade_never_deletes_more_than_exist() {
        // Overage grows by 4 but only 2 credits exist.
        let ctx = seat_context(dec!(3), dec!(0), dec!(-4), 2);
        let update = plan_entitlement_update(&ctx, &no_replaceables()).unwrap();

        assert_eq!(update.balance_change, dec!(-2));
        match update.mutation {
            ReplaceableMutation::Delete(ids) => assert_eq!(ids.len(), 2),
            ReplaceableMutation::Insert(_) => panic!("upgrade must delete, not insert"),
        }
    }

    #[test]
    fn upgrade_without_credits_is_no_op() {
        let ctx = seat_context(dec!(3), dec!(0), dec!(-2), 0);
        assert!(plan_entitlement_update(&ctx, &no_replaceables()).is_none());
    }

    #[test]
    fn upgrade_within_allowance_is_no_op() {
        // Usage rises but never crosses the allowance; no overage change.
        let ctx = seat_context(dec!(5), dec!(4), dec!(-2), 2);
        assert!(plan_entitlement_update(&ctx, &no_replaceables()).is_none());
    }

    #[test]
    fn downgrade_issues_credits_matching_freed_overage() {
        // previous_overage=3, new_overage=1.
        let ctx = seat_context(dec!(2), dec!(-3), dec!(2), 0);
        let update = plan_entitlement_update(&ctx, &allow_replaceables()).unwrap();

        assert_eq!(update.balance_change, dec!(2));
        match update.mutation {
            ReplaceableMutation::Insert(created) => {
                assert_eq!(created.len(), 2);
                assert!(created.iter().all(|r| r.delete_next_cycle));
                assert!(created.iter().all(|r| r.entitlement_id == ctx.entitlement.id));
            }
            ReplaceableMutation::Delete(_) => panic!("downgrade must insert, not delete"),
        }
    }

    #[test]
    fn downgrade_without_policy_is_no_op() {
        let ctx = seat_context(dec!(2), dec!(-3), dec!(2), 0);
        assert!(plan_entitlement_update(&ctx, &no_replaceables()).is_none());
    }

    #[test]
    fn downgrade_within_allowance_creates_nothing() {
        let ctx = seat_context(dec!(5), dec!(2), dec!(1), 0);
        assert!(plan_entitlement_update(&ctx, &allow_replaceables()).is_none());
    }

    #[test]
    fn equal_usage_is_downgrade_path_no_op() {
        let ctx = seat_context(dec!(3), dec!(-1), dec!(0), 2);
        assert!(plan_entitlement_update(&ctx, &allow_replaceables()).is_none());
    }
}
