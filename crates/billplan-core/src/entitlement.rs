//! Entitlement types for billplan.
//!
//! An entitlement tracks one customer's balance for one feature under one
//! product. The balance counts down from the allowance as usage is recorded;
//! a negative balance is overage. Seat entitlements additionally carry
//! replaceable credits: previously purchased seats that can be re-applied to
//! a new occupant without a new charge.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::{CustomerId, EntitlementId, FeatureId, PriceId, ProductId, ReplaceableId};

/// A customer's tracked balance for one feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerEntitlement {
    /// Unique entitlement ID.
    pub id: EntitlementId,

    /// The owning customer.
    pub customer_id: CustomerId,

    /// The product that granted this entitlement.
    pub product_id: ProductId,

    /// The feature being tracked.
    pub feature_id: FeatureId,

    /// The price billing this feature, if it is a paid feature.
    pub price_id: Option<PriceId>,

    /// Units included before per-unit billing starts.
    pub allowance: Decimal,

    /// Remaining units. Negative when usage exceeds the allowance.
    pub balance: Decimal,

    /// Seat credits available for re-application, oldest first.
    pub replaceables: Vec<Replaceable>,

    /// When the entitlement was created.
    pub created_at: DateTime<Utc>,

    /// When the entitlement was last updated.
    pub updated_at: DateTime<Utc>,
}

impl CustomerEntitlement {
    /// Create a fresh entitlement with its full allowance.
    #[must_use]
    pub fn new(
        customer_id: CustomerId,
        product_id: ProductId,
        feature_id: FeatureId,
        price_id: Option<PriceId>,
        allowance: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EntitlementId::generate(),
            customer_id,
            product_id,
            feature_id,
            price_id,
            allowance,
            balance: allowance,
            replaceables: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Units consumed so far (allowance minus remaining balance).
    #[must_use]
    pub fn usage(&self) -> Decimal {
        self.allowance - self.balance
    }

    /// Units consumed beyond the allowance. Never negative.
    #[must_use]
    pub fn overage(&self) -> Decimal {
        (-self.balance).max(Decimal::ZERO)
    }
}

/// A previously purchased seat credit.
///
/// Replaceables let a downgraded seat be re-applied to a new occupant
/// without a new charge. Each is consumed at most once; unconsumed credits
/// issued on a downgrade expire at the next cycle boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replaceable {
    /// Unique, time-ordered ID.
    pub id: ReplaceableId,

    /// The entitlement this credit belongs to.
    pub entitlement_id: EntitlementId,

    /// When the credit was issued.
    pub created_at: DateTime<Utc>,

    /// Whether the credit expires at the next cycle boundary.
    pub delete_next_cycle: bool,
}

impl Replaceable {
    /// Issue a credit that expires at the next cycle boundary.
    #[must_use]
    pub fn issued(entitlement_id: EntitlementId, at: DateTime<Utc>) -> Self {
        Self {
            id: ReplaceableId::generate(),
            entitlement_id,
            created_at: at,
            delete_next_cycle: true,
        }
    }
}

/// A balance delta produced by the external usage-metering path.
///
/// The engine consumes these as input; it never produces them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeductionUpdate {
    /// The entitlement being adjusted.
    pub entitlement_id: EntitlementId,

    /// Signed balance change. Negative means consumption.
    pub balance_delta: Decimal,

    /// Additional context (`request_id`, source, etc.).
    pub metadata: serde_json::Value,
}

impl DeductionUpdate {
    /// Create a balance adjustment.
    #[must_use]
    pub fn new(entitlement_id: EntitlementId, balance_delta: Decimal) -> Self {
        Self {
            entitlement_id,
            balance_delta,
            metadata: serde_json::Value::Null,
        }
    }

    /// Set metadata on the update.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn entitlement(allowance: Decimal, balance: Decimal) -> CustomerEntitlement {
        let mut ent = CustomerEntitlement::new(
            CustomerId::generate(),
            ProductId::generate(),
            FeatureId::generate(),
            Some(PriceId::generate()),
            allowance,
            Utc::now(),
        );
        ent.balance = balance;
        ent
    }

    #[test]
    fn fresh_entitlement_has_full_balance() {
        let ent = entitlement(dec!(5), dec!(5));
        assert_eq!(ent.usage(), dec!(0));
        assert_eq!(ent.overage(), dec!(0));
    }

    #[test]
    fn usage_counts_down_from_allowance() {
        let ent = entitlement(dec!(5), dec!(2));
        assert_eq!(ent.usage(), dec!(3));
        assert_eq!(ent.overage(), dec!(0));
    }

    #[test]
    fn negative_balance_is_overage() {
        let ent = entitlement(dec!(3), dec!(-2));
        assert_eq!(ent.usage(), dec!(5));
        assert_eq!(ent.overage(), dec!(2));
    }

    #[test]
    fn issued_replaceable_expires_next_cycle() {
        let now = Utc::now();
        let credit = Replaceable::issued(EntitlementId::generate(), now);
        assert!(credit.delete_next_cycle);
        assert_eq!(credit.created_at, now);
    }

    #[test]
    fn deduction_update_roundtrips() {
        let update = DeductionUpdate::new(EntitlementId::generate(), dec!(-1))
            .with_metadata(serde_json::json!({"source": "gateway"}));
        let json = serde_json::to_string(&update).unwrap();
        let parsed: DeductionUpdate = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.balance_delta, dec!(-1));
    }
}
