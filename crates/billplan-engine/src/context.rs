//! Billing context assembly.
//!
//! A [`BillingContext`] is the immutable snapshot of state a plan
//! computation reads: the customer's products and entitlements, the
//! requested feature quantities, the clock, the cycle anchors, and the
//! provider-side references. It is fully populated by an external assembler
//! before the engine runs; nothing in this crate fetches data or mutates a
//! context in place. Derived contexts (e.g. the projector's shifted clock)
//! are produced by [`BillingContext::with_now`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use billplan_core::{
    CustomerEntitlement, CustomerId, CustomerProduct, DeductionUpdate, FeatureId, PriceId, Product,
    ProductId,
};

/// The billing-cycle anchor for a customer.
///
/// `Unset` is the sentinel for "no committed cycle exists yet": periods
/// float from the request instant and there is no forward cycle to project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "at")]
pub enum CycleAnchor {
    /// No committed anchor; cycles float from the current instant.
    Unset,

    /// A committed anchor timestamp.
    At(DateTime<Utc>),
}

impl CycleAnchor {
    /// Whether this anchor is the floating sentinel.
    #[must_use]
    pub const fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    /// The anchor instant, with the sentinel resolving to `now`.
    #[must_use]
    pub fn resolve(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Unset => now,
            Self::At(ts) => *ts,
        }
    }
}

/// A discount attached to the provider-side customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discount {
    /// Provider-side discount reference.
    pub reference: String,

    /// Percentage off, 0–100.
    pub percent_off: Option<Decimal>,

    /// Flat amount off, in the context currency.
    pub amount_off: Option<Decimal>,
}

impl Discount {
    /// A percentage discount.
    #[must_use]
    pub fn percent(reference: impl Into<String>, percent_off: Decimal) -> Self {
        Self {
            reference: reference.into(),
            percent_off: Some(percent_off),
            amount_off: None,
        }
    }

    /// A flat-amount discount.
    #[must_use]
    pub fn amount(reference: impl Into<String>, amount_off: Decimal) -> Self {
        Self {
            reference: reference.into(),
            percent_off: None,
            amount_off: Some(amount_off),
        }
    }
}

/// The provider-side subscription backing the customer's recurring billing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSubscription {
    /// Provider-side subscription reference.
    pub reference: String,

    /// When the subscription was created on the provider.
    ///
    /// Billing periods never start before this instant.
    pub started_at: DateTime<Utc>,

    /// When the trial ends, if one is running.
    ///
    /// Billing periods never end before this instant.
    pub trial_ends_at: Option<DateTime<Utc>>,
}

/// Provider-side references carried through the computation.
///
/// The engine never talks to the provider; these are opaque handles the
/// downstream adapter needs to execute the resulting action plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderRefs {
    /// Provider-side customer reference.
    pub customer: Option<String>,

    /// Provider-side subscription, if one exists.
    pub subscription: Option<ProviderSubscription>,

    /// Discounts to apply between pre-discount and final amounts.
    pub discounts: Vec<Discount>,

    /// Default payment method reference.
    pub payment_method: Option<String>,
}

/// Version tag for the billing model a context was assembled under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingModelVersion {
    /// The current model.
    #[default]
    V2,

    /// The legacy model, kept for contexts assembled from old records.
    V1,
}

/// A product in play for a computation: the catalog definition plus the
/// customer's attachment record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextProduct {
    /// Catalog definition.
    pub product: Product,

    /// The customer's attachment.
    pub customer_product: CustomerProduct,
}

/// The immutable snapshot a plan computation reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingContext {
    /// The customer being billed.
    pub customer_id: CustomerId,

    /// Products in play: current attachments and, for swaps, the target.
    pub products: Vec<ContextProduct>,

    /// The customer's entitlements, used to resolve allocation and
    /// consumable prices.
    pub entitlements: Vec<CustomerEntitlement>,

    /// Requested feature quantities for the change being computed.
    pub requested_quantities: HashMap<FeatureId, Decimal>,

    /// The instant the computation runs at.
    pub now: DateTime<Utc>,

    /// The customer's billing-cycle anchor.
    pub billing_cycle_anchor: CycleAnchor,

    /// The anchor entitlement balances reset on, when it differs from the
    /// billing-cycle anchor.
    pub reset_cycle_anchor: Option<DateTime<Utc>>,

    /// Provider-side references.
    pub provider: ProviderRefs,

    /// Billing-model version this context was assembled under.
    pub model_version: BillingModelVersion,
}

impl BillingContext {
    /// Create a minimal context for a customer at an instant.
    #[must_use]
    pub fn new(customer_id: CustomerId, now: DateTime<Utc>) -> Self {
        Self {
            customer_id,
            products: Vec::new(),
            entitlements: Vec::new(),
            requested_quantities: HashMap::new(),
            now,
            billing_cycle_anchor: CycleAnchor::Unset,
            reset_cycle_anchor: None,
            provider: ProviderRefs::default(),
            model_version: BillingModelVersion::default(),
        }
    }

    /// Add a product in play.
    #[must_use]
    pub fn with_product(mut self, product: Product, customer_product: CustomerProduct) -> Self {
        self.products.push(ContextProduct {
            product,
            customer_product,
        });
        self
    }

    /// Add an entitlement.
    #[must_use]
    pub fn with_entitlement(mut self, entitlement: CustomerEntitlement) -> Self {
        self.entitlements.push(entitlement);
        self
    }

    /// Set a requested quantity for a feature.
    #[must_use]
    pub fn with_requested_quantity(mut self, feature_id: FeatureId, quantity: Decimal) -> Self {
        self.requested_quantities.insert(feature_id, quantity);
        self
    }

    /// Set the billing-cycle anchor.
    #[must_use]
    pub fn with_anchor(mut self, anchor: CycleAnchor) -> Self {
        self.billing_cycle_anchor = anchor;
        self
    }

    /// Set the provider references.
    #[must_use]
    pub fn with_provider(mut self, provider: ProviderRefs) -> Self {
        self.provider = provider;
        self
    }

    /// Derive a new context with the clock shifted to `now`.
    ///
    /// Everything else is carried over unchanged. The original context is
    /// not touched; the projector uses this to price a future cycle.
    #[must_use]
    pub fn with_now(&self, now: DateTime<Utc>) -> Self {
        Self {
            now,
            ..self.clone()
        }
    }

    /// Look up a product in play by ID.
    #[must_use]
    pub fn find_product(&self, product_id: ProductId) -> Option<&ContextProduct> {
        self.products.iter().find(|p| p.product.id == product_id)
    }

    /// Look up the entitlement billed by a price.
    #[must_use]
    pub fn entitlement_for_price(&self, price_id: PriceId) -> Option<&CustomerEntitlement> {
        self.entitlements
            .iter()
            .find(|e| e.price_id == Some(price_id))
    }

    /// Look up an entitlement by feature.
    #[must_use]
    pub fn entitlement_for_feature(&self, feature_id: FeatureId) -> Option<&CustomerEntitlement> {
        self.entitlements.iter().find(|e| e.feature_id == feature_id)
    }

    /// The requested quantity for a feature, if one was supplied.
    #[must_use]
    pub fn requested_quantity(&self, feature_id: FeatureId) -> Option<Decimal> {
        self.requested_quantities.get(&feature_id).copied()
    }
}

/// Context for a single entitlement change, extending [`BillingContext`]
/// with the entitlement being changed and the usage scalars every
/// downstream component reads.
///
/// The four scalars are computed once, before any line items exist.
/// `new_usage > previous_usage` is the sole upgrade/downgrade
/// discriminator; equality goes down the downgrade (no-op safe) path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocatedInvoiceContext {
    /// The base snapshot.
    pub context: BillingContext,

    /// The entitlement being changed.
    pub entitlement: CustomerEntitlement,

    /// The raw update being applied.
    pub update: DeductionUpdate,

    /// Units consumed before the update.
    pub previous_usage: Decimal,

    /// Units consumed after the update.
    pub new_usage: Decimal,

    /// Units beyond the allowance before the update.
    pub previous_overage: Decimal,

    /// Units beyond the allowance after the update.
    pub new_overage: Decimal,
}

impl AllocatedInvoiceContext {
    /// Build the change context by applying `update` to `entitlement`
    /// arithmetically (the entitlement record itself is not modified).
    #[must_use]
    pub fn from_update(
        context: BillingContext,
        entitlement: CustomerEntitlement,
        update: DeductionUpdate,
    ) -> Self {
        let previous_balance = entitlement.balance;
        let new_balance = previous_balance + update.balance_delta;

        let previous_usage = entitlement.allowance - previous_balance;
        let new_usage = entitlement.allowance - new_balance;
        let previous_overage = (-previous_balance).max(Decimal::ZERO);
        let new_overage = (-new_balance).max(Decimal::ZERO);

        Self {
            context,
            entitlement,
            update,
            previous_usage,
            new_usage,
            previous_overage,
            new_overage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billplan_core::{EntitlementId, ProductId};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn entitlement_with_balance(allowance: Decimal, balance: Decimal) -> CustomerEntitlement {
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
    fn unset_anchor_resolves_to_now() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        assert_eq!(CycleAnchor::Unset.resolve(now), now);
        assert!(CycleAnchor::Unset.is_unset());
    }

    #[test]
    fn committed_anchor_resolves_to_itself() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let anchor = Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap();
        assert_eq!(CycleAnchor::At(anchor).resolve(now), anchor);
    }

    #[test]
    fn with_now_leaves_original_untouched() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap();
        let ctx = BillingContext::new(CustomerId::generate(), now);

        let shifted = ctx.with_now(later);
        assert_eq!(ctx.now, now);
        assert_eq!(shifted.now, later);
        assert_eq!(shifted.customer_id, ctx.customer_id);
    }

    #[test]
    fn from_update_computes_usage_scalars() {
        // Allowance 3, balance -1: 4 used, 1 over. Deduct 2 more.
        let ent = entitlement_with_balance(dec!(3), dec!(-1));
        let update = DeductionUpdate::new(ent.id, dec!(-2));
        let ctx = BillingContext::new(CustomerId::generate(), Utc::now());

        let alloc = AllocatedInvoiceContext::from_update(ctx, ent, update);
        assert_eq!(alloc.previous_usage, dec!(4));
        assert_eq!(alloc.new_usage, dec!(6));
        assert_eq!(alloc.previous_overage, dec!(1));
        assert_eq!(alloc.new_overage, dec!(3));
    }

    #[test]
    fn from_update_clamps_overage_at_zero() {
        // Allowance 5, balance 4: within allowance on both sides.
        let ent = entitlement_with_balance(dec!(5), dec!(4));
        let update = DeductionUpdate::new(ent.id, dec!(-2));
        let ctx = BillingContext::new(CustomerId::generate(), Utc::now());

        let alloc = AllocatedInvoiceContext::from_update(ctx, ent, update);
        assert_eq!(alloc.previous_overage, dec!(0));
        assert_eq!(alloc.new_overage, dec!(0));
    }

    #[test]
    fn entitlement_lookup_by_price() {
        let ent = entitlement_with_balance(dec!(3), dec!(3));
        let price_id = ent.price_id.unwrap();
        let other = EntitlementId::generate();
        let ctx = BillingContext::new(CustomerId::generate(), Utc::now()).with_entitlement(ent);

        assert!(ctx.entitlement_for_price(price_id).is_some());
        assert!(ctx.entitlement_for_price(PriceId::generate()).is_none());
        assert_ne!(ctx.entitlements[0].id, other);
    }
}
