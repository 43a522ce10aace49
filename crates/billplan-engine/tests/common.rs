//! Common test fixtures for billplan-engine integration tests.

#![allow(dead_code)] // Some fixtures are used by different test files

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use billplan_core::{
    BillingInterval, CustomerEntitlement, CustomerId, FeatureId, Price, Product, ProductId,
    Replaceable, Result,
};
use billplan_engine::{
    BillingContext, CycleAnchor, LineItem, LineItemContext, ProviderRefs, ProviderSubscription,
    UsagePricer, UsagePricingOptions,
};

/// Shorthand for a UTC midnight timestamp.
pub fn ts(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

/// A monthly per-seat price: $10/seat beyond 3 included, prorated upgrades,
/// seat credits on downgrade.
pub fn seat_price(product_id: ProductId, feature_id: FeatureId) -> Price {
    Price::allocation(product_id, feature_id, "Seats", dec!(10), dec!(3), BillingInterval::Month)
}

/// A workspace product: $50/month base plus the seat price.
pub fn workspace(feature_id: FeatureId) -> Product {
    let placeholder = ProductId::generate();
    Product::new("Workspace")
        .with_price(Price::fixed(placeholder, "Base plan", dec!(50), BillingInterval::Month))
        .with_price(seat_price(placeholder, feature_id))
}

/// A seat entitlement for the product's allocation price, with `credits`
/// replaceables attached.
pub fn seat_entitlement(
    customer_id: CustomerId,
    product: &Product,
    balance: Decimal,
    credits: usize,
) -> CustomerEntitlement {
    let price = product
        .prices
        .iter()
        .find(|p| p.is_allocation())
        .expect("product has a seat price");
    let mut ent = CustomerEntitlement::new(
        customer_id,
        product.id,
        price.feature_id.unwrap(),
        Some(price.id),
        price.included_units,
        ts(2025, 3, 1),
    );
    ent.balance = balance;
    for _ in 0..credits {
        ent.replaceables.push(Replaceable::issued(ent.id, ts(2025, 3, 1)));
    }
    ent
}

/// A context with a committed monthly anchor (Mar 1) and a provider
/// subscription started on the anchor.
pub fn anchored_context(customer_id: CustomerId, now: DateTime<Utc>) -> BillingContext {
    BillingContext::new(customer_id, now)
        .with_anchor(CycleAnchor::At(ts(2025, 3, 1)))
        .with_provider(ProviderRefs {
            customer: Some("cus_test".to_string()),
            subscription: Some(ProviderSubscription {
                reference: "sub_test".to_string(),
                started_at: ts(2025, 3, 1),
                trial_ends_at: None,
            }),
            discounts: Vec::new(),
            payment_method: Some("pm_test".to_string()),
        })
}

/// A pricer stub that bills a constant amount per call, regardless of the
/// real per-unit math. Used to verify the engine treats pricing as an
/// injected black box.
pub struct FlatPricer {
    pub amount: Decimal,
}

impl UsagePricer for FlatPricer {
    fn usage_line_item(
        &self,
        _entitlement: &CustomerEntitlement,
        ctx: &LineItemContext,
        options: &UsagePricingOptions,
    ) -> Result<LineItem> {
        let amount = if options.billable_quantity.is_zero() {
            Decimal::ZERO
        } else {
            self.amount
        };
        Ok(LineItem {
            description: format!("stubbed {}", ctx.price.description),
            amount_before_discounts: amount,
            amount,
            charge_immediately: true,
            context: ctx.clone(),
        })
    }
}
