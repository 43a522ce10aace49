//! Seat upgrade scenarios.

mod common;

use rust_decimal_macros::dec;

use billplan_core::{
    BillingError, CustomerId, CustomerProduct, DeductionUpdate, FeatureId, OnDecrease, OnIncrease,
};
use billplan_engine::{
    compute_plan, proration_factor, AllocatedInvoiceContext, PerUnitPricer, ReplaceableMutation,
};

use common::{anchored_context, seat_entitlement, ts, workspace, FlatPricer};

#[test]
fn seat_upgrade_consumes_credit() {
    let customer_id = CustomerId::generate();
    let product = workspace(FeatureId::generate());
    // previous_overage = 0, two credits available.
    let ent = seat_entitlement(customer_id, &product, dec!(0), 2);
    let update = DeductionUpdate::new(ent.id, dec!(-1));

    let ctx = anchored_context(customer_id, ts(2025, 3, 21)).with_product(
        product.clone(),
        CustomerProduct::active(customer_id, product.id, ts(2025, 3, 1)),
    );
    let alloc = AllocatedInvoiceContext::from_update(ctx, ent, update);

    let plan = compute_plan(&alloc, &PerUnitPricer).unwrap();

    assert_eq!(plan.update_customer_entitlements.len(), 1);
    let fragment = &plan.update_customer_entitlements[0];
    assert_eq!(fragment.balance_change, dec!(-1));
    match &fragment.mutation {
        ReplaceableMutation::Delete(ids) => assert_eq!(ids.len(), 1),
        ReplaceableMutation::Insert(_) => panic!("upgrade must delete credits"),
    }
    // The added seat was covered by a credit: no charge survives filtering.
    assert!(plan.line_items.is_empty());
}

#[test]
fn upgrade_beyond_credits_charges_prorated_remainder() {
    let customer_id = CustomerId::generate();
    let product = workspace(FeatureId::generate());
    let ent = seat_entitlement(customer_id, &product, dec!(0), 0);
    let update = DeductionUpdate::new(ent.id, dec!(-2));

    let now = ts(2025, 3, 21);
    let ctx = anchored_context(customer_id, now).with_product(
        product.clone(),
        CustomerProduct::active(customer_id, product.id, ts(2025, 3, 1)),
    );
    let alloc = AllocatedInvoiceContext::from_update(ctx, ent, update);

    let plan = compute_plan(&alloc, &PerUnitPricer).unwrap();

    assert_eq!(plan.line_items.len(), 1);
    let item = &plan.line_items[0];
    let period = item.context.period.expect("recurring price has a period");
    let expected = dec!(10) * dec!(2) * proration_factor(period, now);
    assert_eq!(item.amount, expected);
    assert!(item.amount > dec!(0));
    assert!(item.charge_immediately);

    // No credits existed, so nothing is deleted.
    assert!(plan.update_customer_entitlements.is_empty());
}

#[test]
fn bill_immediately_charges_full_amount() {
    let customer_id = CustomerId::generate();
    let mut product = workspace(FeatureId::generate());
    for price in &mut product.prices {
        if price.is_allocation() {
            *price = price
                .clone()
                .with_proration(OnIncrease::BillImmediately, OnDecrease::RetainSeatCredit);
        }
    }
    let ent = seat_entitlement(customer_id, &product, dec!(0), 0);
    let update = DeductionUpdate::new(ent.id, dec!(-2));

    let ctx = anchored_context(customer_id, ts(2025, 3, 21)).with_product(
        product.clone(),
        CustomerProduct::active(customer_id, product.id, ts(2025, 3, 1)),
    );
    let alloc = AllocatedInvoiceContext::from_update(ctx, ent, update);

    let plan = compute_plan(&alloc, &PerUnitPricer).unwrap();
    assert_eq!(plan.line_items.len(), 1);
    assert_eq!(plan.line_items[0].amount, dec!(20));
}

#[test]
fn pricing_is_an_injected_black_box() {
    let customer_id = CustomerId::generate();
    let product = workspace(FeatureId::generate());
    let ent = seat_entitlement(customer_id, &product, dec!(0), 0);
    let update = DeductionUpdate::new(ent.id, dec!(-1));

    let ctx = anchored_context(customer_id, ts(2025, 3, 21)).with_product(
        product.clone(),
        CustomerProduct::active(customer_id, product.id, ts(2025, 3, 1)),
    );
    let alloc = AllocatedInvoiceContext::from_update(ctx, ent, update);

    let stub = FlatPricer { amount: dec!(123) };
    let plan = compute_plan(&alloc, &stub).unwrap();

    assert_eq!(plan.line_items.len(), 1);
    assert_eq!(plan.line_items[0].amount, dec!(123));
}

#[test]
fn missing_price_is_a_fatal_error() {
    let customer_id = CustomerId::generate();
    let product = workspace(FeatureId::generate());
    let mut ent = seat_entitlement(customer_id, &product, dec!(0), 0);
    ent.price_id = None;
    let update = DeductionUpdate::new(ent.id, dec!(-1));

    let ctx = anchored_context(customer_id, ts(2025, 3, 21)).with_product(
        product.clone(),
        CustomerProduct::active(customer_id, product.id, ts(2025, 3, 1)),
    );
    let alloc = AllocatedInvoiceContext::from_update(ctx, ent, update);

    let err = compute_plan(&alloc, &PerUnitPricer).unwrap_err();
    assert!(matches!(err, BillingError::PriceNotFound { .. }));
}
