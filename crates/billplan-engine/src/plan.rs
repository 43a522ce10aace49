//! Plan assembly.
//!
//! The assembler sequences the ledger and the line item generator and
//! packages their outputs into a [`BillingPlan`]. It performs no
//! computation of its own beyond sequencing: new price kinds plug in at the
//! generator, new mutation kinds at the ledger, without this module
//! changing shape.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use billplan_core::{BillingError, CustomerProduct, Price, ProductId, Result};

use crate::classify::{proration_policy, ChangeDirection};
use crate::context::{AllocatedInvoiceContext, BillingContext};
use crate::ledger::{plan_entitlement_update, EntitlementUpdate, ReplaceableMutation};
use crate::line_items::{
    build_line_items, LineItem, LineItemContext, LineItemDirection, UsagePricer,
    UsagePricingOptions,
};
use crate::period::{compute_period, PeriodFloors};

/// The provider-agnostic output of a plan computation.
///
/// Everything here is a short-lived, per-request value; applying the
/// entitlement mutations and line items transactionally is the durable
/// store's concern, outside this engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingPlan {
    /// Entitlement mutations to apply. Empty when nothing changes; never
    /// contains placeholder entries.
    pub update_customer_entitlements: Vec<EntitlementUpdate>,

    /// Monetary line items. Zero-amount items never appear here.
    pub line_items: Vec<LineItem>,

    /// Customer-product records to insert (e.g. the target of a swap).
    pub insert_customer_products: Vec<CustomerProduct>,
}

impl BillingPlan {
    /// A plan that does nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            update_customer_entitlements: Vec::new(),
            line_items: Vec::new(),
            insert_customer_products: Vec::new(),
        }
    }

    /// Whether the plan carries no mutations and no money movement.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.update_customer_entitlements.is_empty()
            && self.line_items.is_empty()
            && self.insert_customer_products.is_empty()
    }
}

/// Compute the plan for a single allocation change.
///
/// Orchestration order is fixed: the ledger first, then line items, then
/// packaging. A skip policy short-circuits to an empty plan, which is a
/// valid outcome, not an error.
///
/// # Errors
///
/// Returns [`BillingError::PriceNotFound`] when the entitlement's price is
/// missing from the context, or a pricing error from the injected pricer.
pub fn compute_plan(
    ctx: &AllocatedInvoiceContext,
    pricer: &dyn UsagePricer,
) -> Result<BillingPlan> {
    let price = resolve_entitlement_price(ctx)?;
    let direction = ChangeDirection::from_context(ctx);
    let policy = proration_policy(price, direction);

    if policy.skip_line_items {
        debug!(
            entitlement_id = %ctx.entitlement.id,
            direction = ?direction,
            "policy defers change to renewal, emitting empty plan"
        );
        return Ok(BillingPlan::empty());
    }

    let fragment = plan_entitlement_update(ctx, &policy);

    let consumed = fragment
        .as_ref()
        .map_or(Decimal::ZERO, |f| match &f.mutation {
            ReplaceableMutation::Delete(ids) => Decimal::from(ids.len()),
            ReplaceableMutation::Insert(_) => Decimal::ZERO,
        });

    let mut line_items = Vec::new();
    match direction {
        ChangeDirection::Upgrade => {
            // Seats covered by consumed credits are not re-charged.
            let added = (ctx.new_overage - ctx.previous_overage).max(Decimal::ZERO);
            let billable = (added - consumed).max(Decimal::ZERO);
            let item_ctx = delta_item_context(price, ctx, LineItemDirection::Charge);
            let options = UsagePricingOptions {
                billable_quantity: billable,
                apply_proration: policy.apply_proration,
            };
            let item = pricer.usage_line_item(&ctx.entitlement, &item_ctx, &options)?;
            push_non_zero(&mut line_items, apply_context_discounts(item, &ctx.context));
        }
        ChangeDirection::Downgrade => {
            if policy.apply_proration {
                let freed = (ctx.previous_overage - ctx.new_overage).max(Decimal::ZERO);
                let item_ctx = delta_item_context(price, ctx, LineItemDirection::Refund);
                let options = UsagePricingOptions {
                    billable_quantity: freed,
                    apply_proration: true,
                };
                let item = pricer.usage_line_item(&ctx.entitlement, &item_ctx, &options)?;
                push_non_zero(&mut line_items, apply_context_discounts(item, &ctx.context));
            }
        }
    }

    debug!(
        entitlement_id = %ctx.entitlement.id,
        direction = ?direction,
        has_fragment = fragment.is_some(),
        line_items = line_items.len(),
        "assembled allocation plan"
    );

    Ok(BillingPlan {
        update_customer_entitlements: fragment.into_iter().collect(),
        line_items,
        insert_customer_products: Vec::new(),
    })
}

/// Compute the plan for replacing one product with another.
///
/// Refund items for the superseded product always precede charge items for
/// its replacement; downstream diffing relies on that ordering.
///
/// # Errors
///
/// Returns [`BillingError::ProductNotFound`] when either product is missing
/// from the context, or a pricing error from the injected pricer.
pub fn compute_swap_plan(
    ctx: &BillingContext,
    current_product_id: ProductId,
    target_product_id: ProductId,
    pricer: &dyn UsagePricer,
) -> Result<BillingPlan> {
    let current = ctx
        .find_product(current_product_id)
        .ok_or(BillingError::ProductNotFound {
            product_id: current_product_id,
        })?;
    let target = ctx
        .find_product(target_product_id)
        .ok_or(BillingError::ProductNotFound {
            product_id: target_product_id,
        })?;

    let mut line_items = build_line_items(
        &current.product,
        ctx,
        LineItemDirection::Refund,
        pricer,
    )?;
    line_items.extend(build_line_items(
        &target.product,
        ctx,
        LineItemDirection::Charge,
        pricer,
    )?);

    debug!(
        current = %current_product_id,
        target = %target_product_id,
        line_items = line_items.len(),
        "assembled swap plan"
    );

    Ok(BillingPlan {
        update_customer_entitlements: Vec::new(),
        line_items,
        insert_customer_products: vec![target.customer_product.clone()],
    })
}

fn resolve_entitlement_price(ctx: &AllocatedInvoiceContext) -> Result<&Price> {
    let missing = BillingError::PriceNotFound {
        entitlement_id: ctx.entitlement.id,
    };
    let price_id = ctx.entitlement.price_id.ok_or(missing)?;
    ctx.context
        .products
        .iter()
        .flat_map(|p| p.product.prices.iter())
        .find(|p| p.id == price_id)
        .ok_or(BillingError::PriceNotFound {
            entitlement_id: ctx.entitlement.id,
        })
}

fn delta_item_context(
    price: &Price,
    ctx: &AllocatedInvoiceContext,
    direction: LineItemDirection,
) -> LineItemContext {
    let base = &ctx.context;
    LineItemContext {
        price: price.clone(),
        product_id: price.product_id,
        feature_id: Some(ctx.entitlement.feature_id),
        direction,
        timing: price.timing,
        period: compute_period(
            base.billing_cycle_anchor,
            price.interval,
            price.interval_count,
            base.now,
            PeriodFloors::from_context(base),
        ),
        currency: price.currency.clone(),
        now: base.now,
    }
}

fn apply_context_discounts(mut item: LineItem, ctx: &BillingContext) -> LineItem {
    item.amount =
        crate::line_items::apply_discounts(item.amount_before_discounts, &ctx.provider.discounts);
    item
}

fn push_non_zero(items: &mut Vec<LineItem>, item: LineItem) {
    if !item.is_zero() {
        items.push(item);
    }
}
