//! Next-cycle projection.
//!
//! Given the set of products that results from applying a plan, the
//! projector finds the smallest billing interval among their prices (the
//! tightest-cycling paid commitment determines the projection point),
//! advances the anchor past "now", and re-prices the qualifying products at
//! that future instant.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

use billplan_core::{BillingInterval, Product, ProductId, Result};

use crate::context::BillingContext;
use crate::line_items::{
    build_line_items, line_items_total, LineItemDirection, UsagePricer,
};
use crate::plan::BillingPlan;

/// A projected upcoming cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextCycle {
    /// When the cycle starts.
    pub starts_at: DateTime<Utc>,

    /// Total of the cycle's charges.
    pub total: Decimal,
}

/// Project the charges of the next billing cycle after `plan` is applied.
///
/// Returns `None` when the billing-cycle anchor is still the sentinel
/// (there is no forward cycle yet) or when no paid, recurring,
/// active-eligible product remains.
///
/// # Errors
///
/// Returns a pricing or currency error from re-running the line item
/// generator at the projected instant.
pub fn project_next_cycle(
    ctx: &BillingContext,
    plan: &BillingPlan,
    pricer: &dyn UsagePricer,
) -> Result<Option<NextCycle>> {
    if ctx.billing_cycle_anchor.is_unset() {
        return Ok(None);
    }
    let anchor_ts = ctx.billing_cycle_anchor.resolve(ctx.now);

    let products = resulting_products(ctx, plan);
    let Some((interval, count)) = smallest_cadence(&products) else {
        return Ok(None);
    };

    let mut starts_at = anchor_ts;
    while starts_at <= ctx.now {
        starts_at = interval.advance(starts_at, count);
    }

    let shifted = ctx.with_now(starts_at);
    let mut items = Vec::new();
    for product in &products {
        items.extend(build_line_items(
            product,
            &shifted,
            LineItemDirection::Charge,
            pricer,
        )?);
    }
    let (total, _) = line_items_total(&items)?;

    debug!(
        starts_at = %starts_at,
        products = products.len(),
        total = %total,
        "projected next cycle"
    );

    Ok(Some(NextCycle { starts_at, total }))
}

/// The paid, recurring, active-eligible products that survive the plan:
/// newly inserted ones plus existing ones that are not superseded.
///
/// A product whose line items in the plan are refunds is being replaced and
/// drops out of the projection.
fn resulting_products(ctx: &BillingContext, plan: &BillingPlan) -> Vec<Product> {
    let superseded: HashSet<ProductId> = plan
        .line_items
        .iter()
        .filter(|i| i.amount < Decimal::ZERO)
        .map(|i| i.context.product_id)
        .collect();

    let mut seen: HashSet<ProductId> = HashSet::new();
    let mut products = Vec::new();

    for inserted in &plan.insert_customer_products {
        if !inserted.status.is_active_eligible() {
            continue;
        }
        if let Some(found) = ctx.find_product(inserted.product_id) {
            if seen.insert(found.product.id) {
                products.push(found.product.clone());
            }
        }
    }

    for in_play in &ctx.products {
        let product = &in_play.product;
        if !in_play.customer_product.status.is_active_eligible()
            || superseded.contains(&product.id)
        {
            continue;
        }
        if seen.insert(product.id) {
            products.push(product.clone());
        }
    }

    products
        .into_iter()
        .filter(|p| p.is_paid() && p.is_recurring())
        .collect()
}

/// The tightest (interval, count) cadence among the products' recurring
/// prices.
fn smallest_cadence(products: &[Product]) -> Option<(BillingInterval, u32)> {
    products
        .iter()
        .flat_map(|p| p.prices.iter())
        .filter_map(|price| price.interval.map(|i| (i, price.interval_count.max(1))))
        .min()
}
