//! Line item generation.
//!
//! For each priced component of a product this module produces charge or
//! refund line items. Fixed prices bill `unit_amount x quantity`
//! independent of usage. Allocation prices route through the
//! entitlement-aware path and delegate per-unit math to the injected
//! [`UsagePricer`]. Consumable prices are excluded from the charge/refund
//! pass and billed by the dedicated in-arrears pass, which refuses to run
//! without a resolved entitlement: an unbilled consumable is a correctness
//! bug, not a recoverable condition.
//!
//! Every returned list is filtered of zero-amount items; a no-op charge
//! never reaches a plan.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use billplan_core::{
    BillingError, BillingTiming, Currency, CustomerEntitlement, FeatureId, Price, PriceKind,
    Product, ProductId, Result,
};

use crate::context::{BillingContext, Discount};
use crate::period::{compute_period, BillingPeriod, PeriodFloors};

/// Whether a line item charges the customer or credits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineItemDirection {
    /// Cost of the new entitlement or product taking effect.
    Charge,

    /// Credit for the old entitlement or product being replaced.
    Refund,
}

/// The pricing context a line item was computed under.
///
/// Carried on every line item as a back-reference for provider metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItemContext {
    /// The price being billed.
    pub price: Price,

    /// The product the price belongs to.
    pub product_id: ProductId,

    /// The feature the price covers, populated from the resolved
    /// entitlement where one exists.
    pub feature_id: Option<FeatureId>,

    /// Charge or refund.
    pub direction: LineItemDirection,

    /// When the price is collected relative to its period.
    pub timing: BillingTiming,

    /// The billing period, or `None` for one-off prices.
    pub period: Option<BillingPeriod>,

    /// Currency of the amounts.
    pub currency: Currency,

    /// The instant used for period math.
    pub now: DateTime<Utc>,
}

/// A single monetary line of a billing plan.
///
/// Refund amounts are negative; plan totals are plain sums.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    /// Human-readable description.
    pub description: String,

    /// Amount before customer discounts.
    pub amount_before_discounts: Decimal,

    /// Final amount after discounts.
    pub amount: Decimal,

    /// Whether the item is billed now, as opposed to being deferred to the
    /// next invoice.
    pub charge_immediately: bool,

    /// The context the item was computed under.
    pub context: LineItemContext,
}

impl LineItem {
    /// Whether the final amount is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }
}

/// Options handed to the pricing utility for one usage line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsagePricingOptions {
    /// Units to bill, after allowance and replaceable credits are netted
    /// out by the caller.
    pub billable_quantity: Decimal,

    /// Whether to prorate over the remainder of the context period.
    pub apply_proration: bool,
}

/// The external pricing utility, injected at the engine boundary.
///
/// The engine decides when to call it and with what direction, period, and
/// billable quantity; the per-unit math itself is the implementor's
/// concern. Tests substitute stubs freely.
pub trait UsagePricer {
    /// Compute the line item for usage of `entitlement` under the given
    /// context and options.
    ///
    /// # Errors
    ///
    /// Returns an error if the amount computation overflows.
    fn usage_line_item(
        &self,
        entitlement: &CustomerEntitlement,
        ctx: &LineItemContext,
        options: &UsagePricingOptions,
    ) -> Result<LineItem>;
}

/// Stock pricer: bills `unit_amount` per unit, prorated by the remaining
/// share of the period when asked to.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerUnitPricer;

impl UsagePricer for PerUnitPricer {
    fn usage_line_item(
        &self,
        _entitlement: &CustomerEntitlement,
        ctx: &LineItemContext,
        options: &UsagePricingOptions,
    ) -> Result<LineItem> {
        let base = ctx
            .price
            .unit_amount
            .checked_mul(options.billable_quantity)
            .ok_or(BillingError::AmountOverflow {
                operation: "per-unit usage amount",
            })?;

        let factor = if options.apply_proration {
            ctx.period.map_or(Decimal::ONE, |p| proration_factor(p, ctx.now))
        } else {
            Decimal::ONE
        };
        let amount = base
            .checked_mul(factor)
            .ok_or(BillingError::AmountOverflow {
                operation: "prorated usage amount",
            })?;

        let description = match ctx.direction {
            LineItemDirection::Charge => ctx.price.description.clone(),
            LineItemDirection::Refund => format!("Unused {}", ctx.price.description),
        };

        Ok(signed_item(description, amount, ctx.clone()))
    }
}

/// Share of the period remaining at `at`, in `[0, 1]`.
#[must_use]
pub fn proration_factor(period: BillingPeriod, at: DateTime<Utc>) -> Decimal {
    let total = period.total_seconds();
    if total <= 0 {
        return Decimal::ZERO;
    }
    Decimal::from(period.remaining_seconds(at)) / Decimal::from(total)
}

/// Apply the context discounts to a positive amount.
///
/// Percentage discounts apply first, then flat amounts; the result never
/// drops below zero. Refund (negative) amounts pass through untouched.
#[must_use]
pub fn apply_discounts(amount: Decimal, discounts: &[Discount]) -> Decimal {
    if amount <= Decimal::ZERO {
        return amount;
    }
    let mut remaining = amount;
    for discount in discounts {
        if let Some(percent) = discount.percent_off {
            remaining -= remaining * percent / Decimal::ONE_HUNDRED;
        }
        if let Some(flat) = discount.amount_off {
            remaining -= flat;
        }
    }
    remaining.max(Decimal::ZERO)
}

/// Build the charge or refund line items for a product's non-consumable
/// prices.
///
/// Consumable prices are excluded here; see [`build_arrear_items`].
///
/// # Errors
///
/// Returns an error if the pricing utility fails.
pub fn build_line_items(
    product: &Product,
    ctx: &BillingContext,
    direction: LineItemDirection,
    pricer: &dyn UsagePricer,
) -> Result<Vec<LineItem>> {
    let floors = PeriodFloors::from_context(ctx);
    let mut items = Vec::new();

    for price in &product.prices {
        match price.kind {
            // Billed by the dedicated in-arrears pass.
            PriceKind::Consumable => {}
            PriceKind::Fixed => {
                let item_ctx = line_item_context(price, product.id, None, direction, ctx, floors);
                let amount = price.unit_amount * price.quantity;
                let description = match direction {
                    LineItemDirection::Charge => price.description.clone(),
                    LineItemDirection::Refund => format!("Unused {}", price.description),
                };
                items.push(discounted(
                    signed_item(description, amount, item_ctx),
                    &ctx.provider.discounts,
                ));
            }
            PriceKind::Allocation => {
                let entitlement = price
                    .feature_id
                    .and_then(|f| {
                        ctx.entitlement_for_price(price.id)
                            .or_else(|| ctx.entitlement_for_feature(f))
                    });
                let feature_id = entitlement.map(|e| e.feature_id).or(price.feature_id);
                let item_ctx =
                    line_item_context(price, product.id, feature_id, direction, ctx, floors);

                let quantity = feature_id
                    .and_then(|f| ctx.requested_quantity(f))
                    .or_else(|| entitlement.map(CustomerEntitlement::usage))
                    .unwrap_or(price.included_units);
                let billable = (quantity - price.included_units).max(Decimal::ZERO);
                let options = UsagePricingOptions {
                    billable_quantity: billable,
                    apply_proration: false,
                };

                let item = match entitlement {
                    Some(ent) => pricer.usage_line_item(ent, &item_ctx, &options)?,
                    // No entitlement yet (fresh purchase): price the
                    // requested units directly.
                    None => {
                        let amount = price.unit_amount * billable;
                        signed_item(price.description.clone(), amount, item_ctx)
                    }
                };
                items.push(discounted(item, &ctx.provider.discounts));
            }
        }
    }

    Ok(drop_zero_items(items))
}

/// Bill recorded usage for a product's consumable prices at the end of the
/// relevant period.
///
/// # Errors
///
/// Returns [`BillingError::EntitlementNotFound`] when a consumable price
/// has no backing entitlement; skipping it would silently drop billable
/// usage.
pub fn build_arrear_items(
    product: &Product,
    ctx: &BillingContext,
    pricer: &dyn UsagePricer,
) -> Result<Vec<LineItem>> {
    let floors = PeriodFloors::from_context(ctx);
    let mut items = Vec::new();

    for price in product.prices_of_kind(PriceKind::Consumable) {
        let entitlement = ctx
            .entitlement_for_price(price.id)
            .or_else(|| price.feature_id.and_then(|f| ctx.entitlement_for_feature(f)))
            .ok_or(BillingError::EntitlementNotFound { price_id: price.id })?;

        let item_ctx = line_item_context(
            price,
            product.id,
            Some(entitlement.feature_id),
            LineItemDirection::Charge,
            ctx,
            floors,
        );
        let billable = (entitlement.usage() - price.included_units).max(Decimal::ZERO);
        let options = UsagePricingOptions {
            billable_quantity: billable,
            apply_proration: false,
        };

        let item = pricer.usage_line_item(entitlement, &item_ctx, &options)?;
        items.push(discounted(item, &ctx.provider.discounts));
    }

    Ok(drop_zero_items(items))
}

/// Total of a line-item list, verifying the currencies agree.
///
/// # Errors
///
/// Returns [`BillingError::CurrencyMismatch`] when items carry different
/// currencies.
pub fn line_items_total(items: &[LineItem]) -> Result<(Decimal, Currency)> {
    let mut total = Decimal::ZERO;
    let mut currency: Option<Currency> = None;

    for item in items {
        match &currency {
            None => currency = Some(item.context.currency.clone()),
            Some(expected) if *expected != item.context.currency => {
                return Err(BillingError::CurrencyMismatch {
                    expected: expected.as_str().to_string(),
                    found: item.context.currency.as_str().to_string(),
                });
            }
            Some(_) => {}
        }
        total += item.amount;
    }

    Ok((total, currency.unwrap_or_default()))
}

fn line_item_context(
    price: &Price,
    product_id: ProductId,
    feature_id: Option<FeatureId>,
    direction: LineItemDirection,
    ctx: &BillingContext,
    floors: PeriodFloors,
) -> LineItemContext {
    LineItemContext {
        price: price.clone(),
        product_id,
        feature_id,
        direction,
        timing: price.timing,
        period: compute_period(
            ctx.billing_cycle_anchor,
            price.interval,
            price.interval_count,
            ctx.now,
            floors,
        ),
        currency: price.currency.clone(),
        now: ctx.now,
    }
}

/// Build a line item with the sign implied by its direction.
fn signed_item(description: String, amount: Decimal, context: LineItemContext) -> LineItem {
    let signed = match context.direction {
        LineItemDirection::Charge => amount,
        LineItemDirection::Refund => -amount,
    };
    LineItem {
        description,
        amount_before_discounts: signed,
        amount: signed,
        charge_immediately: matches!(context.timing, BillingTiming::InAdvance),
        context,
    }
}

fn discounted(mut item: LineItem, discounts: &[Discount]) -> LineItem {
    item.amount = apply_discounts(item.amount_before_discounts, discounts);
    item
}

fn drop_zero_items(items: Vec<LineItem>) -> Vec<LineItem> {
    let before = items.len();
    let items: Vec<LineItem> = items.into_iter().filter(|i| !i.is_zero()).collect();
    if items.len() < before {
        debug!(dropped = before - items.len(), "filtered zero-amount line items");
    }
    items
}
