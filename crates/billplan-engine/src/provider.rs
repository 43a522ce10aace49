//! Provider-facing action plan.
//!
//! The adapter that talks to the payment provider consumes one
//! [`ProviderActionPlan`]: a set of discriminated actions, exactly one per
//! action kind. Every enum carries an explicit `None` variant, so adapters
//! match exhaustively and never have to disambiguate intent from optional
//! fields.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use billplan_core::{
    BillingTiming, Currency, CustomerProductStatus, PriceId, PriceKind, ProductId,
};

use crate::context::BillingContext;
use crate::line_items::LineItem;
use crate::plan::BillingPlan;

/// A line item flattened for the provider boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderLineItem {
    /// Human-readable description.
    pub description: String,

    /// Final amount; negative for credits.
    pub amount: Decimal,

    /// Currency of the amount.
    pub currency: Currency,

    /// Engine-side references for reconciliation.
    pub metadata: serde_json::Value,
}

impl ProviderLineItem {
    fn from_line_item(item: &LineItem) -> Self {
        Self {
            description: item.description.clone(),
            amount: item.amount,
            currency: item.context.currency.clone(),
            metadata: serde_json::json!({
                "price_id": item.context.price.id,
                "product_id": item.context.product_id,
                "feature_id": item.context.feature_id,
                "direction": item.context.direction,
            }),
        }
    }
}

/// One recurring item of the provider subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionItem {
    /// The engine-side price to map onto the provider price.
    pub price_id: PriceId,

    /// Units of the price.
    pub quantity: Decimal,
}

/// What to do with the provider subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SubscriptionAction {
    /// Create a subscription with these items.
    Create {
        /// Recurring items for the new subscription.
        items: Vec<SubscriptionItem>,
    },

    /// Update the referenced subscription to these items.
    Update {
        /// Provider-side subscription reference.
        subscription: String,
        /// The full set of recurring items after the change.
        items: Vec<SubscriptionItem>,
    },

    /// Cancel the referenced subscription.
    Cancel {
        /// Provider-side subscription reference.
        subscription: String,
        /// Whether to cancel at the period boundary instead of immediately.
        at_period_end: bool,
    },

    /// Leave the subscription untouched.
    None,
}

/// What to invoice immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum InvoiceAction {
    /// Create an invoice for these items and collect it now.
    ChargeNow {
        /// Items to place on the invoice.
        line_items: Vec<ProviderLineItem>,
        /// Payment method to collect with, when one is on file.
        payment_method: Option<String>,
    },

    /// No immediate invoice.
    None,
}

/// What to defer onto the next invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum InvoiceItemsAction {
    /// Register pending items for the next invoice.
    AddPending {
        /// Items to defer.
        items: Vec<ProviderLineItem>,
    },

    /// Nothing to defer.
    None,
}

/// What to schedule for a future cycle boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScheduleAction {
    /// Schedule a product to start at a future instant.
    Create {
        /// When the scheduled product starts.
        starts_at: DateTime<Utc>,
        /// The product starting then.
        product_id: ProductId,
    },

    /// Nothing scheduled.
    None,
}

/// The discriminated action set handed to the provider adapter.
///
/// Exactly one action per kind; a kind with nothing to do carries its
/// `None` variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderActionPlan {
    /// Subscription mutation.
    pub subscription: SubscriptionAction,

    /// Immediate invoice.
    pub invoice: InvoiceAction,

    /// Deferred invoice items.
    pub invoice_items: InvoiceItemsAction,

    /// Future-cycle schedule.
    pub schedule: ScheduleAction,
}

impl ProviderActionPlan {
    /// Translate a billing plan into provider actions.
    ///
    /// Immediately-billable line items become one `ChargeNow` invoice;
    /// deferred items become pending invoice items; inserted recurring
    /// products update (or create) the subscription; a `Scheduled` insert
    /// becomes a schedule action.
    #[must_use]
    pub fn from_plan(ctx: &BillingContext, plan: &BillingPlan) -> Self {
        let (immediate, deferred): (Vec<&LineItem>, Vec<&LineItem>) =
            plan.line_items.iter().partition(|i| i.charge_immediately);

        let invoice = if immediate.is_empty() {
            InvoiceAction::None
        } else {
            InvoiceAction::ChargeNow {
                line_items: immediate
                    .iter()
                    .map(|i| ProviderLineItem::from_line_item(i))
                    .collect(),
                payment_method: ctx.provider.payment_method.clone(),
            }
        };

        let invoice_items = if deferred.is_empty() {
            InvoiceItemsAction::None
        } else {
            InvoiceItemsAction::AddPending {
                items: deferred
                    .iter()
                    .map(|i| ProviderLineItem::from_line_item(i))
                    .collect(),
            }
        };

        let items = subscription_items(ctx, plan);
        let subscription = match (&ctx.provider.subscription, items.is_empty()) {
            (Some(sub), false) => SubscriptionAction::Update {
                subscription: sub.reference.clone(),
                items,
            },
            (None, false) => SubscriptionAction::Create { items },
            // A swap that leaves no recurring paid item winds the
            // subscription down at the period boundary.
            (Some(sub), true) if !plan.insert_customer_products.is_empty() => {
                SubscriptionAction::Cancel {
                    subscription: sub.reference.clone(),
                    at_period_end: true,
                }
            }
            _ => SubscriptionAction::None,
        };

        let schedule = plan
            .insert_customer_products
            .iter()
            .find(|cp| cp.status == CustomerProductStatus::Scheduled)
            .map_or(ScheduleAction::None, |cp| ScheduleAction::Create {
                starts_at: cp.started_at,
                product_id: cp.product_id,
            });

        Self {
            subscription,
            invoice,
            invoice_items,
            schedule,
        }
    }
}

/// The recurring in-advance items the subscription should carry after the
/// plan is applied.
fn subscription_items(ctx: &BillingContext, plan: &BillingPlan) -> Vec<SubscriptionItem> {
    plan.insert_customer_products
        .iter()
        .filter(|cp| cp.status != CustomerProductStatus::Scheduled)
        .filter_map(|cp| ctx.find_product(cp.product_id))
        .flat_map(|p| p.product.prices.iter())
        .filter(|price| {
            price.is_paid()
                && price.is_recurring()
                && price.timing == BillingTiming::InAdvance
                && price.kind != PriceKind::Consumable
        })
        .map(|price| SubscriptionItem {
            price_id: price.id,
            quantity: price
                .feature_id
                .and_then(|f| ctx.requested_quantity(f))
                .unwrap_or(price.quantity),
        })
        .collect()
}
