//! Customer-facing invoice preview.
//!
//! Answers "what would this cost" queries: a flattened view of a plan's
//! line items plus the projected next cycle, derived purely from the plan.
//! Nothing is applied.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use billplan_core::{Currency, Result};

use crate::context::BillingContext;
use crate::line_items::{line_items_total, LineItem, UsagePricer};
use crate::plan::BillingPlan;
use crate::projection::{project_next_cycle, NextCycle};

/// One flattened preview line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewLineItem {
    /// Human-readable description.
    pub description: String,

    /// Final amount; negative for credits.
    pub amount: Decimal,
}

impl From<&LineItem> for PreviewLineItem {
    fn from(item: &LineItem) -> Self {
        Self {
            description: item.description.clone(),
            amount: item.amount,
        }
    }
}

/// The flattened preview returned to customers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoicePreview {
    /// The plan's line items, flattened.
    pub line_items: Vec<PreviewLineItem>,

    /// Sum of the line items.
    pub total: Decimal,

    /// Currency of the amounts.
    pub currency: Currency,

    /// The projected upcoming cycle, when one exists.
    pub next_cycle: Option<NextCycle>,
}

/// Build the preview for a computed plan.
///
/// # Errors
///
/// Returns a currency-mismatch error when the plan's items disagree on
/// currency, or a pricing error from the next-cycle projection.
pub fn build_preview(
    ctx: &BillingContext,
    plan: &BillingPlan,
    pricer: &dyn UsagePricer,
) -> Result<InvoicePreview> {
    let (total, currency) = line_items_total(&plan.line_items)?;
    let next_cycle = project_next_cycle(ctx, plan, pricer)?;

    Ok(InvoicePreview {
        line_items: plan.line_items.iter().map(PreviewLineItem::from).collect(),
        total,
        currency,
        next_cycle,
    })
}
