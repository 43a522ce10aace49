//! Deterministic billing-plan computation for billplan.
//!
//! Given an immutable snapshot of a customer's billing state and a
//! requested change (an upgrade, a downgrade, a seat change, or a
//! usage-driven invoice), this crate computes which entitlement records
//! must change, which monetary line items result, and a provider-agnostic
//! action plan for the adapter that executes it. It encodes the proration,
//! seat-replacement, period-alignment, and cycle-projection rules that are
//! easy to get subtly wrong.
//!
//! # Architecture
//!
//! - [`context`]: the immutable [`BillingContext`] snapshot and its
//!   [`AllocatedInvoiceContext`] extension for single-entitlement changes
//! - [`period`]: concrete `[start, end)` billing periods with floor clamps
//! - [`classify`]: upgrade/downgrade direction and proration policy lookup
//! - [`ledger`]: replaceable seat-credit consumption and issuance
//! - [`line_items`]: charge/refund generation and the in-arrears pass
//! - [`plan`]: assembly into a [`BillingPlan`]
//! - [`provider`]: the discriminated [`ProviderActionPlan`]
//! - [`projection`]: forward-looking next-cycle totals
//! - [`preview`]: the flattened customer-facing preview
//!
//! # Purity
//!
//! Every function here is synchronous and side-effect-free: a pure function
//! of its context plus the injected [`UsagePricer`]. All I/O happens before
//! (context assembly) and after (persistence, provider calls) this crate
//! runs. Callers must serialize concurrent plan computations per
//! entitlement; two computations from the same stale snapshot can plan
//! overlapping credit deletions, and nothing inside the engine prevents
//! that.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod classify;
pub mod context;
pub mod ledger;
pub mod line_items;
pub mod period;
pub mod plan;
pub mod preview;
pub mod projection;
pub mod provider;

pub use classify::{proration_policy, ChangeDirection, ProrationPolicy};
pub use context::{
    AllocatedInvoiceContext, BillingContext, BillingModelVersion, ContextProduct, CycleAnchor,
    Discount, ProviderRefs, ProviderSubscription,
};
pub use ledger::{plan_entitlement_update, EntitlementUpdate, ReplaceableMutation};
pub use line_items::{
    apply_discounts, build_arrear_items, build_line_items, line_items_total, proration_factor,
    LineItem, LineItemContext, LineItemDirection, PerUnitPricer, UsagePricer, UsagePricingOptions,
};
pub use period::{compute_period, BillingPeriod, PeriodFloors};
pub use plan::{compute_plan, compute_swap_plan, BillingPlan};
pub use preview::{build_preview, InvoicePreview, PreviewLineItem};
pub use projection::{project_next_cycle, NextCycle};
pub use provider::{
    InvoiceAction, InvoiceItemsAction, ProviderActionPlan, ProviderLineItem, ScheduleAction,
    SubscriptionAction, SubscriptionItem,
};
