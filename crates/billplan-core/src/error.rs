//! Error types for billplan.

use crate::ids::{CustomerId, EntitlementId, IdError, PriceId, ProductId};

/// Result type for billplan operations.
pub type Result<T> = std::result::Result<T, BillingError>;

/// Errors that can occur while computing a billing plan.
///
/// These are the fatal missing-context conditions of the engine. Policy
/// no-ops (a skip policy, a downgrade that creates no replaceables) are
/// represented as empty or `None` results, never as errors.
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// No provider-side subscription is attached to the context.
    #[error("no provider subscription for customer {customer_id}")]
    SubscriptionNotFound {
        /// The customer whose subscription was expected.
        customer_id: CustomerId,
    },

    /// No price could be resolved for an entitlement being changed.
    #[error("no price found for entitlement {entitlement_id}")]
    PriceNotFound {
        /// The entitlement whose price was expected.
        entitlement_id: EntitlementId,
    },

    /// No entitlement could be resolved for a consumable price.
    ///
    /// A consumable price without an entitlement means recorded usage would
    /// go unbilled, so the in-arrears pass refuses to continue.
    #[error("no entitlement found for consumable price {price_id}")]
    EntitlementNotFound {
        /// The consumable price with no backing entitlement.
        price_id: PriceId,
    },

    /// A product referenced by the plan is missing from the context.
    #[error("product {product_id} not present in billing context")]
    ProductNotFound {
        /// The missing product.
        product_id: ProductId,
    },

    /// Line items with mixed currencies cannot be combined into one total.
    #[error("currency mismatch: expected {expected}, found {found}")]
    CurrencyMismatch {
        /// The currency of the first line item seen.
        expected: String,
        /// The conflicting currency.
        found: String,
    },

    /// A monetary computation overflowed the decimal range.
    #[error("amount overflow while computing {operation}")]
    AmountOverflow {
        /// The computation that overflowed.
        operation: &'static str,
    },

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}
