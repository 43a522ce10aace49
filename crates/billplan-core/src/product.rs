//! Product types for billplan.
//!
//! A product groups the prices a customer subscribes to; a customer product
//! attaches a product to one customer with a lifecycle status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{CustomerId, CustomerProductId, ProductId};
use crate::price::{BillingInterval, Price, PriceKind};

/// A sellable product: a named bundle of prices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    /// Unique product ID.
    pub id: ProductId,

    /// Human-readable product name.
    pub name: String,

    /// The billable components of this product.
    pub prices: Vec<Price>,
}

impl Product {
    /// Create a product with no prices yet.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ProductId::generate(),
            name: name.into(),
            prices: Vec::new(),
        }
    }

    /// Add a price, rewriting its product reference to this product.
    #[must_use]
    pub fn with_price(mut self, mut price: Price) -> Self {
        price.product_id = self.id;
        self.prices.push(price);
        self
    }

    /// Whether any price on this product carries a non-zero amount.
    #[must_use]
    pub fn is_paid(&self) -> bool {
        self.prices.iter().any(Price::is_paid)
    }

    /// Whether any price on this product recurs.
    #[must_use]
    pub fn is_recurring(&self) -> bool {
        self.prices.iter().any(Price::is_recurring)
    }

    /// The smallest billing interval among this product's recurring prices.
    #[must_use]
    pub fn smallest_interval(&self) -> Option<BillingInterval> {
        self.prices.iter().filter_map(|p| p.interval).min()
    }

    /// Iterate the prices of one kind.
    pub fn prices_of_kind(&self, kind: PriceKind) -> impl Iterator<Item = &Price> {
        self.prices.iter().filter(move |p| p.kind == kind)
    }
}

/// Lifecycle status of a customer product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerProductStatus {
    /// Attached and billing normally.
    Active,

    /// In a trial period.
    Trialing,

    /// Payment failed; still attached pending retry.
    PastDue,

    /// Scheduled to start at a future cycle boundary.
    Scheduled,

    /// Detached; no longer billed.
    Expired,
}

impl CustomerProductStatus {
    /// Get the status name as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Trialing => "trialing",
            Self::PastDue => "past_due",
            Self::Scheduled => "scheduled",
            Self::Expired => "expired",
        }
    }

    /// Whether this status counts toward forward-looking cycle projection.
    #[must_use]
    pub const fn is_active_eligible(&self) -> bool {
        matches!(self, Self::Active | Self::Trialing | Self::PastDue)
    }
}

/// A product attached to a customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerProduct {
    /// Unique customer-product ID.
    pub id: CustomerProductId,

    /// The owning customer.
    pub customer_id: CustomerId,

    /// The attached product.
    pub product_id: ProductId,

    /// Lifecycle status.
    pub status: CustomerProductStatus,

    /// When the attachment started (or is scheduled to start).
    pub started_at: DateTime<Utc>,

    /// When the attachment was canceled, if it was.
    pub canceled_at: Option<DateTime<Utc>>,

    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

impl CustomerProduct {
    /// Create an active attachment starting at `started_at`.
    #[must_use]
    pub fn active(
        customer_id: CustomerId,
        product_id: ProductId,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CustomerProductId::generate(),
            customer_id,
            product_id,
            status: CustomerProductStatus::Active,
            started_at,
            canceled_at: None,
            created_at: started_at,
        }
    }

    /// Create an attachment scheduled to start at a future boundary.
    #[must_use]
    pub fn scheduled(
        customer_id: CustomerId,
        product_id: ProductId,
        starts_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CustomerProductId::generate(),
            customer_id,
            product_id,
            status: CustomerProductStatus::Scheduled,
            started_at: starts_at,
            canceled_at: None,
            created_at,
        }
    }
}
