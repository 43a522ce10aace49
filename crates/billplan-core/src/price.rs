//! Price types for billplan.
//!
//! A price is one billable component of a product: a flat recurring fee, a
//! per-seat allocation, or a metered consumable billed in arrears. Prices
//! also carry the proration behavior applied when their usage changes
//! mid-cycle.

use chrono::{DateTime, Duration, Months, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{FeatureId, PriceId, ProductId};

/// An ISO-4217 currency code, lowercase (e.g. "usd").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    /// Create a currency from a code. The code is lowercased.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().to_lowercase())
    }

    /// US dollars.
    #[must_use]
    pub fn usd() -> Self {
        Self("usd".to_string())
    }

    /// Get the currency code as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::usd()
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Recurring billing interval for a price.
///
/// Variants are ordered shortest-first so that `Ord` picks the tightest
/// cycle when projecting the next invoice across several prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingInterval {
    /// Every week.
    Week,
    /// Every calendar month.
    Month,
    /// Every three calendar months.
    Quarter,
    /// Every calendar year.
    Year,
}

impl BillingInterval {
    /// Get the interval name as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Week => "week",
            Self::Month => "month",
            Self::Quarter => "quarter",
            Self::Year => "year",
        }
    }

    /// Advance a timestamp by `count` intervals.
    ///
    /// Month-based intervals use calendar arithmetic, so anchors near the
    /// end of a month land on the last valid day of shorter months.
    #[must_use]
    pub fn advance(&self, from: DateTime<Utc>, count: u32) -> DateTime<Utc> {
        match self {
            Self::Week => from + Duration::weeks(i64::from(count)),
            Self::Month => from + Months::new(count),
            Self::Quarter => from + Months::new(3 * count),
            Self::Year => from + Months::new(12 * count),
        }
    }

    /// Step a timestamp back by `count` intervals.
    #[must_use]
    pub fn retreat(&self, from: DateTime<Utc>, count: u32) -> DateTime<Utc> {
        match self {
            Self::Week => from - Duration::weeks(i64::from(count)),
            Self::Month => from - Months::new(count),
            Self::Quarter => from - Months::new(3 * count),
            Self::Year => from - Months::new(12 * count),
        }
    }
}

/// When a price is collected relative to its billing period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingTiming {
    /// Billed at the start of the period it covers.
    InAdvance,
    /// Billed after the period, for usage recorded within it.
    InArrear,
}

/// What kind of billable component a price is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceKind {
    /// A flat fee, independent of usage.
    Fixed,
    /// A per-unit fee for an allocation that persists across the cycle
    /// (e.g. seats).
    Allocation,
    /// A per-unit fee for metered usage, billed in arrears.
    Consumable,
}

impl PriceKind {
    /// Get the kind name as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Allocation => "allocation",
            Self::Consumable => "consumable",
        }
    }
}

/// Configured behavior when a price's allocation or usage increases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnIncrease {
    /// Charge the full per-unit amount immediately, without proration.
    BillImmediately,
    /// Charge a prorated amount for the remainder of the period.
    ProrateImmediately,
    /// No immediate effect; the increase is billed at the next renewal.
    BillNextCycle,
}

/// Configured behavior when a price's allocation or usage decreases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDecrease {
    /// Refund a prorated amount for the remainder of the period.
    ProrateImmediately,
    /// No refund; released seats become replaceable credits that expire at
    /// the next cycle boundary.
    RetainSeatCredit,
    /// No immediate effect; the decrease applies at the next renewal.
    NoImmediateEffect,
}

/// One billable component of a product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Price {
    /// Unique price ID.
    pub id: PriceId,

    /// The product this price belongs to.
    pub product_id: ProductId,

    /// The feature this price meters or allocates, if any.
    /// Fixed prices have no feature.
    pub feature_id: Option<FeatureId>,

    /// Human-readable description used on line items.
    pub description: String,

    /// Amount per unit (or the flat amount for fixed prices).
    pub unit_amount: Decimal,

    /// Currency of `unit_amount`.
    pub currency: Currency,

    /// Quantity multiplier for fixed prices. Always 1 for usage-based kinds.
    pub quantity: Decimal,

    /// Units covered by the base subscription before per-unit billing starts.
    pub included_units: Decimal,

    /// What kind of component this is.
    pub kind: PriceKind,

    /// Recurring interval, or `None` for one-off prices.
    pub interval: Option<BillingInterval>,

    /// Number of intervals per billing period (e.g. 3 with `Month` for
    /// quarterly billing expressed in months).
    pub interval_count: u32,

    /// When the price is collected relative to its period.
    pub timing: BillingTiming,

    /// Behavior when allocation/usage increases mid-cycle.
    pub on_increase: OnIncrease,

    /// Behavior when allocation/usage decreases mid-cycle.
    pub on_decrease: OnDecrease,
}

impl Price {
    /// Create a flat recurring price.
    #[must_use]
    pub fn fixed(
        product_id: ProductId,
        description: impl Into<String>,
        unit_amount: Decimal,
        interval: BillingInterval,
    ) -> Self {
        Self {
            id: PriceId::generate(),
            product_id,
            feature_id: None,
            description: description.into(),
            unit_amount,
            currency: Currency::default(),
            quantity: Decimal::ONE,
            included_units: Decimal::ZERO,
            kind: PriceKind::Fixed,
            interval: Some(interval),
            interval_count: 1,
            timing: BillingTiming::InAdvance,
            on_increase: OnIncrease::BillImmediately,
            on_decrease: OnDecrease::NoImmediateEffect,
        }
    }

    /// Create a per-seat allocation price.
    #[must_use]
    pub fn allocation(
        product_id: ProductId,
        feature_id: FeatureId,
        description: impl Into<String>,
        unit_amount: Decimal,
        included_units: Decimal,
        interval: BillingInterval,
    ) -> Self {
        Self {
            id: PriceId::generate(),
            product_id,
            feature_id: Some(feature_id),
            description: description.into(),
            unit_amount,
            currency: Currency::default(),
            quantity: Decimal::ONE,
            included_units,
            kind: PriceKind::Allocation,
            interval: Some(interval),
            interval_count: 1,
            timing: BillingTiming::InAdvance,
            on_increase: OnIncrease::ProrateImmediately,
            on_decrease: OnDecrease::RetainSeatCredit,
        }
    }

    /// Create a metered consumable price billed in arrears.
    #[must_use]
    pub fn consumable(
        product_id: ProductId,
        feature_id: FeatureId,
        description: impl Into<String>,
        unit_amount: Decimal,
        included_units: Decimal,
        interval: BillingInterval,
    ) -> Self {
        Self {
            id: PriceId::generate(),
            product_id,
            feature_id: Some(feature_id),
            description: description.into(),
            unit_amount,
            currency: Currency::default(),
            quantity: Decimal::ONE,
            included_units,
            kind: PriceKind::Consumable,
            interval: Some(interval),
            interval_count: 1,
            timing: BillingTiming::InArrear,
            on_increase: OnIncrease::BillImmediately,
            on_decrease: OnDecrease::NoImmediateEffect,
        }
    }

    /// Create a one-off price with no billing period.
    #[must_use]
    pub fn one_off(
        product_id: ProductId,
        description: impl Into<String>,
        unit_amount: Decimal,
    ) -> Self {
        Self {
            id: PriceId::generate(),
            product_id,
            feature_id: None,
            description: description.into(),
            unit_amount,
            currency: Currency::default(),
            quantity: Decimal::ONE,
            included_units: Decimal::ZERO,
            kind: PriceKind::Fixed,
            interval: None,
            interval_count: 1,
            timing: BillingTiming::InAdvance,
            on_increase: OnIncrease::BillImmediately,
            on_decrease: OnDecrease::NoImmediateEffect,
        }
    }

    /// Override the currency.
    #[must_use]
    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    /// Override the fixed-price quantity multiplier.
    #[must_use]
    pub fn with_quantity(mut self, quantity: Decimal) -> Self {
        self.quantity = quantity;
        self
    }

    /// Override the proration behaviors.
    #[must_use]
    pub fn with_proration(mut self, on_increase: OnIncrease, on_decrease: OnDecrease) -> Self {
        self.on_increase = on_increase;
        self.on_decrease = on_decrease;
        self
    }

    /// Whether this price recurs (has a billing interval).
    #[must_use]
    pub const fn is_recurring(&self) -> bool {
        self.interval.is_some()
    }

    /// Whether this price carries a non-zero amount.
    #[must_use]
    pub fn is_paid(&self) -> bool {
        !self.unit_amount.is_zero()
    }

    /// Whether this price is a metered consumable.
    #[must_use]
    pub fn is_consumable(&self) -> bool {
        self.kind == PriceKind::Consumable
    }

    /// Whether this price is a seat allocation.
    #[must_use]
    pub fn is_allocation(&self) -> bool {
        self.kind == PriceKind::Allocation
    }
}
