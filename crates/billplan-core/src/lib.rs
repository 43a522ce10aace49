//! Core types and utilities for billplan.
//!
//! This crate provides the foundational types used throughout the billplan
//! engine:
//!
//! - **Identifiers**: `CustomerId`, `ProductId`, `PriceId`, `FeatureId`,
//!   `EntitlementId`, `ReplaceableId`
//! - **Catalog**: `Product`, `Price`, `CustomerProduct`
//! - **Entitlements**: `CustomerEntitlement`, `Replaceable`, `DeductionUpdate`
//! - **Errors**: `BillingError`
//!
//! # Money
//!
//! All monetary amounts and seat quantities are `rust_decimal::Decimal`.
//! Balances count down from an allowance; a negative balance is overage.
//! Floating-point money never appears in this crate.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod entitlement;
pub mod error;
pub mod ids;
pub mod price;
pub mod product;

pub use entitlement::{CustomerEntitlement, DeductionUpdate, Replaceable};
pub use error::{BillingError, Result};
pub use ids::{
    CustomerId, CustomerProductId, EntitlementId, FeatureId, IdError, PriceId, ProductId,
    ReplaceableId,
};
pub use price::{
    BillingInterval, BillingTiming, Currency, OnDecrease, OnIncrease, Price, PriceKind,
};
pub use product::{CustomerProduct, CustomerProductStatus, Product};
