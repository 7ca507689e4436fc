//! # shopbill-core: Pure Business Logic for shopbill
//!
//! Everything the billing screens compute on the device, written as pure
//! functions over data fetched from the backend.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        shopbill Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Screens / CLI (apps/shopbill-cli)               │   │
//! │  │    Catalog ──► Bill Draft ──► Checkout ──► Bills ──► Analytics  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              shopbill-client (REST + session)                   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ shopbill-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌──────────┐ ┌─────────┐ │   │
//! │  │   │  types  │ │  money  │ │  bill   │ │  filter  │ │ session │ │   │
//! │  │   │ Bill    │ │ Money   │ │ Draft   │ │ BillQuery│ │ Flags   │ │   │
//! │  │   │ Product │ │ Percent │ │ Payment │ │ Sorting  │ │ Tokens  │ │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └──────────┘ └─────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Wire records (Bill, Product, Brand, Customer, ...)
//! - [`money`] - Integer money in minor units
//! - [`bill`] - Bill draft assembly, derived status and payments
//! - [`filter`] - Client-side filter/sort composition for bills and transactions
//! - [`analytics`] - Sales summary, daily sales, top products
//! - [`reminder`] - Grouping of pending bills into reminder candidates
//! - [`session`] - Session phases, observable flags, token normalisation
//! - [`validation`] - Input validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use shopbill_core::money::Money;
//! use shopbill_core::types::Percent;
//!
//! let subtotal = Money::from_minor(25_000);
//! let discount = subtotal.percentage(Percent::from_bps(1000)); // 10%
//! assert_eq!((subtotal - discount).minor(), 22_500);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod analytics;
pub mod bill;
pub mod error;
pub mod filter;
pub mod money;
pub mod reminder;
pub mod session;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct lines allowed in a single bill.
pub const MAX_BILL_LINES: usize = 100;

/// Maximum quantity of a single product on one bill line.
///
/// Catches fat-finger entries (1000 instead of 10) at the counter.
pub const MAX_ITEM_QUANTITY: i64 = 999;
