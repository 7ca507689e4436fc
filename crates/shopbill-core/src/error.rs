//! # Error Types
//!
//! Domain-specific error types for shopbill-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  shopbill-core errors (this file)                                      │
//! │  ├── CoreError        - Bill / payment rule violations                 │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  shopbill-store errors                                                 │
//! │  └── StoreError       - Local storage failures                         │
//! │                                                                         │
//! │  shopbill-client errors                                                │
//! │  └── ClientError      - HTTP / session failures                        │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → ClientError → CLI (anyhow)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::money::Money;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule errors raised while assembling bills or taking payments.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Product is not part of the bill draft.
    #[error("Product {0} is not on this bill")]
    LineNotFound(String),

    /// Bill already has the maximum number of distinct lines.
    #[error("Bill cannot have more than {max} lines")]
    TooManyLines { max: usize },

    /// Line quantity exceeds the allowed maximum.
    #[error("Quantity {requested} is above the per-line limit of {max}")]
    QuantityTooLarge { requested: i64, max: i64 },

    /// Checkout attempted on an empty draft.
    #[error("Bill has no items")]
    EmptyBill,

    /// Payment would take the bill past its total.
    ///
    /// ## User Workflow
    /// ```text
    /// Bill total ₹500, already paid ₹300
    ///      │
    ///      ▼
    /// Record payment ₹250
    ///      │
    ///      ▼
    /// Overpayment { pending: 200, attempted: 250 }
    ///      │
    ///      ▼
    /// UI shows: "Only 200.00 is pending"
    /// ```
    #[error("Payment of {attempted} exceeds pending amount {pending}")]
    Overpayment { pending: Money, attempted: Money },

    /// Bill is already fully paid.
    #[error("Bill {0} is already paid")]
    AlreadyPaid(String),

    /// Auth response carried no usable access token.
    #[error("Auth response has no access token")]
    MissingAccessToken,

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Form input rejected on the device, before any request is made.
///
/// `field` is the label the screen shows next to the message.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    #[error("{field} must be at least {min} characters")]
    TooShort { field: String, min: usize },

    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Zero or negative where only a positive amount makes sense.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Phone numbers, emails, dates and enum keywords.
    #[error("{field} is not valid: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
