//! # Domain Types
//!
//! Records mirrored from the billing backend, plus the request bodies sent
//! back to it.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌──────────────────────────┐    │
//! │  │   Brand     │◄───│  Product    │◄───│  BillItem (product ref,  │    │
//! │  │  id, name   │    │  price      │    │  quantity, price)        │    │
//! │  └─────────────┘    └─────────────┘    └────────────┬─────────────┘    │
//! │                                                     │                   │
//! │  ┌─────────────┐    ┌──────────────────────────────┴─────────────┐     │
//! │  │  Customer   │◄───│  Bill                                       │     │
//! │  │ name, phone │    │  subtotal, discount, amount_paid            │     │
//! │  └─────────────┘    │  status → DERIVED (bill.rs), never stored   │     │
//! │                     └──────────────────────────────┬─────────────┘     │
//! │                                                    │                    │
//! │                     ┌──────────────────────────────▼─────────────┐     │
//! │                     │  Transaction (one payment against a bill)   │     │
//! │                     └─────────────────────────────────────────────┘     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Conventions
//! - camelCase field names
//! - ids arrive as `id` or `_id`
//! - amounts are JSON numbers in major units (see [`Money`])

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Percent
// =============================================================================

/// A rate in basis points: 1 bps = 0.01%, 1000 bps = 10%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Percent(u32);

impl Percent {
    /// Creates a rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        Percent(bps)
    }

    /// Creates a rate from a percentage typed by the operator (e.g. `12.5`).
    pub fn from_percentage(pct: f64) -> Self {
        Percent((pct * 100.0).round().max(0.0) as u32)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Percentage for display only.
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

// =============================================================================
// Payment Method
// =============================================================================

/// How a payment was taken at the counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Physical cash.
    Cash,
    /// UPI, card or bank transfer.
    #[serde(alias = "upi", alias = "card")]
    Online,
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentMethod::Cash => write!(f, "cash"),
            PaymentMethod::Online => write!(f, "online"),
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = crate::error::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cash" => Ok(PaymentMethod::Cash),
            "online" | "upi" | "card" => Ok(PaymentMethod::Online),
            other => Err(crate::error::ValidationError::InvalidFormat {
                field: "payment method".to_string(),
                reason: format!("unknown method '{}', expected cash or online", other),
            }),
        }
    }
}

// =============================================================================
// Bill Status (derived)
// =============================================================================

/// Paid / Pending view of a bill.
///
/// Always computed from `amount_paid` against the bill total at render
/// time (see [`Bill::status`](crate::types::Bill)); any status field the
/// backend sends is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum BillStatus {
    Paid,
    Pending,
}

impl std::fmt::Display for BillStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BillStatus::Paid => write!(f, "paid"),
            BillStatus::Pending => write!(f, "pending"),
        }
    }
}

impl std::str::FromStr for BillStatus {
    type Err = crate::error::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "paid" => Ok(BillStatus::Paid),
            "pending" | "unpaid" | "due" => Ok(BillStatus::Pending),
            other => Err(crate::error::ValidationError::InvalidFormat {
                field: "status".to_string(),
                reason: format!("unknown status '{}', expected paid or pending", other),
            }),
        }
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// A brand grouping products in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Brand {
    #[serde(alias = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(as = "Option<String>")]
    pub created_at: Option<DateTime<Utc>>,
}

/// A product that can be put on a bill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(alias = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default, alias = "brand", skip_serializing_if = "Option::is_none")]
    pub brand_id: Option<String>,
    #[ts(type = "number")]
    pub price: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<i64>,
    /// Selling unit shown next to the price ("kg", "pcs", ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// A customer attached to a bill.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    #[serde(default, alias = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

// =============================================================================
// Bills
// =============================================================================

/// Product reference on a bill line.
///
/// Depending on the endpoint the backend sends either the bare product id
/// or a populated summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(untagged)]
pub enum ProductRef {
    Id(String),
    Summary {
        #[serde(alias = "_id")]
        id: String,
        #[serde(default)]
        name: String,
    },
}

impl ProductRef {
    pub fn id(&self) -> &str {
        match self {
            ProductRef::Id(id) => id,
            ProductRef::Summary { id, .. } => id,
        }
    }

    /// Display name, if the backend populated it.
    pub fn name(&self) -> Option<&str> {
        match self {
            ProductRef::Id(_) => None,
            ProductRef::Summary { name, .. } if !name.is_empty() => Some(name),
            ProductRef::Summary { .. } => None,
        }
    }
}

/// One line of a bill: unit price frozen at checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct BillItem {
    pub product: ProductRef,
    pub quantity: i64,
    /// Unit price at the time of sale.
    #[ts(type = "number")]
    pub price: Money,
}

impl BillItem {
    /// Unit price × quantity.
    #[inline]
    pub fn line_total(&self) -> Money {
        self.price.multiply_quantity(self.quantity)
    }
}

/// A bill as returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub bill_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<Customer>,
    #[serde(default)]
    pub items: Vec<BillItem>,
    #[ts(type = "number")]
    pub subtotal: Money,
    #[serde(default)]
    #[ts(type = "number")]
    pub discount: Money,
    #[serde(default)]
    #[ts(type = "number")]
    pub amount_paid: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<PaymentMethod>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(as = "Option<String>")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A payment recorded against a bill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default, alias = "bill", skip_serializing_if = "Option::is_none")]
    pub bill_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bill_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[ts(type = "number")]
    pub amount: Money,
    pub payment_method: PaymentMethod,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Profile
// =============================================================================

/// The signed-in shop owner.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default, alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shop_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

// =============================================================================
// Request Bodies
// =============================================================================

/// `POST /auth/login`
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// `POST /auth/register`
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shop_name: Option<String>,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub password: String,
}

/// `PUT /auth/profile`; only present fields are changed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shop_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// `POST /brands`, `PUT /brands/{id}`
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BrandInput {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// `POST /products`, `PUT /products/{id}`
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ProductInput {
    pub name: String,
    #[serde(rename = "brand")]
    pub brand_id: String,
    #[ts(type = "number")]
    pub price: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// One line of a checkout request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct NewBillItem {
    #[serde(rename = "product")]
    pub product_id: String,
    pub quantity: i64,
    #[ts(type = "number")]
    pub price: Money,
}

/// `POST /bills` (checkout). Built by [`BillDraft::to_request`](crate::bill::BillDraft::to_request).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct NewBill {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<Customer>,
    pub items: Vec<NewBillItem>,
    #[ts(type = "number")]
    pub subtotal: Money,
    #[ts(type = "number")]
    pub discount: Money,
    #[ts(type = "number")]
    pub amount_paid: Money,
    pub payment_method: PaymentMethod,
}

/// `PUT /bills/{id}`; only present fields are changed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct BillUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<Customer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "number | null")]
    pub discount: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "number | null")]
    pub amount_paid: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<PaymentMethod>,
}

/// `POST /bills/{id}/payments`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    #[ts(type = "number")]
    pub amount: Money,
    pub payment_method: PaymentMethod,
}

// =============================================================================
// Unit Tests
// =============================================================================
