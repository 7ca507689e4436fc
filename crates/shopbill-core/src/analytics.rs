//! # Analytics
//!
//! Dashboard figures computed from the bill list already on the device.
//!
//! ## Figures
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  gross      = Σ subtotal                                                │
//! │  discounts  = Σ discount                                                │
//! │  net        = Σ total            (total = max(subtotal - discount, 0))  │
//! │  collected  = Σ min(paid, total) (overpayment never counts as revenue)  │
//! │  pending    = Σ (total - collected)                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use ts_rs::TS;

use crate::money::Money;
use crate::types::{Bill, BillStatus, PaymentMethod};

// =============================================================================
// Sales Summary
// =============================================================================

/// Totals across a set of bills.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SalesSummary {
    pub bill_count: u32,
    pub paid_count: u32,
    pub pending_count: u32,
    #[ts(type = "number")]
    pub gross: Money,
    #[ts(type = "number")]
    pub discounts: Money,
    #[ts(type = "number")]
    pub net: Money,
    #[ts(type = "number")]
    pub collected: Money,
    #[ts(type = "number")]
    pub pending: Money,
    #[ts(type = "number")]
    pub collected_cash: Money,
    #[ts(type = "number")]
    pub collected_online: Money,
}

impl SalesSummary {
    /// Builds the summary in one pass.
    pub fn from_bills<'a, I>(bills: I) -> Self
    where
        I: IntoIterator<Item = &'a Bill>,
    {
        let mut s = SalesSummary::default();

        for bill in bills {
            s.bill_count += 1;
            match bill.status() {
                BillStatus::Paid => s.paid_count += 1,
                BillStatus::Pending => s.pending_count += 1,
            }

            s.gross += bill.subtotal;
            s.discounts += bill.discount;
            s.net += bill.total();

            let collected = bill.collected();
            s.collected += collected;
            s.pending += bill.pending();

            // Bills without a method were taken in cash by older app builds.
            match bill.payment_method.unwrap_or(PaymentMethod::Cash) {
                PaymentMethod::Cash => s.collected_cash += collected,
                PaymentMethod::Online => s.collected_online += collected,
            }
        }

        s
    }

    /// Average net value per bill, zero when there are no bills.
    pub fn average_bill(&self) -> Money {
        if self.bill_count == 0 {
            return Money::zero();
        }
        Money::from_minor(self.net.minor() / self.bill_count as i64)
    }
}

// =============================================================================
// Daily Sales
// =============================================================================

/// Net sales per UTC calendar day, in date order.
pub fn daily_sales<'a, I>(bills: I) -> BTreeMap<NaiveDate, Money>
where
    I: IntoIterator<Item = &'a Bill>,
{
    let mut days = BTreeMap::new();
    for bill in bills {
        *days.entry(bill.created_at.date_naive()).or_insert_with(Money::zero) += bill.total();
    }
    days
}

// =============================================================================
// Top Products
// =============================================================================

/// Sales of one product across the bills considered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ProductSales {
    pub product_id: String,
    /// Populated name if any bill carried one, else the id.
    pub name: String,
    pub quantity: i64,
    #[ts(type = "number")]
    pub revenue: Money,
}

/// The `n` best-selling products by quantity, ties broken by revenue then id.
pub fn top_products<'a, I>(bills: I, n: usize) -> Vec<ProductSales>
where
    I: IntoIterator<Item = &'a Bill>,
{
    let mut by_id: HashMap<&str, ProductSales> = HashMap::new();

    for item in bills.into_iter().flat_map(|b| b.items.iter()) {
        let id = item.product.id();
        let entry = by_id.entry(id).or_insert_with(|| ProductSales {
            product_id: id.to_string(),
            name: id.to_string(),
            quantity: 0,
            revenue: Money::zero(),
        });
        if let Some(name) = item.product.name() {
            entry.name = name.to_string();
        }
        entry.quantity += item.quantity;
        entry.revenue += item.line_total();
    }

    let mut ranked: Vec<ProductSales> = by_id.into_values().collect();
    ranked.sort_by(|a, b| {
        b.quantity
            .cmp(&a.quantity)
            .then_with(|| b.revenue.cmp(&a.revenue))
            .then_with(|| a.product_id.cmp(&b.product_id))
    });
    ranked.truncate(n);
    ranked
}

// =============================================================================
// Unit Tests
// =============================================================================
