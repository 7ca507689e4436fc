//! # Filter / Sort Composition
//!
//! Client-side narrowing and ordering of bill and transaction lists that
//! were fetched in full from the backend.
//!
//! ## Composition
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  fetched bills                                                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  search ∧ status ∧ payment method ∧ date range ∧ amount range          │
//! │       │        (every criterion is optional; unset = pass)              │
//! │       ▼                                                                 │
//! │  stable sort by the selected key                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  rendered list                                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::money::Money;
use crate::types::{Bill, BillStatus, PaymentMethod, Transaction};

// =============================================================================
// Date Range
// =============================================================================

/// Half-open time window: `start <= t < end`. Open on a side when unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        DateRange { start, end }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| at >= s) && self.end.map_or(true, |e| at < e)
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

fn matches_text(haystacks: &[Option<&str>], needle: &str) -> bool {
    haystacks
        .iter()
        .flatten()
        .any(|h| h.to_lowercase().contains(needle))
}

// =============================================================================
// Bills
// =============================================================================

/// Sort keys offered on the bills screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillSort {
    #[default]
    Newest,
    Oldest,
    TotalHighToLow,
    TotalLowToHigh,
    PendingHighToLow,
    CustomerName,
}

impl std::str::FromStr for BillSort {
    type Err = crate::error::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "newest" => Ok(BillSort::Newest),
            "oldest" => Ok(BillSort::Oldest),
            "total-desc" | "amount-desc" => Ok(BillSort::TotalHighToLow),
            "total-asc" | "amount-asc" => Ok(BillSort::TotalLowToHigh),
            "pending" | "pending-desc" => Ok(BillSort::PendingHighToLow),
            "customer" | "name" => Ok(BillSort::CustomerName),
            other => Err(crate::error::ValidationError::InvalidFormat {
                field: "sort".to_string(),
                reason: format!("unknown sort key '{}'", other),
            }),
        }
    }
}

/// Criteria for the bills screen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillQuery {
    /// Matches bill number, customer name or phone, case-insensitively.
    pub search: Option<String>,
    pub status: Option<BillStatus>,
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub date_range: DateRange,
    /// Inclusive bounds on the bill total.
    pub min_total: Option<Money>,
    pub max_total: Option<Money>,
    #[serde(default)]
    pub sort: BillSort,
}

impl BillQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.search = if text.trim().is_empty() { None } else { Some(text) };
        self
    }

    pub fn status(mut self, status: BillStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn payment_method(mut self, method: PaymentMethod) -> Self {
        self.payment_method = Some(method);
        self
    }

    pub fn date_range(mut self, range: DateRange) -> Self {
        self.date_range = range;
        self
    }

    pub fn total_between(mut self, min: Option<Money>, max: Option<Money>) -> Self {
        self.min_total = min;
        self.max_total = max;
        self
    }

    pub fn sort(mut self, sort: BillSort) -> Self {
        self.sort = sort;
        self
    }

    /// True if `bill` passes every set criterion.
    pub fn matches(&self, bill: &Bill) -> bool {
        if let Some(needle) = self.search.as_deref().map(|s| s.trim().to_lowercase()) {
            let customer = bill.customer.as_ref();
            let haystacks = [
                Some(bill.bill_number.as_str()),
                customer.map(|c| c.name.as_str()),
                customer.and_then(|c| c.phone.as_deref()),
            ];
            if !matches_text(&haystacks, &needle) {
                return false;
            }
        }

        if self.status.is_some_and(|s| bill.status() != s) {
            return false;
        }

        if let Some(method) = self.payment_method {
            if bill.payment_method != Some(method) {
                return false;
            }
        }

        if !self.date_range.contains(bill.created_at) {
            return false;
        }

        let total = bill.total();
        if self.min_total.is_some_and(|min| total < min) {
            return false;
        }
        if self.max_total.is_some_and(|max| total > max) {
            return false;
        }

        true
    }

    /// Filters then sorts. Ties keep their fetched order.
    pub fn apply<'a>(&self, bills: &'a [Bill]) -> Vec<&'a Bill> {
        let mut out: Vec<&Bill> = bills.iter().filter(|b| self.matches(b)).collect();
        out.sort_by(|a, b| compare_bills(self.sort, a, b));
        out
    }
}

fn compare_bills(sort: BillSort, a: &Bill, b: &Bill) -> Ordering {
    match sort {
        BillSort::Newest => b.created_at.cmp(&a.created_at),
        BillSort::Oldest => a.created_at.cmp(&b.created_at),
        BillSort::TotalHighToLow => b.total().cmp(&a.total()),
        BillSort::TotalLowToHigh => a.total().cmp(&b.total()),
        BillSort::PendingHighToLow => b.pending().cmp(&a.pending()),
        BillSort::CustomerName => a
            .customer_name()
            .to_lowercase()
            .cmp(&b.customer_name().to_lowercase()),
    }
}

// =============================================================================
// Transactions
// =============================================================================

/// Sort keys offered on the transactions screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionSort {
    #[default]
    Newest,
    Oldest,
    AmountHighToLow,
    AmountLowToHigh,
}

/// Criteria for the transactions screen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionQuery {
    /// Matches customer name or bill number, case-insensitively.
    pub search: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub date_range: DateRange,
    #[serde(default)]
    pub sort: TransactionSort,
}

impl TransactionQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.search = if text.trim().is_empty() { None } else { Some(text) };
        self
    }

    pub fn payment_method(mut self, method: PaymentMethod) -> Self {
        self.payment_method = Some(method);
        self
    }

    pub fn date_range(mut self, range: DateRange) -> Self {
        self.date_range = range;
        self
    }

    pub fn sort(mut self, sort: TransactionSort) -> Self {
        self.sort = sort;
        self
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        if let Some(needle) = self.search.as_deref().map(|s| s.trim().to_lowercase()) {
            let haystacks = [tx.customer_name.as_deref(), tx.bill_number.as_deref()];
            if !matches_text(&haystacks, &needle) {
                return false;
            }
        }

        if self.payment_method.is_some_and(|m| tx.payment_method != m) {
            return false;
        }

        self.date_range.contains(tx.created_at)
    }

    pub fn apply<'a>(&self, txs: &'a [Transaction]) -> Vec<&'a Transaction> {
        let mut out: Vec<&Transaction> = txs.iter().filter(|t| self.matches(t)).collect();
        out.sort_by(|a, b| match self.sort {
            TransactionSort::Newest => b.created_at.cmp(&a.created_at),
            TransactionSort::Oldest => a.created_at.cmp(&b.created_at),
            TransactionSort::AmountHighToLow => b.amount.cmp(&a.amount),
            TransactionSort::AmountLowToHigh => a.amount.cmp(&b.amount),
        });
        out
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
