//! # Payment Reminders
//!
//! Groups pending bills by customer so one reminder covers everything a
//! customer owes.
//!
//! ## Grouping Rules
//! - Only bills with a pending amount that are at least `min_age` old
//! - Bills without a customer are skipped (walk-in sales)
//! - Customers are keyed by phone digits, falling back to the lowercased name
//! - Result is ordered by total pending, largest first

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use ts_rs::TS;

use crate::money::Money;
use crate::types::Bill;

/// One customer to remind, with the bills they still owe on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ReminderCandidate {
    pub customer_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub bill_ids: Vec<String>,
    #[ts(type = "number")]
    pub total_pending: Money,
    #[ts(as = "String")]
    pub oldest_bill_at: DateTime<Utc>,
}

impl ReminderCandidate {
    pub fn bill_count(&self) -> usize {
        self.bill_ids.len()
    }
}

fn customer_key(name: &str, phone: Option<&str>) -> String {
    let digits: String = phone
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    if digits.is_empty() {
        format!("name:{}", name.trim().to_lowercase())
    } else {
        format!("phone:{}", digits)
    }
}

/// Collects reminder candidates from `bills` as of `now`.
///
/// A `min_age` reaching past the earliest representable time matches no bill.
pub fn reminder_candidates<'a, I>(bills: I, now: DateTime<Utc>, min_age: Duration) -> Vec<ReminderCandidate>
where
    I: IntoIterator<Item = &'a Bill>,
{
    let Some(cutoff) = now.checked_sub_signed(min_age) else {
        return Vec::new();
    };
    let mut groups: HashMap<String, ReminderCandidate> = HashMap::new();

    for bill in bills {
        let Some(customer) = bill.customer.as_ref() else {
            continue;
        };
        let pending = bill.pending();
        if !pending.is_positive() || bill.created_at > cutoff {
            continue;
        }

        let key = customer_key(&customer.name, customer.phone.as_deref());
        let entry = groups.entry(key).or_insert_with(|| ReminderCandidate {
            customer_name: customer.name.clone(),
            phone: customer.phone.clone(),
            bill_ids: Vec::new(),
            total_pending: Money::zero(),
            oldest_bill_at: bill.created_at,
        });

        entry.bill_ids.push(bill.id.clone());
        entry.total_pending += pending;
        entry.oldest_bill_at = entry.oldest_bill_at.min(bill.created_at);
        if entry.phone.is_none() {
            entry.phone = customer.phone.clone();
        }
    }

    let mut out: Vec<ReminderCandidate> = groups.into_values().collect();
    out.sort_by(|a, b| {
        b.total_pending
            .cmp(&a.total_pending)
            .then_with(|| a.oldest_bill_at.cmp(&b.oldest_bill_at))
    });
    out
}

// =============================================================================
// Unit Tests
// =============================================================================
