//! # Bills
//!
//! Derived bill views and the local bill draft the operator assembles
//! before checkout.
//!
//! ## Checkout Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Tap product ───────────► BillDraft::add_product()  (price frozen)     │
//! │  Change quantity ───────► BillDraft::set_quantity() (0 removes)        │
//! │  Enter discount ────────► BillDraft::set_discount() (flat or %)        │
//! │  Enter amount received ─► BillDraft::set_amount_paid()                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BillDraft::to_request() ──► NewBill ──► POST /bills                   │
//! │                                                                         │
//! │  Later, from the bill list:                                            │
//! │  Bill::status() / Bill::pending()  ← recomputed every render           │
//! │  apply_payment() ──► PaymentRequest ──► POST /bills/{id}/payments      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{
    Bill, BillStatus, Customer, NewBill, NewBillItem, PaymentMethod, PaymentRequest, Percent,
    Product,
};
use crate::validation;
use crate::{MAX_BILL_LINES, MAX_ITEM_QUANTITY};

// =============================================================================
// Derived Bill Views
// =============================================================================

impl Bill {
    /// Subtotal less discount, never below zero.
    pub fn total(&self) -> Money {
        (self.subtotal - self.discount).non_negative()
    }

    /// Paid once `amount_paid` covers the total.
    ///
    /// Recomputed on every call; a stored status would go stale after a
    /// partial payment.
    pub fn status(&self) -> BillStatus {
        if self.amount_paid >= self.total() {
            BillStatus::Paid
        } else {
            BillStatus::Pending
        }
    }

    /// Amount still owed, zero for paid bills.
    pub fn pending(&self) -> Money {
        (self.total() - self.amount_paid).non_negative()
    }

    /// Amount actually collected towards this bill (over-payment ignored).
    pub fn collected(&self) -> Money {
        self.amount_paid.min(self.total()).non_negative()
    }

    pub fn is_paid(&self) -> bool {
        self.status() == BillStatus::Paid
    }

    /// Customer name for lists, empty for walk-in sales.
    pub fn customer_name(&self) -> &str {
        self.customer.as_ref().map(|c| c.name.as_str()).unwrap_or("")
    }
}

// =============================================================================
// Payments
// =============================================================================

/// Builds the request for a further payment against an existing bill.
///
/// ## Rules
/// - Amount must be positive
/// - Bill must still have something pending
/// - Amount may not exceed what is pending
///
/// The caller updates its view from the bill the backend returns; the new
/// status then follows from [`Bill::status`].
pub fn apply_payment(bill: &Bill, amount: Money, method: PaymentMethod) -> CoreResult<PaymentRequest> {
    validation::validate_payment_amount(amount)?;

    let pending = bill.pending();
    if pending.is_zero() {
        return Err(CoreError::AlreadyPaid(bill.bill_number.clone()));
    }
    if amount > pending {
        return Err(CoreError::Overpayment {
            pending,
            attempted: amount,
        });
    }

    Ok(PaymentRequest {
        amount,
        payment_method: method,
    })
}

// =============================================================================
// Discount
// =============================================================================

/// Discount as the operator entered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Discount {
    /// Fixed amount off the subtotal.
    Flat(Money),
    /// Percentage of the subtotal.
    Percent(Percent),
}

impl Default for Discount {
    fn default() -> Self {
        Discount::Flat(Money::zero())
    }
}

impl Discount {
    /// Amount taken off `subtotal`, capped at the subtotal.
    pub fn amount_on(&self, subtotal: Money) -> Money {
        let raw = match self {
            Discount::Flat(amount) => *amount,
            Discount::Percent(rate) => subtotal.percentage(*rate),
        };
        raw.non_negative().min(subtotal.non_negative())
    }
}

// =============================================================================
// Bill Draft
// =============================================================================

/// A line in the draft.
///
/// Name and unit price are copied from the product when it is added, so
/// the draft stays consistent if the catalog is refetched mid-sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftLine {
    pub product_id: String,
    pub name: String,
    pub unit_price: Money,
    pub quantity: i64,
}

impl DraftLine {
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply_quantity(self.quantity)
    }
}

/// Bill being assembled at the counter.
///
/// ## Invariants
/// - Lines are unique by `product_id` (adding again increases quantity)
/// - Every quantity is within 1 ..= MAX_ITEM_QUANTITY
/// - At most MAX_BILL_LINES lines
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillDraft {
    lines: Vec<DraftLine>,
    customer: Option<Customer>,
    discount: Discount,
    payment_method: Option<PaymentMethod>,
    amount_paid: Money,
}

impl BillDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[DraftLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Adds `quantity` of `product`, merging with an existing line.
    pub fn add_product(&mut self, product: &Product, quantity: i64) -> CoreResult<()> {
        validation::validate_quantity(quantity)?;

        if let Some(line) = self.lines.iter_mut().find(|l| l.product_id == product.id) {
            let new_qty = line.quantity + quantity;
            if new_qty > MAX_ITEM_QUANTITY {
                return Err(CoreError::QuantityTooLarge {
                    requested: new_qty,
                    max: MAX_ITEM_QUANTITY,
                });
            }
            line.quantity = new_qty;
            return Ok(());
        }

        if self.lines.len() >= MAX_BILL_LINES {
            return Err(CoreError::TooManyLines { max: MAX_BILL_LINES });
        }

        self.lines.push(DraftLine {
            product_id: product.id.clone(),
            name: product.name.clone(),
            unit_price: product.price,
            quantity,
        });
        Ok(())
    }

    /// Sets a line's quantity; zero removes the line.
    pub fn set_quantity(&mut self, product_id: &str, quantity: i64) -> CoreResult<()> {
        if quantity == 0 {
            return self.remove_product(product_id);
        }
        validation::validate_quantity(quantity)?;

        let line = self
            .lines
            .iter_mut()
            .find(|l| l.product_id == product_id)
            .ok_or_else(|| CoreError::LineNotFound(product_id.to_string()))?;
        line.quantity = quantity;
        Ok(())
    }

    pub fn remove_product(&mut self, product_id: &str) -> CoreResult<()> {
        let before = self.lines.len();
        self.lines.retain(|l| l.product_id != product_id);
        if self.lines.len() == before {
            return Err(CoreError::LineNotFound(product_id.to_string()));
        }
        Ok(())
    }

    /// Empties the draft, keeping nothing from the previous sale.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn set_customer(&mut self, customer: Option<Customer>) -> CoreResult<()> {
        if let Some(c) = &customer {
            validation::validate_customer_name(&c.name)?;
            if let Some(phone) = &c.phone {
                validation::validate_phone(phone)?;
            }
        }
        self.customer = customer;
        Ok(())
    }

    pub fn set_discount(&mut self, discount: Discount) -> CoreResult<()> {
        match discount {
            Discount::Flat(amount) => validation::validate_flat_discount(amount)?,
            Discount::Percent(rate) => validation::validate_discount_percent(rate)?,
        }
        self.discount = discount;
        Ok(())
    }

    pub fn set_payment_method(&mut self, method: PaymentMethod) {
        self.payment_method = Some(method);
    }

    /// Amount received at checkout. Zero leaves the whole bill pending.
    pub fn set_amount_paid(&mut self, amount: Money) -> CoreResult<()> {
        if amount.is_negative() {
            return Err(CoreError::Validation(
                crate::error::ValidationError::MustBePositive {
                    field: "amount paid".to_string(),
                },
            ));
        }
        self.amount_paid = amount;
        Ok(())
    }

    pub fn subtotal(&self) -> Money {
        self.lines.iter().map(DraftLine::line_total).sum()
    }

    pub fn discount_amount(&self) -> Money {
        self.discount.amount_on(self.subtotal())
    }

    pub fn total(&self) -> Money {
        self.subtotal() - self.discount_amount()
    }

    /// What the customer will still owe after checkout.
    pub fn pending_after_payment(&self) -> Money {
        (self.total() - self.amount_paid).non_negative()
    }

    /// Change to hand back when more cash was received than the total.
    pub fn change_due(&self) -> Money {
        (self.amount_paid - self.total()).non_negative()
    }

    /// Status the bill will show right after checkout.
    pub fn status_after_checkout(&self) -> BillStatus {
        if self.amount_paid >= self.total() {
            BillStatus::Paid
        } else {
            BillStatus::Pending
        }
    }

    /// Checks the draft can be checked out.
    ///
    /// A pending balance needs a customer to chase it with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.lines.is_empty() {
            return Err(CoreError::EmptyBill);
        }
        if self.status_after_checkout() == BillStatus::Pending && self.customer.is_none() {
            return Err(CoreError::Validation(
                crate::error::ValidationError::Required {
                    field: "customer for a bill with pending amount".to_string(),
                },
            ));
        }
        Ok(())
    }

    /// Builds the checkout request. Over-payment is recorded as the total;
    /// the change is handed back in cash.
    pub fn to_request(&self) -> CoreResult<NewBill> {
        self.validate()?;

        Ok(NewBill {
            customer: self.customer.clone(),
            items: self
                .lines
                .iter()
                .map(|l| NewBillItem {
                    product_id: l.product_id.clone(),
                    quantity: l.quantity,
                    price: l.unit_price,
                })
                .collect(),
            subtotal: self.subtotal(),
            discount: self.discount_amount(),
            amount_paid: self.amount_paid.min(self.total()),
            payment_method: self.payment_method.unwrap_or(PaymentMethod::Cash),
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn product(id: &str, price_minor: i64) -> Product {
        Product {
            id: id.to_string(),
            name: format!("Product {}", id),
            brand_id: Some("brand-1".to_string()),
            price: Money::from_minor(price_minor),
            stock: None,
            unit: None,
            is_active: true,
        }
    }

    fn bill(subtotal: i64, discount: i64, paid: i64) -> Bill {
        Bill {
            id: "b1".to_string(),
            bill_number: "INV-1".to_string(),
            customer: None,
            items: vec![],
            subtotal: Money::from_minor(subtotal),
            discount: Money::from_minor(discount),
            amount_paid: Money::from_minor(paid),
            payment_method: Some(PaymentMethod::Cash),
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            updated_at: None,
        }
    }

    #[test]
    fn test_status_is_derived_from_amounts() {
        assert_eq!(bill(10_000, 0, 10_000).status(), BillStatus::Paid);
        assert_eq!(bill(10_000, 1_000, 9_000).status(), BillStatus::Paid);
        assert_eq!(bill(10_000, 0, 9_999).status(), BillStatus::Pending);
        assert_eq!(bill(10_000, 0, 0).status(), BillStatus::Pending);
        // Over-discounted bills total zero and are paid.
        assert_eq!(bill(1_000, 5_000, 0).status(), BillStatus::Paid);
    }

    #[test]
    fn test_pending_and_collected() {
        let b = bill(10_000, 500, 4_000);
        assert_eq!(b.total().minor(), 9_500);
        assert_eq!(b.pending().minor(), 5_500);
        assert_eq!(b.collected().minor(), 4_000);

        let overpaid = bill(10_000, 0, 12_000);
        assert!(overpaid.pending().is_zero());
        assert_eq!(overpaid.collected().minor(), 10_000);
    }

    #[test]
    fn test_apply_payment_rules() {
        let b = bill(10_000, 0, 4_000);

        let req = apply_payment(&b, Money::from_minor(6_000), PaymentMethod::Online).unwrap();
        assert_eq!(req.amount.minor(), 6_000);
        assert_eq!(req.payment_method, PaymentMethod::Online);

        assert!(matches!(
            apply_payment(&b, Money::from_minor(6_001), PaymentMethod::Cash),
            Err(CoreError::Overpayment { .. })
        ));
        assert!(apply_payment(&b, Money::zero(), PaymentMethod::Cash).is_err());

        let paid = bill(10_000, 0, 10_000);
        assert!(matches!(
            apply_payment(&paid, Money::from_minor(1), PaymentMethod::Cash),
            Err(CoreError::AlreadyPaid(_))
        ));
    }

    #[test]
    fn test_discount_amounts() {
        let subtotal = Money::from_minor(20_000);
        assert_eq!(Discount::Flat(Money::from_minor(1_500)).amount_on(subtotal).minor(), 1_500);
        assert_eq!(Discount::Percent(Percent::from_bps(1000)).amount_on(subtotal).minor(), 2_000);
        // Capped at the subtotal.
        assert_eq!(Discount::Flat(Money::from_minor(50_000)).amount_on(subtotal), subtotal);
    }

    #[test]
    fn test_draft_merges_lines_and_freezes_price() {
        let mut draft = BillDraft::new();
        let mut rice = product("rice", 4_500);

        draft.add_product(&rice, 2).unwrap();
        rice.price = Money::from_minor(9_999);
        draft.add_product(&rice, 1).unwrap();

        assert_eq!(draft.lines().len(), 1);
        assert_eq!(draft.lines()[0].quantity, 3);
        assert_eq!(draft.lines()[0].unit_price.minor(), 4_500);
        assert_eq!(draft.subtotal().minor(), 13_500);
    }

    #[test]
    fn test_draft_quantity_limits() {
        let mut draft = BillDraft::new();
        let p = product("p", 100);

        assert!(draft.add_product(&p, 0).is_err());
        draft.add_product(&p, 999).unwrap();
        assert!(matches!(
            draft.add_product(&p, 1),
            Err(CoreError::QuantityTooLarge { .. })
        ));

        draft.set_quantity("p", 0).unwrap();
        assert!(draft.is_empty());
        assert!(matches!(
            draft.set_quantity("p", 3),
            Err(CoreError::LineNotFound(_))
        ));
    }

    #[test]
    fn test_draft_line_capacity() {
        let mut draft = BillDraft::new();
        for i in 0..MAX_BILL_LINES {
            draft.add_product(&product(&format!("p{}", i), 100), 1).unwrap();
        }
        assert!(matches!(
            draft.add_product(&product("one-more", 100), 1),
            Err(CoreError::TooManyLines { .. })
        ));
    }

    #[test]
    fn test_draft_totals_and_request() {
        let mut draft = BillDraft::new();
        draft.add_product(&product("a", 10_000), 2).unwrap();
        draft.add_product(&product("b", 5_000), 1).unwrap();
        draft.set_discount(Discount::Percent(Percent::from_bps(1000))).unwrap();
        draft.set_payment_method(PaymentMethod::Online);
        draft.set_amount_paid(Money::from_minor(30_000)).unwrap();

        assert_eq!(draft.subtotal().minor(), 25_000);
        assert_eq!(draft.discount_amount().minor(), 2_500);
        assert_eq!(draft.total().minor(), 22_500);
        assert_eq!(draft.change_due().minor(), 7_500);
        assert_eq!(draft.status_after_checkout(), BillStatus::Paid);

        let req = draft.to_request().unwrap();
        assert_eq!(req.items.len(), 2);
        assert_eq!(req.subtotal.minor(), 25_000);
        assert_eq!(req.discount.minor(), 2_500);
        assert_eq!(req.amount_paid.minor(), 22_500);
        assert_eq!(req.payment_method, PaymentMethod::Online);
    }

    #[test]
    fn test_pending_bill_needs_customer() {
        let mut draft = BillDraft::new();
        assert!(matches!(draft.to_request(), Err(CoreError::EmptyBill)));

        draft.add_product(&product("a", 10_000), 1).unwrap();
        draft.set_amount_paid(Money::from_minor(4_000)).unwrap();
        assert!(draft.to_request().is_err());

        draft
            .set_customer(Some(Customer {
                id: None,
                name: "Ravi".to_string(),
                phone: Some("9876543210".to_string()),
                email: None,
            }))
            .unwrap();
        let req = draft.to_request().unwrap();
        assert_eq!(req.amount_paid.minor(), 4_000);
        assert_eq!(draft.pending_after_payment().minor(), 6_000);
        assert_eq!(draft.status_after_checkout(), BillStatus::Pending);
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut draft = BillDraft::new();
        draft.add_product(&product("a", 100), 1).unwrap();
        draft.set_payment_method(PaymentMethod::Online);
        draft.clear();
        assert_eq!(draft, BillDraft::new());
    }
}
