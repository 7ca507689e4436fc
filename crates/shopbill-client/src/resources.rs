//! # Shop API
//!
//! Authenticated resource calls for the screens. Each call takes its bearer
//! token from the [`SessionManager`]; a 401 triggers one session re-check
//! (which may refresh the token) and a single retry.
//!
//! ```text
//! ShopApi::list_bills()
//!   │  token ← session.access_token()
//!   ▼
//! ApiClient::list_bills(token) ── 401 ──► session.bootstrap()
//!   │                                        ├── authenticated ──► retry once
//!   ▼                                        └── signed out ─────► NotAuthenticated
//! Vec<Bill>
//! ```

use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

use shopbill_core::bill::{apply_payment, BillDraft};
use shopbill_core::reminder::ReminderCandidate;
use shopbill_core::types::{
    Bill, BillUpdate, Brand, BrandInput, Customer, PaymentMethod, Product, ProductInput, Profile, ProfileUpdate,
    Transaction,
};
use shopbill_core::validation::{
    validate_brand_name, validate_customer_name, validate_person_name, validate_phone, validate_price,
    validate_product_name,
};
use shopbill_core::Money;

use crate::api::ApiClient;
use crate::error::{ClientError, ClientResult};
use crate::session::SessionManager;

#[derive(Clone)]
pub struct ShopApi {
    api: Arc<ApiClient>,
    session: Arc<SessionManager>,
}

impl ShopApi {
    pub fn new(api: Arc<ApiClient>, session: Arc<SessionManager>) -> Self {
        ShopApi { api, session }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Runs `call` with the current token, re-checking the session once on 401.
    async fn authorized<T, F, Fut>(&self, call: F) -> ClientResult<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        let token = self.session.access_token().await?;
        match call(token).await {
            Err(e) if e.is_unauthorized() => {
                warn!("Request rejected with 401, re-checking session");
                if !self.session.bootstrap().await.is_authenticated() {
                    return Err(ClientError::NotAuthenticated);
                }
                let token = self.session.access_token().await?;
                call(token).await
            }
            other => other,
        }
    }

    // =========================================================================
    // Profile
    // =========================================================================

    pub async fn profile(&self) -> ClientResult<Profile> {
        let api = &self.api;
        self.authorized(|t| async move { api.get_profile(&t).await }).await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> ClientResult<Profile> {
        if let Some(name) = update.name.as_deref() {
            validate_person_name(name)?;
        }
        if let Some(phone) = update.phone.as_deref() {
            validate_phone(phone)?;
        }
        let api = &self.api;
        self.authorized(|t| async move { api.update_profile(&t, update).await }).await
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    pub async fn brands(&self) -> ClientResult<Vec<Brand>> {
        let api = &self.api;
        self.authorized(|t| async move { api.list_brands(&t).await }).await
    }

    pub async fn create_brand(&self, input: &BrandInput) -> ClientResult<Brand> {
        validate_brand_name(&input.name)?;
        let api = &self.api;
        self.authorized(|t| async move { api.create_brand(&t, input).await }).await
    }

    pub async fn update_brand(&self, id: &str, input: &BrandInput) -> ClientResult<Brand> {
        validate_brand_name(&input.name)?;
        let api = &self.api;
        self.authorized(|t| async move { api.update_brand(&t, id, input).await }).await
    }

    pub async fn delete_brand(&self, id: &str) -> ClientResult<()> {
        let api = &self.api;
        self.authorized(|t| async move { api.delete_brand(&t, id).await }).await
    }

    pub async fn products(&self, brand_id: Option<&str>) -> ClientResult<Vec<Product>> {
        let api = &self.api;
        self.authorized(|t| async move { api.list_products(&t, brand_id).await }).await
    }

    pub async fn create_product(&self, input: &ProductInput) -> ClientResult<Product> {
        validate_product_name(&input.name)?;
        validate_price(input.price)?;
        let api = &self.api;
        self.authorized(|t| async move { api.create_product(&t, input).await }).await
    }

    pub async fn update_product(&self, id: &str, input: &ProductInput) -> ClientResult<Product> {
        validate_product_name(&input.name)?;
        validate_price(input.price)?;
        let api = &self.api;
        self.authorized(|t| async move { api.update_product(&t, id, input).await }).await
    }

    pub async fn delete_product(&self, id: &str) -> ClientResult<()> {
        let api = &self.api;
        self.authorized(|t| async move { api.delete_product(&t, id).await }).await
    }

    // =========================================================================
    // Bills
    // =========================================================================

    pub async fn bills(&self) -> ClientResult<Vec<Bill>> {
        let api = &self.api;
        self.authorized(|t| async move { api.list_bills(&t).await }).await
    }

    pub async fn bill(&self, id: &str) -> ClientResult<Bill> {
        let api = &self.api;
        self.authorized(|t| async move { api.get_bill(&t, id).await }).await
    }

    /// Validates the draft and submits it.
    pub async fn checkout(&self, draft: &BillDraft) -> ClientResult<Bill> {
        let request = draft.to_request()?;
        let api = &self.api;
        let bill = self
            .authorized(|t| {
                let request = &request;
                async move { api.create_bill(&t, request).await }
            })
            .await?;
        info!(bill_id = %bill.id, total = %bill.total(), "Bill created");
        Ok(bill)
    }

    pub async fn update_bill(&self, id: &str, update: &BillUpdate) -> ClientResult<Bill> {
        let api = &self.api;
        self.authorized(|t| async move { api.update_bill(&t, id, update).await }).await
    }

    /// Checks the payment against the bill, then records it.
    pub async fn record_payment(&self, bill: &Bill, amount: Money, method: PaymentMethod) -> ClientResult<Bill> {
        let payment = apply_payment(bill, amount, method)?;
        let api = &self.api;
        let updated = self
            .authorized(|t| {
                let payment = &payment;
                async move { api.record_payment(&t, &bill.id, payment).await }
            })
            .await?;
        info!(bill_id = %bill.id, amount = %amount, "Payment recorded");
        Ok(updated)
    }

    pub async fn send_reminder(&self, bill_id: &str) -> ClientResult<()> {
        let api = &self.api;
        self.authorized(|t| async move { api.send_reminder(&t, bill_id).await }).await
    }

    /// Sends a reminder for every bill of every candidate. Returns how many
    /// were sent; failures are logged and skipped.
    pub async fn send_reminders(&self, candidates: &[ReminderCandidate]) -> ClientResult<usize> {
        let mut sent = 0;
        for candidate in candidates {
            for bill_id in &candidate.bill_ids {
                match self.send_reminder(bill_id).await {
                    Ok(()) => sent += 1,
                    Err(ClientError::NotAuthenticated) => return Err(ClientError::NotAuthenticated),
                    Err(e) => warn!(bill_id = %bill_id, error = %e, "Reminder failed"),
                }
            }
        }
        Ok(sent)
    }

    // =========================================================================
    // Customers & Transactions
    // =========================================================================

    pub async fn customers(&self) -> ClientResult<Vec<Customer>> {
        let api = &self.api;
        self.authorized(|t| async move { api.list_customers(&t).await }).await
    }

    pub async fn create_customer(&self, customer: &Customer) -> ClientResult<Customer> {
        validate_customer_name(&customer.name)?;
        if let Some(phone) = customer.phone.as_deref() {
            validate_phone(phone)?;
        }
        let api = &self.api;
        self.authorized(|t| async move { api.create_customer(&t, customer).await }).await
    }

    pub async fn transactions(&self) -> ClientResult<Vec<Transaction>> {
        let api = &self.api;
        self.authorized(|t| async move { api.list_transactions(&t).await }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::{client_for, fake_backend, serve};
    use crate::storage::MemoryStore;

    async fn shop(entries: &[(&'static str, &'static str)]) -> (ShopApi, Arc<MemoryStore>) {
        let api = Arc::new(client_for(&serve(fake_backend()).await));
        let store = Arc::new(MemoryStore::with_entries(entries.iter().copied()));
        let session = Arc::new(SessionManager::new(store.clone(), api.clone()));
        (ShopApi::new(api, session), store)
    }

    #[tokio::test]
    async fn test_calls_use_stored_token() {
        let (shop, _) = shop(&[("token", "good")]).await;
        assert_eq!(shop.bills().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_no_token_is_not_authenticated() {
        let (shop, _) = shop(&[]).await;
        assert!(matches!(shop.bills().await, Err(ClientError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn test_401_rechecks_session_and_gives_up_when_refresh_fails() {
        let (shop, store) = shop(&[("token", "stale"), ("refreshToken", "revoked")]).await;

        assert!(matches!(shop.bills().await, Err(ClientError::NotAuthenticated)));
        assert!(store.snapshot().await.is_empty());
        assert!(!shop.session().flags().is_authenticated);
    }

    #[tokio::test]
    async fn test_payment_rules_checked_before_request() {
        let (shop, _) = shop(&[("token", "good")]).await;
        let bills = shop.bills().await.unwrap();

        // b1 is fully paid in the fake backend.
        let err = shop
            .record_payment(&bills[0], Money::from_minor(100), PaymentMethod::Cash)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Core(_)));

        let updated = shop
            .record_payment(&bills[1], Money::from_minor(10_000), PaymentMethod::Online)
            .await
            .unwrap();
        assert_eq!(updated.id, "b2");
    }

    #[tokio::test]
    async fn test_checkout_rejects_empty_draft() {
        let (shop, _) = shop(&[("token", "good")]).await;
        let err = shop.checkout(&BillDraft::new()).await.unwrap_err();
        assert!(matches!(err, ClientError::Core(shopbill_core::CoreError::EmptyBill)));
    }

    #[tokio::test]
    async fn test_create_product_validates() {
        let (shop, _) = shop(&[("token", "good")]).await;
        let input = ProductInput {
            name: "  ".into(),
            brand_id: "br1".into(),
            price: Money::from_minor(100),
            stock: None,
            unit: None,
        };
        assert!(matches!(shop.create_product(&input).await, Err(ClientError::Core(_))));

        let products: Vec<Product> = shop.products(Some("br1")).await.unwrap();
        assert_eq!(products.len(), 1);
    }
}
