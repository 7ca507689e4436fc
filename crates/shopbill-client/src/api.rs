//! # Backend API Client
//!
//! Typed calls over the billing backend's REST routes.
//!
//! ## Request Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  typed call (list_bills, refresh, ...)                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  base_url + path, Bearer token when given, JSON body                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  reqwest ──► status                                                     │
//! │               ├── 2xx  ──► body ──► strip { "data": ... } ──► T         │
//! │               ├── 401  ──► ClientError::Unauthorized                    │
//! │               └── else ──► ClientError::Http { status, message }        │
//! │  transport failure ──► Timeout / Network                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Calls take the bearer token as an argument; where it comes from is the
//! session layer's business (see [`crate::resources::ShopApi`]).

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;

use shopbill_core::session::{AuthGrant, RefreshedTokens};
use shopbill_core::types::{
    Bill, BillUpdate, Brand, BrandInput, Customer, LoginRequest, NewBill, PaymentRequest, Product,
    ProductInput, Profile, ProfileUpdate, RegisterRequest, Transaction,
};

use crate::config::ApiSettings;
use crate::error::{ClientError, ClientResult};
use crate::session::AuthBackend;

// =============================================================================
// Body Helpers
// =============================================================================

/// Strips a `{ "data": ... }` envelope if present.
fn unwrap_data(value: Value) -> Value {
    match value {
        Value::Object(mut map) => match map.remove("data") {
            Some(inner) => inner,
            None => Value::Object(map),
        },
        other => other,
    }
}

/// Profile routes answer either the profile or `{ "user": profile }`.
fn unwrap_user(value: Value) -> Value {
    match unwrap_data(value) {
        Value::Object(mut map) => match map.remove("user") {
            Some(user @ Value::Object(_)) => user,
            Some(other) => {
                map.insert("user".to_string(), other);
                Value::Object(map)
            }
            None => Value::Object(map),
        },
        other => other,
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> ClientResult<T> {
    Ok(serde_json::from_value(unwrap_data(value))?)
}

/// Best human-readable message from an error body.
fn error_message(body: &str, status: reqwest::StatusCode) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for key in ["message", "error"] {
            if let Some(msg) = value.get(key).and_then(Value::as_str) {
                return msg.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_string()
    } else {
        trimmed.chars().take(200).collect()
    }
}

// =============================================================================
// ApiClient
// =============================================================================

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    /// Always ends with `/` so relative joins keep the path prefix.
    base: Url,
    probe_timeout: Duration,
}

impl ApiClient {
    pub fn new(settings: &ApiSettings) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()?;
        Self::with_http(settings, http)
    }

    /// Uses a caller-built reqwest client.
    pub fn with_http(settings: &ApiSettings, http: reqwest::Client) -> ClientResult<Self> {
        let mut base = settings.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Ok(ApiClient {
            http,
            base: Url::parse(&base)?,
            probe_timeout: settings.probe_timeout(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn request(&self, method: Method, path: &str, token: Option<&str>) -> ClientResult<RequestBuilder> {
        let url = self.base.join(path.trim_start_matches('/'))?;
        let mut request = self.http.request(method, url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        Ok(request)
    }

    /// Sends and returns the JSON body (`Null` when empty).
    async fn execute(&self, request: RequestBuilder) -> ClientResult<Value> {
        let response = request.send().await?;
        let status = response.status();
        let url = response.url().path().to_string();
        let body = response.text().await?;

        debug!(path = %url, status = status.as_u16(), "Backend responded");

        if !status.is_success() {
            return Err(ClientError::from_status(status.as_u16(), error_message(&body, status)));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn get<T: DeserializeOwned>(&self, token: &str, path: &str) -> ClientResult<T> {
        decode(self.execute(self.request(Method::GET, path, Some(token))?).await?)
    }

    async fn send_json<B, T>(&self, method: Method, token: Option<&str>, path: &str, body: &B) -> ClientResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let request = self.request(method, path, token)?.json(body);
        decode(self.execute(request).await?)
    }

    async fn delete(&self, token: &str, path: &str) -> ClientResult<()> {
        self.execute(self.request(Method::DELETE, path, Some(token))?).await?;
        Ok(())
    }

    // =========================================================================
    // Auth
    // =========================================================================

    pub async fn login(&self, credentials: &LoginRequest) -> ClientResult<AuthGrant> {
        let body: Value = self.send_json(Method::POST, None, "auth/login", credentials).await?;
        Ok(AuthGrant::from_response(&body)?)
    }

    pub async fn register(&self, registration: &RegisterRequest) -> ClientResult<AuthGrant> {
        let body: Value = self.send_json(Method::POST, None, "auth/register", registration).await?;
        Ok(AuthGrant::from_response(&body)?)
    }

    /// `GET /auth/profile` under the probe deadline.
    ///
    /// Any 2xx answer accepts the token. The profile comes back only when the
    /// body decodes; an odd body is not a reason to sign out.
    pub async fn probe_profile(&self, token: &str) -> ClientResult<Option<Profile>> {
        let request = self
            .request(Method::GET, "auth/profile", Some(token))?
            .timeout(self.probe_timeout);
        let body = self.execute(request).await?;
        match serde_json::from_value(unwrap_user(body)) {
            Ok(profile) => Ok(Some(profile)),
            Err(e) => {
                debug!(error = %e, "Profile body did not decode, token still accepted");
                Ok(None)
            }
        }
    }

    /// `POST /auth/refresh`. A body without an access token is an error.
    pub async fn refresh(&self, refresh_token: &str) -> ClientResult<RefreshedTokens> {
        let body: Value = self
            .send_json(Method::POST, None, "auth/refresh", &json!({ "refreshToken": refresh_token }))
            .await?;
        Ok(RefreshedTokens::from_response(&body)?)
    }

    pub async fn logout(&self, token: &str) -> ClientResult<()> {
        self.execute(self.request(Method::POST, "auth/logout", Some(token))?).await?;
        Ok(())
    }

    // =========================================================================
    // Profile
    // =========================================================================

    pub async fn get_profile(&self, token: &str) -> ClientResult<Profile> {
        let body = self.execute(self.request(Method::GET, "auth/profile", Some(token))?).await?;
        Ok(serde_json::from_value(unwrap_user(body))?)
    }

    pub async fn update_profile(&self, token: &str, update: &ProfileUpdate) -> ClientResult<Profile> {
        let body: Value = self.send_json(Method::PUT, Some(token), "auth/profile", update).await?;
        Ok(serde_json::from_value(unwrap_user(body))?)
    }

    // =========================================================================
    // Brands
    // =========================================================================

    pub async fn list_brands(&self, token: &str) -> ClientResult<Vec<Brand>> {
        self.get(token, "brands").await
    }

    pub async fn create_brand(&self, token: &str, input: &BrandInput) -> ClientResult<Brand> {
        self.send_json(Method::POST, Some(token), "brands", input).await
    }

    pub async fn update_brand(&self, token: &str, id: &str, input: &BrandInput) -> ClientResult<Brand> {
        self.send_json(Method::PUT, Some(token), &format!("brands/{}", id), input).await
    }

    pub async fn delete_brand(&self, token: &str, id: &str) -> ClientResult<()> {
        self.delete(token, &format!("brands/{}", id)).await
    }

    // =========================================================================
    // Products
    // =========================================================================

    /// All products, or those of one brand.
    pub async fn list_products(&self, token: &str, brand_id: Option<&str>) -> ClientResult<Vec<Product>> {
        let mut request = self.request(Method::GET, "products", Some(token))?;
        if let Some(brand) = brand_id {
            request = request.query(&[("brand", brand)]);
        }
        decode(self.execute(request).await?)
    }

    pub async fn create_product(&self, token: &str, input: &ProductInput) -> ClientResult<Product> {
        self.send_json(Method::POST, Some(token), "products", input).await
    }

    pub async fn update_product(&self, token: &str, id: &str, input: &ProductInput) -> ClientResult<Product> {
        self.send_json(Method::PUT, Some(token), &format!("products/{}", id), input).await
    }

    pub async fn delete_product(&self, token: &str, id: &str) -> ClientResult<()> {
        self.delete(token, &format!("products/{}", id)).await
    }

    // =========================================================================
    // Bills
    // =========================================================================

    pub async fn list_bills(&self, token: &str) -> ClientResult<Vec<Bill>> {
        self.get(token, "bills").await
    }

    pub async fn get_bill(&self, token: &str, id: &str) -> ClientResult<Bill> {
        self.get(token, &format!("bills/{}", id)).await
    }

    /// Checkout.
    pub async fn create_bill(&self, token: &str, bill: &NewBill) -> ClientResult<Bill> {
        self.send_json(Method::POST, Some(token), "bills", bill).await
    }

    pub async fn update_bill(&self, token: &str, id: &str, update: &BillUpdate) -> ClientResult<Bill> {
        self.send_json(Method::PUT, Some(token), &format!("bills/{}", id), update).await
    }

    /// Returns the bill with the payment applied.
    pub async fn record_payment(&self, token: &str, bill_id: &str, payment: &PaymentRequest) -> ClientResult<Bill> {
        self.send_json(Method::POST, Some(token), &format!("bills/{}/payments", bill_id), payment)
            .await
    }

    pub async fn send_reminder(&self, token: &str, bill_id: &str) -> ClientResult<()> {
        let path = format!("bills/{}/reminder", bill_id);
        self.execute(self.request(Method::POST, &path, Some(token))?).await?;
        Ok(())
    }

    // =========================================================================
    // Customers & Transactions
    // =========================================================================

    pub async fn list_customers(&self, token: &str) -> ClientResult<Vec<Customer>> {
        self.get(token, "customers").await
    }

    pub async fn create_customer(&self, token: &str, customer: &Customer) -> ClientResult<Customer> {
        self.send_json(Method::POST, Some(token), "customers", customer).await
    }

    pub async fn list_transactions(&self, token: &str) -> ClientResult<Vec<Transaction>> {
        self.get(token, "transactions").await
    }
}

#[async_trait]
impl AuthBackend for ApiClient {
    async fn probe_profile(&self, token: &str) -> ClientResult<Option<Profile>> {
        ApiClient::probe_profile(self, token).await
    }

    async fn refresh(&self, refresh_token: &str) -> ClientResult<RefreshedTokens> {
        ApiClient::refresh(self, refresh_token).await
    }

    async fn login(&self, credentials: &LoginRequest) -> ClientResult<AuthGrant> {
        ApiClient::login(self, credentials).await
    }

    async fn register(&self, registration: &RegisterRequest) -> ClientResult<AuthGrant> {
        ApiClient::register(self, registration).await
    }

    async fn logout(&self, token: &str) -> ClientResult<()> {
        ApiClient::logout(self, token).await
    }
}

// =============================================================================
// Unit Tests (in-process fake backend)
// =============================================================================
