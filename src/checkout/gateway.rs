//! Hosted checkout provider.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::PaymentSettings;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("payment provider is not configured")]
    NotConfigured,
    #[error("payment provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("payment provider rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItem {
    pub name: String,
    pub currency: String,
    pub unit_amount: i64,
    pub quantity: u32,
}

/// Text field shown on the hosted page, prefilled with a stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomField {
    pub key: String,
    pub label: String,
    pub default_value: String,
}

#[derive(Debug, Clone, Default)]
pub struct CheckoutSessionRequest {
    pub line_items: Vec<LineItem>,
    pub metadata: BTreeMap<String, String>,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: Option<String>,
    pub custom_fields: Vec<CustomField>,
    /// Countries the provider collects a shipping address for. Empty means no collection.
    pub allowed_countries: Vec<String>,
    pub collect_phone: bool,
    pub coupon: Option<String>,
}

impl CheckoutSessionRequest {
    /// Flattens the request into the provider's bracketed form encoding.
    pub fn to_form(&self) -> Vec<(String, String)> {
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), self.success_url.clone()),
            ("cancel_url".to_string(), self.cancel_url.clone()),
        ];
        for (i, item) in self.line_items.iter().enumerate() {
            let p = format!("line_items[{i}]");
            form.push((format!("{p}[price_data][currency]"), item.currency.to_lowercase()));
            form.push((format!("{p}[price_data][product_data][name]"), item.name.clone()));
            form.push((format!("{p}[price_data][unit_amount]"), item.unit_amount.to_string()));
            form.push((format!("{p}[quantity]"), item.quantity.to_string()));
        }
        for (k, v) in &self.metadata {
            form.push((format!("metadata[{k}]"), v.clone()));
        }
        if let Some(email) = &self.customer_email {
            form.push(("customer_email".into(), email.clone()));
        }
        for (i, field) in self.custom_fields.iter().enumerate() {
            let p = format!("custom_fields[{i}]");
            form.push((format!("{p}[key]"), field.key.clone()));
            form.push((format!("{p}[label][type]"), "custom".into()));
            form.push((format!("{p}[label][custom]"), field.label.clone()));
            form.push((format!("{p}[type]"), "text".into()));
            form.push((format!("{p}[text][default_value]"), field.default_value.clone()));
        }
        for (i, country) in self.allowed_countries.iter().enumerate() {
            form.push((format!("shipping_address_collection[allowed_countries][{i}]"), country.clone()));
        }
        if self.collect_phone {
            form.push(("phone_number_collection[enabled]".into(), "true".into()));
        }
        if let Some(coupon) = &self.coupon {
            form.push(("discounts[0][coupon]".into(), coupon.clone()));
        }
        form
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a single-use percentage coupon and returns its id.
    async fn create_coupon(&self, percent_off: i32) -> Result<String, GatewayError>;
    async fn create_checkout_session(&self, request: &CheckoutSessionRequest) -> Result<CheckoutSession, GatewayError>;
}

/// Stripe REST client.
#[derive(Clone)]
pub struct StripeGateway {
    http: reqwest::Client,
    api_base: String,
    secret_key: String,
}

#[derive(Deserialize)]
struct StripeErrorBody { error: StripeErrorDetail }
#[derive(Deserialize)]
struct StripeErrorDetail { message: Option<String> }

#[derive(Deserialize)]
struct Coupon { id: String }

impl StripeGateway {
    pub fn new(settings: &PaymentSettings) -> Self {
        Self { http: reqwest::Client::new(), api_base: settings.api_base.trim_end_matches('/').to_string(), secret_key: settings.stripe_secret_key.clone() }
    }

    async fn post<T: for<'de> Deserialize<'de>>(&self, path: &str, form: &[(String, String)]) -> Result<T, GatewayError> {
        if self.secret_key.is_empty() { return Err(GatewayError::NotConfigured); }
        let resp = self.http.post(format!("{}{path}", self.api_base)).bearer_auth(&self.secret_key).form(form).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.json::<StripeErrorBody>().await.ok().and_then(|b| b.error.message).unwrap_or_else(|| status.to_string());
            return Err(GatewayError::Rejected { status: status.as_u16(), message });
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self))]
    async fn create_coupon(&self, percent_off: i32) -> Result<String, GatewayError> {
        let form = [("percent_off".to_string(), percent_off.to_string()), ("duration".to_string(), "once".to_string())];
        let coupon: Coupon = self.post("/v1/coupons", &form).await?;
        debug!(coupon = %coupon.id, "coupon created");
        Ok(coupon.id)
    }

    #[instrument(skip_all, fields(lines = request.line_items.len()))]
    async fn create_checkout_session(&self, request: &CheckoutSessionRequest) -> Result<CheckoutSession, GatewayError> {
        self.post("/v1/checkout/sessions", &request.to_form()).await
    }
}
