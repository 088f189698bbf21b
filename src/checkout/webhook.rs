//! Payment provider callbacks: signature check and order reconciliation.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::checkout::metadata::{self, CheckoutMetadata};
use crate::checkout::service::{ADDRESS_FIELD, CITY_FIELD, POSTAL_CODE_FIELD};
use crate::config::PaymentSettings;
use crate::domain::aggregates::{new_order_number, CartOwner, Order, OrderItem, PaidCheckout, ShippingAddress, User};
use crate::error::{AppError, Result};
use crate::notify::{publish_all, Notifier};
use crate::store::{CheckoutCompletion, CompletionOutcome, StockDecrement, Store};

type HmacSha256 = Hmac<Sha256>;

pub const COMPLETED_EVENT: &str = "checkout.session.completed";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("webhook secret is not configured")]
    MissingSecret,
    #[error("signature header is malformed")]
    MalformedHeader,
    #[error("signature timestamp is outside the tolerance window")]
    Expired,
    #[error("no signature matches the payload")]
    Mismatch,
}

/// Checks a `t=<unix>,v1=<hex>[,v1=<hex>...]` header against the raw body.
pub fn verify_signature(payload: &[u8], header: &str, secret: &str, tolerance_secs: i64, now: i64) -> std::result::Result<(), SignatureError> {
    if secret.is_empty() { return Err(SignatureError::MissingSecret); }

    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<&str> = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = v.parse().ok(),
            Some(("v1", v)) => signatures.push(v),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
    if signatures.is_empty() { return Err(SignatureError::MalformedHeader); }
    if (now - timestamp).abs() > tolerance_secs { return Err(SignatureError::Expired); }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::MissingSecret)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let matched = signatures.iter().filter_map(|s| hex::decode(s).ok()).any(|expected| mac.clone().verify_slice(&expected).is_ok());
    if matched { Ok(()) } else { Err(SignatureError::Mismatch) }
}

#[derive(Debug, Deserialize)]
struct Event {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData { object: serde_json::Value }

#[derive(Debug, Deserialize)]
struct CompletedSession {
    id: String,
    payment_intent: Option<String>,
    amount_total: Option<i64>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    customer_details: Option<CustomerDetails>,
    #[serde(default)]
    custom_fields: Vec<SessionCustomField>,
    total_details: Option<TotalDetails>,
}

#[derive(Debug, Default, Deserialize)]
struct CustomerDetails {
    email: Option<String>,
    phone: Option<String>,
    address: Option<Address>,
}

#[derive(Debug, Default, Clone, Deserialize)]
struct Address {
    line1: Option<String>,
    line2: Option<String>,
    postal_code: Option<String>,
    city: Option<String>,
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionCustomField {
    key: String,
    text: Option<TextValue>,
}

#[derive(Debug, Deserialize)]
struct TextValue { value: Option<String> }

#[derive(Debug, Deserialize)]
struct TotalDetails { amount_discount: Option<i64> }

impl CompletedSession {
    fn custom_field(&self, key: &str) -> Option<String> {
        self.custom_fields.iter().find(|f| f.key == key)
            .and_then(|f| f.text.as_ref()).and_then(|t| t.value.clone())
            .filter(|v| !v.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Event type this service does not act on.
    Ignored { event_type: String },
    Recorded { order_id: Uuid, order_number: String },
    /// A repeated delivery of an already recorded checkout.
    Duplicate { order_id: Uuid },
}

pub struct WebhookProcessor {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    settings: PaymentSettings,
}

impl WebhookProcessor {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, settings: PaymentSettings) -> Self {
        Self { store, notifier, settings }
    }

    #[instrument(skip_all, fields(payload_len = payload.len()))]
    pub async fn process(&self, payload: &[u8], signature: &str) -> Result<WebhookOutcome> {
        verify_signature(payload, signature, &self.settings.webhook_secret, self.settings.webhook_tolerance_secs, Utc::now().timestamp())
            .map_err(|e| {
                warn!(error = %e, "webhook rejected");
                AppError::Signature(e.to_string())
            })?;

        let event: Event = serde_json::from_slice(payload).map_err(|e| AppError::BadRequest(format!("invalid event payload: {e}")))?;
        if event.kind != COMPLETED_EVENT {
            debug!(event_id = %event.id, event_type = %event.kind, "event ignored");
            return Ok(WebhookOutcome::Ignored { event_type: event.kind });
        }
        let session: CompletedSession = serde_json::from_value(event.data.object)
            .map_err(|e| AppError::BadRequest(format!("invalid checkout session: {e}")))?;
        info!(event_id = %event.id, session_id = %session.id, "checkout completion verified");

        self.record(session).await
    }

    #[instrument(skip_all, fields(session_id = %session.id))]
    async fn record(&self, session: CompletedSession) -> Result<WebhookOutcome> {
        // Retries of a recorded session must not depend on the catalog still matching.
        if let Some(existing) = self.store.find_order_by_checkout_session(&session.id).await? {
            info!(order_id = %existing.id, "duplicate delivery skipped");
            return Ok(WebhookOutcome::Duplicate { order_id: existing.id });
        }

        let meta = metadata::decode(&session.metadata)?;
        let user = self.resolve_user(&meta).await?;
        let details = session.customer_details.as_ref();

        let email = user.as_ref().map(|u| u.email.clone())
            .or_else(|| details.and_then(|d| d.email.clone()))
            .ok_or_else(|| AppError::BadRequest("checkout session carries no customer email".into()))?;

        let mut items = Vec::with_capacity(meta.lines.len());
        let mut stock = Vec::with_capacity(meta.lines.len());
        for line in &meta.lines {
            let product = self.store.get_product(line.product_id).await?
                .ok_or_else(|| AppError::BadRequest(format!("paid product {} does not exist", line.product_id)))?;
            let color = product.color(&line.color).map(|c| c.name.clone()).unwrap_or_else(|_| line.color.clone());
            let size = if product.section.is_sized() { line.size.clone() } else { None };
            items.push(OrderItem {
                id: Uuid::now_v7(), product_id: product.id, name: product.name.clone(), section: product.section,
                size: size.clone(), color: color.clone(), quantity: line.quantity, unit_price: product.effective_price(),
            });
            stock.push(StockDecrement { product_id: product.id, color, size, quantity: line.quantity });
        }

        let discount = session.total_details.as_ref().and_then(|t| t.amount_discount).map(cents).unwrap_or(Decimal::ZERO);
        let total = match session.amount_total {
            Some(amount) => cents(amount),
            None => items.iter().map(|i| i.unit_price * Decimal::from(i.quantity)).sum::<Decimal>() - discount,
        };

        let redeem_card = match &user {
            Some(u) if discount > Decimal::ZERO => self.store.active_reward_card(u.id).await?.map(|c| c.id),
            _ => None,
        };
        let clear_cart = match (&user, &meta.cart_session) {
            (Some(u), _) => Some(CartOwner::User(u.id)),
            (None, Some(token)) => Some(CartOwner::Session(token.clone())),
            (None, None) => None,
        };

        let checkout = PaidCheckout {
            checkout_session_id: session.id.clone(),
            payment_intent: session.payment_intent.clone(),
            user_id: user.as_ref().map(|u| u.id),
            email,
            phone: details.and_then(|d| d.phone.clone()),
            shipping_address: shipping_address(&session, user.as_ref()),
            total,
            discount,
        };
        let mut order = Order::paid(new_order_number(), checkout, items)?;
        let mut events = order.take_events();
        let (order_id, order_number) = (order.id, order.order_number.clone());

        match self.store.complete_checkout(CheckoutCompletion { order, stock, clear_cart, redeem_card }).await? {
            CompletionOutcome::AlreadyRecorded { order_id } => {
                info!(%order_id, "duplicate delivery skipped");
                Ok(WebhookOutcome::Duplicate { order_id })
            }
            CompletionOutcome::Recorded { stock_events } => {
                info!(%order_id, %order_number, %total, "order recorded");
                for e in &stock_events {
                    warn!(event = ?e, "oversold; stock clamped at zero");
                }
                events.extend(stock_events);
                publish_all(self.notifier.as_ref(), &events).await;
                Ok(WebhookOutcome::Recorded { order_id, order_number })
            }
        }
    }

    /// A user id that no longer resolves is recorded as an anonymous purchase.
    async fn resolve_user(&self, meta: &CheckoutMetadata) -> Result<Option<User>> {
        let Some(id) = meta.user_id else { return Ok(None) };
        let user = self.store.get_user(id).await?;
        if user.is_none() { warn!(user_id = %id, "paying user not found; recording order as anonymous"); }
        Ok(user)
    }
}

fn cents(amount: i64) -> Decimal { Decimal::new(amount, 2) }

/// Registered users with a stored address confirm it in prefilled fields;
/// everyone else types it into the provider's address form. A country the
/// provider did not collect falls back to the one on the profile.
fn shipping_address(session: &CompletedSession, user: Option<&User>) -> ShippingAddress {
    let collected = session.customer_details.as_ref().and_then(|d| d.address.clone()).unwrap_or_default();
    let country = collected.country.clone().or_else(|| user.and_then(|u| u.country.clone()));
    if user.is_some() {
        if let (Some(city), Some(line1), Some(postal_code)) =
            (session.custom_field(CITY_FIELD), session.custom_field(ADDRESS_FIELD), session.custom_field(POSTAL_CODE_FIELD))
        {
            return ShippingAddress { line1: Some(line1), line2: None, postal_code: Some(postal_code), city: Some(city), country };
        }
    }
    ShippingAddress { line1: collected.line1, line2: collected.line2, postal_code: collected.postal_code, city: collected.city, country }
}
