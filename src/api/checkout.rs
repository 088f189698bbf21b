use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::api::auth::CurrentUser;
use crate::api::cart::session_owner;
use crate::api::AppState;
use crate::checkout::{CheckoutSession, WebhookOutcome};
use crate::domain::aggregates::CartOwner;
use crate::error::{AppError, Result};

const SIGNATURE_HEADER: &str = "stripe-signature";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/checkout", post(checkout_user))
        .route("/checkout/session/:token", post(checkout_session))
        .route("/webhooks/stripe", post(stripe_webhook))
}

fn session_json(session: CheckoutSession) -> Json<Value> {
    Json(json!({ "session_id": session.id, "url": session.url }))
}

async fn checkout_user(State(s): State<AppState>, CurrentUser(actor): CurrentUser) -> Result<Json<Value>> {
    Ok(session_json(s.checkout.checkout(CartOwner::User(actor.user_id)).await?))
}

async fn checkout_session(State(s): State<AppState>, Path(token): Path<String>) -> Result<Json<Value>> {
    Ok(session_json(s.checkout.checkout(session_owner(token)?).await?))
}

/// The body must reach signature verification byte for byte.
async fn stripe_webhook(State(s): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Json<Value>> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Signature("missing Stripe-Signature header".into()))?;
    let reply = match s.webhooks.process(&body, signature).await? {
        WebhookOutcome::Ignored { event_type } => json!({ "status": "ignored", "event_type": event_type }),
        WebhookOutcome::Recorded { order_id, order_number } => json!({ "status": "recorded", "order_id": order_id, "order_number": order_number }),
        WebhookOutcome::Duplicate { order_id } => json!({ "status": "duplicate", "order_id": order_id }),
    };
    Ok(Json(reply))
}
