//! Profiles, user reports and the chatbot.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::api::auth::CurrentUser;
use crate::api::AppState;
use crate::domain::aggregates::{EmailReport, User};
use crate::error::Result;
use crate::services::reports::ReportRequest;
use crate::services::users::ProfileRequest;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users/me", get(get_profile).post(register).put(update_profile))
        .route("/emails/send", post(send_report))
        .route("/chatbot/message", post(chat))
}

async fn register(State(s): State<AppState>, CurrentUser(actor): CurrentUser, Json(r): Json<ProfileRequest>) -> Result<(StatusCode, Json<User>)> {
    Ok((StatusCode::CREATED, Json(s.users.register(actor, r).await?)))
}

async fn get_profile(State(s): State<AppState>, CurrentUser(actor): CurrentUser) -> Result<Json<User>> {
    Ok(Json(s.users.get(actor).await?))
}

async fn update_profile(State(s): State<AppState>, CurrentUser(actor): CurrentUser, Json(r): Json<ProfileRequest>) -> Result<Json<User>> {
    Ok(Json(s.users.update(actor, r).await?))
}

async fn send_report(State(s): State<AppState>, Json(r): Json<ReportRequest>) -> Result<(StatusCode, Json<EmailReport>)> {
    Ok((StatusCode::CREATED, Json(s.reports.send(r).await?)))
}

#[derive(Debug, Deserialize)]
struct ChatMessage { message: String }

/// Failures are answered in the same `{"reply": ...}` shape so the chat
/// widget can show them inline.
async fn chat(State(s): State<AppState>, Json(m): Json<ChatMessage>) -> Response {
    match s.chatbot.reply(&m.message).await {
        Ok(reply) => Json(json!({ "reply": reply })).into_response(),
        Err(e) => {
            tracing::debug!(error = %e, "chatbot could not answer");
            (e.status(), Json(json!({ "reply": e.detail() }))).into_response()
        }
    }
}
