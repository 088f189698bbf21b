//! Artist profiles and verification requests.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::auth::CurrentUser;
use crate::api::AppState;
use crate::domain::aggregates::{Artist, Verification};
use crate::error::Result;
use crate::services::admin::YearQuery;
use crate::services::artists::{ArtistCard, ArtistDashboard, ArtistMonthlySales, ArtistRegisterRequest};
use crate::services::verification::VerificationRequest;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/artists/register", post(register))
        .route("/artists/dashboard", get(dashboard))
        .route("/artists/sales/monthly", get(monthly_sales))
        .route("/artists/main", get(main_view))
        .route("/verification/send", post(send_verification))
}

async fn register(State(s): State<AppState>, CurrentUser(actor): CurrentUser, Json(r): Json<ArtistRegisterRequest>) -> Result<(StatusCode, Json<Artist>)> {
    Ok((StatusCode::CREATED, Json(s.artists.register(actor, r).await?)))
}

async fn dashboard(State(s): State<AppState>, CurrentUser(actor): CurrentUser, Query(q): Query<YearQuery>) -> Result<Json<ArtistDashboard>> {
    Ok(Json(s.artists.dashboard(actor, q.year).await?))
}

async fn monthly_sales(State(s): State<AppState>, CurrentUser(actor): CurrentUser, Query(q): Query<YearQuery>) -> Result<Json<Vec<ArtistMonthlySales>>> {
    Ok(Json(s.artists.monthly_sales(actor, q.year).await?))
}

async fn main_view(State(s): State<AppState>) -> Result<Json<Vec<ArtistCard>>> {
    Ok(Json(s.artists.main_view().await?))
}

async fn send_verification(State(s): State<AppState>, CurrentUser(actor): CurrentUser, Json(r): Json<VerificationRequest>) -> Result<(StatusCode, Json<Verification>)> {
    Ok((StatusCode::CREATED, Json(s.verification.request(actor, r).await?)))
}
