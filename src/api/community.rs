use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use uuid::Uuid;

use crate::api::auth::{AdminUser, CurrentUser, MaybeUser};
use crate::api::AppState;
use crate::domain::aggregates::{RewardCard, UserProduct};
use crate::error::Result;
use crate::services::rewards::RedeemRequest;
use crate::services::user_products::{SubmissionRequest, UserProductView};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/user-products", get(list_accepted).post(submit))
        .route("/user-products/mine", get(my_submissions))
        .route("/user-products/pending", get(pending))
        .route("/user-products/:id/approve", post(approve))
        .route("/user-products/:id/reject", post(reject))
        .route("/user-products/:id/vote", post(vote))
        .route("/reward-cards", get(my_cards).post(redeem))
}

async fn list_accepted(State(s): State<AppState>, MaybeUser(actor): MaybeUser) -> Result<Json<Vec<UserProductView>>> {
    Ok(Json(s.user_products.list_accepted(actor).await?))
}

async fn submit(State(s): State<AppState>, CurrentUser(actor): CurrentUser, Json(r): Json<SubmissionRequest>) -> Result<(StatusCode, Json<UserProduct>)> {
    Ok((StatusCode::CREATED, Json(s.user_products.create(actor, r).await?)))
}

async fn my_submissions(State(s): State<AppState>, CurrentUser(actor): CurrentUser) -> Result<Json<Vec<UserProduct>>> {
    Ok(Json(s.user_products.my_submissions(actor).await?))
}

async fn pending(State(s): State<AppState>, _: AdminUser) -> Result<Json<Vec<UserProduct>>> {
    Ok(Json(s.user_products.pending().await?))
}

async fn approve(State(s): State<AppState>, _: AdminUser, Path(id): Path<Uuid>) -> Result<Json<UserProduct>> {
    Ok(Json(s.user_products.approve(id).await?))
}

async fn reject(State(s): State<AppState>, _: AdminUser, Path(id): Path<Uuid>) -> Result<Json<UserProduct>> {
    Ok(Json(s.user_products.reject(id).await?))
}

async fn vote(State(s): State<AppState>, CurrentUser(actor): CurrentUser, Path(id): Path<Uuid>) -> Result<Json<UserProduct>> {
    Ok(Json(s.user_products.vote(actor, id).await?))
}

async fn my_cards(State(s): State<AppState>, CurrentUser(actor): CurrentUser) -> Result<Json<Vec<RewardCard>>> {
    Ok(Json(s.rewards.my_cards(actor).await?))
}

async fn redeem(State(s): State<AppState>, CurrentUser(actor): CurrentUser, Json(r): Json<RedeemRequest>) -> Result<(StatusCode, Json<RewardCard>)> {
    Ok((StatusCode::CREATED, Json(s.rewards.redeem(actor, r).await?)))
}
