//! Carts of signed-in users (`/cart`) and of anonymous browser sessions
//! (`/cart/session/:token`).

use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};

use crate::api::auth::CurrentUser;
use crate::api::AppState;
use crate::domain::aggregates::{Cart, CartOwner};
use crate::error::{AppError, Result};
use crate::services::carts::AddItemRequest;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/cart", get(get_user_cart).delete(clear_user_cart))
        .route("/cart/items", post(add_user_item))
        .route("/cart/items/:index", delete(remove_user_item))
        .route("/cart/session/:token", get(get_session_cart).delete(clear_session_cart))
        .route("/cart/session/:token/items", post(add_session_item))
        .route("/cart/session/:token/items/:index", delete(remove_session_item))
}

pub(crate) fn session_owner(token: String) -> Result<CartOwner> {
    let token = token.trim();
    if token.is_empty() || token.len() > 128 {
        return Err(AppError::BadRequest("Invalid cart session".into()));
    }
    Ok(CartOwner::Session(token.to_string()))
}

async fn get_user_cart(State(s): State<AppState>, CurrentUser(actor): CurrentUser) -> Result<Json<Cart>> {
    Ok(Json(s.carts.get(&CartOwner::User(actor.user_id)).await?))
}

async fn add_user_item(State(s): State<AppState>, CurrentUser(actor): CurrentUser, Json(r): Json<AddItemRequest>) -> Result<Json<Cart>> {
    Ok(Json(s.carts.add(&CartOwner::User(actor.user_id), r).await?))
}

async fn remove_user_item(State(s): State<AppState>, CurrentUser(actor): CurrentUser, Path(index): Path<usize>) -> Result<Json<Cart>> {
    Ok(Json(s.carts.remove_one(&CartOwner::User(actor.user_id), index).await?))
}

async fn clear_user_cart(State(s): State<AppState>, CurrentUser(actor): CurrentUser) -> Result<Json<Cart>> {
    Ok(Json(s.carts.clear(&CartOwner::User(actor.user_id)).await?))
}

async fn get_session_cart(State(s): State<AppState>, Path(token): Path<String>) -> Result<Json<Cart>> {
    Ok(Json(s.carts.get(&session_owner(token)?).await?))
}

async fn add_session_item(State(s): State<AppState>, Path(token): Path<String>, Json(r): Json<AddItemRequest>) -> Result<Json<Cart>> {
    Ok(Json(s.carts.add(&session_owner(token)?, r).await?))
}

async fn remove_session_item(State(s): State<AppState>, Path((token, index)): Path<(String, usize)>) -> Result<Json<Cart>> {
    Ok(Json(s.carts.remove_one(&session_owner(token)?, index).await?))
}

async fn clear_session_cart(State(s): State<AppState>, Path(token): Path<String>) -> Result<Json<Cart>> {
    Ok(Json(s.carts.clear(&session_owner(token)?).await?))
}
