use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::auth::{AdminUser, CurrentUser, MaybeUser};
use crate::api::AppState;
use crate::domain::aggregates::Order;
use crate::error::Result;
use crate::services::orders::{OrderQuery, StatusRequest};
use crate::services::returns::{ReturnRequestDto, ReturnView};
use crate::services::PaginatedResponse;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders))
        .route("/orders/mine", get(my_orders))
        .route("/orders/by-number/:number", get(order_by_number))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/status", put(update_status))
        .route("/returns/:order_id", get(get_return).post(create_return))
}

async fn my_orders(State(s): State<AppState>, CurrentUser(actor): CurrentUser) -> Result<Json<Vec<Order>>> {
    Ok(Json(s.orders.my_orders(actor).await?))
}

async fn get_order(State(s): State<AppState>, CurrentUser(actor): CurrentUser, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    Ok(Json(s.orders.get(actor, id).await?))
}

async fn order_by_number(State(s): State<AppState>, MaybeUser(actor): MaybeUser, Path(number): Path<String>) -> Result<Json<Order>> {
    Ok(Json(s.orders.find_by_number(actor, &number).await?))
}

async fn list_orders(State(s): State<AppState>, _: AdminUser, Query(q): Query<OrderQuery>) -> Result<Json<PaginatedResponse<Order>>> {
    Ok(Json(s.orders.list(&q).await?))
}

async fn update_status(State(s): State<AppState>, _: AdminUser, Path(id): Path<Uuid>, Json(r): Json<StatusRequest>) -> Result<Json<Order>> {
    Ok(Json(s.orders.update_status(id, r).await?))
}

#[derive(Debug, Deserialize)]
struct EmailQuery { email: Option<String> }

async fn create_return(State(s): State<AppState>, MaybeUser(actor): MaybeUser, Path(order_id): Path<Uuid>, Json(r): Json<ReturnRequestDto>) -> Result<(StatusCode, Json<ReturnView>)> {
    Ok((StatusCode::CREATED, Json(s.returns.create(actor, order_id, r).await?)))
}

async fn get_return(State(s): State<AppState>, MaybeUser(actor): MaybeUser, Path(order_id): Path<Uuid>, Query(q): Query<EmailQuery>) -> Result<Json<ReturnView>> {
    Ok(Json(s.returns.get(actor, order_id, q.email.as_deref()).await?))
}
