use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::auth::{AdminUser, CurrentUser, MaybeUser};
use crate::api::AppState;
use crate::domain::aggregates::{Product, Rating};
use crate::error::{AppError, Result};
use crate::services::catalog::{BestSeller, CategoryRequest, ProductQuery, ProductRequest, PromotionRequest};
use crate::services::ratings::{ProductRatings, RatingRequest};
use crate::services::PaginatedResponse;
use crate::store::Category;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route("/products/top-rated", get(top_rated))
        .route("/products/best-seller", get(best_seller))
        .route("/products/:id", get(get_product).put(update_product))
        .route("/products/:id/promote", post(promote))
        .route("/products/:id/demote", post(demote))
        .route("/products/:id/enable", post(enable))
        .route("/products/:id/disable", post(disable))
        .route("/ratings/:product_id", get(list_ratings).post(create_rating))
        .route("/categories", get(list_categories).post(create_category))
}

async fn list_products(State(s): State<AppState>, caller: MaybeUser, Query(q): Query<ProductQuery>) -> Result<Json<PaginatedResponse<Product>>> {
    Ok(Json(s.catalog.list(&q, caller.is_admin()).await?))
}

async fn get_product(State(s): State<AppState>, caller: MaybeUser, Path(id): Path<Uuid>) -> Result<Json<Product>> {
    Ok(Json(s.catalog.get(id, caller.is_admin()).await?))
}

async fn create_product(State(s): State<AppState>, _: AdminUser, Json(r): Json<ProductRequest>) -> Result<(StatusCode, Json<Product>)> {
    Ok((StatusCode::CREATED, Json(s.catalog.create(r).await?)))
}

async fn update_product(State(s): State<AppState>, _: AdminUser, Path(id): Path<Uuid>, Json(r): Json<ProductRequest>) -> Result<Json<Product>> {
    Ok(Json(s.catalog.update(id, r).await?))
}

async fn promote(State(s): State<AppState>, _: AdminUser, Path(id): Path<Uuid>, Json(r): Json<PromotionRequest>) -> Result<Json<Product>> {
    Ok(Json(s.catalog.promote(id, r).await?))
}

async fn demote(State(s): State<AppState>, _: AdminUser, Path(id): Path<Uuid>) -> Result<Json<Product>> {
    Ok(Json(s.catalog.demote(id).await?))
}

async fn enable(State(s): State<AppState>, _: AdminUser, Path(id): Path<Uuid>) -> Result<Json<Product>> {
    Ok(Json(s.catalog.set_available(id, true).await?))
}

async fn disable(State(s): State<AppState>, _: AdminUser, Path(id): Path<Uuid>) -> Result<Json<Product>> {
    Ok(Json(s.catalog.set_available(id, false).await?))
}

#[derive(Debug, Deserialize)]
struct LimitQuery { limit: Option<u32> }

async fn top_rated(State(s): State<AppState>, Query(q): Query<LimitQuery>) -> Result<Json<Vec<Product>>> {
    Ok(Json(s.catalog.top_rated(q.limit.unwrap_or(10)).await?))
}

async fn best_seller(State(s): State<AppState>) -> Result<Json<BestSeller>> {
    s.catalog.best_seller().await?.map(Json).ok_or_else(|| AppError::NotFound("No sales recorded yet".into()))
}

async fn list_ratings(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<ProductRatings>> {
    Ok(Json(s.ratings.for_product(id).await?))
}

async fn create_rating(State(s): State<AppState>, CurrentUser(actor): CurrentUser, Path(id): Path<Uuid>, Json(r): Json<RatingRequest>) -> Result<(StatusCode, Json<Rating>)> {
    Ok((StatusCode::CREATED, Json(s.ratings.create(actor, id, r).await?)))
}

async fn list_categories(State(s): State<AppState>) -> Result<Json<Vec<Category>>> {
    Ok(Json(s.catalog.categories().await?))
}

async fn create_category(State(s): State<AppState>, _: AdminUser, Json(r): Json<CategoryRequest>) -> Result<(StatusCode, Json<Category>)> {
    Ok((StatusCode::CREATED, Json(s.catalog.create_category(r).await?)))
}
