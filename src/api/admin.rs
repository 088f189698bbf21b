//! Back-office routes. Everything here needs the administrator role except
//! the public collection listing.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::auth::AdminUser;
use crate::api::AppState;
use crate::domain::aggregates::{User, Verification};
use crate::error::Result;
use crate::services::admin::{
    CollectionRequest, EditCategoryRequest, EditCollectionRequest, UserQuery, YearQuery, YearlyStatistics,
};
use crate::services::verification::ValidateArtistRequest;
use crate::services::PaginatedResponse;
use crate::store::{Category, Collection, ProductCounts};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/statistics", get(statistics))
        .route("/admin/users", get(users))
        .route("/admin/product-management", get(product_management))
        .route("/admin/editCategory", post(edit_category))
        .route("/admin/newCollection", post(new_collection))
        .route("/admin/editCollection", post(edit_collection))
        .route("/admin/validate_artist", post(validate_artist))
        .route("/admin/:verification_id/refuse", post(refuse_artist))
        .route("/admin/verification/pending", get(pending_verifications))
        .route("/collections", get(collections))
}

async fn statistics(State(s): State<AppState>, _: AdminUser, Query(q): Query<YearQuery>) -> Result<Json<YearlyStatistics>> {
    Ok(Json(s.admin.yearly_statistics(q.year).await?))
}

async fn users(State(s): State<AppState>, _: AdminUser, Query(q): Query<UserQuery>) -> Result<Json<PaginatedResponse<User>>> {
    Ok(Json(s.admin.users(&q).await?))
}

async fn product_management(State(s): State<AppState>, _: AdminUser) -> Result<Json<ProductCounts>> {
    Ok(Json(s.admin.product_management().await?))
}

async fn edit_category(State(s): State<AppState>, _: AdminUser, Json(r): Json<EditCategoryRequest>) -> Result<Json<Category>> {
    Ok(Json(s.admin.edit_category(r).await?))
}

async fn collections(State(s): State<AppState>) -> Result<Json<Vec<Collection>>> {
    Ok(Json(s.admin.collections().await?))
}

async fn new_collection(State(s): State<AppState>, _: AdminUser, Json(r): Json<CollectionRequest>) -> Result<(StatusCode, Json<Collection>)> {
    Ok((StatusCode::CREATED, Json(s.admin.create_collection(r).await?)))
}

async fn edit_collection(State(s): State<AppState>, _: AdminUser, Json(r): Json<EditCollectionRequest>) -> Result<Json<Collection>> {
    Ok(Json(s.admin.edit_collection(r).await?))
}

async fn validate_artist(State(s): State<AppState>, _: AdminUser, Json(r): Json<ValidateArtistRequest>) -> Result<Json<Value>> {
    s.verification.validate(r).await?;
    Ok(Json(json!({ "message": "Artist verified successfully" })))
}

async fn refuse_artist(State(s): State<AppState>, _: AdminUser, Path(id): Path<Uuid>) -> Result<Json<Verification>> {
    Ok(Json(s.verification.refuse(id).await?))
}

async fn pending_verifications(State(s): State<AppState>, _: AdminUser) -> Result<Json<Vec<Verification>>> {
    Ok(Json(s.verification.pending().await?))
}
