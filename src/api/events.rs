use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use uuid::Uuid;

use crate::api::auth::CurrentUser;
use crate::api::AppState;
use crate::domain::aggregates::Event;
use crate::error::Result;
use crate::services::events::EventRequest;
use crate::services::{ListParams, PaginatedResponse};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/event/new", post(create))
        .route("/event/allEvents", get(upcoming))
        .route("/event/allMyEvents", get(mine))
        .route("/event/details/:id", get(details))
        .route("/event/edit/:id", put(edit))
        .route("/event/delete/:id", delete(remove))
}

async fn create(State(s): State<AppState>, CurrentUser(actor): CurrentUser, Json(r): Json<EventRequest>) -> Result<(StatusCode, Json<Event>)> {
    Ok((StatusCode::CREATED, Json(s.events.create(actor, r).await?)))
}

async fn upcoming(State(s): State<AppState>, Query(p): Query<ListParams>) -> Result<Json<PaginatedResponse<Event>>> {
    Ok(Json(s.events.upcoming(&p).await?))
}

async fn mine(State(s): State<AppState>, CurrentUser(actor): CurrentUser, Query(p): Query<ListParams>) -> Result<Json<PaginatedResponse<Event>>> {
    Ok(Json(s.events.mine(actor, &p).await?))
}

async fn details(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Event>> {
    Ok(Json(s.events.get(id).await?))
}

async fn edit(State(s): State<AppState>, CurrentUser(actor): CurrentUser, Path(id): Path<Uuid>, Json(r): Json<EventRequest>) -> Result<Json<Event>> {
    Ok(Json(s.events.update(actor, id, r).await?))
}

async fn remove(State(s): State<AppState>, CurrentUser(actor): CurrentUser, Path(id): Path<Uuid>) -> Result<StatusCode> {
    s.events.delete(actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
