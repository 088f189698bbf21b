use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{Event, EventDetails};
use crate::error::{AppError, Result};
use crate::services::artists::require_artist;
use crate::services::{Actor, ListParams, PaginatedResponse};
use crate::store::{EventFilter, Store};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct EventRequest {
    #[validate(length(min = 1, max = 150))]
    pub name: String,
    #[validate(length(max = 2000))]
    #[serde(default)]
    pub description: String,
    pub date: NaiveDate,
    #[validate(length(min = 1, max = 255))]
    pub location: String,
    pub more_info: Option<String>,
    pub image: Option<String>,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,
}

impl From<EventRequest> for EventDetails {
    fn from(r: EventRequest) -> Self {
        Self {
            name: r.name.trim().to_string(), description: r.description, date: r.date, location: r.location.trim().to_string(),
            more_info: r.more_info, image: r.image, latitude: r.latitude, longitude: r.longitude,
        }
    }
}

pub struct EventService {
    store: Arc<dyn Store>,
}

impl EventService {
    pub fn new(store: Arc<dyn Store>) -> Self { Self { store } }

    #[instrument(skip(self, request), fields(user_id = %actor.user_id))]
    pub async fn create(&self, actor: Actor, request: EventRequest) -> Result<Event> {
        request.validate()?;
        let artist = require_artist(self.store.as_ref(), actor).await?;
        let event = Event::schedule(&artist, request.into(), Utc::now().date_naive())?;
        self.store.insert_event(&event).await?;
        info!(event_id = %event.id, "event created");
        Ok(event)
    }

    /// Events from today on, soonest first.
    pub async fn upcoming(&self, params: &ListParams) -> Result<PaginatedResponse<Event>> {
        let filter = EventFilter { from: Some(Utc::now().date_naive()), ..Self::paged(params) };
        self.list(filter).await
    }

    pub async fn mine(&self, actor: Actor, params: &ListParams) -> Result<PaginatedResponse<Event>> {
        let artist = require_artist(self.store.as_ref(), actor).await?;
        self.list(EventFilter { artist_id: Some(artist.user_id), ..Self::paged(params) }).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Event> {
        self.store.get_event(id).await?.ok_or_else(|| AppError::NotFound("Event not found".into()))
    }

    #[instrument(skip(self, request), fields(event_id = %id))]
    pub async fn update(&self, actor: Actor, id: Uuid, request: EventRequest) -> Result<Event> {
        request.validate()?;
        let artist = require_artist(self.store.as_ref(), actor).await?;
        let mut event = self.get(id).await?;
        event.edit(artist.user_id, request.into(), Utc::now().date_naive())?;
        self.store.update_event(&event).await?;
        Ok(event)
    }

    /// Owners delete their own events; administrators may delete any.
    #[instrument(skip(self), fields(event_id = %id))]
    pub async fn delete(&self, actor: Actor, id: Uuid) -> Result<()> {
        let event = self.get(id).await?;
        if !actor.is_admin() {
            let artist = require_artist(self.store.as_ref(), actor).await?;
            event.ensure_owner(artist.user_id)?;
        }
        self.store.delete_event(id).await?;
        info!("event deleted");
        Ok(())
    }

    fn paged(params: &ListParams) -> EventFilter {
        EventFilter { page: params.page(), per_page: params.per_page(), ..Default::default() }
    }

    async fn list(&self, filter: EventFilter) -> Result<PaginatedResponse<Event>> {
        let (data, total) = self.store.list_events(&filter).await?;
        Ok(PaginatedResponse { data, total, page: filter.page })
    }
}
