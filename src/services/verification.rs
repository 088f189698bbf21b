use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{Verification, VerificationStatus};
use crate::error::{AppError, Result};
use crate::notify::{publish_all, Notifier};
use crate::services::artists::require_artist;
use crate::services::Actor;
use crate::store::{Category, Store, StoreError};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct VerificationRequest {
    #[validate(url)]
    pub video_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidateArtistRequest {
    pub id: Option<Uuid>,
    pub verification_id: Option<Uuid>,
}

pub struct VerificationService {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
}

impl VerificationService {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Self { Self { store, notifier } }

    #[instrument(skip(self, request), fields(user_id = %actor.user_id))]
    pub async fn request(&self, actor: Actor, request: VerificationRequest) -> Result<Verification> {
        request.validate()?;
        let artist = require_artist(self.store.as_ref(), actor).await?;
        if artist.verified {
            return Err(AppError::BadRequest("Artist is already verified".into()));
        }
        let history = self.store.verifications_for_artist(artist.user_id).await?;
        if history.iter().any(|v| v.status == VerificationStatus::Pending) {
            return Err(AppError::Duplicate("A verification request is already pending".into()));
        }
        let mut verification = Verification::request(&artist, request.video_url);
        self.store.insert_verification(&verification).await?;
        info!(verification_id = %verification.id, "verification requested");
        publish_all(self.notifier.as_ref(), &verification.take_events()).await;
        Ok(verification)
    }

    /// Requests still waiting for a moderator, newest first.
    pub async fn pending(&self) -> Result<Vec<Verification>> {
        Ok(self.store.list_verifications(Some(VerificationStatus::Pending)).await?)
    }

    /// Accepts the request, marks the artist verified and opens their catalog
    /// category.
    #[instrument(skip(self, request))]
    pub async fn validate(&self, request: ValidateArtistRequest) -> Result<()> {
        let (Some(artist_id), Some(verification_id)) = (request.id, request.verification_id) else {
            return Err(AppError::BadRequest("Missing artist ID or verification ID".into()));
        };
        let mut artist = self.store.get_artist(artist_id).await?
            .ok_or_else(|| AppError::NotFound("Artist not found".into()))?;
        let mut verification = self.find(verification_id).await?;
        if verification.artist_id != artist_id {
            return Err(AppError::BadRequest("Verification does not belong to this artist".into()));
        }

        verification.accept()?;
        artist.mark_verified();
        self.store.update_verification(&verification).await?;
        self.store.update_artist(&artist).await?;

        let name = artist.category_name();
        let category = Category { id: Uuid::now_v7(), slug: Category::slug_for(&name), name, description: None };
        match self.store.insert_category(&category).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => warn!(category = %category.name, "artist category already exists"),
            Err(e) => return Err(e.into()),
        }
        info!(%artist_id, "artist verified");
        publish_all(self.notifier.as_ref(), &verification.take_events()).await;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn refuse(&self, verification_id: Uuid) -> Result<Verification> {
        let mut verification = self.find(verification_id).await?;
        verification.refuse()?;
        self.store.update_verification(&verification).await?;
        publish_all(self.notifier.as_ref(), &verification.take_events()).await;
        Ok(verification)
    }

    async fn find(&self, id: Uuid) -> Result<Verification> {
        self.store.get_verification(id).await?.ok_or_else(|| AppError::NotFound("Verification not found".into()))
    }
}
