use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::config::PolicySettings;
use crate::domain::aggregates::{ProductVote, SubmissionStatus, UserProduct};
use crate::error::{AppError, Result};
use crate::notify::{publish_all, Notifier};
use crate::services::Actor;
use crate::store::{Store, UserProductFilter};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmissionRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 10))]
    pub images: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct UserProductView {
    #[serde(flatten)]
    pub product: UserProduct,
    pub voted_by_me: bool,
}

fn one_month_before(now: DateTime<Utc>) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(1)).unwrap_or(now - Duration::days(30))
}

/// Community submissions, their moderation and peer voting. Every step that
/// earns or costs points settles them on the submission's owner.
pub struct UserProductService {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    monthly_limit: i64,
}

impl UserProductService {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, policy: &PolicySettings) -> Self {
        Self { store, notifier, monthly_limit: policy.user_product_monthly_limit }
    }

    #[instrument(skip(self, request), fields(user_id = %actor.user_id))]
    pub async fn create(&self, actor: Actor, request: SubmissionRequest) -> Result<UserProduct> {
        request.validate()?;
        self.store.get_user(actor.user_id).await?.ok_or_else(|| AppError::NotFound("User profile not found".into()))?;

        let recent = UserProductFilter { owner_id: Some(actor.user_id), created_since: Some(one_month_before(Utc::now())), ..Default::default() };
        if self.store.count_user_products(&recent).await? >= self.monthly_limit {
            return Err(AppError::LimitExceeded(format!("You can submit at most {} products per month", self.monthly_limit)));
        }
        let first = self.store.count_user_products(&UserProductFilter { owner_id: Some(actor.user_id), ..Default::default() }).await? == 0;

        let mut product = UserProduct::submit(actor.user_id, request.name.trim(), request.images);
        self.store.insert_user_product(&product).await?;
        if first {
            self.store.adjust_points(actor.user_id, UserProduct::FIRST_SUBMISSION_POINTS).await?;
            info!("first submission rewarded");
        }
        publish_all(self.notifier.as_ref(), &product.take_events()).await;
        Ok(product)
    }

    /// Accepted submissions of the last month, flagged with the caller's votes.
    pub async fn list_accepted(&self, actor: Option<Actor>) -> Result<Vec<UserProductView>> {
        let filter = UserProductFilter {
            status: Some(SubmissionStatus::Accepted),
            created_since: Some(one_month_before(Utc::now())),
            ..Default::default()
        };
        let products = self.store.list_user_products(&filter).await?;
        let voted = match actor {
            Some(a) => self.store.voted_user_product_ids(a.user_id).await?,
            None => HashSet::new(),
        };
        Ok(products.into_iter().map(|product| UserProductView { voted_by_me: voted.contains(&product.id), product }).collect())
    }

    pub async fn my_submissions(&self, actor: Actor) -> Result<Vec<UserProduct>> {
        Ok(self.store.list_user_products(&UserProductFilter { owner_id: Some(actor.user_id), ..Default::default() }).await?)
    }

    pub async fn pending(&self) -> Result<Vec<UserProduct>> {
        Ok(self.store.list_user_products(&UserProductFilter { status: Some(SubmissionStatus::Pending), ..Default::default() }).await?)
    }

    #[instrument(skip(self))]
    pub async fn approve(&self, id: Uuid) -> Result<UserProduct> {
        self.review(id, true).await
    }

    #[instrument(skip(self))]
    pub async fn reject(&self, id: Uuid) -> Result<UserProduct> {
        self.review(id, false).await
    }

    async fn review(&self, id: Uuid, accept: bool) -> Result<UserProduct> {
        let mut product = self.load(id).await?;
        let points = if accept {
            product.approve()?;
            UserProduct::APPROVAL_POINTS
        } else {
            product.reject()?;
            UserProduct::REJECTION_POINTS
        };
        self.store.update_user_product(&product).await?;
        self.store.adjust_points(product.owner_id, points).await?;
        publish_all(self.notifier.as_ref(), &product.take_events()).await;
        info!(status = product.status.as_str(), "submission reviewed");
        Ok(product)
    }

    #[instrument(skip(self), fields(user_id = %actor.user_id))]
    pub async fn vote(&self, actor: Actor, id: Uuid) -> Result<UserProduct> {
        let mut product = self.load(id).await?;
        product.register_vote(actor.user_id)?;
        let vote = ProductVote { user_product_id: id, user_id: actor.user_id, voted_at: Utc::now() };
        self.store.insert_vote(&vote).await.map_err(|e| match AppError::from(e) {
            AppError::Duplicate(_) => AppError::Duplicate("You have already voted for this product".into()),
            other => other,
        })?;
        self.store.update_user_product(&product).await?;
        self.store.adjust_points(product.owner_id, UserProduct::VOTE_POINTS).await?;
        Ok(product)
    }

    async fn load(&self, id: Uuid) -> Result<UserProduct> {
        self.store.get_user_product(id).await?.ok_or_else(|| AppError::NotFound("User product not found".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::user::tests::user;
    use crate::domain::aggregates::UserRole;
    use crate::notify::RecordingNotifier;
    use crate::store::MemoryStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        notifier: Arc<RecordingNotifier>,
        service: UserProductService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let service = UserProductService::new(store.clone(), notifier.clone(), &PolicySettings::default());
        Fixture { store, notifier, service }
    }

    async fn member(store: &MemoryStore, email: &str) -> Actor {
        let mut u = user();
        u.email = email.into();
        store.insert_user(&u).await.unwrap();
        Actor { user_id: u.id, role: UserRole::User }
    }

    fn submission(name: &str) -> SubmissionRequest {
        SubmissionRequest { name: name.into(), images: vec!["/uploads/mural.png".into()] }
    }

    async fn points(store: &MemoryStore, actor: Actor) -> i32 { store.get_user(actor.user_id).await.unwrap().unwrap().points }

    #[tokio::test]
    async fn test_first_submission_rewarded_and_limit_enforced() {
        let f = fixture();
        let artist = member(&f.store, "artist@example.com").await;
        for name in ["One", "Two", "Three"] {
            f.service.create(artist, submission(name)).await.unwrap();
        }
        assert_eq!(points(&f.store, artist).await, UserProduct::FIRST_SUBMISSION_POINTS);
        assert!(matches!(f.service.create(artist, submission("Four")).await, Err(AppError::LimitExceeded(_))));
        assert_eq!(f.service.my_submissions(artist).await.unwrap().len(), 3);
        assert_eq!(f.notifier.subjects().await, vec!["artists_heaven.community.submitted"; 3]);
    }

    #[tokio::test]
    async fn test_review_adjusts_points() {
        let f = fixture();
        let artist = member(&f.store, "artist@example.com").await;
        let a = f.service.create(artist, submission("One")).await.unwrap();
        let b = f.service.create(artist, submission("Two")).await.unwrap();
        assert_eq!(f.service.pending().await.unwrap().len(), 2);

        f.service.approve(a.id).await.unwrap();
        assert_eq!(points(&f.store, artist).await, 120);
        f.service.reject(b.id).await.unwrap();
        assert_eq!(points(&f.store, artist).await, 110);
        assert!(matches!(f.service.approve(b.id).await, Err(AppError::BadRequest(_))));
        assert!(f.service.pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_voting() {
        let f = fixture();
        let artist = member(&f.store, "artist@example.com").await;
        let fan = member(&f.store, "fan@example.com").await;
        let design = f.service.create(artist, submission("Mural")).await.unwrap();

        assert!(matches!(f.service.vote(fan, design.id).await, Err(AppError::BadRequest(_))));
        f.service.approve(design.id).await.unwrap();
        assert!(matches!(f.service.vote(artist, design.id).await, Err(AppError::BadRequest(_))));

        assert_eq!(f.service.vote(fan, design.id).await.unwrap().num_votes, 1);
        assert!(matches!(f.service.vote(fan, design.id).await, Err(AppError::Duplicate(_))));
        assert_eq!(points(&f.store, artist).await, 125);

        let listed = f.service.list_accepted(Some(fan)).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].voted_by_me);
        assert_eq!(listed[0].product.num_votes, 1);
        assert!(!f.service.list_accepted(None).await.unwrap()[0].voted_by_me);
    }

    #[tokio::test]
    async fn test_unknown_member_cannot_submit() {
        let f = fixture();
        let ghost = Actor { user_id: Uuid::now_v7(), role: UserRole::User };
        assert!(matches!(f.service.create(ghost, submission("One")).await, Err(AppError::NotFound(_))));
    }
}
