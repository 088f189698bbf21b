use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::Rating;
use crate::domain::value_objects::Score;
use crate::error::{AppError, Result};
use crate::services::Actor;
use crate::store::Store;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RatingRequest {
    pub score: i32,
    #[validate(length(max = 1000))]
    pub comment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProductRatings {
    pub product_id: Uuid,
    pub average: Option<f64>,
    pub count: usize,
    pub ratings: Vec<Rating>,
}

pub struct RatingService {
    store: Arc<dyn Store>,
}

impl RatingService {
    pub fn new(store: Arc<dyn Store>) -> Self { Self { store } }

    pub async fn for_product(&self, product_id: Uuid) -> Result<ProductRatings> {
        self.store.get_product(product_id).await?.ok_or_else(|| AppError::NotFound("Product not found".into()))?;
        let ratings = self.store.ratings_for_product(product_id).await?;
        let average = (!ratings.is_empty())
            .then(|| ratings.iter().map(|r| f64::from(r.score.value())).sum::<f64>() / ratings.len() as f64);
        Ok(ProductRatings { product_id, average, count: ratings.len(), ratings })
    }

    /// Only customers who bought the product may rate it.
    #[instrument(skip(self, request), fields(user_id = %actor.user_id))]
    pub async fn create(&self, actor: Actor, product_id: Uuid, request: RatingRequest) -> Result<Rating> {
        request.validate()?;
        let score = Score::new(request.score)?;
        self.store.get_product(product_id).await?.ok_or_else(|| AppError::NotFound("Product not found".into()))?;

        let purchased = self.store.orders_for_user(actor.user_id).await?.iter().any(|o| o.contains_product(product_id));
        if !purchased {
            return Err(AppError::Forbidden("User has not purchased this item".into()));
        }

        let comment = request.comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
        let rating = Rating::new(product_id, actor.user_id, score, comment);
        self.store.insert_rating(&rating).await?;
        Ok(rating)
    }
}
