use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, instrument};

use crate::domain::aggregates::RewardCard;
use crate::error::{AppError, Result};
use crate::services::Actor;
use crate::store::Store;

#[derive(Debug, Clone, Deserialize)]
pub struct RedeemRequest {
    pub points: i32,
}

pub struct RewardService {
    store: Arc<dyn Store>,
}

impl RewardService {
    pub fn new(store: Arc<dyn Store>) -> Self { Self { store } }

    /// Trades points for a discount card. A user holds at most one unused card.
    #[instrument(skip(self), fields(user_id = %actor.user_id))]
    pub async fn redeem(&self, actor: Actor, request: RedeemRequest) -> Result<RewardCard> {
        let card = RewardCard::for_points(actor.user_id, request.points)?;
        let user = self.store.get_user(actor.user_id).await?.ok_or_else(|| AppError::NotFound("User profile not found".into()))?;
        if user.points < card.required_points {
            return Err(AppError::BadRequest(format!("Not enough points: {} of {}", user.points, card.required_points)));
        }
        if self.store.active_reward_card(actor.user_id).await?.is_some() {
            return Err(AppError::BadRequest("You already have an unused reward card".into()));
        }
        self.store.issue_reward_card(&card).await?;
        info!(discount = card.discount_percentage, "reward card issued");
        Ok(card)
    }

    pub async fn my_cards(&self, actor: Actor) -> Result<Vec<RewardCard>> {
        Ok(self.store.reward_cards_for_user(actor.user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::user::tests::user;
    use crate::domain::aggregates::UserRole;
    use crate::store::MemoryStore;

    async fn setup(points: i32) -> (Arc<MemoryStore>, RewardService, Actor) {
        let store = Arc::new(MemoryStore::new());
        let mut u = user();
        u.points = points;
        store.insert_user(&u).await.unwrap();
        (store.clone(), RewardService::new(store), Actor { user_id: u.id, role: UserRole::User })
    }

    #[tokio::test]
    async fn test_redeem_spends_points() {
        let (store, rewards, actor) = setup(1200).await;
        let card = rewards.redeem(actor, RedeemRequest { points: 950 }).await.unwrap();
        assert_eq!(card.discount_percentage, 15);
        assert_eq!(store.get_user(actor.user_id).await.unwrap().unwrap().points, 250);
        assert_eq!(rewards.my_cards(actor).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_redeem_rules() {
        let (_, rewards, actor) = setup(1200).await;
        assert!(matches!(rewards.redeem(actor, RedeemRequest { points: 700 }).await, Err(AppError::BadRequest(_))));
        rewards.redeem(actor, RedeemRequest { points: 500 }).await.unwrap();
        assert!(matches!(rewards.redeem(actor, RedeemRequest { points: 500 }).await, Err(AppError::BadRequest(_))));

        let (_, poor, actor) = setup(499).await;
        assert!(matches!(poor.redeem(actor, RedeemRequest { points: 500 }).await, Err(AppError::BadRequest(_))));
    }
}
