use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::config::PolicySettings;
use crate::domain::aggregates::{Order, OrderStatus, ReturnRequest};
use crate::error::{AppError, Result};
use crate::notify::{publish_all, Notifier};
use crate::services::Actor;
use crate::store::Store;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReturnRequestDto {
    #[validate(length(min = 1, max = 2000))]
    pub reason: String,
    /// Required for guest orders; must match the order's email.
    #[validate(email)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReturnView {
    pub order_id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    #[serde(flatten)]
    pub request: ReturnRequest,
}

impl ReturnView {
    fn of(order: &Order, request: ReturnRequest) -> Self {
        Self { order_id: order.id, order_number: order.order_number.clone(), status: order.status, request }
    }
}

pub struct ReturnService {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    policy: PolicySettings,
}

impl ReturnService {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, policy: PolicySettings) -> Self {
        Self { store, notifier, policy }
    }

    #[instrument(skip(self, actor, request))]
    pub async fn create(&self, actor: Option<Actor>, order_id: Uuid, request: ReturnRequestDto) -> Result<ReturnView> {
        request.validate()?;
        let mut order = self.load_authorized(actor, order_id, request.email.as_deref()).await?;
        let created = order.request_return(request.reason.trim(), Utc::now(), self.policy.return_window_days)?.clone();
        self.store.update_order(&order).await?;
        publish_all(self.notifier.as_ref(), &order.take_events()).await;
        info!(order_number = %order.order_number, "return requested");
        Ok(ReturnView::of(&order, created))
    }

    pub async fn get(&self, actor: Option<Actor>, order_id: Uuid, email: Option<&str>) -> Result<ReturnView> {
        let order = self.load_authorized(actor, order_id, email).await?;
        let request = order.return_request.clone()
            .ok_or_else(|| AppError::NotFound("No return has been requested for this order".into()))?;
        Ok(ReturnView::of(&order, request))
    }

    /// The owner, an administrator, or anyone quoting the order's email.
    async fn load_authorized(&self, actor: Option<Actor>, order_id: Uuid, email: Option<&str>) -> Result<Order> {
        let order = self.store.get_order(order_id).await?.ok_or_else(|| AppError::NotFound("Order not found".into()))?;
        let by_account = actor.is_some_and(|a| a.is_admin() || order.user_id == Some(a.user_id));
        let by_email = email.is_some_and(|e| e.trim().eq_ignore_ascii_case(&order.email));
        if !by_account && !by_email {
            return Err(AppError::Forbidden("You are not allowed to access this order".into()));
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::domain::aggregates::order::tests::paid_order;
    use crate::domain::aggregates::UserRole;
    use crate::notify::RecordingNotifier;
    use crate::store::{CheckoutCompletion, MemoryStore};

    async fn setup(order: Order) -> (Arc<RecordingNotifier>, ReturnService) {
        let store = Arc::new(MemoryStore::new());
        store.complete_checkout(CheckoutCompletion { order, stock: vec![], clear_cart: None, redeem_card: None }).await.unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        (notifier.clone(), ReturnService::new(store, notifier, PolicySettings::default()))
    }

    fn dto(email: Option<&str>) -> ReturnRequestDto {
        ReturnRequestDto { reason: "Wrong size".into(), email: email.map(Into::into) }
    }

    #[tokio::test]
    async fn test_owner_requests_return_once() {
        let owner = Actor { user_id: Uuid::now_v7(), role: UserRole::User };
        let order = paid_order(Some(owner.user_id), Uuid::now_v7());
        let id = order.id;
        let (notifier, returns) = setup(order).await;

        let view = returns.create(Some(owner), id, dto(None)).await.unwrap();
        assert_eq!(view.status, OrderStatus::ReturnRequest);
        assert_eq!(view.request.reason, "Wrong size");
        assert_eq!(notifier.subjects().await, vec!["artists_heaven.order.return_requested"]);

        assert!(matches!(returns.create(Some(owner), id, dto(None)).await, Err(AppError::Duplicate(_))));
        assert_eq!(returns.get(Some(owner), id, None).await.unwrap().request.reason, "Wrong size");
    }

    #[tokio::test]
    async fn test_guest_needs_matching_email() {
        let order = paid_order(None, Uuid::now_v7());
        let id = order.id;
        let (_, returns) = setup(order).await;

        assert!(matches!(returns.create(None, id, dto(Some("other@example.com"))).await, Err(AppError::Forbidden(_))));
        assert!(matches!(returns.get(None, id, Some("BUYER@example.com")).await, Err(AppError::NotFound(_))));
        returns.create(None, id, dto(Some("BUYER@example.com"))).await.unwrap();
    }

    #[tokio::test]
    async fn test_window_and_access() {
        let mut order = paid_order(Some(Uuid::now_v7()), Uuid::now_v7());
        order.created_at = Utc::now() - Duration::days(40);
        let id = order.id;
        let (_, returns) = setup(order).await;

        let stranger = Actor { user_id: Uuid::now_v7(), role: UserRole::User };
        assert!(matches!(returns.create(Some(stranger), id, dto(None)).await, Err(AppError::Forbidden(_))));
        let admin = Actor { user_id: Uuid::now_v7(), role: UserRole::Admin };
        assert!(matches!(returns.create(Some(admin), id, dto(None)).await, Err(AppError::Forbidden(_))));
        assert!(matches!(returns.create(Some(admin), Uuid::now_v7(), dto(None)).await, Err(AppError::NotFound(_))));
    }
}
