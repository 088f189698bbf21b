use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::aggregates::{Order, OrderStatus};
use crate::error::{AppError, Result};
use crate::notify::{publish_all, Notifier};
use crate::services::{Actor, ListParams, PaginatedResponse};
use crate::store::Store;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderQuery {
    pub status: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

pub struct OrderService {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
}

impl OrderService {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Self { Self { store, notifier } }

    pub async fn my_orders(&self, actor: Actor) -> Result<Vec<Order>> {
        Ok(self.store.orders_for_user(actor.user_id).await?)
    }

    pub async fn get(&self, actor: Actor, id: Uuid) -> Result<Order> {
        let order = self.store.get_order(id).await?.ok_or_else(|| AppError::NotFound("Order not found".into()))?;
        if !actor.is_admin() && order.user_id != Some(actor.user_id) {
            return Err(AppError::Forbidden("This order belongs to another customer".into()));
        }
        Ok(order)
    }

    /// Guest orders can be tracked by anyone holding the number; account orders
    /// only by their owner or an administrator.
    pub async fn find_by_number(&self, actor: Option<Actor>, order_number: &str) -> Result<Order> {
        let order = self.store.find_order_by_number(order_number.trim()).await?
            .ok_or_else(|| AppError::NotFound("Order not found".into()))?;
        let allowed = match (order.user_id, actor) {
            (None, _) => true,
            (Some(_), Some(a)) if a.is_admin() => true,
            (Some(owner), Some(a)) => owner == a.user_id,
            (Some(_), None) => false,
        };
        if !allowed { return Err(AppError::Forbidden("This order belongs to another customer".into())); }
        Ok(order)
    }

    pub async fn list(&self, query: &OrderQuery) -> Result<PaginatedResponse<Order>> {
        let status = query.status.as_deref().filter(|s| !s.is_empty()).map(str::parse::<OrderStatus>).transpose()?;
        let params = ListParams { page: query.page, per_page: query.per_page };
        let page = params.page();
        let (data, total) = self.store.list_orders(status, page, params.per_page()).await?;
        Ok(PaginatedResponse { data, total, page })
    }

    #[instrument(skip(self, request), fields(status = %request.status))]
    pub async fn update_status(&self, id: Uuid, request: StatusRequest) -> Result<Order> {
        let next: OrderStatus = request.status.parse()?;
        let mut order = self.store.get_order(id).await?.ok_or_else(|| AppError::NotFound("Order not found".into()))?;
        order.transition_to(next)?;
        self.store.update_order(&order).await?;
        publish_all(self.notifier.as_ref(), &order.take_events()).await;
        info!(order_number = %order.order_number, status = %order.status, "order status changed");
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::order::tests::paid_order;
    use crate::domain::aggregates::UserRole;
    use crate::notify::RecordingNotifier;
    use crate::store::{CheckoutCompletion, MemoryStore};

    fn actor(role: UserRole) -> Actor { Actor { user_id: Uuid::now_v7(), role } }

    async fn setup(order: Order) -> (Arc<RecordingNotifier>, OrderService) {
        let store = Arc::new(MemoryStore::new());
        store.complete_checkout(CheckoutCompletion { order, stock: vec![], clear_cart: None, redeem_card: None }).await.unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        (notifier.clone(), OrderService::new(store, notifier))
    }

    #[tokio::test]
    async fn test_owner_and_admin_access() {
        let buyer = actor(UserRole::User);
        let order = paid_order(Some(buyer.user_id), Uuid::now_v7());
        let (id, number) = (order.id, order.order_number.clone());
        let (_, orders) = setup(order).await;

        assert_eq!(orders.get(buyer, id).await.unwrap().id, id);
        assert_eq!(orders.get(actor(UserRole::Admin), id).await.unwrap().id, id);
        assert!(matches!(orders.get(actor(UserRole::User), id).await, Err(AppError::Forbidden(_))));
        assert!(matches!(orders.find_by_number(None, &number).await, Err(AppError::Forbidden(_))));
        assert_eq!(orders.my_orders(buyer).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_guest_order_tracked_by_number() {
        let order = paid_order(None, Uuid::now_v7());
        let number = order.order_number.clone();
        let (_, orders) = setup(order).await;
        assert_eq!(orders.find_by_number(None, &number).await.unwrap().order_number, number);
        assert!(matches!(orders.find_by_number(None, "AH-0").await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_status_transitions_publish() {
        let order = paid_order(None, Uuid::now_v7());
        let id = order.id;
        let (notifier, orders) = setup(order).await;

        let updated = orders.update_status(id, StatusRequest { status: "in_preparation".into() }).await.unwrap();
        assert_eq!(updated.status, OrderStatus::InPreparation);
        assert_eq!(notifier.subjects().await, vec!["artists_heaven.order.status_changed"]);

        assert!(matches!(orders.update_status(id, StatusRequest { status: "DELIVERED".into() }).await, Err(AppError::BadRequest(_))));
        assert!(matches!(orders.update_status(id, StatusRequest { status: "LOST".into() }).await, Err(AppError::BadRequest(_))));

        let query = OrderQuery { status: Some("IN_PREPARATION".into()), ..Default::default() };
        assert_eq!(orders.list(&query).await.unwrap().total, 1);
    }
}
