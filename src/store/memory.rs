use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::aggregates::{
    Artist, Cart, CartOwner, EmailReport, Event, Order, OrderStatus, Product, ProductVote, Rating, ReportKind, RewardCard,
    User, UserProduct, Verification, VerificationStatus,
};
use crate::store::{
    Category, CheckoutCompletion, Collection, CompletionOutcome, EventFilter, ProductCounts, ProductFilter, Store,
    StoreError, StoreResult, UserProductFilter,
};

#[derive(Default)]
struct StoreData {
    users: HashMap<Uuid, User>,
    products: HashMap<Uuid, Product>,
    categories: Vec<Category>,
    carts: HashMap<String, Cart>,
    orders: HashMap<Uuid, Order>,
    ratings: Vec<Rating>,
    user_products: HashMap<Uuid, UserProduct>,
    votes: HashSet<(Uuid, Uuid)>, // (user_product_id, user_id)
    reward_cards: HashMap<Uuid, RewardCard>,
    collections: Vec<Collection>,
    artists: HashMap<Uuid, Artist>,
    events: HashMap<Uuid, Event>,
    verifications: HashMap<Uuid, Verification>,
    reports: Vec<EmailReport>,
}

/// In-memory store for tests and database-less runs.
#[derive(Default)]
pub struct MemoryStore {
    data: TokioMutex<StoreData>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

fn paginate<T>(items: Vec<T>, page: u32, per_page: u32) -> Vec<T> {
    let skip = (page.saturating_sub(1) as usize).saturating_mul(per_page as usize);
    items.into_iter().skip(skip).take(per_page as usize).collect()
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let mut data = self.data.lock().await;
        if data.users.values().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(StoreError::Conflict(format!("user with email {}", user.email)));
        }
        data.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.data.lock().await.users.get(&id).cloned())
    }

    async fn update_user(&self, user: &User) -> StoreResult<()> {
        let mut data = self.data.lock().await;
        let slot = data.users.get_mut(&user.id).ok_or_else(|| StoreError::NotFound(format!("user {}", user.id)))?;
        *slot = user.clone();
        Ok(())
    }

    async fn adjust_points(&self, user_id: Uuid, delta: i32) -> StoreResult<User> {
        let mut data = self.data.lock().await;
        let user = data.users.get_mut(&user_id).ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))?;
        user.add_points(delta);
        Ok(user.clone())
    }

    async fn list_users(&self, search: Option<&str>, page: u32, per_page: u32) -> StoreResult<(Vec<User>, i64)> {
        let data = self.data.lock().await;
        let needle = search.map(str::to_lowercase).filter(|q| !q.is_empty());
        let mut users: Vec<User> = data.users.values()
            .filter(|u| needle.as_deref().map_or(true, |q| u.username.to_lowercase().contains(q)))
            .cloned().collect();
        users.sort_by(|a, b| a.role.as_str().cmp(b.role.as_str()).then_with(|| a.username.cmp(&b.username)));
        let total = users.len() as i64;
        Ok((paginate(users, page, per_page), total))
    }

    async fn insert_product(&self, product: &Product) -> StoreResult<()> {
        let mut data = self.data.lock().await;
        if data.products.values().any(|p| p.reference == product.reference) {
            return Err(StoreError::Conflict(format!("product reference {}", product.reference)));
        }
        data.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn update_product(&self, product: &Product) -> StoreResult<()> {
        let mut data = self.data.lock().await;
        let slot = data.products.get_mut(&product.id).ok_or_else(|| StoreError::NotFound(format!("product {}", product.id)))?;
        *slot = product.clone();
        Ok(())
    }

    async fn get_product(&self, id: Uuid) -> StoreResult<Option<Product>> {
        Ok(self.data.lock().await.products.get(&id).cloned())
    }

    async fn list_products(&self, filter: &ProductFilter) -> StoreResult<(Vec<Product>, i64)> {
        let data = self.data.lock().await;
        let mut matching: Vec<Product> = data.products.values().filter(|p| filter.matches(p)).cloned().collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matching.len() as i64;
        Ok((paginate(matching, filter.page, filter.per_page), total))
    }

    async fn top_rated_products(&self, limit: u32) -> StoreResult<Vec<Product>> {
        let data = self.data.lock().await;
        let mut scored: Vec<(f64, &Product)> = data.products.values().filter(|p| p.available).filter_map(|p| {
            let scores: Vec<f64> = data.ratings.iter().filter(|r| r.product_id == p.id).map(|r| f64::from(r.score.value())).collect();
            (!scores.is_empty()).then(|| (scores.iter().sum::<f64>() / scores.len() as f64, p))
        }).collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.created_at.cmp(&b.1.created_at)));
        Ok(scored.into_iter().take(limit as usize).map(|(_, p)| p.clone()).collect())
    }

    async fn best_selling_product(&self) -> StoreResult<Option<(Uuid, i64)>> {
        let data = self.data.lock().await;
        let mut sold: HashMap<Uuid, i64> = HashMap::new();
        for item in data.orders.values().flat_map(|o| o.items.iter()) {
            *sold.entry(item.product_id).or_default() += i64::from(item.quantity);
        }
        Ok(sold.into_iter().max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0))))
    }

    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        let mut categories = self.data.lock().await.categories.clone();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn insert_category(&self, category: &Category) -> StoreResult<()> {
        let mut data = self.data.lock().await;
        if data.categories.iter().any(|c| c.slug == category.slug) {
            return Err(StoreError::Conflict(format!("category {}", category.slug)));
        }
        data.categories.push(category.clone());
        Ok(())
    }

    async fn get_category(&self, id: Uuid) -> StoreResult<Option<Category>> {
        Ok(self.data.lock().await.categories.iter().find(|c| c.id == id).cloned())
    }

    async fn find_category_by_slug(&self, slug: &str) -> StoreResult<Option<Category>> {
        Ok(self.data.lock().await.categories.iter().find(|c| c.slug == slug).cloned())
    }

    async fn update_category(&self, category: &Category) -> StoreResult<()> {
        let mut data = self.data.lock().await;
        if data.categories.iter().any(|c| c.slug == category.slug && c.id != category.id) {
            return Err(StoreError::Conflict(format!("category {}", category.slug)));
        }
        let slot = data.categories.iter_mut().find(|c| c.id == category.id)
            .ok_or_else(|| StoreError::NotFound(format!("category {}", category.id)))?;
        *slot = category.clone();
        Ok(())
    }

    async fn product_ids_in_category(&self, category_id: Uuid) -> StoreResult<HashSet<Uuid>> {
        let data = self.data.lock().await;
        Ok(data.products.values().filter(|p| p.category_ids.contains(&category_id)).map(|p| p.id).collect())
    }

    async fn product_counts(&self) -> StoreResult<ProductCounts> {
        let data = self.data.lock().await;
        let total = data.products.len() as i64;
        let available = data.products.values().filter(|p| p.available).count() as i64;
        let promoted = data.products.values().filter(|p| p.on_promotion).count() as i64;
        Ok(ProductCounts { not_available: total - available, available, promoted, total })
    }

    async fn insert_collection(&self, collection: &Collection) -> StoreResult<()> {
        let mut data = self.data.lock().await;
        if data.collections.iter().any(|c| c.name.eq_ignore_ascii_case(&collection.name)) {
            return Err(StoreError::Conflict(format!("collection {}", collection.name)));
        }
        data.collections.push(collection.clone());
        Ok(())
    }

    async fn get_collection(&self, id: Uuid) -> StoreResult<Option<Collection>> {
        Ok(self.data.lock().await.collections.iter().find(|c| c.id == id).cloned())
    }

    async fn update_collection(&self, collection: &Collection) -> StoreResult<()> {
        let mut data = self.data.lock().await;
        if data.collections.iter().any(|c| c.name.eq_ignore_ascii_case(&collection.name) && c.id != collection.id) {
            return Err(StoreError::Conflict(format!("collection {}", collection.name)));
        }
        let slot = data.collections.iter_mut().find(|c| c.id == collection.id)
            .ok_or_else(|| StoreError::NotFound(format!("collection {}", collection.id)))?;
        slot.name = collection.name.clone();
        slot.promoted = collection.promoted;
        Ok(())
    }

    async fn list_collections(&self) -> StoreResult<Vec<Collection>> {
        let mut collections = self.data.lock().await.collections.clone();
        collections.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(collections)
    }

    async fn load_cart(&self, owner: &CartOwner) -> StoreResult<Cart> {
        let data = self.data.lock().await;
        Ok(data.carts.get(&owner.key()).cloned().unwrap_or_else(|| Cart::new(owner.clone())))
    }

    async fn save_cart(&self, cart: &Cart) -> StoreResult<()> {
        self.data.lock().await.carts.insert(cart.owner().key(), cart.clone());
        Ok(())
    }

    async fn complete_checkout(&self, completion: CheckoutCompletion) -> StoreResult<CompletionOutcome> {
        let mut data = self.data.lock().await;
        let session = &completion.order.checkout_session_id;
        if let Some(existing) = data.orders.values().find(|o| &o.checkout_session_id == session) {
            debug!(checkout_session = %session, order_id = %existing.id, "checkout already recorded");
            return Ok(CompletionOutcome::AlreadyRecorded { order_id: existing.id });
        }

        // Work on copies so nothing is visible until every step succeeded.
        let mut touched: HashMap<Uuid, Product> = HashMap::new();
        for line in &completion.stock {
            if !touched.contains_key(&line.product_id) {
                match data.products.get(&line.product_id) {
                    Some(p) => { touched.insert(line.product_id, p.clone()); }
                    None => {
                        warn!(product_id = %line.product_id, "sold product no longer exists; stock not adjusted");
                        continue;
                    }
                }
            }
            let Some(product) = touched.get_mut(&line.product_id) else { continue };
            if let Err(e) = product.remove_stock(&line.color, line.size.as_deref(), line.quantity) {
                warn!(product_id = %line.product_id, error = %e, "could not adjust stock for sold line");
            }
        }

        let mut card = None;
        if let Some(card_id) = completion.redeem_card {
            match data.reward_cards.get(&card_id) {
                Some(c) => {
                    let mut c = c.clone();
                    c.redeem(Utc::now());
                    card = Some(c);
                }
                None => warn!(card_id = %card_id, "reward card used at checkout not found"),
            }
        }

        let mut stock_events = Vec::new();
        for (id, mut product) in touched {
            stock_events.extend(product.take_events());
            data.products.insert(id, product);
        }
        if let Some(c) = card { data.reward_cards.insert(c.id, c); }
        if let Some(owner) = &completion.clear_cart {
            if let Some(cart) = data.carts.get_mut(&owner.key()) { cart.clear(); }
        }
        data.orders.insert(completion.order.id, completion.order);
        Ok(CompletionOutcome::Recorded { stock_events })
    }

    async fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.data.lock().await.orders.get(&id).cloned())
    }

    async fn find_order_by_number(&self, order_number: &str) -> StoreResult<Option<Order>> {
        Ok(self.data.lock().await.orders.values().find(|o| o.order_number == order_number).cloned())
    }

    async fn find_order_by_checkout_session(&self, session_id: &str) -> StoreResult<Option<Order>> {
        Ok(self.data.lock().await.orders.values().find(|o| o.checkout_session_id == session_id).cloned())
    }

    async fn orders_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Order>> {
        let data = self.data.lock().await;
        let mut orders: Vec<Order> = data.orders.values().filter(|o| o.user_id == Some(user_id)).cloned().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn list_orders(&self, status: Option<OrderStatus>, page: u32, per_page: u32) -> StoreResult<(Vec<Order>, i64)> {
        let data = self.data.lock().await;
        let mut orders: Vec<Order> = data.orders.values().filter(|o| status.map_or(true, |s| o.status == s)).cloned().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = orders.len() as i64;
        Ok((paginate(orders, page, per_page), total))
    }

    async fn orders_created_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> StoreResult<Vec<Order>> {
        let data = self.data.lock().await;
        let mut orders: Vec<Order> = data.orders.values().filter(|o| o.created_at >= from && o.created_at < to).cloned().collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(orders)
    }

    async fn update_order(&self, order: &Order) -> StoreResult<()> {
        let mut data = self.data.lock().await;
        let slot = data.orders.get_mut(&order.id).ok_or_else(|| StoreError::NotFound(format!("order {}", order.id)))?;
        slot.status = order.status;
        slot.return_request = order.return_request.clone();
        slot.updated_at = order.updated_at;
        Ok(())
    }

    async fn insert_rating(&self, rating: &Rating) -> StoreResult<()> {
        self.data.lock().await.ratings.push(rating.clone());
        Ok(())
    }

    async fn ratings_for_product(&self, product_id: Uuid) -> StoreResult<Vec<Rating>> {
        let data = self.data.lock().await;
        let mut ratings: Vec<Rating> = data.ratings.iter().filter(|r| r.product_id == product_id).cloned().collect();
        ratings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(ratings)
    }

    async fn insert_user_product(&self, product: &UserProduct) -> StoreResult<()> {
        self.data.lock().await.user_products.insert(product.id, product.clone());
        Ok(())
    }

    async fn get_user_product(&self, id: Uuid) -> StoreResult<Option<UserProduct>> {
        Ok(self.data.lock().await.user_products.get(&id).cloned())
    }

    async fn update_user_product(&self, product: &UserProduct) -> StoreResult<()> {
        let mut data = self.data.lock().await;
        let slot = data.user_products.get_mut(&product.id).ok_or_else(|| StoreError::NotFound(format!("user product {}", product.id)))?;
        slot.status = product.status;
        slot.num_votes = product.num_votes;
        Ok(())
    }

    async fn count_user_products(&self, filter: &UserProductFilter) -> StoreResult<i64> {
        Ok(self.data.lock().await.user_products.values().filter(|p| filter.matches(p)).count() as i64)
    }

    async fn list_user_products(&self, filter: &UserProductFilter) -> StoreResult<Vec<UserProduct>> {
        let data = self.data.lock().await;
        let mut products: Vec<UserProduct> = data.user_products.values().filter(|p| filter.matches(p)).cloned().collect();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(products)
    }

    async fn insert_vote(&self, vote: &ProductVote) -> StoreResult<()> {
        let mut data = self.data.lock().await;
        if !data.votes.insert((vote.user_product_id, vote.user_id)) {
            return Err(StoreError::Conflict("vote for this product".into()));
        }
        Ok(())
    }

    async fn voted_user_product_ids(&self, user_id: Uuid) -> StoreResult<HashSet<Uuid>> {
        let data = self.data.lock().await;
        Ok(data.votes.iter().filter(|(_, u)| *u == user_id).map(|(p, _)| *p).collect())
    }

    async fn issue_reward_card(&self, card: &RewardCard) -> StoreResult<()> {
        let mut data = self.data.lock().await;
        let user = data.users.get_mut(&card.user_id).ok_or_else(|| StoreError::NotFound(format!("user {}", card.user_id)))?;
        user.add_points(-card.required_points);
        data.reward_cards.insert(card.id, card.clone());
        Ok(())
    }

    async fn active_reward_card(&self, user_id: Uuid) -> StoreResult<Option<RewardCard>> {
        let data = self.data.lock().await;
        Ok(data.reward_cards.values().filter(|c| c.user_id == user_id && !c.redeemed).max_by_key(|c| c.created_at).cloned())
    }

    async fn reward_cards_for_user(&self, user_id: Uuid) -> StoreResult<Vec<RewardCard>> {
        let data = self.data.lock().await;
        let mut cards: Vec<RewardCard> = data.reward_cards.values().filter(|c| c.user_id == user_id).cloned().collect();
        cards.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(cards)
    }

    async fn insert_artist(&self, user: &User, artist: &Artist) -> StoreResult<()> {
        let mut data = self.data.lock().await;
        if data.users.values().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(StoreError::Conflict(format!("user with email {}", user.email)));
        }
        if data.artists.values().any(|a| a.artist_name.eq_ignore_ascii_case(&artist.artist_name)) {
            return Err(StoreError::Conflict(format!("artist {}", artist.artist_name)));
        }
        data.users.insert(user.id, user.clone());
        data.artists.insert(artist.user_id, artist.clone());
        Ok(())
    }

    async fn get_artist(&self, user_id: Uuid) -> StoreResult<Option<Artist>> {
        Ok(self.data.lock().await.artists.get(&user_id).cloned())
    }

    async fn find_artist_by_name(&self, artist_name: &str) -> StoreResult<Option<Artist>> {
        let data = self.data.lock().await;
        Ok(data.artists.values().find(|a| a.artist_name.eq_ignore_ascii_case(artist_name.trim())).cloned())
    }

    async fn update_artist(&self, artist: &Artist) -> StoreResult<()> {
        let mut data = self.data.lock().await;
        let slot = data.artists.get_mut(&artist.user_id).ok_or_else(|| StoreError::NotFound(format!("artist {}", artist.user_id)))?;
        *slot = artist.clone();
        Ok(())
    }

    async fn verified_artists(&self) -> StoreResult<Vec<Artist>> {
        let data = self.data.lock().await;
        let mut artists: Vec<Artist> = data.artists.values().filter(|a| a.verified).cloned().collect();
        artists.sort_by(|a, b| a.artist_name.cmp(&b.artist_name));
        Ok(artists)
    }

    async fn insert_event(&self, event: &Event) -> StoreResult<()> {
        self.data.lock().await.events.insert(event.id, event.clone());
        Ok(())
    }

    async fn get_event(&self, id: Uuid) -> StoreResult<Option<Event>> {
        Ok(self.data.lock().await.events.get(&id).cloned())
    }

    async fn update_event(&self, event: &Event) -> StoreResult<()> {
        let mut data = self.data.lock().await;
        let slot = data.events.get_mut(&event.id).ok_or_else(|| StoreError::NotFound(format!("event {}", event.id)))?;
        *slot = event.clone();
        Ok(())
    }

    async fn delete_event(&self, id: Uuid) -> StoreResult<()> {
        self.data.lock().await.events.remove(&id).map(|_| ()).ok_or_else(|| StoreError::NotFound(format!("event {id}")))
    }

    async fn list_events(&self, filter: &EventFilter) -> StoreResult<(Vec<Event>, i64)> {
        let data = self.data.lock().await;
        let mut events: Vec<Event> = data.events.values().filter(|e| filter.matches(e)).cloned().collect();
        events.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
        let total = events.len() as i64;
        Ok((paginate(events, filter.page, filter.per_page), total))
    }

    async fn count_events(&self, filter: &EventFilter) -> StoreResult<i64> {
        Ok(self.data.lock().await.events.values().filter(|e| filter.matches(e)).count() as i64)
    }

    async fn insert_verification(&self, verification: &Verification) -> StoreResult<()> {
        self.data.lock().await.verifications.insert(verification.id, verification.clone());
        Ok(())
    }

    async fn get_verification(&self, id: Uuid) -> StoreResult<Option<Verification>> {
        Ok(self.data.lock().await.verifications.get(&id).cloned())
    }

    async fn update_verification(&self, verification: &Verification) -> StoreResult<()> {
        let mut data = self.data.lock().await;
        let slot = data.verifications.get_mut(&verification.id)
            .ok_or_else(|| StoreError::NotFound(format!("verification {}", verification.id)))?;
        slot.status = verification.status;
        Ok(())
    }

    async fn verifications_for_artist(&self, artist_id: Uuid) -> StoreResult<Vec<Verification>> {
        let data = self.data.lock().await;
        let mut found: Vec<Verification> = data.verifications.values().filter(|v| v.artist_id == artist_id).cloned().collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn list_verifications(&self, status: Option<VerificationStatus>) -> StoreResult<Vec<Verification>> {
        let data = self.data.lock().await;
        let mut found: Vec<Verification> = data.verifications.values().filter(|v| status.map_or(true, |s| v.status == s)).cloned().collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn insert_report(&self, report: &EmailReport) -> StoreResult<()> {
        self.data.lock().await.reports.push(report.clone());
        Ok(())
    }

    async fn count_reports_by_kind(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> StoreResult<Vec<(ReportKind, i64)>> {
        let data = self.data.lock().await;
        let mut counts: HashMap<ReportKind, i64> = HashMap::new();
        for r in data.reports.iter().filter(|r| r.created_at >= from && r.created_at < to) {
            *counts.entry(r.kind).or_default() += 1;
        }
        let mut counts: Vec<(ReportKind, i64)> = counts.into_iter().collect();
        counts.sort();
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::order::tests::paid_order;
    use crate::domain::aggregates::product::tests::hoodie;
    use crate::store::StockDecrement;

    fn completion(order: Order, product_id: Uuid, quantity: u32) -> CheckoutCompletion {
        CheckoutCompletion {
            order,
            stock: vec![StockDecrement { product_id, color: "Black".into(), size: Some("M".into()), quantity }],
            clear_cart: None,
            redeem_card: None,
        }
    }

    #[tokio::test]
    async fn test_complete_checkout_is_idempotent() {
        let store = MemoryStore::new();
        let product = hoodie();
        store.insert_product(&product).await.unwrap();

        let order = paid_order(None, product.id);
        let replay = order.clone();
        let first = store.complete_checkout(completion(order, product.id, 2)).await.unwrap();
        assert!(matches!(first, CompletionOutcome::Recorded { ref stock_events } if stock_events.is_empty()));

        let second = store.complete_checkout(completion(replay, product.id, 2)).await.unwrap();
        assert!(matches!(second, CompletionOutcome::AlreadyRecorded { .. }));

        let stored = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(stored.units_available("Black", Some("M")).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_oversell_is_clamped_and_reported() {
        let store = MemoryStore::new();
        let product = hoodie();
        store.insert_product(&product).await.unwrap();

        let outcome = store.complete_checkout(completion(paid_order(None, product.id), product.id, 5)).await.unwrap();
        match outcome {
            CompletionOutcome::Recorded { stock_events } => assert_eq!(stock_events.len(), 1),
            other => panic!("unexpected {other:?}"),
        }
        let stored = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(stored.units_available("Black", Some("M")).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_vote_conflicts() {
        let store = MemoryStore::new();
        let vote = ProductVote { user_product_id: Uuid::now_v7(), user_id: Uuid::now_v7(), voted_at: Utc::now() };
        store.insert_vote(&vote).await.unwrap();
        assert!(matches!(store.insert_vote(&vote).await, Err(StoreError::Conflict(_))));
        assert!(store.voted_user_product_ids(vote.user_id).await.unwrap().contains(&vote.user_product_id));
    }

    #[tokio::test]
    async fn test_best_seller_counts_units() {
        let store = MemoryStore::new();
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        store.complete_checkout(completion(paid_order(None, a), a, 0)).await.unwrap();
        let mut big = paid_order(None, b);
        big.items[0].quantity = 7;
        store.complete_checkout(completion(big, b, 0)).await.unwrap();
        assert_eq!(store.best_selling_product().await.unwrap(), Some((b, 7)));
    }
}
