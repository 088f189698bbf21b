//! Persistence port. `PgStore` backs production, `MemoryStore` backs tests and
//! database-less development runs.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{
    Artist, Cart, CartOwner, EmailReport, Event, Order, OrderStatus, Product, ProductVote, Rating, ReportKind, RewardCard,
    SubmissionStatus, User, UserProduct, Verification, VerificationStatus,
};
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::Section;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0} already exists")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("stored data is corrupt: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => Self::NotFound("row".into()),
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::Conflict(db.constraint().unwrap_or("record").to_string()),
            _ => Self::Database(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub section: Option<Section>,
    pub search: Option<String>,
    pub only_available: bool,
    pub page: u32,
    pub per_page: u32,
}

impl ProductFilter {
    pub fn offset(&self) -> u32 { self.page.saturating_sub(1) * self.per_page }

    pub fn matches(&self, p: &Product) -> bool {
        (!self.only_available || p.available)
            && self.section.map_or(true, |s| p.section == s)
            && self.search.as_deref().map_or(true, |q| p.name.to_lowercase().contains(&q.to_lowercase()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserProductFilter {
    pub status: Option<SubmissionStatus>,
    pub owner_id: Option<Uuid>,
    pub created_since: Option<DateTime<Utc>>,
}

impl UserProductFilter {
    pub fn matches(&self, p: &UserProduct) -> bool {
        self.status.map_or(true, |s| p.status == s)
            && self.owner_id.map_or(true, |o| p.owner_id == o)
            && self.created_since.map_or(true, |t| p.created_at >= t)
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub artist_id: Option<Uuid>,
    pub from: Option<NaiveDate>,
    /// Exclusive.
    pub until: Option<NaiveDate>,
    pub page: u32,
    pub per_page: u32,
}

impl EventFilter {
    pub fn offset(&self) -> u32 { self.page.saturating_sub(1) * self.per_page }

    pub fn matches(&self, e: &Event) -> bool {
        self.artist_id.map_or(true, |a| e.artist_id == a)
            && self.from.map_or(true, |d| e.date >= d)
            && self.until.map_or(true, |d| e.date < d)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category { pub id: Uuid, pub name: String, pub slug: String, pub description: Option<String> }

impl Category {
    pub fn slug_for(name: &str) -> String { name.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join("-") }
}

/// Named group of products that can be featured on the storefront.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Collection { pub id: Uuid, pub name: String, pub promoted: bool, pub created_at: DateTime<Utc> }

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ProductCounts { pub not_available: i64, pub available: i64, pub promoted: i64, pub total: i64 }

/// Units leaving the warehouse for one order line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockDecrement { pub product_id: Uuid, pub color: String, pub size: Option<String>, pub quantity: u32 }

/// Everything a completed checkout writes, applied as one unit.
#[derive(Debug, Clone)]
pub struct CheckoutCompletion {
    pub order: Order,
    pub stock: Vec<StockDecrement>,
    pub clear_cart: Option<CartOwner>,
    pub redeem_card: Option<Uuid>,
}

#[derive(Debug)]
pub enum CompletionOutcome {
    /// The order was written; `stock_events` holds oversell notices.
    Recorded { stock_events: Vec<DomainEvent> },
    /// An order for the same checkout session already exists; nothing was written.
    AlreadyRecorded { order_id: Uuid },
}

#[async_trait]
pub trait Store: Send + Sync {
    // Users
    async fn insert_user(&self, user: &User) -> StoreResult<()>;
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn update_user(&self, user: &User) -> StoreResult<()>;
    /// Adds `delta` points, flooring at zero, and returns the updated user.
    async fn adjust_points(&self, user_id: Uuid, delta: i32) -> StoreResult<User>;
    /// Users whose username contains `search`, ordered by role then username.
    async fn list_users(&self, search: Option<&str>, page: u32, per_page: u32) -> StoreResult<(Vec<User>, i64)>;

    // Catalog
    async fn insert_product(&self, product: &Product) -> StoreResult<()>;
    async fn update_product(&self, product: &Product) -> StoreResult<()>;
    async fn get_product(&self, id: Uuid) -> StoreResult<Option<Product>>;
    async fn list_products(&self, filter: &ProductFilter) -> StoreResult<(Vec<Product>, i64)>;
    /// Available products ordered by average rating, best first.
    async fn top_rated_products(&self, limit: u32) -> StoreResult<Vec<Product>>;
    /// Product with the most units sold, with that count.
    async fn best_selling_product(&self) -> StoreResult<Option<(Uuid, i64)>>;
    async fn list_categories(&self) -> StoreResult<Vec<Category>>;
    async fn insert_category(&self, category: &Category) -> StoreResult<()>;
    async fn get_category(&self, id: Uuid) -> StoreResult<Option<Category>>;
    async fn find_category_by_slug(&self, slug: &str) -> StoreResult<Option<Category>>;
    /// Fails with `Conflict` when another category already uses the slug.
    async fn update_category(&self, category: &Category) -> StoreResult<()>;
    async fn product_ids_in_category(&self, category_id: Uuid) -> StoreResult<HashSet<Uuid>>;
    async fn product_counts(&self) -> StoreResult<ProductCounts>;

    // Collections
    /// Fails with `Conflict` on a name already in use.
    async fn insert_collection(&self, collection: &Collection) -> StoreResult<()>;
    async fn get_collection(&self, id: Uuid) -> StoreResult<Option<Collection>>;
    async fn update_collection(&self, collection: &Collection) -> StoreResult<()>;
    async fn list_collections(&self) -> StoreResult<Vec<Collection>>;

    // Carts
    /// Returns an empty cart when the owner has none yet.
    async fn load_cart(&self, owner: &CartOwner) -> StoreResult<Cart>;
    async fn save_cart(&self, cart: &Cart) -> StoreResult<()>;

    // Orders
    async fn complete_checkout(&self, completion: CheckoutCompletion) -> StoreResult<CompletionOutcome>;
    async fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>>;
    async fn find_order_by_number(&self, order_number: &str) -> StoreResult<Option<Order>>;
    async fn find_order_by_checkout_session(&self, session_id: &str) -> StoreResult<Option<Order>>;
    async fn orders_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Order>>;
    async fn list_orders(&self, status: Option<OrderStatus>, page: u32, per_page: u32) -> StoreResult<(Vec<Order>, i64)>;
    async fn orders_created_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> StoreResult<Vec<Order>>;
    /// Persists status and return request changes.
    async fn update_order(&self, order: &Order) -> StoreResult<()>;

    // Ratings
    async fn insert_rating(&self, rating: &Rating) -> StoreResult<()>;
    async fn ratings_for_product(&self, product_id: Uuid) -> StoreResult<Vec<Rating>>;

    // Community submissions
    async fn insert_user_product(&self, product: &UserProduct) -> StoreResult<()>;
    async fn get_user_product(&self, id: Uuid) -> StoreResult<Option<UserProduct>>;
    async fn update_user_product(&self, product: &UserProduct) -> StoreResult<()>;
    async fn count_user_products(&self, filter: &UserProductFilter) -> StoreResult<i64>;
    async fn list_user_products(&self, filter: &UserProductFilter) -> StoreResult<Vec<UserProduct>>;
    /// Fails with `Conflict` when the user already voted for the product.
    async fn insert_vote(&self, vote: &ProductVote) -> StoreResult<()>;
    async fn voted_user_product_ids(&self, user_id: Uuid) -> StoreResult<HashSet<Uuid>>;

    // Reward cards
    /// Stores the card and takes its points from the owner in one step.
    async fn issue_reward_card(&self, card: &RewardCard) -> StoreResult<()>;
    async fn active_reward_card(&self, user_id: Uuid) -> StoreResult<Option<RewardCard>>;
    async fn reward_cards_for_user(&self, user_id: Uuid) -> StoreResult<Vec<RewardCard>>;

    // Artists
    /// Stores the account and its artist profile together. Fails with
    /// `Conflict` on a taken email or artist name.
    async fn insert_artist(&self, user: &User, artist: &Artist) -> StoreResult<()>;
    async fn get_artist(&self, user_id: Uuid) -> StoreResult<Option<Artist>>;
    /// Case-insensitive.
    async fn find_artist_by_name(&self, artist_name: &str) -> StoreResult<Option<Artist>>;
    async fn update_artist(&self, artist: &Artist) -> StoreResult<()>;
    async fn verified_artists(&self) -> StoreResult<Vec<Artist>>;

    // Events, soonest first
    async fn insert_event(&self, event: &Event) -> StoreResult<()>;
    async fn get_event(&self, id: Uuid) -> StoreResult<Option<Event>>;
    async fn update_event(&self, event: &Event) -> StoreResult<()>;
    async fn delete_event(&self, id: Uuid) -> StoreResult<()>;
    async fn list_events(&self, filter: &EventFilter) -> StoreResult<(Vec<Event>, i64)>;
    /// Ignores the filter's paging.
    async fn count_events(&self, filter: &EventFilter) -> StoreResult<i64>;

    // Verification requests, newest first
    async fn insert_verification(&self, verification: &Verification) -> StoreResult<()>;
    async fn get_verification(&self, id: Uuid) -> StoreResult<Option<Verification>>;
    async fn update_verification(&self, verification: &Verification) -> StoreResult<()>;
    async fn verifications_for_artist(&self, artist_id: Uuid) -> StoreResult<Vec<Verification>>;
    async fn list_verifications(&self, status: Option<VerificationStatus>) -> StoreResult<Vec<Verification>>;

    // Reports
    async fn insert_report(&self, report: &EmailReport) -> StoreResult<()>;
    async fn count_reports_by_kind(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> StoreResult<Vec<(ReportKind, i64)>>;
}
