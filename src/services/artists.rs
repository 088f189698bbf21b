use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{Artist, Order, OrderItem, User, UserRole};
use crate::error::{AppError, Result};
use crate::notify::{publish_all, Notifier};
use crate::services::admin::{country_key, is_sale, year_bounds};
use crate::services::Actor;
use crate::store::{Category, EventFilter, Store};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ArtistRegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(max = 100))]
    #[serde(default)]
    pub first_name: String,
    #[validate(length(max = 100))]
    #[serde(default)]
    pub last_name: String,
    #[validate(length(min = 1, max = 100))]
    pub artist_name: String,
    #[validate(url)]
    pub url: Option<String>,
    pub main_view_photo: Option<String>,
    pub main_color: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ArtistDashboard {
    /// `PENDING`, `ACCEPTED` or `REJECTED` once a request exists, otherwise
    /// `Verified` / `Not Verified`.
    pub verification_status: String,
    pub future_events: i64,
    pub past_events: i64,
    /// Item name to order lines sold.
    pub order_item_count: BTreeMap<String, i64>,
    /// Shipping country to order lines sold.
    pub most_country_sold: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtistMonthlySales {
    pub month: u32,
    pub units_sold: i64,
}

#[derive(Debug, Serialize)]
pub struct ArtistCard {
    pub id: Uuid,
    pub name: String,
    pub main_photo: Option<String>,
    pub main_color: Option<String>,
}

/// The caller's artist profile. Other roles are turned away before storage
/// is consulted.
pub(crate) async fn require_artist(store: &dyn Store, actor: Actor) -> Result<Artist> {
    if actor.role != UserRole::Artist {
        return Err(AppError::Forbidden("Only artists can perform this action".into()));
    }
    store.get_artist(actor.user_id).await?.ok_or_else(|| AppError::NotFound("Artist not found".into()))
}

pub struct ArtistService {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
}

impl ArtistService {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Self { Self { store, notifier } }

    #[instrument(skip(self, request), fields(user_id = %actor.user_id))]
    pub async fn register(&self, actor: Actor, request: ArtistRegisterRequest) -> Result<Artist> {
        request.validate()?;
        let artist_name = request.artist_name.trim().to_string();
        if self.store.get_user(actor.user_id).await?.is_some() {
            return Err(AppError::Duplicate("Profile already registered".into()));
        }
        if self.store.find_artist_by_name(&artist_name).await?.is_some() {
            return Err(AppError::Duplicate("An artist with that name is already registered".into()));
        }
        let user = User {
            id: actor.user_id,
            email: request.email.trim().to_lowercase(),
            username: artist_name.clone(),
            first_name: request.first_name.trim().to_string(),
            last_name: request.last_name.trim().to_string(),
            phone: None, address: None, postal_code: None, city: None, country: None,
            role: UserRole::Artist,
            points: 0,
            created_at: Utc::now(),
        };
        let mut artist = Artist::register(actor.user_id, artist_name, request.url, request.main_view_photo, request.main_color);
        self.store.insert_artist(&user, &artist).await.map_err(|e| match AppError::from(e) {
            AppError::Duplicate(_) => AppError::Duplicate("Email or artist name already registered".into()),
            other => other,
        })?;
        info!(artist_name = %artist.artist_name, "artist registered");
        publish_all(self.notifier.as_ref(), &artist.take_events()).await;
        Ok(artist)
    }

    #[instrument(skip(self), fields(user_id = %actor.user_id))]
    pub async fn dashboard(&self, actor: Actor, year: i32) -> Result<ArtistDashboard> {
        let artist = require_artist(self.store.as_ref(), actor).await?;
        let (from, to) = year_bounds(year)?;
        let today = Utc::now().date_naive();

        let verification_status = match self.store.verifications_for_artist(artist.user_id).await?.first() {
            Some(latest) => latest.status.as_str().to_string(),
            None if artist.verified => "Verified".to_string(),
            None => "Not Verified".to_string(),
        };

        let (year_start, next_year) = (from.date_naive(), to.date_naive());
        let between = |start: NaiveDate, end: NaiveDate| EventFilter {
            artist_id: Some(artist.user_id), from: Some(start), until: Some(end), ..Default::default()
        };
        let split = today.clamp(year_start, next_year);
        let past_events = self.store.count_events(&between(year_start, split)).await?;
        let future_events = self.store.count_events(&between(split, next_year)).await?;

        let products = self.artist_products(&artist).await?;
        let orders = self.store.orders_created_between(from, to).await?;
        let mut order_item_count = BTreeMap::new();
        let mut most_country_sold = BTreeMap::new();
        for (order, item) in sold_lines(&orders, &products) {
            *order_item_count.entry(item.name.clone()).or_default() += 1;
            *most_country_sold.entry(country_key(order)).or_default() += 1;
        }
        Ok(ArtistDashboard { verification_status, future_events, past_events, order_item_count, most_country_sold })
    }

    /// Units of the artist's products sold per month, months without sales left out.
    pub async fn monthly_sales(&self, actor: Actor, year: i32) -> Result<Vec<ArtistMonthlySales>> {
        let artist = require_artist(self.store.as_ref(), actor).await?;
        let (from, to) = year_bounds(year)?;
        let products = self.artist_products(&artist).await?;
        let orders = self.store.orders_created_between(from, to).await?;
        let mut by_month: BTreeMap<u32, i64> = BTreeMap::new();
        for (order, item) in sold_lines(&orders, &products) {
            *by_month.entry(order.created_at.month()).or_default() += i64::from(item.quantity);
        }
        Ok(by_month.into_iter().map(|(month, units_sold)| ArtistMonthlySales { month, units_sold }).collect())
    }

    pub async fn main_view(&self) -> Result<Vec<ArtistCard>> {
        Ok(self.store.verified_artists().await?.into_iter().map(|a| ArtistCard {
            id: a.user_id, name: a.artist_name, main_photo: a.main_view_photo, main_color: a.main_color,
        }).collect())
    }

    /// Products filed under the category named after the artist.
    async fn artist_products(&self, artist: &Artist) -> Result<HashSet<Uuid>> {
        match self.store.find_category_by_slug(&Category::slug_for(&artist.category_name())).await? {
            Some(category) => Ok(self.store.product_ids_in_category(category.id).await?),
            None => Ok(HashSet::new()),
        }
    }
}

fn sold_lines<'a>(orders: &'a [Order], products: &'a HashSet<Uuid>) -> impl Iterator<Item = (&'a Order, &'a OrderItem)> {
    orders.iter().filter(|o| is_sale(o))
        .flat_map(|o| o.items.iter().map(move |i| (o, i)))
        .filter(|(_, i)| products.contains(&i.product_id))
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::domain::aggregates::artist::tests::{artist, details};
    use crate::domain::aggregates::order::tests::paid_order;
    use crate::domain::aggregates::{Event, OrderStatus, Verification};
    use crate::notify::RecordingNotifier;
    use crate::store::{CheckoutCompletion, MemoryStore};

    pub(crate) fn artist_actor(user_id: Uuid) -> Actor { Actor { user_id, role: UserRole::Artist } }

    pub(crate) fn registration(email: &str, name: &str) -> ArtistRegisterRequest {
        ArtistRegisterRequest {
            email: email.into(), first_name: "Luna".into(), last_name: "Roja".into(), artist_name: name.into(),
            url: Some("https://lunaroja.example".into()), main_view_photo: Some("/luna.png".into()), main_color: None,
        }
    }

    fn service() -> (Arc<MemoryStore>, Arc<RecordingNotifier>, ArtistService) {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        (store.clone(), notifier.clone(), ArtistService::new(store, notifier))
    }

    async fn record(store: &MemoryStore, order: Order) {
        store.complete_checkout(CheckoutCompletion { order, stock: vec![], clear_cart: None, redeem_card: None }).await.unwrap();
    }

    #[tokio::test]
    async fn test_register_artist() {
        let (store, notifier, artists) = service();
        let me = artist_actor(Uuid::now_v7());
        let registered = artists.register(me, registration("Luna@Example.com", " Luna Roja ")).await.unwrap();
        assert_eq!(registered.artist_name, "Luna Roja");
        assert!(!registered.verified);
        let user = store.get_user(me.user_id).await.unwrap().unwrap();
        assert_eq!((user.email.as_str(), user.username.as_str(), user.role), ("luna@example.com", "Luna Roja", UserRole::Artist));
        assert_eq!(notifier.subjects().await, vec!["artists_heaven.artist.registered"]);

        let same_name = artists.register(artist_actor(Uuid::now_v7()), registration("other@example.com", "luna roja")).await;
        assert!(matches!(same_name, Err(AppError::Duplicate(m)) if m.contains("artist with that name")));
        let same_email = artists.register(artist_actor(Uuid::now_v7()), registration("luna@example.com", "Sol")).await;
        assert!(matches!(same_email, Err(AppError::Duplicate(_))));
        let bad_url = ArtistRegisterRequest { url: Some("not a url".into()), ..registration("x@example.com", "X") };
        assert!(matches!(artists.register(artist_actor(Uuid::now_v7()), bad_url).await, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_dashboard_counts_events_and_sales() {
        let (store, _, artists) = service();
        let owner = artist(Uuid::now_v7(), true);
        store.insert_artist(&crate::domain::aggregates::user::tests::user(), &owner).await.unwrap();
        let category = Category { id: Uuid::now_v7(), name: owner.category_name(), slug: Category::slug_for(&owner.category_name()), description: None };
        store.insert_category(&category).await.unwrap();
        let mut product = crate::domain::aggregates::product::tests::hoodie();
        product.category_ids = vec![category.id];
        store.insert_product(&product).await.unwrap();

        let today = Utc::now().date_naive();
        let year = today.year();
        let mut past = Event::schedule(&owner, details(today), today).unwrap();
        past.date = NaiveDate::from_ymd_opt(year, 1, 1).unwrap();
        let upcoming = Event::schedule(&owner, details(today), today).unwrap();
        store.insert_event(&past).await.unwrap();
        store.insert_event(&upcoming).await.unwrap();

        let mut sold = paid_order(None, product.id);
        sold.shipping_address.country = Some("es".into());
        record(&store, sold).await;
        let mut returned = paid_order(None, product.id);
        returned.status = OrderStatus::ReturnAccepted;
        record(&store, returned).await;
        record(&store, paid_order(None, Uuid::now_v7())).await;

        let dashboard = artists.dashboard(artist_actor(owner.user_id), year).await.unwrap();
        assert_eq!(dashboard.verification_status, "Verified");
        // Jan 1st counts as past unless today is Jan 1st.
        assert_eq!(dashboard.past_events + dashboard.future_events, 2);
        assert!(dashboard.future_events >= 1);
        assert_eq!(dashboard.order_item_count.get("Night Hoodie"), Some(&1));
        assert_eq!(dashboard.most_country_sold.get("ES"), Some(&1));

        store.insert_verification(&Verification::request(&owner, "https://videos.example/v.mp4")).await.unwrap();
        assert_eq!(artists.dashboard(artist_actor(owner.user_id), year).await.unwrap().verification_status, "PENDING");
    }

    #[tokio::test]
    async fn test_monthly_sales_skip_returns_and_other_products() {
        let (store, _, artists) = service();
        let owner = artist(Uuid::now_v7(), true);
        store.insert_artist(&crate::domain::aggregates::user::tests::user(), &owner).await.unwrap();
        let category = Category { id: Uuid::now_v7(), name: owner.category_name(), slug: Category::slug_for(&owner.category_name()), description: None };
        store.insert_category(&category).await.unwrap();
        let mut product = crate::domain::aggregates::product::tests::hoodie();
        product.category_ids = vec![category.id];
        store.insert_product(&product).await.unwrap();

        let year = Utc::now().year() - 1;
        let at = |month: u32| Utc.with_ymd_and_hms(year, month, 5, 10, 0, 0).unwrap();
        for (month, status, product_id) in [
            (2, OrderStatus::Delivered, product.id),
            (2, OrderStatus::Paid, product.id),
            (5, OrderStatus::ReturnAccepted, product.id),
            (7, OrderStatus::Paid, Uuid::now_v7()),
        ] {
            let mut order = paid_order(None, product_id);
            order.created_at = at(month);
            order.status = status;
            record(&store, order).await;
        }
        let sales = artists.monthly_sales(artist_actor(owner.user_id), year).await.unwrap();
        assert_eq!(sales, vec![ArtistMonthlySales { month: 2, units_sold: 4 }]);
        assert!(matches!(artists.monthly_sales(artist_actor(owner.user_id), 1990).await, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_only_artists_reach_artist_views() {
        let (store, _, artists) = service();
        let fan = Actor { user_id: Uuid::now_v7(), role: UserRole::User };
        assert!(matches!(artists.dashboard(fan, Utc::now().year()).await, Err(AppError::Forbidden(_))));
        assert!(matches!(artists.dashboard(artist_actor(Uuid::now_v7()), Utc::now().year()).await, Err(AppError::NotFound(_))));

        let hidden = artist(Uuid::now_v7(), false);
        let mut shown = artist(Uuid::now_v7(), true);
        shown.artist_name = "Sol".into();
        let mut other = crate::domain::aggregates::user::tests::user();
        other.email = "sol@example.com".into();
        store.insert_artist(&crate::domain::aggregates::user::tests::user(), &hidden).await.unwrap();
        store.insert_artist(&other, &shown).await.unwrap();
        let cards = artists.main_view().await.unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].name, "Sol");
    }
}
