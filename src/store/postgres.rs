use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPool;
use sqlx::types::Json;
use sqlx::FromRow;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::aggregates::{
    Artist, Cart, CartItem, CartOwner, EmailReport, Event, Order, OrderItem, OrderStatus, Product, ProductColor, ProductVote,
    Rating, ReportKind, ReturnRequest, RewardCard, ShippingAddress, SubmissionStatus, User, UserProduct, Verification,
    VerificationStatus,
};
use crate::domain::value_objects::{Score, Section};
use crate::store::{
    Category, CheckoutCompletion, Collection, CompletionOutcome, EventFilter, ProductCounts, ProductFilter, Store,
    StoreError, StoreResult, UserProductFilter,
};

const ORDER_COLUMNS: &str = "id, order_number, user_id, email, phone, shipping_address, total, discount, payment_intent, checkout_session_id, status, created_at, updated_at";

const EVENT_WHERE: &str = "WHERE ($1::UUID IS NULL OR artist_id = $1) AND ($2::DATE IS NULL OR date >= $2) AND ($3::DATE IS NULL OR date < $3)";

/// Postgres-backed store. Schema lives in `migrations/`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    async fn hydrate_orders(&self, rows: Vec<OrderRow>) -> StoreResult<Vec<Order>> {
        if rows.is_empty() { return Ok(vec![]); }
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let items = sqlx::query_as::<_, OrderItemRow>("SELECT * FROM order_items WHERE order_id = ANY($1)")
            .bind(&ids).fetch_all(&self.pool).await?;
        let returns = sqlx::query_as::<_, ReturnRow>("SELECT * FROM return_requests WHERE order_id = ANY($1)")
            .bind(&ids).fetch_all(&self.pool).await?;

        let mut items_by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in items {
            let order_id = row.order_id;
            items_by_order.entry(order_id).or_default().push(row.try_into()?);
        }
        let mut returns_by_order: HashMap<Uuid, ReturnRequest> =
            returns.into_iter().map(|r| (r.order_id, ReturnRequest { id: r.id, reason: r.reason, requested_at: r.requested_at })).collect();

        rows.into_iter().map(|row| {
            let items = items_by_order.remove(&row.id).unwrap_or_default();
            let ret = returns_by_order.remove(&row.id);
            row.into_order(items, ret)
        }).collect()
    }
}

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    username: String,
    first_name: String,
    last_name: String,
    phone: Option<String>,
    address: Option<String>,
    postal_code: Option<String>,
    city: Option<String>,
    country: Option<String>,
    role: String,
    points: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;
    fn try_from(r: UserRow) -> StoreResult<Self> {
        Ok(User {
            id: r.id, email: r.email, username: r.username, first_name: r.first_name, last_name: r.last_name,
            phone: r.phone, address: r.address, postal_code: r.postal_code, city: r.city, country: r.country,
            role: r.role.parse().map_err(StoreError::Corrupt)?, points: r.points, created_at: r.created_at,
        })
    }
}

#[derive(FromRow)]
struct ProductRow {
    id: Uuid,
    reference: i64,
    name: String,
    description: String,
    price: Decimal,
    section: String,
    available: bool,
    on_promotion: bool,
    discount: i32,
    category_ids: Vec<Uuid>,
    images: Vec<String>,
    composition: String,
    shipping_details: String,
    colors: Json<Vec<ProductColor>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;
    fn try_from(r: ProductRow) -> StoreResult<Self> {
        let section: Section = r.section.parse().map_err(|e| StoreError::Corrupt(format!("{e}")))?;
        Ok(Product::restore(
            r.id, r.reference, r.name, r.description, r.price, section, r.available, r.on_promotion, r.discount,
            r.category_ids, r.images, r.composition, r.shipping_details, r.colors.0, r.created_at, r.updated_at,
        ))
    }
}

#[derive(FromRow)]
struct CartRow {
    owner: Json<CartOwner>,
    items: Json<Vec<CartItem>>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    user_id: Option<Uuid>,
    email: String,
    phone: Option<String>,
    shipping_address: Json<ShippingAddress>,
    total: Decimal,
    discount: Decimal,
    payment_intent: Option<String>,
    checkout_session_id: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>, return_request: Option<ReturnRequest>) -> StoreResult<Order> {
        let status: OrderStatus = self.status.parse().map_err(|e| StoreError::Corrupt(format!("{e}")))?;
        Ok(Order::restore(
            self.id, self.order_number, self.user_id, self.email, self.phone, self.shipping_address.0, self.total,
            self.discount, self.payment_intent, self.checkout_session_id, status, items, return_request,
            self.created_at, self.updated_at,
        ))
    }
}

#[derive(FromRow)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    name: String,
    section: String,
    size: Option<String>,
    color: String,
    quantity: i32,
    unit_price: Decimal,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = StoreError;
    fn try_from(r: OrderItemRow) -> StoreResult<Self> {
        Ok(OrderItem {
            id: r.id, product_id: r.product_id, name: r.name,
            section: r.section.parse().map_err(|e| StoreError::Corrupt(format!("{e}")))?,
            size: r.size, color: r.color,
            quantity: u32::try_from(r.quantity).map_err(|_| StoreError::Corrupt(format!("order item quantity {}", r.quantity)))?,
            unit_price: r.unit_price,
        })
    }
}

#[derive(FromRow)]
struct ReturnRow {
    id: Uuid,
    order_id: Uuid,
    reason: String,
    requested_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct RatingRow {
    id: Uuid,
    product_id: Uuid,
    user_id: Uuid,
    score: i16,
    comment: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<RatingRow> for Rating {
    type Error = StoreError;
    fn try_from(r: RatingRow) -> StoreResult<Self> {
        let score = Score::new(i32::from(r.score)).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        Ok(Rating { id: r.id, product_id: r.product_id, user_id: r.user_id, score, comment: r.comment, created_at: r.created_at })
    }
}

#[derive(FromRow)]
struct UserProductRow {
    id: Uuid,
    owner_id: Uuid,
    name: String,
    images: Vec<String>,
    status: String,
    num_votes: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserProductRow> for UserProduct {
    type Error = StoreError;
    fn try_from(r: UserProductRow) -> StoreResult<Self> {
        let status = SubmissionStatus::parse(&r.status).ok_or_else(|| StoreError::Corrupt(format!("submission status {}", r.status)))?;
        Ok(UserProduct::restore(r.id, r.owner_id, r.name, r.images, status, r.num_votes, r.created_at))
    }
}

#[derive(FromRow)]
struct RewardCardRow {
    id: Uuid,
    user_id: Uuid,
    required_points: i32,
    discount_percentage: i32,
    redeemed: bool,
    created_at: DateTime<Utc>,
    redeemed_at: Option<DateTime<Utc>>,
}

impl From<RewardCardRow> for RewardCard {
    fn from(r: RewardCardRow) -> Self {
        RewardCard {
            id: r.id, user_id: r.user_id, required_points: r.required_points, discount_percentage: r.discount_percentage,
            redeemed: r.redeemed, created_at: r.created_at, redeemed_at: r.redeemed_at,
        }
    }
}

#[derive(FromRow)]
struct ArtistRow {
    user_id: Uuid,
    artist_name: String,
    url: Option<String>,
    verified: bool,
    main_view_photo: Option<String>,
    main_color: Option<String>,
}

impl From<ArtistRow> for Artist {
    fn from(r: ArtistRow) -> Self { Artist::restore(r.user_id, r.artist_name, r.url, r.verified, r.main_view_photo, r.main_color) }
}

#[derive(FromRow)]
struct EventRow {
    id: Uuid,
    artist_id: Uuid,
    name: String,
    description: String,
    date: NaiveDate,
    location: String,
    more_info: Option<String>,
    image: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl From<EventRow> for Event {
    fn from(r: EventRow) -> Self {
        Event {
            id: r.id, artist_id: r.artist_id, name: r.name, description: r.description, date: r.date, location: r.location,
            more_info: r.more_info, image: r.image, latitude: r.latitude, longitude: r.longitude,
        }
    }
}

#[derive(FromRow)]
struct VerificationRow {
    id: Uuid,
    artist_id: Uuid,
    video_url: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<VerificationRow> for Verification {
    type Error = StoreError;
    fn try_from(r: VerificationRow) -> StoreResult<Self> {
        let status = VerificationStatus::parse(&r.status).ok_or_else(|| StoreError::Corrupt(format!("verification status {}", r.status)))?;
        Ok(Verification::restore(r.id, r.artist_id, r.video_url, status, r.created_at))
    }
}

fn collect<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[async_trait]
impl Store for PgStore {
    async fn insert_user(&self, u: &User) -> StoreResult<()> {
        sqlx::query("INSERT INTO users (id, email, username, first_name, last_name, phone, address, postal_code, city, country, role, points, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)")
            .bind(u.id).bind(&u.email).bind(&u.username).bind(&u.first_name).bind(&u.last_name).bind(&u.phone)
            .bind(&u.address).bind(&u.postal_code).bind(&u.city).bind(&u.country).bind(u.role.as_str()).bind(u.points).bind(u.created_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1").bind(id).fetch_optional(&self.pool).await?.map(User::try_from).transpose()
    }

    async fn update_user(&self, u: &User) -> StoreResult<()> {
        let done = sqlx::query("UPDATE users SET username = $2, first_name = $3, last_name = $4, phone = $5, address = $6, postal_code = $7, city = $8, country = $9 WHERE id = $1")
            .bind(u.id).bind(&u.username).bind(&u.first_name).bind(&u.last_name).bind(&u.phone).bind(&u.address)
            .bind(&u.postal_code).bind(&u.city).bind(&u.country)
            .execute(&self.pool).await?;
        if done.rows_affected() == 0 { return Err(StoreError::NotFound(format!("user {}", u.id))); }
        Ok(())
    }

    async fn adjust_points(&self, user_id: Uuid, delta: i32) -> StoreResult<User> {
        sqlx::query_as::<_, UserRow>("UPDATE users SET points = GREATEST(points + $2, 0) WHERE id = $1 RETURNING *")
            .bind(user_id).bind(delta).fetch_optional(&self.pool).await?
            .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))?
            .try_into()
    }

    async fn list_users(&self, search: Option<&str>, page: u32, per_page: u32) -> StoreResult<(Vec<User>, i64)> {
        const WHERE: &str = "WHERE ($1::TEXT IS NULL OR $1 = '' OR username ILIKE '%' || $1 || '%')";
        let offset = i64::from(page.saturating_sub(1)) * i64::from(per_page);
        let rows = sqlx::query_as::<_, UserRow>(&format!("SELECT * FROM users {WHERE} ORDER BY role, username LIMIT $2 OFFSET $3"))
            .bind(search).bind(i64::from(per_page)).bind(offset).fetch_all(&self.pool).await?;
        let total: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM users {WHERE}")).bind(search).fetch_one(&self.pool).await?;
        Ok((collect(rows)?, total.0))
    }

    async fn insert_product(&self, p: &Product) -> StoreResult<()> {
        sqlx::query("INSERT INTO products (id, reference, name, description, price, section, available, on_promotion, discount, category_ids, images, composition, shipping_details, colors, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)")
            .bind(p.id).bind(p.reference).bind(&p.name).bind(&p.description).bind(p.price).bind(p.section.as_str())
            .bind(p.available).bind(p.on_promotion).bind(p.discount).bind(&p.category_ids).bind(&p.images)
            .bind(&p.composition).bind(&p.shipping_details).bind(Json(&p.colors)).bind(p.created_at).bind(p.updated_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn update_product(&self, p: &Product) -> StoreResult<()> {
        let done = sqlx::query("UPDATE products SET reference = $2, name = $3, description = $4, price = $5, section = $6, available = $7, on_promotion = $8, discount = $9, category_ids = $10, images = $11, composition = $12, shipping_details = $13, colors = $14, updated_at = $15 WHERE id = $1")
            .bind(p.id).bind(p.reference).bind(&p.name).bind(&p.description).bind(p.price).bind(p.section.as_str())
            .bind(p.available).bind(p.on_promotion).bind(p.discount).bind(&p.category_ids).bind(&p.images)
            .bind(&p.composition).bind(&p.shipping_details).bind(Json(&p.colors)).bind(p.updated_at)
            .execute(&self.pool).await?;
        if done.rows_affected() == 0 { return Err(StoreError::NotFound(format!("product {}", p.id))); }
        Ok(())
    }

    async fn get_product(&self, id: Uuid) -> StoreResult<Option<Product>> {
        sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1").bind(id).fetch_optional(&self.pool).await?.map(Product::try_from).transpose()
    }

    async fn list_products(&self, f: &ProductFilter) -> StoreResult<(Vec<Product>, i64)> {
        const WHERE: &str = "WHERE ($1::TEXT IS NULL OR section = $1) AND ($2::TEXT IS NULL OR name ILIKE '%' || $2 || '%') AND (NOT $3 OR available)";
        let section = f.section.map(|s| s.as_str());
        let rows = sqlx::query_as::<_, ProductRow>(&format!("SELECT * FROM products {WHERE} ORDER BY created_at DESC LIMIT $4 OFFSET $5"))
            .bind(section).bind(&f.search).bind(f.only_available).bind(i64::from(f.per_page)).bind(i64::from(f.offset()))
            .fetch_all(&self.pool).await?;
        let total: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM products {WHERE}"))
            .bind(section).bind(&f.search).bind(f.only_available)
            .fetch_one(&self.pool).await?;
        Ok((collect(rows)?, total.0))
    }

    async fn top_rated_products(&self, limit: u32) -> StoreResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>("SELECT p.* FROM products p JOIN ratings r ON r.product_id = p.id WHERE p.available GROUP BY p.id ORDER BY AVG(r.score) DESC, p.created_at LIMIT $1")
            .bind(i64::from(limit)).fetch_all(&self.pool).await?;
        collect(rows)
    }

    async fn best_selling_product(&self) -> StoreResult<Option<(Uuid, i64)>> {
        Ok(sqlx::query_as("SELECT product_id, SUM(quantity)::BIGINT AS sold FROM order_items GROUP BY product_id ORDER BY sold DESC, product_id LIMIT 1")
            .fetch_optional(&self.pool).await?)
    }

    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        Ok(sqlx::query_as::<_, Category>("SELECT id, name, slug, description FROM categories ORDER BY name").fetch_all(&self.pool).await?)
    }

    async fn insert_category(&self, c: &Category) -> StoreResult<()> {
        sqlx::query("INSERT INTO categories (id, name, slug, description) VALUES ($1, $2, $3, $4)")
            .bind(c.id).bind(&c.name).bind(&c.slug).bind(&c.description).execute(&self.pool).await?;
        Ok(())
    }

    async fn get_category(&self, id: Uuid) -> StoreResult<Option<Category>> {
        Ok(sqlx::query_as::<_, Category>("SELECT id, name, slug, description FROM categories WHERE id = $1").bind(id).fetch_optional(&self.pool).await?)
    }

    async fn find_category_by_slug(&self, slug: &str) -> StoreResult<Option<Category>> {
        Ok(sqlx::query_as::<_, Category>("SELECT id, name, slug, description FROM categories WHERE slug = $1").bind(slug).fetch_optional(&self.pool).await?)
    }

    async fn update_category(&self, c: &Category) -> StoreResult<()> {
        let done = sqlx::query("UPDATE categories SET name = $2, slug = $3, description = $4 WHERE id = $1")
            .bind(c.id).bind(&c.name).bind(&c.slug).bind(&c.description).execute(&self.pool).await?;
        if done.rows_affected() == 0 { return Err(StoreError::NotFound(format!("category {}", c.id))); }
        Ok(())
    }

    async fn product_ids_in_category(&self, category_id: Uuid) -> StoreResult<HashSet<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as("SELECT id FROM products WHERE $1 = ANY(category_ids)")
            .bind(category_id).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    async fn product_counts(&self) -> StoreResult<ProductCounts> {
        Ok(sqlx::query_as::<_, ProductCounts>(
            r#"
            SELECT COUNT(*) FILTER (WHERE NOT available) AS not_available,
                   COUNT(*) FILTER (WHERE available) AS available,
                   COUNT(*) FILTER (WHERE on_promotion) AS promoted,
                   COUNT(*) AS total
            FROM products
            "#,
        )
        .fetch_one(&self.pool).await?)
    }

    async fn insert_collection(&self, c: &Collection) -> StoreResult<()> {
        sqlx::query("INSERT INTO collections (id, name, promoted, created_at) VALUES ($1, $2, $3, $4)")
            .bind(c.id).bind(&c.name).bind(c.promoted).bind(c.created_at).execute(&self.pool).await?;
        Ok(())
    }

    async fn get_collection(&self, id: Uuid) -> StoreResult<Option<Collection>> {
        Ok(sqlx::query_as::<_, Collection>("SELECT * FROM collections WHERE id = $1").bind(id).fetch_optional(&self.pool).await?)
    }

    async fn update_collection(&self, c: &Collection) -> StoreResult<()> {
        let done = sqlx::query("UPDATE collections SET name = $2, promoted = $3 WHERE id = $1")
            .bind(c.id).bind(&c.name).bind(c.promoted).execute(&self.pool).await?;
        if done.rows_affected() == 0 { return Err(StoreError::NotFound(format!("collection {}", c.id))); }
        Ok(())
    }

    async fn list_collections(&self) -> StoreResult<Vec<Collection>> {
        Ok(sqlx::query_as::<_, Collection>("SELECT * FROM collections ORDER BY name").fetch_all(&self.pool).await?)
    }

    async fn load_cart(&self, owner: &CartOwner) -> StoreResult<Cart> {
        let row = sqlx::query_as::<_, CartRow>("SELECT owner, items, updated_at FROM carts WHERE owner_key = $1")
            .bind(owner.key()).fetch_optional(&self.pool).await?;
        Ok(match row {
            Some(r) => Cart::restore(r.owner.0, r.items.0, r.updated_at),
            None => Cart::new(owner.clone()),
        })
    }

    async fn save_cart(&self, cart: &Cart) -> StoreResult<()> {
        sqlx::query("INSERT INTO carts (owner_key, owner, items, updated_at) VALUES ($1, $2, $3, $4) ON CONFLICT (owner_key) DO UPDATE SET items = EXCLUDED.items, updated_at = EXCLUDED.updated_at")
            .bind(cart.owner().key()).bind(Json(cart.owner())).bind(Json(cart.items())).bind(cart.updated_at())
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn complete_checkout(&self, completion: CheckoutCompletion) -> StoreResult<CompletionOutcome> {
        let CheckoutCompletion { order: o, stock, clear_cart, redeem_card } = completion;
        let mut tx = self.pool.begin().await?;

        // The unique session id turns a repeated delivery into a no-op insert.
        let inserted: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO orders (id, order_number, user_id, email, phone, shipping_address, total, discount, payment_intent, checkout_session_id, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (checkout_session_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(o.id).bind(&o.order_number).bind(o.user_id).bind(&o.email).bind(&o.phone).bind(Json(&o.shipping_address))
        .bind(o.total).bind(o.discount).bind(&o.payment_intent).bind(&o.checkout_session_id).bind(o.status.as_str())
        .bind(o.created_at).bind(o.updated_at)
        .fetch_optional(&mut *tx).await?;

        if inserted.is_none() {
            tx.rollback().await?;
            let existing: (Uuid,) = sqlx::query_as("SELECT id FROM orders WHERE checkout_session_id = $1")
                .bind(&o.checkout_session_id).fetch_one(&self.pool).await?;
            debug!(checkout_session = %o.checkout_session_id, order_id = %existing.0, "checkout already recorded");
            return Ok(CompletionOutcome::AlreadyRecorded { order_id: existing.0 });
        }

        for item in &o.items {
            let quantity = i32::try_from(item.quantity).map_err(|_| StoreError::Corrupt(format!("quantity {}", item.quantity)))?;
            sqlx::query("INSERT INTO order_items (id, order_id, product_id, name, section, size, color, quantity, unit_price) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)")
                .bind(item.id).bind(o.id).bind(item.product_id).bind(&item.name).bind(item.section.as_str())
                .bind(&item.size).bind(&item.color).bind(quantity).bind(item.unit_price)
                .execute(&mut *tx).await?;
        }

        let mut stock_events = Vec::new();
        for line in &stock {
            let row = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1 FOR UPDATE")
                .bind(line.product_id).fetch_optional(&mut *tx).await?;
            let Some(row) = row else {
                warn!(product_id = %line.product_id, "sold product no longer exists; stock not adjusted");
                continue;
            };
            let mut product = Product::try_from(row)?;
            if let Err(e) = product.remove_stock(&line.color, line.size.as_deref(), line.quantity) {
                warn!(product_id = %line.product_id, error = %e, "could not adjust stock for sold line");
                continue;
            }
            sqlx::query("UPDATE products SET colors = $2, updated_at = $3 WHERE id = $1")
                .bind(product.id).bind(Json(&product.colors)).bind(product.updated_at)
                .execute(&mut *tx).await?;
            stock_events.extend(product.take_events());
        }

        if let Some(owner) = &clear_cart {
            sqlx::query("UPDATE carts SET items = '[]'::JSONB, updated_at = NOW() WHERE owner_key = $1")
                .bind(owner.key()).execute(&mut *tx).await?;
        }
        if let Some(card_id) = redeem_card {
            let done = sqlx::query("UPDATE reward_cards SET redeemed = TRUE, redeemed_at = NOW() WHERE id = $1 AND NOT redeemed")
                .bind(card_id).execute(&mut *tx).await?;
            if done.rows_affected() == 0 { warn!(card_id = %card_id, "reward card used at checkout was missing or already redeemed"); }
        }

        tx.commit().await?;
        Ok(CompletionOutcome::Recorded { stock_events })
    }

    async fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id).fetch_all(&self.pool).await?;
        Ok(self.hydrate_orders(rows).await?.pop())
    }

    async fn find_order_by_number(&self, order_number: &str) -> StoreResult<Option<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_number = $1"))
            .bind(order_number).fetch_all(&self.pool).await?;
        Ok(self.hydrate_orders(rows).await?.pop())
    }

    async fn find_order_by_checkout_session(&self, session_id: &str) -> StoreResult<Option<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE checkout_session_id = $1"))
            .bind(session_id).fetch_all(&self.pool).await?;
        Ok(self.hydrate_orders(rows).await?.pop())
    }

    async fn orders_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC"))
            .bind(user_id).fetch_all(&self.pool).await?;
        self.hydrate_orders(rows).await
    }

    async fn list_orders(&self, status: Option<OrderStatus>, page: u32, per_page: u32) -> StoreResult<(Vec<Order>, i64)> {
        let status = status.map(|s| s.as_str());
        let offset = i64::from(page.saturating_sub(1)) * i64::from(per_page);
        let rows = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE ($1::TEXT IS NULL OR status = $1) ORDER BY created_at DESC LIMIT $2 OFFSET $3"))
            .bind(status).bind(i64::from(per_page)).bind(offset).fetch_all(&self.pool).await?;
        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders WHERE ($1::TEXT IS NULL OR status = $1)")
            .bind(status).fetch_one(&self.pool).await?;
        Ok((self.hydrate_orders(rows).await?, total.0))
    }

    async fn orders_created_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> StoreResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE created_at >= $1 AND created_at < $2 ORDER BY created_at"))
            .bind(from).bind(to).fetch_all(&self.pool).await?;
        self.hydrate_orders(rows).await
    }

    async fn update_order(&self, o: &Order) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let done = sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(o.id).bind(o.status.as_str()).bind(o.updated_at).execute(&mut *tx).await?;
        if done.rows_affected() == 0 { return Err(StoreError::NotFound(format!("order {}", o.id))); }
        if let Some(r) = &o.return_request {
            sqlx::query("INSERT INTO return_requests (id, order_id, reason, requested_at) VALUES ($1, $2, $3, $4) ON CONFLICT (order_id) DO NOTHING")
                .bind(r.id).bind(o.id).bind(&r.reason).bind(r.requested_at).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn insert_rating(&self, r: &Rating) -> StoreResult<()> {
        let score = r.score.value() as i16;
        sqlx::query("INSERT INTO ratings (id, product_id, user_id, score, comment, created_at) VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(r.id).bind(r.product_id).bind(r.user_id).bind(score).bind(&r.comment).bind(r.created_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn ratings_for_product(&self, product_id: Uuid) -> StoreResult<Vec<Rating>> {
        let rows = sqlx::query_as::<_, RatingRow>("SELECT * FROM ratings WHERE product_id = $1 ORDER BY created_at DESC")
            .bind(product_id).fetch_all(&self.pool).await?;
        collect(rows)
    }

    async fn insert_user_product(&self, p: &UserProduct) -> StoreResult<()> {
        sqlx::query("INSERT INTO user_products (id, owner_id, name, images, status, num_votes, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7)")
            .bind(p.id).bind(p.owner_id).bind(&p.name).bind(&p.images).bind(p.status.as_str()).bind(p.num_votes).bind(p.created_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn get_user_product(&self, id: Uuid) -> StoreResult<Option<UserProduct>> {
        sqlx::query_as::<_, UserProductRow>("SELECT * FROM user_products WHERE id = $1").bind(id).fetch_optional(&self.pool).await?
            .map(UserProduct::try_from).transpose()
    }

    async fn update_user_product(&self, p: &UserProduct) -> StoreResult<()> {
        let done = sqlx::query("UPDATE user_products SET status = $2, num_votes = $3 WHERE id = $1")
            .bind(p.id).bind(p.status.as_str()).bind(p.num_votes).execute(&self.pool).await?;
        if done.rows_affected() == 0 { return Err(StoreError::NotFound(format!("user product {}", p.id))); }
        Ok(())
    }

    async fn count_user_products(&self, f: &UserProductFilter) -> StoreResult<i64> {
        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM user_products WHERE ($1::TEXT IS NULL OR status = $1) AND ($2::UUID IS NULL OR owner_id = $2) AND ($3::TIMESTAMPTZ IS NULL OR created_at >= $3)")
            .bind(f.status.map(|s| s.as_str())).bind(f.owner_id).bind(f.created_since)
            .fetch_one(&self.pool).await?;
        Ok(total.0)
    }

    async fn list_user_products(&self, f: &UserProductFilter) -> StoreResult<Vec<UserProduct>> {
        let rows = sqlx::query_as::<_, UserProductRow>("SELECT * FROM user_products WHERE ($1::TEXT IS NULL OR status = $1) AND ($2::UUID IS NULL OR owner_id = $2) AND ($3::TIMESTAMPTZ IS NULL OR created_at >= $3) ORDER BY created_at DESC")
            .bind(f.status.map(|s| s.as_str())).bind(f.owner_id).bind(f.created_since)
            .fetch_all(&self.pool).await?;
        collect(rows)
    }

    async fn insert_vote(&self, v: &ProductVote) -> StoreResult<()> {
        sqlx::query("INSERT INTO product_votes (user_product_id, user_id, voted_at) VALUES ($1, $2, $3)")
            .bind(v.user_product_id).bind(v.user_id).bind(v.voted_at).execute(&self.pool).await?;
        Ok(())
    }

    async fn voted_user_product_ids(&self, user_id: Uuid) -> StoreResult<HashSet<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as("SELECT user_product_id FROM product_votes WHERE user_id = $1")
            .bind(user_id).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    async fn issue_reward_card(&self, c: &RewardCard) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let charged = sqlx::query("UPDATE users SET points = points - $2 WHERE id = $1 AND points >= $2")
            .bind(c.user_id).bind(c.required_points).execute(&mut *tx).await?;
        if charged.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!("points balance of user {} changed", c.user_id)));
        }
        sqlx::query("INSERT INTO reward_cards (id, user_id, required_points, discount_percentage, redeemed, created_at, redeemed_at) VALUES ($1, $2, $3, $4, $5, $6, $7)")
            .bind(c.id).bind(c.user_id).bind(c.required_points).bind(c.discount_percentage).bind(c.redeemed)
            .bind(c.created_at).bind(c.redeemed_at)
            .execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn active_reward_card(&self, user_id: Uuid) -> StoreResult<Option<RewardCard>> {
        Ok(sqlx::query_as::<_, RewardCardRow>("SELECT * FROM reward_cards WHERE user_id = $1 AND NOT redeemed ORDER BY created_at DESC LIMIT 1")
            .bind(user_id).fetch_optional(&self.pool).await?.map(RewardCard::from))
    }

    async fn reward_cards_for_user(&self, user_id: Uuid) -> StoreResult<Vec<RewardCard>> {
        let rows = sqlx::query_as::<_, RewardCardRow>("SELECT * FROM reward_cards WHERE user_id = $1 ORDER BY created_at DESC")
            .bind(user_id).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(RewardCard::from).collect())
    }

    async fn insert_artist(&self, u: &User, a: &Artist) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO users (id, email, username, first_name, last_name, phone, address, postal_code, city, country, role, points, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)")
            .bind(u.id).bind(&u.email).bind(&u.username).bind(&u.first_name).bind(&u.last_name).bind(&u.phone)
            .bind(&u.address).bind(&u.postal_code).bind(&u.city).bind(&u.country).bind(u.role.as_str()).bind(u.points).bind(u.created_at)
            .execute(&mut *tx).await?;
        sqlx::query("INSERT INTO artists (user_id, artist_name, url, verified, main_view_photo, main_color) VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(a.user_id).bind(&a.artist_name).bind(&a.url).bind(a.verified).bind(&a.main_view_photo).bind(&a.main_color)
            .execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_artist(&self, user_id: Uuid) -> StoreResult<Option<Artist>> {
        Ok(sqlx::query_as::<_, ArtistRow>("SELECT * FROM artists WHERE user_id = $1").bind(user_id).fetch_optional(&self.pool).await?.map(Artist::from))
    }

    async fn find_artist_by_name(&self, artist_name: &str) -> StoreResult<Option<Artist>> {
        Ok(sqlx::query_as::<_, ArtistRow>("SELECT * FROM artists WHERE LOWER(artist_name) = LOWER($1)")
            .bind(artist_name.trim()).fetch_optional(&self.pool).await?.map(Artist::from))
    }

    async fn update_artist(&self, a: &Artist) -> StoreResult<()> {
        let done = sqlx::query("UPDATE artists SET artist_name = $2, url = $3, verified = $4, main_view_photo = $5, main_color = $6 WHERE user_id = $1")
            .bind(a.user_id).bind(&a.artist_name).bind(&a.url).bind(a.verified).bind(&a.main_view_photo).bind(&a.main_color)
            .execute(&self.pool).await?;
        if done.rows_affected() == 0 { return Err(StoreError::NotFound(format!("artist {}", a.user_id))); }
        Ok(())
    }

    async fn verified_artists(&self) -> StoreResult<Vec<Artist>> {
        let rows = sqlx::query_as::<_, ArtistRow>("SELECT * FROM artists WHERE verified ORDER BY artist_name").fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Artist::from).collect())
    }

    async fn insert_event(&self, e: &Event) -> StoreResult<()> {
        sqlx::query("INSERT INTO events (id, artist_id, name, description, date, location, more_info, image, latitude, longitude) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)")
            .bind(e.id).bind(e.artist_id).bind(&e.name).bind(&e.description).bind(e.date).bind(&e.location)
            .bind(&e.more_info).bind(&e.image).bind(e.latitude).bind(e.longitude)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn get_event(&self, id: Uuid) -> StoreResult<Option<Event>> {
        Ok(sqlx::query_as::<_, EventRow>("SELECT * FROM events WHERE id = $1").bind(id).fetch_optional(&self.pool).await?.map(Event::from))
    }

    async fn update_event(&self, e: &Event) -> StoreResult<()> {
        let done = sqlx::query("UPDATE events SET name = $2, description = $3, date = $4, location = $5, more_info = $6, image = $7, latitude = $8, longitude = $9 WHERE id = $1")
            .bind(e.id).bind(&e.name).bind(&e.description).bind(e.date).bind(&e.location).bind(&e.more_info)
            .bind(&e.image).bind(e.latitude).bind(e.longitude)
            .execute(&self.pool).await?;
        if done.rows_affected() == 0 { return Err(StoreError::NotFound(format!("event {}", e.id))); }
        Ok(())
    }

    async fn delete_event(&self, id: Uuid) -> StoreResult<()> {
        let done = sqlx::query("DELETE FROM events WHERE id = $1").bind(id).execute(&self.pool).await?;
        if done.rows_affected() == 0 { return Err(StoreError::NotFound(format!("event {id}"))); }
        Ok(())
    }

    async fn list_events(&self, f: &EventFilter) -> StoreResult<(Vec<Event>, i64)> {
        let rows = sqlx::query_as::<_, EventRow>(&format!("SELECT * FROM events {EVENT_WHERE} ORDER BY date, id LIMIT $4 OFFSET $5"))
            .bind(f.artist_id).bind(f.from).bind(f.until).bind(i64::from(f.per_page)).bind(i64::from(f.offset()))
            .fetch_all(&self.pool).await?;
        let total = self.count_events(f).await?;
        Ok((rows.into_iter().map(Event::from).collect(), total))
    }

    async fn count_events(&self, f: &EventFilter) -> StoreResult<i64> {
        let total: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM events {EVENT_WHERE}"))
            .bind(f.artist_id).bind(f.from).bind(f.until).fetch_one(&self.pool).await?;
        Ok(total.0)
    }

    async fn insert_verification(&self, v: &Verification) -> StoreResult<()> {
        sqlx::query("INSERT INTO verifications (id, artist_id, video_url, status, created_at) VALUES ($1, $2, $3, $4, $5)")
            .bind(v.id).bind(v.artist_id).bind(&v.video_url).bind(v.status.as_str()).bind(v.created_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn get_verification(&self, id: Uuid) -> StoreResult<Option<Verification>> {
        sqlx::query_as::<_, VerificationRow>("SELECT * FROM verifications WHERE id = $1").bind(id).fetch_optional(&self.pool).await?
            .map(Verification::try_from).transpose()
    }

    async fn update_verification(&self, v: &Verification) -> StoreResult<()> {
        let done = sqlx::query("UPDATE verifications SET status = $2 WHERE id = $1").bind(v.id).bind(v.status.as_str()).execute(&self.pool).await?;
        if done.rows_affected() == 0 { return Err(StoreError::NotFound(format!("verification {}", v.id))); }
        Ok(())
    }

    async fn verifications_for_artist(&self, artist_id: Uuid) -> StoreResult<Vec<Verification>> {
        let rows = sqlx::query_as::<_, VerificationRow>("SELECT * FROM verifications WHERE artist_id = $1 ORDER BY created_at DESC")
            .bind(artist_id).fetch_all(&self.pool).await?;
        collect(rows)
    }

    async fn list_verifications(&self, status: Option<VerificationStatus>) -> StoreResult<Vec<Verification>> {
        let rows = sqlx::query_as::<_, VerificationRow>("SELECT * FROM verifications WHERE ($1::TEXT IS NULL OR status = $1) ORDER BY created_at DESC")
            .bind(status.map(|s| s.as_str())).fetch_all(&self.pool).await?;
        collect(rows)
    }

    async fn insert_report(&self, r: &EmailReport) -> StoreResult<()> {
        sqlx::query("INSERT INTO email_reports (id, kind, subject, sender, username, description, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7)")
            .bind(r.id).bind(r.kind.as_str()).bind(&r.subject).bind(&r.sender).bind(&r.username).bind(&r.description).bind(r.created_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn count_reports_by_kind(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> StoreResult<Vec<(ReportKind, i64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as("SELECT kind, COUNT(*) FROM email_reports WHERE created_at >= $1 AND created_at < $2 GROUP BY kind ORDER BY kind")
            .bind(from).bind(to).fetch_all(&self.pool).await?;
        let mut counts = rows.into_iter()
            .map(|(kind, n)| ReportKind::parse(&kind).map(|k| (k, n)).ok_or_else(|| StoreError::Corrupt(format!("report kind {kind}"))))
            .collect::<StoreResult<Vec<_>>>()?;
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

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL pointing at a Postgres server"]
    async fn test_redelivered_checkout_is_recorded_once(pool: PgPool) {
        let store = PgStore::new(pool);
        let product = hoodie();
        store.insert_product(&product).await.unwrap();

        let order = paid_order(None, product.id);
        let first_id = order.id;
        let mut replay = paid_order(None, product.id);
        replay.checkout_session_id = order.checkout_session_id.clone();
        let session = order.checkout_session_id.clone();

        let first = store.complete_checkout(completion(order, product.id, 2)).await.unwrap();
        assert!(matches!(first, CompletionOutcome::Recorded { ref stock_events } if stock_events.is_empty()));
        let second = store.complete_checkout(completion(replay, product.id, 2)).await.unwrap();
        assert!(matches!(second, CompletionOutcome::AlreadyRecorded { order_id } if order_id == first_id));

        assert_eq!(store.list_orders(None, 1, 10).await.unwrap().1, 1);
        let recorded = store.find_order_by_checkout_session(&session).await.unwrap().unwrap();
        assert_eq!(recorded.id, first_id);
        assert_eq!(recorded.items.len(), 1);
        let stored = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(stored.units_available("Black", Some("M")).unwrap(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL pointing at a Postgres server"]
    async fn test_oversold_line_is_clamped_under_row_lock(pool: PgPool) {
        let store = PgStore::new(pool);
        let product = hoodie();
        store.insert_product(&product).await.unwrap();

        let outcome = store.complete_checkout(completion(paid_order(None, product.id), product.id, 5)).await.unwrap();
        match outcome {
            CompletionOutcome::Recorded { stock_events } => assert_eq!(stock_events.len(), 1),
            other => panic!("unexpected {other:?}"),
        }
        let stored = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(stored.units_available("Black", Some("M")).unwrap(), 0);
        assert_eq!(stored.units_available("Black", Some("L")).unwrap(), 1);
    }
}
