use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{Order, OrderStatus, ReportKind, User};
use crate::error::{AppError, Result};
use crate::services::{ListParams, PaginatedResponse};
use crate::store::{Category, Collection, ProductCounts, Store};

const FIRST_YEAR: i32 = 2000;
const UNKNOWN_COUNTRY: &str = "UNKNOWN";

#[derive(Debug, Clone, Deserialize)]
pub struct YearQuery {
    pub year: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserQuery {
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct EditCategoryRequest {
    pub id: Uuid,
    #[validate(length(min = 1, max = 50))]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CollectionRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct EditCollectionRequest {
    pub id: Uuid,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[serde(default)]
    pub promoted: bool,
}

/// Collection names are stored upper-case with dashes between words.
fn collection_name(raw: &str) -> String { raw.split_whitespace().collect::<Vec<_>>().join("-").to_uppercase() }

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySales {
    pub month: u32,
    pub total_orders: i64,
    pub total_revenue: Decimal,
}

#[derive(Debug, Serialize)]
pub struct YearlyStatistics {
    pub year: i32,
    pub num_orders: i64,
    pub income: Decimal,
    pub order_status_counts: BTreeMap<OrderStatus, i64>,
    /// Item name to units sold.
    pub most_sold_items: BTreeMap<String, i64>,
    /// Shipping country to number of orders.
    pub sales_per_country: BTreeMap<String, i64>,
    pub monthly_sales: Vec<MonthlySales>,
    /// Reports received per kind.
    pub report_counts: BTreeMap<ReportKind, i64>,
}

/// Orders whose return was accepted do not count as sales.
pub(crate) fn is_sale(order: &Order) -> bool { order.status != OrderStatus::ReturnAccepted }

pub(crate) fn country_key(order: &Order) -> String {
    order.shipping_address.country.as_deref().map(str::trim).filter(|c| !c.is_empty())
        .map_or_else(|| UNKNOWN_COUNTRY.to_string(), str::to_uppercase)
}

/// `[Jan 1st of year, Jan 1st of year + 1)` for years with possible sales.
pub(crate) fn year_bounds(year: i32) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    if !(FIRST_YEAR..=Utc::now().year()).contains(&year) {
        return Err(AppError::BadRequest("Invalid year parameter".into()));
    }
    let bounds = Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).single().zip(Utc.with_ymd_and_hms(year + 1, 1, 1, 0, 0, 0).single());
    bounds.ok_or_else(|| AppError::BadRequest("Invalid year parameter".into()))
}

impl YearlyStatistics {
    fn compute(year: i32, orders: &[Order]) -> Self {
        let mut stats = Self {
            year,
            num_orders: orders.len() as i64,
            income: Decimal::ZERO,
            order_status_counts: OrderStatus::ALL.into_iter().map(|s| (s, 0)).collect(),
            most_sold_items: BTreeMap::new(),
            sales_per_country: BTreeMap::new(),
            monthly_sales: (1..=12).map(|month| MonthlySales { month, total_orders: 0, total_revenue: Decimal::ZERO }).collect(),
            report_counts: ReportKind::ALL.into_iter().map(|k| (k, 0)).collect(),
        };
        for order in orders {
            *stats.order_status_counts.entry(order.status).or_default() += 1;
            if !is_sale(order) { continue; }

            stats.income += order.total;
            for item in &order.items {
                *stats.most_sold_items.entry(item.name.clone()).or_default() += i64::from(item.quantity);
            }
            *stats.sales_per_country.entry(country_key(order)).or_default() += 1;

            let month = &mut stats.monthly_sales[order.created_at.month0() as usize];
            month.total_orders += 1;
            month.total_revenue += order.total;
        }
        stats
    }
}

pub struct AdminService {
    store: Arc<dyn Store>,
}

impl AdminService {
    pub fn new(store: Arc<dyn Store>) -> Self { Self { store } }

    #[instrument(skip(self))]
    pub async fn yearly_statistics(&self, year: i32) -> Result<YearlyStatistics> {
        let (from, to) = year_bounds(year)?;
        let orders = self.store.orders_created_between(from, to).await?;
        let mut stats = YearlyStatistics::compute(year, &orders);
        stats.report_counts.extend(self.store.count_reports_by_kind(from, to).await?);
        Ok(stats)
    }

    pub async fn users(&self, query: &UserQuery) -> Result<PaginatedResponse<User>> {
        let list = ListParams { page: query.page, per_page: query.per_page };
        let page = list.page();
        let search = query.search.as_deref().map(str::trim).filter(|q| !q.is_empty());
        let (data, total) = self.store.list_users(search, page, list.per_page()).await?;
        Ok(PaginatedResponse { data, total, page })
    }

    pub async fn product_management(&self) -> Result<ProductCounts> { Ok(self.store.product_counts().await?) }

    #[instrument(skip(self, request), fields(category_id = %request.id))]
    pub async fn edit_category(&self, request: EditCategoryRequest) -> Result<Category> {
        request.validate()?;
        let mut category = self.store.get_category(request.id).await?
            .ok_or_else(|| AppError::NotFound(format!("Category with the id '{}' not exists.", request.id)))?;
        category.name = request.name.trim().to_string();
        category.slug = Category::slug_for(&category.name);
        if request.description.is_some() { category.description = request.description; }
        self.store.update_category(&category).await.map_err(|e| match AppError::from(e) {
            AppError::Duplicate(_) => AppError::Duplicate(format!("Category with the name '{}' already exists.", category.name)),
            other => other,
        })?;
        info!("category edited");
        Ok(category)
    }

    pub async fn collections(&self) -> Result<Vec<Collection>> { Ok(self.store.list_collections().await?) }

    #[instrument(skip(self, request))]
    pub async fn create_collection(&self, request: CollectionRequest) -> Result<Collection> {
        request.validate()?;
        let collection = Collection { id: Uuid::now_v7(), name: collection_name(&request.name), promoted: false, created_at: Utc::now() };
        self.store.insert_collection(&collection).await.map_err(|e| collection_conflict(e, &collection.name))?;
        info!(name = %collection.name, "collection created");
        Ok(collection)
    }

    #[instrument(skip(self, request), fields(collection_id = %request.id))]
    pub async fn edit_collection(&self, request: EditCollectionRequest) -> Result<Collection> {
        request.validate()?;
        let mut collection = self.store.get_collection(request.id).await?
            .ok_or_else(|| AppError::NotFound(format!("Collection with the id '{}' not exists.", request.id)))?;
        collection.name = collection_name(&request.name);
        collection.promoted = request.promoted;
        self.store.update_collection(&collection).await.map_err(|e| collection_conflict(e, &collection.name))?;
        Ok(collection)
    }
}

fn collection_conflict(e: crate::store::StoreError, name: &str) -> AppError {
    match AppError::from(e) {
        AppError::Duplicate(_) => AppError::Duplicate(format!("Collection with the name '{name}' already exists.")),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use uuid::Uuid;

    use super::*;
    use crate::domain::aggregates::order::tests::paid_order;
    use crate::domain::aggregates::product::tests::{cap, hoodie};
    use crate::domain::aggregates::user::tests::user;
    use crate::domain::aggregates::{EmailReport, UserRole};
    use crate::store::{CheckoutCompletion, MemoryStore};

    fn order_in(year: i32, month: u32, country: Option<&str>, status: OrderStatus) -> Order {
        let mut order = paid_order(None, Uuid::now_v7());
        order.created_at = Utc.with_ymd_and_hms(year, month, 10, 12, 0, 0).unwrap();
        order.shipping_address.country = country.map(Into::into);
        order.status = status;
        order
    }

    #[test]
    fn test_compute_statistics() {
        let orders = vec![
            order_in(2024, 1, Some("es"), OrderStatus::Delivered),
            order_in(2024, 1, Some("ES"), OrderStatus::Paid),
            order_in(2024, 3, None, OrderStatus::Sent),
            order_in(2024, 3, Some("FR"), OrderStatus::ReturnAccepted),
        ];
        let stats = YearlyStatistics::compute(2024, &orders);

        assert_eq!(stats.num_orders, 4);
        assert_eq!(stats.income, Decimal::new(270, 0));
        assert_eq!(stats.order_status_counts[&OrderStatus::ReturnAccepted], 1);
        assert_eq!(stats.order_status_counts[&OrderStatus::InPreparation], 0);
        assert_eq!(stats.most_sold_items["Night Hoodie"], 6);
        assert_eq!(stats.sales_per_country["ES"], 2);
        assert_eq!(stats.sales_per_country[UNKNOWN_COUNTRY], 1);
        assert!(!stats.sales_per_country.contains_key("FR"));
        assert_eq!(stats.monthly_sales.len(), 12);
        assert_eq!(stats.monthly_sales[0], MonthlySales { month: 1, total_orders: 2, total_revenue: Decimal::new(180, 0) });
        assert_eq!(stats.monthly_sales[2].total_orders, 1);
    }

    #[tokio::test]
    async fn test_yearly_statistics_filters_by_year() {
        let store = Arc::new(MemoryStore::new());
        let last_year = Utc::now().year() - 1;
        let mut older = order_in(last_year, 6, Some("US"), OrderStatus::Paid);
        older.created_at -= Duration::days(365);
        for order in [order_in(last_year, 6, Some("US"), OrderStatus::Paid), older] {
            store.complete_checkout(CheckoutCompletion { order, stock: vec![], clear_cart: None, redeem_card: None }).await.unwrap();
        }
        let admin = AdminService::new(store);
        assert_eq!(admin.yearly_statistics(last_year).await.unwrap().num_orders, 1);
        assert!(matches!(admin.yearly_statistics(1999).await, Err(AppError::BadRequest(_))));
        assert!(matches!(admin.yearly_statistics(Utc::now().year() + 1).await, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_statistics_count_reports_of_the_year() {
        let store = Arc::new(MemoryStore::new());
        let report = EmailReport::file(ReportKind::Abuse, "Spam".into(), "ana@example.com".into(), "ana".into(), "Spam in votes".into());
        store.insert_report(&report).await.unwrap();
        let stats = AdminService::new(store).yearly_statistics(Utc::now().year()).await.unwrap();
        assert_eq!(stats.report_counts[&ReportKind::Abuse], 1);
        assert_eq!(stats.report_counts[&ReportKind::BugReport], 0);
    }

    #[tokio::test]
    async fn test_users_listing_orders_by_role_and_filters() {
        let store = Arc::new(MemoryStore::new());
        let mut admin_user = user();
        admin_user.email = "root@example.com".into();
        admin_user.username = "zoe".into();
        admin_user.role = UserRole::Admin;
        let mut other = user();
        other.email = "bea@example.com".into();
        other.username = "bea".into();
        for u in [user(), admin_user, other] {
            store.insert_user(&u).await.unwrap();
        }
        let admin = AdminService::new(store);

        let all = admin.users(&UserQuery::default()).await.unwrap();
        assert_eq!(all.total, 3);
        let names: Vec<&str> = all.data.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["zoe", "ana", "bea"]);

        let found = admin.users(&UserQuery { search: Some("BE".into()), ..Default::default() }).await.unwrap();
        assert_eq!(found.total, 1);
        assert_eq!(found.data[0].username, "bea");
    }

    #[tokio::test]
    async fn test_product_management_counts() {
        let store = Arc::new(MemoryStore::new());
        let mut hidden = cap();
        hidden.available = false;
        let mut promoted = hoodie();
        promoted.on_promotion = true;
        store.insert_product(&hidden).await.unwrap();
        store.insert_product(&promoted).await.unwrap();
        let counts = AdminService::new(store).product_management().await.unwrap();
        assert_eq!(counts, ProductCounts { not_available: 1, available: 1, promoted: 1, total: 2 });
    }

    #[tokio::test]
    async fn test_edit_category_renames_and_rejects_taken_names() {
        let store = Arc::new(MemoryStore::new());
        let street = Category { id: Uuid::now_v7(), name: "Street".into(), slug: "street".into(), description: None };
        let murals = Category { id: Uuid::now_v7(), name: "Murals".into(), slug: "murals".into(), description: Some("Walls".into()) };
        store.insert_category(&street).await.unwrap();
        store.insert_category(&murals).await.unwrap();
        let admin = AdminService::new(store.clone());

        let edited = admin.edit_category(EditCategoryRequest { id: murals.id, name: " Big Murals ".into(), description: None }).await.unwrap();
        assert_eq!((edited.name.as_str(), edited.slug.as_str()), ("Big Murals", "big-murals"));
        assert_eq!(edited.description.as_deref(), Some("Walls"));
        assert_eq!(store.get_category(murals.id).await.unwrap().unwrap().slug, "big-murals");

        let taken = admin.edit_category(EditCategoryRequest { id: murals.id, name: "street".into(), description: None }).await;
        assert!(matches!(taken, Err(AppError::Duplicate(m)) if m.contains("already exists")));
        let missing = admin.edit_category(EditCategoryRequest { id: Uuid::now_v7(), name: "x".into(), description: None }).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_collections_create_and_edit() {
        let admin = AdminService::new(Arc::new(MemoryStore::new()));
        let summer = admin.create_collection(CollectionRequest { name: "Summer  drop 25".into() }).await.unwrap();
        assert_eq!(summer.name, "SUMMER-DROP-25");
        assert!(!summer.promoted);
        assert!(matches!(admin.create_collection(CollectionRequest { name: "summer drop 25".into() }).await, Err(AppError::Duplicate(_))));

        let winter = admin.create_collection(CollectionRequest { name: "winter".into() }).await.unwrap();
        let edited = admin.edit_collection(EditCollectionRequest { id: winter.id, name: "Winter Sale".into(), promoted: true }).await.unwrap();
        assert_eq!((edited.name.as_str(), edited.promoted), ("WINTER-SALE", true));
        let clash = admin.edit_collection(EditCollectionRequest { id: winter.id, name: "summer drop 25".into(), promoted: false }).await;
        assert!(matches!(clash, Err(AppError::Duplicate(_))));

        let names: Vec<String> = admin.collections().await.unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["SUMMER-DROP-25", "WINTER-SALE"]);
    }
}
