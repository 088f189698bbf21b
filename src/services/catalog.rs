use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{Product, ProductColor, ProductDraft};
use crate::domain::value_objects::Section;
use crate::error::{AppError, Result};
use crate::notify::{publish_all, Notifier};
use crate::services::{PaginatedResponse, MAX_PER_PAGE};
use crate::store::{Category, ProductFilter, Store};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ProductRequest {
    pub reference: i64,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 4000))]
    pub description: String,
    pub price: Decimal,
    pub section: Section,
    #[serde(default)]
    pub category_ids: Vec<Uuid>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub composition: String,
    #[serde(default)]
    pub shipping_details: String,
    #[validate(length(min = 1))]
    pub colors: Vec<ProductColor>,
}

impl From<ProductRequest> for ProductDraft {
    fn from(r: ProductRequest) -> Self {
        Self {
            reference: r.reference, name: r.name, description: r.description, price: r.price, section: r.section,
            category_ids: r.category_ids, images: r.images, composition: r.composition,
            shipping_details: r.shipping_details, colors: r.colors,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub section: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CategoryRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PromotionRequest {
    #[validate(range(min = 1, max = 100))]
    pub discount: i32,
}

#[derive(Debug, Serialize)]
pub struct BestSeller {
    pub product: Product,
    pub units_sold: i64,
}

pub struct CatalogService {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Self { Self { store, notifier } }

    /// Shoppers only see available products; administrators see everything.
    pub async fn list(&self, query: &ProductQuery, include_unavailable: bool) -> Result<PaginatedResponse<Product>> {
        let filter = ProductFilter {
            section: query.section.as_deref().map(str::parse::<Section>).transpose()?,
            search: query.search.clone().filter(|s| !s.trim().is_empty()),
            only_available: !include_unavailable,
            page: query.page.unwrap_or(1).max(1),
            per_page: query.per_page.unwrap_or(20).clamp(1, MAX_PER_PAGE),
        };
        let (data, total) = self.store.list_products(&filter).await?;
        Ok(PaginatedResponse { data, total, page: filter.page })
    }

    pub async fn get(&self, id: Uuid, include_unavailable: bool) -> Result<Product> {
        self.store.get_product(id).await?
            .filter(|p| include_unavailable || p.available)
            .ok_or_else(|| AppError::NotFound("Product not found".into()))
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create(&self, request: ProductRequest) -> Result<Product> {
        request.validate()?;
        let mut product = Product::create(request.into())?;
        self.store.insert_product(&product).await?;
        publish_all(self.notifier.as_ref(), &product.take_events()).await;
        info!(product_id = %product.id, "product created");
        Ok(product)
    }

    #[instrument(skip(self, request))]
    pub async fn update(&self, id: Uuid, request: ProductRequest) -> Result<Product> {
        request.validate()?;
        let mut product = self.get(id, true).await?;
        product.apply(request.into())?;
        self.store.update_product(&product).await?;
        Ok(product)
    }

    #[instrument(skip(self))]
    pub async fn promote(&self, id: Uuid, request: PromotionRequest) -> Result<Product> {
        request.validate()?;
        self.modify(id, |p| Ok(p.promote(request.discount)?)).await
    }

    pub async fn demote(&self, id: Uuid) -> Result<Product> {
        self.modify(id, |p| { p.demote(); Ok(()) }).await
    }

    #[instrument(skip(self))]
    pub async fn set_available(&self, id: Uuid, available: bool) -> Result<Product> {
        self.modify(id, |p| { if available { p.enable() } else { p.disable() }; Ok(()) }).await
    }

    async fn modify(&self, id: Uuid, change: impl FnOnce(&mut Product) -> Result<()>) -> Result<Product> {
        let mut product = self.get(id, true).await?;
        change(&mut product)?;
        self.store.update_product(&product).await?;
        Ok(product)
    }

    pub async fn categories(&self) -> Result<Vec<Category>> { Ok(self.store.list_categories().await?) }

    pub async fn create_category(&self, request: CategoryRequest) -> Result<Category> {
        request.validate()?;
        let category = Category {
            id: Uuid::now_v7(),
            slug: Category::slug_for(&request.name),
            name: request.name.trim().to_string(),
            description: request.description,
        };
        self.store.insert_category(&category).await?;
        Ok(category)
    }

    pub async fn top_rated(&self, limit: u32) -> Result<Vec<Product>> {
        Ok(self.store.top_rated_products(limit.clamp(1, MAX_PER_PAGE)).await?)
    }

    pub async fn best_seller(&self) -> Result<Option<BestSeller>> {
        let Some((id, units_sold)) = self.store.best_selling_product().await? else { return Ok(None) };
        Ok(self.store.get_product(id).await?.map(|product| BestSeller { product, units_sold }))
    }
}
