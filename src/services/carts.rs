use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{Cart, CartItem, CartOwner};
use crate::error::{AppError, Result};
use crate::store::Store;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    pub size: Option<String>,
    #[validate(length(min = 1))]
    pub color: String,
    #[validate(range(min = 1, max = 100))]
    pub quantity: u32,
}

/// Carts of registered users and of anonymous browser sessions.
pub struct CartService {
    store: Arc<dyn Store>,
}

impl CartService {
    pub fn new(store: Arc<dyn Store>) -> Self { Self { store } }

    pub async fn get(&self, owner: &CartOwner) -> Result<Cart> { Ok(self.store.load_cart(owner).await?) }

    #[instrument(skip(self, owner, request), fields(owner = %owner, product_id = %request.product_id))]
    pub async fn add(&self, owner: &CartOwner, request: AddItemRequest) -> Result<Cart> {
        request.validate()?;
        let product = self.store.get_product(request.product_id).await?
            .filter(|p| p.available)
            .ok_or_else(|| AppError::NotFound("Product not found".into()))?;
        let size = if product.section.is_sized() { request.size.clone() } else { None };
        let color = product.color(&request.color)?.name.clone();
        let on_hand = product.units_available(&color, size.as_deref())?;

        let mut cart = self.store.load_cart(owner).await?;
        let item = CartItem { product_id: product.id, section: product.section, size, color, quantity: request.quantity };
        let in_cart: u32 = cart.items().iter()
            .filter(|i| i.product_id == item.product_id && i.color == item.color && i.size == item.size)
            .map(|i| i.quantity)
            .sum();
        if i64::from(in_cart + item.quantity) > i64::from(on_hand) {
            return Err(AppError::BadRequest(format!("Only {on_hand} units of {} left", product.name)));
        }

        cart.add_item(item)?;
        self.store.save_cart(&cart).await?;
        debug!(lines = cart.item_count(), "cart updated");
        Ok(cart)
    }

    /// Takes one unit off the line at `index`.
    pub async fn remove_one(&self, owner: &CartOwner, index: usize) -> Result<Cart> {
        let mut cart = self.store.load_cart(owner).await?;
        cart.remove_one(index)?;
        self.store.save_cart(&cart).await?;
        Ok(cart)
    }

    pub async fn clear(&self, owner: &CartOwner) -> Result<Cart> {
        let mut cart = self.store.load_cart(owner).await?;
        cart.clear();
        self.store.save_cart(&cart).await?;
        Ok(cart)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::product::tests::{cap, hoodie};
    use crate::store::MemoryStore;

    async fn setup() -> (CartService, Uuid, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let (h, c) = (hoodie(), cap());
        store.insert_product(&h).await.unwrap();
        store.insert_product(&c).await.unwrap();
        (CartService::new(store), h.id, c.id)
    }

    fn add(product_id: Uuid, size: Option<&str>, color: &str, quantity: u32) -> AddItemRequest {
        AddItemRequest { product_id, size: size.map(Into::into), color: color.into(), quantity }
    }

    #[tokio::test]
    async fn test_add_merges_lines_and_normalizes_colour() {
        let (carts, hoodie_id, cap_id) = setup().await;
        let owner = CartOwner::Session("s-1".into());
        carts.add(&owner, add(hoodie_id, Some("M"), "black", 1)).await.unwrap();
        carts.add(&owner, add(hoodie_id, Some("M"), "Black", 1)).await.unwrap();
        let cart = carts.add(&owner, add(cap_id, Some("XL"), "Red", 1)).await.unwrap();

        assert_eq!(cart.item_count(), 2);
        assert_eq!(cart.items()[0].quantity, 2);
        assert_eq!(cart.items()[0].color, "Black");
        assert_eq!(cart.items()[1].size, None);
    }

    #[tokio::test]
    async fn test_add_checks_stock_and_variants() {
        let (carts, hoodie_id, _) = setup().await;
        let owner = CartOwner::User(Uuid::now_v7());
        assert!(matches!(carts.add(&owner, add(hoodie_id, Some("L"), "Black", 2)).await, Err(AppError::BadRequest(_))));
        assert!(matches!(carts.add(&owner, add(hoodie_id, Some("XS"), "Black", 1)).await, Err(AppError::NotFound(_))));
        assert!(matches!(carts.add(&owner, add(hoodie_id, Some("M"), "Pink", 1)).await, Err(AppError::NotFound(_))));
        assert!(matches!(carts.add(&owner, add(Uuid::now_v7(), None, "Red", 1)).await, Err(AppError::NotFound(_))));
        assert!(carts.get(&owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let (carts, hoodie_id, cap_id) = setup().await;
        let owner = CartOwner::Session("s-2".into());
        carts.add(&owner, add(hoodie_id, Some("M"), "Black", 2)).await.unwrap();
        carts.add(&owner, add(cap_id, None, "Red", 1)).await.unwrap();

        let cart = carts.remove_one(&owner, 1).await.unwrap();
        assert_eq!(cart.item_count(), 1);
        assert!(matches!(carts.remove_one(&owner, 5).await, Err(AppError::NotFound(_))));
        assert!(carts.clear(&owner).await.unwrap().is_empty());
        assert!(carts.get(&owner).await.unwrap().is_empty());
    }
}
