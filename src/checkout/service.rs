use std::sync::Arc;

use tracing::{info, instrument};

use crate::checkout::gateway::{CheckoutSession, CheckoutSessionRequest, CustomField, LineItem, PaymentGateway};
use crate::checkout::metadata;
use crate::config::PaymentSettings;
use crate::domain::aggregates::{CartItem, CartOwner, Product, User};
use crate::error::{AppError, Result};
use crate::store::Store;

/// Turns a cart into a hosted checkout session. Nothing is persisted here;
/// the order only exists once the provider reports the payment.
pub struct CheckoutService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    settings: PaymentSettings,
}

impl CheckoutService {
    pub fn new(store: Arc<dyn Store>, gateway: Arc<dyn PaymentGateway>, settings: PaymentSettings) -> Self {
        Self { store, gateway, settings }
    }

    #[instrument(skip(self, owner), fields(owner = %owner))]
    pub async fn checkout(&self, owner: CartOwner) -> Result<CheckoutSession> {
        let cart = self.store.load_cart(&owner).await?;
        if cart.is_empty() { return Err(AppError::BadRequest("Cart is empty".into())); }

        let user = match owner.user_id() {
            Some(id) => Some(self.store.get_user(id).await?.ok_or_else(|| AppError::NotFound("User not found".into()))?),
            None => None,
        };

        let mut line_items = Vec::with_capacity(cart.item_count());
        for item in cart.items() {
            let product = self.store.get_product(item.product_id).await?
                .ok_or_else(|| AppError::NotFound(format!("Product {} not found", item.product_id)))?;
            if !product.can_fulfil(&item.color, item.size.as_deref(), item.quantity)? {
                return Err(AppError::BadRequest(format!("{} is not available in the requested quantity", product.name)));
            }
            line_items.push(line_item(&product, item)?);
        }

        let coupon = match &user {
            Some(u) => match self.store.active_reward_card(u.id).await? {
                Some(card) => Some(self.gateway.create_coupon(card.discount_percentage).await?),
                None => None,
            },
            None => None,
        };

        let request = self.session_request(line_items, metadata::encode(cart.items(), &owner)?, user.as_ref(), coupon);
        let session = self.gateway.create_checkout_session(&request).await?;
        info!(session_id = %session.id, lines = cart.item_count(), "checkout session created");
        Ok(session)
    }

    fn session_request(
        &self, line_items: Vec<LineItem>, metadata: std::collections::BTreeMap<String, String>, user: Option<&User>, coupon: Option<String>,
    ) -> CheckoutSessionRequest {
        let frontend = self.settings.frontend_url.trim_end_matches('/');
        let mut request = CheckoutSessionRequest {
            line_items,
            metadata,
            success_url: format!("{frontend}/success?session_id={{CHECKOUT_SESSION_ID}}"),
            cancel_url: format!("{frontend}/cancel"),
            collect_phone: true,
            coupon,
            ..Default::default()
        };
        match user {
            Some(u) => {
                request.customer_email = Some(u.email.clone());
                if u.has_shipping_address() {
                    request.custom_fields = shipping_fields(u);
                } else {
                    request.allowed_countries = self.settings.shipping_countries.clone();
                }
            }
            None => request.allowed_countries = self.settings.shipping_countries.clone(),
        }
        request
    }
}

fn line_item(product: &Product, item: &CartItem) -> Result<LineItem> {
    let mut name = format!("Artists Heaven - {}", product.name);
    if product.section.is_sized() {
        name.push_str(&format!(" - Size: {} - Color: {}", item.size.as_deref().unwrap_or_default(), item.color));
    }
    let price = product.unit_price();
    Ok(LineItem { name, currency: price.currency().to_string(), unit_amount: price.to_minor_units()?, quantity: item.quantity })
}

/// Prefilled address fields, read back by key when the payment completes.
pub(crate) const CITY_FIELD: &str = "city";
pub(crate) const ADDRESS_FIELD: &str = "shipping_address";
pub(crate) const POSTAL_CODE_FIELD: &str = "postal_code";

fn shipping_fields(user: &User) -> Vec<CustomField> {
    let field = |key: &str, label: &str, value: &Option<String>| CustomField {
        key: key.into(), label: label.into(), default_value: value.clone().unwrap_or_default(),
    };
    vec![
        field(CITY_FIELD, "Ciudad", &user.city),
        field(ADDRESS_FIELD, "Dirección de Envío", &user.address),
        field(POSTAL_CODE_FIELD, "Código Postal", &user.postal_code),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkout::gateway::tests::FakeGateway;
    use crate::domain::aggregates::product::tests::{cap, hoodie};
    use crate::domain::aggregates::user::tests::user;
    use crate::domain::aggregates::{CartItem, RewardCard};
    use crate::store::MemoryStore;

    async fn setup() -> (Arc<MemoryStore>, Arc<FakeGateway>, CheckoutService) {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::default());
        let service = CheckoutService::new(store.clone(), gateway.clone(), PaymentSettings::default());
        (store, gateway, service)
    }

    async fn fill_cart(store: &MemoryStore, owner: CartOwner, product: &Product, size: Option<&str>, color: &str, quantity: u32) {
        let mut cart = store.load_cart(&owner).await.unwrap();
        cart.add_item(CartItem { product_id: product.id, section: product.section, size: size.map(Into::into), color: color.into(), quantity }).unwrap();
        store.save_cart(&cart).await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_cart_rejected() {
        let (_, _, service) = setup().await;
        let err = service.checkout(CartOwner::Session("t".into())).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_anonymous_checkout_collects_shipping() {
        let (store, gateway, service) = setup().await;
        let product = hoodie();
        store.insert_product(&product).await.unwrap();
        let owner = CartOwner::Session("anon-1".into());
        fill_cart(&store, owner.clone(), &product, Some("M"), "Black", 2).await;

        let session = service.checkout(owner).await.unwrap();
        assert_eq!(session.id, "cs_test_1");

        let sent = gateway.sessions.lock().await;
        let request = &sent[0];
        assert_eq!(request.line_items[0].name, "Artists Heaven - Night Hoodie - Size: M - Color: Black");
        assert_eq!(request.line_items[0].unit_amount, 4500);
        assert_eq!(request.allowed_countries, vec!["US", "ES", "FR"]);
        assert!(request.custom_fields.is_empty());
        assert_eq!(request.metadata[metadata::USER_KEY], metadata::ANONYMOUS);
        assert_eq!(request.metadata[metadata::CART_SESSION_KEY], "anon-1");
        assert!(request.collect_phone);

        // The cart survives until the payment is confirmed.
        assert!(!store.load_cart(&CartOwner::Session("anon-1".into())).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_user_with_address_gets_prefilled_fields_and_coupon() {
        let (store, gateway, service) = setup().await;
        let mut buyer = user();
        buyer.points = 600;
        store.insert_user(&buyer).await.unwrap();
        store.issue_reward_card(&RewardCard::for_points(buyer.id, 500).unwrap()).await.unwrap();
        let product = cap();
        store.insert_product(&product).await.unwrap();
        fill_cart(&store, CartOwner::User(buyer.id), &product, None, "Red", 1).await;

        service.checkout(CartOwner::User(buyer.id)).await.unwrap();

        let sent = gateway.sessions.lock().await;
        let request = &sent[0];
        assert_eq!(request.line_items[0].name, "Artists Heaven - Logo Cap");
        assert_eq!(request.customer_email.as_deref(), Some("ana@example.com"));
        assert!(request.allowed_countries.is_empty());
        let keys: Vec<&str> = request.custom_fields.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec![CITY_FIELD, ADDRESS_FIELD, POSTAL_CODE_FIELD]);
        assert_eq!(request.coupon.as_deref(), Some("coupon_1"));
        assert_eq!(*gateway.coupons.lock().await, vec![10]);
    }

    #[tokio::test]
    async fn test_insufficient_stock_rejected() {
        let (store, gateway, service) = setup().await;
        let product = hoodie();
        store.insert_product(&product).await.unwrap();
        let owner = CartOwner::Session("anon-2".into());
        fill_cart(&store, owner.clone(), &product, Some("L"), "Black", 2).await;

        assert!(matches!(service.checkout(owner).await.unwrap_err(), AppError::BadRequest(_)));
        assert!(gateway.sessions.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_colour_is_not_found() {
        let (store, _, service) = setup().await;
        let product = hoodie();
        store.insert_product(&product).await.unwrap();
        let owner = CartOwner::Session("anon-3".into());
        fill_cart(&store, owner.clone(), &product, Some("M"), "Green", 1).await;
        assert!(matches!(service.checkout(owner).await.unwrap_err(), AppError::NotFound(_)));
    }
}
