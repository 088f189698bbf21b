//! HTTP surface. Every route except `/health` lives under `/api`.

pub mod account;
pub mod admin;
pub mod artists;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod community;
pub mod events;
pub mod orders;

use std::sync::Arc;

use axum::{routing::get, Json, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::chatbot::{ChatbotService, LanguageModel};
use crate::checkout::{CheckoutService, PaymentGateway, WebhookProcessor};
use crate::config::Settings;
use crate::error::Result;
use crate::notify::Notifier;
use crate::services::{
    AdminService, ArtistService, CartService, CatalogService, EventService, OrderService, RatingService, ReportService,
    ReturnService, RewardService, UserProductService, UserService, VerificationService,
};
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<CatalogService>,
    pub carts: Arc<CartService>,
    pub checkout: Arc<CheckoutService>,
    pub webhooks: Arc<WebhookProcessor>,
    pub orders: Arc<OrderService>,
    pub ratings: Arc<RatingService>,
    pub returns: Arc<ReturnService>,
    pub user_products: Arc<UserProductService>,
    pub rewards: Arc<RewardService>,
    pub users: Arc<UserService>,
    pub admin: Arc<AdminService>,
    pub artists: Arc<ArtistService>,
    pub events: Arc<EventService>,
    pub verification: Arc<VerificationService>,
    pub reports: Arc<ReportService>,
    pub chatbot: Arc<ChatbotService>,
}

impl AppState {
    pub fn new(
        settings: &Settings,
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        gateway: Arc<dyn PaymentGateway>,
        model: Option<Arc<dyn LanguageModel>>,
    ) -> Result<Self> {
        Ok(Self {
            catalog: Arc::new(CatalogService::new(store.clone(), notifier.clone())),
            carts: Arc::new(CartService::new(store.clone())),
            checkout: Arc::new(CheckoutService::new(store.clone(), gateway, settings.payment.clone())),
            webhooks: Arc::new(WebhookProcessor::new(store.clone(), notifier.clone(), settings.payment.clone())),
            orders: Arc::new(OrderService::new(store.clone(), notifier.clone())),
            ratings: Arc::new(RatingService::new(store.clone())),
            returns: Arc::new(ReturnService::new(store.clone(), notifier.clone(), settings.policy.clone())),
            user_products: Arc::new(UserProductService::new(store.clone(), notifier.clone(), &settings.policy)),
            rewards: Arc::new(RewardService::new(store.clone())),
            users: Arc::new(UserService::new(store.clone())),
            admin: Arc::new(AdminService::new(store.clone())),
            artists: Arc::new(ArtistService::new(store.clone(), notifier.clone())),
            events: Arc::new(EventService::new(store.clone())),
            verification: Arc::new(VerificationService::new(store.clone(), notifier.clone())),
            reports: Arc::new(ReportService::new(store.clone(), notifier)),
            chatbot: Arc::new(ChatbotService::new(store, model, &settings.chatbot)?),
        })
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(catalog::routes())
        .merge(cart::routes())
        .merge(checkout::routes())
        .merge(orders::routes())
        .merge(community::routes())
        .merge(artists::routes())
        .merge(events::routes())
        .merge(admin::routes())
        .merge(account::routes());

    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "artists-heaven"})) }))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::checkout::StripeGateway;
    use crate::config::{ChatbotSettings, PaymentSettings, PolicySettings};
    use crate::domain::aggregates::product::tests::hoodie;
    use crate::notify::RecordingNotifier;
    use crate::store::MemoryStore;

    fn settings() -> Settings {
        Settings {
            port: 0, database_url: None, nats_url: None, payment: PaymentSettings::default(),
            chatbot: ChatbotSettings::default(), policy: PolicySettings::default(),
        }
    }

    fn app_with(store: Arc<MemoryStore>) -> Router {
        let settings = settings();
        let gateway = Arc::new(StripeGateway::new(&settings.payment));
        let state = AppState::new(&settings, store, Arc::new(RecordingNotifier::default()), gateway, None).unwrap();
        router(state)
    }

    fn app() -> Router { app_with(Arc::new(MemoryStore::new())) }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> { Request::builder().uri(uri).body(Body::empty()).unwrap() }

    fn post_json(uri: &str, body: Value, headers: &[(&str, &str)]) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri(uri).header("content-type", "application/json");
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(app(), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "artists-heaven");
    }

    #[tokio::test]
    async fn test_catalog_is_public_but_writes_need_admin() {
        let (status, body) = send(app(), get("/api/products")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 0);

        let product = serde_json::json!({ "reference": 1, "name": "Tee", "price": "20", "section": "TSHIRT", "colors": [] });
        let (status, body) = send(app(), post_json("/api/products", product.clone(), &[])).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status"], 401);

        let user = Uuid::now_v7().to_string();
        let (status, _) = send(app(), post_json("/api/products", product, &[("x-user-id", user.as_str())])).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_session_cart_round_trip() {
        let store = Arc::new(MemoryStore::new());
        let product = hoodie();
        store.insert_product(&product).await.unwrap();
        let app = app_with(store);

        let add = serde_json::json!({ "product_id": product.id, "size": "M", "color": "black", "quantity": 2 });
        let (status, _) = send(app.clone(), post_json("/api/cart/session/abc/items", add, &[])).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(app, get("/api/cart/session/abc")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["items"][0]["quantity"], 2);
        assert_eq!(body["items"][0]["color"], "Black");
    }

    #[tokio::test]
    async fn test_webhook_requires_signature() {
        let request = Request::builder().method("POST").uri("/api/webhooks/stripe").body(Body::from("{}")).unwrap();
        let (status, body) = send(app(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("Stripe-Signature"));
    }

    #[tokio::test]
    async fn test_chatbot_replies_in_reply_field() {
        let (status, body) = send(app(), post_json("/api/chatbot/message", serde_json::json!({ "message": "  " }), &[])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["reply"], "The message cannot be empty");

        let faq = serde_json::json!({ "message": "How long does shipping take?" });
        let (status, body) = send(app(), post_json("/api/chatbot/message", faq, &[])).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["reply"].as_str().unwrap().contains("24-48 hours"));
    }

    fn as_role(mut request: Request<Body>, user_id: &str, role: &str) -> Request<Body> {
        let headers = request.headers_mut();
        headers.insert("x-user-id", user_id.parse().unwrap());
        headers.insert("x-user-role", role.parse().unwrap());
        request
    }

    #[tokio::test]
    async fn test_artist_verification_and_events() {
        let app = app();
        let artist = Uuid::now_v7().to_string();
        let admin = Uuid::now_v7().to_string();

        let profile = serde_json::json!({ "email": "luna@example.com", "artist_name": "Luna Roja" });
        let (status, body) = send(app.clone(), as_role(post_json("/api/artists/register", profile, &[]), &artist, "artist")).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["verified"], false);

        let event = serde_json::json!({ "name": "Release party", "date": chrono::Utc::now().date_naive(), "location": "Sala Sol" });
        let (status, _) = send(app.clone(), as_role(post_json("/api/event/new", event.clone(), &[]), &artist, "artist")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let video = serde_json::json!({ "video_url": "https://videos.example/luna.mp4" });
        let (status, body) = send(app.clone(), as_role(post_json("/api/verification/send", video, &[]), &artist, "artist")).await;
        assert_eq!(status, StatusCode::CREATED);
        let verification_id = body["id"].as_str().unwrap().to_string();

        let (status, body) = send(app.clone(), as_role(get("/api/admin/verification/pending"), &admin, "admin")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["id"], verification_id.as_str());

        let validate = serde_json::json!({ "id": artist.as_str(), "verification_id": verification_id });
        let (status, _) = send(app.clone(), as_role(post_json("/api/admin/validate_artist", validate, &[]), &admin, "admin")).await;
        assert_eq!(status, StatusCode::OK);

        let (status, created) = send(app.clone(), as_role(post_json("/api/event/new", event, &[]), &artist, "artist")).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = send(app.clone(), get("/api/event/allEvents")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["id"], created["id"]);

        let (_, cards) = send(app.clone(), get("/api/artists/main")).await;
        assert_eq!(cards[0]["name"], "Luna Roja");

        let id = created["id"].as_str().unwrap();
        let remove = Request::builder().method("DELETE").uri(format!("/api/event/delete/{id}")).body(Body::empty()).unwrap();
        let (status, _) = send(app.clone(), as_role(remove, &artist, "artist")).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(app, get(&format!("/api/event/details/{id}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_reports_are_accepted_from_anyone() {
        let report = serde_json::json!({
            "kind": "BUG_REPORT", "subject": "Cart", "sender": "ana@example.com", "username": "ana", "description": "Cart empties",
        });
        let (status, body) = send(app(), post_json("/api/emails/send", report, &[])).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["kind"], "BUG_REPORT");

        let bad = serde_json::json!({ "kind": "BUG_REPORT", "subject": "", "sender": "ana", "username": "ana", "description": "x" });
        let (status, _) = send(app(), post_json("/api/emails/send", bad, &[])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_collections_are_managed_by_admins() {
        let app = app();
        let admin = Uuid::now_v7().to_string();
        let (status, _) = send(app.clone(), post_json("/api/admin/newCollection", serde_json::json!({ "name": "summer drop" }), &[])).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let create = as_role(post_json("/api/admin/newCollection", serde_json::json!({ "name": "summer drop" }), &[]), &admin, "admin");
        let (status, body) = send(app.clone(), create).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["name"], "SUMMER-DROP");

        let (status, body) = send(app.clone(), get("/api/collections")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, body) = send(app, as_role(get("/api/admin/product-management"), &admin, "admin")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 0);
    }

    #[tokio::test]
    async fn test_admin_statistics_validates_year() {
        let admin = Uuid::now_v7().to_string();
        let request = Request::builder()
            .uri("/api/admin/statistics?year=1990")
            .header("x-user-id", admin.as_str())
            .header("x-user-role", "admin")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid year parameter");
    }
}
