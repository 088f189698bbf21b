//! Artists Heaven - marketplace backend

use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use artists_heaven::api::{self, AppState};
use artists_heaven::chatbot::{GeminiClient, LanguageModel};
use artists_heaven::checkout::StripeGateway;
use artists_heaven::config::Settings;
use artists_heaven::notify::NatsNotifier;
use artists_heaven::store::{MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;

    let store: Arc<dyn Store> = match &settings.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
            sqlx::migrate!("./migrations").run(&pool).await?;
            Arc::new(PgStore::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set; using the in-memory store, data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let nats = match &settings.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(error = %e, "NATS unavailable; events will only be logged");
                None
            }
        },
        None => None,
    };

    let model: Option<Arc<dyn LanguageModel>> = match &settings.chatbot.gemini_api_key {
        Some(key) => Some(Arc::new(GeminiClient::new(&settings.chatbot.gemini_api_url, key)?)),
        None => {
            warn!("GEMINI_API_KEY not set; the chatbot answers only predefined questions");
            None
        }
    };

    let state = AppState::new(
        &settings,
        store,
        Arc::new(NatsNotifier::new(nats)),
        Arc::new(StripeGateway::new(&settings.payment)),
        model,
    )?;
    let app = api::router(state);

    info!("Artists Heaven listening on 0.0.0.0:{}", settings.port);
    axum::serve(tokio::net::TcpListener::bind(("0.0.0.0", settings.port)).await?, app).await?;
    Ok(())
}
