//! Store assistant: predefined answers first, then catalog intents, then the
//! language model.

pub mod faq;
pub mod intent;
pub mod llm;
pub mod text;

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::config::ChatbotSettings;
use crate::error::{AppError, Result};
use crate::store::Store;

pub use faq::QaRepository;
pub use intent::{Intent, IntentDetector};
pub use llm::{GeminiClient, LanguageModel, LlmError};
pub use text::{Language, MessageContext};

const SYSTEM_PROMPT: &str = include_str!("../../resources/chatbot/system_prompt.txt");
const RECOMMENDATIONS: u32 = 3;

pub struct ChatbotService {
    store: Arc<dyn Store>,
    faq: QaRepository,
    intents: IntentDetector,
    model: Option<Arc<dyn LanguageModel>>,
    threshold: f64,
}

impl ChatbotService {
    pub fn new(store: Arc<dyn Store>, model: Option<Arc<dyn LanguageModel>>, settings: &ChatbotSettings) -> Result<Self> {
        let faq = QaRepository::builtin().map_err(|e| AppError::Internal(format!("predefined answers: {e}")))?;
        let intents = IntentDetector::builtin().map_err(|e| AppError::Internal(format!("intent phrases: {e}")))?;
        Ok(Self { store, faq, intents, model, threshold: settings.similarity_threshold })
    }

    #[instrument(skip_all, fields(chars = message.chars().count()))]
    pub async fn reply(&self, message: &str) -> Result<String> {
        let message = message.trim();
        if message.is_empty() {
            return Err(AppError::BadRequest("The message cannot be empty".into()));
        }

        let context = MessageContext::new(message);
        if let Some(entry) = self.faq.best_match(&context, self.threshold) {
            debug!(question = %entry.question, "answered from predefined questions");
            return Ok(entry.answer.clone());
        }

        match self.intents.detect(&context.normalized, context.language) {
            Some(Intent::Recommendation) => return self.recommendations(context.language).await,
            Some(Intent::BestSeller) => return self.best_seller(context.language).await,
            None => {}
        }

        let Some(model) = &self.model else {
            let detail = match context.language {
                Language::English => "API key not configured",
                Language::Spanish => "API key no configurada",
            };
            return Err(AppError::Internal(detail.into()));
        };
        model.generate(SYSTEM_PROMPT, message).await.map_err(|e| {
            warn!(error = %e, "language model call failed");
            AppError::Upstream(e.to_string())
        })
    }

    async fn recommendations(&self, language: Language) -> Result<String> {
        let products = self.store.top_rated_products(RECOMMENDATIONS).await?;
        if products.is_empty() {
            return Ok(match language {
                Language::English => "Sorry, I don’t have any recommended products to show at the moment.",
                Language::Spanish => "Lo siento, no tengo productos recomendados para mostrar en este momento.",
            }
            .into());
        }
        let (intro, outro) = match language {
            Language::English => ("Here are some of our top recommended products:", "Check them out and let us know which one you like!"),
            Language::Spanish => ("Estos son algunos de nuestros productos más recomendados:", "¡Échales un vistazo y cuéntanos cuál te gusta más!"),
        };
        let mut reply = format!("{intro}\n");
        for product in &products {
            reply.push_str(&format!("- {}: {}\n", product.name, product.description));
        }
        reply.push_str(outro);
        Ok(reply)
    }

    async fn best_seller(&self, language: Language) -> Result<String> {
        let product = match self.store.best_selling_product().await? {
            Some((id, _)) => self.store.get_product(id).await?,
            None => None,
        };
        Ok(match (product, language) {
            (Some(p), Language::English) => format!(
                "Our current best-selling product is '{}'. Final price: €{:.2}. Take a look and see what you think!",
                p.name, p.effective_price()
            ),
            (Some(p), Language::Spanish) => format!(
                "El producto más vendido actualmente es '{}'. Precio final: {:.2}€. ¡Échale un vistazo y a ver qué te parece!",
                p.name, p.effective_price()
            ),
            (None, Language::English) => "Sorry, I don’t have information about our best-selling product at the moment.".into(),
            (None, Language::Spanish) => "Lo siento, no tengo información sobre el producto más vendido en este momento.".into(),
        })
    }
}
