//! Runtime settings read from the environment (and `.env` via dotenvy).

use std::env;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} has an invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub database_url: Option<String>,
    pub nats_url: Option<String>,
    pub payment: PaymentSettings,
    pub chatbot: ChatbotSettings,
    pub policy: PolicySettings,
}

#[derive(Debug, Clone)]
pub struct PaymentSettings {
    pub stripe_secret_key: String,
    pub webhook_secret: String,
    pub api_base: String,
    pub frontend_url: String,
    pub shipping_countries: Vec<String>,
    pub webhook_tolerance_secs: i64,
}

#[derive(Debug, Clone)]
pub struct ChatbotSettings {
    pub gemini_api_key: Option<String>,
    pub gemini_api_url: String,
    pub similarity_threshold: f64,
}

/// Business limits that operators may tune.
#[derive(Debug, Clone)]
pub struct PolicySettings {
    pub return_window_days: i64,
    pub user_product_monthly_limit: i64,
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            stripe_secret_key: String::new(),
            webhook_secret: String::new(),
            api_base: "https://api.stripe.com".into(),
            frontend_url: "http://localhost:3000".into(),
            shipping_countries: vec!["US".into(), "ES".into(), "FR".into()],
            webhook_tolerance_secs: 300,
        }
    }
}

impl Default for ChatbotSettings {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_api_url: "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent".into(),
            similarity_threshold: 0.4,
        }
    }
}

impl Default for PolicySettings {
    fn default() -> Self { Self { return_window_days: 30, user_product_monthly_limit: 3 } }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let payment_defaults = PaymentSettings::default();
        let chatbot_defaults = ChatbotSettings::default();
        let policy_defaults = PolicySettings::default();
        Ok(Self {
            port: parsed("PORT", 8083)?,
            database_url: optional("DATABASE_URL"),
            nats_url: optional("NATS_URL"),
            payment: PaymentSettings {
                stripe_secret_key: optional("STRIPE_SECRET_KEY").unwrap_or_default(),
                webhook_secret: optional("STRIPE_WEBHOOK_SECRET").unwrap_or_default(),
                api_base: optional("STRIPE_API_BASE").unwrap_or(payment_defaults.api_base),
                frontend_url: optional("FRONTEND_URL").unwrap_or(payment_defaults.frontend_url),
                shipping_countries: optional("SHIPPING_COUNTRIES")
                    .map(|v| v.split(',').map(|c| c.trim().to_uppercase()).filter(|c| !c.is_empty()).collect())
                    .unwrap_or(payment_defaults.shipping_countries),
                webhook_tolerance_secs: parsed("WEBHOOK_TOLERANCE_SECS", payment_defaults.webhook_tolerance_secs)?,
            },
            chatbot: ChatbotSettings {
                gemini_api_key: optional("GEMINI_API_KEY"),
                gemini_api_url: optional("GEMINI_API_URL").unwrap_or(chatbot_defaults.gemini_api_url),
                similarity_threshold: parsed("CHATBOT_SIMILARITY_THRESHOLD", chatbot_defaults.similarity_threshold)?,
            },
            policy: PolicySettings {
                return_window_days: parsed("RETURN_WINDOW_DAYS", policy_defaults.return_window_days)?,
                user_product_monthly_limit: parsed("USER_PRODUCT_MONTHLY_LIMIT", policy_defaults.user_product_monthly_limit)?,
            },
        })
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parsed<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(key) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid { key, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parsed_falls_back_and_rejects_garbage() {
        env::remove_var("AH_TEST_UNSET");
        assert_eq!(parsed::<u16>("AH_TEST_UNSET", 42).unwrap(), 42);
        env::set_var("AH_TEST_BAD_PORT", "eighty");
        assert!(matches!(parsed::<u16>("AH_TEST_BAD_PORT", 1), Err(ConfigError::Invalid { key: "AH_TEST_BAD_PORT", .. })));
        env::set_var("AH_TEST_BLANK", "   ");
        assert_eq!(optional("AH_TEST_BLANK"), None);
    }
}
