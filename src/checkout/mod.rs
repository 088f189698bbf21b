//! Checkout pipeline: cart → hosted session → signed callback → recorded order.

pub mod gateway;
pub mod metadata;
pub mod service;
pub mod webhook;

pub use gateway::{CheckoutSession, PaymentGateway, StripeGateway};
pub use service::CheckoutService;
pub use webhook::{WebhookOutcome, WebhookProcessor};
