//! Outbound domain events. Confirmation mail and other follow-up work is
//! handled by subscribers of these subjects.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::events::DomainEvent;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("could not encode event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("publish failed: {0}")]
    Publish(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> Result<(), NotifyError>;
}

/// Publishes events as JSON on NATS. Without a client the event is only logged.
#[derive(Clone, Default)]
pub struct NatsNotifier {
    client: Option<async_nats::Client>,
}

impl NatsNotifier {
    pub fn new(client: Option<async_nats::Client>) -> Self { Self { client } }
}

#[async_trait]
impl Notifier for NatsNotifier {
    async fn publish(&self, event: &DomainEvent) -> Result<(), NotifyError> {
        let subject = event.subject();
        let payload = serde_json::to_vec(event)?;
        match &self.client {
            Some(client) => {
                client.publish(subject.clone(), payload.into()).await.map_err(|e| NotifyError::Publish(e.to_string()))?;
                debug!(%subject, "event published");
            }
            None => info!(%subject, "NATS not configured; event not forwarded"),
        }
        Ok(())
    }
}

/// Publishes each event in order. A failed publish is logged and never
/// fails the operation that raised the event.
pub async fn publish_all(notifier: &dyn Notifier, events: &[DomainEvent]) {
    for event in events {
        if let Err(e) = notifier.publish(event).await {
            warn!(subject = %event.subject(), error = %e, "notification failed");
        }
    }
}

/// Captures published events in memory.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    pub events: tokio::sync::Mutex<Vec<DomainEvent>>,
    pub fail: bool,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn failing() -> Self { Self { events: Default::default(), fail: true } }
    pub async fn subjects(&self) -> Vec<String> { self.events.lock().await.iter().map(DomainEvent::subject).collect() }
}

#[cfg(test)]
#[async_trait]
impl Notifier for RecordingNotifier {
    async fn publish(&self, event: &DomainEvent) -> Result<(), NotifyError> {
        if self.fail { return Err(NotifyError::Publish("broker unavailable".into())); }
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::CatalogEvent;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_publish_without_client_is_ok() {
        let event = DomainEvent::Catalog(CatalogEvent::Created { product_id: Uuid::now_v7(), name: "Tee".into() });
        assert!(NatsNotifier::new(None).publish(&event).await.is_ok());
    }
}
