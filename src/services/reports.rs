use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, instrument};
use validator::Validate;

use crate::domain::aggregates::{EmailReport, ReportKind};
use crate::error::Result;
use crate::notify::{publish_all, Notifier};
use crate::store::Store;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReportRequest {
    pub kind: ReportKind,
    #[validate(length(min = 1, max = 150))]
    pub subject: String,
    #[validate(email)]
    pub sender: String,
    #[validate(length(min = 1, max = 100))]
    pub username: String,
    #[validate(length(min = 1, max = 2000))]
    pub description: String,
}

/// Stores user reports and hands them to the moderators' mail relay through
/// `artists_heaven.report.received`.
pub struct ReportService {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
}

impl ReportService {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Self { Self { store, notifier } }

    #[instrument(skip(self, request), fields(kind = %request.kind))]
    pub async fn send(&self, request: ReportRequest) -> Result<EmailReport> {
        request.validate()?;
        let mut report = EmailReport::file(
            request.kind, request.subject.trim().to_string(), request.sender.trim().to_lowercase(),
            request.username.trim().to_string(), request.description,
        );
        self.store.insert_report(&report).await?;
        info!(report_id = %report.id, "report received");
        publish_all(self.notifier.as_ref(), &report.take_events()).await;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, TimeZone, Utc};

    use super::*;
    use crate::error::AppError;
    use crate::notify::RecordingNotifier;
    use crate::store::MemoryStore;

    fn report(kind: ReportKind) -> ReportRequest {
        ReportRequest {
            kind, subject: "Cart empties".into(), sender: "Ana@Example.com".into(), username: "ana".into(),
            description: "The cart empties after login".into(),
        }
    }

    #[tokio::test]
    async fn test_send_persists_and_publishes() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let reports = ReportService::new(store.clone(), notifier.clone());

        let sent = reports.send(report(ReportKind::BugReport)).await.unwrap();
        assert_eq!(sent.sender, "ana@example.com");
        assert_eq!(notifier.subjects().await, vec!["artists_heaven.report.received"]);

        let year = Utc::now().year();
        let from = Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(year + 1, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(store.count_reports_by_kind(from, to).await.unwrap(), vec![(ReportKind::BugReport, 1)]);
    }

    #[tokio::test]
    async fn test_send_validates_fields() {
        let reports = ReportService::new(Arc::new(MemoryStore::new()), Arc::new(RecordingNotifier::default()));
        let no_sender = ReportRequest { sender: "not-an-email".into(), ..report(ReportKind::Abuse) };
        assert!(matches!(reports.send(no_sender).await, Err(AppError::Validation(_))));
        let long = ReportRequest { description: "x".repeat(2001), ..report(ReportKind::Other) };
        assert!(matches!(reports.send(long).await, Err(AppError::Validation(_))));
    }
}
