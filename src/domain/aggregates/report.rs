//! User reports sent to the moderators

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use crate::domain::events::{DomainEvent, ReportEvent};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportKind { Abuse, BugReport, FeatureRequest, Other }

impl ReportKind {
    pub const ALL: [ReportKind; 4] = [Self::Abuse, Self::BugReport, Self::FeatureRequest, Self::Other];

    pub fn as_str(&self) -> &'static str {
        match self { Self::Abuse => "ABUSE", Self::BugReport => "BUG_REPORT", Self::FeatureRequest => "FEATURE_REQUEST", Self::Other => "OTHER" }
    }

    pub fn parse(s: &str) -> Option<Self> { Self::ALL.into_iter().find(|k| k.as_str() == s) }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmailReport {
    pub id: Uuid,
    pub kind: ReportKind,
    pub subject: String,
    pub sender: String,
    pub username: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

impl EmailReport {
    pub fn file(kind: ReportKind, subject: String, sender: String, username: String, description: String) -> Self {
        let mut r = Self { id: Uuid::now_v7(), kind, subject, sender, username, description, created_at: Utc::now(), events: vec![] };
        r.raise_event(DomainEvent::Report(ReportEvent::Received {
            report_id: r.id, kind: r.kind, moderator_subject: r.moderator_subject(), username: r.username.clone(),
            description: r.description.clone(),
        }));
        r
    }

    pub fn restore(id: Uuid, kind: ReportKind, subject: String, sender: String, username: String, description: String, created_at: DateTime<Utc>) -> Self {
        Self { id, kind, subject, sender, username, description, created_at, events: vec![] }
    }

    /// Subject line of the message forwarded to the moderators.
    pub fn moderator_subject(&self) -> String { format!("{} [{}] User: {}", self.id, self.kind, self.username) }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filed_report_raises_event() {
        let mut r = EmailReport::file(ReportKind::BugReport, "Broken cart".into(), "ana@example.com".into(), "ana".into(), "Cart empties".into());
        assert!(r.moderator_subject().ends_with("[BUG_REPORT] User: ana"));
        let events = r.take_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].subject(), "artists_heaven.report.received");
        assert_eq!(ReportKind::parse("FEATURE_REQUEST"), Some(ReportKind::FeatureRequest));
    }
}
