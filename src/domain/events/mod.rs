//! Domain events
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::ReportKind;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "aggregate", content = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Order(OrderEvent),
    Catalog(CatalogEvent),
    Community(CommunityEvent),
    Artist(ArtistEvent),
    Report(ReportEvent),
}

/// Line as it appears in a purchase confirmation.
#[derive(Clone, Debug, Serialize)]
pub struct PurchasedLine { pub name: String, pub size: Option<String>, pub color: String, pub quantity: u32, pub unit_price: Decimal }

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Paid { order_id: Uuid, order_number: String, email: String, total: Decimal, discount: Decimal, lines: Vec<PurchasedLine> },
    StatusChanged { order_id: Uuid, status: String },
    ReturnRequested { order_id: Uuid, order_number: String, email: String, reason: String },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CatalogEvent {
    Created { product_id: Uuid, name: String },
    Oversold { product_id: Uuid, color: String, size: Option<String>, shortfall: u32 },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommunityEvent {
    Submitted { user_product_id: Uuid, owner_id: Uuid },
    Approved { user_product_id: Uuid, owner_id: Uuid },
    Rejected { user_product_id: Uuid, owner_id: Uuid },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArtistEvent {
    Registered { artist_id: Uuid, artist_name: String },
    VerificationRequested { verification_id: Uuid, artist_id: Uuid, artist_name: String },
    Verified { artist_id: Uuid, verification_id: Uuid },
    VerificationRefused { artist_id: Uuid, verification_id: Uuid },
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReportEvent {
    Received { report_id: Uuid, kind: ReportKind, moderator_subject: String, username: String, description: String },
}

impl DomainEvent {
    /// NATS subject the event is published on.
    pub fn subject(&self) -> String {
        let (aggregate, name) = match self {
            Self::Order(e) => ("order", match e {
                OrderEvent::Paid { .. } => "paid",
                OrderEvent::StatusChanged { .. } => "status_changed",
                OrderEvent::ReturnRequested { .. } => "return_requested",
            }),
            Self::Catalog(e) => ("catalog", match e {
                CatalogEvent::Created { .. } => "created",
                CatalogEvent::Oversold { .. } => "oversold",
            }),
            Self::Community(e) => ("community", match e {
                CommunityEvent::Submitted { .. } => "submitted",
                CommunityEvent::Approved { .. } => "approved",
                CommunityEvent::Rejected { .. } => "rejected",
            }),
            Self::Artist(e) => ("artist", match e {
                ArtistEvent::Registered { .. } => "registered",
                ArtistEvent::VerificationRequested { .. } => "verification_requested",
                ArtistEvent::Verified { .. } => "verified",
                ArtistEvent::VerificationRefused { .. } => "verification_refused",
            }),
            Self::Report(e) => ("report", match e {
                ReportEvent::Received { .. } => "received",
            }),
        };
        format!("artists_heaven.{aggregate}.{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_subject_and_payload() {
        let e = DomainEvent::Order(OrderEvent::StatusChanged { order_id: Uuid::nil(), status: "SENT".into() });
        assert_eq!(e.subject(), "artists_heaven.order.status_changed");
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["aggregate"], "order");
        assert_eq!(json["event"]["type"], "status_changed");
        assert_eq!(json["event"]["status"], "SENT");
    }
}
