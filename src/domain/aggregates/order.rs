//! Order Aggregate

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::events::{DomainEvent, OrderEvent, PurchasedLine};
use crate::domain::value_objects::{Money, Section};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Option<Uuid>,
    pub email: String,
    pub phone: Option<String>,
    pub shipping_address: ShippingAddress,
    pub total: Decimal,
    pub discount: Decimal,
    pub payment_intent: Option<String>,
    pub checkout_session_id: String,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub return_request: Option<ReturnRequest>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub section: Section,
    pub size: Option<String>,
    pub color: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

impl OrderItem {
    pub fn line_total(&self) -> Money { Money::eur(self.unit_price).multiply(self.quantity) }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
}

impl ShippingAddress {
    pub fn format(&self) -> String {
        let mut out = Vec::new();
        if let Some(l) = &self.line1 { out.push(l.clone()); }
        if let Some(l) = &self.line2 { out.push(l.clone()); }
        let locality = [self.postal_code.as_deref(), self.city.as_deref()].into_iter().flatten().collect::<Vec<_>>().join(" ");
        if !locality.is_empty() { out.push(locality); }
        if let Some(c) = &self.country { out.push(c.clone()); }
        out.join("\n")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRequest {
    pub id: Uuid,
    pub reason: String,
    pub requested_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus { #[default] Paid, InPreparation, Sent, Delivered, ReturnRequest, ReturnAccepted }

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [Self::Paid, Self::InPreparation, Self::Sent, Self::Delivered, Self::ReturnRequest, Self::ReturnAccepted];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paid => "PAID", Self::InPreparation => "IN_PREPARATION", Self::Sent => "SENT",
            Self::Delivered => "DELIVERED", Self::ReturnRequest => "RETURN_REQUEST", Self::ReturnAccepted => "RETURN_ACCEPTED",
        }
    }

    /// Statuses an administrator may move an order to from `self`.
    pub fn can_move_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (Self::Paid, Self::InPreparation) | (Self::InPreparation, Self::Sent) | (Self::Sent, Self::Delivered)
                | (Self::ReturnRequest, Self::ReturnAccepted)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|st| st.as_str().eq_ignore_ascii_case(s.trim())).ok_or_else(|| OrderError::UnknownStatus(s.to_string()))
    }
}

/// Payment details taken from a completed checkout session.
#[derive(Clone, Debug)]
pub struct PaidCheckout {
    pub checkout_session_id: String,
    pub payment_intent: Option<String>,
    pub user_id: Option<Uuid>,
    pub email: String,
    pub phone: Option<String>,
    pub shipping_address: ShippingAddress,
    pub total: Decimal,
    pub discount: Decimal,
}

impl Order {
    /// A freshly paid order. Raises the event that drives the confirmation email.
    pub fn paid(order_number: String, checkout: PaidCheckout, items: Vec<OrderItem>) -> Result<Self, OrderError> {
        if items.is_empty() { return Err(OrderError::NoItems); }
        let now = Utc::now();
        let mut order = Self {
            id: Uuid::now_v7(), order_number, user_id: checkout.user_id, email: checkout.email, phone: checkout.phone,
            shipping_address: checkout.shipping_address, total: checkout.total, discount: checkout.discount,
            payment_intent: checkout.payment_intent, checkout_session_id: checkout.checkout_session_id,
            status: OrderStatus::Paid, items, return_request: None, created_at: now, updated_at: now, events: vec![],
        };
        let lines = order.items.iter().map(|i| PurchasedLine {
            name: i.name.clone(), size: i.size.clone(), color: i.color.clone(), quantity: i.quantity, unit_price: i.unit_price,
        }).collect();
        order.raise_event(DomainEvent::Order(OrderEvent::Paid {
            order_id: order.id, order_number: order.order_number.clone(), email: order.email.clone(),
            total: order.total, discount: order.discount, lines,
        }));
        Ok(order)
    }

    /// Rebuilds an order loaded from storage; no events are raised.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: Uuid, order_number: String, user_id: Option<Uuid>, email: String, phone: Option<String>,
        shipping_address: ShippingAddress, total: Decimal, discount: Decimal, payment_intent: Option<String>,
        checkout_session_id: String, status: OrderStatus, items: Vec<OrderItem>, return_request: Option<ReturnRequest>,
        created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id, order_number, user_id, email, phone, shipping_address, total, discount, payment_intent,
            checkout_session_id, status, items, return_request, created_at, updated_at, events: vec![],
        }
    }

    pub fn items_total(&self) -> Money {
        self.items.iter().fold(Money::zero("EUR"), |acc, i| acc.add(&i.line_total()).unwrap_or(acc))
    }

    pub fn contains_product(&self, product_id: Uuid) -> bool { self.items.iter().any(|i| i.product_id == product_id) }

    pub fn transition_to(&mut self, next: OrderStatus) -> Result<(), OrderError> {
        if !self.status.can_move_to(next) { return Err(OrderError::InvalidTransition { from: self.status, to: next }); }
        self.status = next;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::StatusChanged { order_id: self.id, status: next.to_string() }));
        Ok(())
    }

    pub fn request_return(&mut self, reason: impl Into<String>, now: DateTime<Utc>, window_days: i64) -> Result<&ReturnRequest, OrderError> {
        if self.return_request.is_some() { return Err(OrderError::ReturnAlreadyRequested); }
        if self.created_at < now - Duration::days(window_days) { return Err(OrderError::ReturnWindowClosed); }
        let reason = reason.into();
        self.status = OrderStatus::ReturnRequest;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::ReturnRequested {
            order_id: self.id, order_number: self.order_number.clone(), email: self.email.clone(), reason: reason.clone(),
        }));
        let request = self.return_request.insert(ReturnRequest { id: Uuid::now_v7(), reason, requested_at: now });
        Ok(&*request)
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

/// Order numbers are short, random and human readable.
pub fn new_order_number() -> String { format!("AH-{:010}", rand::random::<u32>()) }

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("Order has no items")]
    NoItems,
    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("A return has already been requested for this order")]
    ReturnAlreadyRequested,
    #[error("The return window for this order has closed")]
    ReturnWindowClosed,
    #[error("Unknown order status {0}")]
    UnknownStatus(String),
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn paid_order(user_id: Option<Uuid>, product_id: Uuid) -> Order {
        let checkout = PaidCheckout {
            checkout_session_id: format!("cs_test_{}", Uuid::now_v7().simple()), payment_intent: Some("pi_1".into()),
            user_id, email: "buyer@example.com".into(), phone: None, shipping_address: ShippingAddress::default(),
            total: Decimal::new(90, 0), discount: Decimal::ZERO,
        };
        let item = OrderItem {
            id: Uuid::now_v7(), product_id, name: "Night Hoodie".into(), section: Section::Hoodies,
            size: Some("M".into()), color: "Black".into(), quantity: 2, unit_price: Decimal::new(45, 0),
        };
        Order::paid(new_order_number(), checkout, vec![item]).unwrap()
    }

    #[test]
    fn test_order_workflow() {
        let mut order = paid_order(None, Uuid::now_v7());
        assert_eq!(order.status, OrderStatus::Paid);
        assert_eq!(order.items_total().amount(), Decimal::new(90, 0));
        assert!(matches!(order.take_events()[0], DomainEvent::Order(OrderEvent::Paid { .. })));
        order.transition_to(OrderStatus::InPreparation).unwrap();
        order.transition_to(OrderStatus::Sent).unwrap();
        assert_eq!(
            order.transition_to(OrderStatus::Paid),
            Err(OrderError::InvalidTransition { from: OrderStatus::Sent, to: OrderStatus::Paid })
        );
        order.transition_to(OrderStatus::Delivered).unwrap();
        assert_eq!(order.status, OrderStatus::Delivered);
    }

    #[test]
    fn test_empty_order_rejected() {
        let checkout = PaidCheckout {
            checkout_session_id: "cs_1".into(), payment_intent: None, user_id: None, email: "a@b.c".into(), phone: None,
            shipping_address: ShippingAddress::default(), total: Decimal::ZERO, discount: Decimal::ZERO,
        };
        assert_eq!(Order::paid("AH-1".into(), checkout, vec![]).unwrap_err(), OrderError::NoItems);
    }

    #[test]
    fn test_return_rules() {
        let mut order = paid_order(None, Uuid::now_v7());
        let now = Utc::now();
        order.request_return("Too small", now, 30).unwrap();
        assert_eq!(order.status, OrderStatus::ReturnRequest);
        assert_eq!(order.request_return("again", now, 30).unwrap_err(), OrderError::ReturnAlreadyRequested);

        let mut old = paid_order(None, Uuid::now_v7());
        old.created_at = now - Duration::days(31);
        assert_eq!(old.request_return("late", now, 30).unwrap_err(), OrderError::ReturnWindowClosed);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("in_preparation".parse::<OrderStatus>().unwrap(), OrderStatus::InPreparation);
        assert!("lost".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_address_format() {
        let a = ShippingAddress {
            line1: Some("Calle Verdejo 114".into()), line2: None, postal_code: Some("41001".into()),
            city: Some("Sevilla".into()), country: Some("ES".into()),
        };
        assert_eq!(a.format(), "Calle Verdejo 114\n41001 Sevilla\nES");
    }
}
