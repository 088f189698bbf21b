//! Product Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;
use crate::domain::events::{CatalogEvent, DomainEvent};
use crate::domain::value_objects::{Money, Section};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub reference: i64,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub section: Section,
    pub available: bool,
    pub on_promotion: bool,
    pub discount: i32,
    pub category_ids: Vec<Uuid>,
    pub images: Vec<String>,
    pub composition: String,
    pub shipping_details: String,
    pub colors: Vec<ProductColor>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

/// Stock is held per colour; sized sections keep units per size label.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductColor {
    pub name: String,
    pub hex_code: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub sizes: BTreeMap<String, i32>,
    #[serde(default)]
    pub available_units: i32,
}

/// Fields accepted when creating or editing a product.
#[derive(Clone, Debug)]
pub struct ProductDraft {
    pub reference: i64,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub section: Section,
    pub category_ids: Vec<Uuid>,
    pub images: Vec<String>,
    pub composition: String,
    pub shipping_details: String,
    pub colors: Vec<ProductColor>,
}

impl Product {
    pub fn create(draft: ProductDraft) -> Result<Self, ProductError> {
        let now = Utc::now();
        let mut product = Self {
            id: Uuid::now_v7(), reference: draft.reference, name: draft.name, description: draft.description,
            price: draft.price, section: draft.section, available: true, on_promotion: false, discount: 0,
            category_ids: draft.category_ids, images: draft.images, composition: draft.composition,
            shipping_details: draft.shipping_details, colors: draft.colors, created_at: now, updated_at: now,
            events: vec![],
        };
        product.validate()?;
        product.raise_event(DomainEvent::Catalog(CatalogEvent::Created { product_id: product.id, name: product.name.clone() }));
        Ok(product)
    }

    /// Rebuilds a product loaded from storage; no events are raised.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: Uuid, reference: i64, name: String, description: String, price: Decimal, section: Section,
        available: bool, on_promotion: bool, discount: i32, category_ids: Vec<Uuid>, images: Vec<String>,
        composition: String, shipping_details: String, colors: Vec<ProductColor>,
        created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id, reference, name, description, price, section, available, on_promotion, discount, category_ids,
            images, composition, shipping_details, colors, created_at, updated_at, events: vec![],
        }
    }

    pub fn apply(&mut self, draft: ProductDraft) -> Result<(), ProductError> {
        let before = self.clone();
        self.reference = draft.reference;
        self.name = draft.name;
        self.description = draft.description;
        self.price = draft.price;
        self.section = draft.section;
        self.category_ids = draft.category_ids;
        self.images = draft.images;
        self.composition = draft.composition;
        self.shipping_details = draft.shipping_details;
        self.colors = draft.colors;
        if let Err(e) = self.validate() {
            *self = before;
            return Err(e);
        }
        self.touch();
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ProductError> {
        if self.name.trim().is_empty() { return Err(ProductError::MissingName); }
        if self.price <= Decimal::ZERO { return Err(ProductError::InvalidPrice); }
        if !(0..=100).contains(&self.discount) { return Err(ProductError::InvalidDiscount); }
        if !self.section.is_sized() {
            for color in &self.colors {
                if !color.sizes.is_empty() { return Err(ProductError::SizedAccessory); }
                if color.available_units < 0 { return Err(ProductError::NegativeStock); }
            }
        } else if self.colors.iter().flat_map(|c| c.sizes.values()).any(|u| *u < 0) {
            return Err(ProductError::NegativeStock);
        }
        Ok(())
    }

    /// Price charged today: list price less any running promotion.
    pub fn effective_price(&self) -> Decimal {
        if !self.on_promotion || self.discount == 0 { return self.price; }
        (self.price * Decimal::from(100 - self.discount) / Decimal::ONE_HUNDRED).round_dp(2)
    }

    pub fn unit_price(&self) -> Money { Money::eur(self.effective_price()) }

    pub fn color(&self, name: &str) -> Result<&ProductColor, ProductError> {
        self.colors.iter().find(|c| c.name.eq_ignore_ascii_case(name)).ok_or_else(|| ProductError::ColorNotFound(name.to_string()))
    }

    fn color_mut(&mut self, name: &str) -> Result<&mut ProductColor, ProductError> {
        self.colors.iter_mut().find(|c| c.name.eq_ignore_ascii_case(name)).ok_or_else(|| ProductError::ColorNotFound(name.to_string()))
    }

    /// Units on hand for a colour (and size, for sized sections).
    pub fn units_available(&self, color: &str, size: Option<&str>) -> Result<i32, ProductError> {
        let c = self.color(color)?;
        if !self.section.is_sized() { return Ok(c.available_units); }
        let size = size.filter(|s| !s.is_empty()).ok_or(ProductError::SizeRequired)?;
        c.sizes.get(size).copied().ok_or_else(|| ProductError::SizeNotFound(size.to_string()))
    }

    pub fn can_fulfil(&self, color: &str, size: Option<&str>, quantity: u32) -> Result<bool, ProductError> {
        Ok(self.available && i64::from(self.units_available(color, size)?) >= i64::from(quantity))
    }

    /// Removes sold units. Stock never goes below zero; the missing units are returned.
    pub fn remove_stock(&mut self, color: &str, size: Option<&str>, quantity: u32) -> Result<u32, ProductError> {
        let sized = self.section.is_sized();
        let product_id = self.id;
        let c = self.color_mut(color)?;
        let slot = if sized {
            let size = size.filter(|s| !s.is_empty()).ok_or(ProductError::SizeRequired)?;
            c.sizes.get_mut(size).ok_or_else(|| ProductError::SizeNotFound(size.to_string()))?
        } else {
            &mut c.available_units
        };
        let on_hand = i64::from((*slot).max(0));
        let wanted = i64::from(quantity);
        let shortfall = (wanted - on_hand).max(0) as u32;
        *slot = (on_hand - wanted).max(0) as i32;
        let color_name = c.name.clone();
        if shortfall > 0 {
            self.raise_event(DomainEvent::Catalog(CatalogEvent::Oversold {
                product_id, color: color_name, size: size.map(str::to_string), shortfall,
            }));
        }
        self.touch();
        Ok(shortfall)
    }

    pub fn promote(&mut self, discount: i32) -> Result<(), ProductError> {
        if !(1..=100).contains(&discount) { return Err(ProductError::InvalidDiscount); }
        self.on_promotion = true;
        self.discount = discount;
        self.touch();
        Ok(())
    }

    pub fn demote(&mut self) { self.on_promotion = false; self.discount = 0; self.touch(); }
    pub fn enable(&mut self) { self.available = true; self.touch(); }
    pub fn disable(&mut self) { self.available = false; self.touch(); }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProductError {
    #[error("Product name is required")]
    MissingName,
    #[error("Price must be greater than zero")]
    InvalidPrice,
    #[error("Discount must be between 0 and 100")]
    InvalidDiscount,
    #[error("Accessories cannot have sizes")]
    SizedAccessory,
    #[error("Stock cannot be negative")]
    NegativeStock,
    #[error("Color {0} not found for product")]
    ColorNotFound(String),
    #[error("Size {0} not found for product")]
    SizeNotFound(String),
    #[error("A size is required for this product")]
    SizeRequired,
}
