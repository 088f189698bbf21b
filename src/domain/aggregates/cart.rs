//! Cart Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use crate::domain::value_objects::Section;

/// Who a cart belongs to: a registered user or an anonymous browser session.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CartOwner {
    User(Uuid),
    Session(String),
}

impl CartOwner {
    /// Stable key used by storage.
    pub fn key(&self) -> String {
        match self { Self::User(id) => format!("user:{id}"), Self::Session(token) => format!("session:{token}") }
    }
    pub fn user_id(&self) -> Option<Uuid> { match self { Self::User(id) => Some(*id), Self::Session(_) => None } }
}

impl fmt::Display for CartOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.key()) }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Cart {
    owner: CartOwner,
    items: Vec<CartItem>,
    updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: Uuid,
    pub section: Section,
    pub size: Option<String>,
    pub color: String,
    pub quantity: u32,
}

impl CartItem {
    fn same_line(&self, other: &CartItem) -> bool {
        self.product_id == other.product_id
            && self.color.eq_ignore_ascii_case(&other.color)
            && (!self.section.is_sized() || self.size == other.size)
    }
}

impl Cart {
    pub fn new(owner: CartOwner) -> Self { Self { owner, items: vec![], updated_at: Utc::now() } }
    pub fn restore(owner: CartOwner, items: Vec<CartItem>, updated_at: DateTime<Utc>) -> Self { Self { owner, items, updated_at } }

    pub fn owner(&self) -> &CartOwner { &self.owner }
    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn item_count(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    pub fn add_item(&mut self, mut item: CartItem) -> Result<(), CartError> {
        if item.quantity == 0 { return Err(CartError::InvalidQuantity); }
        if !item.section.is_sized() { item.size = None; }
        if let Some(existing) = self.items.iter_mut().find(|i| i.same_line(&item)) {
            existing.quantity += item.quantity;
        } else {
            self.items.push(item);
        }
        self.touch();
        Ok(())
    }

    /// Takes one unit off the line at `index`; the line goes away at zero.
    pub fn remove_one(&mut self, index: usize) -> Result<(), CartError> {
        let item = self.items.get_mut(index).ok_or(CartError::ItemNotFound)?;
        if item.quantity <= 1 { self.items.remove(index); } else { item.quantity -= 1; }
        self.touch();
        Ok(())
    }

    pub fn clear(&mut self) { self.items.clear(); self.touch(); }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CartError { ItemNotFound, InvalidQuantity }
impl std::error::Error for CartError {}
impl fmt::Display for CartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::ItemNotFound => write!(f, "Item not found"), Self::InvalidQuantity => write!(f, "Quantity must be positive") }
    }
}
