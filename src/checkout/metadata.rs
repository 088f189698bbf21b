//! Cart lines packed into checkout session metadata so the webhook can rebuild
//! the order without any server-side state.
//!
//! Layout: `product_<uuid>` → `qty|size|color` (`qty|color` for accessories),
//! several lines of one product joined by `,`; `userId` → user id or
//! `Anonymous`; `cartSession` → token of the anonymous cart, when there is one.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{CartItem, CartOwner};

pub const USER_KEY: &str = "userId";
pub const CART_SESSION_KEY: &str = "cartSession";
pub const ANONYMOUS: &str = "Anonymous";
const PRODUCT_PREFIX: &str = "product_";

// Provider limits on metadata.
const MAX_KEYS: usize = 50;
const MAX_VALUE_LEN: usize = 500;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("metadata has no {USER_KEY} entry")]
    MissingUser,
    #[error("invalid user id {0:?}")]
    InvalidUser(String),
    #[error("invalid metadata key {0:?}")]
    InvalidKey(String),
    #[error("invalid line {value:?} under {key}")]
    InvalidLine { key: String, value: String },
    #[error("{0:?} contains a reserved character")]
    ReservedCharacter(String),
    #[error("cart is too large to encode")]
    TooLarge,
}

/// One cart line as carried through the payment provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataLine {
    pub product_id: Uuid,
    pub quantity: u32,
    pub size: Option<String>,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutMetadata {
    pub user_id: Option<Uuid>,
    pub cart_session: Option<String>,
    pub lines: Vec<MetadataLine>,
}

pub fn encode(items: &[CartItem], owner: &CartOwner) -> Result<BTreeMap<String, String>, MetadataError> {
    let mut map: BTreeMap<String, String> = BTreeMap::new();
    for item in items {
        reject_reserved(&item.color)?;
        let value = match (&item.size, item.section.is_sized()) {
            (Some(size), true) => {
                reject_reserved(size)?;
                format!("{}|{}|{}", item.quantity, size, item.color)
            }
            _ => format!("{}|{}", item.quantity, item.color),
        };
        map.entry(format!("{PRODUCT_PREFIX}{}", item.product_id))
            .and_modify(|existing| { existing.push(','); existing.push_str(&value); })
            .or_insert(value);
    }
    match owner {
        CartOwner::User(id) => { map.insert(USER_KEY.into(), id.to_string()); }
        CartOwner::Session(token) => {
            map.insert(USER_KEY.into(), ANONYMOUS.into());
            map.insert(CART_SESSION_KEY.into(), token.clone());
        }
    }
    if map.len() > MAX_KEYS || map.values().any(|v| v.len() > MAX_VALUE_LEN) {
        return Err(MetadataError::TooLarge);
    }
    Ok(map)
}

pub fn decode(map: &HashMap<String, String>) -> Result<CheckoutMetadata, MetadataError> {
    let user = map.get(USER_KEY).ok_or(MetadataError::MissingUser)?;
    let user_id = if user == ANONYMOUS {
        None
    } else {
        Some(user.parse::<Uuid>().map_err(|_| MetadataError::InvalidUser(user.clone()))?)
    };

    let mut keys: Vec<&String> = map.keys().filter(|k| k.starts_with(PRODUCT_PREFIX)).collect();
    keys.sort();
    let mut lines = Vec::new();
    for key in keys {
        let product_id = key[PRODUCT_PREFIX.len()..].parse::<Uuid>().map_err(|_| MetadataError::InvalidKey(key.clone()))?;
        for entry in map[key].split(',') {
            lines.push(decode_line(product_id, entry).ok_or_else(|| MetadataError::InvalidLine { key: key.clone(), value: entry.to_string() })?);
        }
    }

    Ok(CheckoutMetadata { user_id, cart_session: map.get(CART_SESSION_KEY).cloned(), lines })
}

fn decode_line(product_id: Uuid, entry: &str) -> Option<MetadataLine> {
    let parts: Vec<&str> = entry.split('|').map(str::trim).collect();
    let (quantity, size, color) = match parts.as_slice() {
        [q, size, color] => (*q, Some(size.to_string()), *color),
        [q, color] => (*q, None, *color),
        _ => return None,
    };
    let quantity: u32 = quantity.parse().ok().filter(|q| *q > 0)?;
    if color.is_empty() { return None; }
    Some(MetadataLine { product_id, quantity, size, color: color.to_string() })
}

fn reject_reserved(value: &str) -> Result<(), MetadataError> {
    if value.contains(['|', ',']) { Err(MetadataError::ReservedCharacter(value.to_string())) } else { Ok(()) }
}
