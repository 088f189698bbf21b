//! User profile and loyalty points

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole { #[default] User, Artist, Admin }

impl UserRole {
    pub fn as_str(&self) -> &'static str { match self { Self::User => "USER", Self::Artist => "ARTIST", Self::Admin => "ADMIN" } }
}

impl FromStr for UserRole {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USER" => Ok(Self::User),
            "ARTIST" => Ok(Self::Artist),
            "ADMIN" => Ok(Self::Admin),
            other => Err(format!("unknown role {other}")),
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub role: UserRole,
    pub points: i32,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String { format!("{} {}", self.first_name, self.last_name).trim().to_string() }

    /// Users with a stored address get it prefilled at checkout instead of collected.
    pub fn has_shipping_address(&self) -> bool {
        [&self.address, &self.city, &self.postal_code].iter().all(|f| f.as_deref().is_some_and(|v| !v.trim().is_empty()))
    }

    /// Points never drop below zero.
    pub fn add_points(&mut self, delta: i32) { self.points = self.points.saturating_add(delta).max(0); }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn user() -> User {
        User {
            id: Uuid::now_v7(), email: "ana@example.com".into(), username: "ana".into(), first_name: "Ana".into(),
            last_name: "Ruiz".into(), phone: None, address: Some("Calle Sol 1".into()), postal_code: Some("41001".into()),
            city: Some("Sevilla".into()), country: Some("ES".into()), role: UserRole::User, points: 0, created_at: Utc::now(),
        }
    }

    #[test]
    fn test_shipping_address_required_fields() {
        let mut u = user();
        assert!(u.has_shipping_address());
        u.city = Some("  ".into());
        assert!(!u.has_shipping_address());
    }

    #[test]
    fn test_points_floor() {
        let mut u = user();
        u.add_points(20);
        u.add_points(-50);
        assert_eq!(u.points, 0);
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("admin".parse::<UserRole>().unwrap(), UserRole::Admin);
        assert!("root".parse::<UserRole>().is_err());
    }
}
