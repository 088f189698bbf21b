use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, instrument};
use validator::Validate;

use crate::domain::aggregates::User;
use crate::error::{AppError, Result};
use crate::services::Actor;
use crate::store::Store;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ProfileRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 50))]
    pub username: String,
    #[validate(length(max = 100))]
    #[serde(default)]
    pub first_name: String,
    #[validate(length(max = 100))]
    #[serde(default)]
    pub last_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Profiles of the identities the auth gateway vouches for.
pub struct UserService {
    store: Arc<dyn Store>,
}

impl UserService {
    pub fn new(store: Arc<dyn Store>) -> Self { Self { store } }

    #[instrument(skip(self, request), fields(user_id = %actor.user_id))]
    pub async fn register(&self, actor: Actor, request: ProfileRequest) -> Result<User> {
        request.validate()?;
        if self.store.get_user(actor.user_id).await?.is_some() {
            return Err(AppError::Duplicate("Profile already registered".into()));
        }
        let user = User {
            id: actor.user_id,
            email: request.email.trim().to_lowercase(),
            username: request.username.trim().to_string(),
            first_name: request.first_name.trim().to_string(),
            last_name: request.last_name.trim().to_string(),
            phone: non_blank(request.phone),
            address: non_blank(request.address),
            postal_code: non_blank(request.postal_code),
            city: non_blank(request.city),
            country: non_blank(request.country),
            role: actor.role,
            points: 0,
            created_at: Utc::now(),
        };
        self.store.insert_user(&user).await.map_err(|e| match AppError::from(e) {
            AppError::Duplicate(_) => AppError::Duplicate("Email already registered".into()),
            other => other,
        })?;
        info!("profile registered");
        Ok(user)
    }

    pub async fn get(&self, actor: Actor) -> Result<User> {
        self.store.get_user(actor.user_id).await?.ok_or_else(|| AppError::NotFound("User profile not found".into()))
    }

    /// The email is the account's identity and cannot be changed here.
    pub async fn update(&self, actor: Actor, request: ProfileRequest) -> Result<User> {
        request.validate()?;
        let mut user = self.get(actor).await?;
        if !request.email.trim().eq_ignore_ascii_case(&user.email) {
            return Err(AppError::BadRequest("Email cannot be changed".into()));
        }
        user.username = request.username.trim().to_string();
        user.first_name = request.first_name.trim().to_string();
        user.last_name = request.last_name.trim().to_string();
        user.phone = non_blank(request.phone);
        user.address = non_blank(request.address);
        user.postal_code = non_blank(request.postal_code);
        user.city = non_blank(request.city);
        user.country = non_blank(request.country);
        self.store.update_user(&user).await?;
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::domain::aggregates::UserRole;
    use crate::store::MemoryStore;

    fn profile(email: &str) -> ProfileRequest {
        ProfileRequest {
            email: email.into(), username: "lu".into(), first_name: "Lucia".into(), last_name: "Gil".into(),
            phone: Some("  ".into()), address: Some("Calle Luna 3".into()), postal_code: Some("28001".into()),
            city: Some("Madrid".into()), country: Some("ES".into()),
        }
    }

    fn actor() -> Actor { Actor { user_id: Uuid::now_v7(), role: UserRole::Artist } }

    #[tokio::test]
    async fn test_register_and_update() {
        let users = UserService::new(Arc::new(MemoryStore::new()));
        let me = actor();
        let user = users.register(me, profile("Lucia@Example.com")).await.unwrap();
        assert_eq!(user.email, "lucia@example.com");
        assert_eq!(user.role, UserRole::Artist);
        assert_eq!(user.phone, None);
        assert!(user.has_shipping_address());

        let mut change = profile("lucia@example.com");
        change.city = Some("Bilbao".into());
        assert_eq!(users.update(me, change).await.unwrap().city.as_deref(), Some("Bilbao"));
        assert!(matches!(users.update(me, profile("new@example.com")).await, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_duplicates_and_validation() {
        let users = UserService::new(Arc::new(MemoryStore::new()));
        let me = actor();
        users.register(me, profile("lucia@example.com")).await.unwrap();
        assert!(matches!(users.register(me, profile("other@example.com")).await, Err(AppError::Duplicate(_))));
        assert!(matches!(users.register(actor(), profile("LUCIA@example.com")).await, Err(AppError::Duplicate(_))));
        assert!(matches!(users.register(actor(), profile("not-an-email")).await, Err(AppError::Validation(_))));
        assert!(matches!(users.get(actor()).await, Err(AppError::NotFound(_))));
    }
}
