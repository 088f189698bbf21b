//! Caller identity as asserted by the auth gateway in front of the service.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use tracing::warn;
use uuid::Uuid;

use crate::domain::aggregates::UserRole;
use crate::error::AppError;
use crate::services::Actor;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim).filter(|v| !v.is_empty())
}

/// `Ok(None)` when no identity was forwarded; an error when one was forwarded
/// but cannot be read.
fn actor_from(parts: &Parts) -> Result<Option<Actor>, AppError> {
    let Some(raw_id) = header(parts, USER_ID_HEADER) else { return Ok(None) };
    let user_id = Uuid::parse_str(raw_id).map_err(|_| {
        warn!("malformed X-User-Id header");
        AppError::Unauthorized("Invalid X-User-Id header".into())
    })?;
    let role = match header(parts, USER_ROLE_HEADER) {
        Some(raw) => raw.parse::<UserRole>().map_err(AppError::Unauthorized)?,
        None => UserRole::User,
    };
    Ok(Some(Actor { user_id, role }))
}

#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub Actor);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        actor_from(parts)?.map(Self).ok_or_else(|| AppError::Unauthorized("Authentication required".into()))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MaybeUser(pub Option<Actor>);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        actor_from(parts).map(Self)
    }
}

impl MaybeUser {
    pub fn is_admin(&self) -> bool { self.0.is_some_and(|a| a.is_admin()) }
}

#[derive(Debug, Clone, Copy)]
pub struct AdminUser(pub Actor);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentUser(actor) = CurrentUser::from_request_parts(parts, state).await?;
        if !actor.is_admin() {
            return Err(AppError::Forbidden("Administrator role required".into()));
        }
        Ok(Self(actor))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/");
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn test_extractors() {
        let id = Uuid::now_v7().to_string();
        let mut anonymous = parts(&[]);
        assert!(MaybeUser::from_request_parts(&mut anonymous, &()).await.unwrap().0.is_none());
        assert!(matches!(CurrentUser::from_request_parts(&mut anonymous, &()).await, Err(AppError::Unauthorized(_))));

        let mut user = parts(&[("X-User-Id", id.as_str())]);
        assert_eq!(CurrentUser::from_request_parts(&mut user, &()).await.unwrap().0.role, UserRole::User);
        assert!(matches!(AdminUser::from_request_parts(&mut user, &()).await, Err(AppError::Forbidden(_))));

        let mut admin = parts(&[("X-User-Id", id.as_str()), ("X-User-Role", "admin")]);
        assert!(AdminUser::from_request_parts(&mut admin, &()).await.is_ok());

        let mut garbled = parts(&[("X-User-Id", "42")]);
        assert!(matches!(MaybeUser::from_request_parts(&mut garbled, &()).await, Err(AppError::Unauthorized(_))));
    }
}
