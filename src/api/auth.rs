use axum::http::request::Parts;
use axum::{async_trait, extract::FromRequestParts};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::Role;

/// Identity injected by the upstream auth middleware. Authentication itself
/// is an external collaborator; this service trusts the forwarded headers.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_role(self, allowed: &[Role]) -> Result<(), AppError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "role {} cannot access this resource",
                self.role
            )))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value).ok())
            .ok_or(AppError::Unauthorized)?;
        let role = parts
            .headers
            .get("x-user-role")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<Role>().ok())
            .ok_or(AppError::Unauthorized)?;

        Ok(Self { user_id, role })
    }
}
