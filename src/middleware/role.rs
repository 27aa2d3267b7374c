use axum::{extract::Request, middleware::Next, response::Response};
use tracing::warn;

use super::auth::AuthUser;
use crate::error::ApiError;

/// Role gate for the admin tier. Must run after `jwt_auth_middleware`.
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let auth_user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or_else(|| ApiError::unauthorized("JWT authentication required before role validation"))?;

    if !auth_user.role.is_admin() {
        warn!(user_id = %auth_user.user_id, role = %auth_user.role, "Admin route refused");
        return Err(ApiError::forbidden("Admin access required"));
    }

    Ok(next.run(request).await)
}
