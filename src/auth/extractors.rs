use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
};
use tracing::warn;

use crate::auth::error::AuthError;
use crate::auth::repo_types::User;
use crate::auth::services;
use crate::state::AppState;

/// Bearer-token guard for protected routes: extracts the access token,
/// resolves it to a full user record, rejects everything else.
#[derive(Debug)]
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // A request with no Authorization header at all is refused outright
        // (403); anything present but unusable is 401.
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(AuthError::MissingAuthHeader)?;

        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or_else(|| {
                warn!("authorization header is not a bearer token");
                AuthError::Unauthenticated
            })?;

        let user = services::resolve_current_user(state, token).await?;
        Ok(CurrentUser(user))
    }
}
