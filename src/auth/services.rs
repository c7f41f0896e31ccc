use anyhow::Context;
use axum::extract::FromRef;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use crate::auth::claims::TokenKind;
use crate::auth::dto::{LoginRequest, PublicUser, RegisterRequest, TokenPair};
use crate::auth::error::AuthError;
use crate::auth::jwt::JwtKeys;
use crate::auth::password::{hash_password, verify_password};
use crate::auth::repo_types::{User, UserStoreError};
use crate::state::AppState;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Argon2 is CPU-bound and deliberately slow; run it off the async workers.
async fn hash_password_blocking(password: String) -> anyhow::Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .context("password hashing task panicked")?
}

async fn verify_password_blocking(password: String, hash: String) -> anyhow::Result<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .context("password verification task panicked")
}

pub async fn register(state: &AppState, payload: RegisterRequest) -> Result<PublicUser, AuthError> {
    if !is_valid_email(&payload.email) {
        warn!("register rejected: invalid email");
        return Err(AuthError::InvalidRequest("Invalid email".into()));
    }
    if payload.password.len() < 8 {
        warn!("register rejected: password too short");
        return Err(AuthError::InvalidRequest("Password too short".into()));
    }

    if User::find_by_email(&state.db, &payload.email)
        .await?
        .is_some()
    {
        warn!(email = %payload.email, "email already registered");
        return Err(AuthError::EmailTaken);
    }

    let hash = hash_password_blocking(payload.password).await?;

    // Concurrent registrations of the same email race here; the unique
    // constraint picks the winner and the loser sees EmailTaken.
    let user = match User::create(&state.db, &payload.email, &payload.name, &hash).await {
        Ok(user) => user,
        Err(UserStoreError::DuplicateEmail) => {
            warn!(email = %payload.email, "email already registered");
            return Err(AuthError::EmailTaken);
        }
        Err(UserStoreError::Database(e)) => {
            return Err(AuthError::Internal(
                anyhow::Error::new(e).context("create user"),
            ))
        }
    };

    info!(user_id = user.id, email = %user.email, "user registered");
    Ok(PublicUser::from(user))
}

pub async fn login(state: &AppState, payload: LoginRequest) -> Result<TokenPair, AuthError> {
    // Unknown email and wrong password are indistinguishable to the caller.
    let user = match User::find_by_email(&state.db, &payload.email).await? {
        Some(user) => user,
        None => {
            warn!("login failed: unknown email");
            return Err(AuthError::InvalidCredentials);
        }
    };

    if !verify_password_blocking(payload.password, user.password_hash.clone()).await? {
        warn!(user_id = user.id, "login failed: invalid password");
        return Err(AuthError::InvalidCredentials);
    }

    let keys = JwtKeys::from_ref(state);
    let access_token = keys.sign_access(&user.email, user.id)?;
    let refresh_token = keys.sign_refresh(&user.email, user.id)?;

    info!(user_id = user.id, email = %user.email, "user logged in");
    Ok(TokenPair::bearer(access_token, refresh_token))
}

pub async fn refresh(state: &AppState, refresh_token: &str) -> Result<TokenPair, AuthError> {
    let keys = JwtKeys::from_ref(state);
    let claims = keys
        .decode(refresh_token)
        .map_err(|_| AuthError::InvalidRefreshToken)?;
    if claims.kind != TokenKind::Refresh {
        warn!(user_id = claims.user_id, "refresh rejected: wrong token kind");
        return Err(AuthError::InvalidRefreshToken);
    }

    let user = User::find_by_id(&state.db, claims.user_id)
        .await?
        .ok_or(AuthError::UserNotFound)?;

    // Rotate both tokens. The previous refresh token stays valid until its
    // own expiry; nothing is persisted server-side to revoke it.
    let access_token = keys.sign_access(&user.email, user.id)?;
    let new_refresh_token = keys.sign_refresh(&user.email, user.id)?;

    info!(user_id = user.id, "tokens refreshed");
    Ok(TokenPair::bearer(access_token, new_refresh_token))
}

pub async fn resolve_current_user(state: &AppState, token: &str) -> Result<User, AuthError> {
    let keys = JwtKeys::from_ref(state);
    let claims = keys.decode(token).map_err(|_| AuthError::Unauthenticated)?;
    if claims.kind != TokenKind::Access {
        warn!(user_id = claims.user_id, "access rejected: wrong token kind");
        return Err(AuthError::Unauthenticated);
    }

    User::find_by_id(&state.db, claims.user_id)
        .await?
        .ok_or(AuthError::Unauthenticated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plausible_emails() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("first.last@sub.domain.org"));
    }

    #[test]
    fn rejects_garbage_emails() {
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("two@@example.com"));
        assert!(!is_valid_email("spaces in@example.com"));
        assert!(!is_valid_email("missing@tld"));
    }

    // Wrong-kind tokens are rejected before any store lookup, so these run
    // against a lazy pool that never connects.

    #[tokio::test]
    async fn refresh_rejects_access_token() {
        let state = AppState::fake();
        let keys = JwtKeys::from_ref(&state);
        let access = keys.sign_access("a@x.com", 1).expect("sign access");
        let err = refresh(&state, &access).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidRefreshToken));
    }

    #[tokio::test]
    async fn refresh_rejects_garbage_token() {
        let state = AppState::fake();
        let err = refresh(&state, "definitely-not-a-jwt").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidRefreshToken));
    }

    #[tokio::test]
    async fn resolve_current_user_rejects_refresh_token() {
        let state = AppState::fake();
        let keys = JwtKeys::from_ref(&state);
        let token = keys.sign_refresh("a@x.com", 1).expect("sign refresh");
        let err = resolve_current_user(&state, &token).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthenticated));
    }

    #[tokio::test]
    async fn resolve_current_user_rejects_garbage_token() {
        let state = AppState::fake();
        let err = resolve_current_user(&state, "definitely-not-a-jwt")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthenticated));
    }
}
