use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;

use crate::auth::claims::{Claims, TokenKind};
use crate::config::JwtConfig;
use crate::state::AppState;

/// Decode failure: bad signature, malformed token, or expired.
#[derive(Debug, thiserror::Error)]
#[error("invalid token")]
pub struct InvalidToken;

#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub algorithm: Algorithm,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        let JwtConfig {
            secret,
            algorithm,
            access_ttl_minutes,
            refresh_ttl_days,
        } = state.config.jwt.clone();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            algorithm,
            access_ttl: Duration::from_secs((access_ttl_minutes as u64) * 60),
            refresh_ttl: Duration::from_secs((refresh_ttl_days as u64) * 24 * 60 * 60),
        }
    }
}

impl JwtKeys {
    fn sign_with_kind(&self, email: &str, user_id: i64, kind: TokenKind) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        let claims = Claims {
            sub: email.to_string(),
            user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            kind,
        };
        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding)?;
        debug!(user_id, kind = ?kind, "jwt signed");
        Ok(token)
    }

    pub fn sign_access(&self, email: &str, user_id: i64) -> anyhow::Result<String> {
        self.sign_with_kind(email, user_id, TokenKind::Access)
    }
    pub fn sign_refresh(&self, email: &str, user_id: i64) -> anyhow::Result<String> {
        self.sign_with_kind(email, user_id, TokenKind::Refresh)
    }

    /// Returns the embedded claims whatever their kind; callers must check
    /// `kind` themselves at each use site.
    pub fn decode(&self, token: &str) -> Result<Claims, InvalidToken> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|_| InvalidToken)?;
        debug!(user_id = data.claims.user_id, kind = ?data.claims.kind, "jwt decoded");
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keys() -> JwtKeys {
        let state = AppState::fake();
        JwtKeys::from_ref(&state)
    }

    #[tokio::test]
    async fn sign_and_decode_access_token() {
        let keys = make_keys();
        let token = keys.sign_access("a@x.com", 7).expect("sign access");
        let claims = keys.decode(&token).expect("decode token");
        assert_eq!(claims.sub, "a@x.com");
        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.kind, TokenKind::Access);
    }

    #[tokio::test]
    async fn sign_and_decode_refresh_token() {
        let keys = make_keys();
        let token = keys.sign_refresh("a@x.com", 7).expect("sign refresh");
        let claims = keys.decode(&token).expect("decode token");
        assert_eq!(claims.kind, TokenKind::Refresh);
    }

    #[test]
    fn kind_serializes_as_lowercase_type_claim() {
        let claims = Claims {
            sub: "a@x.com".into(),
            user_id: 1,
            iat: 0,
            exp: 0,
            kind: TokenKind::Refresh,
        };
        let json = serde_json::to_string(&claims).expect("serialize claims");
        assert!(json.contains(r#""type":"refresh""#));
    }

    #[tokio::test]
    async fn decode_rejects_garbage() {
        let keys = make_keys();
        assert!(keys.decode("not.a.token").is_err());
        assert!(keys.decode("").is_err());
    }

    #[tokio::test]
    async fn decode_rejects_wrong_secret() {
        let keys = make_keys();
        let other = JwtKeys {
            encoding: EncodingKey::from_secret(b"other-secret"),
            decoding: DecodingKey::from_secret(b"other-secret"),
            algorithm: Algorithm::HS256,
            access_ttl: Duration::from_secs(300),
            refresh_ttl: Duration::from_secs(3600),
        };
        let token = other.sign_access("a@x.com", 1).expect("sign access");
        assert!(keys.decode(&token).is_err());
    }

    #[tokio::test]
    async fn decode_rejects_expired_token() {
        let keys = make_keys();
        let past = OffsetDateTime::now_utc() - TimeDuration::minutes(5);
        let claims = Claims {
            sub: "a@x.com".into(),
            user_id: 1,
            iat: (past - TimeDuration::minutes(5)).unix_timestamp() as usize,
            exp: past.unix_timestamp() as usize,
            kind: TokenKind::Access,
        };
        let token =
            encode(&Header::new(keys.algorithm), &claims, &keys.encoding).expect("encode expired");
        assert!(keys.decode(&token).is_err());
    }

    #[tokio::test]
    async fn decode_accepts_token_before_expiry() {
        let keys = make_keys();
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            sub: "a@x.com".into(),
            user_id: 1,
            iat: now.unix_timestamp() as usize,
            exp: (now + TimeDuration::minutes(1)).unix_timestamp() as usize,
            kind: TokenKind::Access,
        };
        let token =
            encode(&Header::new(keys.algorithm), &claims, &keys.encoding).expect("encode claims");
        assert!(keys.decode(&token).is_ok());
    }
}
