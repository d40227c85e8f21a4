use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = String;

/// Read-only copy of the provider-issued token bundle. The provider owns
/// the session lifecycle; the resolver only caches the latest snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub user_id: UserId,
    #[serde(default)]
    pub email: Option<String>,
    pub access_token: String,
    pub issued_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(t) if t <= now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Build a session snapshot from a provider access token whose payload
    /// carries `sub` (user id) and optionally `email`/`exp`. Returns None
    /// when the token has no readable subject.
    pub fn from_access_token(token: &str) -> Option<Session> {
        let claims = decode_jwt_claims(token)?;
        let user_id = claims.sub?;
        Some(Session {
            user_id,
            email: claims.email,
            access_token: token.to_string(),
            issued_at: Utc::now(),
            expires_at: claims.exp.and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
        })
    }
}

/// Session-change notification pushed by the identity provider.
#[derive(Debug, Clone)]
pub enum AuthChange {
    SignedIn(Session),
    SignedOut,
    TokenRefreshed(Session),
}

pub fn gen_token() -> String {
    // 256-bit random token base64url without padding
    let mut buf = [0u8; 32];
    let _ = getrandom::getrandom(&mut buf);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)
}

#[derive(Debug, Clone, Default)]
pub struct JwtClaims {
    pub sub: Option<String>,
    pub email: Option<String>,
    pub exp: Option<i64>,
}

/// Decode the payload segment of a JWT without verifying its signature.
/// Verification is the provider's job; the client only needs the claims to
/// label its cached copy.
pub fn decode_jwt_claims(token: &str) -> Option<JwtClaims> {
    let mut parts = token.split('.');
    let _header = parts.next()?;
    let payload = parts.next()?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload.as_bytes())
        .ok()?;
    let v: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    Some(JwtClaims {
        sub: v.get("sub").and_then(|s| s.as_str()).map(|s| s.to_string()),
        email: v.get("email").and_then(|s| s.as_str()).map(|s| s.to_string()),
        exp: v.get("exp").and_then(|e| e.as_i64()),
    })
}
