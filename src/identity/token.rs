use std::collections::HashMap;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use crate::tprintln;

use crate::error::{AppError, AppResult};

use super::principal::Principal;
use super::resolver::{strip_bearer, IdentityResolver, TokenIssuer};

/// Lifetime of every issued token.
pub const TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    email: String,
    role: String,
    exp: i64,
    iat: i64,
    jti: String,
}

/// HS256 bearer tokens signed with one shared secret, plus a revocation list
/// that lives as long as the process.
pub struct JwtAuthority {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
    // jti -> exp, pruned once the token would have expired anyway
    revoked: RwLock<HashMap<String, i64>>,
}

impl JwtAuthority {
    pub fn new(secret: &str) -> AppResult<Self> {
        Self::with_ttl(secret, Duration::hours(TOKEN_TTL_HOURS))
    }

    pub fn with_ttl(secret: &str, ttl: Duration) -> AppResult<Self> {
        if secret.is_empty() {
            return Err(AppError::internal("missing_secret", "token signing secret must not be empty"));
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
            revoked: RwLock::new(HashMap::new()),
        })
    }

    fn decode_claims(&self, credential: &str) -> AppResult<Claims> {
        let token = strip_bearer(credential)?;
        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map_err(|e| AppError::auth("invalid_token", format!("invalid or expired token: {}", e)))?;
        Ok(data.claims)
    }

    pub fn revoked_count(&self) -> usize { self.revoked.read().len() }
}

impl TokenIssuer for JwtAuthority {
    fn issue(&self, principal: &Principal) -> AppResult<String> {
        let now = Utc::now();
        let claims = Claims {
            email: principal.email.clone(),
            role: principal.role.clone(),
            exp: (now + self.ttl).timestamp(),
            iat: now.timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::internal("token_issue_failed", e.to_string()))
    }

    fn revoke(&self, credential: &str) -> AppResult<()> {
        let claims = self.decode_claims(credential)?;
        let now = Utc::now().timestamp();
        let mut revoked = self.revoked.write();
        revoked.retain(|_, exp| *exp >= now);
        revoked.insert(claims.jti, claims.exp);
        tprintln!("token.revoke email={} active_revocations={}", claims.email, revoked.len());
        Ok(())
    }
}

impl IdentityResolver for JwtAuthority {
    fn resolve(&self, credential: &str) -> AppResult<Principal> {
        let claims = self.decode_claims(credential)?;
        if self.revoked.read().contains_key(&claims.jti) {
            return Err(AppError::auth("token_revoked", "token has been revoked"));
        }
        Ok(Principal { email: claims.email, role: claims.role })
    }
}
