use crate::error::{AppError, AppResult};

use super::principal::Principal;

/// Turns a presented credential into a principal. Implementations must reject
/// expired, tampered and revoked credentials with an `Auth` error.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, credential: &str) -> AppResult<Principal>;
}

/// Issues and revokes bearer credentials.
pub trait TokenIssuer: Send + Sync {
    fn issue(&self, principal: &Principal) -> AppResult<String>;
    fn revoke(&self, credential: &str) -> AppResult<()>;
}

/// Accepts either a raw token or an `Authorization` header value.
pub fn strip_bearer(credential: &str) -> AppResult<&str> {
    let c = credential.trim();
    let token = match c.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => c[7..].trim(),
        _ => c,
    };
    if token.is_empty() {
        return Err(AppError::auth("missing_token", "authorization token is required"));
    }
    Ok(token)
}
