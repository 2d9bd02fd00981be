use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::identity::Principal;

use super::{blocking, AppState};

/// Raw `Authorization` header value. Missing header is 401.
pub struct BearerCredential(pub String);

impl<S: Send + Sync> FromRequestParts<S> for BearerCredential {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or_else(|| AppError::auth("missing_token", "missing bearer token"))?;
        let value = value
            .to_str()
            .map_err(|_| AppError::auth("invalid_token", "authorization header is not valid text"))?;
        Ok(BearerCredential(value.to_string()))
    }
}

/// Any caller holding a valid, unrevoked token whose account still exists.
/// The role is read from the stored account, so demotions apply at once.
pub struct Authenticated(pub Principal);

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let BearerCredential(credential) = BearerCredential::from_request_parts(parts, state).await?;
        let auth = state.auth.clone();
        Ok(Authenticated(blocking(move || auth.current_principal(&credential)).await?))
    }
}

/// An `Authenticated` caller whose stored role is `admin`; other roles get 403.
pub struct AdminPrincipal(pub Principal);

impl FromRequestParts<AppState> for AdminPrincipal {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Authenticated(principal) = Authenticated::from_request_parts(parts, state).await?;
        if !principal.is_admin() {
            return Err(AppError::forbidden("admin_required", "administrator role required"));
        }
        Ok(AdminPrincipal(principal))
    }
}
