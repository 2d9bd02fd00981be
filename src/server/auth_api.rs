//! Login, registration and self-service account routes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::{LoginOutcome, TwoFactorEnrollment};
use crate::error::AppResult;
use crate::types::PublicUser;

use super::extract::BearerCredential;
use super::response::ApiJson;
use super::{blocking, AppState};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub name: Option<String>,
}

/// Any `secret` sent alongside is ignored; the stored secret is authoritative.
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    #[serde(alias = "code")]
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(rename = "oldPassword")]
    pub old_password: String,
    #[serde(rename = "newPassword")]
    pub new_password: String,
}

pub async fn login(State(state): State<AppState>, ApiJson(req): ApiJson<LoginRequest>) -> AppResult<Json<LoginOutcome>> {
    let auth = state.auth.clone();
    Ok(Json(blocking(move || auth.login(&req.email, &req.password)).await?))
}

pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<PublicUser>)> {
    let auth = state.auth.clone();
    let created = blocking(move || auth.register(&req.email, &req.password, req.name)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn profile(State(state): State<AppState>, BearerCredential(cred): BearerCredential) -> AppResult<Json<PublicUser>> {
    let auth = state.auth.clone();
    Ok(Json(blocking(move || auth.profile(&cred)).await?))
}

pub async fn update_profile(
    State(state): State<AppState>,
    BearerCredential(cred): BearerCredential,
    ApiJson(req): ApiJson<ProfileUpdate>,
) -> AppResult<Json<PublicUser>> {
    let auth = state.auth.clone();
    Ok(Json(blocking(move || auth.update_profile(&cred, req.name)).await?))
}

pub async fn generate_two_factor(
    State(state): State<AppState>,
    BearerCredential(cred): BearerCredential,
) -> AppResult<Json<TwoFactorEnrollment>> {
    let auth = state.auth.clone();
    Ok(Json(blocking(move || auth.generate_two_factor(&cred)).await?))
}

pub async fn verify_two_factor(
    State(state): State<AppState>,
    BearerCredential(cred): BearerCredential,
    ApiJson(req): ApiJson<VerifyRequest>,
) -> AppResult<Json<Value>> {
    let auth = state.auth.clone();
    blocking(move || auth.verify_two_factor(&cred, &req.token)).await?;
    Ok(Json(json!({"status": "ok"})))
}

pub async fn disable_two_factor(State(state): State<AppState>, BearerCredential(cred): BearerCredential) -> AppResult<Json<Value>> {
    let auth = state.auth.clone();
    blocking(move || auth.disable_two_factor(&cred)).await?;
    Ok(Json(json!({"message": "2FA disabled"})))
}

pub async fn logout(State(state): State<AppState>, BearerCredential(cred): BearerCredential) -> AppResult<Json<Value>> {
    let auth = state.auth.clone();
    blocking(move || auth.logout(&cred)).await?;
    Ok(Json(json!({"message": "Logged out"})))
}

pub async fn change_password(
    State(state): State<AppState>,
    BearerCredential(cred): BearerCredential,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> AppResult<Json<Value>> {
    let auth = state.auth.clone();
    blocking(move || auth.change_password(&cred, &req.old_password, &req.new_password)).await?;
    Ok(Json(json!({"message": "Password changed"})))
}
