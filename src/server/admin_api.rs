//! `/api/admin/*` and `/api/monitoring`. Every handler takes `AdminPrincipal`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::monitor::MonitorSnapshot;
use crate::repository::{NewUser, UserUpdate};
use crate::types::{AuditRecord, PublicUser, RoleRecord, SystemSettings};

use super::extract::AdminPrincipal;
use super::response::ApiJson;
use super::{blocking, AppState};

#[derive(Debug, Deserialize)]
pub struct BulkDeleteRequest {
    pub ids: Vec<String>,
}

fn role_id(raw: &str) -> AppResult<u32> {
    raw.parse::<u32>()
        .map_err(|_| AppError::user("invalid_role_id", format!("'{}' is not a role id", raw)))
}

// ---- users ----

pub async fn list_users(State(state): State<AppState>, _admin: AdminPrincipal) -> AppResult<Json<Vec<PublicUser>>> {
    let repo = state.repo.clone();
    let users = blocking(move || repo.list_users()).await?;
    Ok(Json(users.iter().map(PublicUser::from).collect()))
}

pub async fn create_user(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    ApiJson(new): ApiJson<NewUser>,
) -> AppResult<(StatusCode, Json<PublicUser>)> {
    let repo = state.repo.clone();
    let created = blocking(move || repo.create_user(new)).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

pub async fn get_user(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    Path(id): Path<String>,
) -> AppResult<Json<PublicUser>> {
    let repo = state.repo.clone();
    Ok(Json(blocking(move || repo.get_user(&id)).await?.into()))
}

pub async fn update_user(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    Path(id): Path<String>,
    ApiJson(upd): ApiJson<UserUpdate>,
) -> AppResult<Json<PublicUser>> {
    let repo = state.repo.clone();
    Ok(Json(blocking(move || repo.update_user(&id, upd)).await?.into()))
}

pub async fn delete_user(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    let repo = state.repo.clone();
    blocking(move || repo.delete_user(&id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn disable_user_two_factor(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    Path(id): Path<String>,
) -> AppResult<Json<PublicUser>> {
    let repo = state.repo.clone();
    Ok(Json(blocking(move || repo.disable_two_factor(&id)).await?.into()))
}

pub async fn bulk_delete_users(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    ApiJson(req): ApiJson<BulkDeleteRequest>,
) -> AppResult<Json<Value>> {
    let repo = state.repo.clone();
    let deleted = blocking(move || repo.bulk_delete_users(&req.ids)).await?;
    Ok(Json(json!({"deleted": deleted})))
}

// ---- roles ----

pub async fn list_roles(State(state): State<AppState>, _admin: AdminPrincipal) -> AppResult<Json<Vec<RoleRecord>>> {
    let repo = state.repo.clone();
    Ok(Json(blocking(move || repo.list_roles()).await?))
}

pub async fn create_role(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    ApiJson(role): ApiJson<RoleRecord>,
) -> AppResult<(StatusCode, Json<RoleRecord>)> {
    let repo = state.repo.clone();
    Ok((StatusCode::CREATED, Json(blocking(move || repo.create_role(role)).await?)))
}

pub async fn get_role(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    Path(id): Path<String>,
) -> AppResult<Json<RoleRecord>> {
    let (repo, id) = (state.repo.clone(), role_id(&id)?);
    Ok(Json(blocking(move || repo.get_role(id)).await?))
}

pub async fn update_role(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    Path(id): Path<String>,
    ApiJson(role): ApiJson<RoleRecord>,
) -> AppResult<Json<RoleRecord>> {
    let (repo, id) = (state.repo.clone(), role_id(&id)?);
    Ok(Json(blocking(move || repo.update_role(id, role)).await?))
}

pub async fn delete_role(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    let (repo, id) = (state.repo.clone(), role_id(&id)?);
    blocking(move || repo.delete_role(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- settings, audit, monitoring ----

pub async fn get_settings(State(state): State<AppState>, _admin: AdminPrincipal) -> Json<SystemSettings> {
    Json((*state.repo.system_settings()).clone())
}

pub async fn replace_settings(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    ApiJson(next): ApiJson<SystemSettings>,
) -> AppResult<Json<SystemSettings>> {
    let repo = state.repo.clone();
    let applied = blocking(move || repo.update_system_settings(next)).await?;
    Ok(Json((*applied).clone()))
}

pub async fn audit_logs(State(state): State<AppState>, _admin: AdminPrincipal) -> AppResult<Json<Vec<AuditRecord>>> {
    let repo = state.repo.clone();
    Ok(Json(blocking(move || repo.audit_log()).await?))
}

pub async fn monitoring(State(state): State<AppState>, _admin: AdminPrincipal) -> Json<MonitorSnapshot> {
    Json(state.monitor.snapshot().await)
}
