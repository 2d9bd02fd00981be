//! `/api/files/*` handlers. Every route requires a bearer token.

use std::io;
use std::path::PathBuf;

use axum::extract::{Multipart, Query, State};
use axum::http::header::RANGE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::Json;
use futures_util::TryStreamExt;
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::StreamReader;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::files::{Disposition, UploadPolicy};
use crate::types::FileEntry;

use super::extract::Authenticated;
use super::response::{served, ApiJson};
use super::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct PathQuery {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
}

impl PathQuery {
    fn required_path(&self) -> AppResult<&str> {
        self.path
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AppError::user("missing_path", "query parameter 'path' is required"))
    }
}

#[derive(Debug, Deserialize)]
pub struct FolderRequest {
    pub path: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub path: String,
    #[serde(rename = "newName")]
    pub new_name: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    pub path: String,
}

fn range_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(RANGE).and_then(|v| v.to_str().ok())
}

pub async fn list(
    State(state): State<AppState>,
    _who: Authenticated,
    Query(q): Query<PathQuery>,
) -> AppResult<Json<Vec<FileEntry>>> {
    let path = q.path.as_deref().filter(|p| !p.is_empty()).unwrap_or("/");
    Ok(Json(state.files.list(path).await?))
}

pub async fn create_folder(
    State(state): State<AppState>,
    _who: Authenticated,
    ApiJson(req): ApiJson<FolderRequest>,
) -> AppResult<(StatusCode, Json<FileEntry>)> {
    let entry = state.files.create_folder(&req.path, &req.name).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

fn bad_multipart(e: axum::extract::multipart::MultipartError) -> AppError {
    AppError::user("invalid_multipart", e.body_text())
}

/// Multipart upload. The target directory comes from `?path=` or a `path`
/// field; a `file` part that arrives before `path` is spooled to a temp file.
pub async fn upload(
    State(state): State<AppState>,
    _who: Authenticated,
    Query(q): Query<PathQuery>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<FileEntry>)> {
    let policy = UploadPolicy::from_settings(&state.repo.system_settings());
    let mut dir = q.path.filter(|p| !p.is_empty());
    let mut spooled: Option<(String, Spool)> = None;
    let mut uploaded: Option<FileEntry> = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("path") => {
                let value = field.text().await.map_err(bad_multipart)?;
                if dir.is_none() && !value.is_empty() {
                    dir = Some(value);
                }
            }
            Some("file") => {
                if uploaded.is_some() || spooled.is_some() {
                    return Err(AppError::user("multiple_files", "only one file per upload"));
                }
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| AppError::user("missing_filename", "file part has no filename"))?;
                let reader = StreamReader::new(Box::pin(field.map_err(io::Error::other)));
                match dir.as_deref() {
                    Some(d) => uploaded = Some(state.files.upload(d, &filename, reader, &policy).await?),
                    None => {
                        policy.check_name(&filename)?;
                        spooled = Some((filename, Spool::fill(reader, policy.max_bytes).await?));
                    }
                }
            }
            other => debug!(target: "files", field = ?other, "ignoring multipart field"),
        }
    }

    if let Some(entry) = uploaded {
        return Ok((StatusCode::CREATED, Json(entry)));
    }
    let (filename, spool) = spooled.ok_or_else(|| AppError::user("missing_file", "multipart field 'file' is required"))?;
    let dir = dir.ok_or_else(|| AppError::user("missing_path", "target 'path' is required"))?;
    let file = tokio::fs::File::open(&spool.path).await?;
    let entry = state.files.upload(&dir, &filename, file, &policy).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// Temp file holding an upload body until its target is known; removed on drop.
struct Spool {
    path: PathBuf,
}

impl Spool {
    async fn fill<R: AsyncRead + Unpin>(reader: R, max_bytes: Option<u64>) -> AppResult<Self> {
        let spool = Spool { path: std::env::temp_dir().join(format!("nfsgate-spool-{}", uuid::Uuid::new_v4().simple())) };
        let mut file = tokio::fs::File::create(&spool.path).await?;
        let copied = match max_bytes {
            Some(max) => tokio::io::copy(&mut reader.take(max.saturating_add(1)), &mut file).await?,
            None => {
                let mut reader = reader;
                tokio::io::copy(&mut reader, &mut file).await?
            }
        };
        if let Some(max) = max_bytes {
            if copied > max {
                return Err(AppError::user("file_too_large", format!("upload exceeds the {} byte limit", max)));
            }
        }
        file.sync_all().await?;
        Ok(spool)
    }
}

impl Drop for Spool {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

pub async fn rename(
    State(state): State<AppState>,
    _who: Authenticated,
    ApiJson(req): ApiJson<RenameRequest>,
) -> AppResult<Json<FileEntry>> {
    Ok(Json(state.files.rename(&req.path, &req.new_name).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    _who: Authenticated,
    ApiJson(req): ApiJson<DeleteRequest>,
) -> AppResult<StatusCode> {
    state.files.delete(&req.path).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn info(
    State(state): State<AppState>,
    _who: Authenticated,
    Query(q): Query<PathQuery>,
) -> AppResult<Json<FileEntry>> {
    Ok(Json(state.files.stat(q.required_path()?).await?))
}

pub async fn stream(
    State(state): State<AppState>,
    _who: Authenticated,
    Query(q): Query<PathQuery>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let file = state.files.stream(q.required_path()?, range_header(&headers)).await?;
    Ok(served(file, Disposition::Inline))
}

pub async fn download(
    State(state): State<AppState>,
    _who: Authenticated,
    Query(q): Query<PathQuery>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let file = state.files.stream(q.required_path()?, range_header(&headers)).await?;
    Ok(served(file, Disposition::from_mode(q.mode.as_deref())))
}

pub async fn preview(
    State(state): State<AppState>,
    _who: Authenticated,
    Query(q): Query<PathQuery>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let file = state.files.preview(q.required_path()?, range_header(&headers)).await?;
    Ok(served(file, Disposition::Inline))
}
