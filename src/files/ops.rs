use std::fs::Metadata;
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::types::{FileEntry, SystemSettings};

use super::content::{open_served, ServedFile};
use super::host_path::{Resolved, Sandbox};
use super::paths::{join_virtual, parent_virtual, validate_name};

/// Limits applied to an upload before it replaces anything on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    pub max_bytes: Option<u64>,
    /// Lower-case extensions without dot; empty accepts any.
    pub allowed_extensions: Vec<String>,
}

impl UploadPolicy {
    pub fn unrestricted() -> Self {
        Self { max_bytes: None, allowed_extensions: Vec::new() }
    }

    pub fn from_settings(s: &SystemSettings) -> Self {
        Self { max_bytes: Some(s.max_file_bytes()), allowed_extensions: s.allowed_extensions() }
    }

    pub fn check_name(&self, name: &str) -> AppResult<()> {
        if self.allowed_extensions.is_empty() {
            return Ok(());
        }
        let ext = std::path::Path::new(name)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if self.allowed_extensions.iter().any(|a| a == &ext) {
            Ok(())
        } else {
            Err(AppError::user("file_type_not_allowed", format!("file type of '{}' is not allowed", name)))
        }
    }
}

/// Filesystem operations confined to one sandbox root.
#[derive(Clone)]
pub struct FileGateway {
    sandbox: Arc<Sandbox>,
}

impl FileGateway {
    pub fn new(sandbox: Sandbox) -> Self { Self { sandbox: Arc::new(sandbox) } }

    pub fn sandbox(&self) -> &Sandbox { &self.sandbox }

    /// Children of a directory, sorted by name.
    pub async fn list(&self, path: &str) -> AppResult<Vec<FileEntry>> {
        let dir = self.sandbox.resolve(path)?;
        let meta = fs::metadata(&dir.host).await.map_err(|e| missing_or(e, &dir.virtual_path))?;
        if !meta.is_dir() {
            return Err(AppError::user("not_a_directory", format!("'{}' is not a directory", dir.virtual_path)));
        }
        let mut out = Vec::new();
        let mut rd = fs::read_dir(&dir.host).await?;
        while let Some(ent) = rd.next_entry().await? {
            if self.sandbox.is_hidden_entry(&ent.path()) {
                continue;
            }
            let name = ent.file_name().to_string_lossy().to_string();
            // metadata follows symlinks; a dangling link falls back to the link itself
            let meta = match fs::metadata(ent.path()).await {
                Ok(m) => m,
                Err(_) => match fs::symlink_metadata(ent.path()).await {
                    Ok(m) => m,
                    Err(e) => {
                        warn!(target: "files", "skipping {}: {}", ent.path().display(), e);
                        continue;
                    }
                },
            };
            let vpath = join_virtual(&dir.virtual_path, &name);
            out.push(entry_from_meta(name, vpath, &meta));
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(target: "files", path = %dir.virtual_path, count = out.len(), "listed directory");
        Ok(out)
    }

    pub async fn create_folder(&self, parent: &str, name: &str) -> AppResult<FileEntry> {
        let name = validate_name(name)?;
        let parent = self.sandbox.resolve(parent)?;
        let pmeta = fs::metadata(&parent.host).await.map_err(|e| missing_or(e, &parent.virtual_path))?;
        if !pmeta.is_dir() {
            return Err(AppError::user("not_a_directory", format!("'{}' is not a directory", parent.virtual_path)));
        }
        let target = self.sandbox.resolve(&join_virtual(&parent.virtual_path, &name))?;
        if fs::symlink_metadata(&target.host).await.is_ok() {
            return Err(AppError::conflict("already_exists", format!("'{}' already exists", target.virtual_path)));
        }
        fs::create_dir(&target.host).await?;
        info!(target: "files", path = %target.virtual_path, "folder created");
        self.entry_for(&target).await
    }

    /// Copy `reader` into `dir/filename`, replacing any existing file atomically.
    pub async fn upload<R>(&self, dir: &str, filename: &str, reader: R, policy: &UploadPolicy) -> AppResult<FileEntry>
    where
        R: AsyncRead + Unpin,
    {
        let name = validate_name(filename)?;
        policy.check_name(&name)?;
        let dir = self.sandbox.resolve(dir)?;
        let dmeta = fs::metadata(&dir.host).await.map_err(|e| missing_or(e, &dir.virtual_path))?;
        if !dmeta.is_dir() {
            return Err(AppError::user("not_a_directory", format!("'{}' is not a directory", dir.virtual_path)));
        }
        let target = self.sandbox.resolve(&join_virtual(&dir.virtual_path, &name))?;
        if let Ok(m) = fs::symlink_metadata(&target.host).await {
            if m.is_dir() {
                return Err(AppError::conflict("already_exists", format!("'{}' is a directory", target.virtual_path)));
            }
        }

        // fixed-length name: any name the target accepts must also fit its staging file
        let staging = dir.host.join(format!(".upload-{}.part", uuid::Uuid::new_v4().simple()));
        let copied = match copy_limited(reader, &staging, policy.max_bytes).await {
            Ok(n) => n,
            Err(e) => {
                let _ = fs::remove_file(&staging).await;
                return Err(e);
            }
        };
        if let Err(e) = fs::rename(&staging, &target.host).await {
            let _ = fs::remove_file(&staging).await;
            return Err(e.into());
        }
        info!(target: "files", path = %target.virtual_path, bytes = copied, "file uploaded");
        self.entry_for(&target).await
    }

    /// Rename within the same directory.
    pub async fn rename(&self, path: &str, new_name: &str) -> AppResult<FileEntry> {
        let new_name = validate_name(new_name)?;
        let src = self.sandbox.resolve_entry(path)?;
        if src.is_root() {
            return Err(AppError::user("root_immutable", "the shared root cannot be renamed"));
        }
        fs::symlink_metadata(&src.host).await.map_err(|e| missing_or(e, &src.virtual_path))?;
        let dest = self.sandbox.resolve_entry(&join_virtual(parent_virtual(&src.virtual_path), &new_name))?;
        if dest.host != src.host && fs::symlink_metadata(&dest.host).await.is_ok() {
            return Err(AppError::conflict("already_exists", format!("'{}' already exists", dest.virtual_path)));
        }
        fs::rename(&src.host, &dest.host).await?;
        info!(target: "files", from = %src.virtual_path, to = %dest.virtual_path, "renamed");
        let meta = fs::symlink_metadata(&dest.host).await?;
        Ok(entry_from_meta(dest.name(), dest.virtual_path.clone(), &meta))
    }

    /// Remove a file, a symlink, or a directory tree.
    pub async fn delete(&self, path: &str) -> AppResult<()> {
        let target = self.sandbox.resolve_entry(path)?;
        if target.is_root() {
            return Err(AppError::user("root_immutable", "the shared root cannot be deleted"));
        }
        let meta = fs::symlink_metadata(&target.host).await.map_err(|e| missing_or(e, &target.virtual_path))?;
        if meta.is_dir() {
            fs::remove_dir_all(&target.host).await?;
        } else {
            fs::remove_file(&target.host).await?;
        }
        info!(target: "files", path = %target.virtual_path, dir = meta.is_dir(), "deleted");
        Ok(())
    }

    pub async fn stat(&self, path: &str) -> AppResult<FileEntry> {
        let target = self.sandbox.resolve(path)?;
        self.entry_for(&target).await
    }

    pub async fn stream(&self, path: &str, range_header: Option<&str>) -> AppResult<ServedFile> {
        let target = self.served_target(path).await?;
        open_served(&target.host, &target.name(), range_header, false).await
    }

    pub async fn preview(&self, path: &str, range_header: Option<&str>) -> AppResult<ServedFile> {
        let target = self.served_target(path).await?;
        open_served(&target.host, &target.name(), range_header, true).await
    }

    async fn served_target(&self, path: &str) -> AppResult<Resolved> {
        let target = self.sandbox.resolve(path)?;
        if target.is_root() {
            return Err(AppError::user("is_a_directory", "the shared root is a directory"));
        }
        fs::metadata(&target.host).await.map_err(|e| missing_or(e, &target.virtual_path))?;
        Ok(target)
    }

    async fn entry_for(&self, target: &Resolved) -> AppResult<FileEntry> {
        let meta = fs::metadata(&target.host).await.map_err(|e| missing_or(e, &target.virtual_path))?;
        Ok(entry_from_meta(target.name(), target.virtual_path.clone(), &meta))
    }
}

async fn copy_limited<R>(reader: R, staging: &std::path::Path, max_bytes: Option<u64>) -> AppResult<u64>
where
    R: AsyncRead + Unpin,
{
    let mut out = fs::File::create(staging).await?;
    let copied = match max_bytes {
        Some(limit) => {
            let mut limited = reader.take(limit.saturating_add(1));
            let n = tokio::io::copy(&mut limited, &mut out).await?;
            if n > limit {
                return Err(AppError::user(
                    "file_too_large",
                    format!("upload exceeds the {} byte limit", limit),
                ));
            }
            n
        }
        None => {
            let mut reader = reader;
            tokio::io::copy(&mut reader, &mut out).await?
        }
    };
    out.flush().await?;
    // Best-effort durability before the rename publishes the file
    let _ = out.sync_all().await;
    Ok(copied)
}

fn missing_or(e: std::io::Error, virtual_path: &str) -> AppError {
    if e.kind() == std::io::ErrorKind::NotFound {
        AppError::not_found("path_not_found", format!("'{}' does not exist", virtual_path))
    } else {
        e.into()
    }
}

fn entry_from_meta(name: String, path: String, meta: &Metadata) -> FileEntry {
    let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    FileEntry {
        name,
        path,
        is_dir: meta.is_dir(),
        size: meta.len(),
        last_modified: DateTime::<Utc>::from(modified),
    }
}

#[cfg(test)]
#[path = "tests/ops_tests.rs"]
mod ops_tests;
