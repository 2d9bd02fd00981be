use path_absolutize::Absolutize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

use super::paths::{normalize_virtual, outside_root, reserved_path};

/// A virtual path resolved to a host path inside the sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub host: PathBuf,
    /// Normalized virtual form, e.g. `/docs/a.txt`.
    pub virtual_path: String,
}

impl Resolved {
    pub fn is_root(&self) -> bool { self.virtual_path == "/" }

    /// Last virtual segment; the root is named "/".
    pub fn name(&self) -> String {
        match self.virtual_path.rsplit('/').next() {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => "/".to_string(),
        }
    }
}

/// Confines every caller path to one configured root directory.
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
    canonical_root: PathBuf,
    /// Canonical directories under the root that no caller path may reach.
    hidden: Vec<PathBuf>,
}

impl Sandbox {
    pub fn new<P: AsRef<Path>>(root: P) -> AppResult<Self> {
        let root = normalize_abs_path(root.as_ref())?;
        let meta = fs::metadata(&root)
            .map_err(|e| AppError::not_found("root_not_found", format!("shared root {}: {}", root.display(), e)))?;
        if !meta.is_dir() {
            return Err(AppError::user("root_not_directory", format!("shared root {} is not a directory", root.display())));
        }
        let canonical_root = fs::canonicalize(&root)?;
        Ok(Self { root, canonical_root, hidden: Vec::new() })
    }

    /// Withhold `dir` (and everything below it) from every resolution.
    /// Directories outside the root are already unreachable and are ignored.
    pub fn with_hidden<P: AsRef<Path>>(mut self, dir: P) -> AppResult<Self> {
        let dir = dir.as_ref();
        let real = match fs::canonicalize(dir) {
            Ok(p) => p,
            Err(_) => normalize_abs_path(dir)?,
        };
        if is_prefix_path(&real, &self.canonical_root) && !self.hidden.contains(&real) {
            self.hidden.push(real);
        }
        Ok(self)
    }

    pub fn root(&self) -> &Path { &self.root }

    pub fn hides_anything(&self) -> bool { !self.hidden.is_empty() }

    /// True when `host` is a hidden directory itself; listings leave it out.
    pub fn is_hidden_entry(&self, host: &Path) -> bool {
        if self.hidden.is_empty() {
            return false;
        }
        match real_entry_path(host) {
            Some(entry) => self.hidden.iter().any(|h| *h == entry),
            None => false,
        }
    }

    /// Resolve for operations that act on the target's content (list, stat, stream, upload into).
    /// Symlinks anywhere along the path must stay inside the root.
    pub fn resolve(&self, virtual_path: &str) -> AppResult<Resolved> {
        let resolved = self.resolve_lexical(virtual_path)?;
        self.check_real_containment(&resolved.host, virtual_path)?;
        Ok(resolved)
    }

    /// Resolve for operations that act on the directory entry itself (delete, rename source).
    /// Only the parent is followed, so a symlink leaf is handled as a link.
    pub fn resolve_entry(&self, virtual_path: &str) -> AppResult<Resolved> {
        let resolved = self.resolve_lexical(virtual_path)?;
        match resolved.host.parent() {
            Some(parent) if !resolved.is_root() => self.check_real_containment(parent, virtual_path)?,
            _ => {}
        }
        // the entry must not be, or contain, a hidden directory
        if !self.hidden.is_empty() && !resolved.is_root() {
            if let Some(entry) = real_entry_path(&resolved.host) {
                if self.hidden.iter().any(|h| h.starts_with(&entry)) {
                    return Err(reserved_path(virtual_path));
                }
            }
        }
        Ok(resolved)
    }

    fn resolve_lexical(&self, virtual_path: &str) -> AppResult<Resolved> {
        let v = normalize_virtual(virtual_path)?;
        let joined = self.root.join(v.trim_start_matches('/'));
        let abs = normalize_abs_path(&joined)?;
        if !is_prefix_path(&abs, &self.root) {
            return Err(outside_root(virtual_path));
        }
        Ok(Resolved { host: abs, virtual_path: v })
    }

    // Canonicalize the deepest existing ancestor and require it under the canonical root.
    fn check_real_containment(&self, host: &Path, virtual_path: &str) -> AppResult<()> {
        let mut probe: Option<&Path> = Some(host);
        while let Some(p) = probe {
            match fs::canonicalize(p) {
                Ok(real) => {
                    if !is_prefix_path(&real, &self.canonical_root) {
                        return Err(outside_root(virtual_path));
                    }
                    if self.hidden.iter().any(|h| is_prefix_path(&real, h)) {
                        return Err(reserved_path(virtual_path));
                    }
                    return Ok(());
                }
                Err(_) => {
                    if is_symlink(p) {
                        // dangling link: where it points is not ours to create
                        return Err(outside_root(virtual_path));
                    }
                    probe = p.parent();
                }
            }
        }
        Err(outside_root(virtual_path))
    }
}

/// Normalize a host path to an absolute path without resolving symlinks.
pub fn normalize_abs_path(p: &Path) -> AppResult<PathBuf> {
    let abs = p
        .absolutize()
        .map_err(|e| AppError::internal("path_normalize_failed", format!("{}: {}", p.display(), e)))?;
    Ok(abs.to_path_buf())
}

// Canonical parent joined with the unresolved leaf name.
fn real_entry_path(host: &Path) -> Option<PathBuf> {
    let parent = fs::canonicalize(host.parent()?).ok()?;
    Some(parent.join(host.file_name()?))
}

pub(crate) fn is_symlink(p: &Path) -> bool {
    match fs::symlink_metadata(p) {
        Ok(m) => m.file_type().is_symlink(),
        Err(_) => false,
    }
}

pub(crate) fn is_prefix_path(path: &Path, prefix: &Path) -> bool {
    // Compare component-wise to avoid false positives like /data/x vs /data2
    if cfg!(windows) {
        let pr = path.components().next();
        let rr = prefix.components().next();
        if pr != rr { return false; }
    }
    path.starts_with(prefix)
}

#[cfg(test)]
#[path = "tests/host_path_tests.rs"]
mod host_path_tests;
