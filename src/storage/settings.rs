use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::types::SystemSettings;

use super::atomic::write_atomic;

/// Process-wide system settings. Readers share one `Arc` snapshot.
pub struct SettingsStore {
    path: PathBuf,
    current: RwLock<Arc<SystemSettings>>,
}

impl SettingsStore {
    /// Read `settings.json` when present, defaults otherwise.
    pub fn open<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();
        let settings = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| AppError::storage("storage_read_failed", format!("read {}: {}", path.display(), e)))?;
            serde_json::from_str::<SystemSettings>(&raw)
                .map_err(|e| AppError::storage("storage_decode_failed", format!("decode {}: {}", path.display(), e)))?
        } else {
            SystemSettings::default()
        };
        Ok(Self { path, current: RwLock::new(Arc::new(settings)) })
    }

    /// In-memory only; used by tests and tools that never persist.
    pub fn in_memory(settings: SystemSettings) -> Self {
        Self { path: PathBuf::new(), current: RwLock::new(Arc::new(settings)) }
    }

    pub fn get(&self) -> Arc<SystemSettings> {
        Arc::clone(&self.current.read())
    }

    pub fn replace(&self, next: SystemSettings) -> AppResult<Arc<SystemSettings>> {
        validate(&next)?;
        let mut slot = self.current.write();
        if !self.path.as_os_str().is_empty() {
            let body = serde_json::to_vec_pretty(&next)
                .map_err(|e| AppError::storage("storage_encode_failed", e.to_string()))?;
            write_atomic(&self.path, &body)
                .map_err(|e| AppError::storage("storage_write_failed", format!("write {}: {}", self.path.display(), e)))?;
        }
        let next = Arc::new(next);
        *slot = Arc::clone(&next);
        info!(target: "settings", audit = next.enable_audit_log, max_file_size = next.max_file_size, "system settings replaced");
        Ok(next)
    }
}

fn validate(s: &SystemSettings) -> AppResult<()> {
    if s.max_file_size == 0 {
        return Err(AppError::user("invalid_settings", "max_file_size must be greater than zero"));
    }
    if s.session_timeout == 0 {
        return Err(AppError::user("invalid_settings", "session_timeout must be greater than zero"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_file_absent() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SettingsStore::open(tmp.path().join("settings.json")).unwrap();
        assert_eq!(*store.get(), SystemSettings::default());
    }

    #[test]
    fn replace_persists_and_reopens() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("settings.json");
        let store = SettingsStore::open(&p).unwrap();
        let before = store.get();

        let mut next = SystemSettings::default();
        next.enable_audit_log = false;
        next.max_file_size = 7;
        store.replace(next.clone()).unwrap();

        // earlier snapshots are unaffected
        assert!(before.enable_audit_log);
        assert!(!store.get().enable_audit_log);

        let reopened = SettingsStore::open(&p).unwrap();
        assert_eq!(*reopened.get(), next);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let store = SettingsStore::in_memory(SystemSettings::default());
        let mut bad = SystemSettings::default();
        bad.max_file_size = 0;
        assert_eq!(store.replace(bad).unwrap_err().http_status(), 400);
        assert_eq!(store.get().max_file_size, 100);
    }

    #[test]
    fn malformed_file_fails_open() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("settings.json");
        std::fs::write(&p, "[]").unwrap();
        assert!(SettingsStore::open(&p).is_err());
    }
}
