//! Data contracts shared by the file gateway, the document stores and the HTTP layer.
//! Field names on the wire follow the JSON documents already in use by the dashboard.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One filesystem entry as seen through the gateway. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileEntry {
    pub name: String,
    /// Virtual path, always rooted at `/` inside the sandbox.
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    #[serde(rename = "lastModified")]
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleRecord {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    /// Argon2 PHC string.
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Snapshot of the role at assignment time; later role edits do not propagate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<RoleRecord>,
    #[serde(rename = "twoFASecret", default, skip_serializing_if = "Option::is_none")]
    pub two_fa_secret: Option<String>,
    #[serde(rename = "twoFactorEnabled", default)]
    pub two_factor_enabled: bool,
}

impl UserRecord {
    pub fn role_name(&self) -> &str {
        self.role.as_ref().map(|r| r.name.as_str()).unwrap_or("user")
    }
}

/// Outward view of a user: no password hash, no second-factor secret.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublicUser {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<RoleRecord>,
    #[serde(rename = "twoFactorEnabled")]
    pub two_factor_enabled: bool,
}

impl From<&UserRecord> for PublicUser {
    fn from(u: &UserRecord) -> Self {
        Self {
            id: u.id.clone(),
            email: u.email.clone(),
            name: u.name.clone(),
            role: u.role.clone(),
            two_factor_enabled: u.two_factor_enabled,
        }
    }
}

impl From<UserRecord> for PublicUser {
    fn from(u: UserRecord) -> Self {
        Self {
            id: u.id,
            email: u.email,
            name: u.name,
            role: u.role,
            two_factor_enabled: u.two_factor_enabled,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
    pub id: String,
    pub action: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub details: String,
}

impl AuditRecord {
    pub fn new(action: &str, subject_id: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            action: action.to_string(),
            user_id: subject_id.into(),
            timestamp: Utc::now(),
            details: details.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemSettings {
    /// MiB
    pub max_file_size: u64,
    /// Comma separated extensions, e.g. ".jpg,.png"
    pub allowed_file_types: String,
    /// GiB, informational
    pub max_storage_per_user: u64,
    pub enable_audit_log: bool,
    /// Minutes, informational
    pub session_timeout: u64,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            max_file_size: 100,
            allowed_file_types: ".jpg,.png,.pdf,.doc,.docx".to_string(),
            max_storage_per_user: 5,
            enable_audit_log: true,
            session_timeout: 30,
        }
    }
}

impl SystemSettings {
    /// Lower-cased extensions without the leading dot; empty means "anything".
    pub fn allowed_extensions(&self) -> Vec<String> {
        self.allowed_file_types
            .split(',')
            .map(|s| s.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_size.saturating_mul(1024 * 1024)
    }
}
