//! Repository facade over the users, roles and audit documents plus system settings.
//!
//! Every successful mutation appends exactly one audit record (bulk deletes: one per
//! removed user) after the owning store has been saved and unlocked. Nothing is
//! appended while `enable_audit_log` is off.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::error::AppResult;
use crate::identity::{password, ADMIN_ROLE};
use crate::storage::{DocumentStore, SettingsStore};
use crate::system_paths::{audit_file, roles_file, settings_file, users_file};
use crate::types::{AuditRecord, RoleRecord, SystemSettings, UserRecord};

mod audit;
mod roles;
mod users;

pub use audit::AuditTrail;
pub use users::{NewUser, RoleRef, UserUpdate};

pub const DEFAULT_ADMIN_EMAIL: &str = "admin@localhost";

pub struct Repository {
    data_dir: PathBuf,
    users: DocumentStore<UserRecord>,
    roles: DocumentStore<RoleRecord>,
    audit: AuditTrail,
    settings: SettingsStore,
}

impl Repository {
    /// Open all documents under `data_dir`. The user document is loaded once here
    /// and a failure aborts; the role document is only touched per call.
    pub fn open<P: AsRef<Path>>(data_dir: P) -> AppResult<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        let users = DocumentStore::new(users_file(&data_dir));
        let loaded = users.load()?;
        let audit = AuditTrail::open(&audit_file(&data_dir))?;
        let settings = SettingsStore::open(settings_file(&data_dir))?;
        info!(
            target: "repository",
            users = loaded.len(),
            audit = settings.get().enable_audit_log,
            "documents opened under {}", data_dir.display()
        );
        Ok(Self {
            users,
            roles: DocumentStore::new(roles_file(&data_dir)),
            audit,
            settings,
            data_dir,
        })
    }

    pub fn data_dir(&self) -> &Path { &self.data_dir }

    pub fn system_settings(&self) -> Arc<SystemSettings> { self.settings.get() }

    pub fn update_system_settings(&self, next: SystemSettings) -> AppResult<Arc<SystemSettings>> {
        let was_enabled = self.settings.get().enable_audit_log;
        let applied = self.settings.replace(next)?;
        // a toggle-off is still recorded, using the setting in force before the change
        if was_enabled || applied.enable_audit_log {
            self.audit.append(AuditRecord::new(
                "update_settings",
                "system",
                format!("Updated system settings (audit log {})", if applied.enable_audit_log { "on" } else { "off" }),
            ));
        }
        Ok(applied)
    }

    pub fn audit_log(&self) -> AppResult<Vec<AuditRecord>> { self.audit.all() }

    fn emit(&self, action: &str, subject: impl Into<String>, details: impl Into<String>) {
        if !self.settings.get().enable_audit_log {
            return;
        }
        self.audit.append(AuditRecord::new(action, subject, details));
    }
}

/// What `initialize` created.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub users: bool,
    pub roles: bool,
    pub audit: bool,
}

/// Seed missing documents: an admin account, the `admin` and `user` roles and an
/// empty audit trail. Existing documents are never touched.
pub fn initialize(data_dir: &Path, admin_email: &str, admin_password: &str) -> AppResult<SeedReport> {
    std::fs::create_dir_all(data_dir)?;
    let mut report = SeedReport::default();

    let admin_role = RoleRecord { id: 1, name: ADMIN_ROLE.to_string(), permissions: vec!["*".to_string()] };
    let user_role = RoleRecord {
        id: 2,
        name: "user".to_string(),
        permissions: vec!["files:read".to_string(), "files:write".to_string()],
    };

    let roles_path = roles_file(data_dir);
    if !roles_path.exists() {
        DocumentStore::<RoleRecord>::new(&roles_path).save(&[admin_role.clone(), user_role])?;
        report.roles = true;
    }

    let users_path = users_file(data_dir);
    if !users_path.exists() {
        let admin = UserRecord {
            id: uuid::Uuid::new_v4().to_string(),
            email: admin_email.to_string(),
            password: password::hash_password(admin_password)?,
            name: Some("Administrator".to_string()),
            role: Some(admin_role),
            two_fa_secret: None,
            two_factor_enabled: false,
        };
        DocumentStore::<UserRecord>::new(&users_path).save(&[admin])?;
        report.users = true;
    }

    let audit_path = audit_file(data_dir);
    if !audit_path.exists() {
        DocumentStore::<AuditRecord>::new(&audit_path).ensure_exists()?;
        report.audit = true;
    }

    info!(target: "repository", users = report.users, roles = report.roles, audit = report.audit, "seeded {}", data_dir.display());
    Ok(report)
}
