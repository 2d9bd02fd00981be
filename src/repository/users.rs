use serde::Deserialize;
use tracing::warn;

use crate::error::{AppError, AppResult};
use crate::identity::password::{hash_password, verify_password};
use crate::storage::Document;
use crate::types::{RoleRecord, UserRecord};

use super::Repository;

impl Document for UserRecord {
    type Id = String;
    const KIND: &'static str = "user";

    fn id(&self) -> String { self.id.clone() }

    fn conflict_with(&self, other: &Self) -> Option<AppError> {
        if self.id == other.id {
            return Some(AppError::conflict("user_exists", format!("user {} already exists", self.id)));
        }
        if self.email == other.email {
            return Some(AppError::conflict("email_taken", format!("email {} is already registered", self.email)));
        }
        None
    }
}

/// Role reference accepted in request bodies; only the id is used.
#[derive(Debug, Clone, Deserialize)]
pub struct RoleRef {
    pub id: u32,
}

/// Admin-side user creation payload.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    #[serde(default)]
    pub id: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "roleId", default)]
    pub role_id: Option<u32>,
    #[serde(default)]
    pub role: Option<RoleRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    #[serde(default)]
    pub email: Option<String>,
    /// Empty keeps the current secret.
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "roleId", default)]
    pub role_id: Option<u32>,
    #[serde(default)]
    pub role: Option<RoleRef>,
}

fn role_id_of(role_id: Option<u32>, role: &Option<RoleRef>) -> Option<u32> {
    role_id.or_else(|| role.as_ref().map(|r| r.id))
}

fn user_not_found_by_email(email: &str) -> AppError {
    AppError::not_found("user_not_found", format!("no user with email {}", email))
}

impl Repository {
    // ---- admin CRUD ----

    pub fn list_users(&self) -> AppResult<Vec<UserRecord>> { self.users.list() }

    pub fn get_user(&self, id: &str) -> AppResult<UserRecord> { self.users.get(&id.to_string()) }

    pub fn create_user(&self, new: NewUser) -> AppResult<UserRecord> {
        let email = new.email.trim().to_string();
        if email.is_empty() {
            return Err(AppError::user("invalid_user", "email is required"));
        }
        if new.password.is_empty() {
            return Err(AppError::user("invalid_user", "password is required"));
        }
        let role = self.resolve_role(role_id_of(new.role_id, &new.role))?;
        let id = if new.id.trim().is_empty() { uuid::Uuid::new_v4().to_string() } else { new.id.trim().to_string() };
        let record = UserRecord {
            id,
            email,
            password: hash_password(&new.password)?,
            name: new.name.filter(|n| !n.trim().is_empty()),
            role,
            two_fa_secret: None,
            two_factor_enabled: false,
        };
        let created = self.users.insert(record)?;
        self.emit("create_user", created.id.clone(), format!("Created user {}", created.email));
        Ok(created)
    }

    pub fn update_user(&self, id: &str, upd: UserUpdate) -> AppResult<UserRecord> {
        let role = match role_id_of(upd.role_id, &upd.role) {
            Some(rid) => Some(self.resolve_role(Some(rid))?),
            None => None,
        };
        let new_hash = match upd.password.as_deref() {
            Some(p) if !p.is_empty() => Some(hash_password(p)?),
            _ => None,
        };
        let updated = self.users.update(&id.to_string(), |u| {
            if let Some(email) = upd.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
                u.email = email.to_string();
            }
            if let Some(h) = new_hash {
                u.password = h;
            }
            if let Some(name) = upd.name {
                u.name = Some(name).filter(|n| !n.trim().is_empty());
            }
            if let Some(r) = role {
                u.role = r;
            }
            Ok(())
        })?;
        self.emit("update_user", updated.id.clone(), format!("Updated user {}", updated.email));
        Ok(updated)
    }

    pub fn delete_user(&self, id: &str) -> AppResult<UserRecord> {
        let removed = self.users.remove(&id.to_string())?;
        self.emit("delete_user", removed.id.clone(), format!("Deleted user {}", removed.email));
        Ok(removed)
    }

    /// Remove every listed user that exists; unknown ids are ignored.
    pub fn bulk_delete_users(&self, ids: &[String]) -> AppResult<usize> {
        let removed = self.users.remove_many(ids)?;
        for u in &removed {
            self.emit("bulk_delete_user", u.id.clone(), format!("Bulk deleted user {}", u.email));
        }
        Ok(removed.len())
    }

    pub fn disable_two_factor(&self, id: &str) -> AppResult<UserRecord> {
        let updated = self.users.update(&id.to_string(), |u| {
            u.two_fa_secret = None;
            u.two_factor_enabled = false;
            Ok(())
        })?;
        self.emit("disable_2fa", updated.id.clone(), format!("Disabled 2FA for user {}", updated.email));
        Ok(updated)
    }

    // ---- account self-service ----

    pub fn find_user_by_email(&self, email: &str) -> AppResult<Option<UserRecord>> {
        self.users.find(|u| u.email == email)
    }

    pub fn user_by_email(&self, email: &str) -> AppResult<UserRecord> {
        self.find_user_by_email(email)?.ok_or_else(|| user_not_found_by_email(email))
    }

    pub fn register_user(&self, email: &str, password: &str, name: Option<String>) -> AppResult<UserRecord> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(AppError::user("invalid_registration", "email and password are required"));
        }
        let default_role = match self.roles.find(|r| r.name == "user") {
            Ok(r) => r,
            Err(e) => {
                warn!(target: "repository", "registering without a role: {}", e);
                None
            }
        };
        let record = UserRecord {
            id: uuid::Uuid::new_v4().to_string(),
            email: email.to_string(),
            password: hash_password(password)?,
            name: name.filter(|n| !n.trim().is_empty()),
            role: default_role,
            two_fa_secret: None,
            two_factor_enabled: false,
        };
        let created = self.users.insert(record)?;
        self.emit("register_user", created.id.clone(), format!("Registered user {}", created.email));
        Ok(created)
    }

    pub fn change_password(&self, email: &str, old: &str, new: &str) -> AppResult<()> {
        if new.is_empty() {
            return Err(AppError::user("invalid_password", "new password is required"));
        }
        let current = self.user_by_email(email)?;
        let new_hash = hash_password(new)?;
        let updated = self.users.update(&current.id, |u| {
            if !verify_password(&u.password, old) {
                return Err(AppError::auth("wrong_password", "Old password incorrect"));
            }
            u.password = new_hash;
            Ok(())
        })?;
        self.emit("change_password", updated.id.clone(), format!("Changed password for user {}", updated.email));
        Ok(())
    }

    pub fn update_profile(&self, email: &str, name: Option<String>) -> AppResult<UserRecord> {
        let current = self.user_by_email(email)?;
        let updated = self.users.update(&current.id, |u| {
            u.name = name.filter(|n| !n.trim().is_empty());
            Ok(())
        })?;
        self.emit("update_profile", updated.id.clone(), format!("Updated profile of user {}", updated.email));
        Ok(updated)
    }

    /// Store a pending second-factor secret; 2FA stays off until verified.
    pub fn store_two_factor_secret(&self, email: &str, secret: &str) -> AppResult<UserRecord> {
        let current = self.user_by_email(email)?;
        let updated = self.users.update(&current.id, |u| {
            u.two_fa_secret = Some(secret.to_string());
            u.two_factor_enabled = false;
            Ok(())
        })?;
        self.emit("generate_2fa_secret", updated.id.clone(), format!("Generated 2FA secret for user {}", updated.email));
        Ok(updated)
    }

    pub fn enable_two_factor(&self, email: &str) -> AppResult<UserRecord> {
        let current = self.user_by_email(email)?;
        let updated = self.users.update(&current.id, |u| {
            if u.two_fa_secret.is_none() {
                return Err(AppError::user("two_factor_not_initialized", "generate a 2FA secret first"));
            }
            u.two_factor_enabled = true;
            Ok(())
        })?;
        self.emit("enable_2fa", updated.id.clone(), format!("Enabled 2FA for user {}", updated.email));
        Ok(updated)
    }

    pub fn disable_own_two_factor(&self, email: &str) -> AppResult<UserRecord> {
        let current = self.user_by_email(email)?;
        self.disable_two_factor(&current.id)
    }

    fn resolve_role(&self, role_id: Option<u32>) -> AppResult<Option<RoleRecord>> {
        match role_id {
            Some(rid) => self.get_role(rid).map(Some),
            None => Ok(None),
        }
    }
}
