use crate::error::{AppError, AppResult};
use crate::storage::Document;
use crate::types::RoleRecord;

use super::Repository;

impl Document for RoleRecord {
    type Id = u32;
    const KIND: &'static str = "role";
    fn id(&self) -> u32 { self.id }
}

fn validate(role: &RoleRecord) -> AppResult<()> {
    if role.id == 0 {
        return Err(AppError::user("invalid_role", "role id must be a positive integer"));
    }
    if role.name.trim().is_empty() {
        return Err(AppError::user("invalid_role", "role name is required"));
    }
    Ok(())
}

impl Repository {
    pub fn list_roles(&self) -> AppResult<Vec<RoleRecord>> { self.roles.list() }

    pub fn get_role(&self, id: u32) -> AppResult<RoleRecord> { self.roles.get(&id) }

    pub fn create_role(&self, role: RoleRecord) -> AppResult<RoleRecord> {
        validate(&role)?;
        let created = self.roles.insert(role)?;
        self.emit("create_role", created.id.to_string(), format!("Created role {}", created.name));
        Ok(created)
    }

    /// Users keep the role snapshot they were assigned; this does not touch them.
    pub fn update_role(&self, id: u32, mut role: RoleRecord) -> AppResult<RoleRecord> {
        role.id = id;
        validate(&role)?;
        let updated = self.roles.replace(role)?;
        self.emit("update_role", updated.id.to_string(), format!("Updated role {}", updated.name));
        Ok(updated)
    }

    pub fn delete_role(&self, id: u32) -> AppResult<RoleRecord> {
        let removed = self.roles.remove(&id)?;
        self.emit("delete_role", id.to_string(), format!("Deleted role {}", id));
        Ok(removed)
    }
}
