use serde::{Deserialize, Serialize};

/// Role name that unlocks the administrative surface.
pub const ADMIN_ROLE: &str = "admin";

/// Who a verified bearer credential belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    pub email: String,
    pub role: String,
}

impl Principal {
    pub fn new(email: impl Into<String>, role: impl Into<String>) -> Self {
        Self { email: email.into(), role: role.into() }
    }

    pub fn is_admin(&self) -> bool { self.role == ADMIN_ROLE }
}
