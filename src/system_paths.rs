use std::path::{Path, PathBuf};

/// Centralized helpers for the JSON documents kept under the data root.
/// This keeps locations consistent across the repository, the init seeding and tests.
#[inline]
pub fn users_file(data_root: &Path) -> PathBuf { data_root.join("users.json") }

#[inline]
pub fn roles_file(data_root: &Path) -> PathBuf { data_root.join("roles.json") }

#[inline]
pub fn audit_file(data_root: &Path) -> PathBuf { data_root.join("audit.json") }

#[inline]
pub fn settings_file(data_root: &Path) -> PathBuf { data_root.join("settings.json") }

/// Sibling path a document is staged to before it replaces `target`.
#[inline]
pub fn staging_file(target: &Path) -> PathBuf {
    let mut name = target.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".next");
    target.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_live_under_data_root() {
        let root = Path::new("/srv/nfsgate");
        assert_eq!(users_file(root), root.join("users.json"));
        assert_eq!(roles_file(root), root.join("roles.json"));
        assert_eq!(audit_file(root), root.join("audit.json"));
        assert_eq!(settings_file(root), root.join("settings.json"));
    }

    #[test]
    fn staging_is_a_sibling() {
        let p = Path::new("/srv/nfsgate/roles.json");
        assert_eq!(staging_file(p), Path::new("/srv/nfsgate/roles.json.next"));
    }
}
