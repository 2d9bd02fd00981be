use unicode_normalization::UnicodeNormalization;

use crate::error::{AppError, AppResult};

/// Normalize a UTF-8 string to NFC.
pub fn normalize_nfc(input: &str) -> String {
    input.nfc().collect::<String>()
}

/// Validate a single entry name (folder name, upload filename, rename target):
/// - non-empty after trimming
/// - no '/', '\\' or NUL
/// - not '.' or '..'
/// Returns the NFC-normalized name.
pub fn validate_name(name: &str) -> AppResult<String> {
    if name.trim().is_empty() {
        return Err(AppError::user("invalid_name", "name cannot be empty"));
    }
    if name.chars().any(|c| c == '\u{0000}') {
        return Err(AppError::user("invalid_name", "name cannot contain NUL characters"));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(AppError::user("invalid_name", format!("name '{}' must be a single path segment", name)));
    }
    if name == "." || name == ".." {
        return Err(AppError::user("invalid_name", "'.' and '..' are not allowed as names"));
    }
    Ok(normalize_nfc(name))
}

/// Lexically normalize a caller-supplied virtual path to `/seg/seg`.
/// Empty and '.' segments are dropped; '..' pops, and popping past the root is an error.
pub fn normalize_virtual(path: &str) -> AppResult<String> {
    if path.chars().any(|c| c == '\u{0000}') {
        return Err(AppError::user("invalid_path", "path cannot contain NUL characters"));
    }
    let mut stack: Vec<String> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => continue,
            ".." => {
                if stack.pop().is_none() {
                    return Err(outside_root(path));
                }
            }
            s => stack.push(normalize_nfc(s)),
        }
    }
    Ok(format!("/{}", stack.join("/")))
}

/// Join a normalized virtual directory and a child name.
pub fn join_virtual(parent: &str, name: &str) -> String {
    if parent == "/" || parent.is_empty() {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent.trim_end_matches('/'), name)
    }
}

/// Parent of a normalized virtual path; the root is its own parent.
pub fn parent_virtual(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(i) => &path[..i],
    }
}

pub(crate) fn outside_root(path: &str) -> AppError {
    AppError::user("path_outside_root", format!("path '{}' escapes the shared root", path))
}

pub(crate) fn reserved_path(path: &str) -> AppError {
    AppError::forbidden("path_reserved", format!("path '{}' is reserved by the server", path))
}

#[cfg(test)]
#[path = "tests/paths_tests.rs"]
mod paths_tests;
