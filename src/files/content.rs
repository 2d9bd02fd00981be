//! Streaming and preview of file content, with content-type resolution.

use std::io::SeekFrom;
use std::path::Path;
use std::time::SystemTime;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, Take};

use crate::error::{AppError, AppResult};

use super::range::{resolve_range, ByteRange};

/// Text previews stop after this many bytes.
pub const PREVIEW_TEXT_LIMIT: u64 = 2 * 1024 * 1024;

const TEXT_EXTENSIONS: [&str; 11] = ["txt", "log", "md", "json", "yaml", "yml", "csv", "tsv", "xml", "ini", "conf"];

/// Content type for a file name: fixed overrides, then the extension table, then octet-stream.
pub fn mime_for(name: &str) -> String {
    let ext = Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if TEXT_EXTENSIONS.contains(&ext.as_str()) {
        return "text/plain".to_string();
    }
    if ext == "pdf" {
        return "application/pdf".to_string();
    }
    mime_guess::from_path(name).first_or_octet_stream().essence_str().to_string()
}

pub fn is_text_like(mime: &str) -> bool { mime.starts_with("text/") }

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Inline,
    Attachment,
}

impl Disposition {
    /// `mode=download` asks for an attachment; anything else previews inline.
    pub fn from_mode(mode: Option<&str>) -> Self {
        match mode {
            Some(m) if m.eq_ignore_ascii_case("download") => Disposition::Attachment,
            _ => Disposition::Inline,
        }
    }

    pub fn header_value(&self, filename: &str) -> String {
        let kind = match self {
            Disposition::Inline => "inline",
            Disposition::Attachment => "attachment",
        };
        let ascii: String = filename
            .chars()
            .map(|c| if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' { c } else { '_' })
            .collect();
        format!("{}; filename=\"{}\"; filename*=UTF-8''{}", kind, ascii, urlencoding::encode(filename))
    }
}

/// An opened file ready to be written to a response body.
#[derive(Debug)]
pub struct ServedFile {
    pub name: String,
    pub mime: String,
    /// Size of the served representation: the file size, or the preview window.
    pub total_size: u64,
    pub range: Option<ByteRange>,
    pub content_length: u64,
    pub last_modified: Option<SystemTime>,
    /// True when a preview window cut the file short.
    pub truncated: bool,
    pub reader: Take<File>,
}

impl ServedFile {
    pub fn is_partial(&self) -> bool { self.range.is_some() }

    pub fn content_range(&self) -> Option<String> {
        self.range.map(|r| format!("bytes {}-{}/{}", r.start, r.end, self.total_size))
    }
}

/// Open `host` for streaming. With `preview`, text-like content is capped at
/// `PREVIEW_TEXT_LIMIT` and ranges apply within that window.
pub async fn open_served(host: &Path, name: &str, range_header: Option<&str>, preview: bool) -> AppResult<ServedFile> {
    let meta = tokio::fs::metadata(host).await?;
    if meta.is_dir() {
        return Err(AppError::user("is_a_directory", format!("'{}' is a directory", name)));
    }
    let mime = mime_for(name);
    let file_size = meta.len();
    let window = if preview && is_text_like(&mime) { file_size.min(PREVIEW_TEXT_LIMIT) } else { file_size };

    let range = resolve_range(range_header, window)?;
    let (offset, length) = match range {
        Some(r) => (r.start, r.len()),
        None => (0, window),
    };

    let mut file = File::open(host).await?;
    if offset > 0 {
        file.seek(SeekFrom::Start(offset)).await?;
    }
    tracing::debug!(target: "files", name, offset, length, window, file_size, "serving file");
    Ok(ServedFile {
        name: name.to_string(),
        mime,
        total_size: window,
        range,
        content_length: length,
        last_modified: meta.modified().ok(),
        truncated: window < file_size,
        reader: file.take(length),
    })
}

#[cfg(test)]
#[path = "tests/content_tests.rs"]
mod content_tests;
