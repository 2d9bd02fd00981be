//! Single byte-range parsing for `Range: bytes=...` request headers.

use thiserror::Error;

use crate::error::{AppError, AppResult};

/// Inclusive byte span `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 { self.end - self.start + 1 }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RangeParseError {
    #[error("malformed range header")]
    Malformed,
    #[error("multiple ranges are not supported")]
    MultiRange,
    #[error("range not satisfiable for {0} bytes")]
    Unsatisfiable(u64),
}

/// Parse `bytes=a-b`, `bytes=a-` or `bytes=-n` against a representation of `size` bytes.
/// An end past the last byte is clamped.
pub fn parse_range(header: &str, size: u64) -> Result<ByteRange, RangeParseError> {
    let Some(spec) = header.trim().strip_prefix("bytes=") else {
        return Err(RangeParseError::Malformed);
    };
    if spec.contains(',') {
        return Err(RangeParseError::MultiRange);
    }
    let Some((start_part, end_part)) = spec.split_once('-') else {
        return Err(RangeParseError::Malformed);
    };
    let (start_part, end_part) = (start_part.trim(), end_part.trim());

    if start_part.is_empty() {
        let suffix: u64 = end_part.parse().map_err(|_| RangeParseError::Malformed)?;
        if suffix == 0 || size == 0 {
            return Err(RangeParseError::Unsatisfiable(size));
        }
        return Ok(ByteRange { start: size.saturating_sub(suffix), end: size - 1 });
    }

    let start: u64 = start_part.parse().map_err(|_| RangeParseError::Malformed)?;
    let end: Option<u64> = if end_part.is_empty() {
        None
    } else {
        Some(end_part.parse().map_err(|_| RangeParseError::Malformed)?)
    };
    if let Some(e) = end {
        if e < start {
            return Err(RangeParseError::Malformed);
        }
    }
    if start >= size {
        return Err(RangeParseError::Unsatisfiable(size));
    }
    let last = size - 1;
    Ok(ByteRange { start, end: end.map(|e| e.min(last)).unwrap_or(last) })
}

/// Header-level policy: no header or an ignorable header means the full body;
/// an unsatisfiable range is a 416.
pub fn resolve_range(header: Option<&str>, size: u64) -> AppResult<Option<ByteRange>> {
    let Some(h) = header else { return Ok(None) };
    match parse_range(h, size) {
        Ok(r) => Ok(Some(r)),
        Err(RangeParseError::Malformed) | Err(RangeParseError::MultiRange) => {
            tracing::debug!(target: "files", header = h, "ignoring unsupported range header");
            Ok(None)
        }
        Err(RangeParseError::Unsatisfiable(n)) => Err(AppError::range_not_satisfiable(n)),
    }
}

#[cfg(test)]
#[path = "tests/range_tests.rs"]
mod range_tests;
