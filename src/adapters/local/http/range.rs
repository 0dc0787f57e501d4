//! Single `Range: bytes=` header handling.

use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// No usable range; send the whole body.
    Full,
    /// Inclusive byte bounds.
    Partial { start: u64, end: u64 },
    Unsatisfiable,
}

fn range_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^bytes=(\d*)-(\d*)$").ok())
        .as_ref()
}

/// Resolves a `Range` header against a body of `len` bytes. Multi-range and
/// malformed headers are ignored.
pub fn parse_range(header: Option<&str>, len: u64) -> ByteRange {
    let Some(header) = header else {
        return ByteRange::Full;
    };
    let Some(caps) = range_pattern().and_then(|re| re.captures(header.trim())) else {
        return ByteRange::Full;
    };
    let first = caps.get(1).map(|m| m.as_str()).unwrap_or("");
    let last = caps.get(2).map(|m| m.as_str()).unwrap_or("");

    match (first.parse::<u64>().ok(), last.parse::<u64>().ok()) {
        (Some(start), end) => {
            if let Some(end) = end {
                if end < start {
                    return ByteRange::Full;
                }
            }
            if start >= len {
                return ByteRange::Unsatisfiable;
            }
            let end = end.map_or(len - 1, |end| end.min(len - 1));
            ByteRange::Partial { start, end }
        }
        (None, Some(suffix)) => {
            if suffix == 0 || len == 0 {
                return ByteRange::Unsatisfiable;
            }
            ByteRange::Partial {
                start: len.saturating_sub(suffix),
                end: len - 1,
            }
        }
        (None, None) => ByteRange::Full,
    }
}
