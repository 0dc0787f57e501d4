use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// Sidecar written next to every staged fragment. Assembly orders fragments
/// by `index` from these records, never by file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentRecord {
    pub index: u32,
    pub size: u64,
    /// Payload file name inside the staging directory.
    pub file: String,
}

/// In-flight chunked upload.
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub upload_id: String,
    pub total_chunks: u32,
    pub total_size: u64,
    pub file_name: String,
    pub extension: String,
    pub staging_dir: PathBuf,
    /// index -> fragment byte size
    pub received: BTreeMap<u32, u64>,
    /// Set once assembly has run; later fragments are ignored.
    pub finished: bool,
}

impl UploadSession {
    pub fn new(
        upload_id: impl Into<String>,
        total_chunks: u32,
        total_size: u64,
        file_name: impl Into<String>,
        extension: impl Into<String>,
        staging_dir: PathBuf,
    ) -> Self {
        Self {
            upload_id: upload_id.into(),
            total_chunks,
            total_size,
            file_name: file_name.into(),
            extension: extension.into(),
            staging_dir,
            received: BTreeMap::new(),
            finished: false,
        }
    }

    pub fn record(&mut self, index: u32, size: u64) {
        self.received.insert(index, size);
    }

    /// Every index in `0..total_chunks` has arrived.
    pub fn is_complete(&self) -> bool {
        (0..self.total_chunks).all(|index| self.received.contains_key(&index))
    }

    pub fn missing(&self) -> Vec<u32> {
        (0..self.total_chunks)
            .filter(|index| !self.received.contains_key(index))
            .collect()
    }

    pub fn received_bytes(&self) -> u64 {
        self.received.values().sum()
    }

    /// Coarse percentage of the declared size received so far.
    pub fn progress_percent(&self) -> u8 {
        if self.total_size == 0 {
            return if self.is_complete() { 100 } else { 0 };
        }
        let percent = self.received_bytes().saturating_mul(100) / self.total_size;
        percent.min(100) as u8
    }
}

/// Reconstructed upload on durable storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssembledFile {
    pub upload_id: String,
    pub path: PathBuf,
    pub size: u64,
    pub extension: String,
    pub file_name: String,
}

/// Name of the assembled file for an upload: `{upload_id}.{ext}`.
pub fn assembled_name(upload_id: &str, extension: &str) -> String {
    format!("{}.{}", upload_id, extension)
}

/// Fragment payload and sidecar names inside a staging directory.
pub fn fragment_names(index: u32) -> (String, String) {
    (
        format!("fragment-{}.part", index),
        format!("fragment-{}.json", index),
    )
}

/// Orders sidecar records by index and checks they cover exactly
/// `0..total_chunks`. Returns the missing indices on failure.
pub fn order_fragments(
    mut records: Vec<FragmentRecord>,
    total_chunks: u32,
) -> Result<Vec<FragmentRecord>, Vec<u32>> {
    records.sort_by_key(|record| record.index);
    records.dedup_by_key(|record| record.index);

    let missing: Vec<u32> = (0..total_chunks)
        .filter(|index| records.binary_search_by_key(index, |r| r.index).is_err())
        .collect();
    if !missing.is_empty() {
        return Err(missing);
    }
    records.retain(|record| record.index < total_chunks);
    Ok(records)
}

/// True for a single plain path segment: no separators, `..`, or root.
pub fn is_safe_segment(name: &str) -> bool {
    if name.is_empty() || name.contains('/') || name.contains('\\') {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// The normal components of a relative path, with `.` dropped. `None` when
/// the path is empty, absolute or climbs with `..`.
pub fn normalize_relative(path: &Path) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    (!normalized.as_os_str().is_empty()).then_some(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(index: u32) -> FragmentRecord {
        let (file, _) = fragment_names(index);
        FragmentRecord {
            index,
            size: 1,
            file,
        }
    }

    #[test]
    fn orders_numerically_not_lexically() {
        let records = (0..12).rev().map(record).collect();
        let ordered = order_fragments(records, 12).unwrap();
        let indices: Vec<u32> = ordered.iter().map(|r| r.index).collect();
        assert_eq!(indices, (0..12).collect::<Vec<_>>());
    }

    #[test]
    fn reports_missing_fragments() {
        let records = vec![record(0), record(2)];
        assert_eq!(order_fragments(records, 4).unwrap_err(), vec![1, 3]);
    }

    #[test]
    fn session_completion_requires_contiguous_set() {
        let mut session = UploadSession::new("u", 3, 30, "clip", "mp4", PathBuf::from("s/u"));
        session.record(2, 10);
        session.record(0, 10);
        assert!(!session.is_complete());
        assert_eq!(session.missing(), vec![1]);
        assert_eq!(session.progress_percent(), 66);
        session.record(1, 10);
        assert!(session.is_complete());
        assert_eq!(session.progress_percent(), 100);
    }

    #[test]
    fn safe_segments() {
        assert!(is_safe_segment("abc-123"));
        assert!(!is_safe_segment(".."));
        assert!(!is_safe_segment("a/b"));
        assert!(!is_safe_segment(""));
    }

    #[test]
    fn relative_paths_normalize_to_plain_components() {
        assert_eq!(
            normalize_relative(Path::new("abc/480.m3u8")),
            Some(PathBuf::from("abc/480.m3u8"))
        );
        assert_eq!(
            normalize_relative(Path::new("./abc/./480.m3u8")),
            Some(PathBuf::from("abc/480.m3u8"))
        );
        assert_eq!(normalize_relative(Path::new("../etc/passwd")), None);
        assert_eq!(normalize_relative(Path::new("/etc/passwd")), None);
        assert_eq!(normalize_relative(Path::new(".")), None);
    }
}
