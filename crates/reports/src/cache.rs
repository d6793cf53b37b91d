use std::fs;
use std::io;
use std::path::PathBuf;
use uuid::Uuid;

/// Disk cache for completed broker reports.
///
/// One JSON file per report window, named by the window's cache key. A file,
/// once written, is permanent ground truth: its existence is the entire
/// cache-hit signal, with no TTL and no invalidation.
pub struct ReportCache {
    directory: PathBuf,
}

impl ReportCache {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.directory.join(format!("{}.json", key))
    }

    /// Cached report body for `key`, if one has been written.
    ///
    /// Absence is a normal branch; only I/O failures other than not-found
    /// surface as errors.
    pub fn lookup(&self, key: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Write a report body for `key`, overwriting any existing entry.
    ///
    /// The body lands in a uniquely named temp file in the cache directory
    /// and is renamed into place, so a concurrent reader never observes a
    /// partially written report.
    pub fn store(&self, key: &str, body: &str) -> io::Result<()> {
        fs::create_dir_all(&self.directory)?;
        let tmp = self
            .directory
            .join(format!("{}.{}.tmp", key, Uuid::new_v4()));
        fs::write(&tmp, body)?;
        fs::rename(&tmp, self.path_for(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_miss_is_none_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ReportCache::new(dir.path());
        assert!(cache.lookup("01.01.2022-31.01.2022").unwrap().is_none());
    }

    #[test]
    fn test_store_then_lookup_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ReportCache::new(dir.path().join("reports"));

        cache.store("k", r#"{"a":1}"#).unwrap();
        assert_eq!(cache.lookup("k").unwrap().as_deref(), Some(r#"{"a":1}"#));
    }

    #[test]
    fn test_store_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ReportCache::new(dir.path());

        cache.store("k", "old").unwrap();
        cache.store("k", "new").unwrap();
        assert_eq!(cache.lookup("k").unwrap().as_deref(), Some("new"));
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ReportCache::new(dir.path());
        cache.store("k", "body").unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["k.json"]);
    }
}
