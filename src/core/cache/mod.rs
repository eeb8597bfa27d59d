//! On-disk store-and-forward cache for undelivered readings.
//!
//! When the broker is unreachable, rendered wire messages land in a
//! `MQTTData` directory under the configured state directory, one file per
//! (minute bucket, source sensor) pair. A file's body is a comma-joined
//! sequence of JSON objects — not valid JSON on its own; the `[...]`
//! wrapper is added only at read time. Both halves of that fragile format
//! (separator placement on write, array-wrapping on read) live here and
//! are tested together.
//!
//! Eviction keeps the directory bounded two ways: files older than the
//! retention ceiling are deleted outright, and once the total size still
//! exceeds the byte ceiling the oldest files (by modification time) are
//! deleted one at a time until it no longer does.

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    time::SystemTime,
};

use serde_json::value::RawValue;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, warn};

pub mod codec;

use codec::BucketKey;

/// Directory created under the state directory to hold cache files.
pub const CACHE_DIR_NAME: &str = "MQTTData";

/// Errors raised by cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem access failed (create, append, list, delete).
    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A file's content did not parse as comma-joined JSON objects.
    #[error("Cache content error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A cache file found by [`ReadingCache::scan`]: its path plus the
/// identity decoded from its name.
#[derive(Debug, Clone)]
pub struct BucketRecord {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Decoded minute bucket and source identifier.
    pub key: BucketKey,
}

/// The store-and-forward cache directory.
///
/// Exclusively owned by the forwarder; nothing else reads or writes under
/// it. All methods take explicit timestamps so that bucket selection and
/// age checks are deterministic under test.
#[derive(Debug, Clone)]
pub struct ReadingCache {
    root: PathBuf,
    retention: time::Duration,
    max_bytes: u64,
}

impl ReadingCache {
    /// Creates a cache rooted at `<state_dir>/MQTTData`.
    ///
    /// The directory itself is created lazily on first write, so a
    /// forwarder that never fails a publish never touches the disk.
    pub fn new(state_dir: &Path, retention_hours: u64, max_bytes: u64) -> Self {
        Self {
            root: state_dir.join(CACHE_DIR_NAME),
            retention: time::Duration::hours(retention_hours as i64),
            max_bytes,
        }
    }

    /// The cache directory path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Appends a rendered message to the bucket file for (`now`'s minute,
    /// `source_id`), creating directory and file as needed.
    ///
    /// If the file already has content, a separating comma is written
    /// first, so repeated appends within one minute build up the
    /// comma-joined fragment sequence without ever overwriting.
    pub fn append(
        &self,
        message: &str,
        source_id: &str,
        now: OffsetDateTime,
    ) -> Result<PathBuf, CacheError> {
        fs::create_dir_all(&self.root)?;

        let path = self.root.join(codec::encode(now, source_id));
        let occupied = fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false);

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        if occupied {
            file.write_all(b",")?;
        }
        file.write_all(message.as_bytes())?;

        debug!("Cached message for {} in {}", source_id, path.display());
        Ok(path)
    }

    /// Lists the cache files whose names decode, in directory order.
    ///
    /// Files with undecodable names are skipped with a warning; they are
    /// not ours to delete. A missing cache directory reads as empty.
    pub fn scan(&self) -> Result<Vec<BucketRecord>, CacheError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                warn!("Skipping cache entry with non-UTF8 name");
                continue;
            };
            match codec::decode(name) {
                Ok(key) => records.push(BucketRecord {
                    path: entry.path(),
                    key,
                }),
                Err(e) => warn!("Skipping foreign file in cache directory: {}", e),
            }
        }
        Ok(records)
    }

    /// Reads a bucket file back as individual message fragments.
    ///
    /// The stored comma-joined body is wrapped as `[...]` and parsed;
    /// each element is returned byte-identical to what was appended.
    pub fn read_fragments(&self, path: &Path) -> Result<Vec<String>, CacheError> {
        let body = fs::read_to_string(path)?;
        let wrapped = format!("[{body}]");
        let fragments: Vec<&RawValue> = serde_json::from_str(&wrapped)?;
        Ok(fragments.iter().map(|raw| raw.get().to_string()).collect())
    }

    /// Deletes a bucket file.
    pub fn remove(&self, path: &Path) -> Result<(), CacheError> {
        fs::remove_file(path)?;
        debug!("Removed cache file {}", path.display());
        Ok(())
    }

    /// Runs the eviction pass: age ceiling first, then the size ceiling.
    ///
    /// Age: a file is deleted once `now` is *strictly* past its encoded
    /// minute plus the retention ceiling; a file exactly at the ceiling
    /// survives. Size: while the surviving files still total more than
    /// the byte ceiling, the single oldest-by-modification-time file is
    /// deleted and the total re-checked, so the ceiling holds no matter
    /// how many deletions it takes.
    pub fn evict(&self, now: OffsetDateTime) -> Result<(), CacheError> {
        let records = self.scan()?;

        let mut survivors = Vec::new();
        for record in records {
            if now - record.key.minute > self.retention {
                warn!(
                    "Evicting expired cache file {} (bucket {})",
                    record.path.display(),
                    record.key.minute
                );
                self.remove(&record.path)?;
            } else {
                survivors.push(record);
            }
        }

        // Size pass over what the age pass left behind.
        let mut sized: Vec<(PathBuf, u64, SystemTime)> = Vec::new();
        for record in survivors {
            let meta = fs::metadata(&record.path)?;
            let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            sized.push((record.path, meta.len(), mtime));
        }
        let mut total: u64 = sized.iter().map(|(_, len, _)| len).sum();

        while total > self.max_bytes && !sized.is_empty() {
            sized.sort_by_key(|(_, _, mtime)| *mtime);
            let (path, len, _) = sized.remove(0);
            warn!(
                "Cache over size ceiling ({} > {} bytes), evicting oldest file {}",
                total,
                self.max_bytes,
                path.display()
            );
            self.remove(&path)?;
            total -= len;
        }

        Ok(())
    }

    /// Total size in bytes of all files currently in the cache directory.
    pub fn total_size(&self) -> Result<u64, CacheError> {
        let mut total = 0;
        for record in self.scan()? {
            total += fs::metadata(&record.path)?.len();
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use time::macros::datetime;

    use super::*;

    const TAG: &str = "AA:BB:CC:DD:EE:FF";

    fn cache_in(dir: &TempDir) -> ReadingCache {
        ReadingCache::new(dir.path(), 24, 10 * 1024 * 1024)
    }

    #[test]
    fn test_append_creates_directory_and_file() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        let now = datetime!(2026-08-04 09:41:00 UTC);

        let path = cache.append(r#"{"rssi":-70}"#, TAG, now).unwrap();
        assert!(path.starts_with(dir.path().join(CACHE_DIR_NAME)));
        assert_eq!(fs::read_to_string(&path).unwrap(), r#"{"rssi":-70}"#);
    }

    #[test]
    fn test_append_same_minute_joins_with_comma() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        let now = datetime!(2026-08-04 09:41:10 UTC);
        let later_same_minute = datetime!(2026-08-04 09:41:55 UTC);

        let path = cache.append(r#"{"n":1}"#, TAG, now).unwrap();
        let path2 = cache.append(r#"{"n":2}"#, TAG, later_same_minute).unwrap();
        assert_eq!(path, path2);

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            r#"{"n":1},{"n":2}"#,
            "second append must separate with a comma, not overwrite"
        );
    }

    #[test]
    fn test_append_next_minute_opens_new_bucket() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);

        let first = cache
            .append(r#"{"n":1}"#, TAG, datetime!(2026-08-04 09:41:59 UTC))
            .unwrap();
        let second = cache
            .append(r#"{"n":2}"#, TAG, datetime!(2026-08-04 09:42:00 UTC))
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(cache.scan().unwrap().len(), 2);
    }

    #[test]
    fn test_fragments_parse_as_array_after_wrapping() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        let now = datetime!(2026-08-04 09:41:00 UTC);

        for n in 0..5 {
            cache
                .append(&format!(r#"{{"n":{n}}}"#), TAG, now)
                .unwrap();
        }

        let records = cache.scan().unwrap();
        assert_eq!(records.len(), 1);
        let fragments = cache.read_fragments(&records[0].path).unwrap();
        assert_eq!(fragments.len(), 5);
        assert_eq!(fragments[0], r#"{"n":0}"#);
        assert_eq!(fragments[4], r#"{"n":4}"#);
    }

    #[test]
    fn test_read_fragments_byte_identical() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        let now = datetime!(2026-08-04 09:41:00 UTC);

        let message = r#"{"gw_mac":"11:22:33:44:55:66","rssi":-70,"aoa":[],"gwts":"1700000000","ts":"1700000000","data":"0201","coords":""}"#;
        let path = cache.append(message, TAG, now).unwrap();

        let fragments = cache.read_fragments(&path).unwrap();
        assert_eq!(fragments, vec![message.to_string()]);
    }

    #[test]
    fn test_read_fragments_rejects_corrupt_content() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        let now = datetime!(2026-08-04 09:41:00 UTC);

        let path = cache.append(r#"{"n":1}"#, TAG, now).unwrap();
        fs::write(&path, "{\"n\":1},{broken").unwrap();

        assert!(matches!(
            cache.read_fragments(&path),
            Err(CacheError::Parse(_))
        ));
    }

    #[test]
    fn test_scan_decodes_bucket_identity() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        let now = datetime!(2026-08-04 09:41:30 UTC);

        cache.append(r#"{"n":1}"#, TAG, now).unwrap();

        let records = cache.scan().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key.source_id, TAG);
        assert_eq!(records[0].key.minute, datetime!(2026-08-04 09:41:00 UTC));
    }

    #[test]
    fn test_scan_skips_foreign_files() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        cache
            .append(r#"{"n":1}"#, TAG, datetime!(2026-08-04 09:41:00 UTC))
            .unwrap();
        fs::write(cache.root().join("notes.md"), "not a cache file").unwrap();

        let records = cache.scan().unwrap();
        assert_eq!(records.len(), 1);
        // The foreign file is left alone.
        assert!(cache.root().join("notes.md").exists());
    }

    #[test]
    fn test_scan_on_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        assert!(cache.scan().unwrap().is_empty());
    }

    #[test]
    fn test_age_eviction_boundary() {
        let dir = TempDir::new().unwrap();
        let cache = ReadingCache::new(dir.path(), 24, u64::MAX);

        let bucket = datetime!(2026-08-03 09:41:00 UTC);
        cache.append(r#"{"n":1}"#, TAG, bucket).unwrap();

        // Exactly at the ceiling: survives.
        cache.evict(datetime!(2026-08-04 09:41:00 UTC)).unwrap();
        assert_eq!(cache.scan().unwrap().len(), 1);

        // Any amount past it: deleted.
        cache
            .evict(datetime!(2026-08-04 09:41:00.000001 UTC))
            .unwrap();
        assert!(cache.scan().unwrap().is_empty());
    }

    #[test]
    fn test_size_eviction_deletes_oldest_until_under_ceiling() {
        let dir = TempDir::new().unwrap();
        // 30-byte ceiling; each file below is 20 bytes, so two must go.
        let cache = ReadingCache::new(dir.path(), 24 * 365, 30);
        let now = datetime!(2026-08-04 09:41:00 UTC);

        let tags = ["AA:AA:AA:AA:AA:01", "AA:AA:AA:AA:AA:02", "AA:AA:AA:AA:AA:03"];
        for tag in tags {
            cache
                .append(r#"{"payload":"xxxxx"}"#, tag, now)
                .unwrap();
            // Distinct mtimes so oldest-first ordering is deterministic.
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        assert!(cache.total_size().unwrap() > 30);

        cache.evict(now).unwrap();

        assert!(cache.total_size().unwrap() <= 30);
        let survivors: Vec<String> = cache
            .scan()
            .unwrap()
            .iter()
            .map(|r| r.key.source_id.clone())
            .collect();
        // The two oldest files went; only the newest remains.
        assert_eq!(survivors, vec!["AA:AA:AA:AA:AA:03".to_string()]);
    }

    #[test]
    fn test_eviction_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let cache = ReadingCache::new(dir.path(), 24, 60);
        let now = datetime!(2026-08-04 09:41:00 UTC);

        cache.append(r#"{"n":1}"#, TAG, now).unwrap();
        cache
            .append(r#"{"n":2}"#, "11:22:33:44:55:66", now)
            .unwrap();

        cache.evict(now).unwrap();
        let mut after_first: Vec<PathBuf> =
            cache.scan().unwrap().into_iter().map(|r| r.path).collect();
        after_first.sort();

        cache.evict(now).unwrap();
        let mut after_second: Vec<PathBuf> =
            cache.scan().unwrap().into_iter().map(|r| r.path).collect();
        after_second.sort();

        assert_eq!(after_first, after_second);
    }

    #[test]
    fn test_evict_on_missing_directory_is_noop() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        assert!(cache.evict(datetime!(2026-08-04 09:41:00 UTC)).is_ok());
    }
}
