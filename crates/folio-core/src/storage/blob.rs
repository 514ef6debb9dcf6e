//! Storage adapters for document bytes
//!
//! The lifecycle manager is the only caller. Deleted documents are never
//! erased: their bytes move to a holding area (`.trash/`) from which
//! `restore_from_holding` can bring them back.
//!
//! Locations are relative, `/`-separated strings such as
//! `documents/2025/01/<uuid>-report.pdf`.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use super::error::{StorageError, StorageResult};

/// Directory (relative to the storage root) that holds deleted bytes
pub const HOLDING_DIR: &str = ".trash";

/// Persists and relocates raw document bytes
pub trait StorageAdapter: Send + Sync {
    /// Write `bytes` to `destination`, returning the stored location
    fn save(&self, bytes: &[u8], destination: &str) -> StorageResult<String>;

    /// Read the bytes stored at `location`
    fn read(&self, location: &str) -> StorageResult<Vec<u8>>;

    /// Whether bytes are present at `location`
    fn exists(&self, location: &str) -> bool;

    /// Move bytes into the holding area, returning their holding location
    fn relocate_to_holding(&self, location: &str) -> StorageResult<String>;

    /// Move bytes from the holding area back to `location`
    fn restore_from_holding(&self, holding: &str, location: &str) -> StorageResult<()>;
}

/// Location for the first upload of a document: `documents/YYYY/MM/<id>-<file>`
pub fn document_location(document_id: Uuid, filename: &str, now: DateTime<Utc>) -> String {
    format!(
        "documents/{}/{}-{}",
        now.format("%Y/%m"),
        document_id,
        sanitize_filename(filename)
    )
}

/// Fresh location for a later revision of a document
pub fn revision_location(document_id: Uuid, filename: &str, now: DateTime<Utc>) -> String {
    let revision = Uuid::new_v4().simple().to_string();
    format!(
        "documents/{}/{}-{}-{}",
        now.format("%Y/%m"),
        document_id,
        &revision[..8],
        sanitize_filename(filename)
    )
}

/// Last path component with only alphanumerics, `-` and `_` in the stem
pub fn sanitize_filename(filename: &str) -> String {
    let keep = |c: &char| c.is_alphanumeric() || *c == '-' || *c == '_';
    let filename = filename
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(filename);
    let (stem, ext) = match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (filename, None),
    };

    let stem: String = stem.chars().filter(keep).collect();
    let stem = if stem.is_empty() { "file".to_string() } else { stem };
    match ext.map(|e| e.chars().filter(|c| c.is_alphanumeric()).collect::<String>()) {
        Some(ext) if !ext.is_empty() => format!("{}.{}", stem, ext),
        _ => stem,
    }
}

fn holding_name(location: &str) -> String {
    let file_name = location.rsplit('/').next().unwrap_or(location);
    format!(
        "{}/{}_{}_{}",
        HOLDING_DIR,
        Utc::now().format("%Y%m%d_%H%M%S"),
        Uuid::new_v4(),
        file_name
    )
}

// ==================== Local filesystem ====================

/// Stores bytes under a root directory on the local filesystem
pub struct LocalFileStorage {
    root: PathBuf,
}

impl LocalFileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map a location to a path below the root, rejecting escapes
    fn resolve(&self, location: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(location);
        let invalid = |reason: &str| StorageError::InvalidLocation {
            location: location.to_string(),
            reason: reason.to_string(),
        };

        if location.is_empty() {
            return Err(invalid("location is empty"));
        }
        for component in relative.components() {
            match component {
                Component::Normal(_) => {}
                Component::ParentDir => return Err(invalid("parent components are not allowed")),
                _ => return Err(invalid("location must be relative")),
            }
        }
        Ok(self.root.join(relative))
    }

    /// Remove now-empty directories left behind by a relocation
    fn cleanup_empty_dirs(&self, start: &Path) {
        let mut current = start.to_path_buf();
        for _ in 0..3 {
            if current == self.root || !current.starts_with(&self.root) {
                break;
            }
            // Fails (and stops) as soon as a directory is not empty
            if fs::remove_dir(&current).is_err() {
                break;
            }
            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => break,
            }
        }
    }
}

impl StorageAdapter for LocalFileStorage {
    fn save(&self, bytes: &[u8], destination: &str) -> StorageResult<String> {
        let path = self.resolve(destination)?;
        atomic_write(&path, bytes)?;
        debug!("Saved {} bytes to {}", bytes.len(), destination);
        Ok(destination.to_string())
    }

    fn read(&self, location: &str) -> StorageResult<Vec<u8>> {
        let path = self.resolve(location)?;
        fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound {
                location: location.to_string(),
            },
            _ => StorageError::ReadError { path, source: e },
        })
    }

    fn exists(&self, location: &str) -> bool {
        self.resolve(location).map(|p| p.is_file()).unwrap_or(false)
    }

    fn relocate_to_holding(&self, location: &str) -> StorageResult<String> {
        let from = self.resolve(location)?;
        if !from.is_file() {
            return Err(StorageError::NotFound {
                location: location.to_string(),
            });
        }

        let holding = holding_name(location);
        let to = self.resolve(&holding)?;
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        fs::rename(&from, &to).map_err(|e| StorageError::RelocateFailed {
            from: from.clone(),
            to: to.clone(),
            source: e,
        })?;

        if let Some(parent) = from.parent() {
            self.cleanup_empty_dirs(parent);
        }

        debug!("Relocated {} to {}", location, holding);
        Ok(holding)
    }

    fn restore_from_holding(&self, holding: &str, location: &str) -> StorageResult<()> {
        if !holding.starts_with(&format!("{}/", HOLDING_DIR)) {
            return Err(StorageError::InvalidLocation {
                location: holding.to_string(),
                reason: format!("not inside {}", HOLDING_DIR),
            });
        }

        let from = self.resolve(holding)?;
        let to = self.resolve(location)?;
        if !from.is_file() {
            return Err(StorageError::NotFound {
                location: holding.to_string(),
            });
        }
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        fs::rename(&from, &to).map_err(|e| StorageError::RelocateFailed {
            from,
            to,
            source: e,
        })?;
        debug!("Restored {} to {}", holding, location);
        Ok(())
    }
}

/// Write data to a file atomically
///
/// 1. Write to a temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
fn atomic_write(path: &Path, data: &[u8]) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StorageError::CreateDirectory {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let temp_path = path.with_extension("tmp");

    let mut file =
        File::create(&temp_path).map_err(|e| StorageError::from_io(e, temp_path.clone()))?;

    file.write_all(data)
        .map_err(|e| StorageError::from_io(e, temp_path.clone()))?;

    file.sync_all()
        .map_err(|e| StorageError::from_io(e, temp_path.clone()))?;

    fs::rename(&temp_path, path).map_err(|e| StorageError::AtomicWriteFailed {
        from: temp_path.clone(),
        to: path.to_path_buf(),
        source: e,
    })?;

    Ok(())
}

// ==================== In-memory ====================

/// Keeps bytes in a map; used by `Store::open_in_memory` and tests
#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locations currently stored, sorted
    pub fn locations(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        // A panic while holding the lock cannot leave the map half-updated
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl StorageAdapter for MemoryStorage {
    fn save(&self, bytes: &[u8], destination: &str) -> StorageResult<String> {
        self.lock().insert(destination.to_string(), bytes.to_vec());
        Ok(destination.to_string())
    }

    fn read(&self, location: &str) -> StorageResult<Vec<u8>> {
        self.lock()
            .get(location)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                location: location.to_string(),
            })
    }

    fn exists(&self, location: &str) -> bool {
        self.lock().contains_key(location)
    }

    fn relocate_to_holding(&self, location: &str) -> StorageResult<String> {
        let mut objects = self.lock();
        let bytes = objects
            .remove(location)
            .ok_or_else(|| StorageError::NotFound {
                location: location.to_string(),
            })?;
        let holding = holding_name(location);
        objects.insert(holding.clone(), bytes);
        Ok(holding)
    }

    fn restore_from_holding(&self, holding: &str, location: &str) -> StorageResult<()> {
        let mut objects = self.lock();
        let bytes = objects
            .remove(holding)
            .ok_or_else(|| StorageError::NotFound {
                location: holding.to_string(),
            })?;
        objects.insert(location.to_string(), bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_document_location_format() {
        let id = Uuid::new_v4();
        let now = Utc.with_ymd_and_hms(2025, 3, 9, 12, 0, 0).unwrap();
        let location = document_location(id, "Q1 report (final).pdf", now);
        assert_eq!(location, format!("documents/2025/03/{}-Q1reportfinal.pdf", id));

        let revision = revision_location(id, "Q1 report (final).pdf", now);
        assert!(revision.starts_with(&format!("documents/2025/03/{}-", id)));
        assert!(revision.ends_with("-Q1reportfinal.pdf"));
        assert_ne!(revision, location);
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("my file.txt"), "myfile.txt");
        assert_eq!(sanitize_filename("scans/a b/c.txt"), "c.txt");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename(".bashrc"), "bashrc");
        assert_eq!(sanitize_filename("???"), "file");
        assert_eq!(sanitize_filename("résumé_v2.docx"), "résumé_v2.docx");
    }

    #[test]
    fn test_local_save_read_relocate_restore() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalFileStorage::new(temp_dir.path());

        let location = storage.save(b"contract", "documents/2025/01/x-contract.txt").unwrap();
        assert!(storage.exists(&location));
        assert_eq!(storage.read(&location).unwrap(), b"contract");

        let holding = storage.relocate_to_holding(&location).unwrap();
        assert!(holding.starts_with(".trash/"));
        assert!(holding.ends_with("_x-contract.txt"));
        assert!(!storage.exists(&location));
        assert_eq!(storage.read(&holding).unwrap(), b"contract");
        // Emptied date directories are cleaned up
        assert!(!temp_dir.path().join("documents/2025/01").exists());

        storage.restore_from_holding(&holding, &location).unwrap();
        assert_eq!(storage.read(&location).unwrap(), b"contract");
        assert!(!storage.exists(&holding));
    }

    #[test]
    fn test_local_rejects_escaping_locations() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalFileStorage::new(temp_dir.path());

        for bad in ["../outside.txt", "/etc/passwd", "a/../../b", ""] {
            let err = storage.save(b"x", bad).unwrap_err();
            assert!(
                matches!(err, StorageError::InvalidLocation { .. }),
                "{} was accepted",
                bad
            );
        }
        assert!(!storage.exists("../outside.txt"));
    }

    #[test]
    fn test_local_relocate_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalFileStorage::new(temp_dir.path());

        let err = storage.relocate_to_holding("documents/nothing.txt").unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[test]
    fn test_restore_requires_holding_location() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalFileStorage::new(temp_dir.path());
        storage.save(b"x", "documents/a.txt").unwrap();

        let err = storage
            .restore_from_holding("documents/a.txt", "documents/b.txt")
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidLocation { .. }));
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let nested_path = temp_dir.path().join("a").join("b").join("file.txt");

        atomic_write(&nested_path, b"test data").unwrap();

        assert_eq!(fs::read_to_string(&nested_path).unwrap(), "test data");
        assert!(!nested_path.with_extension("tmp").exists());
    }

    #[test]
    fn test_memory_storage_round_trip() {
        let storage = MemoryStorage::new();
        storage.save(b"v1", "documents/d.txt").unwrap();

        let holding = storage.relocate_to_holding("documents/d.txt").unwrap();
        assert_eq!(storage.locations(), vec![holding.clone()]);
        assert!(storage.read("documents/d.txt").is_err());

        storage.restore_from_holding(&holding, "documents/d.txt").unwrap();
        assert_eq!(storage.read("documents/d.txt").unwrap(), b"v1");
    }
}
