//! Gallery providers — sources of known-person embeddings.
//!
//! Every [`GalleryProvider::records`] call returns an owned snapshot. A search
//! reads it once at start, so later edits to the store do not affect a search
//! that is already running.

use crate::types::GalleryRecord;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("gallery directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("gallery lock poisoned")]
    Poisoned,
}

/// Source of `(person_id, embedding)` pairs searched by the matcher.
pub trait GalleryProvider: Send + Sync {
    fn records(&self) -> Result<Vec<GalleryRecord>, GalleryError>;
}

/// Gallery held in memory. Mutations are visible to the next snapshot only.
#[derive(Default)]
pub struct InMemoryGallery {
    records: RwLock<Vec<GalleryRecord>>,
}

impl InMemoryGallery {
    pub fn new(records: Vec<GalleryRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    pub fn insert(&self, record: GalleryRecord) -> Result<(), GalleryError> {
        self.records
            .write()
            .map_err(|_| GalleryError::Poisoned)?
            .push(record);
        Ok(())
    }

    /// Remove every record for `person_id`. Returns how many were removed.
    pub fn remove(&self, person_id: &str) -> Result<usize, GalleryError> {
        let mut records = self.records.write().map_err(|_| GalleryError::Poisoned)?;
        let before = records.len();
        records.retain(|r| r.person_id != person_id);
        Ok(before - records.len())
    }

    pub fn replace(&self, records: Vec<GalleryRecord>) -> Result<(), GalleryError> {
        *self.records.write().map_err(|_| GalleryError::Poisoned)? = records;
        Ok(())
    }

    pub fn len(&self) -> usize {
        match self.records.read() {
            Ok(records) => records.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl GalleryProvider for InMemoryGallery {
    fn records(&self) -> Result<Vec<GalleryRecord>, GalleryError> {
        Ok(self
            .records
            .read()
            .map_err(|_| GalleryError::Poisoned)?
            .clone())
    }
}

/// On-disk person file. Other fields (name, star, ...) are ignored.
#[derive(Deserialize)]
struct PersonFile {
    id: String,
    face_encoding: Vec<f32>,
}

/// Directory of `<person>.json` files, re-read on every snapshot.
///
/// Files are visited in sorted name order so the scan order is stable.
pub struct DirectoryGallery {
    dir: PathBuf,
}

impl DirectoryGallery {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read_person(path: &Path) -> Option<GalleryRecord> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable person file");
                return None;
            }
        };
        match serde_json::from_str::<PersonFile>(&raw) {
            Ok(p) if p.face_encoding.is_empty() => {
                tracing::warn!(path = %path.display(), id = %p.id, "skipping person file with empty face_encoding");
                None
            }
            Ok(p) => Some(GalleryRecord::new(p.id, p.face_encoding)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping malformed person file");
                None
            }
        }
    }
}

impl GalleryProvider for DirectoryGallery {
    fn records(&self) -> Result<Vec<GalleryRecord>, GalleryError> {
        let io_err = |source| GalleryError::Io {
            path: self.dir.clone(),
            source,
        };

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let records: Vec<GalleryRecord> = paths.iter().filter_map(|p| Self::read_person(p)).collect();
        tracing::debug!(dir = %self.dir.display(), count = records.len(), "gallery snapshot read");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn test_in_memory_snapshot_is_detached() {
        let gallery = InMemoryGallery::new(vec![GalleryRecord::new("a", vec![1.0, 0.0])]);
        let snapshot = gallery.records().unwrap();
        gallery.insert(GalleryRecord::new("b", vec![0.0, 1.0])).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(gallery.records().unwrap().len(), 2);
    }

    #[test]
    fn test_in_memory_remove_and_replace() {
        let gallery = InMemoryGallery::new(vec![
            GalleryRecord::new("a", vec![1.0]),
            GalleryRecord::new("b", vec![1.0]),
            GalleryRecord::new("a", vec![0.5]),
        ]);
        assert_eq!(gallery.remove("a").unwrap(), 2);
        assert_eq!(gallery.len(), 1);
        gallery.replace(Vec::new()).unwrap();
        assert!(gallery.is_empty());
    }

    #[test]
    fn test_in_memory_len_survives_poisoned_lock() {
        let gallery = std::sync::Arc::new(InMemoryGallery::new(vec![GalleryRecord::new("a", vec![1.0])]));
        let g = std::sync::Arc::clone(&gallery);
        let _ = std::thread::spawn(move || {
            let _guard = g.records.write().unwrap();
            panic!("poison the lock");
        })
        .join();

        assert!(gallery.records.is_poisoned());
        assert_eq!(gallery.len(), 1);
        assert!(!gallery.is_empty());
        assert!(matches!(gallery.records(), Err(GalleryError::Poisoned)));
    }

    #[test]
    fn test_directory_gallery_reads_sorted_and_skips_junk() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "b.json", r#"{"id": "bob", "name": "Bob", "face_encoding": [0.0, 1.0]}"#);
        write(tmp.path(), "a.json", r#"{"id": "alice", "face_encoding": [1.0, 0.0]}"#);
        write(tmp.path(), "c.json", r#"{"id": "broken"}"#);
        write(tmp.path(), "d.json", r#"{"id": "empty", "face_encoding": []}"#);
        write(tmp.path(), "notes.txt", "not a person");

        let records = DirectoryGallery::new(tmp.path()).records().unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.person_id.as_str()).collect();
        assert_eq!(ids, vec!["alice", "bob"]);
        assert_eq!(records[1].embedding.values, vec![0.0, 1.0]);
    }

    #[test]
    fn test_directory_gallery_hot_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let gallery = DirectoryGallery::new(tmp.path());
        assert!(gallery.records().unwrap().is_empty());
        write(tmp.path(), "p.json", r#"{"id": "p", "face_encoding": [1.0]}"#);
        assert_eq!(gallery.records().unwrap().len(), 1);
    }

    #[test]
    fn test_directory_gallery_missing_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let gallery = DirectoryGallery::new(tmp.path().join("nope"));
        assert!(matches!(gallery.records(), Err(GalleryError::Io { .. })));
    }
}
