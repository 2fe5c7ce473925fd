use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, error, info};

use crate::errors::WikiError;
use crate::types::MetaDocument;

/// Owner of `meta.json`.
///
/// Mutations go through [`MetaStore::update`], which holds a process-wide
/// writer lock across the whole read-modify-write and replaces the file by
/// renaming a fully written temporary copy over it.
pub struct MetaStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl MetaStore {
    pub fn new(path: PathBuf) -> Self {
        debug!("Creating MetaStore at {:?}", path);
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole document. A missing file is an empty forest; a
    /// corrupt one is an error and is never overwritten implicitly.
    pub fn load(&self) -> Result<MetaDocument, WikiError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No metadata at {:?}, starting empty", self.path);
                return Ok(MetaDocument::default());
            }
            Err(e) => {
                error!("Failed to read {:?}: {}", self.path, e);
                return Err(WikiError::Io(e));
            }
        };
        if raw.trim().is_empty() {
            return Ok(MetaDocument::default());
        }
        serde_json::from_str(&raw).map_err(|e| {
            error!("Corrupt metadata in {:?}: {}", self.path, e);
            WikiError::Parse(e)
        })
    }

    /// Write the whole document, pretty-printed.
    pub fn save(&self, doc: &MetaDocument) -> Result<(), WikiError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_string_pretty(doc)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body.as_bytes())?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            error!("Failed to replace {:?}: {}", self.path, e);
            WikiError::Io(e)
        })?;
        debug!("Saved metadata, {} root pages, lastId {}", doc.pages.len(), doc.last_id);
        Ok(())
    }

    /// Run one serialized read-modify-write. Nothing is written when `apply`
    /// fails.
    pub fn update<T, F>(&self, apply: F) -> Result<T, WikiError>
    where
        F: FnOnce(&mut MetaDocument) -> Result<T, WikiError>,
    {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut doc = self.load()?;
        let out = apply(&mut doc)?;
        self.save(&doc)?;
        Ok(out)
    }

    /// Create an empty document if none exists yet.
    pub fn ensure_exists(&self) -> Result<(), WikiError> {
        if !self.path.exists() {
            info!("Initializing empty metadata at {:?}", self.path);
            self.save(&MetaDocument::default())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PageNode;
    use std::sync::Arc;

    fn page(id: &str, children: Vec<PageNode>) -> PageNode {
        PageNode {
            id: id.to_string(),
            slug: format!("p{}", id),
            title: format!("P{}", id),
            path: format!("p{}.md", id),
            is_public: false,
            version: 1,
            sort_order: 3,
            last_modified: "2024-05-01T10:00:00Z".to_string(),
            deleted: true,
            children,
        }
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetaStore::new(dir.path().join("meta.json"));
        assert_eq!(store.load().unwrap(), MetaDocument::default());
    }

    #[test]
    fn round_trips_the_forest() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetaStore::new(dir.path().join("docs").join("meta.json"));
        let doc = MetaDocument {
            pages: vec![page("1", vec![page("2", vec![])]), page("3", vec![])],
            last_id: 3,
        };
        store.save(&doc).unwrap();
        assert_eq!(store.load().unwrap(), doc);

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\n  \"pages\""));
        assert!(raw.contains("\"lastId\": 3"));
    }

    #[test]
    fn corrupt_file_is_an_error_and_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.json");
        fs::write(&path, "{ not json").unwrap();
        let store = MetaStore::new(path.clone());

        assert!(matches!(store.load(), Err(WikiError::Parse(_))));
        let result = store.update(|doc| {
            doc.last_id += 1;
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn failed_update_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetaStore::new(dir.path().join("meta.json"));
        store.ensure_exists().unwrap();
        let result: Result<(), _> = store.update(|doc| {
            doc.last_id = 99;
            Err(WikiError::NotFound)
        });
        assert!(result.is_err());
        assert_eq!(store.load().unwrap().last_id, 0);
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MetaStore::new(dir.path().join("meta.json")));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        store
                            .update(|doc| {
                                doc.last_id += 1;
                                Ok(())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.load().unwrap().last_id, 80);
    }
}
