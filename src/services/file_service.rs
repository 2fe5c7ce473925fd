use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};

use crate::errors::WikiError;
use crate::utils::{ensure_safe_path, normalize_path};

/// Service for the page content files under the docs root
#[derive(Clone)]
pub struct ContentStore {
    base_dir: PathBuf,
}

impl ContentStore {
    /// Create a new content store
    pub fn new(base_dir: PathBuf) -> Self {
        debug!("Creating ContentStore with base directory: {:?}", base_dir);
        Self { base_dir }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, WikiError> {
        ensure_safe_path(path)?;
        Ok(self.base_dir.join(normalize_path(path)))
    }

    /// Read file content
    pub fn read(&self, path: &str) -> Result<String, WikiError> {
        let full_path = self.resolve(path)?;
        debug!("Reading file: {:?} (full path: {:?})", path, full_path);

        if !full_path.is_file() {
            warn!("File does not exist: {:?}", full_path);
            return Err(WikiError::NotFound);
        }

        let content = fs::read_to_string(&full_path).map_err(|e| {
            error!("Failed to read file {:?}: {}", full_path, e);
            WikiError::Io(e)
        })?;

        debug!("Read file {:?}, {} bytes", path, content.len());
        Ok(content)
    }

    /// Write file content, creating parent directories as needed
    pub fn write(&self, path: &str, content: &str) -> Result<(), WikiError> {
        let full_path = self.resolve(path)?;
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&full_path, content).map_err(|e| {
            error!("Failed to write file {:?}: {}", full_path, e);
            WikiError::Io(e)
        })?;
        info!("Wrote file {:?}, {} bytes", path, content.len());
        Ok(())
    }

    /// Delete a file; one that is already gone counts as deleted
    pub fn remove(&self, path: &str) -> Result<(), WikiError> {
        let full_path = self.resolve(path)?;
        match fs::remove_file(&full_path) {
            Ok(()) => {
                info!("Removed file {:?}", path);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("File already absent: {:?}", path);
                Ok(())
            }
            Err(e) => {
                error!("Failed to remove file {:?}: {}", full_path, e);
                Err(WikiError::Io(e))
            }
        }
    }

    /// Check if file exists
    pub fn exists(&self, path: &str) -> bool {
        self.resolve(path)
            .map(|full_path| full_path.is_file())
            .unwrap_or(false)
    }

    /// Relative paths of every Markdown file under the root
    pub fn list_markdown(&self) -> Result<Vec<String>, WikiError> {
        let mut found = Vec::new();
        if self.base_dir.is_dir() {
            self.walk(Path::new(""), &mut found)?;
        }
        found.sort();
        debug!("Found {} markdown files under {:?}", found.len(), self.base_dir);
        Ok(found)
    }

    fn walk(&self, relative: &Path, found: &mut Vec<String>) -> Result<(), WikiError> {
        let entries = fs::read_dir(self.base_dir.join(relative)).map_err(|e| {
            error!("Failed to read directory {:?}: {}", relative, e);
            WikiError::Io(e)
        })?;
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Failed to read directory entry: {}", e);
                    continue;
                }
            };
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let entry_path = relative.join(&name);
            let is_dir = entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false);
            if is_dir {
                self.walk(&entry_path, found)?;
            } else if is_markdown(&name) {
                found.push(entry_path.to_string_lossy().replace('\\', "/"));
            }
        }
        Ok(())
    }
}

/// Check if a file name is markdown
pub fn is_markdown(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.eq_ignore_ascii_case("md") || s.eq_ignore_ascii_case("mdx"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_read_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path().to_path_buf());

        store.write("guide/intro.md", "# Intro").unwrap();
        assert!(store.exists("guide/intro.md"));
        assert_eq!(store.read("guide/intro.md").unwrap(), "# Intro");

        store.remove("guide/intro.md").unwrap();
        assert!(!store.exists("guide/intro.md"));
        store.remove("guide/intro.md").unwrap();
        assert!(matches!(store.read("guide/intro.md"), Err(WikiError::NotFound)));
    }

    #[test]
    fn rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path().join("docs"));
        assert!(matches!(store.write("../outside.md", "x"), Err(WikiError::InvalidPath)));
        assert!(matches!(store.read("/etc/hosts"), Err(WikiError::InvalidPath)));
        assert!(!store.exists("../docs"));
    }

    #[test]
    fn lists_markdown_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path().to_path_buf());
        store.write("b.md", "").unwrap();
        store.write("nested/a.mdx", "").unwrap();
        store.write("meta.json", "{}").unwrap();
        store.write(".hidden/c.md", "").unwrap();
        assert_eq!(store.list_markdown().unwrap(), vec!["b.md", "nested/a.mdx"]);
    }
}
