//! File-backed [`LayoutStore`]: one JSON snapshot per file, one
//! subdirectory per scope.
//!
//! ```text
//! <root>/
//!   default/
//!     reading-room.json
//!   dr-smith/
//!     chest-ct.json
//! ```
//!
//! A name has the form `scope/name`; a bare `name` lives in the `default`
//! scope.  Both parts are restricted to letters, digits, `-`, `_`, `.` and
//! spaces so a name can never escape the root directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use medview_core::LayoutSnapshot;
use tracing::{debug, trace};

use crate::application::layout_manager::{LayoutStore, StoreError};

pub const DEFAULT_SCOPE: &str = "default";
const EXTENSION: &str = "json";

#[derive(Debug, Clone)]
pub struct FileLayoutStore {
    root: PathBuf,
}

impl FileLayoutStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `scope/name` to its file path.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidName`] if either part is empty or contains
    /// anything outside the allowed characters.
    pub fn path_for(&self, name: &str) -> Result<PathBuf, StoreError> {
        let (scope, file) = split_name(name)?;
        Ok(self.root.join(scope).join(format!("{file}.{EXTENSION}")))
    }
}

fn split_name(name: &str) -> Result<(&str, &str), StoreError> {
    let (scope, file) = match name.split_once('/') {
        Some((scope, file)) => (scope, file),
        None => (DEFAULT_SCOPE, name),
    };
    if !valid_part(scope) || !valid_part(file) {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok((scope, file))
}

fn valid_part(part: &str) -> bool {
    !part.is_empty()
        && !part.starts_with('.')
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' '))
}

#[async_trait]
impl LayoutStore for FileLayoutStore {
    async fn save(&self, name: &str, snapshot: &LayoutSnapshot) -> Result<(), StoreError> {
        let path = self.path_for(name)?;
        let io = |source| StoreError::Io {
            name: name.to_string(),
            source,
        };
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(io)?;
        }
        // Write-then-rename so a crash never leaves a half-written snapshot.
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, snapshot.as_bytes()).await.map_err(io)?;
        tokio::fs::rename(&staging, &path).await.map_err(io)?;
        debug!(name, path = %path.display(), "layout snapshot written");
        Ok(())
    }

    async fn load(&self, name: &str) -> Result<LayoutSnapshot, StoreError> {
        let path = self.path_for(name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                trace!(name, bytes = bytes.len(), "layout snapshot read");
                Ok(LayoutSnapshot::from_bytes(bytes))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound(name.to_string())),
            Err(source) => Err(StoreError::Io {
                name: name.to_string(),
                source,
            }),
        }
    }

    async fn list(&self, scope: &str) -> Result<Vec<String>, StoreError> {
        if !valid_part(scope) {
            return Err(StoreError::InvalidName(scope.to_string()));
        }
        let dir = self.root.join(scope);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    name: scope.to_string(),
                    source,
                })
            }
        };

        let mut names = Vec::new();
        loop {
            let entry = entries.next_entry().await.map_err(|source| StoreError::Io {
                name: scope.to_string(),
                source,
            })?;
            let Some(entry) = entry else { break };
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use medview_core::{LayoutPreset, Monitor};

    fn snapshot() -> LayoutSnapshot {
        let layout = LayoutPreset::Quad
            .build(vec![Monitor::new(0, 0, 0, 1920, 1080).as_primary()])
            .unwrap();
        LayoutSnapshot::capture(&layout).unwrap()
    }

    #[tokio::test]
    async fn test_save_then_load_returns_identical_bytes() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let store = FileLayoutStore::new(dir.path());
        let saved = snapshot();

        // Act
        store.save("reading-room", &saved).await.unwrap();
        let loaded = store.load("reading-room").await.unwrap();

        // Assert
        assert_eq!(loaded.as_bytes(), saved.as_bytes());
        assert!(dir.path().join("default").join("reading-room.json").exists());
    }

    #[tokio::test]
    async fn test_load_unknown_name_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLayoutStore::new(dir.path());

        let result = store.load("nothing-here").await;

        assert!(matches!(result, Err(StoreError::NotFound(name)) if name == "nothing-here"));
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_scoped() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let store = FileLayoutStore::new(dir.path());
        for name in ["dr-smith/zeta", "dr-smith/alpha", "shared"] {
            store.save(name, &snapshot()).await.unwrap();
        }

        // Act
        let scoped = store.list("dr-smith").await.unwrap();
        let default = store.list(DEFAULT_SCOPE).await.unwrap();
        let empty = store.list("nobody").await.unwrap();

        // Assert
        assert_eq!(scoped, vec!["alpha", "zeta"]);
        assert_eq!(default, vec!["shared"]);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_names_that_escape_the_root_are_rejected() {
        let store = FileLayoutStore::new("/tmp/layouts");

        for bad in ["../etc/passwd", "a/../b", "", "scope/", "/abs", "a/b/c", ".hidden"] {
            assert!(
                matches!(store.path_for(bad), Err(StoreError::InvalidName(_))),
                "'{bad}' must be rejected"
            );
        }
        assert_eq!(
            store.path_for("team/chest ct").unwrap(),
            PathBuf::from("/tmp/layouts/team/chest ct.json")
        );
    }
}
