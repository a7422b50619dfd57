use crate::client::InMemoryStore;
use crate::core::{DashboardError, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{Level, event};

/// A json-server style `db.json` file backing an [`InMemoryStore`].
///
/// Saves go through a temporary file in the same directory that is renamed
/// over the target, so a crash never leaves a truncated document.
#[derive(Debug)]
pub struct DbFile {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl DbFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the document; a missing file yields an empty store.
    pub fn load(&self) -> Result<InMemoryStore> {
        if !self.path.exists() {
            event!(Level::INFO, path = %self.path.display(), "db file missing, starting empty");
            return Ok(InMemoryStore::new());
        }
        let raw = std::fs::read_to_string(&self.path).map_err(|e| self.io_error("read", e))?;
        let document = serde_json::from_str(&raw).map_err(|e| {
            DashboardError::InvalidInput(format!("{}: {e}", self.path.display()))
        })?;
        InMemoryStore::from_json(document)
    }

    /// Snapshot and write happen under one lock, so concurrent saves land in
    /// the order their snapshots were taken.
    pub fn save(&self, store: &InMemoryStore) -> Result<()> {
        let _guard = self.write_lock.lock()?;
        let document = store.snapshot()?;
        let body = serde_json::to_vec_pretty(&document)
            .map_err(|e| DashboardError::InvalidInput(e.to_string()))?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut file = tempfile::NamedTempFile::new_in(&dir).map_err(|e| self.io_error("create temp", e))?;
        file.write_all(&body).map_err(|e| self.io_error("write", e))?;
        file.as_file().sync_all().map_err(|e| self.io_error("sync", e))?;
        file.persist(&self.path)
            .map_err(|e| self.io_error("persist", e.error))?;
        event!(Level::DEBUG, path = %self.path.display(), bytes = body.len(), "db file saved");
        Ok(())
    }

    fn io_error(&self, action: &str, err: std::io::Error) -> DashboardError {
        DashboardError::Io(format!("{action} {}: {err}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ResourceStore;
    use crate::record;

    #[tokio::test]
    async fn save_then_load_restores_every_collection() {
        let dir = tempfile::tempdir().unwrap();
        let db = DbFile::new(dir.path().join("db.json"));

        let store = db.load().unwrap();
        assert!(store.collection_names().unwrap().is_empty());

        store
            .create("classes", record!({ "libelle": "L1 Info" }))
            .await
            .unwrap();
        db.save(&store).unwrap();

        let reloaded = db.load().unwrap();
        let classes = reloaded.fetch_collection("classes").await.unwrap();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].get_str("id"), Some("1"));
    }

    #[test]
    fn malformed_document_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(DbFile::new(path).load().is_err());
    }
}
