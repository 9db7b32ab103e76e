//! On-disk layout of logged commands
//!
//! ```text
//! <root>/<session>/<sha1(command)>.log   raw output, overwritten
//! <root>/<session>/index                 one command per line, appended
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::digest::log_file_name;
use crate::{Error, Result};

pub const INDEX_FILE_NAME: &str = "index";

/// Writes log artifacts below a log root.
///
/// Writes for one session are serialized; different sessions proceed in parallel.
pub struct SessionStore {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session_dir(&self, session: &str) -> PathBuf {
        self.root.join(session)
    }

    /// Create the log root if absent
    pub fn ensure_root(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root).map_err(|source| Error::Persistence {
            path: self.root.clone(),
            source,
        })
    }

    /// Create the session directory if absent. Racing creators all succeed.
    pub async fn ensure_session(&self, session: &str) -> Result<PathBuf> {
        let dir = self.session_dir(session);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| Error::Persistence {
                path: dir.clone(),
                source,
            })?;
        Ok(dir)
    }

    /// Write `output` to the command's log file and record a non-empty command in the index.
    ///
    /// Returns the log file path.
    pub async fn persist(&self, session: &str, command: &[u8], output: &[u8]) -> Result<PathBuf> {
        let lock = self.session_lock(session);
        let guard = lock.lock().await;
        let result = self.write_artifacts(session, command, output).await;
        drop(guard);
        self.release_lock(session, lock);
        result
    }

    async fn write_artifacts(&self, session: &str, command: &[u8], output: &[u8]) -> Result<PathBuf> {
        let dir = self.session_dir(session);
        let log_path = dir.join(log_file_name(command));
        tokio::fs::write(&log_path, output)
            .await
            .map_err(|source| Error::Persistence {
                path: log_path.clone(),
                source,
            })?;
        debug!("Wrote {} bytes to {}", output.len(), log_path.display());

        if !command.is_empty() {
            let index_path = dir.join(INDEX_FILE_NAME);
            append_index(&index_path, command)
                .await
                .map_err(|source| Error::Persistence {
                    path: index_path,
                    source,
                })?;
        }

        Ok(log_path)
    }

    fn session_lock(&self, session: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(session.to_string()).or_default().clone()
    }

    /// Forget a session's lock once no other writer holds or waits on it
    fn release_lock(&self, session: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // One reference in the map, one here
        if Arc::strong_count(&lock) == 2 {
            locks.remove(session);
        }
    }

    #[cfg(test)]
    fn tracked_sessions(&self) -> usize {
        self.locks.lock().unwrap().len()
    }
}

async fn append_index(path: &Path, command: &[u8]) -> std::io::Result<()> {
    let mut entry = Vec::with_capacity(command.len() + 1);
    entry.extend_from_slice(command);
    entry.push(b'\n');

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(&entry).await?;
    file.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::content_hash;

    #[tokio::test]
    async fn test_persist_writes_log_and_index() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        store.ensure_session("main").await.unwrap();

        let path = store.persist("main", b"ls -la", b"hello\n").await.unwrap();
        assert_eq!(path, dir.path().join("main").join(format!("{}.log", content_hash(b"ls -la"))));
        assert_eq!(std::fs::read(&path).unwrap(), b"hello\n");

        let index = std::fs::read_to_string(dir.path().join("main").join(INDEX_FILE_NAME)).unwrap();
        assert_eq!(index, "ls -la\n");
        assert_eq!(store.tracked_sessions(), 0);
    }

    #[tokio::test]
    async fn test_failed_write_releases_lock() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());

        // Session directory never created
        let err = store.persist("absent", b"ls", b"x").await.unwrap_err();
        assert!(matches!(err, Error::Persistence { .. }));
        assert_eq!(store.tracked_sessions(), 0);
    }

    #[tokio::test]
    async fn test_empty_command_skips_index() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        store.ensure_session("main").await.unwrap();

        let path = store.persist("main", b"", b"output").await.unwrap();
        assert!(path.ends_with(format!("{}.log", content_hash(b""))));
        assert!(!dir.path().join("main").join(INDEX_FILE_NAME).exists());
    }

    #[tokio::test]
    async fn test_repeat_command_overwrites_log_appends_index() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        store.ensure_session("s").await.unwrap();

        store.persist("s", b"date", b"monday\n").await.unwrap();
        let path = store.persist("s", b"date", b"tue\n").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"tue\n");

        let index = std::fs::read_to_string(dir.path().join("s").join(INDEX_FILE_NAME)).unwrap();
        assert_eq!(index, "date\ndate\n");
    }

    #[tokio::test]
    async fn test_concurrent_writers_same_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SessionStore::new(dir.path()));

        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.ensure_session("shared").await.unwrap();
                let command = format!("echo {}", i);
                store.persist("shared", command.as_bytes(), b"x\n").await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.tracked_sessions(), 0);

        let index = std::fs::read_to_string(dir.path().join("shared").join(INDEX_FILE_NAME)).unwrap();
        let mut lines: Vec<&str> = index.lines().collect();
        lines.sort();
        let mut expected: Vec<String> = (0..32).map(|i| format!("echo {}", i)).collect();
        expected.sort();
        assert_eq!(lines, expected);
    }

    #[test]
    fn test_ensure_root_creates_nested() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("a").join("b"));
        store.ensure_root().unwrap();
        assert!(store.root().is_dir());
    }
}
