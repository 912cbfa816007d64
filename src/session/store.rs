//! Append-only per-session byte spool.
//!
//! One spool file per open session, addressable solely by session id. The
//! store owns the bytes from the moment a chunk is accepted until the spool
//! is removed on cancel or successful finalize.

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::debug;

const SPOOL_EXT: &str = "spool";

pub struct ChunkStore {
    path: PathBuf,
    file: Option<File>,
    len: u64,
}

impl ChunkStore {
    /// Path of the spool backing a given session id.
    pub fn spool_path(dir: &Path, session_id: &str) -> PathBuf {
        dir.join(format!("{session_id}.{SPOOL_EXT}"))
    }

    /// Create an empty spool for a fresh session.
    pub async fn create(dir: &Path, session_id: &str) -> io::Result<Self> {
        let path = Self::spool_path(dir, session_id);
        let file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(&path)
            .await?;
        debug!("Created spool {:?}", path);
        Ok(Self {
            path,
            file: Some(file),
            len: 0,
        })
    }

    /// Append accepted chunk bytes. On a write failure the spool is
    /// truncated back to its last known-good length so a rejected append
    /// never leaves partial bytes behind.
    pub async fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        let file = self.handle()?;
        if let Err(err) = write_fully(file, bytes).await {
            let _ = file.set_len(self.len).await;
            return Err(err);
        }
        self.len += bytes.len() as u64;
        Ok(())
    }

    /// Read back the full assembled byte sequence in acceptance order.
    pub async fn assembled(&mut self) -> io::Result<Vec<u8>> {
        let len = self.len as usize;
        let file = self.handle()?;
        file.seek(SeekFrom::Start(0)).await?;
        let mut bytes = Vec::with_capacity(len);
        file.read_to_end(&mut bytes).await?;
        file.seek(SeekFrom::End(0)).await?;
        Ok(bytes)
    }

    /// Drop the handle and delete the spool file. A spool that is already
    /// gone is not an error.
    pub async fn remove(&mut self) -> io::Result<()> {
        self.file = None;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!("Removed spool {:?}", self.path);
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn handle(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "spool already removed"))
    }
}

async fn write_fully(file: &mut File, bytes: &[u8]) -> io::Result<()> {
    file.write_all(bytes).await?;
    file.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_append_and_assemble_in_order() {
        let dir = TempDir::new().unwrap();
        let mut store = ChunkStore::create(dir.path(), "abc").await.unwrap();

        store.append(b"one").await.unwrap();
        store.append(b"-two").await.unwrap();
        store.append(b"-three").await.unwrap();

        assert_eq!(store.len(), 13);
        assert_eq!(store.assembled().await.unwrap(), b"one-two-three");

        // A read must not disturb subsequent appends.
        store.append(b"!").await.unwrap();
        assert_eq!(store.assembled().await.unwrap(), b"one-two-three!");
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut store = ChunkStore::create(dir.path(), "gone").await.unwrap();
        let path = store.path().to_path_buf();

        store.append(b"bytes").await.unwrap();
        store.remove().await.unwrap();
        assert!(!path.exists());
        store.remove().await.unwrap();
    }

    #[tokio::test]
    async fn test_create_refuses_duplicate_id() {
        let dir = TempDir::new().unwrap();
        let _store = ChunkStore::create(dir.path(), "dup").await.unwrap();
        assert!(ChunkStore::create(dir.path(), "dup").await.is_err());
    }
}
