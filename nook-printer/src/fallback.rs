//! Local fallback for undeliverable print data
//!
//! When no printer can be reached the encoded stream is written to a
//! timestamped file so an operator can recover it and reprint by hand
//! (e.g. `cat receipt-*.bin > /dev/ttyUSB0`).

use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{info, instrument};

/// Directory of `receipt-<timestamp>.bin` files
#[derive(Debug, Clone)]
pub struct FallbackStore {
    dir: PathBuf,
}

impl FallbackStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist `data`, returning the file written
    #[instrument(skip(self, data), fields(dir = %self.dir.display(), data_len = data.len()))]
    pub async fn persist(&self, data: &[u8]) -> io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let stamp = Utc::now().format("%Y%m%d-%H%M%S%3f").to_string();
        let mut suffix = 0u32;
        loop {
            let name = if suffix == 0 {
                format!("receipt-{}.bin", stamp)
            } else {
                format!("receipt-{}-{}.bin", stamp, suffix)
            };
            let path = self.dir.join(name);

            let opened = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;

            match opened {
                Ok(mut file) => {
                    use tokio::io::AsyncWriteExt;
                    file.write_all(data).await?;
                    file.flush().await?;
                    info!(path = %path.display(), "Print data saved to fallback file");
                    return Ok(path);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => suffix += 1,
                Err(e) => return Err(e),
            }
        }
    }

    /// Fallback files currently on disk, oldest first
    pub async fn list(&self) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(e),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("receipt-") && name.ends_with(".bin") {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_persist_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = FallbackStore::new(dir.path().join("fallback"));

        assert!(store.list().await.unwrap().is_empty());

        let first = store.persist(b"\x1b@hello").await.unwrap();
        let second = store.persist(b"\x1b@world").await.unwrap();
        assert_ne!(first, second);

        let files = store.list().await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(std::fs::read(&first).unwrap(), b"\x1b@hello");
        assert_eq!(std::fs::read(&second).unwrap(), b"\x1b@world");
    }
}
