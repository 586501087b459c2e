//! Destination file: preallocation, positional writes, and cleanup.
//!
//! [`FileSink::prepare`] sizes the file before any chunk runs, so every write
//! lands inside the existing extent and nobody ever extends the file
//! concurrently. Writes go through positional I/O (`pwrite` on Unix,
//! `seek_write` on Windows) which never touches a shared cursor; together with
//! the planner's disjoint ranges that makes the handle safe to share without
//! a lock.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use super::FetchError;

/// Shared, preallocated destination file.
#[derive(Debug)]
pub struct FileSink {
    file: Arc<File>,
    path: PathBuf,
    len: u64,
}

impl FileSink {
    /// Creates (truncating any existing file) and sizes the destination.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Preparation`] if the file cannot be created or
    /// resized. The handle is closed before returning, so the caller's cleanup
    /// can delete whatever was left behind.
    #[instrument(fields(path = %path.display()))]
    pub async fn prepare(path: &Path, size: u64) -> Result<Self, FetchError> {
        let file = tokio::fs::File::create(path)
            .await
            .map_err(|e| FetchError::preparation(path, e))?;

        if let Err(e) = file.set_len(size).await {
            drop(file);
            return Err(FetchError::preparation(path, e));
        }

        debug!(size, "destination preallocated");

        Ok(Self {
            file: Arc::new(file.into_std().await),
            path: path.to_path_buf(),
            len: size,
        })
    }

    /// Destination path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Preallocated length in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// True for a zero-byte destination.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Writes all of `data` starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the span falls outside the preallocated
    /// extent, or the underlying write error.
    pub async fn write_at(&self, offset: u64, data: Vec<u8>) -> io::Result<()> {
        let end = offset
            .checked_add(data.len() as u64)
            .filter(|end| *end <= self.len)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "write of {} bytes at offset {offset} exceeds file length {}",
                        data.len(),
                        self.len
                    ),
                )
            })?;

        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || write_all_at(&file, &data, offset))
            .await
            .map_err(io::Error::other)??;

        debug!(offset, end, "span written");
        Ok(())
    }

    /// Flushes file data and metadata to disk.
    ///
    /// # Errors
    ///
    /// Returns the underlying `fsync` error.
    pub async fn sync(&self) -> io::Result<()> {
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || file.sync_all())
            .await
            .map_err(io::Error::other)?
    }
}

#[cfg(unix)]
fn write_all_at(file: &File, data: &[u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(data, offset)
}

#[cfg(windows)]
fn write_all_at(file: &File, mut data: &[u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !data.is_empty() {
        match file.seek_write(data, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "failed to write whole buffer",
                ));
            }
            Ok(n) => {
                data = &data[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Deletes a partially written destination.
///
/// Safe to call whether or not the file exists. Failures are logged and
/// swallowed so cleanup never masks the error that triggered it. Returns
/// `true` if a file was removed.
pub async fn remove_partial(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            info!(path = %path.display(), "removed partially downloaded file");
            true
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "nothing to clean up");
            false
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to remove partially downloaded file");
            false
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_prepare_creates_file_of_exact_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.bin");

        let sink = FileSink::prepare(&path, 4096).await.unwrap();

        assert_eq!(sink.len(), 4096);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 4096);
    }

    #[tokio::test]
    async fn test_prepare_truncates_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.bin");
        std::fs::write(&path, vec![7u8; 100]).unwrap();

        let _sink = FileSink::prepare(&path, 10).await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), vec![0u8; 10]);
    }

    #[tokio::test]
    async fn test_prepare_zero_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.bin");

        let sink = FileSink::prepare(&path, 0).await.unwrap();

        assert!(sink.is_empty());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_prepare_missing_parent_is_preparation_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("no-such-dir").join("out.bin");

        let result = FileSink::prepare(&path, 10).await;

        assert!(matches!(result, Err(FetchError::Preparation { .. })));
    }

    #[tokio::test]
    async fn test_write_at_disjoint_offsets_out_of_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.bin");
        let sink = FileSink::prepare(&path, 9).await.unwrap();

        sink.write_at(6, b"ghi".to_vec()).await.unwrap();
        sink.write_at(0, b"abc".to_vec()).await.unwrap();
        sink.write_at(3, b"def".to_vec()).await.unwrap();
        sink.sync().await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"abcdefghi");
    }

    #[tokio::test]
    async fn test_write_at_concurrent_tasks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.bin");
        let sink = Arc::new(FileSink::prepare(&path, 256).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..16u8 {
            let sink = Arc::clone(&sink);
            handles.push(tokio::spawn(async move {
                sink.write_at(u64::from(i) * 16, vec![i; 16]).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let contents = std::fs::read(&path).unwrap();
        for (i, block) in contents.chunks(16).enumerate() {
            assert!(block.iter().all(|b| usize::from(*b) == i), "block {i} corrupted");
        }
    }

    #[tokio::test]
    async fn test_write_at_beyond_extent_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.bin");
        let sink = FileSink::prepare(&path, 4).await.unwrap();

        let err = sink.write_at(2, b"xyz".to_vec()).await.unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_remove_partial_existing_and_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.bin");
        std::fs::write(&path, b"partial").unwrap();

        assert!(remove_partial(&path).await);
        assert!(!path.exists());
        assert!(!remove_partial(&path).await);
    }
}
