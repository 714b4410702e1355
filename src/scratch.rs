//! Scoped temporary files.
//!
//! Every file handed out by [`ScratchDir`] is removed when its handle drops,
//! on success and error paths alike. The directory itself goes away with
//! the last handle to it.

use crate::error::{Result, SqueezeError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

#[derive(Debug, Clone)]
pub struct ScratchDir {
    dir: Arc<TempDir>,
    counter: Arc<AtomicUsize>,
}

impl ScratchDir {
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("squeeze-box-").tempdir()?;
        Ok(Self {
            dir: Arc::new(dir),
            counter: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Deletes the directory now if this is the last handle to it.
    pub fn close(self) -> Result<()> {
        match Arc::try_unwrap(self.dir) {
            Ok(dir) => dir.close().map_err(SqueezeError::Cleanup),
            Err(_) => Ok(()),
        }
    }

    /// Reserves a unique path with the given extension. Nothing is created
    /// on disk until the caller writes to it.
    pub fn reserve(&self, extension: &str) -> ScratchFile {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        ScratchFile {
            path: self.dir.path().join(format!("scratch-{}.{}", n, extension)),
            _dir: Arc::clone(&self.dir),
        }
    }
}

/// Handle to one scratch path, released on drop
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    _dir: Arc<TempDir>,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        fs::write(&self.path, bytes)?;
        Ok(())
    }

    pub fn read(&self) -> Result<Vec<u8>> {
        Ok(fs::read(&self.path)?)
    }

    /// Releases the file now. Releasing a file that is already gone is not
    /// an error.
    pub fn release(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if is_benign_release_error(&e) => {
                tracing::debug!(path = %self.path.display(), "scratch file already released");
                Ok(())
            }
            Err(e) => Err(SqueezeError::Cleanup(e)),
        }
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release scratch file");
        }
    }
}

/// Whether an I/O error only reports that a resource was already released.
pub fn is_benign_release_error(error: &io::Error) -> bool {
    error.kind() == io::ErrorKind::NotFound
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_file_removed_on_drop() {
        let scratch = ScratchDir::new().unwrap();
        let path = {
            let file = scratch.reserve("png");
            file.write(b"data").unwrap();
            assert_eq!(file.read().unwrap(), b"data");
            file.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_double_release_is_benign() {
        let scratch = ScratchDir::new().unwrap();
        let file = scratch.reserve("bin");
        file.write(b"x").unwrap();
        file.release().unwrap();
        file.release().unwrap();
    }

    #[test]
    fn test_reserved_paths_are_unique() {
        let scratch = ScratchDir::new().unwrap();
        let a = scratch.reserve("png");
        let b = scratch.reserve("png");
        assert_ne!(a.path(), b.path());
        assert!(a.path().starts_with(scratch.path()));
    }

    #[test]
    fn test_directory_outlives_dir_handle() {
        let file = {
            let scratch = ScratchDir::new().unwrap();
            scratch.reserve("png")
        };
        file.write(b"still here").unwrap();
        assert!(file.path().exists());
    }

    #[test]
    fn test_close_removes_directory() {
        let scratch = ScratchDir::new().unwrap();
        let path = scratch.path().to_path_buf();
        scratch.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_benign_release_error() {
        assert!(is_benign_release_error(&io::Error::from(io::ErrorKind::NotFound)));
        assert!(!is_benign_release_error(&io::Error::from(
            io::ErrorKind::PermissionDenied
        )));
    }
}
