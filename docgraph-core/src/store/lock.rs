use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use crate::error::StoreError;

/// Exclusive writer lock on a storage directory.
///
/// Held for the lifetime of the owning store and released on drop. The OS
/// drops the advisory lock if the process dies, so there are no stale locks
/// to clean up.
#[derive(Debug)]
pub struct WriterLock {
    file: File,
    path: PathBuf,
}

impl WriterLock {
    /// Try to take the lock without blocking.
    pub fn acquire(path: &Path) -> Result<Self, StoreError> {
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;

        if FileExt::try_lock_exclusive(&file).is_err() {
            return Err(StoreError::LockContention {
                path: path.to_path_buf(),
            });
        }

        // Owner pid for operators inspecting the directory; not used for locking.
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        file.flush()?;

        debug!(path = %path.display(), "Acquired writer lock");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        debug!(path = %self.path.display(), "Released writer lock");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_writer_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".docgraph.lock");

        let first = WriterLock::acquire(&path).unwrap();
        let err = WriterLock::acquire(&path).unwrap_err();
        assert!(matches!(err, StoreError::LockContention { .. }));

        drop(first);
        WriterLock::acquire(&path).unwrap();
    }
}
