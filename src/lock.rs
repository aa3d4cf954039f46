//! File-based locking for single-writer safety.
//!
//! Cross-platform (fs2) advisory lock on `<store file>.lock`.
//! Only the non-blocking form is used: a second writer fails fast with `Locked`
//! instead of waiting. Lock is released on Drop; the lock file itself stays.

use fs2::FileExt;
use std::ffi::OsString;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};

pub struct LockGuard {
    file: std::fs::File,
    path: PathBuf,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// `<store>.lock` next to the store file.
pub fn lock_file_path(store_path: &Path) -> PathBuf {
    let mut s: OsString = store_path.as_os_str().to_owned();
    s.push(".lock");
    PathBuf::from(s)
}

/// Try to take the exclusive writer lock. Never blocks.
pub fn try_lock_store(store_path: &Path) -> Result<LockGuard> {
    let path = lock_file_path(store_path);
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(&path)?;
    match file.try_lock_exclusive() {
        Ok(()) => Ok(LockGuard { file, path }),
        Err(e) if e.kind() == fs2::lock_contended_error().kind() => Err(StoreError::Locked {
            path: store_path.to_path_buf(),
        }),
        Err(e) => Err(StoreError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_path_appends_suffix() {
        assert_eq!(
            lock_file_path(Path::new("/tmp/index.qix")),
            PathBuf::from("/tmp/index.qix.lock")
        );
    }
}
