//! error — типизированная таксономия ошибок движка.
//!
//! Все слои (pager, codec, index, recovery) возвращают `StoreError`; внутри движка
//! ничего не ретраится и не проглатывается. Политика "удалить и перестроить"
//! принадлежит индексатору: см. `StoreError::is_rebuild_required`.

use std::path::PathBuf;

use thiserror::Error;

/// Page number type used across the engine (page 0 is the file header).
pub type PageNumber = u64;

#[derive(Error, Debug)]
pub enum StoreError {
    /// A page, row or decompressed payload failed integrity validation.
    #[error("store file corrupted{}: {reason}", fmt_page(.page))]
    FileCorrupted {
        page: Option<PageNumber>,
        reason: String,
    },

    /// Delete of a key that is not present (indexer/index desynchronization).
    #[error("row not found when deleting key {}", fmt_key(.key))]
    RowNotFoundWhenDeleting { key: Vec<u8> },

    /// On-disk format version is not in the supported set.
    #[error("unsupported store format version {found} (supported: {supported:?})")]
    FileVersionError { found: u32, supported: &'static [u32] },

    /// Store file is missing or its handle has been released.
    #[error("store file not found: {}", .path.display())]
    FileNotFound { path: PathBuf },

    /// Row payload could not be encoded within format constraints.
    #[error("compression error: {reason}")]
    CompressionError { reason: String },

    #[error("store already exists at {}", .path.display())]
    AlreadyExists { path: PathBuf },

    #[error("store is locked by another writer: {}", .path.display())]
    Locked { path: PathBuf },

    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange {
        page: PageNumber,
        page_count: u64,
    },

    #[error("page {page} still holds {items} live item(s)")]
    PageStillReferenced { page: PageNumber, items: u32 },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Raised by the power-off fault injector; the store is dead afterwards.
    #[error("simulated power-off during write of page {page}")]
    PowerOff { page: PageNumber },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub fn corrupted(page: PageNumber, reason: impl Into<String>) -> Self {
        StoreError::FileCorrupted {
            page: Some(page),
            reason: reason.into(),
        }
    }

    /// Corruption detected without page context (codec level).
    pub fn corrupted_row(reason: impl Into<String>) -> Self {
        StoreError::FileCorrupted {
            page: None,
            reason: reason.into(),
        }
    }

    /// Attach a page number to a FileCorrupted error that has none yet.
    pub fn at_page(self, pid: PageNumber) -> Self {
        match self {
            StoreError::FileCorrupted { page: None, reason } => StoreError::FileCorrupted {
                page: Some(pid),
                reason,
            },
            other => other,
        }
    }

    /// Corruption and version skew are only recoverable by deleting the store and reindexing.
    pub fn is_rebuild_required(&self) -> bool {
        matches!(
            self,
            StoreError::FileCorrupted { .. } | StoreError::FileVersionError { .. }
        )
    }

    pub fn is_corrupted(&self) -> bool {
        matches!(self, StoreError::FileCorrupted { .. })
    }
}

fn fmt_page(page: &Option<PageNumber>) -> String {
    match page {
        Some(p) => format!(" (page {})", p),
        None => String::new(),
    }
}

fn fmt_key(key: &[u8]) -> String {
    match std::str::from_utf8(key) {
        Ok(s) => format!("{:?}", s),
        Err(_) => format!("(binary {} B)", key.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_page_fills_missing_context_only() {
        let e = StoreError::corrupted_row("crc mismatch").at_page(7);
        match e {
            StoreError::FileCorrupted { page, .. } => assert_eq!(page, Some(7)),
            other => panic!("unexpected {other:?}"),
        }

        let e = StoreError::corrupted(3, "bad magic").at_page(9);
        match e {
            StoreError::FileCorrupted { page, .. } => assert_eq!(page, Some(3)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rebuild_classification() {
        assert!(StoreError::corrupted(1, "x").is_rebuild_required());
        assert!(StoreError::FileVersionError {
            found: 9,
            supported: &[1]
        }
        .is_rebuild_required());
        assert!(!StoreError::RowNotFoundWhenDeleting { key: b"k".to_vec() }.is_rebuild_required());
        assert!(!StoreError::CompressionError {
            reason: "too big".into()
        }
        .is_rebuild_required());
    }

    #[test]
    fn messages_carry_context() {
        let msg = StoreError::corrupted(42, "checksum mismatch").to_string();
        assert!(msg.contains("page 42"), "{msg}");
        let msg = StoreError::RowNotFoundWhenDeleting {
            key: b"sym:1".to_vec(),
        }
        .to_string();
        assert!(msg.contains("sym:1"), "{msg}");
    }
}
