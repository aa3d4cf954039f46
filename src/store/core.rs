//! store/core — структура Store и базовые аксессоры.

use std::path::{Path, PathBuf};

use crate::config::{StoreBuilder, StoreConfig};
use crate::index::RowIndex;
use crate::pager::PageStore;

/// Handle to one store file: a validated PageStore wrapped by the row index.
///
/// Single writer: the file is locked while the handle is alive. `Store` is `Send`
/// but not internally synchronized; share it behind a `Mutex`.
pub struct Store {
    pub(crate) path: PathBuf,
    pub(crate) cfg: StoreConfig,
    pub(crate) index: RowIndex,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("rows", &self.index.len())
            .field("pages", &self.index.store().page_count())
            .field("closed", &self.index.store().is_closed())
            .finish()
    }
}

impl Store {
    /// Builder over `StoreConfig::from_env()`.
    pub fn builder() -> StoreBuilder {
        StoreBuilder::new()
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn config(&self) -> &StoreConfig {
        &self.cfg
    }

    /// Number of live rows.
    #[inline]
    pub fn len(&self) -> u64 {
        self.index.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[inline]
    pub fn page_store(&self) -> &PageStore {
        self.index.store()
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.index.store().is_closed()
    }
}
