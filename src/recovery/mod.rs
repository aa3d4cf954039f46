//! recovery — автомат открытия хранилища.
//!
//! Closed -> HeaderValidated -> ScanningPages -> Ready, из любого состояния -> Failed.
//!
//! - Closed -> HeaderValidated: конфиг валиден, файл существует, magic, версия (до разбора любых
//!   страниц), page size, CRC заголовка, длина файла согласована с page_count;
//! - HeaderValidated -> ScanningPages: dirty-заголовок (обрыв между двумя sync) —
//!   FileCorrupted, если не задан allow_unclean_open; загрузка free-листа;
//! - ScanningPages -> Ready: полный скан (scan.rs); store и отчёт передаются RowIndex.
//!
//! Store, не дошедший до Ready, отпускается без sync: заголовок на диске не трогается.

pub mod scan;

use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::StoreConfig;
use crate::error::{PageNumber, Result, StoreError};
use crate::pager::{PageStore, WriteInterceptor};

pub use scan::{scan_store, ScanOutcome, ScanReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecoveryState {
    Closed,
    HeaderValidated,
    ScanningPages,
    Ready,
    Failed,
}

impl std::fmt::Display for RecoveryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecoveryState::Closed => "closed",
            RecoveryState::HeaderValidated => "header-validated",
            RecoveryState::ScanningPages => "scanning-pages",
            RecoveryState::Ready => "ready",
            RecoveryState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Результат успешного recovery.
#[derive(Debug)]
pub struct Recovered {
    pub store: PageStore,
    pub scan: ScanReport,
    pub space: BTreeMap<PageNumber, usize>,
}

#[derive(Debug)]
pub struct RecoveryManager {
    path: PathBuf,
    cfg: StoreConfig,
    state: RecoveryState,
}

impl RecoveryManager {
    pub fn new(path: &Path, cfg: StoreConfig) -> Self {
        Self {
            path: path.to_path_buf(),
            cfg,
            state: RecoveryState::Closed,
        }
    }

    #[inline]
    pub fn state(&self) -> RecoveryState {
        self.state
    }

    fn transition(&mut self, to: RecoveryState) {
        debug!(
            "recovery: {}: {} -> {}",
            self.path.display(),
            self.state,
            to
        );
        self.state = to;
    }

    /// Провести открытие. Повторный запуск того же менеджера — InvalidState.
    pub fn run(&mut self, interceptor: Option<Box<dyn WriteInterceptor>>) -> Result<Recovered> {
        if self.state != RecoveryState::Closed {
            return Err(StoreError::InvalidState(format!(
                "recovery already ran (state {})",
                self.state
            )));
        }
        match self.run_inner(interceptor) {
            Ok(r) => {
                self.transition(RecoveryState::Ready);
                info!(
                    "recovery: opened {} ({} page(s), {} row(s), {} free, generation {})",
                    self.path.display(),
                    r.scan.page_count,
                    r.scan.rows,
                    r.scan.free_pages,
                    r.scan.generation
                );
                Ok(r)
            }
            Err(e) => {
                warn!("recovery: {} failed in state {}: {}", self.path.display(), self.state, e);
                self.transition(RecoveryState::Failed);
                Err(e)
            }
        }
    }

    fn run_inner(&mut self, interceptor: Option<Box<dyn WriteInterceptor>>) -> Result<Recovered> {
        // Те же правила, что и при create; page size всё равно берётся из заголовка.
        self.cfg.validate()?;
        let mut store = PageStore::open(&self.path, &self.cfg, interceptor)?;
        match self.validate(&mut store) {
            Ok(outcome) => Ok(Recovered {
                store,
                scan: outcome.report,
                space: outcome.space,
            }),
            Err(e) => {
                store.release();
                Err(e)
            }
        }
    }

    fn validate(&mut self, store: &mut PageStore) -> Result<ScanOutcome> {
        let clean = store.header().clean;
        let salvage = !clean && self.cfg.allow_unclean_open;

        let expected = store.header().file_len();
        let len = store.file_len()?;
        if len < expected {
            return Err(StoreError::corrupted(
                len / store.page_size() as u64,
                format!("file is {} byte(s), header expects {}", len, expected),
            ));
        }
        if len > expected {
            if !salvage {
                return Err(StoreError::corrupted(
                    store.page_count(),
                    format!("file is {} byte(s), header expects {}", len, expected),
                ));
            }
            store.truncate_tail()?;
        }
        self.transition(RecoveryState::HeaderValidated);

        if !clean {
            if !self.cfg.allow_unclean_open {
                return Err(StoreError::corrupted(
                    0,
                    "store was not shut down cleanly (dirty header)",
                ));
            }
            warn!(
                "recovery: {} has a dirty header, scanning anyway (allow_unclean_open)",
                self.path.display()
            );
        }
        self.transition(RecoveryState::ScanningPages);

        store.load_free_list()?;
        scan_store(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_fails_from_closed() {
        let path = std::env::temp_dir().join(format!(
            "qix-recovery-missing-{}.qix",
            std::process::id()
        ));
        let mut rm = RecoveryManager::new(&path, StoreConfig::default());
        assert_eq!(rm.state(), RecoveryState::Closed);
        assert!(matches!(rm.run(None), Err(StoreError::FileNotFound { .. })));
        assert_eq!(rm.state(), RecoveryState::Failed);
        assert_eq!(rm.state().to_string(), "failed");
    }
}
