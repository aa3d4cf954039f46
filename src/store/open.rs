//! store/open — создание, открытие (recovery), закрытие и удаление хранилища.
//!
//! Создание и открытие — разные операции: create() на существующем файле даёт
//! AlreadyExists, open() на отсутствующем — FileNotFound.

use log::info;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::index::RowIndex;
use crate::lock::{lock_file_path, try_lock_store};
use crate::pager::{PageStore, WriteInterceptor};
use crate::recovery::RecoveryManager;

use super::core::Store;

impl Store {
    /// Создать новое пустое хранилище. Файл становится открываемым после первого sync,
    /// который выполняется здесь же.
    pub fn create(path: &Path, cfg: StoreConfig) -> Result<Self> {
        Self::create_with_interceptor(path, cfg, None)
    }

    pub fn create_with_interceptor(
        path: &Path,
        cfg: StoreConfig,
        interceptor: Option<Box<dyn WriteInterceptor>>,
    ) -> Result<Self> {
        let store = PageStore::create(path, &cfg, interceptor)?;
        let mut index = RowIndex::create(store, &cfg)?;
        index.store_mut().sync()?;
        Ok(Self {
            path: path.to_path_buf(),
            cfg,
            index,
        })
    }

    /// Открыть существующее хранилище через RecoveryManager.
    pub fn open(path: &Path, cfg: StoreConfig) -> Result<Self> {
        Self::open_with_interceptor(path, cfg, None)
    }

    pub fn open_with_interceptor(
        path: &Path,
        cfg: StoreConfig,
        interceptor: Option<Box<dyn WriteInterceptor>>,
    ) -> Result<Self> {
        let mut rm = RecoveryManager::new(path, cfg.clone());
        let rec = rm.run(interceptor)?;
        let index = RowIndex::attach(rec.store, &cfg, rec.space, rec.scan.rows)?;
        Ok(Self {
            path: path.to_path_buf(),
            cfg,
            index,
        })
    }

    /// sync + освобождение файла и блокировки. Дальнейшие операции — FileNotFound.
    pub fn close(&mut self) -> Result<()> {
        self.index.store_mut().close()
    }

    /// Удалить файл хранилища и его lock-файл (путь перестроения индексатора).
    /// Открытое кем-то хранилище не удаляется: Locked.
    pub fn destroy(path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(StoreError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        {
            let _guard = try_lock_store(path)?;
            fs::remove_file(path)?;
        }
        match fs::remove_file(lock_file_path(path)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        info!("store: destroyed {}", path.display());
        Ok(())
    }
}
