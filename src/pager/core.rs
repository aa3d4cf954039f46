//! pager/core — ядро PageStore: структура, create()/open(), заголовок и грязное состояние.
//!
//! Жизненный цикл заголовка:
//! - create(): заголовок пишется сразу в состоянии dirty; Store доводит создание до sync();
//! - первая мутация после open()/sync() переводит заголовок в dirty (запись + fsync);
//! - sync()/close() сохраняют free-лист и пишут заголовок clean (generation += 1).
//!
//! Таким образом, любой обрыв между двумя sync() оставляет на диске dirty-заголовок.

use log::{debug, info, warn};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use crate::config::StoreConfig;
use crate::consts::HEADER_LEN;
use crate::error::{PageNumber, Result, StoreError};
use crate::free::FreeList;
use crate::lock::{try_lock_store, LockGuard};
use crate::meta::FileHeader;

use super::fault::WriteInterceptor;

/// Низкоуровневый менеджер страниц одного файла хранилища.
pub struct PageStore {
    pub(crate) path: PathBuf,
    pub(crate) file: Option<File>,
    pub(crate) lock: Option<LockGuard>,
    pub(crate) header: FileHeader,
    pub(crate) free: FreeList,
    // Trunk'и free-листа в том виде, как они лежат на диске после последнего sync/load.
    pub(crate) trunks: Vec<PageNumber>,
    pub(crate) data_fsync: bool,
    pub(crate) dirty_on_disk: bool,
    pub(crate) powered_off: Option<PageNumber>,
    pub(crate) interceptor: Option<Box<dyn WriteInterceptor>>,
}

impl std::fmt::Debug for PageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageStore")
            .field("path", &self.path)
            .field("open", &self.file.is_some())
            .field("header", &self.header)
            .field("free", &self.free.len())
            .field("powered_off", &self.powered_off)
            .finish()
    }
}

impl PageStore {
    /// Создать новый файл. Заголовок пишется dirty: хранилище считается готовым
    /// только после первого sync().
    pub fn create(
        path: &Path,
        cfg: &StoreConfig,
        interceptor: Option<Box<dyn WriteInterceptor>>,
    ) -> Result<Self> {
        cfg.validate()?;
        if path.exists() {
            return Err(StoreError::AlreadyExists {
                path: path.to_path_buf(),
            });
        }
        let lock = try_lock_store(path)?;
        let file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => StoreError::AlreadyExists {
                    path: path.to_path_buf(),
                },
                _ => StoreError::Io(e),
            })?;

        let mut header = FileHeader::new(cfg.page_size, cfg.codec);
        header.clean = false;
        let mut ps = Self {
            path: path.to_path_buf(),
            file: Some(file),
            lock: Some(lock),
            header,
            free: FreeList::new(),
            trunks: Vec::new(),
            data_fsync: cfg.data_fsync,
            dirty_on_disk: true,
            powered_off: None,
            interceptor,
        };
        ps.write_header()?;
        ps.sync_file()?;
        info!(
            "pager: created {} (page_size={}, codec={})",
            path.display(),
            cfg.page_size,
            cfg.codec
        );
        Ok(ps)
    }

    /// Открыть существующий файл и разобрать заголовок.
    /// Free-лист не загружается: это шаг recovery (см. `load_free_list`).
    pub fn open(
        path: &Path,
        cfg: &StoreConfig,
        interceptor: Option<Box<dyn WriteInterceptor>>,
    ) -> Result<Self> {
        if !path.exists() {
            return Err(StoreError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let lock = try_lock_store(path)?;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => StoreError::FileNotFound {
                    path: path.to_path_buf(),
                },
                _ => StoreError::Io(e),
            })?;

        let mut buf = [0u8; HEADER_LEN];
        file.read_exact(&mut buf).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => StoreError::corrupted(0, "file too short for header"),
            _ => StoreError::Io(e),
        })?;
        let header = FileHeader::decode(&buf)?;
        if header.page_size != cfg.page_size {
            debug!(
                "pager: {} uses page_size={} (config says {}), header wins",
                path.display(),
                header.page_size,
                cfg.page_size
            );
        }
        let dirty = !header.clean;
        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            lock: Some(lock),
            header,
            free: FreeList::new(),
            trunks: Vec::new(),
            data_fsync: cfg.data_fsync,
            dirty_on_disk: dirty,
            powered_off: None,
            interceptor,
        })
    }

    // ---------------- accessors ----------------

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    #[inline]
    pub fn page_size(&self) -> usize {
        self.header.page_size as usize
    }

    #[inline]
    pub fn page_count(&self) -> u64 {
        self.header.page_count
    }

    #[inline]
    pub fn free_count(&self) -> u64 {
        self.free.len()
    }

    #[inline]
    pub fn is_free(&self, pid: PageNumber) -> bool {
        self.free.contains(pid)
    }

    pub fn free_pages(&self) -> Vec<PageNumber> {
        self.free.iter().collect()
    }

    #[inline]
    pub fn root_dir_page(&self) -> PageNumber {
        self.header.root_dir_page
    }

    /// true пока с последнего sync() не было мутаций.
    #[inline]
    pub fn is_clean(&self) -> bool {
        !self.dirty_on_disk
    }

    #[inline]
    pub fn is_powered_off(&self) -> bool {
        self.powered_off.is_some()
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    pub fn set_data_fsync(&mut self, on: bool) {
        self.data_fsync = on;
    }

    pub fn file_len(&self) -> Result<u64> {
        Ok(self.live_file()?.metadata()?.len())
    }

    pub fn set_root_dir_page(&mut self, pid: PageNumber) -> Result<()> {
        self.check_live()?;
        self.mark_dirty()?;
        self.header.root_dir_page = pid;
        Ok(())
    }

    // ---------------- internal helpers ----------------

    /// PowerOff после сбоя; FileNotFound после close().
    pub(crate) fn check_live(&self) -> Result<()> {
        if let Some(page) = self.powered_off {
            return Err(StoreError::PowerOff { page });
        }
        if self.file.is_none() {
            return Err(StoreError::FileNotFound {
                path: self.path.clone(),
            });
        }
        Ok(())
    }

    pub(crate) fn live_file(&self) -> Result<&File> {
        self.check_live()?;
        self.file.as_ref().ok_or_else(|| StoreError::FileNotFound {
            path: self.path.clone(),
        })
    }

    pub(crate) fn sync_file(&self) -> Result<()> {
        self.live_file()?.sync_all()?;
        Ok(())
    }

    /// Записать страницу 0 из заголовка в памяти.
    pub(crate) fn write_header(&mut self) -> Result<()> {
        let page = self.header.encode_page();
        self.write_raw(0, &page)
    }

    /// Перевести заголовок на диске в dirty перед первой мутацией.
    pub(crate) fn mark_dirty(&mut self) -> Result<()> {
        if self.dirty_on_disk {
            return Ok(());
        }
        self.header.clean = false;
        self.write_header()?;
        self.sync_file()?;
        self.dirty_on_disk = true;
        debug!("pager: {} marked dirty", self.path.display());
        Ok(())
    }

    /// Отпустить файл и блокировку без sync (store, не прошедший recovery).
    pub(crate) fn release(&mut self) {
        self.file = None;
        self.lock = None;
    }

    /// Завершить работу: sync + освобождение файла и блокировки.
    /// Повторный close() — no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.file.is_none() {
            return Ok(());
        }
        self.check_live()?;
        self.sync()?;
        self.file = None;
        self.lock = None;
        info!("pager: closed {}", self.path.display());
        Ok(())
    }
}

impl Drop for PageStore {
    fn drop(&mut self) {
        if self.powered_off.is_some() || self.file.is_none() {
            return;
        }
        if let Err(e) = self.sync() {
            warn!("pager: best-effort sync on drop failed for {}: {}", self.path.display(), e);
        }
    }
}
