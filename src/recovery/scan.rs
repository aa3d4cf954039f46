//! recovery/scan — полный структурный скан файла.
//!
//! Семантика:
//! - каждая страница 1..page_count читается через PageStore::read (CRC32C, magic, версия,
//!   собственный номер);
//! - от корня directory обходятся цепочки бакетов, записи, data-страницы и overflow-цепочки;
//! - free-лист (уже загруженный в PageStore) должен состоять из FREE-страниц;
//! - каждая страница принадлежит ровно одной структуре: сирота или двойная ссылка
//!   означают FileCorrupted{page}.
//!
//! Результат — ScanReport (JSON через serde_json) и карта свободного места data-страниц.

use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::codec::RowFrame;
use crate::consts::NO_PAGE;
use crate::error::{PageNumber, Result, StoreError};
use crate::hash::{bucket_index, hash64};
use crate::page::common::{next_of, PageType};
use crate::page::data::{
    data_free_space, data_live_bytes, data_live_count, data_record, data_validate,
};
use crate::page::dir::{
    dir_entries, dir_root_buckets, dir_root_head, dir_root_validate, dir_validate, DirEntry,
};
use crate::page::ovf::ovf_chunk;
use crate::pager::PageStore;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub path: String,
    pub page_size: u32,
    pub page_count: u64,
    pub generation: u64,
    pub clean: bool,
    pub dir_root_pages: u64,
    pub dir_pages: u64,
    pub data_pages: u64,
    pub overflow_pages: u64,
    pub free_pages: u64,
    pub rows: u64,
    pub overflow_rows: u64,
    /// Bytes of live row records on data pages.
    pub live_bytes: u64,
}

impl ScanReport {
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Скан + карта свободного места data-страниц (для RowIndex).
#[derive(Debug)]
pub struct ScanOutcome {
    pub report: ScanReport,
    pub space: BTreeMap<PageNumber, usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Owner {
    Root,
    Dir,
    Data,
    Overflow,
    Free,
}

struct Scanner<'a> {
    store: &'a PageStore,
    types: Vec<Option<PageType>>,
    owners: Vec<Option<Owner>>,
    report: ScanReport,
    space: BTreeMap<PageNumber, usize>,
}

impl<'a> Scanner<'a> {
    fn new(store: &'a PageStore) -> Self {
        let n = store.page_count() as usize;
        let h = store.header();
        Self {
            store,
            types: vec![None; n],
            owners: vec![None; n],
            report: ScanReport {
                path: store.path().display().to_string(),
                page_size: h.page_size,
                page_count: h.page_count,
                generation: h.generation,
                clean: h.clean,
                ..Default::default()
            },
            space: BTreeMap::new(),
        }
    }

    /// Проход 1: прочитать и проверить каждую страницу.
    fn verify_all(&mut self) -> Result<()> {
        let mut buf = vec![0u8; self.store.page_size()];
        for pid in 1..self.store.page_count() {
            let h = self.store.read_into(pid, &mut buf)?;
            self.types[pid as usize] = Some(h.page_type);
        }
        Ok(())
    }

    /// Закрепить страницу за структурой; тип должен совпадать, владелец — единственный.
    fn claim(&mut self, pid: PageNumber, owner: Owner, want: PageType) -> Result<()> {
        if pid == 0 || pid >= self.store.page_count() {
            return Err(StoreError::corrupted(
                pid,
                format!("{:?} reference to page out of range", owner),
            ));
        }
        let idx = pid as usize;
        match self.types[idx] {
            Some(t) if t == want => {}
            other => {
                return Err(StoreError::corrupted(
                    pid,
                    format!("expected {:?} page, found {:?}", want, other),
                ))
            }
        }
        if let Some(prev) = self.owners[idx] {
            return Err(StoreError::corrupted(
                pid,
                format!("page claimed by {:?} and {:?}", prev, owner),
            ));
        }
        self.owners[idx] = Some(owner);
        Ok(())
    }

    fn walk_directory(&mut self) -> Result<(Vec<(u32, DirEntry)>, u32)> {
        let root = self.store.root_dir_page();
        if root == NO_PAGE {
            return Err(StoreError::corrupted(0, "directory root missing"));
        }
        self.claim(root, Owner::Root, PageType::DirRoot)?;
        self.report.dir_root_pages += 1;
        let page = self.store.read(root)?;
        dir_root_validate(&page).map_err(|e| e.at_page(root))?;

        let buckets = dir_root_buckets(&page);
        let mut entries = Vec::new();
        for bucket in 0..buckets {
            let mut cur = dir_root_head(&page, bucket);
            while cur != NO_PAGE {
                // claim() ловит и петли, и общие страницы между цепочками.
                self.claim(cur, Owner::Dir, PageType::Dir)?;
                self.report.dir_pages += 1;
                let dp = self.store.read(cur)?;
                dir_validate(&dp).map_err(|e| e.at_page(cur))?;
                entries.extend(dir_entries(&dp).into_iter().map(|e| (bucket, e)));
                cur = next_of(&dp);
            }
        }
        debug!(
            "scan: directory root {} with {} entr(y/ies)",
            root,
            entries.len()
        );
        Ok((entries, buckets))
    }

    fn walk_rows(&mut self, entries: Vec<(u32, DirEntry)>, buckets: u32) -> Result<()> {
        let mut by_page: BTreeMap<PageNumber, Vec<(u16, u64, u32)>> = BTreeMap::new();
        for (bucket, e) in entries {
            by_page.entry(e.page).or_default().push((e.slot, e.hash, bucket));
        }

        for (pid, mut refs) in by_page {
            self.claim(pid, Owner::Data, PageType::Data)?;
            self.report.data_pages += 1;
            let page = self.store.read(pid)?;
            data_validate(&page).map_err(|e| e.at_page(pid))?;

            refs.sort_unstable_by_key(|r| r.0);
            if refs.windows(2).any(|w| w[0].0 == w[1].0) {
                return Err(StoreError::corrupted(pid, "slot referenced twice"));
            }
            for &(slot, hash, bucket) in &refs {
                let rec = data_record(&page, slot).ok_or_else(|| {
                    StoreError::corrupted(pid, format!("directory entry points to dead slot {}", slot))
                })?;
                let frame = RowFrame::parse(rec).map_err(|e| e.at_page(pid))?;
                let kh = hash64(self.store.header().hash(), frame.key);
                if kh != hash || bucket_index(kh, buckets) != bucket {
                    return Err(StoreError::corrupted(
                        pid,
                        format!("row in slot {} does not match its directory entry", slot),
                    ));
                }
                if let Some(head) = frame.overflow_head() {
                    self.walk_overflow(head, frame.stored_len as u64)?;
                    self.report.overflow_rows += 1;
                }
            }
            if data_live_count(&page) as usize != refs.len() {
                return Err(StoreError::corrupted(
                    pid,
                    format!(
                        "{} live row(s) but {} directory entr(y/ies)",
                        data_live_count(&page),
                        refs.len()
                    ),
                ));
            }
            self.report.rows += refs.len() as u64;
            self.report.live_bytes += data_live_bytes(&page) as u64;
            self.space.insert(pid, data_free_space(&page));
        }
        Ok(())
    }

    fn walk_overflow(&mut self, head: PageNumber, stored_len: u64) -> Result<()> {
        let mut total = 0u64;
        let mut cur = head;
        while cur != NO_PAGE {
            self.claim(cur, Owner::Overflow, PageType::Overflow)?;
            self.report.overflow_pages += 1;
            let page = self.store.read(cur)?;
            total += ovf_chunk(&page).map_err(|e| e.at_page(cur))?.len() as u64;
            cur = next_of(&page);
        }
        if total != stored_len {
            return Err(StoreError::corrupted(
                head,
                format!(
                    "overflow chain holds {} byte(s), row expects {}",
                    total, stored_len
                ),
            ));
        }
        Ok(())
    }

    fn walk_free(&mut self) -> Result<()> {
        for pid in self.store.free_pages() {
            self.claim(pid, Owner::Free, PageType::Free)?;
            self.report.free_pages += 1;
        }
        Ok(())
    }

    fn check_orphans(&self) -> Result<()> {
        match (1..self.owners.len()).find(|&i| self.owners[i].is_none()) {
            Some(i) => Err(StoreError::corrupted(
                i as PageNumber,
                format!("orphan {:?} page", self.types[i]),
            )),
            None => Ok(()),
        }
    }
}

/// Полный скан store с загруженным free-листом.
pub fn scan_store(store: &PageStore) -> Result<ScanOutcome> {
    let mut s = Scanner::new(store);
    s.verify_all()?;
    let (entries, buckets) = s.walk_directory()?;
    s.walk_rows(entries, buckets)?;
    s.walk_free()?;
    s.check_orphans()?;
    debug!(
        "scan: {} ok ({} row(s), {} data, {} overflow, {} free page(s))",
        store.path().display(),
        s.report.rows,
        s.report.data_pages,
        s.report.overflow_pages,
        s.report.free_pages
    );
    Ok(ScanOutcome {
        report: s.report,
        space: s.space,
    })
}
