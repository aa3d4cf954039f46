//! index/kv — RowIndex: insert/lookup/delete поверх directory и слотовых страниц.
//!
//! Порядок записи при insert: кадр кодируется до любых записей (CompressionError ничего
//! не трогает) -> overflow-цепочка (если нужна) -> строка на data-странице -> запись
//! directory. Повторный insert ключа заменяет строку: новая строка, перенаправление
//! записи directory, удаление старой строки.
//!
//! Порядок delete: запись directory -> слот -> overflow-цепочка; data-страница без
//! живых строк возвращается в free-лист.

use log::debug;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::codec::{self, Codec, RowBody, RowFrame};
use crate::config::StoreConfig;
use crate::consts::NO_PAGE;
use crate::error::{PageNumber, Result, StoreError};
use crate::metrics::{
    record_overflow_chain_created, record_overflow_chain_freed, record_row_deleted,
    record_row_inserted,
};
use crate::page::common::{next_of, PageType};
use crate::page::data::{
    data_delete, data_free_space, data_init, data_insert, data_live_count, data_record,
    data_record_need,
};
use crate::page::dir::DirEntry;
use crate::page::ovf::{ovf_build, ovf_capacity, ovf_chunk};
use crate::pager::PageStore;

use super::directory::{expect_type, DirPos, Directory};

/// Address of a row: data page and slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RowLoc {
    pub page: PageNumber,
    pub slot: u16,
}

struct Found {
    pos: DirPos,
    loc: RowLoc,
    page: Vec<u8>,
}

/// Key -> row index over a validated PageStore.
pub struct RowIndex {
    pub(crate) store: PageStore,
    pub(crate) dir: Directory,
    pub(crate) codec: Codec,
    // data page -> свободные байты после дефрагментации
    pub(crate) space: BTreeMap<PageNumber, usize>,
    pub(crate) inline_max: usize,
    pub(crate) rows: u64,
    pub(crate) reorg_fill_percent: u8,
}

impl RowIndex {
    /// Новый индекс на только что созданном store.
    pub fn create(mut store: PageStore, cfg: &StoreConfig) -> Result<Self> {
        let dir = Directory::create(&mut store, cfg.buckets)?;
        let inline_max = cfg.inline_max_for(store.page_size());
        Ok(Self {
            store,
            dir,
            codec: Codec::from_config(cfg),
            space: BTreeMap::new(),
            inline_max,
            rows: 0,
            reorg_fill_percent: cfg.reorg_fill_percent,
        })
    }

    /// Индекс над store, прошедшим recovery: карта свободного места и число строк из скана.
    pub fn attach(
        store: PageStore,
        cfg: &StoreConfig,
        space: BTreeMap<PageNumber, usize>,
        rows: u64,
    ) -> Result<Self> {
        let dir = Directory::open(&store)?;
        let inline_max = cfg.inline_max_for(store.page_size());
        Ok(Self {
            store,
            dir,
            codec: Codec::from_config(cfg),
            space,
            inline_max,
            rows,
            reorg_fill_percent: cfg.reorg_fill_percent,
        })
    }

    #[inline]
    pub fn store(&self) -> &PageStore {
        &self.store
    }

    #[inline]
    pub fn store_mut(&mut self) -> &mut PageStore {
        &mut self.store
    }

    #[inline]
    pub fn directory(&self) -> &Directory {
        &self.dir
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.rows
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Data pages currently holding rows.
    pub fn data_pages(&self) -> impl Iterator<Item = PageNumber> + '_ {
        self.space.keys().copied()
    }

    // ---------------- public operations ----------------

    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<RowLoc> {
        let payload = self.codec.encode(key, value)?;
        let hash = self.dir.hash(key);
        let existing = self.find(key, hash)?.map(|f| (f.pos, f.loc));

        let frame = if payload.inline_frame_len(key.len()) <= self.inline_max
            || payload.stored.is_empty()
        {
            payload.frame_inline(key)
        } else {
            let head = self.write_overflow(&payload.stored)?;
            payload.frame_overflow(key, head)
        };
        let loc = self.place(&frame, &BTreeSet::new())?;
        let entry = DirEntry {
            hash,
            page: loc.page,
            slot: loc.slot,
        };

        match existing {
            Some((pos, old)) => {
                self.dir.repoint(&mut self.store, pos, &entry)?;
                self.remove_row(old)?;
                debug!("index: replaced row at {:?} with {:?}", old, loc);
            }
            None => {
                self.dir.insert(&mut self.store, &entry)?;
                self.rows += 1;
            }
        }
        record_row_inserted(payload.is_compressed());
        Ok(loc)
    }

    /// None — ключа нет. Повреждённая страница на пути — FileCorrupted, не старые данные.
    pub fn lookup(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let hash = self.dir.hash(key);
        match self.find(key, hash)? {
            Some(found) => {
                let rec = live_record(&found.page, found.loc)?;
                self.row_value(found.loc.page, rec).map(Some)
            }
            None => Ok(None),
        }
    }

    pub fn location(&self, key: &[u8]) -> Result<Option<RowLoc>> {
        let hash = self.dir.hash(key);
        Ok(self.find(key, hash)?.map(|f| f.loc))
    }

    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        let hash = self.dir.hash(key);
        let found = self
            .find(key, hash)?
            .ok_or_else(|| StoreError::RowNotFoundWhenDeleting { key: key.to_vec() })?;
        self.dir.remove(&mut self.store, found.pos)?;
        self.remove_row(found.loc)?;
        self.rows = self.rows.saturating_sub(1);
        record_row_deleted();
        Ok(())
    }

    // ---------------- internals ----------------

    fn find(&self, key: &[u8], hash: u64) -> Result<Option<Found>> {
        for (pos, e) in self.dir.candidates(&self.store, hash)? {
            let page = self.store.read(e.page)?;
            expect_type(e.page, &page, PageType::Data)?;
            let loc = RowLoc {
                page: e.page,
                slot: e.slot,
            };
            let rec = live_record(&page, loc)?;
            let frame = RowFrame::parse(rec).map_err(|err| err.at_page(e.page))?;
            if frame.key == key {
                return Ok(Some(Found { pos, loc, page }));
            }
        }
        Ok(None)
    }

    /// Декодировать значение строки (inline или из overflow-цепочки).
    pub(crate) fn row_value(&self, pid: PageNumber, rec: &[u8]) -> Result<Vec<u8>> {
        let frame = RowFrame::parse(rec).map_err(|e| e.at_page(pid))?;
        match frame.body {
            RowBody::Inline(stored) => codec::decode(&frame, stored).map_err(|e| e.at_page(pid)),
            RowBody::Overflow(head) => {
                let stored = self.read_overflow(head, frame.stored_len as usize)?;
                codec::decode(&frame, &stored).map_err(|e| e.at_page(head))
            }
        }
    }

    /// First-fit по карте свободного места, затем новая страница.
    pub(crate) fn place(
        &mut self,
        frame: &[u8],
        exclude: &BTreeSet<PageNumber>,
    ) -> Result<RowLoc> {
        let need = data_record_need(frame.len());
        let candidates: Vec<PageNumber> = self
            .space
            .iter()
            .filter(|(p, free)| **free >= need && !exclude.contains(*p))
            .map(|(p, _)| *p)
            .collect();
        for pid in candidates {
            let mut page = self.store.read(pid)?;
            expect_type(pid, &page, PageType::Data)?;
            if let Some(slot) = data_insert(&mut page, frame) {
                self.store.write(pid, &mut page)?;
                self.space.insert(pid, data_free_space(&page));
                return Ok(RowLoc { page: pid, slot });
            }
            self.space.insert(pid, data_free_space(&page));
        }

        let pid = self.store.allocate()?;
        let mut page = vec![0u8; self.store.page_size()];
        data_init(&mut page, pid);
        let slot = data_insert(&mut page, frame).ok_or_else(|| {
            StoreError::InvalidState(format!(
                "record of {} bytes does not fit an empty page",
                frame.len()
            ))
        })?;
        self.store.write(pid, &mut page)?;
        self.space.insert(pid, data_free_space(&page));
        debug!("index: new data page {}", pid);
        Ok(RowLoc { page: pid, slot })
    }

    /// Удалить строку по адресу: слот, затем overflow-цепочка.
    pub(crate) fn remove_row(&mut self, loc: RowLoc) -> Result<()> {
        let mut page = self.store.read(loc.page)?;
        expect_type(loc.page, &page, PageType::Data)?;
        let head = {
            let rec = live_record(&page, loc)?;
            RowFrame::parse(rec)
                .map_err(|e| e.at_page(loc.page))?
                .overflow_head()
        };
        data_delete(&mut page, loc.slot).map_err(|e| e.at_page(loc.page))?;
        self.store.write(loc.page, &mut page)?;
        if data_live_count(&page) == 0 {
            self.store.free(loc.page)?;
            self.space.remove(&loc.page);
        } else {
            self.space.insert(loc.page, data_free_space(&page));
        }

        if let Some(head) = head {
            for pid in self.overflow_pages(head)? {
                self.store.free_chain_page(pid)?;
            }
            record_overflow_chain_freed();
        }
        Ok(())
    }

    /// Записать overflow-цепочку с хвоста; голова пишется последней.
    fn write_overflow(&mut self, stored: &[u8]) -> Result<PageNumber> {
        let ps = self.store.page_size();
        let chunks: Vec<&[u8]> = stored.chunks(ovf_capacity(ps)).collect();
        let mut pids = Vec::with_capacity(chunks.len());
        for _ in &chunks {
            pids.push(self.store.allocate()?);
        }
        let mut page = vec![0u8; ps];
        let mut next = NO_PAGE;
        for (chunk, &pid) in chunks.iter().zip(&pids).rev() {
            ovf_build(&mut page, pid, chunk, next);
            self.store.write(pid, &mut page)?;
            next = pid;
        }
        record_overflow_chain_created();
        debug!(
            "index: overflow chain of {} page(s) at head {}",
            pids.len(),
            next
        );
        Ok(next)
    }

    fn read_overflow(&self, head: PageNumber, stored_len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(stored_len);
        let mut cur = head;
        let mut hops = 0u64;
        while out.len() < stored_len {
            if cur == NO_PAGE {
                return Err(StoreError::corrupted(head, "overflow chain ends early"));
            }
            hops += 1;
            if hops > self.store.page_count() {
                return Err(StoreError::corrupted(head, "overflow chain loops"));
            }
            let page = self.store.read(cur)?;
            expect_type(cur, &page, PageType::Overflow)?;
            out.extend_from_slice(ovf_chunk(&page).map_err(|e| e.at_page(cur))?);
            cur = next_of(&page);
        }
        if out.len() != stored_len || cur != NO_PAGE {
            return Err(StoreError::corrupted(
                head,
                format!(
                    "overflow chain length mismatch (expected {}, got {})",
                    stored_len,
                    out.len()
                ),
            ));
        }
        Ok(out)
    }

    fn overflow_pages(&self, head: PageNumber) -> Result<Vec<PageNumber>> {
        let mut out = Vec::new();
        let mut cur = head;
        while cur != NO_PAGE {
            if out.len() as u64 >= self.store.page_count() {
                return Err(StoreError::corrupted(head, "overflow chain loops"));
            }
            let page = self.store.read(cur)?;
            expect_type(cur, &page, PageType::Overflow)?;
            out.push(cur);
            cur = next_of(&page);
        }
        Ok(out)
    }
}

pub(crate) fn live_record(page: &[u8], loc: RowLoc) -> Result<&[u8]> {
    data_record(page, loc.slot).ok_or_else(|| {
        StoreError::corrupted(
            loc.page,
            format!("directory entry points to dead slot {}", loc.slot),
        )
    })
}
