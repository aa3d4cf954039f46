//! index/directory — хешированный directory: key hash -> (page, slot).
//!
//! Корень (DIR_ROOT) хранит головы цепочек бакетов; цепочка — DIR-страницы с
//! записями `[hash][page][slot]`. Коллизии хешей разрешает вызывающий, сравнивая
//! ключ строки на data-странице.
//!
//! Новая DIR-страница вставляется в голову цепочки: сначала пишется страница
//! (next = старая голова), затем корень.

use log::debug;

use crate::consts::NO_PAGE;
use crate::error::{PageNumber, Result, StoreError};
use crate::hash::{bucket_index, hash64, HashKind};
use crate::page::common::{header_read, next_of, set_next, PageType};
use crate::page::dir::{
    dir_capacity, dir_count, dir_entries, dir_init, dir_push, dir_remove, dir_root_buckets,
    dir_root_head, dir_root_init, dir_root_set_head, dir_root_validate, dir_set_entry, DirEntry,
};
use crate::pager::PageStore;

/// Position of an entry inside a directory page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirPos {
    pub page: PageNumber,
    pub index: usize,
}

#[derive(Debug, Clone)]
pub struct Directory {
    root: PageNumber,
    buckets: u32,
    hash_kind: HashKind,
}

impl Directory {
    /// Allocate and write an empty root; records it in the file header.
    pub fn create(store: &mut PageStore, buckets: u32) -> Result<Self> {
        let pid = store.allocate()?;
        let mut page = vec![0u8; store.page_size()];
        dir_root_init(&mut page, pid, buckets);
        store.write(pid, &mut page)?;
        store.set_root_dir_page(pid)?;
        debug!("directory: created root {} with {} bucket(s)", pid, buckets);
        Ok(Self {
            root: pid,
            buckets,
            hash_kind: store.header().hash(),
        })
    }

    pub fn open(store: &PageStore) -> Result<Self> {
        let root = store.root_dir_page();
        if root == NO_PAGE || root == 0 || root >= store.page_count() {
            return Err(StoreError::corrupted(
                0,
                format!("directory root {} out of range", root),
            ));
        }
        let page = store.read(root)?;
        expect_type(root, &page, PageType::DirRoot)?;
        dir_root_validate(&page).map_err(|e| e.at_page(root))?;
        Ok(Self {
            root,
            buckets: dir_root_buckets(&page),
            hash_kind: store.header().hash(),
        })
    }

    #[inline]
    pub fn root(&self) -> PageNumber {
        self.root
    }

    #[inline]
    pub fn buckets(&self) -> u32 {
        self.buckets
    }

    #[inline]
    pub fn hash(&self, key: &[u8]) -> u64 {
        hash64(self.hash_kind, key)
    }

    #[inline]
    pub fn bucket(&self, hash: u64) -> u32 {
        bucket_index(hash, self.buckets)
    }

    fn read_root(&self, store: &PageStore) -> Result<Vec<u8>> {
        let page = store.read(self.root)?;
        expect_type(self.root, &page, PageType::DirRoot)?;
        Ok(page)
    }

    /// Head of every bucket chain.
    pub fn heads(&self, store: &PageStore) -> Result<Vec<PageNumber>> {
        let root = self.read_root(store)?;
        Ok((0..self.buckets).map(|b| dir_root_head(&root, b)).collect())
    }

    /// Пройти цепочку бакета; f получает (page_id, страница) и может остановить обход (false).
    fn walk_chain<F>(&self, store: &PageStore, head: PageNumber, mut f: F) -> Result<()>
    where
        F: FnMut(PageNumber, &[u8]) -> Result<bool>,
    {
        let mut cur = head;
        let mut hops = 0u64;
        while cur != NO_PAGE {
            hops += 1;
            if hops > store.page_count() {
                return Err(StoreError::corrupted(cur, "directory chain loops"));
            }
            let page = store.read(cur)?;
            expect_type(cur, &page, PageType::Dir)?;
            if !f(cur, &page)? {
                break;
            }
            cur = next_of(&page);
        }
        Ok(())
    }

    pub fn chain(&self, store: &PageStore, bucket: u32) -> Result<Vec<PageNumber>> {
        let head = dir_root_head(&self.read_root(store)?, bucket);
        let mut out = Vec::new();
        self.walk_chain(store, head, |pid, _| {
            out.push(pid);
            Ok(true)
        })?;
        Ok(out)
    }

    /// All entries whose hash matches, with their positions.
    pub fn candidates(&self, store: &PageStore, hash: u64) -> Result<Vec<(DirPos, DirEntry)>> {
        let head = dir_root_head(&self.read_root(store)?, self.bucket(hash));
        let mut out = Vec::new();
        self.walk_chain(store, head, |pid, page| {
            for (i, e) in dir_entries(page).into_iter().enumerate() {
                if e.hash == hash {
                    out.push((DirPos { page: pid, index: i }, e));
                }
            }
            Ok(true)
        })?;
        Ok(out)
    }

    /// Visit every entry of every bucket.
    pub fn for_each_entry<F>(&self, store: &PageStore, mut f: F) -> Result<()>
    where
        F: FnMut(DirPos, DirEntry),
    {
        for head in self.heads(store)? {
            self.walk_chain(store, head, |pid, page| {
                for (i, e) in dir_entries(page).into_iter().enumerate() {
                    f(DirPos { page: pid, index: i }, e);
                }
                Ok(true)
            })?;
        }
        Ok(())
    }

    pub fn insert(&self, store: &mut PageStore, entry: &DirEntry) -> Result<DirPos> {
        let bucket = self.bucket(entry.hash);
        let mut root = self.read_root(store)?;
        let head = dir_root_head(&root, bucket);

        let mut target: Option<(PageNumber, Vec<u8>)> = None;
        let cap = dir_capacity(store.page_size());
        self.walk_chain(store, head, |pid, page| {
            if dir_count(page) < cap {
                target = Some((pid, page.to_vec()));
                return Ok(false);
            }
            Ok(true)
        })?;

        if let Some((pid, mut page)) = target {
            let index = dir_count(&page);
            dir_push(&mut page, entry);
            store.write(pid, &mut page)?;
            return Ok(DirPos { page: pid, index });
        }

        let pid = store.allocate()?;
        let mut page = vec![0u8; store.page_size()];
        dir_init(&mut page, pid);
        set_next(&mut page, head);
        dir_push(&mut page, entry);
        store.write(pid, &mut page)?;
        dir_root_set_head(&mut root, bucket, pid);
        store.write(self.root, &mut root)?;
        debug!("directory: bucket {} grew with page {}", bucket, pid);
        Ok(DirPos { page: pid, index: 0 })
    }

    pub fn remove(&self, store: &mut PageStore, pos: DirPos) -> Result<()> {
        let mut page = store.read(pos.page)?;
        expect_type(pos.page, &page, PageType::Dir)?;
        if pos.index >= dir_count(&page) {
            return Err(StoreError::corrupted(
                pos.page,
                format!("directory index {} out of range", pos.index),
            ));
        }
        dir_remove(&mut page, pos.index);
        store.write(pos.page, &mut page)
    }

    pub fn repoint(&self, store: &mut PageStore, pos: DirPos, entry: &DirEntry) -> Result<()> {
        let mut page = store.read(pos.page)?;
        expect_type(pos.page, &page, PageType::Dir)?;
        if pos.index >= dir_count(&page) {
            return Err(StoreError::corrupted(
                pos.page,
                format!("directory index {} out of range", pos.index),
            ));
        }
        dir_set_entry(&mut page, pos.index, entry);
        store.write(pos.page, &mut page)
    }

    /// Уплотнить цепочки бакетов до минимального числа страниц.
    /// Лишние страницы сначала выводятся из цепочки, затем обнуляются и освобождаются.
    /// Позиции записей (DirPos) после вызова недействительны.
    pub fn compact(&self, store: &mut PageStore) -> Result<u64> {
        let ps = store.page_size();
        let cap = dir_capacity(ps);
        let mut freed = 0u64;

        for bucket in 0..self.buckets {
            let head = dir_root_head(&self.read_root(store)?, bucket);
            let mut pages = Vec::new();
            let mut entries = Vec::new();
            self.walk_chain(store, head, |pid, page| {
                pages.push(pid);
                entries.extend(dir_entries(page));
                Ok(true)
            })?;
            let needed = entries.len().div_ceil(cap);
            if pages.len() <= needed {
                continue;
            }

            let (keep, drop) = pages.split_at(needed);
            let mut page = vec![0u8; ps];
            for (i, &pid) in keep.iter().enumerate() {
                dir_init(&mut page, pid);
                set_next(&mut page, keep.get(i + 1).copied().unwrap_or(NO_PAGE));
                for e in entries.iter().skip(i * cap).take(cap) {
                    dir_push(&mut page, e);
                }
                store.write(pid, &mut page)?;
            }
            let new_head = keep.first().copied().unwrap_or(NO_PAGE);
            if new_head != head {
                let mut root = self.read_root(store)?;
                dir_root_set_head(&mut root, bucket, new_head);
                store.write(self.root, &mut root)?;
            }
            for &pid in drop {
                dir_init(&mut page, pid);
                store.write(pid, &mut page)?;
                store.free(pid)?;
                freed += 1;
            }
            debug!(
                "directory: bucket {} compacted {} -> {} page(s)",
                bucket,
                pages.len(),
                needed
            );
        }
        Ok(freed)
    }
}

pub(crate) fn expect_type(pid: PageNumber, page: &[u8], want: PageType) -> Result<()> {
    let h = header_read(page).map_err(|e| e.at_page(pid))?;
    if h.page_type != want {
        return Err(StoreError::corrupted(
            pid,
            format!("expected {:?} page, found {:?}", want, h.page_type),
        ));
    }
    Ok(())
}
