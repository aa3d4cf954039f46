//! page/dir — страницы directory.
//!
//! DIR_ROOT: `items` = число бакетов, с offset 32 — головы цепочек (u64 на бакет,
//! NO_PAGE если бакет пуст).
//!
//! DIR: записи фиксированного размера 18 B `[hash u64][page u64][slot u16]` с offset 32,
//! `items` = число записей, `next` = следующая страница цепочки бакета. Записи упакованы
//! без дыр: удаление переносит последнюю запись на место удалённой.

use byteorder::{ByteOrder, LittleEndian};

use super::common::{body_capacity, items_of, page_init, set_items, PageType, PAGE_HDR_SIZE};
use crate::consts::{DIR_ENTRY_SIZE, NO_PAGE};
use crate::error::{PageNumber, Result, StoreError};

/// Directory entry: key hash and the row address it maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    pub hash: u64,
    pub page: PageNumber,
    pub slot: u16,
}

// ---------------- DIR_ROOT ----------------

#[inline]
pub fn dir_root_max_buckets(page_size: usize) -> u32 {
    (body_capacity(page_size) / 8) as u32
}

pub fn dir_root_init(page: &mut [u8], page_id: PageNumber, buckets: u32) {
    page_init(page, PageType::DirRoot, page_id);
    set_items(page, buckets);
    for b in 0..buckets as usize {
        let off = PAGE_HDR_SIZE + b * 8;
        LittleEndian::write_u64(&mut page[off..off + 8], NO_PAGE);
    }
}

#[inline]
pub fn dir_root_buckets(page: &[u8]) -> u32 {
    items_of(page)
}

#[inline]
pub fn dir_root_head(page: &[u8], bucket: u32) -> PageNumber {
    let off = PAGE_HDR_SIZE + bucket as usize * 8;
    LittleEndian::read_u64(&page[off..off + 8])
}

#[inline]
pub fn dir_root_set_head(page: &mut [u8], bucket: u32, head: PageNumber) {
    let off = PAGE_HDR_SIZE + bucket as usize * 8;
    LittleEndian::write_u64(&mut page[off..off + 8], head);
}

/// Bucket count must be in range for the page size.
pub fn dir_root_validate(page: &[u8]) -> Result<()> {
    let buckets = dir_root_buckets(page);
    if buckets == 0 || buckets > dir_root_max_buckets(page.len()) {
        return Err(StoreError::corrupted_row(format!(
            "bad directory bucket count {}",
            buckets
        )));
    }
    Ok(())
}

// ---------------- DIR ----------------

#[inline]
pub fn dir_capacity(page_size: usize) -> usize {
    body_capacity(page_size) / DIR_ENTRY_SIZE
}

pub fn dir_init(page: &mut [u8], page_id: PageNumber) {
    page_init(page, PageType::Dir, page_id);
}

#[inline]
pub fn dir_count(page: &[u8]) -> usize {
    items_of(page) as usize
}

#[inline]
fn entry_off(i: usize) -> usize {
    PAGE_HDR_SIZE + i * DIR_ENTRY_SIZE
}

pub fn dir_entry(page: &[u8], i: usize) -> DirEntry {
    let off = entry_off(i);
    DirEntry {
        hash: LittleEndian::read_u64(&page[off..off + 8]),
        page: LittleEndian::read_u64(&page[off + 8..off + 16]),
        slot: LittleEndian::read_u16(&page[off + 16..off + 18]),
    }
}

pub fn dir_set_entry(page: &mut [u8], i: usize, e: &DirEntry) {
    let off = entry_off(i);
    LittleEndian::write_u64(&mut page[off..off + 8], e.hash);
    LittleEndian::write_u64(&mut page[off + 8..off + 16], e.page);
    LittleEndian::write_u16(&mut page[off + 16..off + 18], e.slot);
}

pub fn dir_entries(page: &[u8]) -> Vec<DirEntry> {
    (0..dir_count(page)).map(|i| dir_entry(page, i)).collect()
}

/// Append an entry. false — страница заполнена.
pub fn dir_push(page: &mut [u8], e: &DirEntry) -> bool {
    let n = dir_count(page);
    if n >= dir_capacity(page.len()) {
        return false;
    }
    dir_set_entry(page, n, e);
    set_items(page, (n + 1) as u32);
    true
}

/// Swap-remove entry `i`.
pub fn dir_remove(page: &mut [u8], i: usize) {
    let n = dir_count(page);
    debug_assert!(i < n);
    if i + 1 < n {
        let last = dir_entry(page, n - 1);
        dir_set_entry(page, i, &last);
    }
    let off = entry_off(n - 1);
    page[off..off + DIR_ENTRY_SIZE].fill(0);
    set_items(page, (n - 1) as u32);
}

pub fn dir_validate(page: &[u8]) -> Result<()> {
    let n = dir_count(page);
    if n > dir_capacity(page.len()) {
        return Err(StoreError::corrupted_row(format!(
            "directory entry count {} exceeds capacity",
            n
        )));
    }
    Ok(())
}
