//! page/free — образ свободной страницы.
//!
//! Каждая освобождённая страница переписывается как FREE. Trunk — FREE-страница из
//! цепочки free-листа: `items` = число перечисленных page_id (u64 с offset 32),
//! `next` = следующий trunk.

use byteorder::{ByteOrder, LittleEndian};

use super::common::{body_capacity, items_of, page_init, set_items, set_next, PageType, PAGE_HDR_SIZE};
use crate::error::{PageNumber, Result, StoreError};

#[inline]
pub fn free_trunk_capacity(page_size: usize) -> usize {
    body_capacity(page_size) / 8
}

/// Empty FREE image (not a trunk).
pub fn free_page_init(page: &mut [u8], page_id: PageNumber) {
    page_init(page, PageType::Free, page_id);
}

/// FREE trunk listing `ids`, linked to `next`.
pub fn free_trunk_build(page: &mut [u8], page_id: PageNumber, ids: &[PageNumber], next: PageNumber) {
    debug_assert!(ids.len() <= free_trunk_capacity(page.len()));
    page_init(page, PageType::Free, page_id);
    set_next(page, next);
    set_items(page, ids.len() as u32);
    for (i, id) in ids.iter().enumerate() {
        let off = PAGE_HDR_SIZE + i * 8;
        LittleEndian::write_u64(&mut page[off..off + 8], *id);
    }
}

pub fn free_trunk_ids(page: &[u8]) -> Result<Vec<PageNumber>> {
    let n = items_of(page) as usize;
    if n > free_trunk_capacity(page.len()) {
        return Err(StoreError::corrupted_row(format!(
            "free trunk lists {} ids, capacity {}",
            n,
            free_trunk_capacity(page.len())
        )));
    }
    Ok((0..n)
        .map(|i| {
            let off = PAGE_HDR_SIZE + i * 8;
            LittleEndian::read_u64(&page[off..off + 8])
        })
        .collect())
}
