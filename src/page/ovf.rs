//! page/ovf — страницы overflow-цепочек.
//!
//! `aux` = длина куска в этой странице, payload с offset 32, `next` = следующий кусок.
//! Цепочку записывают с хвоста, голова пишется последней.

use super::common::{aux_of, body_capacity, page_init, set_aux, set_next, PageType, PAGE_HDR_SIZE};
use crate::error::{PageNumber, Result, StoreError};

#[inline]
pub fn ovf_capacity(page_size: usize) -> usize {
    body_capacity(page_size)
}

/// Сформировать overflow-страницу с одним куском.
pub fn ovf_build(page: &mut [u8], page_id: PageNumber, chunk: &[u8], next: PageNumber) {
    debug_assert!(chunk.len() <= ovf_capacity(page.len()));
    page_init(page, PageType::Overflow, page_id);
    set_next(page, next);
    set_aux(page, chunk.len() as u32);
    page[PAGE_HDR_SIZE..PAGE_HDR_SIZE + chunk.len()].copy_from_slice(chunk);
}

pub fn ovf_chunk(page: &[u8]) -> Result<&[u8]> {
    let len = aux_of(page) as usize;
    if len == 0 || len > ovf_capacity(page.len()) {
        return Err(StoreError::corrupted_row(format!(
            "bad overflow chunk length {}",
            len
        )));
    }
    Ok(&page[PAGE_HDR_SIZE..PAGE_HDR_SIZE + len])
}
