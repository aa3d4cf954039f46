//! page/common — общий 32‑байтовый заголовок страниц и константы трейлера.
//!
//! Layout (LE):
//! ```text
//! [magic4="QXPG"][version u16][type u16][page_id u64][next u64][items u32][aux u32]
//! ... type-specific body ...
//! [trailer 16 B: crc32c u32 + 12 zero bytes]
//! ```
//! `items` — число живых элементов (строки data, записи directory, id в free-trunk),
//! его проверяет `PageStore::free`. `aux` зависит от типа страницы.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{PageNumber, Result, StoreError};

pub const PAGE_MAGIC: &[u8; 4] = b"QXPG";
pub const PAGE_VERSION: u16 = 1;

pub const PAGE_HDR_SIZE: usize = 32;
pub const TRAILER_LEN: usize = 16;

pub const OFF_MAGIC: usize = 0;
pub const OFF_VERSION: usize = 4;
pub const OFF_TYPE: usize = 6;
pub const OFF_PAGE_ID: usize = 8;
pub const OFF_NEXT: usize = 16;
pub const OFF_ITEMS: usize = 24;
pub const OFF_AUX: usize = 28;

/// Logical page kinds. Page 0 (file header) is not a typed page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum PageType {
    /// Bucket table of the directory.
    DirRoot = 1,
    /// Directory entries of one bucket chain.
    Dir = 2,
    /// Slotted row page.
    Data = 3,
    /// Chunk of an overflow chain.
    Overflow = 4,
    /// Reclaimed page; trunks also list other free page numbers.
    Free = 5,
}

impl PageType {
    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            1 => Some(PageType::DirRoot),
            2 => Some(PageType::Dir),
            3 => Some(PageType::Data),
            4 => Some(PageType::Overflow),
            5 => Some(PageType::Free),
            _ => None,
        }
    }

    #[inline]
    pub fn to_u16(self) -> u16 {
        self as u16
    }
}

/// Decoded common page header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    pub page_type: PageType,
    pub page_id: PageNumber,
    pub next: PageNumber,
    pub items: u32,
    pub aux: u32,
}

/// Bytes available to a page body between header and trailer.
#[inline]
pub fn body_capacity(page_size: usize) -> usize {
    page_size - PAGE_HDR_SIZE - TRAILER_LEN
}

/// Zero the page and stamp a fresh header.
pub fn page_init(page: &mut [u8], page_type: PageType, page_id: PageNumber) {
    page.fill(0);
    page[OFF_MAGIC..OFF_MAGIC + 4].copy_from_slice(PAGE_MAGIC);
    LittleEndian::write_u16(&mut page[OFF_VERSION..OFF_VERSION + 2], PAGE_VERSION);
    LittleEndian::write_u16(&mut page[OFF_TYPE..OFF_TYPE + 2], page_type.to_u16());
    LittleEndian::write_u64(&mut page[OFF_PAGE_ID..OFF_PAGE_ID + 8], page_id);
    LittleEndian::write_u64(&mut page[OFF_NEXT..OFF_NEXT + 8], crate::consts::NO_PAGE);
}

/// Прочитать общий заголовок (magic/версия/тип проверяются).
/// Ошибки — `FileCorrupted` без номера страницы; вызывающий добавляет контекст.
pub fn header_read(page: &[u8]) -> Result<PageHeader> {
    if page.len() < PAGE_HDR_SIZE + TRAILER_LEN {
        return Err(StoreError::corrupted_row("page buffer too small for header"));
    }
    if &page[OFF_MAGIC..OFF_MAGIC + 4] != PAGE_MAGIC {
        return Err(StoreError::corrupted_row("bad page magic"));
    }
    let version = LittleEndian::read_u16(&page[OFF_VERSION..OFF_VERSION + 2]);
    if version != PAGE_VERSION {
        return Err(StoreError::corrupted_row(format!(
            "unknown page version {}",
            version
        )));
    }
    let raw_type = LittleEndian::read_u16(&page[OFF_TYPE..OFF_TYPE + 2]);
    let page_type = PageType::from_u16(raw_type)
        .ok_or_else(|| StoreError::corrupted_row(format!("unknown page type {}", raw_type)))?;
    Ok(PageHeader {
        page_type,
        page_id: LittleEndian::read_u64(&page[OFF_PAGE_ID..OFF_PAGE_ID + 8]),
        next: LittleEndian::read_u64(&page[OFF_NEXT..OFF_NEXT + 8]),
        items: LittleEndian::read_u32(&page[OFF_ITEMS..OFF_ITEMS + 4]),
        aux: LittleEndian::read_u32(&page[OFF_AUX..OFF_AUX + 4]),
    })
}

#[inline]
pub fn page_type_of(page: &[u8]) -> Option<PageType> {
    PageType::from_u16(LittleEndian::read_u16(&page[OFF_TYPE..OFF_TYPE + 2]))
}

#[inline]
pub fn next_of(page: &[u8]) -> PageNumber {
    LittleEndian::read_u64(&page[OFF_NEXT..OFF_NEXT + 8])
}

#[inline]
pub fn set_next(page: &mut [u8], next: PageNumber) {
    LittleEndian::write_u64(&mut page[OFF_NEXT..OFF_NEXT + 8], next);
}

#[inline]
pub fn items_of(page: &[u8]) -> u32 {
    LittleEndian::read_u32(&page[OFF_ITEMS..OFF_ITEMS + 4])
}

#[inline]
pub fn set_items(page: &mut [u8], items: u32) {
    LittleEndian::write_u32(&mut page[OFF_ITEMS..OFF_ITEMS + 4], items);
}

#[inline]
pub fn aux_of(page: &[u8]) -> u32 {
    LittleEndian::read_u32(&page[OFF_AUX..OFF_AUX + 4])
}

#[inline]
pub fn set_aux(page: &mut [u8], aux: u32) {
    LittleEndian::write_u32(&mut page[OFF_AUX..OFF_AUX + 4], aux);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::NO_PAGE;

    #[test]
    fn init_and_read_header() {
        let mut page = vec![0xEEu8; 4096];
        page_init(&mut page, PageType::Data, 17);
        set_items(&mut page, 3);
        set_aux(&mut page, 9);
        let h = header_read(&page).unwrap();
        assert_eq!(h.page_type, PageType::Data);
        assert_eq!(h.page_id, 17);
        assert_eq!(h.next, NO_PAGE);
        assert_eq!(h.items, 3);
        assert_eq!(h.aux, 9);
        assert!(page[PAGE_HDR_SIZE..].iter().all(|&b| b == 0));
    }

    #[test]
    fn bad_magic_and_type_are_corruption() {
        let mut page = vec![0u8; 4096];
        assert!(header_read(&page).unwrap_err().is_corrupted());

        page_init(&mut page, PageType::Free, 1);
        LittleEndian::write_u16(&mut page[OFF_TYPE..OFF_TYPE + 2], 77);
        assert!(header_read(&page).unwrap_err().is_corrupted());
    }
}
