//! page/data — слотовая страница строк (DATA).
//!
//! Layout (LE):
//! ```text
//! [common hdr 32][data_lo u32][reserved u32]   // DATA_HDR = 40
//! [slot 0][slot 1]...                          // slot = [off u16][len u16], off=0 => удалён
//! ... free ...
//! [record N] ... [record 0]                    // записи растут вниз от трейлера
//! [trailer 16]
//! ```
//! `aux` — число слотов, `items` — число живых строк.
//! Слоты не переиспользуются; удалённые хвостовые слоты обрезаются, так что номер
//! слота стабилен, пока строка жива (дефрагментация сохраняет номера).

use byteorder::{ByteOrder, LittleEndian};

use super::common::{
    aux_of, items_of, page_init, set_aux, set_items, PageType, PAGE_HDR_SIZE, TRAILER_LEN,
};
use crate::error::{PageNumber, Result, StoreError};

const OFF_DATA_LO: usize = PAGE_HDR_SIZE;
pub const DATA_HDR: usize = PAGE_HDR_SIZE + 8;
pub const SLOT_SIZE: usize = 4;

#[inline]
fn slot_pos(slot: usize) -> usize {
    DATA_HDR + slot * SLOT_SIZE
}

#[inline]
fn data_end(page: &[u8]) -> usize {
    page.len() - TRAILER_LEN
}

#[inline]
fn data_lo(page: &[u8]) -> usize {
    LittleEndian::read_u32(&page[OFF_DATA_LO..OFF_DATA_LO + 4]) as usize
}

#[inline]
fn set_data_lo(page: &mut [u8], lo: usize) {
    LittleEndian::write_u32(&mut page[OFF_DATA_LO..OFF_DATA_LO + 4], lo as u32);
}

#[inline]
fn read_slot(page: &[u8], slot: usize) -> (usize, usize) {
    let p = slot_pos(slot);
    (
        LittleEndian::read_u16(&page[p..p + 2]) as usize,
        LittleEndian::read_u16(&page[p + 2..p + 4]) as usize,
    )
}

#[inline]
fn write_slot(page: &mut [u8], slot: usize, off: usize, len: usize) {
    let p = slot_pos(slot);
    LittleEndian::write_u16(&mut page[p..p + 2], off as u16);
    LittleEndian::write_u16(&mut page[p + 2..p + 4], len as u16);
}

pub fn data_init(page: &mut [u8], page_id: PageNumber) {
    page_init(page, PageType::Data, page_id);
    let end = data_end(page);
    set_data_lo(page, end);
}

/// Largest record a single data page can hold.
#[inline]
pub fn data_max_record(page_size: usize) -> usize {
    page_size - TRAILER_LEN - DATA_HDR - SLOT_SIZE
}

/// Bytes a record of `len` consumes (a fresh slot is always taken).
#[inline]
pub fn data_record_need(len: usize) -> usize {
    len + SLOT_SIZE
}

#[inline]
pub fn data_slot_count(page: &[u8]) -> usize {
    aux_of(page) as usize
}

#[inline]
pub fn data_live_count(page: &[u8]) -> u32 {
    items_of(page)
}

/// (off, len) of a live slot.
pub fn data_slot(page: &[u8], slot: u16) -> Option<(usize, usize)> {
    let slot = slot as usize;
    if slot >= data_slot_count(page) {
        return None;
    }
    let (off, len) = read_slot(page, slot);
    if off == 0 {
        None
    } else {
        Some((off, len))
    }
}

pub fn data_record(page: &[u8], slot: u16) -> Option<&[u8]> {
    let (off, len) = data_slot(page, slot)?;
    page.get(off..off + len)
}

/// Live slot numbers in slot order.
pub fn data_live_slots(page: &[u8]) -> Vec<u16> {
    (0..data_slot_count(page))
        .filter(|&s| read_slot(page, s).0 != 0)
        .map(|s| s as u16)
        .collect()
}

pub fn data_live_bytes(page: &[u8]) -> usize {
    (0..data_slot_count(page))
        .map(|s| read_slot(page, s))
        .filter(|&(off, _)| off != 0)
        .map(|(_, len)| len)
        .sum()
}

/// Free bytes after defragmentation (slot table included in the used part).
pub fn data_free_space(page: &[u8]) -> usize {
    let used = DATA_HDR + data_slot_count(page) * SLOT_SIZE + data_live_bytes(page);
    data_end(page).saturating_sub(used)
}

#[inline]
fn contiguous_free(page: &[u8]) -> usize {
    data_lo(page).saturating_sub(slot_pos(data_slot_count(page)))
}

/// Положить запись в новый слот. None — места нет даже после дефрагментации.
pub fn data_insert(page: &mut [u8], record: &[u8]) -> Option<u16> {
    let count = data_slot_count(page);
    if count >= u16::MAX as usize {
        return None;
    }
    let need = data_record_need(record.len());
    if contiguous_free(page) < need {
        if data_free_space(page) < need {
            return None;
        }
        data_compact(page);
    }
    let lo = data_lo(page) - record.len();
    page[lo..lo + record.len()].copy_from_slice(record);
    write_slot(page, count, lo, record.len());
    set_data_lo(page, lo);
    set_aux(page, (count + 1) as u32);
    let live = items_of(page);
    set_items(page, live + 1);
    Some(count as u16)
}

/// Удалить строку из слота. Возвращает освобождённые байты записи.
pub fn data_delete(page: &mut [u8], slot: u16) -> Result<usize> {
    let (off, len) = data_slot(page, slot)
        .ok_or_else(|| StoreError::corrupted_row(format!("slot {} is not live", slot)))?;
    write_slot(page, slot as usize, 0, 0);
    let live = items_of(page);
    set_items(page, live.saturating_sub(1));
    if off == data_lo(page) {
        set_data_lo(page, off + len);
    }

    // Обрезать удалённые слоты в хвосте таблицы.
    let mut count = data_slot_count(page);
    while count > 0 && read_slot(page, count - 1).0 == 0 {
        count -= 1;
    }
    set_aux(page, count as u32);
    if count == 0 {
        let end = data_end(page);
        set_data_lo(page, end);
    }
    Ok(len)
}

/// Дефрагментация на месте: записи прижимаются к трейлеру, номера слотов сохраняются.
pub fn data_compact(page: &mut [u8]) {
    let live: Vec<(usize, Vec<u8>)> = (0..data_slot_count(page))
        .filter_map(|s| {
            let (off, len) = read_slot(page, s);
            (off != 0).then(|| (s, page[off..off + len].to_vec()))
        })
        .collect();
    let mut lo = data_end(page);
    for (slot, bytes) in &live {
        lo -= bytes.len();
        page[lo..lo + bytes.len()].copy_from_slice(bytes);
        write_slot(page, *slot, lo, bytes.len());
    }
    let table_end = slot_pos(data_slot_count(page));
    page[table_end..lo].fill(0);
    set_data_lo(page, lo);
}

/// Структурная проверка слотовой таблицы (используется сканом recovery).
pub fn data_validate(page: &[u8]) -> Result<()> {
    let end = data_end(page);
    let count = data_slot_count(page);
    let lo = data_lo(page);
    if slot_pos(count) > end || lo < slot_pos(count) || lo > end {
        return Err(StoreError::corrupted_row(format!(
            "slot table out of bounds (slots={}, data_lo={})",
            count, lo
        )));
    }
    let mut spans: Vec<(usize, usize)> = Vec::with_capacity(count);
    for s in 0..count {
        let (off, len) = read_slot(page, s);
        if off == 0 {
            continue;
        }
        if off < lo || off + len > end {
            return Err(StoreError::corrupted_row(format!(
                "slot {} record [{}..{}) outside data area",
                s,
                off,
                off + len
            )));
        }
        spans.push((off, len));
    }
    if spans.len() != items_of(page) as usize {
        return Err(StoreError::corrupted_row(format!(
            "live slot count {} != header items {}",
            spans.len(),
            items_of(page)
        )));
    }
    if count > 0 && read_slot(page, count - 1).0 == 0 {
        return Err(StoreError::corrupted_row("trailing deleted slot not trimmed"));
    }
    spans.sort_unstable();
    for w in spans.windows(2) {
        if w[0].0 + w[0].1 > w[1].0 {
            return Err(StoreError::corrupted_row("overlapping records"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Vec<u8> {
        let mut p = vec![0u8; 4096];
        data_init(&mut p, 5);
        p
    }

    #[test]
    fn insert_read_delete() {
        let mut p = page();
        let a = data_insert(&mut p, b"alpha").unwrap();
        let b = data_insert(&mut p, b"beta").unwrap();
        assert_eq!((a, b), (0, 1));
        assert_eq!(data_record(&p, a), Some(&b"alpha"[..]));
        assert_eq!(data_record(&p, b), Some(&b"beta"[..]));
        assert_eq!(data_live_count(&p), 2);

        assert_eq!(data_delete(&mut p, a).unwrap(), 5);
        assert_eq!(data_record(&p, a), None);
        assert_eq!(data_slot_count(&p), 2, "slot 0 stays reserved");
        assert!(data_delete(&mut p, a).unwrap_err().is_corrupted());
        data_validate(&p).unwrap();

        data_delete(&mut p, b).unwrap();
        assert_eq!(data_slot_count(&p), 0, "trailing dead slots trimmed");
        assert_eq!(data_free_space(&p), 4096 - TRAILER_LEN - DATA_HDR);
    }

    #[test]
    fn fragmented_space_is_reused_after_compaction() {
        let mut p = page();
        let rec = vec![7u8; 900];
        let mut slots = Vec::new();
        while let Some(s) = data_insert(&mut p, &rec) {
            slots.push(s);
        }
        assert_eq!(slots.len(), 4);
        // Освобождаем середину: места хватает только после дефрагментации.
        data_delete(&mut p, slots[1]).unwrap();
        data_delete(&mut p, slots[2]).unwrap();
        let big = vec![9u8; 1500];
        let s = data_insert(&mut p, &big).unwrap();
        assert_eq!(s, 4);
        assert_eq!(data_record(&p, slots[0]), Some(&rec[..]));
        assert_eq!(data_record(&p, slots[3]), Some(&rec[..]));
        assert_eq!(data_record(&p, s), Some(&big[..]));
        data_validate(&p).unwrap();
    }

    #[test]
    fn max_record_fits_exactly() {
        let mut p = page();
        let rec = vec![1u8; data_max_record(4096)];
        assert_eq!(data_insert(&mut p, &rec), Some(0));
        assert_eq!(data_free_space(&p), 0);
        assert_eq!(data_insert(&mut p, b""), None);
    }

    #[test]
    fn validate_rejects_bad_slot() {
        let mut p = page();
        data_insert(&mut p, b"x").unwrap();
        write_slot(&mut p, 0, 10, 4);
        assert!(data_validate(&p).is_err());
    }
}
