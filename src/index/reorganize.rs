//! index/reorganize — уплотнение data-страниц и цепочек directory.
//!
//! Проход эвакуации:
//! - источники — data-страницы с заполнением ниже reorg_fill_percent, от самых пустых;
//! - строки источника переносятся first-fit в другие страницы только если план
//!   (симуляция на копии карты свободного места) размещает их все без новых страниц;
//! - страница, принявшая строки, в этом проходе источником уже не становится;
//! - пустой источник обнуляется и возвращается в free-лист.
//!
//! Проходы повторяются, пока освобождается хотя бы одна страница, поэтому повторный
//! вызов reorganize() ничего не переносит. Затем уплотняются цепочки directory.
//! Файл не усекается: освобождённые страницы остаются в free-листе.

use log::info;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::{PageNumber, Result, StoreError};
use crate::metrics::record_reorganize;
use crate::page::common::{PageType, TRAILER_LEN};
use crate::page::data::{data_init, data_live_slots, data_record, data_record_need, DATA_HDR};
use crate::page::dir::DirEntry;

use super::directory::{expect_type, DirPos};
use super::kv::{RowIndex, RowLoc};

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReorgReport {
    /// Pages in use (excluding free ones) before and after.
    pub pages_in_use_before: u64,
    pub pages_in_use_after: u64,
    pub data_pages_before: u64,
    pub data_pages_after: u64,
    pub data_pages_freed: u64,
    pub dir_pages_freed: u64,
    pub rows_moved: u64,
    pub passes: u32,
}

impl ReorgReport {
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// First-fit на копии карты: все ли записи помещаются в страницы вне `exclude`.
fn plan_fits(
    space: &BTreeMap<PageNumber, usize>,
    exclude: &BTreeSet<PageNumber>,
    lens: &[usize],
) -> bool {
    let mut sim = space.clone();
    lens.iter().all(|&len| {
        let need = data_record_need(len);
        match sim
            .iter_mut()
            .find(|(p, free)| !exclude.contains(*p) && **free >= need)
        {
            Some((_, free)) => {
                *free -= need;
                true
            }
            None => false,
        }
    })
}

impl RowIndex {
    pub fn reorganize(&mut self) -> Result<ReorgReport> {
        let mut report = ReorgReport {
            pages_in_use_before: self.store.page_count() - self.store.free_count(),
            data_pages_before: self.space.len() as u64,
            ..Default::default()
        };

        loop {
            report.passes += 1;
            let freed = self.evacuate_pass(&mut report)?;
            report.data_pages_freed += freed;
            if freed == 0 {
                break;
            }
        }

        report.dir_pages_freed = self.dir.compact(&mut self.store)?;
        report.data_pages_after = self.space.len() as u64;
        report.pages_in_use_after = self.store.page_count() - self.store.free_count();
        record_reorganize(report.rows_moved);
        info!(
            "reorganize: {} row(s) moved, data pages {} -> {}, dir pages freed {}, passes {}",
            report.rows_moved,
            report.data_pages_before,
            report.data_pages_after,
            report.dir_pages_freed,
            report.passes
        );
        Ok(report)
    }

    /// (page, slot) -> (позиция записи directory, hash).
    fn entry_positions(&self) -> Result<HashMap<RowLoc, (DirPos, u64)>> {
        let mut out = HashMap::new();
        self.dir.for_each_entry(&self.store, |pos, e| {
            out.insert(
                RowLoc {
                    page: e.page,
                    slot: e.slot,
                },
                (pos, e.hash),
            );
        })?;
        Ok(out)
    }

    fn evacuate_pass(&mut self, report: &mut ReorgReport) -> Result<u64> {
        let ps = self.store.page_size();
        let usable = ps - TRAILER_LEN - DATA_HDR;
        let threshold = usable * self.reorg_fill_percent as usize / 100;

        let mut sources: Vec<(usize, PageNumber)> = self
            .space
            .iter()
            .map(|(&pid, &free)| (usable.saturating_sub(free), pid))
            .filter(|&(used, _)| used < threshold)
            .collect();
        if sources.is_empty() {
            return Ok(0);
        }
        sources.sort_unstable();

        let positions = self.entry_positions()?;
        let mut pinned: BTreeSet<PageNumber> = BTreeSet::new();
        let mut evacuated: BTreeSet<PageNumber> = BTreeSet::new();
        let mut freed = 0u64;

        for (_, src) in sources {
            if pinned.contains(&src) {
                continue;
            }
            let page = self.store.read(src)?;
            expect_type(src, &page, PageType::Data)?;
            let mut records: Vec<(u16, Vec<u8>)> = Vec::new();
            for slot in data_live_slots(&page) {
                if let Some(rec) = data_record(&page, slot) {
                    records.push((slot, rec.to_vec()));
                }
            }

            let mut exclude = evacuated.clone();
            exclude.insert(src);
            let lens: Vec<usize> = records.iter().map(|(_, r)| r.len()).collect();
            if !plan_fits(&self.space, &exclude, &lens) {
                continue;
            }

            for (slot, rec) in records {
                let old = RowLoc { page: src, slot };
                let (pos, hash) = positions.get(&old).copied().ok_or_else(|| {
                    StoreError::corrupted(src, format!("live slot {} has no directory entry", slot))
                })?;
                let loc = self.place(&rec, &exclude)?;
                let entry = DirEntry {
                    hash,
                    page: loc.page,
                    slot: loc.slot,
                };
                self.dir.repoint(&mut self.store, pos, &entry)?;
                pinned.insert(loc.page);
                report.rows_moved += 1;
            }

            // Все записи directory уже указывают мимо источника.
            let mut empty = vec![0u8; ps];
            data_init(&mut empty, src);
            self.store.write(src, &mut empty)?;
            self.store.free(src)?;
            self.space.remove(&src);
            evacuated.insert(src);
            freed += 1;
        }
        Ok(freed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_is_first_fit_and_respects_exclusions() {
        let space: BTreeMap<PageNumber, usize> = [(2, 100), (3, 300), (5, 50)].into_iter().collect();
        let none = BTreeSet::new();

        // 96+4 в стр. 2, 196+4 в стр. 3.
        assert!(plan_fits(&space, &none, &[96, 196]));
        // Второй 196 уже некуда положить.
        assert!(!plan_fits(&space, &none, &[196, 196]));

        let without_3: BTreeSet<PageNumber> = [3].into_iter().collect();
        assert!(!plan_fits(&space, &without_3, &[196]));
        assert!(plan_fits(&space, &without_3, &[40, 40]));
        assert!(plan_fits(&space, &none, &[]));
    }
}
