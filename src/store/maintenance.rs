//! store/maintenance — обслуживание и отчёты.
//!
//! - reorganize(): эвакуация разреженных data-страниц + уплотнение directory (index/reorganize.rs);
//! - sync(): free-лист + чистый заголовок;
//! - stats(): сводка по типам страниц (StoreStats, JSON через serde_json);
//! - check(): doctor — полный структурный скан открытого файла (ScanReport).

use log::info;
use serde::Serialize;

use crate::error::Result;
use crate::index::ReorgReport;
use crate::page::common::{PageType, TRAILER_LEN};
use crate::page::data::{data_live_bytes, DATA_HDR};
use crate::recovery::{scan_store, ScanReport};

use super::core::Store;

#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub page_size: u32,
    pub page_count: u64,
    pub free_pages: u64,
    /// Directory pages, root included.
    pub dir_pages: u64,
    pub data_pages: u64,
    pub overflow_pages: u64,
    pub rows: u64,
    pub live_bytes: u64,
    /// live_bytes / usable bytes of all data pages (0.0 when there are none).
    pub fill_ratio: f64,
    pub file_bytes: u64,
    pub generation: u64,
    pub clean: bool,
}

impl StoreStats {
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

impl Store {
    pub fn reorganize(&mut self) -> Result<ReorgReport> {
        self.index.reorganize()
    }

    pub fn sync(&mut self) -> Result<()> {
        self.index.store_mut().sync()
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let ps = self.index.store();
        let h = ps.header();
        let mut st = StoreStats {
            page_size: h.page_size,
            page_count: h.page_count,
            free_pages: ps.free_count(),
            rows: self.index.len(),
            file_bytes: ps.file_len()?,
            generation: h.generation,
            clean: ps.is_clean(),
            ..Default::default()
        };

        let mut buf = vec![0u8; ps.page_size()];
        for pid in 1..ps.page_count() {
            if ps.is_free(pid) {
                continue;
            }
            match ps.read_into(pid, &mut buf)?.page_type {
                PageType::DirRoot | PageType::Dir => st.dir_pages += 1,
                PageType::Data => {
                    st.data_pages += 1;
                    st.live_bytes += data_live_bytes(&buf) as u64;
                }
                PageType::Overflow => st.overflow_pages += 1,
                PageType::Free => {}
            }
        }

        let usable = (ps.page_size() - TRAILER_LEN - DATA_HDR) as u64;
        if st.data_pages > 0 {
            st.fill_ratio = st.live_bytes as f64 / (st.data_pages * usable) as f64;
        }
        Ok(st)
    }

    /// Doctor: тот же скан, что при открытии, по текущему состоянию файла.
    pub fn check(&self) -> Result<ScanReport> {
        let outcome = scan_store(self.index.store())?;
        info!(
            "store: check {} ok ({} row(s), {} page(s))",
            self.path.display(),
            outcome.report.rows,
            outcome.report.page_count
        );
        Ok(outcome.report)
    }
}
