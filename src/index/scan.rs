//! index/scan — обход всех строк: scan_stream / scan_all / scan_prefix / keys.
//!
//! Порядок не определён: записи directory группируются по data-странице,
//! каждая страница читается один раз. Любое повреждение на пути — FileCorrupted,
//! обход прерывается.

use std::collections::BTreeMap;

use crate::codec::RowFrame;
use crate::error::{PageNumber, Result, StoreError};
use crate::page::common::PageType;
use crate::page::dir::DirEntry;

use super::directory::expect_type;
use super::kv::{live_record, RowIndex, RowLoc};

impl RowIndex {
    /// Вызвать `f(key, value)` для каждой строки. Ошибка из `f` прерывает обход.
    pub fn scan_stream<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], Vec<u8>) -> Result<()>,
    {
        self.scan_rows(|key, rec, pid| {
            let value = self.row_value(pid, rec)?;
            f(key, value)
        })
    }

    pub fn scan_all(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::with_capacity(self.rows as usize);
        self.scan_stream(|k, v| {
            out.push((k.to_vec(), v));
            Ok(())
        })?;
        Ok(out)
    }

    pub fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::new();
        self.scan_rows(|key, rec, pid| {
            if key.starts_with(prefix) {
                out.push((key.to_vec(), self.row_value(pid, rec)?));
            }
            Ok(())
        })?;
        Ok(out)
    }

    /// Только ключи; overflow-цепочки не читаются.
    pub fn keys(&self) -> Result<Vec<Vec<u8>>> {
        let mut out = Vec::with_capacity(self.rows as usize);
        self.scan_rows(|key, _, _| {
            out.push(key.to_vec());
            Ok(())
        })?;
        Ok(out)
    }

    /// Общий обход: (ключ, кадр строки, data-страница).
    fn scan_rows<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8], PageNumber) -> Result<()>,
    {
        let mut by_page: BTreeMap<PageNumber, Vec<DirEntry>> = BTreeMap::new();
        self.dir.for_each_entry(&self.store, |_, e| {
            by_page.entry(e.page).or_default().push(e);
        })?;

        let mut seen = 0u64;
        for (pid, entries) in by_page {
            let page = self.store.read(pid)?;
            expect_type(pid, &page, PageType::Data)?;
            for e in entries {
                let loc = RowLoc {
                    page: pid,
                    slot: e.slot,
                };
                let rec = live_record(&page, loc)?;
                let frame = RowFrame::parse(rec).map_err(|err| err.at_page(pid))?;
                if self.dir.hash(frame.key) != e.hash {
                    return Err(StoreError::corrupted(
                        pid,
                        format!("slot {} key does not match its directory entry", e.slot),
                    ));
                }
                f(frame.key, rec, pid)?;
                seen += 1;
            }
        }
        if seen != self.rows {
            return Err(StoreError::corrupted(
                self.dir.root(),
                format!("directory lists {} row(s), index expects {}", seen, self.rows),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::consts::CODEC_NONE;
    use crate::pager::PageStore;

    #[test]
    fn keys_and_prefix_cover_inline_and_overflow_rows() {
        let path = std::env::temp_dir().join(format!(
            "qix-index-scan-{}-{}.qix",
            std::process::id(),
            line!()
        ));
        let cfg = StoreConfig::default().with_codec(CODEC_NONE);
        let store = PageStore::create(&path, &cfg, None).expect("create");
        let mut idx = RowIndex::create(store, &cfg).expect("index");

        idx.insert(b"a:1", b"one").expect("insert");
        idx.insert(b"a:2", &vec![2u8; 3000]).expect("insert");
        idx.insert(b"b:1", b"three").expect("insert");

        let mut keys = idx.keys().expect("keys");
        keys.sort();
        assert_eq!(keys, vec![b"a:1".to_vec(), b"a:2".to_vec(), b"b:1".to_vec()]);

        let mut a = idx.scan_prefix(b"a:").expect("prefix");
        a.sort();
        assert_eq!(a.len(), 2);
        assert_eq!(a[1].1, vec![2u8; 3000]);

        // Ошибка колбэка прерывает обход.
        let mut calls = 0;
        let r = idx.scan_stream(|_, _| {
            calls += 1;
            Err(StoreError::InvalidState("stop".into()))
        });
        assert!(matches!(r, Err(StoreError::InvalidState(_))));
        assert_eq!(calls, 1);

        drop(idx);
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(crate::lock::lock_file_path(&path));
    }
}
