//! pager/alloc — аллокация/освобождение страниц и персистентность free-листа.
//!
//! - allocate(): сначала free-лист, иначе расширение файла на одну страницу
//!   (новая страница сразу пишется как FREE-образ, чтобы быть проверяемой);
//! - free(): проверка живых элементов (overflow-страницы отдаёт только RowIndex),
//!   перезапись FREE-образом, возврат в free-лист;
//! - sync(): раскладка free-листа по trunk'ам + чистый заголовок;
//! - load_free_list(): обход цепочки trunk'ов при открытии.

use log::{debug, warn};
use std::collections::BTreeSet;

use crate::consts::NO_PAGE;
use crate::error::{PageNumber, Result, StoreError};
use crate::metrics::{record_page_allocated, record_page_freed, record_sync};
use crate::page::common::{header_read, next_of, PageType};
use crate::page::free::{free_page_init, free_trunk_build, free_trunk_capacity, free_trunk_ids};

use super::core::PageStore;

impl PageStore {
    /// Выделить страницу. Содержимое — FREE-образ; вызывающий перезапишет её.
    pub fn allocate(&mut self) -> Result<PageNumber> {
        self.check_live()?;
        self.mark_dirty()?;

        if let Some(pid) = self.free.pop() {
            self.header.free_count = self.free.len();
            record_page_allocated();
            debug!("pager: allocate page {} from free list", pid);
            return Ok(pid);
        }

        let pid = self.header.page_count;
        self.header.page_count += 1;
        let mut img = vec![0u8; self.page_size()];
        free_page_init(&mut img, pid);
        if let Err(e) = self.write(pid, &mut img) {
            if !self.is_powered_off() {
                self.header.page_count -= 1;
            }
            return Err(e);
        }
        record_page_allocated();
        debug!("pager: extend file with page {}", pid);
        Ok(pid)
    }

    /// Вернуть страницу в free-лист. Overflow-страница считается занятой:
    /// её освобождает только RowIndex вместе со строкой-владельцем.
    pub fn free(&mut self, pid: PageNumber) -> Result<()> {
        self.release_page(pid, false)
    }

    /// Освободить страницу overflow-цепочки удаляемой строки.
    pub(crate) fn free_chain_page(&mut self, pid: PageNumber) -> Result<()> {
        self.release_page(pid, true)
    }

    fn release_page(&mut self, pid: PageNumber, chain: bool) -> Result<()> {
        self.check_live()?;
        if pid == 0 {
            return Err(StoreError::InvalidArgument("cannot free the header page".into()));
        }
        if pid == self.header.root_dir_page {
            return Err(StoreError::InvalidArgument(
                "cannot free the directory root".into(),
            ));
        }
        if pid >= self.header.page_count {
            return Err(StoreError::PageOutOfRange {
                page: pid,
                page_count: self.header.page_count,
            });
        }
        if self.free.contains(pid) {
            return Err(StoreError::InvalidArgument(format!("page {} is already free", pid)));
        }

        let mut page = self.read(pid)?;
        let h = header_read(&page).map_err(|e| e.at_page(pid))?;
        if chain && h.page_type != PageType::Overflow {
            return Err(StoreError::corrupted(
                pid,
                format!("expected Overflow page, found {:?}", h.page_type),
            ));
        }
        match h.page_type {
            PageType::Data | PageType::Dir if h.items > 0 => {
                return Err(StoreError::PageStillReferenced {
                    page: pid,
                    items: h.items,
                });
            }
            PageType::Overflow if !chain => {
                return Err(StoreError::PageStillReferenced { page: pid, items: 1 });
            }
            PageType::DirRoot => {
                return Err(StoreError::InvalidArgument(format!(
                    "page {} is a directory root",
                    pid
                )));
            }
            _ => {}
        }

        free_page_init(&mut page, pid);
        self.write(pid, &mut page)?;
        self.free.push(pid);
        self.header.free_count = self.free.len();
        record_page_freed();
        debug!("pager: freed page {} ({:?})", pid, h.page_type);
        Ok(())
    }

    /// Сохранить free-лист и записать чистый заголовок (с fsync).
    /// Без мутаций с прошлого sync() — no-op.
    pub fn sync(&mut self) -> Result<()> {
        self.check_live()?;
        if !self.dirty_on_disk {
            return Ok(());
        }

        let plans = self
            .free
            .plan_trunks(free_trunk_capacity(self.page_size()), NO_PAGE);
        let new_trunks: BTreeSet<PageNumber> = plans.iter().map(|p| p.page).collect();

        // Бывшие trunk'и, оставшиеся свободными, не должны перечислять устаревшие id.
        let stale: Vec<PageNumber> = self
            .trunks
            .iter()
            .copied()
            .filter(|p| !new_trunks.contains(p) && self.free.contains(*p))
            .collect();
        let mut img = vec![0u8; self.page_size()];
        for pid in stale {
            free_page_init(&mut img, pid);
            self.write(pid, &mut img)?;
        }
        for plan in &plans {
            free_trunk_build(&mut img, plan.page, &plan.ids, plan.next);
            self.write(plan.page, &mut img)?;
        }
        self.sync_file()?;

        self.header.free_head = plans.first().map(|p| p.page).unwrap_or(NO_PAGE);
        self.header.free_count = self.free.len();
        self.header.clean = true;
        self.header.generation += 1;
        self.write_header()?;
        self.sync_file()?;
        self.dirty_on_disk = false;
        self.trunks = plans.iter().map(|p| p.page).collect();
        record_sync();
        debug!(
            "pager: sync {} (pages={}, free={}, trunks={}, generation={})",
            self.path.display(),
            self.header.page_count,
            self.header.free_count,
            self.trunks.len(),
            self.header.generation
        );
        Ok(())
    }

    /// Загрузить free-лист из цепочки trunk'ов заголовка.
    pub fn load_free_list(&mut self) -> Result<()> {
        self.check_live()?;
        self.free = Default::default();
        self.trunks.clear();

        let page_count = self.header.page_count;
        let mut cur = self.header.free_head;
        while cur != NO_PAGE {
            if cur == 0 || cur >= page_count {
                return Err(StoreError::corrupted(
                    0,
                    format!("free-list trunk {} out of range", cur),
                ));
            }
            if !self.free.push(cur) {
                return Err(StoreError::corrupted(cur, "free-list trunk listed twice"));
            }
            let page = self.read(cur)?;
            let h = header_read(&page).map_err(|e| e.at_page(cur))?;
            if h.page_type != PageType::Free {
                return Err(StoreError::corrupted(
                    cur,
                    format!("free-list trunk is a {:?} page", h.page_type),
                ));
            }
            for id in free_trunk_ids(&page).map_err(|e| e.at_page(cur))? {
                if id == 0 || id >= page_count || !self.free.push(id) {
                    return Err(StoreError::corrupted(
                        cur,
                        format!("free-list trunk lists bad or duplicate page {}", id),
                    ));
                }
            }
            self.trunks.push(cur);
            cur = next_of(&page);
        }

        if self.free.len() != self.header.free_count {
            return Err(StoreError::corrupted(
                0,
                format!(
                    "free count mismatch (header={}, trunks={})",
                    self.header.free_count,
                    self.free.len()
                ),
            ));
        }
        debug!(
            "pager: loaded free list of {} page(s) from {} trunk(s)",
            self.free.len(),
            self.trunks.len()
        );
        Ok(())
    }

    /// Отрезать хвост файла за пределами page_count (страницы, выделенные после
    /// последнего sync и потерянные при сбое).
    pub(crate) fn truncate_tail(&mut self) -> Result<u64> {
        let want = self.header.file_len();
        let have = self.file_len()?;
        if have <= want {
            return Ok(0);
        }
        self.mark_dirty()?;
        let f = self.live_file()?;
        f.set_len(want)?;
        f.sync_all()?;
        let dropped = (have - want) / self.page_size() as u64;
        warn!(
            "pager: dropped {} unreferenced tail page(s) of {}",
            dropped,
            self.path.display()
        );
        Ok(dropped)
    }
}
