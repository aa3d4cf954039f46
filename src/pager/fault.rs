//! pager/fault — точка внедрения сбоев записи (тестовый режим "выключение питания").
//!
//! PageStore спрашивает перехватчик перед каждой физической записью страницы
//! (включая заголовок, страница 0). Если запись оборвана или потеряна, store
//! переходит в состояние powered-off: все последующие вызовы возвращают
//! `PowerOff`, Drop ничего не пишет.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::PageNumber;

/// What happens to a physical page write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteFate {
    /// Write reaches the file in full.
    Complete,
    /// Only the first `keep` bytes reach the file, then power is lost.
    Torn { keep: usize },
    /// Nothing reaches the file, then power is lost.
    Lost,
}

/// Hook consulted before every physical page write.
pub trait WriteInterceptor: Send {
    fn on_write(&mut self, page: PageNumber, len: usize) -> WriteFate;
}

/// Lets `n` writes complete, then applies `fate` to the next one.
///
/// The shared counter can be cloned before the interceptor is handed to a store,
/// so a test can tell how many writes went through.
pub struct PowerOffAfter {
    remaining: u64,
    fate: WriteFate,
    writes_seen: Arc<AtomicU64>,
    only_page: Option<PageNumber>,
}

impl PowerOffAfter {
    pub fn new(complete_writes: u64, fate: WriteFate) -> Self {
        Self {
            remaining: complete_writes,
            fate,
            writes_seen: Arc::new(AtomicU64::new(0)),
            only_page: None,
        }
    }

    /// Tear the write after `complete_writes`, keeping `keep` bytes of it.
    pub fn tear_after(complete_writes: u64, keep: usize) -> Self {
        Self::new(complete_writes, WriteFate::Torn { keep })
    }

    /// Drop the write after `complete_writes` entirely.
    pub fn lose_after(complete_writes: u64) -> Self {
        Self::new(complete_writes, WriteFate::Lost)
    }

    /// Count and fire only on writes to `page`.
    pub fn on_page(mut self, page: PageNumber) -> Self {
        self.only_page = Some(page);
        self
    }

    pub fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.writes_seen)
    }
}

impl WriteInterceptor for PowerOffAfter {
    fn on_write(&mut self, page: PageNumber, _len: usize) -> WriteFate {
        self.writes_seen.fetch_add(1, Ordering::Relaxed);
        if let Some(p) = self.only_page {
            if p != page {
                return WriteFate::Complete;
            }
        }
        if self.remaining > 0 {
            self.remaining -= 1;
            return WriteFate::Complete;
        }
        self.fate
    }
}

/// Passes every write through; useful as a default in generic test helpers.
pub struct NoFaults;

impl WriteInterceptor for NoFaults {
    fn on_write(&mut self, _page: PageNumber, _len: usize) -> WriteFate {
        WriteFate::Complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_after_n_writes() {
        let mut f = PowerOffAfter::tear_after(2, 100);
        let seen = f.counter();
        assert_eq!(f.on_write(1, 4096), WriteFate::Complete);
        assert_eq!(f.on_write(2, 4096), WriteFate::Complete);
        assert_eq!(f.on_write(3, 4096), WriteFate::Torn { keep: 100 });
        assert_eq!(seen.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn page_filter() {
        let mut f = PowerOffAfter::lose_after(0).on_page(7);
        assert_eq!(f.on_write(0, 4096), WriteFate::Complete);
        assert_eq!(f.on_write(3, 4096), WriteFate::Complete);
        assert_eq!(f.on_write(7, 4096), WriteFate::Lost);
        assert_eq!(NoFaults.on_write(7, 4096), WriteFate::Complete);
    }
}
