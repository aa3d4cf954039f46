//! Lightweight global metrics for QuiverIndex.
//!
//! Потокобезопасные атомарные счётчики для подсистем:
//! - Pager (страницы)
//! - RowIndex (строки, overflow)
//! - Recovery / fault injection
//! - Reorganize

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

// ----- Pager -----
static PAGES_READ: AtomicU64 = AtomicU64::new(0);
static PAGES_WRITTEN: AtomicU64 = AtomicU64::new(0);
static PAGES_ALLOCATED: AtomicU64 = AtomicU64::new(0);
static PAGES_FREED: AtomicU64 = AtomicU64::new(0);
static SYNC_CALLS: AtomicU64 = AtomicU64::new(0);

// ----- Rows -----
static ROWS_INSERTED: AtomicU64 = AtomicU64::new(0);
static ROWS_DELETED: AtomicU64 = AtomicU64::new(0);
static ROWS_COMPRESSED: AtomicU64 = AtomicU64::new(0);
static OVF_CHAINS_CREATED: AtomicU64 = AtomicU64::new(0);
static OVF_CHAINS_FREED: AtomicU64 = AtomicU64::new(0);

// ----- Recovery / faults -----
static CORRUPTION_DETECTED: AtomicU64 = AtomicU64::new(0);
static TORN_WRITES_INJECTED: AtomicU64 = AtomicU64::new(0);
static LOST_WRITES_INJECTED: AtomicU64 = AtomicU64::new(0);

// ----- Reorganize -----
static REORGANIZE_RUNS: AtomicU64 = AtomicU64::new(0);
static REORGANIZE_ROWS_MOVED: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    // Pager
    pub pages_read: u64,
    pub pages_written: u64,
    pub pages_allocated: u64,
    pub pages_freed: u64,
    pub sync_calls: u64,

    // Rows
    pub rows_inserted: u64,
    pub rows_deleted: u64,
    pub rows_compressed: u64,
    pub overflow_chains_created: u64,
    pub overflow_chains_freed: u64,

    // Recovery / faults
    pub corruption_detected: u64,
    pub torn_writes_injected: u64,
    pub lost_writes_injected: u64,

    // Reorganize
    pub reorganize_runs: u64,
    pub reorganize_rows_moved: u64,
}

impl MetricsSnapshot {
    pub fn compression_ratio(&self) -> f64 {
        if self.rows_inserted == 0 {
            0.0
        } else {
            self.rows_compressed as f64 / self.rows_inserted as f64
        }
    }
}

// ----- Recorders (Pager) -----
pub fn record_page_read() {
    PAGES_READ.fetch_add(1, Ordering::Relaxed);
}
pub fn record_page_written() {
    PAGES_WRITTEN.fetch_add(1, Ordering::Relaxed);
}
pub fn record_page_allocated() {
    PAGES_ALLOCATED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_page_freed() {
    PAGES_FREED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_sync() {
    SYNC_CALLS.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (Rows) -----
pub fn record_row_inserted(compressed: bool) {
    ROWS_INSERTED.fetch_add(1, Ordering::Relaxed);
    if compressed {
        ROWS_COMPRESSED.fetch_add(1, Ordering::Relaxed);
    }
}
pub fn record_row_deleted() {
    ROWS_DELETED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_overflow_chain_created() {
    OVF_CHAINS_CREATED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_overflow_chain_freed() {
    OVF_CHAINS_FREED.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (Recovery / faults) -----
pub fn record_corruption() {
    CORRUPTION_DETECTED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_torn_write() {
    TORN_WRITES_INJECTED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_lost_write() {
    LOST_WRITES_INJECTED.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (Reorganize) -----
pub fn record_reorganize(rows_moved: u64) {
    REORGANIZE_RUNS.fetch_add(1, Ordering::Relaxed);
    REORGANIZE_ROWS_MOVED.fetch_add(rows_moved, Ordering::Relaxed);
}

/// Take a consistent-enough snapshot of all counters (Relaxed).
pub fn metrics_snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        pages_read: PAGES_READ.load(Ordering::Relaxed),
        pages_written: PAGES_WRITTEN.load(Ordering::Relaxed),
        pages_allocated: PAGES_ALLOCATED.load(Ordering::Relaxed),
        pages_freed: PAGES_FREED.load(Ordering::Relaxed),
        sync_calls: SYNC_CALLS.load(Ordering::Relaxed),

        rows_inserted: ROWS_INSERTED.load(Ordering::Relaxed),
        rows_deleted: ROWS_DELETED.load(Ordering::Relaxed),
        rows_compressed: ROWS_COMPRESSED.load(Ordering::Relaxed),
        overflow_chains_created: OVF_CHAINS_CREATED.load(Ordering::Relaxed),
        overflow_chains_freed: OVF_CHAINS_FREED.load(Ordering::Relaxed),

        corruption_detected: CORRUPTION_DETECTED.load(Ordering::Relaxed),
        torn_writes_injected: TORN_WRITES_INJECTED.load(Ordering::Relaxed),
        lost_writes_injected: LOST_WRITES_INJECTED.load(Ordering::Relaxed),

        reorganize_runs: REORGANIZE_RUNS.load(Ordering::Relaxed),
        reorganize_rows_moved: REORGANIZE_ROWS_MOVED.load(Ordering::Relaxed),
    }
}

/// Reset all counters to zero (tests/benchmarks).
pub fn metrics_reset() {
    for c in [
        &PAGES_READ,
        &PAGES_WRITTEN,
        &PAGES_ALLOCATED,
        &PAGES_FREED,
        &SYNC_CALLS,
        &ROWS_INSERTED,
        &ROWS_DELETED,
        &ROWS_COMPRESSED,
        &OVF_CHAINS_CREATED,
        &OVF_CHAINS_FREED,
        &CORRUPTION_DETECTED,
        &TORN_WRITES_INJECTED,
        &LOST_WRITES_INJECTED,
        &REORGANIZE_RUNS,
        &REORGANIZE_ROWS_MOVED,
    ] {
        c.store(0, Ordering::Relaxed);
    }
}
