#![allow(non_snake_case)]

// Формат и базовые типы
pub mod consts;
pub mod error;
pub mod meta;
pub mod hash;
pub mod config;
pub mod metrics;
pub mod lock;

// Страницы, кодек строк, менеджер страниц
pub mod page;   // src/page/{mod,common,checksum,data,dir,ovf,free}.rs
pub mod codec;
pub mod pager;  // src/pager/{mod,core,io,alloc,fault}.rs
pub mod free;   // src/free/mod.rs

// Индекс, recovery, публичный API
pub mod index;    // src/index/{mod,directory,kv,reorganize}.rs
pub mod recovery; // src/recovery/{mod,scan}.rs
pub mod store;    // src/store/{mod,core,open,kv,maintenance}.rs

// Удобные реэкспорты
pub use config::{StoreBuilder, StoreConfig};
pub use consts::{CODEC_NONE, CODEC_ZSTD, FORMAT_VERSION, SUPPORTED_VERSIONS};
pub use error::{PageNumber, Result, StoreError};
pub use index::{ReorgReport, RowIndex, RowLoc};
pub use meta::FileHeader;
pub use metrics::{metrics_reset, metrics_snapshot, MetricsSnapshot};
pub use pager::{NoFaults, PageStore, PowerOffAfter, WriteFate, WriteInterceptor};
pub use recovery::{RecoveryManager, RecoveryState, ScanReport};
pub use store::{Store, StoreStats};
