//! index — RowIndex: ключ -> (page, slot).
//!
//! - directory.rs  — хешированный directory (корень + цепочки бакетов).
//! - kv.rs         — insert/lookup/delete, размещение строк, overflow-цепочки.
//! - reorganize.rs — эвакуация разреженных data-страниц и уплотнение directory.
//! - scan.rs       — обход всех строк (scan_all/scan_prefix/scan_stream/keys).

pub mod directory;
pub mod kv;
pub mod reorganize;
pub mod scan;

pub use directory::{DirPos, Directory};
pub use kv::{RowIndex, RowLoc};
pub use reorganize::ReorgReport;
