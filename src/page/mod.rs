//! page — on-disk page types + fixed checksum trailer.
//!
//! Разделение по подмодулям:
//! - common.rs   — общий заголовок, MAGIC/версия/типы, offset'ы.
//! - checksum.rs — трейлер CRC32C.
//! - data.rs     — слотовые страницы строк.
//! - dir.rs      — корень directory (бакеты) и страницы записей directory.
//! - ovf.rs      — куски overflow-цепочек.
//! - free.rs     — FREE-образ и trunk'и free-листа.

pub mod checksum;
pub mod common;
pub mod data;
pub mod dir;
pub mod free;
pub mod ovf;

pub use checksum::{page_trailer_crc32, page_update_checksum, page_verify_checksum};
pub use common::{
    body_capacity, header_read, PageHeader, PageType, PAGE_HDR_SIZE, PAGE_MAGIC, PAGE_VERSION,
    TRAILER_LEN,
};
pub use dir::DirEntry;
