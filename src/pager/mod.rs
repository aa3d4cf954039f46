//! pager — слой управления страницами (PageStore).
//!
//! Подмодули:
//! - core.rs  — структура PageStore, create()/open(), заголовок, dirty/clean, close/Drop.
//! - io.rs    — read/write страниц с проверкой трейлера, физическая запись.
//! - alloc.rs — allocate/free, sync и загрузка free-листа.
//! - fault.rs — перехватчик записей для симуляции выключения питания.

pub mod alloc;
pub mod core;
pub mod fault;
pub mod io;

pub use self::core::PageStore;
pub use fault::{NoFaults, PowerOffAfter, WriteFate, WriteInterceptor};
pub use io::verify_page;
