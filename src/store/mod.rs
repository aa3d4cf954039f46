//! store — публичный API хранилища.
//!
//! Разделение по подмодулям:
//! - core.rs        — структура Store, аксессоры, Debug
//! - open.rs        — create/open (через RecoveryManager), close, destroy
//! - kv.rs          — insert/lookup/location/delete
//! - maintenance.rs — reorganize, sync, stats (StoreStats), check (doctor-скан)
//! - scan.rs        — scan_all/scan_prefix/scan_stream/keys

pub mod core;
pub mod kv;
pub mod maintenance;
pub mod open;
pub mod scan;

pub use self::core::Store;
pub use maintenance::StoreStats;
