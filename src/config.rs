//! Centralized configuration and builder for QuiverIndex.
//!
//! - `StoreConfig::from_env()` reads QIX_* variables on top of the defaults.
//! - `StoreBuilder` starts from env (or clean defaults) and is consumed by `Store`.
//! - `validate()` is called by create/open; a bad value is `InvalidArgument`.
//!
//! Page size and bucket count only matter at creation: an existing store keeps
//! the values recorded in its header and directory root.

use std::fmt;

use crate::consts::{
    CODEC_NONE, CODEC_ZSTD, DEFAULT_BUCKETS, DEFAULT_MAX_ROW_BYTES, DEFAULT_PAGE_SIZE, ROW_HDR_SIZE,
    ROW_OVF_BODY,
};
use crate::error::{Result, StoreError};
use crate::meta::validate_page_size;
use crate::page::data::data_max_record;
use crate::page::dir::dir_root_max_buckets;

#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Page size for new stores (power of two, 4..=64 KiB).
    /// Env: QIX_PAGE_SIZE (default 4096)
    pub page_size: u32,

    /// Directory bucket count for new stores.
    /// Env: QIX_BUCKETS (default 64)
    pub buckets: u32,

    /// fsync after every page write (sync()/close() always fsync).
    /// Env: QIX_DATA_FSYNC (default false)
    pub data_fsync: bool,

    /// Row codec for new writes: 0 = none, 1 = zstd. Reads accept both.
    /// Env: QIX_CODEC = none|zstd|0|1 (default zstd)
    pub codec: u16,

    /// Env: QIX_ZSTD_LEVEL (default 3)
    pub zstd_level: i32,

    /// Rows whose frame is larger than this go to an overflow chain.
    /// None => page_size/4.
    /// Env: QIX_INLINE_MAX_BYTES
    pub inline_max_bytes: Option<usize>,

    /// Upper bound for the stored (possibly compressed) value.
    /// Env: QIX_MAX_ROW_BYTES (default 8 MiB)
    pub max_row_bytes: usize,

    /// Open a store whose header is dirty (unclean shutdown) and rely on the page scan.
    /// Env: QIX_ALLOW_UNCLEAN_OPEN (default false)
    pub allow_unclean_open: bool,

    /// reorganize(): data pages with live bytes below this percent are evacuated.
    /// Env: QIX_REORG_FILL_PERCENT (default 50)
    pub reorg_fill_percent: u8,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            buckets: DEFAULT_BUCKETS,
            data_fsync: false,
            codec: CODEC_ZSTD,
            zstd_level: 3,
            inline_max_bytes: None,
            max_row_bytes: DEFAULT_MAX_ROW_BYTES,
            allow_unclean_open: false,
            reorg_fill_percent: 50,
        }
    }
}

fn env_flag(v: &str) -> bool {
    let s = v.trim().to_ascii_lowercase();
    s == "1" || s == "true" || s == "yes" || s == "on"
}

impl StoreConfig {
    /// Load configuration from environment variables. Unparsable values are ignored.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("QIX_PAGE_SIZE") {
            if let Ok(n) = v.trim().parse::<u32>() {
                cfg.page_size = n;
            }
        }
        if let Ok(v) = std::env::var("QIX_BUCKETS") {
            if let Ok(n) = v.trim().parse::<u32>() {
                cfg.buckets = n;
            }
        }
        if let Ok(v) = std::env::var("QIX_DATA_FSYNC") {
            cfg.data_fsync = env_flag(&v);
        }
        if let Ok(v) = std::env::var("QIX_CODEC") {
            match v.trim().to_ascii_lowercase().as_str() {
                "none" | "0" => cfg.codec = CODEC_NONE,
                "zstd" | "1" => cfg.codec = CODEC_ZSTD,
                _ => {}
            }
        }
        if let Ok(v) = std::env::var("QIX_ZSTD_LEVEL") {
            if let Ok(n) = v.trim().parse::<i32>() {
                cfg.zstd_level = n;
            }
        }
        if let Ok(v) = std::env::var("QIX_INLINE_MAX_BYTES") {
            if let Ok(n) = v.trim().parse::<usize>() {
                cfg.inline_max_bytes = Some(n);
            }
        }
        if let Ok(v) = std::env::var("QIX_MAX_ROW_BYTES") {
            if let Ok(n) = v.trim().parse::<usize>() {
                cfg.max_row_bytes = n;
            }
        }
        if let Ok(v) = std::env::var("QIX_ALLOW_UNCLEAN_OPEN") {
            cfg.allow_unclean_open = env_flag(&v);
        }
        if let Ok(v) = std::env::var("QIX_REORG_FILL_PERCENT") {
            if let Ok(n) = v.trim().parse::<u8>() {
                cfg.reorg_fill_percent = n;
            }
        }

        cfg
    }

    /// Fluent setters (builder-style) to override specific fields.

    pub fn with_page_size(mut self, ps: u32) -> Self {
        self.page_size = ps;
        self
    }

    pub fn with_buckets(mut self, buckets: u32) -> Self {
        self.buckets = buckets;
        self
    }

    pub fn with_data_fsync(mut self, on: bool) -> Self {
        self.data_fsync = on;
        self
    }

    pub fn with_codec(mut self, codec: u16) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_zstd_level(mut self, level: i32) -> Self {
        self.zstd_level = level;
        self
    }

    pub fn with_inline_max_bytes(mut self, max: Option<usize>) -> Self {
        self.inline_max_bytes = max;
        self
    }

    pub fn with_max_row_bytes(mut self, max: usize) -> Self {
        self.max_row_bytes = max;
        self
    }

    pub fn with_allow_unclean_open(mut self, on: bool) -> Self {
        self.allow_unclean_open = on;
        self
    }

    pub fn with_reorg_fill_percent(mut self, pct: u8) -> Self {
        self.reorg_fill_percent = pct;
        self
    }

    pub fn build(self) -> Self {
        self
    }

    /// Inline threshold for a given page size (rows above it go to overflow).
    pub fn inline_max_for(&self, page_size: usize) -> usize {
        let default = page_size / 4;
        self.inline_max_bytes
            .unwrap_or(default)
            .min(data_max_record(page_size))
    }

    pub fn validate(&self) -> Result<()> {
        validate_page_size(self.page_size)?;
        let ps = self.page_size as usize;
        let max_buckets = dir_root_max_buckets(ps);
        if self.buckets == 0 || self.buckets > max_buckets {
            return Err(StoreError::InvalidArgument(format!(
                "buckets must be in [1 .. {}] for page_size {}, got {}",
                max_buckets, ps, self.buckets
            )));
        }
        if self.codec != CODEC_NONE && self.codec != CODEC_ZSTD {
            return Err(StoreError::InvalidArgument(format!("unknown codec {}", self.codec)));
        }
        if !(1..=22).contains(&self.zstd_level) {
            return Err(StoreError::InvalidArgument(format!(
                "zstd_level must be in [1 .. 22], got {}",
                self.zstd_level
            )));
        }
        if self.max_row_bytes == 0 || self.max_row_bytes > u32::MAX as usize {
            return Err(StoreError::InvalidArgument(format!(
                "max_row_bytes out of range: {}",
                self.max_row_bytes
            )));
        }
        if let Some(inline) = self.inline_max_bytes {
            // Порог меньше кадра overflow-ссылки бессмыслен.
            let min_inline = ROW_HDR_SIZE + ROW_OVF_BODY;
            if inline < min_inline {
                return Err(StoreError::InvalidArgument(format!(
                    "inline_max_bytes must be >= {}, got {}",
                    min_inline, inline
                )));
            }
        }
        if !(1..=100).contains(&self.reorg_fill_percent) {
            return Err(StoreError::InvalidArgument(format!(
                "reorg_fill_percent must be in [1 .. 100], got {}",
                self.reorg_fill_percent
            )));
        }
        Ok(())
    }
}

impl fmt::Display for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StoreConfig {{ \
             page_size: {}, \
             buckets: {}, \
             data_fsync: {}, \
             codec: {}, \
             zstd_level: {}, \
             inline_max_bytes: {}, \
             max_row_bytes: {}, \
             allow_unclean_open: {}, \
             reorg_fill_percent: {} \
             }}",
            self.page_size,
            self.buckets,
            self.data_fsync,
            match self.codec {
                CODEC_NONE => "none",
                CODEC_ZSTD => "zstd",
                _ => "unknown",
            },
            self.zstd_level,
            self.inline_max_bytes
                .map(|v| v.to_string())
                .unwrap_or_else(|| "default(ps/4)".to_string()),
            self.max_row_bytes,
            self.allow_unclean_open,
            self.reorg_fill_percent,
        )
    }
}

/// Lightweight builder that produces a StoreConfig.
/// `Store::builder()` returns this builder.
#[derive(Clone, Debug)]
pub struct StoreBuilder {
    cfg: StoreConfig,
}

impl Default for StoreBuilder {
    fn default() -> Self {
        Self {
            cfg: StoreConfig::from_env(),
        }
    }
}

impl StoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a clean default (without reading env).
    pub fn from_default() -> Self {
        Self {
            cfg: StoreConfig::default(),
        }
    }

    pub fn page_size(mut self, ps: u32) -> Self {
        self.cfg.page_size = ps;
        self
    }

    pub fn buckets(mut self, buckets: u32) -> Self {
        self.cfg.buckets = buckets;
        self
    }

    pub fn data_fsync(mut self, on: bool) -> Self {
        self.cfg.data_fsync = on;
        self
    }

    pub fn codec(mut self, codec: u16) -> Self {
        self.cfg.codec = codec;
        self
    }

    pub fn zstd_level(mut self, level: i32) -> Self {
        self.cfg.zstd_level = level;
        self
    }

    pub fn inline_max_bytes(mut self, max: Option<usize>) -> Self {
        self.cfg.inline_max_bytes = max;
        self
    }

    pub fn max_row_bytes(mut self, max: usize) -> Self {
        self.cfg.max_row_bytes = max;
        self
    }

    pub fn allow_unclean_open(mut self, on: bool) -> Self {
        self.cfg.allow_unclean_open = on;
        self
    }

    pub fn reorg_fill_percent(mut self, pct: u8) -> Self {
        self.cfg.reorg_fill_percent = pct;
        self
    }

    pub fn build(self) -> StoreConfig {
        self.cfg
    }
}
