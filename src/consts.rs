//! Общие константы формата (header, страницы, directory, строки).

// -------- File header (page 0) --------
pub const FILE_MAGIC: &[u8; 8] = b"QIXSTORE";

/// Текущая версия формата файла.
pub const FORMAT_VERSION: u32 = 1;

/// Versions this engine can open. Anything else is a `FileVersionError`.
pub const SUPPORTED_VERSIONS: &[u32] = &[FORMAT_VERSION];

/// Размер сериализованного заголовка (остаток страницы 0 — нули).
pub const HEADER_LEN: usize = 68;

pub const STATE_DIRTY: u8 = 0;
pub const STATE_CLEAN: u8 = 1;

// -------- Page size bounds --------
// Слоты данных адресуются u16, поэтому верхняя граница — 64 KiB.
pub const MIN_PAGE_SIZE: u32 = 4096;
pub const MAX_PAGE_SIZE: u32 = 64 * 1024;
pub const DEFAULT_PAGE_SIZE: u32 = 4096;

pub const NO_PAGE: u64 = u64::MAX;

// -------- Directory --------
pub const DEFAULT_BUCKETS: u32 = 64;

/// Directory entry: [hash u64][page u64][slot u16].
pub const DIR_ENTRY_SIZE: usize = 18;

// -------- Rows --------
/// Row frame header: [flags u8][klen u16][raw_len u32][stored_len u32][crc32 u32].
pub const ROW_HDR_SIZE: usize = 15;

/// Overflow placeholder body: [head page u64].
pub const ROW_OVF_BODY: usize = 8;

pub const ROW_FLAG_CODEC_MASK: u8 = 0x03;
pub const ROW_FLAG_OVERFLOW: u8 = 0x80;

pub const CODEC_NONE: u16 = 0;
pub const CODEC_ZSTD: u16 = 1;

/// Values shorter than this are never compressed.
pub const MIN_COMPRESS_LEN: usize = 64;

pub const DEFAULT_MAX_ROW_BYTES: usize = 8 * 1024 * 1024;

/// Keys must always fit in the inline part of a row.
pub const MAX_KEY_LEN: usize = 1024;
