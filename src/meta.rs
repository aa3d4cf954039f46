// src/meta.rs — заголовок файла хранилища (страница 0)
//
// Формат (LE), первые 68 байт страницы 0, остаток — нули:
// MAGIC8 = "QIXSTORE"
// u32 version        = 1
// u32 page_size      (4 KiB..=64 KiB, power of two)
// u32 hash_kind      (1 = xxhash64(seed=0))
// u16 codec_default  (0=none,1=zstd)
// u8  state          (1=clean, 0=dirty)
// u8  reserved
// u64 root_dir_page
// u64 free_head      (NO_PAGE если free-лист пуст)
// u64 page_count     (включая страницу 0)
// u64 free_count
// u64 generation
// u32 crc32          (crc32fast по байтам [0..64])
//
// Порядок проверок при чтении: magic -> version -> page_size -> crc -> hash_kind/state.
// Версия проверяется до CRC: заголовок чужой версии должен давать FileVersionError.

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use crate::consts::{
    CODEC_NONE, CODEC_ZSTD, FILE_MAGIC, FORMAT_VERSION, HEADER_LEN, MAX_PAGE_SIZE, MIN_PAGE_SIZE,
    NO_PAGE, STATE_CLEAN, STATE_DIRTY, SUPPORTED_VERSIONS,
};
use crate::error::{Result, StoreError};
use crate::hash::{HashKind, HASH_KIND_DEFAULT};

const OFF_CRC: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u32,
    pub page_size: u32,
    pub hash_kind: u32,
    pub codec_default: u16,
    /// false после первой мутации и до следующего sync().
    pub clean: bool,
    pub root_dir_page: u64,
    pub free_head: u64,
    pub page_count: u64,
    pub free_count: u64,
    pub generation: u64,
}

impl FileHeader {
    /// Заголовок нового хранилища: только страница 0, directory ещё не создан.
    pub fn new(page_size: u32, codec_default: u16) -> Self {
        Self {
            version: FORMAT_VERSION,
            page_size,
            hash_kind: HASH_KIND_DEFAULT.to_u32(),
            codec_default,
            clean: true,
            root_dir_page: NO_PAGE,
            free_head: NO_PAGE,
            page_count: 1,
            free_count: 0,
            generation: 0,
        }
    }

    pub fn hash(&self) -> HashKind {
        HashKind::from_u32(self.hash_kind).unwrap_or(HASH_KIND_DEFAULT)
    }

    /// Expected file length for this header.
    pub fn file_len(&self) -> u64 {
        self.page_count * self.page_size as u64
    }

    /// Serialized header (HEADER_LEN bytes, CRC included).
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN);
        // Writes into a Vec cannot fail.
        let _ = self.write_fields(&mut buf);
        let crc = crc32fast::hash(&buf[..OFF_CRC]);
        let mut tail = [0u8; 4];
        LittleEndian::write_u32(&mut tail, crc);
        buf.extend_from_slice(&tail);
        debug_assert_eq!(buf.len(), HEADER_LEN);
        buf
    }

    fn write_fields(&self, w: &mut Vec<u8>) -> std::io::Result<()> {
        w.extend_from_slice(FILE_MAGIC);
        w.write_u32::<LittleEndian>(self.version)?;
        w.write_u32::<LittleEndian>(self.page_size)?;
        w.write_u32::<LittleEndian>(self.hash_kind)?;
        w.write_u16::<LittleEndian>(self.codec_default)?;
        w.write_u8(if self.clean { STATE_CLEAN } else { STATE_DIRTY })?;
        w.write_u8(0)?;
        w.write_u64::<LittleEndian>(self.root_dir_page)?;
        w.write_u64::<LittleEndian>(self.free_head)?;
        w.write_u64::<LittleEndian>(self.page_count)?;
        w.write_u64::<LittleEndian>(self.free_count)?;
        w.write_u64::<LittleEndian>(self.generation)?;
        Ok(())
    }

    /// Full page-0 image: header followed by zeros.
    pub fn encode_page(&self) -> Vec<u8> {
        let mut page = vec![0u8; self.page_size as usize];
        page[..HEADER_LEN].copy_from_slice(&self.encode());
        page
    }

    /// Разобрать и проверить заголовок. Все ошибки формата — FileCorrupted{page 0},
    /// кроме неподдерживаемой версии (FileVersionError).
    pub fn decode(buf: &[u8]) -> Result<FileHeader> {
        if buf.len() < HEADER_LEN {
            return Err(StoreError::corrupted(0, "file too short for header"));
        }
        if &buf[0..8] != FILE_MAGIC {
            return Err(StoreError::corrupted(0, "bad file magic"));
        }

        let mut rd = Cursor::new(&buf[8..OFF_CRC]);
        let version = rd.read_u32::<LittleEndian>()?;
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(StoreError::FileVersionError {
                found: version,
                supported: SUPPORTED_VERSIONS,
            });
        }
        let page_size = rd.read_u32::<LittleEndian>()?;
        validate_page_size(page_size).map_err(|e| StoreError::corrupted(0, e.to_string()))?;

        let stored_crc = LittleEndian::read_u32(&buf[OFF_CRC..OFF_CRC + 4]);
        let calc_crc = crc32fast::hash(&buf[..OFF_CRC]);
        if stored_crc != calc_crc {
            return Err(StoreError::corrupted(
                0,
                format!("header crc mismatch (stored={:#010x}, calc={:#010x})", stored_crc, calc_crc),
            ));
        }

        let hash_kind = rd.read_u32::<LittleEndian>()?;
        if HashKind::from_u32(hash_kind).is_none() {
            return Err(StoreError::corrupted(0, format!("unknown hash kind {}", hash_kind)));
        }
        let codec_default = rd.read_u16::<LittleEndian>()?;
        if codec_default != CODEC_NONE && codec_default != CODEC_ZSTD {
            return Err(StoreError::corrupted(0, format!("unknown codec {}", codec_default)));
        }
        let clean = match rd.read_u8()? {
            STATE_CLEAN => true,
            STATE_DIRTY => false,
            other => {
                return Err(StoreError::corrupted(0, format!("bad header state {}", other)));
            }
        };
        let _reserved = rd.read_u8()?;
        let h = FileHeader {
            version,
            page_size,
            hash_kind,
            codec_default,
            clean,
            root_dir_page: rd.read_u64::<LittleEndian>()?,
            free_head: rd.read_u64::<LittleEndian>()?,
            page_count: rd.read_u64::<LittleEndian>()?,
            free_count: rd.read_u64::<LittleEndian>()?,
            generation: rd.read_u64::<LittleEndian>()?,
        };
        if h.page_count == 0 || h.free_count >= h.page_count {
            return Err(StoreError::corrupted(
                0,
                format!("bad page accounting (pages={}, free={})", h.page_count, h.free_count),
            ));
        }
        Ok(h)
    }
}

/// Размер страницы: степень двойки в [4 KiB .. 64 KiB].
pub fn validate_page_size(page_size: u32) -> Result<()> {
    if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size) || !page_size.is_power_of_two() {
        return Err(StoreError::InvalidArgument(format!(
            "page_size must be a power of two in [{} .. {}], got {}",
            MIN_PAGE_SIZE, MAX_PAGE_SIZE, page_size
        )));
    }
    Ok(())
}
