//! codec — кадр строки и сжатие значения.
//!
//! Кадр (LE):
//! ```text
//! [flags u8][klen u16][raw_len u32][stored_len u32][crc32 u32][key]
//! [stored bytes]          -- inline
//! [ovf head u64]          -- flags & 0x80 (значение в overflow-цепочке)
//! ```
//! flags bits 0..1 — кодек (0 none, 1 zstd). crc32 (crc32fast) считается по key || raw value,
//! поэтому проверка проходит только после распаковки.
//!
//! encode() выполняется до любой записи: CompressionError никогда не оставляет
//! частично записанной строки.

use byteorder::{ByteOrder, LittleEndian};

use crate::config::StoreConfig;
use crate::consts::{
    CODEC_NONE, CODEC_ZSTD, MAX_KEY_LEN, MIN_COMPRESS_LEN, ROW_FLAG_CODEC_MASK, ROW_FLAG_OVERFLOW,
    ROW_HDR_SIZE, ROW_OVF_BODY,
};
use crate::error::{PageNumber, Result, StoreError};

/// Encoded value ready to be framed.
#[derive(Debug, Clone)]
pub struct RowPayload {
    pub codec: u16,
    pub raw_len: u32,
    pub crc32: u32,
    pub stored: Vec<u8>,
}

impl RowPayload {
    #[inline]
    pub fn is_compressed(&self) -> bool {
        self.codec != CODEC_NONE
    }

    /// Размер inline-кадра для ключа длины `klen`.
    #[inline]
    pub fn inline_frame_len(&self, klen: usize) -> usize {
        ROW_HDR_SIZE + klen + self.stored.len()
    }

    fn header(&self, key: &[u8], overflow: bool) -> Vec<u8> {
        let mut flags = (self.codec as u8) & ROW_FLAG_CODEC_MASK;
        if overflow {
            flags |= ROW_FLAG_OVERFLOW;
        }
        let body = if overflow { ROW_OVF_BODY } else { self.stored.len() };
        let mut out = vec![0u8; ROW_HDR_SIZE + key.len() + body];
        out[0] = flags;
        LittleEndian::write_u16(&mut out[1..3], key.len() as u16);
        LittleEndian::write_u32(&mut out[3..7], self.raw_len);
        LittleEndian::write_u32(&mut out[7..11], self.stored.len() as u32);
        LittleEndian::write_u32(&mut out[11..15], self.crc32);
        out[ROW_HDR_SIZE..ROW_HDR_SIZE + key.len()].copy_from_slice(key);
        out
    }

    pub fn frame_inline(&self, key: &[u8]) -> Vec<u8> {
        let mut out = self.header(key, false);
        let at = ROW_HDR_SIZE + key.len();
        out[at..].copy_from_slice(&self.stored);
        out
    }

    pub fn frame_overflow(&self, key: &[u8], head: PageNumber) -> Vec<u8> {
        let mut out = self.header(key, true);
        let at = ROW_HDR_SIZE + key.len();
        LittleEndian::write_u64(&mut out[at..at + 8], head);
        out
    }
}

/// Where the stored bytes of a row live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowBody<'a> {
    Inline(&'a [u8]),
    Overflow(PageNumber),
}

/// Parsed (but not yet verified) row frame borrowed from a data page.
#[derive(Debug, Clone, Copy)]
pub struct RowFrame<'a> {
    pub codec: u16,
    pub raw_len: u32,
    pub stored_len: u32,
    pub crc32: u32,
    pub key: &'a [u8],
    pub body: RowBody<'a>,
}

impl<'a> RowFrame<'a> {
    pub fn parse(rec: &'a [u8]) -> Result<RowFrame<'a>> {
        if rec.len() < ROW_HDR_SIZE {
            return Err(StoreError::corrupted_row(format!(
                "row frame too short ({} bytes)",
                rec.len()
            )));
        }
        let flags = rec[0];
        if flags & !(ROW_FLAG_CODEC_MASK | ROW_FLAG_OVERFLOW) != 0 {
            return Err(StoreError::corrupted_row(format!("bad row flags {:#04x}", flags)));
        }
        let codec = (flags & ROW_FLAG_CODEC_MASK) as u16;
        if codec != CODEC_NONE && codec != CODEC_ZSTD {
            return Err(StoreError::corrupted_row(format!("unknown row codec {}", codec)));
        }
        let klen = LittleEndian::read_u16(&rec[1..3]) as usize;
        let raw_len = LittleEndian::read_u32(&rec[3..7]);
        let stored_len = LittleEndian::read_u32(&rec[7..11]);
        let crc32 = LittleEndian::read_u32(&rec[11..15]);
        let kend = ROW_HDR_SIZE + klen;
        if rec.len() < kend {
            return Err(StoreError::corrupted_row("row key exceeds record"));
        }
        let key = &rec[ROW_HDR_SIZE..kend];
        let body = if flags & ROW_FLAG_OVERFLOW != 0 {
            if rec.len() != kend + ROW_OVF_BODY {
                return Err(StoreError::corrupted_row("bad overflow placeholder length"));
            }
            RowBody::Overflow(LittleEndian::read_u64(&rec[kend..kend + 8]))
        } else {
            let stored = &rec[kend..];
            if stored.len() != stored_len as usize {
                return Err(StoreError::corrupted_row(format!(
                    "stored length mismatch (frame={}, actual={})",
                    stored_len,
                    stored.len()
                )));
            }
            RowBody::Inline(stored)
        };
        Ok(RowFrame {
            codec,
            raw_len,
            stored_len,
            crc32,
            key,
            body,
        })
    }

    #[inline]
    pub fn overflow_head(&self) -> Option<PageNumber> {
        match self.body {
            RowBody::Overflow(head) => Some(head),
            RowBody::Inline(_) => None,
        }
    }
}

fn row_crc(key: &[u8], value: &[u8]) -> u32 {
    let mut h = crc32fast::Hasher::new();
    h.update(key);
    h.update(value);
    h.finalize()
}

/// Row codec: compression policy and size limits for new writes.
#[derive(Debug, Clone)]
pub struct Codec {
    codec: u16,
    zstd_level: i32,
    max_row_bytes: usize,
}

impl Codec {
    pub fn new(codec: u16, zstd_level: i32, max_row_bytes: usize) -> Self {
        Self {
            codec,
            zstd_level,
            max_row_bytes,
        }
    }

    pub fn from_config(cfg: &StoreConfig) -> Self {
        Self::new(cfg.codec, cfg.zstd_level, cfg.max_row_bytes)
    }

    pub fn encode(&self, key: &[u8], value: &[u8]) -> Result<RowPayload> {
        if key.is_empty() {
            return Err(StoreError::InvalidArgument("empty key".into()));
        }
        if key.len() > MAX_KEY_LEN {
            return Err(StoreError::CompressionError {
                reason: format!("key length {} exceeds {}", key.len(), MAX_KEY_LEN),
            });
        }
        let raw_len = u32::try_from(value.len()).map_err(|_| StoreError::CompressionError {
            reason: format!("value length {} overflows u32", value.len()),
        })?;

        let mut codec = CODEC_NONE;
        let mut stored = None;
        if self.codec == CODEC_ZSTD && value.len() >= MIN_COMPRESS_LEN {
            let packed = zstd::bulk::compress(value, self.zstd_level).map_err(|e| {
                StoreError::CompressionError {
                    reason: format!("zstd compress: {}", e),
                }
            })?;
            if packed.len() < value.len() {
                codec = CODEC_ZSTD;
                stored = Some(packed);
            }
        }
        let stored = stored.unwrap_or_else(|| value.to_vec());

        if stored.len() > self.max_row_bytes {
            return Err(StoreError::CompressionError {
                reason: format!(
                    "stored payload {} bytes exceeds max_row_bytes {}",
                    stored.len(),
                    self.max_row_bytes
                ),
            });
        }

        Ok(RowPayload {
            codec,
            raw_len,
            crc32: row_crc(key, value),
            stored,
        })
    }
}

/// Восстановить значение из кадра и его stored-байтов (inline или собранных из цепочки).
/// Любое несоответствие — FileCorrupted без номера страницы.
pub fn decode(frame: &RowFrame<'_>, stored: &[u8]) -> Result<Vec<u8>> {
    if stored.len() != frame.stored_len as usize {
        return Err(StoreError::corrupted_row(format!(
            "stored length mismatch (frame={}, actual={})",
            frame.stored_len,
            stored.len()
        )));
    }
    let value = match frame.codec {
        CODEC_NONE => stored.to_vec(),
        CODEC_ZSTD => zstd::bulk::decompress(stored, frame.raw_len as usize)
            .map_err(|e| StoreError::corrupted_row(format!("zstd decompress: {}", e)))?,
        other => {
            return Err(StoreError::corrupted_row(format!("unknown row codec {}", other)));
        }
    };
    if value.len() != frame.raw_len as usize {
        return Err(StoreError::corrupted_row(format!(
            "raw length mismatch (frame={}, actual={})",
            frame.raw_len,
            value.len()
        )));
    }
    let crc = row_crc(frame.key, &value);
    if crc != frame.crc32 {
        return Err(StoreError::corrupted_row(format!(
            "row crc mismatch (stored={:#010x}, calc={:#010x})",
            frame.crc32, crc
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zstd_codec() -> Codec {
        Codec::new(CODEC_ZSTD, 3, 1 << 20)
    }

    fn inline_roundtrip(codec: &Codec, key: &[u8], value: &[u8]) -> Vec<u8> {
        let p = codec.encode(key, value).unwrap();
        let frame_bytes = p.frame_inline(key);
        let frame = RowFrame::parse(&frame_bytes).unwrap();
        assert_eq!(frame.key, key);
        match frame.body {
            RowBody::Inline(stored) => decode(&frame, stored).unwrap(),
            RowBody::Overflow(_) => panic!("expected inline body"),
        }
    }

    #[test]
    fn small_values_stay_raw() {
        let c = zstd_codec();
        let p = c.encode(b"k", b"short").unwrap();
        assert!(!p.is_compressed());
        assert_eq!(inline_roundtrip(&c, b"k", b"short"), b"short");
        assert_eq!(inline_roundtrip(&c, b"k", b""), b"");
    }

    #[test]
    fn repetitive_values_are_compressed() {
        let c = zstd_codec();
        let value = b"xref:".repeat(200);
        let p = c.encode(b"sym:1", &value).unwrap();
        assert!(p.is_compressed());
        assert!(p.stored.len() < value.len());
        assert_eq!(inline_roundtrip(&c, b"sym:1", &value), value);
    }

    #[test]
    fn overflow_frame_carries_head() {
        let c = Codec::new(CODEC_NONE, 3, 1 << 20);
        let p = c.encode(b"big", &[1u8; 5000]).unwrap();
        let f = p.frame_overflow(b"big", 77);
        assert_eq!(f.len(), ROW_HDR_SIZE + 3 + ROW_OVF_BODY);
        let frame = RowFrame::parse(&f).unwrap();
        assert_eq!(frame.overflow_head(), Some(77));
        assert_eq!(frame.stored_len, 5000);
        assert_eq!(decode(&frame, &p.stored).unwrap(), vec![1u8; 5000]);
    }

    #[test]
    fn limits_raise_compression_error() {
        let c = Codec::new(CODEC_NONE, 3, 100);
        match c.encode(b"k", &[0u8; 101]) {
            Err(StoreError::CompressionError { .. }) => {}
            other => panic!("expected CompressionError, got {:?}", other),
        }
        let long_key = vec![b'k'; MAX_KEY_LEN + 1];
        assert!(matches!(
            c.encode(&long_key, b"v"),
            Err(StoreError::CompressionError { .. })
        ));
    }

    #[test]
    fn tampering_is_detected_as_corruption() {
        let c = zstd_codec();
        let value = b"abcdefgh".repeat(32);
        let p = c.encode(b"key", &value).unwrap();
        let mut f = p.frame_inline(b"key");

        // Повреждение внутри сжатых байтов.
        let last = f.len() - 1;
        f[last] ^= 0xFF;
        let frame = RowFrame::parse(&f).unwrap();
        let stored = match frame.body {
            RowBody::Inline(s) => s,
            _ => unreachable!(),
        };
        assert!(decode(&frame, stored).unwrap_err().is_corrupted());

        // Неверная длина stored.
        let mut f = p.frame_inline(b"key");
        f.push(0);
        assert!(RowFrame::parse(&f).unwrap_err().is_corrupted());

        // Неизвестные флаги.
        let mut f = p.frame_inline(b"key");
        f[0] |= 0x40;
        assert!(RowFrame::parse(&f).unwrap_err().is_corrupted());
    }
}
