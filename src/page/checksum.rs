//! page/checksum — 16-байтовый трейлер страницы.
//!
//! - trailer[0..4] — CRC32C (LE) по всей странице с занулённым трейлером;
//! - trailer[4..16] — нули.
//!
//! Проверка строгая: нулевой трейлер не считается "пустой" страницей,
//! любая страница в пределах page_count должна нести корректный CRC.

use byteorder::{ByteOrder, LittleEndian};

use super::common::TRAILER_LEN;

const ZERO_TRAILER: [u8; TRAILER_LEN] = [0u8; TRAILER_LEN];

/// CRC32C по странице так, как будто трейлер занулён (без копирования страницы).
#[inline]
fn page_crc32c(page: &[u8]) -> u32 {
    let ps = page.len();
    let body = crc32c::crc32c(&page[..ps - TRAILER_LEN]);
    crc32c::crc32c_append(body, &ZERO_TRAILER)
}

/// Обновить трейлер чексуммы страницы.
pub fn page_update_checksum(page: &mut [u8]) {
    debug_assert!(page.len() > TRAILER_LEN);
    let ps = page.len();
    let digest = page_crc32c(page);
    page[ps - TRAILER_LEN..].fill(0);
    LittleEndian::write_u32(&mut page[ps - TRAILER_LEN..ps - TRAILER_LEN + 4], digest);
}

/// true = трейлер совпадает с содержимым.
pub fn page_verify_checksum(page: &[u8]) -> bool {
    if page.len() <= TRAILER_LEN {
        return false;
    }
    let ps = page.len();
    if page[ps - TRAILER_LEN + 4..].iter().any(|&b| b != 0) {
        return false;
    }
    page_trailer_crc32(page) == page_crc32c(page)
}

#[inline]
pub fn page_trailer_crc32(page: &[u8]) -> u32 {
    let ps = page.len();
    LittleEndian::read_u32(&page[ps - TRAILER_LEN..ps - TRAILER_LEN + 4])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_then_verify_and_detect_flip() {
        let mut page = vec![0u8; 4096];
        page[100] = 7;
        page_update_checksum(&mut page);
        assert!(page_verify_checksum(&page));

        page[200] ^= 0x10;
        assert!(!page_verify_checksum(&page));
    }

    #[test]
    fn zero_trailer_is_not_accepted() {
        let mut page = vec![0u8; 4096];
        page[0..4].copy_from_slice(b"QXPG");
        assert!(!page_verify_checksum(&page));
    }

    #[test]
    fn crc_matches_zeroed_copy() {
        let mut page = vec![0xA5u8; 4096];
        page_update_checksum(&mut page);
        let mut copy = page.clone();
        let ps = copy.len();
        copy[ps - TRAILER_LEN..].fill(0);
        assert_eq!(page_trailer_crc32(&page), crc32c::crc32c(&copy));
    }
}
