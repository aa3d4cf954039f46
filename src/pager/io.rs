//! pager/io — чтение/запись страниц:
//! - read / read_into: чтение + проверка трейлера CRC32C, magic/версии/типа и page_id;
//! - write: запись страницы вызывающего (трейлер считает store), fsync по data_fsync;
//! - write_raw: физическая запись через перехватчик сбоев (pager::fault).
//!
//! Страница 0 (заголовок) через read/write недоступна: ей управляет core.rs.

use log::warn;
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};

use crate::error::{PageNumber, Result, StoreError};
use crate::metrics::{
    record_corruption, record_lost_write, record_page_read, record_page_written, record_torn_write,
};
use crate::page::{header_read, page_update_checksum, page_verify_checksum, PageHeader};

use super::core::PageStore;
use super::fault::WriteFate;

fn write_at(file: &File, off: u64, bytes: &[u8]) -> std::io::Result<()> {
    let mut f = file;
    f.seek(SeekFrom::Start(off))?;
    f.write_all(bytes)
}

impl PageStore {
    fn check_page_args(&self, pid: PageNumber, len: usize) -> Result<()> {
        if len != self.page_size() {
            return Err(StoreError::InvalidArgument(format!(
                "buffer size {} != page_size {}",
                len,
                self.page_size()
            )));
        }
        if pid == 0 {
            return Err(StoreError::InvalidArgument(
                "page 0 is the file header".into(),
            ));
        }
        if pid >= self.header.page_count {
            return Err(StoreError::PageOutOfRange {
                page: pid,
                page_count: self.header.page_count,
            });
        }
        Ok(())
    }

    /// Прочитать и проверить страницу.
    pub fn read(&self, pid: PageNumber) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.page_size()];
        self.read_into(pid, &mut buf)?;
        Ok(buf)
    }

    /// Прочитать страницу в буфер вызывающего. Возвращает разобранный общий заголовок.
    pub fn read_into(&self, pid: PageNumber, buf: &mut [u8]) -> Result<PageHeader> {
        self.check_live()?;
        self.check_page_args(pid, buf.len())?;

        let off = pid * self.page_size() as u64;
        {
            let mut f = self.live_file()?;
            f.seek(SeekFrom::Start(off))?;
            f.read_exact(buf).map_err(|e| match e.kind() {
                ErrorKind::UnexpectedEof => StoreError::corrupted(pid, "short read"),
                _ => StoreError::Io(e),
            })?;
        }
        record_page_read();

        verify_page(pid, buf).map_err(|e| {
            record_corruption();
            warn!("pager: {}: {}", self.path.display(), e);
            e
        })
    }

    /// Записать страницу. Буфер должен нести корректный общий заголовок с тем же page_id;
    /// трейлер пересчитывается на месте.
    pub fn write(&mut self, pid: PageNumber, buf: &mut [u8]) -> Result<()> {
        self.check_live()?;
        self.check_page_args(pid, buf.len())?;
        let h = header_read(buf).map_err(|e| {
            StoreError::InvalidArgument(format!("page {} image has no valid header: {}", pid, e))
        })?;
        if h.page_id != pid {
            return Err(StoreError::InvalidArgument(format!(
                "page image stamped with id {} written to page {}",
                h.page_id, pid
            )));
        }
        self.mark_dirty()?;
        page_update_checksum(buf);
        self.write_raw(pid, buf)?;
        if self.data_fsync {
            self.live_file()?.sync_data()?;
        }
        Ok(())
    }

    /// Физическая запись по смещению страницы; перехватчик решает судьбу записи.
    pub(crate) fn write_raw(&mut self, pid: PageNumber, bytes: &[u8]) -> Result<()> {
        let fate = match self.interceptor.as_mut() {
            Some(i) => i.on_write(pid, bytes.len()),
            None => WriteFate::Complete,
        };
        let off = pid * self.page_size() as u64;
        match fate {
            WriteFate::Complete => {
                write_at(self.live_file()?, off, bytes)?;
                record_page_written();
                Ok(())
            }
            WriteFate::Torn { keep } => {
                let keep = keep.min(bytes.len());
                let flushed = self.live_file().and_then(|f| {
                    write_at(f, off, &bytes[..keep])?;
                    f.sync_all()?;
                    Ok(())
                });
                record_torn_write();
                self.power_off(pid);
                // Store выключен в любом случае; сбой I/O возвращается вместо PowerOff.
                flushed?;
                Err(StoreError::PowerOff { page: pid })
            }
            WriteFate::Lost => {
                record_lost_write();
                self.power_off(pid);
                Err(StoreError::PowerOff { page: pid })
            }
        }
    }

    fn power_off(&mut self, pid: PageNumber) {
        warn!(
            "pager: simulated power-off while writing page {} of {}",
            pid,
            self.path.display()
        );
        self.powered_off = Some(pid);
    }
}

/// Проверка страницы без контекста store: CRC, magic/версия/тип, собственный номер.
pub fn verify_page(pid: PageNumber, buf: &[u8]) -> Result<PageHeader> {
    if !page_verify_checksum(buf) {
        return Err(StoreError::corrupted(pid, "page checksum mismatch"));
    }
    let h = header_read(buf).map_err(|e| e.at_page(pid))?;
    if h.page_id != pid {
        return Err(StoreError::corrupted(
            pid,
            format!("page carries foreign id {}", h.page_id),
        ));
    }
    Ok(h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::common::{page_init, PageType};
    use crate::page::page_update_checksum;

    #[test]
    fn verify_page_classifies_damage() {
        let mut p = vec![0u8; 4096];
        page_init(&mut p, PageType::Data, 3);
        page_update_checksum(&mut p);
        assert_eq!(verify_page(3, &p).unwrap().page_type, PageType::Data);

        match verify_page(4, &p) {
            Err(StoreError::FileCorrupted { page, .. }) => assert_eq!(page, Some(4)),
            other => panic!("unexpected {:?}", other),
        }

        p[1000] ^= 1;
        assert!(verify_page(3, &p).unwrap_err().is_corrupted());
    }
}
