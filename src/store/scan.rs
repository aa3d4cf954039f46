//! store/scan — перечисление содержимого (аудит и перестроение у индексатора).

use crate::error::Result;

use super::core::Store;

impl Store {
    /// Все пары (ключ, значение); порядок не определён.
    pub fn scan_all(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.index.scan_all()
    }

    pub fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.index.scan_prefix(prefix)
    }

    /// Потоковый обход без накопления результата.
    pub fn scan_stream<F>(&self, f: F) -> Result<()>
    where
        F: FnMut(&[u8], Vec<u8>) -> Result<()>,
    {
        self.index.scan_stream(f)
    }

    pub fn keys(&self) -> Result<Vec<Vec<u8>>> {
        self.index.keys()
    }
}
