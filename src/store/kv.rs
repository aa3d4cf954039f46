//! store/kv — одиночные операции над строками.

use crate::error::Result;
use crate::index::RowLoc;

use super::core::Store;

impl Store {
    /// Вставить или заменить строку. CompressionError — до каких-либо записей.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<RowLoc> {
        self.index.insert(key, value)
    }

    /// `Ok(None)` — ключа нет.
    pub fn lookup(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.index.lookup(key)
    }

    pub fn location(&self, key: &[u8]) -> Result<Option<RowLoc>> {
        self.index.location(key)
    }

    /// RowNotFoundWhenDeleting, если ключа нет (рассинхронизация с индексатором).
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.index.delete(key)
    }

    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        Ok(self.index.location(key)?.is_some())
    }
}
