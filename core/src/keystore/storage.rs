// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Secure storage backends
//!
//! Opaque key-value persistence gated by whatever secure storage the
//! platform provides (a keychain, an encrypted file, flash). The
//! [`KeyStore`][super::KeyStore] seals application blobs before they
//! reach the backend, so a backend only ever sees ciphertext (key
//! material slots excepted, the backend itself is the trust boundary
//! for those).

use std::collections::BTreeMap;

/// Storage backend errors
#[derive(Clone, PartialEq, Debug, thiserror::Error)]
pub enum StorageError {
    /// Backend rejected the write
    #[error("storage write failed: {0}")]
    WriteFailed(String),

    /// Backend rejected the read
    #[error("storage read failed: {0}")]
    ReadFailed(String),
}

/// Secure storage backend
///
/// Failures are reported, never silently swallowed.
pub trait SecureStorage {
    /// Store a blob under the provided key, replacing any existing value
    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Fetch a blob by key
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Delete a blob by key, returning whether a value was present
    fn delete(&mut self, key: &str) -> Result<bool, StorageError>;

    /// List stored keys
    fn keys(&self) -> Result<Vec<String>, StorageError>;
}

/// In-memory storage backend
///
/// The default for emulation and tests, platform keychain backends are
/// supplied by the embedding application.
#[derive(Clone, Default, Debug)]
pub struct MemoryStorage {
    values: BTreeMap<String, Vec<u8>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecureStorage for MemoryStorage {
    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.values.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.values.get(key).cloned())
    }

    fn delete(&mut self, key: &str) -> Result<bool, StorageError> {
        Ok(self.values.remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.values.keys().cloned().collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn memory_storage_crud() {
        let mut s = MemoryStorage::new();

        assert_eq!(s.get("a"), Ok(None));

        s.put("a", &[1, 2, 3]).unwrap();
        assert_eq!(s.get("a"), Ok(Some(vec![1, 2, 3])));

        s.put("a", &[4]).unwrap();
        assert_eq!(s.get("a"), Ok(Some(vec![4])));

        assert_eq!(s.keys(), Ok(vec!["a".to_string()]));

        assert_eq!(s.delete("a"), Ok(true));
        assert_eq!(s.delete("a"), Ok(false));
        assert_eq!(s.get("a"), Ok(None));
    }
}
