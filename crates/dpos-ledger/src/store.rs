// Key/value store trait and the in-memory reference implementation.
//
// The consensus core never talks to a storage engine directly; it receives
// a store handle at construction time and addresses everything through
// string keys. Embedders back this trait with their own persistence.

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while encoding or decoding stored values.
///
/// A decode failure means the stored bytes do not match the expected type
/// layout, which can only happen through embedder misuse; callers treat it
/// as fatal to the current transaction.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to encode value for key {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: bincode::Error,
    },

    #[error("failed to decode value for key {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: bincode::Error,
    },
}

/// Byte-level key/value storage.
///
/// SAFETY: Implementations must be last-write-wins and must return exactly
/// the bytes previously stored for a key. The consensus core serializes all
/// calls, so no internal ordering guarantees beyond that are required.
pub trait KvStore: Send + Sync {
    /// Fetch the raw bytes stored under `key`, if any.
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Store `value` under `key`, replacing any previous value.
    fn put(&self, key: &str, value: Vec<u8>);

    /// True if `key` currently holds a value.
    fn contains(&self, key: &str) -> bool;
}

impl<S: KvStore + ?Sized> KvStore for Arc<S> {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: Vec<u8>) {
        (**self).put(key, value)
    }

    fn contains(&self, key: &str) -> bool {
        (**self).contains(key)
    }
}

/// Typed access over any [`KvStore`], encoding values with bincode.
pub trait TypedStore: KvStore {
    fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.get(key) {
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|source| StoreError::Decode {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    fn put_typed<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let bytes = bincode::serialize(value).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.put(key, bytes);
        Ok(())
    }
}

impl<S: KvStore + ?Sized> TypedStore for S {}

/// In-memory store backed by an ordered map.
///
/// Used by every test in the workspace and suitable for embedders that keep
/// chain state resident. The lock only makes the handle `Sync`; the
/// consensus call sequence itself is serialized by the block pipeline.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Clone the full key/value map. Tests use this to assert that a
    /// rejected operation left the ledger untouched.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        self.inner.read().clone()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.read().get(key).cloned()
    }

    fn put(&self, key: &str, value: Vec<u8>) {
        self.inner.write().insert(key.to_string(), value);
    }

    fn contains(&self, key: &str) -> bool {
        self.inner.read().contains_key(key)
    }
}
