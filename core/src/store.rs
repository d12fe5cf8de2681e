//! State accessor contract the relay engine runs against.

use std::collections::HashMap;

use crypto_bigint::U256;

use crate::error::StoreError;
use crate::header::{Digest, StoredHeader};

/// Every write produced by one ingestion. Backends apply it all or nothing.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StateBatch {
    pub headers: Vec<StoredHeader>,
    pub current_epoch_difficulty: Option<U256>,
    pub prev_epoch_difficulty: Option<U256>,
    pub best_known_digest: Option<Digest>,
    pub relay_genesis: Option<Digest>,
    pub last_reorg_common_ancestor: Option<Digest>,
}

impl StateBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_header(&mut self, header: StoredHeader) -> &mut Self {
        self.headers.push(header);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Key-value view of the relay state owned by the host.
///
/// Unset epoch difficulties read as zero. Unset digest slots read as `None`.
pub trait RelayStore {
    fn get_header(&self, digest: &Digest) -> Result<Option<StoredHeader>, StoreError>;
    fn put_header(&mut self, digest: Digest, header: StoredHeader) -> Result<(), StoreError>;

    fn current_epoch_difficulty(&self) -> Result<U256, StoreError>;
    fn set_current_epoch_difficulty(&mut self, target: U256) -> Result<(), StoreError>;
    fn prev_epoch_difficulty(&self) -> Result<U256, StoreError>;
    fn set_prev_epoch_difficulty(&mut self, target: U256) -> Result<(), StoreError>;

    fn best_known_digest(&self) -> Result<Option<Digest>, StoreError>;
    fn set_best_known_digest(&mut self, digest: Digest) -> Result<(), StoreError>;
    fn relay_genesis(&self) -> Result<Option<Digest>, StoreError>;
    fn set_relay_genesis(&mut self, digest: Digest) -> Result<(), StoreError>;
    fn last_reorg_common_ancestor(&self) -> Result<Option<Digest>, StoreError>;
    fn set_last_reorg_common_ancestor(&mut self, digest: Digest) -> Result<(), StoreError>;

    /// Applies `batch` through the individual setters. Backends with a native
    /// write batch override this to make the commit atomic.
    fn commit(&mut self, batch: StateBatch) -> Result<(), StoreError> {
        for header in batch.headers {
            self.put_header(header.digest(), header)?;
        }
        if let Some(target) = batch.prev_epoch_difficulty {
            self.set_prev_epoch_difficulty(target)?;
        }
        if let Some(target) = batch.current_epoch_difficulty {
            self.set_current_epoch_difficulty(target)?;
        }
        if let Some(digest) = batch.relay_genesis {
            self.set_relay_genesis(digest)?;
        }
        if let Some(digest) = batch.best_known_digest {
            self.set_best_known_digest(digest)?;
        }
        if let Some(digest) = batch.last_reorg_common_ancestor {
            self.set_last_reorg_common_ancestor(digest)?;
        }
        Ok(())
    }
}

/// In-memory `RelayStore`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MemoryStore {
    headers: HashMap<Digest, StoredHeader>,
    current_epoch_difficulty: U256,
    prev_epoch_difficulty: U256,
    best_known_digest: Option<Digest>,
    relay_genesis: Option<Digest>,
    last_reorg_common_ancestor: Option<Digest>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

impl RelayStore for MemoryStore {
    fn get_header(&self, digest: &Digest) -> Result<Option<StoredHeader>, StoreError> {
        Ok(self.headers.get(digest).cloned())
    }

    fn put_header(&mut self, digest: Digest, header: StoredHeader) -> Result<(), StoreError> {
        self.headers.insert(digest, header);
        Ok(())
    }

    fn current_epoch_difficulty(&self) -> Result<U256, StoreError> {
        Ok(self.current_epoch_difficulty)
    }

    fn set_current_epoch_difficulty(&mut self, target: U256) -> Result<(), StoreError> {
        self.current_epoch_difficulty = target;
        Ok(())
    }

    fn prev_epoch_difficulty(&self) -> Result<U256, StoreError> {
        Ok(self.prev_epoch_difficulty)
    }

    fn set_prev_epoch_difficulty(&mut self, target: U256) -> Result<(), StoreError> {
        self.prev_epoch_difficulty = target;
        Ok(())
    }

    fn best_known_digest(&self) -> Result<Option<Digest>, StoreError> {
        Ok(self.best_known_digest)
    }

    fn set_best_known_digest(&mut self, digest: Digest) -> Result<(), StoreError> {
        self.best_known_digest = Some(digest);
        Ok(())
    }

    fn relay_genesis(&self) -> Result<Option<Digest>, StoreError> {
        Ok(self.relay_genesis)
    }

    fn set_relay_genesis(&mut self, digest: Digest) -> Result<(), StoreError> {
        self.relay_genesis = Some(digest);
        Ok(())
    }

    fn last_reorg_common_ancestor(&self) -> Result<Option<Digest>, StoreError> {
        Ok(self.last_reorg_common_ancestor)
    }

    fn set_last_reorg_common_ancestor(&mut self, digest: Digest) -> Result<(), StoreError> {
        self.last_reorg_common_ancestor = Some(digest);
        Ok(())
    }
}
