use anyhow::{anyhow, Context, Result};
use bitcoin_relay_core::{Digest, RelayStore, StateBatch, StoreError, StoredHeader};
use borsh::BorshDeserialize;
use crypto_bigint::{Encoding, U256};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use tracing::debug;

/// RocksDB-backed relay state
pub struct RocksDbStore {
    db: DB,
}

// Column family names
const HEADERS_CF: &str = "headers";
const METADATA_CF: &str = "metadata";

// Keys in the metadata column family
const CURRENT_EPOCH_DIFFICULTY_KEY: &[u8] = b"CURRENT_EPOCH_DIFFICULTY";
const PREV_EPOCH_DIFFICULTY_KEY: &[u8] = b"PREV_EPOCH_DIFFICULTY";
const BEST_KNOWN_DIGEST_KEY: &[u8] = b"BEST_KNOWN_DIGEST";
const RELAY_GENESIS_KEY: &[u8] = b"RELAY_GENESIS";
const LAST_REORG_COMMON_ANCESTOR_KEY: &[u8] = b"LAST_REORG_COMMON_ANCESTOR";

impl RocksDbStore {
    /// Opens (or creates) the store at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_names = vec![
            ColumnFamilyDescriptor::new(HEADERS_CF, Options::default()),
            ColumnFamilyDescriptor::new(METADATA_CF, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, cf_names)
            .context("Failed to open RocksDB database")?;

        Ok(Self { db })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| anyhow!("Column family '{}' not found", name))
    }

    /// Number of stored headers.
    pub fn header_count(&self) -> Result<usize> {
        let cf = self.cf(HEADERS_CF)?;
        let mut count = 0;
        for entry in self.db.iterator_cf(cf, IteratorMode::Start) {
            entry?;
            count += 1;
        }
        Ok(count)
    }

    fn read_header(&self, digest: &Digest) -> Result<Option<StoredHeader>> {
        let cf = self.cf(HEADERS_CF)?;
        match self.db.get_cf(cf, digest.as_bytes())? {
            Some(bytes) => {
                let header = StoredHeader::try_from_slice(&bytes)
                    .with_context(|| format!("Failed to deserialize header {}", digest))?;
                Ok(Some(header))
            }
            None => Ok(None),
        }
    }

    fn read_metadata(&self, key: &[u8]) -> Result<Option<[u8; 32]>> {
        let cf = self.cf(METADATA_CF)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => {
                let value: [u8; 32] = bytes.try_into().map_err(|_| {
                    anyhow!("Invalid value for '{}'", String::from_utf8_lossy(key))
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn write_metadata(&self, key: &[u8], value: [u8; 32]) -> Result<()> {
        let cf = self.cf(METADATA_CF)?;
        self.db
            .put_cf(cf, key, value)
            .with_context(|| format!("Failed to store '{}'", String::from_utf8_lossy(key)))
    }

    fn read_target(&self, key: &[u8]) -> Result<U256> {
        Ok(self
            .read_metadata(key)?
            .map(U256::from_be_bytes)
            .unwrap_or(U256::ZERO))
    }

    fn read_digest(&self, key: &[u8]) -> Result<Option<Digest>> {
        Ok(self.read_metadata(key)?.map(Digest))
    }

    fn write_batch(&self, batch: StateBatch) -> Result<()> {
        let headers_cf = self.cf(HEADERS_CF)?;
        let metadata_cf = self.cf(METADATA_CF)?;
        let mut write_batch = WriteBatch::default();

        let header_count = batch.headers.len();
        for header in &batch.headers {
            let bytes = borsh::to_vec(header).context("Failed to serialize header")?;
            write_batch.put_cf(headers_cf, header.digest().as_bytes(), bytes);
        }

        let targets = [
            (CURRENT_EPOCH_DIFFICULTY_KEY, batch.current_epoch_difficulty),
            (PREV_EPOCH_DIFFICULTY_KEY, batch.prev_epoch_difficulty),
        ];
        for (key, target) in targets {
            if let Some(target) = target {
                write_batch.put_cf(metadata_cf, key, target.to_be_bytes());
            }
        }

        let digests = [
            (BEST_KNOWN_DIGEST_KEY, batch.best_known_digest),
            (RELAY_GENESIS_KEY, batch.relay_genesis),
            (LAST_REORG_COMMON_ANCESTOR_KEY, batch.last_reorg_common_ancestor),
        ];
        for (key, digest) in digests {
            if let Some(digest) = digest {
                write_batch.put_cf(metadata_cf, key, digest.as_bytes());
            }
        }

        self.db
            .write(write_batch)
            .context("Failed to write relay batch")?;
        debug!("Committed batch with {} headers", header_count);
        Ok(())
    }
}

fn store_err(e: anyhow::Error) -> StoreError {
    StoreError::new(format!("{e:#}"))
}

impl RelayStore for RocksDbStore {
    fn get_header(&self, digest: &Digest) -> Result<Option<StoredHeader>, StoreError> {
        self.read_header(digest).map_err(store_err)
    }

    fn put_header(&mut self, digest: Digest, header: StoredHeader) -> Result<(), StoreError> {
        let write = || -> Result<()> {
            let cf = self.cf(HEADERS_CF)?;
            let bytes = borsh::to_vec(&header).context("Failed to serialize header")?;
            self.db
                .put_cf(cf, digest.as_bytes(), bytes)
                .context("Failed to store header")
        };
        write().map_err(store_err)
    }

    fn current_epoch_difficulty(&self) -> Result<U256, StoreError> {
        self.read_target(CURRENT_EPOCH_DIFFICULTY_KEY)
            .map_err(store_err)
    }

    fn set_current_epoch_difficulty(&mut self, target: U256) -> Result<(), StoreError> {
        self.write_metadata(CURRENT_EPOCH_DIFFICULTY_KEY, target.to_be_bytes())
            .map_err(store_err)
    }

    fn prev_epoch_difficulty(&self) -> Result<U256, StoreError> {
        self.read_target(PREV_EPOCH_DIFFICULTY_KEY)
            .map_err(store_err)
    }

    fn set_prev_epoch_difficulty(&mut self, target: U256) -> Result<(), StoreError> {
        self.write_metadata(PREV_EPOCH_DIFFICULTY_KEY, target.to_be_bytes())
            .map_err(store_err)
    }

    fn best_known_digest(&self) -> Result<Option<Digest>, StoreError> {
        self.read_digest(BEST_KNOWN_DIGEST_KEY).map_err(store_err)
    }

    fn set_best_known_digest(&mut self, digest: Digest) -> Result<(), StoreError> {
        self.write_metadata(BEST_KNOWN_DIGEST_KEY, digest.0)
            .map_err(store_err)
    }

    fn relay_genesis(&self) -> Result<Option<Digest>, StoreError> {
        self.read_digest(RELAY_GENESIS_KEY).map_err(store_err)
    }

    fn set_relay_genesis(&mut self, digest: Digest) -> Result<(), StoreError> {
        self.write_metadata(RELAY_GENESIS_KEY, digest.0)
            .map_err(store_err)
    }

    fn last_reorg_common_ancestor(&self) -> Result<Option<Digest>, StoreError> {
        self.read_digest(LAST_REORG_COMMON_ANCESTOR_KEY)
            .map_err(store_err)
    }

    fn set_last_reorg_common_ancestor(&mut self, digest: Digest) -> Result<(), StoreError> {
        self.write_metadata(LAST_REORG_COMMON_ANCESTOR_KEY, digest.0)
            .map_err(store_err)
    }

    fn commit(&mut self, batch: StateBatch) -> Result<(), StoreError> {
        self.write_batch(batch).map_err(store_err)
    }
}
