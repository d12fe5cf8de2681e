//! The relay engine: resolves anchors from the state accessor, runs the pure
//! validators and commits accepted headers as a single batch.

use crypto_bigint::U256;
use tracing::{debug, info, warn};

use crate::error::{RelayError, Result};
use crate::events::{EventSink, RelayEvent};
use crate::header::{validate_header, BlockHeader, Digest, StoredHeader};
use crate::header_chain::validate_header_chain;
use crate::params::NetworkParams;
use crate::retarget::validate_difficulty_change;
use crate::store::{RelayStore, StateBatch};
use crate::target::{calculate_work, decode_target};

pub struct Relay<S, E> {
    store: S,
    events: E,
    params: NetworkParams,
}

impl<S: RelayStore, E: EventSink> Relay<S, E> {
    pub fn new(store: S, events: E, params: NetworkParams) -> Self {
        Relay {
            store,
            events,
            params,
        }
    }

    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn events(&self) -> &E {
        &self.events
    }

    pub fn into_parts(self) -> (S, E) {
        (self.store, self.events)
    }

    pub fn get_header(&self, digest: &Digest) -> Result<StoredHeader> {
        self.store
            .get_header(digest)?
            .ok_or(RelayError::UnknownBlock(*digest))
    }

    pub fn has_header(&self, digest: &Digest) -> Result<bool> {
        Ok(self.store.get_header(digest)?.is_some())
    }

    /// Stores the header the relay tracks from, marks it best known and seeds
    /// the current epoch difficulty with its target.
    pub fn initialize(&mut self, genesis: BlockHeader, height: u32) -> Result<Digest> {
        if self.store.relay_genesis()?.is_some() {
            return Err(RelayError::AlreadyInitialized);
        }
        let target = genesis.target()?;
        let digest = validate_header(&genesis, &target)?;

        let mut batch = StateBatch::new();
        batch.put_header(StoredHeader::new(genesis, height, calculate_work(&target)));
        batch.relay_genesis = Some(digest);
        batch.best_known_digest = Some(digest);
        batch.last_reorg_common_ancestor = Some(digest);
        batch.current_epoch_difficulty = Some(target);
        batch.prev_epoch_difficulty = Some(U256::ZERO);
        self.store.commit(batch)?;

        info!(%digest, height, "Relay initialized");
        Ok(digest)
    }

    /// Checks proof-of-work against the header's own bits and stores it
    /// without any linkage checks. Re-ingesting a header overwrites it.
    pub fn ingest_header(&mut self, header: BlockHeader, height: u32) -> Result<Digest> {
        let target = header.target()?;
        let digest = validate_header(&header, &target)?;

        let parent_work = self
            .store
            .get_header(&header.prev_block_hash)?
            .map(|parent| parent.chain_work())
            .unwrap_or(U256::ZERO);
        let chain_work = parent_work.wrapping_add(&calculate_work(&target));

        let mut batch = StateBatch::new();
        batch.put_header(StoredHeader::new(header, height, chain_work));
        self.store.commit(batch)?;

        debug!(%digest, height, "Stored bootstrap header");
        Ok(digest)
    }

    /// Validates `headers` on top of the stored parent of the first one and
    /// commits them. Without `internal`, difficulty must stay constant and the
    /// segment may not cross into a new epoch.
    pub fn ingest_headers(&mut self, headers: &[BlockHeader], internal: bool) -> Result<Digest> {
        let first = headers.first().ok_or(RelayError::EmptySegment)?;
        let anchor = self.get_header(&first.prev_block_hash)?;

        let tip = validate_header_chain(
            &anchor.header,
            headers,
            internal,
            self.params.strict_difficulty(),
            &self.params,
        )
        .inspect_err(|e| warn!(anchor = %first.prev_block_hash, "Rejected header segment: {e}"))?;

        if !internal {
            self.check_no_epoch_boundary(&anchor, headers)?;
        }

        let (batch, tip_height) = self.stage_headers(&anchor, headers)?;
        self.commit_extension(batch, &anchor, tip, tip_height)?;
        Ok(tip)
    }

    /// Ordinary chain extension at constant difficulty.
    pub fn ingest_header_chain(&mut self, headers: &[BlockHeader]) -> Result<Digest> {
        self.ingest_headers(headers, false)
    }

    /// Ingests a segment opening a new epoch and rotates the epoch difficulties.
    pub fn ingest_difficulty_change(
        &mut self,
        prev_epoch_start: &Digest,
        headers: &[BlockHeader],
    ) -> Result<Digest> {
        let epoch_start = self.get_header(prev_epoch_start)?;
        let first = headers.first().ok_or(RelayError::EmptySegment)?;
        let anchor = self.get_header(&first.prev_block_hash)?;

        let tip = validate_difficulty_change(headers, &epoch_start, &anchor, &self.params)
            .inspect_err(|e| warn!(anchor = %anchor.digest(), "Rejected difficulty change: {e}"))?;

        let (mut batch, tip_height) = self.stage_headers(&anchor, headers)?;
        // headers is non-empty past validation.
        if let Some(last) = headers.last() {
            batch.prev_epoch_difficulty = Some(self.store.current_epoch_difficulty()?);
            batch.current_epoch_difficulty = Some(decode_target(last.bits)?);
        }

        self.commit_extension(batch, &anchor, tip, tip_height)?;
        info!(height = anchor.height + 1, "Rotated epoch difficulty");
        Ok(tip)
    }

    pub fn current_epoch_difficulty(&self) -> Result<U256> {
        Ok(self.store.current_epoch_difficulty()?)
    }

    pub fn set_current_epoch_difficulty(&mut self, target: U256) -> Result<()> {
        Ok(self.store.set_current_epoch_difficulty(target)?)
    }

    pub fn prev_epoch_difficulty(&self) -> Result<U256> {
        Ok(self.store.prev_epoch_difficulty()?)
    }

    pub fn set_prev_epoch_difficulty(&mut self, target: U256) -> Result<()> {
        Ok(self.store.set_prev_epoch_difficulty(target)?)
    }

    pub fn relay_genesis(&self) -> Result<Digest> {
        self.store.relay_genesis()?.ok_or(RelayError::Uninitialized)
    }

    pub fn best_known_digest(&self) -> Result<Digest> {
        self.store
            .best_known_digest()?
            .ok_or(RelayError::Uninitialized)
    }

    pub fn last_reorg_common_ancestor(&self) -> Result<Digest> {
        self.store
            .last_reorg_common_ancestor()?
            .ok_or(RelayError::Uninitialized)
    }

    pub fn find_height(&self, digest: &Digest) -> Result<u32> {
        Ok(self.get_header(digest)?.height)
    }

    /// Digest `offset` blocks above `digest`. Every header on the way must be
    /// stored.
    pub fn find_ancestor(&self, digest: &Digest, offset: u32) -> Result<Digest> {
        let mut current = *digest;
        self.get_header(&current)?;
        for _ in 0..offset {
            current = self.get_header(&current)?.header.prev_block_hash;
            self.get_header(&current)?;
        }
        Ok(current)
    }

    /// True if `ancestor` is `descendant` or one of its first `limit - 1`
    /// stored parents.
    pub fn is_ancestor(&self, ancestor: &Digest, descendant: &Digest, limit: u32) -> Result<bool> {
        let mut current = *descendant;
        for _ in 0..limit {
            if current == *ancestor {
                return Ok(true);
            }
            match self.store.get_header(&current)? {
                Some(stored) => current = stored.header.prev_block_hash,
                None => return Ok(false),
            }
        }
        Ok(false)
    }

    /// Moves the best known digest from `current_best` to the heavier
    /// `new_best` and records their latest common ancestor.
    pub fn mark_new_heaviest(&mut self, current_best: &Digest, new_best: &Digest) -> Result<Digest> {
        let best = self.best_known_digest()?;
        if best != *current_best {
            return Err(RelayError::NotBestKnown(*current_best));
        }

        let old = self.get_header(current_best)?;
        let new = self.get_header(new_best)?;
        if new.chain_work() <= old.chain_work() {
            return Err(RelayError::NotHeavier {
                current_best: *current_best,
                new_best: *new_best,
            });
        }

        let common_ancestor = self.common_ancestor(&old, &new)?;

        let mut batch = StateBatch::new();
        batch.best_known_digest = Some(*new_best);
        batch.last_reorg_common_ancestor = Some(common_ancestor);
        self.store.commit(batch)?;

        info!(from = %current_best, to = %new_best, %common_ancestor, "New heaviest header");
        self.events.emit(RelayEvent::Reorg {
            from: *current_best,
            to: *new_best,
            common_ancestor,
        });
        Ok(common_ancestor)
    }

    fn common_ancestor(&self, left: &StoredHeader, right: &StoredHeader) -> Result<Digest> {
        let (mut left, mut right) = (left.clone(), right.clone());
        while left.height > right.height {
            left = self.get_header(&left.header.prev_block_hash)?;
        }
        while right.height > left.height {
            right = self.get_header(&right.header.prev_block_hash)?;
        }
        while left.digest() != right.digest() {
            left = self.get_header(&left.header.prev_block_hash)?;
            right = self.get_header(&right.header.prev_block_hash)?;
        }
        Ok(left.digest())
    }

    fn check_no_epoch_boundary(&self, anchor: &StoredHeader, headers: &[BlockHeader]) -> Result<()> {
        let mut height = anchor.height;
        for header in headers {
            height = height
                .checked_add(1)
                .ok_or(RelayError::HeightOverflow(anchor.height))?;
            if self.params.is_epoch_start(height) {
                warn!(height, "Plain segment reaches an epoch boundary");
                return Err(RelayError::UnexpectedDifficultyChange {
                    header: header.digest(),
                    expected: anchor.header.bits,
                    got: header.bits,
                });
            }
        }
        Ok(())
    }

    /// Assigns heights and cumulative work to `headers` on top of `anchor`.
    fn stage_headers(
        &self,
        anchor: &StoredHeader,
        headers: &[BlockHeader],
    ) -> Result<(StateBatch, u32)> {
        let mut batch = StateBatch::new();
        let mut height = anchor.height;
        let mut chain_work = anchor.chain_work();
        for header in headers {
            height = height
                .checked_add(1)
                .ok_or(RelayError::HeightOverflow(anchor.height))?;
            chain_work = chain_work.wrapping_add(&calculate_work(&header.target()?));
            batch.put_header(StoredHeader::new(header.clone(), height, chain_work));
        }
        Ok((batch, height))
    }

    fn commit_extension(
        &mut self,
        batch: StateBatch,
        anchor: &StoredHeader,
        tip: Digest,
        tip_height: u32,
    ) -> Result<()> {
        let count = batch.headers.len();
        self.store.commit(batch)?;

        let from = anchor.digest();
        info!(%from, to = %tip, count, tip_height, "Committed header segment");
        self.events.emit(RelayEvent::Extension {
            from,
            to: tip,
            from_height: anchor.height,
            to_height: tip_height,
        });
        Ok(())
    }
}
