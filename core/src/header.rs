use std::fmt;
use std::str::FromStr;

use bitcoin::{
    block::{Header, Version},
    hashes::Hash,
    BlockHash, CompactTarget, TxMerkleNode,
};
use borsh::{BorshDeserialize, BorshSerialize};
use crypto_bigint::{Encoding, U256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{RelayError, Result};
use crate::hashes::calculate_double_sha256;
use crate::target::decode_target;

pub const HEADER_SIZE: usize = 80;

/// A block digest in internal byte order, as it appears in `prev_block_hash`.
///
/// Displayed and parsed in the reversed hex form block explorers use.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, BorshSerialize, BorshDeserialize,
)]
pub struct Digest(pub [u8; 32]);

impl Digest {
    pub const ZERO: Digest = Digest([0u8; 32]);

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The digest read as a little-endian integer, which is how proof-of-work
    /// compares it against a target.
    pub fn to_u256(&self) -> U256 {
        U256::from_le_bytes(self.0)
    }
}

impl From<[u8; 32]> for Digest {
    fn from(bytes: [u8; 32]) -> Self {
        Digest(bytes)
    }
}

impl From<BlockHash> for Digest {
    fn from(hash: BlockHash) -> Self {
        Digest(hash.to_byte_array())
    }
}

impl From<Digest> for BlockHash {
    fn from(digest: Digest) -> Self {
        BlockHash::from_byte_array(digest.0)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        f.write_str(&hex::encode(reversed))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({self})")
    }
}

impl FromStr for Digest {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        bytes.reverse();
        Ok(Digest(bytes))
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = <String as Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// An 80-byte Bitcoin block header.
#[derive(Serialize, Deserialize, Eq, PartialEq, Clone, Debug, BorshDeserialize, BorshSerialize)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_block_hash: Digest,
    pub merkle_root: [u8; 32],
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    /// Consensus serialization: every integer little-endian, hashes in
    /// internal order.
    pub fn serialize(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..36].copy_from_slice(&self.prev_block_hash.0);
        out[36..68].copy_from_slice(&self.merkle_root);
        out[68..72].copy_from_slice(&self.time.to_le_bytes());
        out[72..76].copy_from_slice(&self.bits.to_le_bytes());
        out[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: &[u8; HEADER_SIZE] = bytes
            .try_into()
            .map_err(|_| RelayError::BadHeaderLength(bytes.len()))?;

        let word = |at: usize| [bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]];
        let mut prev_block_hash = [0u8; 32];
        prev_block_hash.copy_from_slice(&bytes[4..36]);
        let mut merkle_root = [0u8; 32];
        merkle_root.copy_from_slice(&bytes[36..68]);

        Ok(BlockHeader {
            version: i32::from_le_bytes(word(0)),
            prev_block_hash: Digest(prev_block_hash),
            merkle_root,
            time: u32::from_le_bytes(word(68)),
            bits: u32::from_le_bytes(word(72)),
            nonce: u32::from_le_bytes(word(76)),
        })
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim()).map_err(|e| RelayError::BadHeaderHex(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn digest(&self) -> Digest {
        Digest(calculate_double_sha256(&self.serialize()))
    }

    /// Target decoded from the header's own bits.
    pub fn target(&self) -> Result<U256> {
        decode_target(self.bits)
    }
}

impl From<Header> for BlockHeader {
    fn from(header: Header) -> Self {
        BlockHeader {
            version: header.version.to_consensus(),
            prev_block_hash: Digest(header.prev_blockhash.to_byte_array()),
            merkle_root: header.merkle_root.to_byte_array(),
            time: header.time,
            bits: header.bits.to_consensus(),
            nonce: header.nonce,
        }
    }
}

impl From<BlockHeader> for Header {
    fn from(val: BlockHeader) -> Self {
        Header {
            version: Version::from_consensus(val.version),
            prev_blockhash: BlockHash::from_byte_array(val.prev_block_hash.0),
            merkle_root: TxMerkleNode::from_byte_array(val.merkle_root),
            time: val.time,
            bits: CompactTarget::from_consensus(val.bits),
            nonce: val.nonce,
        }
    }
}

/// A header the relay has accepted, with its position in the chain.
#[derive(Serialize, Deserialize, Eq, PartialEq, Clone, Debug, BorshDeserialize, BorshSerialize)]
pub struct StoredHeader {
    pub header: BlockHeader,
    pub height: u32,
    /// Cumulative work up to and including this header, big-endian.
    pub chain_work: [u8; 32],
}

impl StoredHeader {
    pub fn new(header: BlockHeader, height: u32, chain_work: U256) -> Self {
        StoredHeader {
            header,
            height,
            chain_work: chain_work.to_be_bytes(),
        }
    }

    pub fn digest(&self) -> Digest {
        self.header.digest()
    }

    pub fn target(&self) -> Result<U256> {
        self.header.target()
    }

    pub fn chain_work(&self) -> U256 {
        U256::from_be_bytes(self.chain_work)
    }
}

/// Checks that `header` hashes at or below `target` and returns its digest.
pub fn validate_header(header: &BlockHeader, target: &U256) -> Result<Digest> {
    let digest = header.digest();
    if digest.to_u256() > *target {
        return Err(RelayError::InsufficientWork(digest));
    }
    Ok(digest)
}
