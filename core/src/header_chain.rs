//! Validation of a contiguous run of headers on top of a known anchor.

use crypto_bigint::U256;
use tracing::debug;

use crate::error::{RelayError, Result};
use crate::header::{validate_header, BlockHeader, Digest};
use crate::params::NetworkParams;

/// Target every regular header of a segment must carry, together with the
/// bits it was first seen with for error reporting.
#[derive(Clone, Copy)]
struct Reference {
    bits: u32,
    target: U256,
}

/// True when a test-network header may use the minimum difficulty because it
/// arrived more than two block intervals after its parent.
pub fn is_min_difficulty_exception(
    header: &BlockHeader,
    prev_time: u32,
    is_mainnet: bool,
    params: &NetworkParams,
) -> bool {
    !is_mainnet
        && header.bits == params.max_bits
        && u64::from(header.time) > u64::from(prev_time) + 2 * u64::from(params.pow_target_spacing)
}

/// Validates `headers` as a chain extending `anchor` and returns the tip digest.
///
/// Each header, in order, must link to its parent, meet the target of its own
/// bits and, unless `internal` is set, keep the anchor's difficulty. With
/// `is_mainnet == false` a header carrying the network's minimum difficulty
/// after a gap of more than 20 minutes is exempt from the difficulty check.
pub fn validate_header_chain(
    anchor: &BlockHeader,
    headers: &[BlockHeader],
    internal: bool,
    is_mainnet: bool,
    params: &NetworkParams,
) -> Result<Digest> {
    if headers.is_empty() {
        return Err(RelayError::EmptySegment);
    }

    // A minimum-difficulty anchor says nothing about the epoch's real target,
    // so the first regular header sets it.
    let mut reference = if !is_mainnet && anchor.bits == params.max_bits {
        None
    } else {
        Some(Reference {
            bits: anchor.bits,
            target: anchor.target()?,
        })
    };

    let mut prev_digest = anchor.digest();
    let mut prev_time = anchor.time;

    for header in headers {
        if header.prev_block_hash != prev_digest {
            return Err(RelayError::BadPrevHash {
                header: header.digest(),
                expected: prev_digest,
                got: header.prev_block_hash,
            });
        }

        let target = header.target()?;
        let digest = validate_header(header, &target)?;

        if !internal && !is_min_difficulty_exception(header, prev_time, is_mainnet, params) {
            let expected = *reference.get_or_insert(Reference {
                bits: header.bits,
                target,
            });
            if expected.target != target {
                return Err(RelayError::UnexpectedDifficultyChange {
                    header: digest,
                    expected: expected.bits,
                    got: header.bits,
                });
            }
        }

        debug!(%digest, bits = header.bits, "Header passed chain checks");
        prev_digest = digest;
        prev_time = header.time;
    }

    Ok(prev_digest)
}
