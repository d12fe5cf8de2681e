//! Validation of the first headers of a new difficulty epoch.

use tracing::debug;

use crate::error::{RelayError, Result};
use crate::header::{BlockHeader, Digest, StoredHeader};
use crate::header_chain::validate_header_chain;
use crate::params::NetworkParams;
use crate::target::{compare_targets, encode_target, retarget_algorithm};

/// Validates `headers`, whose first element opens a new epoch, against the
/// epoch bounded by `prev_epoch_start` and `anchor`. Returns the tip digest.
pub fn validate_difficulty_change(
    headers: &[BlockHeader],
    prev_epoch_start: &StoredHeader,
    anchor: &StoredHeader,
    params: &NetworkParams,
) -> Result<Digest> {
    let first = headers.first().ok_or(RelayError::EmptySegment)?;

    if !params.is_epoch_start(prev_epoch_start.height)
        || anchor.height.checked_sub(prev_epoch_start.height) != Some(params.blocks_per_epoch - 1)
    {
        return Err(RelayError::BadEpochStart {
            start_height: prev_epoch_start.height,
            anchor_height: anchor.height,
        });
    }

    let start_target = prev_epoch_start.target()?;
    let anchor_target = anchor.target()?;
    let min_difficulty_anchor =
        params.allow_min_difficulty_blocks && anchor.header.bits == params.max_bits;
    if start_target != anchor_target && !min_difficulty_anchor {
        return Err(RelayError::UnexpectedDifficultyChange {
            header: anchor.digest(),
            expected: prev_epoch_start.header.bits,
            got: anchor.header.bits,
        });
    }

    let base_target = if params.enforce_bip94 {
        start_target
    } else {
        anchor_target
    };
    let expected = retarget_algorithm(
        params,
        &base_target,
        prev_epoch_start.header.time,
        anchor.header.time,
    );
    let observed = first.target()?;
    if !compare_targets(&expected, &observed) {
        return Err(RelayError::WrongDifficulty {
            header: first.digest(),
            expected: encode_target(&expected),
            got: first.bits,
        });
    }
    debug!(
        expected_bits = encode_target(&expected),
        got_bits = first.bits,
        "Retarget header carries the expected difficulty"
    );

    let strict = params.strict_difficulty();
    let tip = validate_header_chain(&anchor.header, headers, true, strict, params)?;

    // Everything after the boundary header stays in the new epoch.
    if headers.len() > 1 {
        validate_header_chain(first, &headers[1..], false, strict, params)?;
    }

    Ok(tip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Network;
    use crate::target::decode_target;
    use crate::test_utils::{mine_chain, mine_header, weak_header};
    use crypto_bigint::U256;

    const EASY: u32 = 0x2000ffff;
    const HALVED: u32 = 0x1f7fff80;
    const EXPECTED_TIMESPAN: u32 = 60 * 60 * 24 * 14;

    fn epoch(anchor_offset: u32, timespan: u32, anchor_bits: u32) -> (StoredHeader, StoredHeader) {
        let start = mine_header(Digest([0x33; 32]), 1_700_000_000, EASY);
        let anchor = mine_header(Digest([0x44; 32]), 1_700_000_000 + timespan, anchor_bits);
        (
            StoredHeader::new(start, 2016, U256::ONE),
            StoredHeader::new(anchor, 2016 + anchor_offset, U256::ONE),
        )
    }

    #[test]
    fn test_halved_target_is_accepted() {
        let params = Network::Regtest.params();
        let (start, anchor) = epoch(2015, EXPECTED_TIMESPAN / 2, EASY);
        let headers = mine_chain(&anchor.header, 3, 600, HALVED);
        assert_eq!(
            validate_difficulty_change(&headers, &start, &anchor, &params),
            Ok(headers[2].digest())
        );
    }

    #[test]
    fn test_stale_target_is_wrong_difficulty() {
        let params = Network::Regtest.params();
        let (start, anchor) = epoch(2015, EXPECTED_TIMESPAN / 2, EASY);
        let headers = mine_chain(&anchor.header, 1, 600, EASY);
        let err = validate_difficulty_change(&headers, &start, &anchor, &params).unwrap_err();
        assert_eq!(
            err,
            RelayError::WrongDifficulty {
                header: headers[0].digest(),
                expected: HALVED,
                got: EASY,
            }
        );
    }

    #[test]
    fn test_epoch_bounds() {
        let params = Network::Regtest.params();
        let (mut start, anchor) = epoch(2015, EXPECTED_TIMESPAN / 2, EASY);
        let headers = mine_chain(&anchor.header, 1, 600, HALVED);

        let (_, short_anchor) = epoch(2014, EXPECTED_TIMESPAN / 2, EASY);
        assert_eq!(
            validate_difficulty_change(&headers, &start, &short_anchor, &params),
            Err(RelayError::BadEpochStart {
                start_height: 2016,
                anchor_height: 4030,
            })
        );

        start.height = 2017;
        assert_eq!(
            validate_difficulty_change(&headers, &start, &anchor, &params)
                .unwrap_err()
                .code()
                .as_u32(),
            6
        );
    }

    #[test]
    fn test_anchor_below_start_is_bad_epoch() {
        let params = Network::Regtest.params();
        let (start, mut anchor) = epoch(2015, EXPECTED_TIMESPAN, EASY);
        anchor.height = 10;
        let headers = mine_chain(&anchor.header, 1, 600, EASY);
        assert_eq!(
            validate_difficulty_change(&headers, &start, &anchor, &params)
                .unwrap_err()
                .code()
                .as_u32(),
            6
        );
    }

    #[test]
    fn test_epoch_with_internal_change_is_rejected() {
        let params = Network::Regtest.params();
        let (start, anchor) = epoch(2015, EXPECTED_TIMESPAN / 2, 0x1f00ffff);
        let headers = mine_chain(&anchor.header, 1, 600, HALVED);
        assert_eq!(
            validate_difficulty_change(&headers, &start, &anchor, &params)
                .unwrap_err()
                .code()
                .as_u32(),
            4
        );
    }

    #[test]
    fn test_min_difficulty_anchor_is_retarget_base() {
        let params = Network::Regtest.params();
        let (_, anchor) = epoch(2015, EXPECTED_TIMESPAN, params.max_bits);
        let start = StoredHeader::new(
            mine_header(Digest([0x33; 32]), 1_700_000_000, HALVED),
            2016,
            U256::ONE,
        );

        let headers = mine_chain(&anchor.header, 2, 600, params.max_bits);
        assert_eq!(
            validate_difficulty_change(&headers, &start, &anchor, &params),
            Ok(headers[1].digest())
        );

        // Retargeting from the epoch start would keep HALVED.
        let stale = mine_chain(&anchor.header, 1, 600, HALVED);
        assert_eq!(
            validate_difficulty_change(&stale, &start, &anchor, &params),
            Err(RelayError::WrongDifficulty {
                header: stale[0].digest(),
                expected: params.max_bits,
                got: HALVED,
            })
        );
    }

    #[test]
    fn test_bip94_retargets_from_epoch_start() {
        let params = NetworkParams {
            enforce_bip94: true,
            ..Network::Regtest.params()
        };
        let (start, anchor) = epoch(2015, EXPECTED_TIMESPAN / 2, params.max_bits);

        let headers = mine_chain(&anchor.header, 2, 600, HALVED);
        assert_eq!(
            validate_difficulty_change(&headers, &start, &anchor, &params),
            Ok(headers[1].digest())
        );

        // Halving the minimum difficulty is what the last block would give.
        let reset = mine_chain(&anchor.header, 1, 600, 0x203fffff);
        assert_eq!(
            validate_difficulty_change(&reset, &start, &anchor, &params)
                .unwrap_err()
                .code()
                .as_u32(),
            5
        );
    }

    #[test]
    fn test_min_difficulty_anchor_rejected_without_exception() {
        // Signet rules at a difficulty cheap enough to mine in a test.
        let params = NetworkParams {
            max_bits: 0x207fffff,
            max_target: decode_target(0x207fffff).unwrap(),
            ..Network::Signet.params()
        };
        let (start, anchor) = epoch(2015, EXPECTED_TIMESPAN, params.max_bits);
        let headers = mine_chain(&anchor.header, 1, 600, params.max_bits);
        assert_eq!(
            validate_difficulty_change(&headers, &start, &anchor, &params),
            Err(RelayError::UnexpectedDifficultyChange {
                header: anchor.digest(),
                expected: EASY,
                got: params.max_bits,
            })
        );
    }

    fn timed_header(prev: Digest, time: u32, bits: u32) -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_block_hash: prev,
            merkle_root: [0x5a; 32],
            time,
            bits,
            nonce: 0,
        }
    }

    #[test]
    fn test_first_mainnet_retarget() {
        // Epoch 30240..=32255; block 32256 was the first to carry 0x1d00d86a.
        let params = Network::Mainnet.params();
        let start = StoredHeader::new(
            timed_header(Digest([0x33; 32]), 1261130161, 0x1d00ffff),
            30240,
            U256::ONE,
        );
        let anchor = StoredHeader::new(
            timed_header(Digest([0x44; 32]), 1262152739, 0x1d00ffff),
            32255,
            U256::ONE,
        );

        // Only the proof-of-work of these stand-ins is missing, so passing the
        // difficulty check surfaces as InsufficientWork.
        let retargeted = [weak_header(anchor.digest(), 1262153464, 0x1d00d86a)];
        assert_eq!(
            validate_difficulty_change(&retargeted, &start, &anchor, &params),
            Err(RelayError::InsufficientWork(retargeted[0].digest()))
        );

        let stale = [weak_header(anchor.digest(), 1262153464, 0x1d00ffff)];
        assert_eq!(
            validate_difficulty_change(&stale, &start, &anchor, &params),
            Err(RelayError::WrongDifficulty {
                header: stale[0].digest(),
                expected: 0x1d00d86a,
                got: 0x1d00ffff,
            })
        );
    }

    #[test]
    fn test_testnet_min_difficulty_anchor_resets_difficulty() {
        let params = Network::Testnet.params();
        let start = StoredHeader::new(
            timed_header(Digest([0x33; 32]), 1_400_000_000, 0x1b0404cb),
            4032,
            U256::ONE,
        );
        let anchor = StoredHeader::new(
            timed_header(Digest([0x44; 32]), 1_400_000_000 + EXPECTED_TIMESPAN, params.max_bits),
            6047,
            U256::ONE,
        );

        let reset = [weak_header(anchor.digest(), anchor.header.time + 600, params.max_bits)];
        assert_eq!(
            validate_difficulty_change(&reset, &start, &anchor, &params),
            Err(RelayError::InsufficientWork(reset[0].digest()))
        );

        let kept = [weak_header(anchor.digest(), anchor.header.time + 600, 0x1b0404cb)];
        assert_eq!(
            validate_difficulty_change(&kept, &start, &anchor, &params)
                .unwrap_err()
                .code()
                .as_u32(),
            5
        );
    }

    #[test]
    fn test_tail_must_keep_new_difficulty() {
        let params = Network::Regtest.params();
        let (start, anchor) = epoch(2015, EXPECTED_TIMESPAN / 2, EASY);
        let mut headers = mine_chain(&anchor.header, 1, 600, HALVED);
        headers.push(mine_header(headers[0].digest(), headers[0].time + 600, EASY));
        assert_eq!(
            validate_difficulty_change(&headers, &start, &anchor, &params)
                .unwrap_err()
                .code()
                .as_u32(),
            4
        );
    }

    #[test]
    fn test_truncated_bits_are_accepted() {
        let params = Network::Regtest.params();
        // 0x2000fffe gives a timespan whose exact target has low-order bits set.
        let start = mine_header(Digest([0x33; 32]), 1_700_000_000, 0x2000fffe);
        let anchor = mine_header(Digest([0x44; 32]), 1_700_000_000 + 1_000_003, 0x2000fffe);
        let start = StoredHeader::new(start, 0, U256::ONE);
        let anchor = StoredHeader::new(anchor, 2015, U256::ONE);

        let exact = retarget_algorithm(
            &params,
            &decode_target(0x2000fffe).unwrap(),
            start.header.time,
            anchor.header.time,
        );
        let bits = encode_target(&exact);
        assert_ne!(decode_target(bits).unwrap(), exact);

        let headers = mine_chain(&anchor.header, 1, 600, bits);
        assert!(validate_difficulty_change(&headers, &start, &anchor, &params).is_ok());
    }

    #[test]
    fn test_empty_segment() {
        let params = Network::Regtest.params();
        let (start, anchor) = epoch(2015, EXPECTED_TIMESPAN, EASY);
        assert_eq!(
            validate_difficulty_change(&[], &start, &anchor, &params),
            Err(RelayError::EmptySegment)
        );
    }
}
