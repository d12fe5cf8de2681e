//! Compact difficulty encoding and the retarget arithmetic.
//!
//! Targets are plain `U256` values. The compact "bits" form packs a one byte
//! exponent (size in bytes) and a 23 bit mantissa with a sign bit, exactly as
//! Bitcoin Core's `arith_uint256::SetCompact` / `GetCompact` do.

use crypto_bigint::{Encoding, U256};
use tracing::debug;

use crate::error::{RelayError, Result};
use crate::params::NetworkParams;

const SIGN_BIT: u32 = 0x0080_0000;
const MANTISSA_MASK: u32 = 0x007f_ffff;

/// Expands compact `bits` into the full 256-bit target.
///
/// Fails with `MalformedBits` when the encoding is negative or does not fit in
/// 256 bits. A zero mantissa decodes to zero regardless of the exponent.
pub fn decode_target(bits: u32) -> Result<U256> {
    let size = bits >> 24;
    let mut word = bits & MANTISSA_MASK;

    if size <= 3 {
        word >>= 8 * (3 - size);
    }
    if word == 0 {
        return Ok(U256::ZERO);
    }

    let negative = bits & SIGN_BIT != 0;
    let overflow = size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32);
    if negative || overflow {
        return Err(RelayError::MalformedBits(bits));
    }

    let target = U256::from_u32(word);
    if size <= 3 {
        Ok(target)
    } else {
        Ok(target.shl_vartime(8 * (size as usize - 3)))
    }
}

/// Packs a target into compact `bits`. The mantissa keeps the three most
/// significant bytes; everything below is truncated.
pub fn encode_target(target: &U256) -> u32 {
    let mut size = (target.bits() as u32 + 7) / 8;
    let shifted = if size <= 3 {
        target.shl_vartime(8 * (3 - size as usize))
    } else {
        target.shr_vartime(8 * (size as usize - 3))
    };
    let bytes = shifted.to_be_bytes();
    let mut compact = u32::from_be_bytes([0, bytes[29], bytes[30], bytes[31]]);

    // The top mantissa bit is the sign, so move into the next exponent.
    if compact & SIGN_BIT != 0 {
        compact >>= 8;
        size += 1;
    }
    compact | (size << 24)
}

/// True when every bit set in `truncated` is also set in `full`.
///
/// A header's bits are a lossy encoding of the expected target. Faithful
/// truncation only drops low-order bits, so it always passes; a mantissa that
/// rounds differently or claims an easier target sets a bit `full` lacks.
pub fn compare_targets(full: &U256, truncated: &U256) -> bool {
    (*full & *truncated) == *truncated
}

/// Proof-of-work a target represents: `2^256 / (target + 1)`.
///
/// Uses the identity `2^256 / (x + 1) == ~x / (x + 1) + 1` so the numerator
/// fits in 256 bits. Zero and one both map to `U256::MAX`.
pub fn calculate_work(target: &U256) -> U256 {
    if *target == U256::ZERO || *target == U256::ONE {
        return U256::MAX;
    }
    if *target == U256::MAX {
        return U256::ONE;
    }

    let comp = !*target;
    comp.wrapping_div(&target.wrapping_add(&U256::ONE))
        .wrapping_add(&U256::ONE)
}

/// Computes the target for the next epoch from the previous one.
///
/// The elapsed time is clamped to `[expected / 4, expected * 4]` and the
/// result is capped at the network's `max_target`. The product is evaluated
/// as `q * span + r * span / expected` with `target = q * expected + r`, which
/// is exact and cannot overflow in the remainder term.
pub fn retarget_algorithm(
    params: &NetworkParams,
    previous_target: &U256,
    first_timestamp: u32,
    second_timestamp: u32,
) -> U256 {
    let expected = params.expected_epoch_timespan;
    let elapsed = second_timestamp.saturating_sub(first_timestamp);
    let span = elapsed.clamp(expected / 4, expected * 4);
    debug!(elapsed, span, "Retargeting difficulty");

    let expected = U256::from_u32(expected);
    let span = U256::from_u32(span);

    let quotient = previous_target.wrapping_div(&expected);
    let remainder = previous_target.wrapping_rem(&expected);

    if quotient > U256::MAX.wrapping_div(&span) {
        return params.max_target;
    }
    let high = quotient.wrapping_mul(&span);
    let low = remainder.wrapping_mul(&span).wrapping_div(&expected);
    if high > U256::MAX.wrapping_sub(&low) {
        return params.max_target;
    }

    let new_target = high.wrapping_add(&low);
    if new_target > params.max_target {
        params.max_target
    } else {
        new_target
    }
}
