// Bitcoin hash implementations

use sha2::{Digest, Sha256};

/// SHA-256 applied twice, the digest Bitcoin uses for block headers.
pub fn calculate_double_sha256(input: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::default();
    hasher.update(input);
    let result = hasher.finalize_reset();
    hasher.update(result);
    hasher.finalize().into()
}
