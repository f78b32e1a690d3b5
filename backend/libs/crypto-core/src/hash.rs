use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 digest of the input.
///
/// Used for one-way storage of recovery codes and for hashing tokens before
/// they appear in logs or revocation lists. Not suitable for passwords; use
/// `password::hash_password` for anything a human chose.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Constant-time byte comparison.
///
/// Takes the same time whether inputs differ in the first byte or the last,
/// so it is safe for comparing secret digests. Length mismatch returns false
/// immediately; lengths are not secret here.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
