//! Password hashing and token generation.
//!
//! PBKDF2-HMAC-SHA256 with a per-user salt and a fixed iteration count.
//! Hashing is CPU-intensive by design; callers run it under
//! `tokio::task::spawn_blocking` so it never stalls the async runtime.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// Default KDF iteration count; configurable via `[security]`.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

const HASH_BYTES: usize = 32;

/// Derive a hex-encoded hash from a password. When `salt` is `None` a fresh
/// 256-bit salt is generated; the salt actually used is always returned.
#[must_use]
pub fn hash_password(password: &str, salt: Option<&str>, iterations: u32) -> (String, String) {
    let salt = salt.map_or_else(generate_salt, str::to_string);

    let mut derived = [0u8; HASH_BYTES];
    pbkdf2_hmac::<Sha256>(
        password.as_bytes(),
        salt.as_bytes(),
        iterations,
        &mut derived,
    );

    (encode_hex(&derived), salt)
}

/// Re-derive and compare in constant time. No early-exit byte comparison:
/// only the (public) digest length can influence timing.
#[must_use]
pub fn verify_password(password: &str, password_hash: &str, salt: &str, iterations: u32) -> bool {
    let (computed, _) = hash_password(password, Some(salt), iterations);
    computed.as_bytes().ct_eq(password_hash.as_bytes()).into()
}

/// Fresh 256-bit salt, hex encoded.
#[must_use]
pub fn generate_salt() -> String {
    random_hex_256()
}

/// Opaque session token: 256 bits from the thread-local CSPRNG.
#[must_use]
pub fn generate_session_token() -> String {
    random_hex_256()
}

/// Single-use password-reset token, same entropy as a session token.
#[must_use]
pub fn generate_reset_token() -> String {
    random_hex_256()
}

fn random_hex_256() -> String {
    use rand::Rng;

    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();

    encode_hex(&bytes)
}

fn encode_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut acc, b| {
            use std::fmt::Write;
            let _ = write!(acc, "{b:02x}");
            acc
        })
}
