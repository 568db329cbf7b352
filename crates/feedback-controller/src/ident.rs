//! Seed-derived identifiers and opaque tokens.
//!
//! Session and room identifiers are derived deterministically from a
//! caller-supplied seed so that the same seed always maps to the same
//! entity, without exposing a guessable sequential id:
//!
//! - **Derivation**: `SHA-256(seed)`, hex-encoded, truncated to 16 chars
//! - **Opaque tokens**: 8 bytes from the OS CSPRNG, hex-encoded
//!
//! Add-links and regenerated list/note ids use opaque tokens; they carry
//! no linkage back to any seed or author.

use crate::errors::FcError;

use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};

/// Length of derived and opaque identifiers in hex characters.
const ID_LEN: usize = 16;

/// Derive a deterministic identifier from a caller-supplied seed.
///
/// The same seed always produces the same id. Distinct seeds collide with
/// negligible probability for a 64-bit id space.
///
/// # Errors
///
/// Returns [`FcError::InvalidSeed`] if the seed is empty or whitespace-only.
pub fn derive_id(seed: &str) -> Result<String, FcError> {
    if seed.trim().is_empty() {
        return Err(FcError::InvalidSeed);
    }

    let hash = digest::digest(&digest::SHA256, seed.as_bytes());
    let mut encoded = hex::encode(hash.as_ref());
    encoded.truncate(ID_LEN);
    Ok(encoded)
}

/// Generate a fresh, unguessable opaque token.
///
/// Non-deterministic; used for add-links and for the regenerated list and
/// note ids produced by aggregation. Same width as derived ids so the two
/// are indistinguishable on the wire.
#[must_use]
pub fn opaque_token() -> String {
    // CSPRNG fill on 8 bytes only fails if the OS entropy source is
    // catastrophically broken; fall back to a UUID in that case rather
    // than panicking.
    let rng = SystemRandom::new();
    let mut bytes = [0u8; 8];
    if rng.fill(&mut bytes).is_err() {
        let mut fallback = uuid::Uuid::new_v4().simple().to_string();
        fallback.truncate(ID_LEN);
        return fallback;
    }
    hex::encode(bytes)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_derive_id_is_deterministic() {
        let a = derive_id("abc").unwrap();
        let b = derive_id("abc").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_derive_id_length_and_charset() {
        let id = derive_id("some-seed").unwrap();
        assert_eq!(id.len(), ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_derive_id_distinct_seeds_distinct_ids() {
        let mut seen = HashSet::new();
        for i in 0..1000 {
            let id = derive_id(&format!("seed-{i}")).unwrap();
            assert!(seen.insert(id), "collision at seed-{i}");
        }
    }

    #[test]
    fn test_derive_id_rejects_empty_seed() {
        assert!(matches!(derive_id(""), Err(FcError::InvalidSeed)));
        assert!(matches!(derive_id("   "), Err(FcError::InvalidSeed)));
    }

    #[test]
    fn test_opaque_token_unique_and_well_formed() {
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            let token = opaque_token();
            assert_eq!(token.len(), ID_LEN);
            assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
            assert!(seen.insert(token));
        }
    }

    #[test]
    fn test_opaque_token_differs_from_derived() {
        // An opaque token is random; the odds of landing on a specific
        // derived id are negligible.
        let derived = derive_id("abc").unwrap();
        assert_ne!(opaque_token(), derived);
    }
}
