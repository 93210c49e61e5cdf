//! PKCE (Proof Key for Code Exchange) implementation for OAuth 2.0
//!
//! Implements RFC 7636 `S256`. The verifier is a 128 character string drawn
//! from the unreserved URI alphabet with rejection sampling over the OS
//! random source, so every character is uniformly distributed.
//!
//! Between the login redirect and the callback the verifier lives in the
//! persistent store under a key derived from the attempt's `state`, so
//! sessions sharing the store never see each other's verifier.
//! [`take_verifier`] reads and erases it in one step so it can never be
//! replayed.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::storage::PKCE_VERIFIER_KEY;
use super::traits::SessionStore;
use crate::error::SsoResult;

/// RFC 7636 unreserved characters
pub const UNRESERVED_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// Length of generated verifiers (RFC 7636 allows 43-128)
pub const VERIFIER_LENGTH: usize = 128;

/// Challenge method sent with the authorization request
pub const CHALLENGE_METHOD: &str = "S256";

/// Generate a uniformly random string over `alphabet`
///
/// Bytes that would bias the modulo are discarded and redrawn.
///
/// # Errors
/// Returns `SsoError::Entropy` if the OS random source fails. This is not
/// retried.
pub fn random_string(alphabet: &[u8], length: usize) -> SsoResult<String> {
    debug_assert!(!alphabet.is_empty() && alphabet.len() <= 256);

    let alphabet_len = alphabet.len();
    // Largest multiple of the alphabet size that fits in a byte
    let limit = 256 - (256 % alphabet_len);

    let mut out = String::with_capacity(length);
    let mut buf = [0u8; 64];
    while out.len() < length {
        OsRng.try_fill_bytes(&mut buf)?;
        for &byte in &buf {
            if usize::from(byte) < limit {
                out.push(char::from(alphabet[usize::from(byte) % alphabet_len]));
                if out.len() == length {
                    break;
                }
            }
        }
    }
    Ok(out)
}

/// Generate a cryptographically secure code verifier
///
/// # Errors
/// Returns `SsoError::Entropy` if the OS random source fails.
pub fn generate_code_verifier() -> SsoResult<Zeroizing<String>> {
    random_string(UNRESERVED_CHARSET, VERIFIER_LENGTH).map(Zeroizing::new)
}

/// Derive the code challenge: BASE64URL(SHA256(ASCII(verifier)))
#[must_use]
pub fn generate_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Check that `challenge` was derived from `verifier`
#[must_use]
pub fn verify(verifier: &str, challenge: &str) -> bool {
    generate_code_challenge(verifier) == challenge
}

/// PKCE verifier/challenge pair for one login attempt
///
/// The verifier is zeroed from memory when the challenge is dropped.
#[derive(Clone)]
pub struct PkceChallenge {
    /// Secret sent during token exchange
    pub verifier: Zeroizing<String>,
    /// SHA-256 of the verifier, sent in the authorization request
    pub challenge: String,
}

impl PkceChallenge {
    /// Generate a fresh pair
    ///
    /// # Errors
    /// Returns `SsoError::Entropy` if the OS random source fails.
    pub fn generate() -> SsoResult<Self> {
        let verifier = generate_code_verifier()?;
        let challenge = generate_code_challenge(&verifier);
        Ok(Self { verifier, challenge })
    }

    /// Get the challenge method (always "S256")
    #[must_use]
    pub const fn method(&self) -> &'static str {
        CHALLENGE_METHOD
    }
}

impl std::fmt::Debug for PkceChallenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkceChallenge")
            .field("verifier", &"<redacted>")
            .field("challenge", &self.challenge)
            .finish()
    }
}

/// Store key of the verifier for the login attempt identified by `state`
#[must_use]
pub fn verifier_key(state: &str) -> String {
    format!("{PKCE_VERIFIER_KEY}:{state}")
}

/// Persist the verifier for the login attempt identified by `state`
///
/// # Errors
/// Returns a storage error if the write fails.
pub async fn store_verifier(
    store: &dyn SessionStore,
    state: &str,
    pkce: &PkceChallenge,
) -> SsoResult<()> {
    store.set(&verifier_key(state), pkce.verifier.as_str().to_owned()).await
}

/// Read and erase the verifier of the login attempt identified by `state`
///
/// # Errors
/// Returns a storage error if the read or delete fails.
pub async fn take_verifier(
    store: &dyn SessionStore,
    state: &str,
) -> SsoResult<Option<Zeroizing<String>>> {
    Ok(store.take(&verifier_key(state)).await?.map(Zeroizing::new))
}

#[cfg(test)]
mod tests {
    //! Unit tests for auth::pkce.

    use std::collections::HashSet;

    use super::*;
    use crate::auth::storage::MemoryStore;

    /// Validates `PkceChallenge::generate` output shape.
    ///
    /// Assertions:
    /// - Confirms the verifier is 128 unreserved characters.
    /// - Confirms the challenge is 43 characters of unpadded base64url.
    /// - Confirms the method is S256.
    #[test]
    fn test_generate_pkce_challenge() {
        let pkce = PkceChallenge::generate().expect("Failed to generate challenge");

        assert_eq!(pkce.verifier.len(), VERIFIER_LENGTH);
        assert!(pkce.verifier.bytes().all(|b| UNRESERVED_CHARSET.contains(&b)));
        assert_eq!(pkce.challenge.len(), 43);
        assert!(!pkce.challenge.contains('='));
        assert!(!pkce.challenge.contains('+'));
        assert!(!pkce.challenge.contains('/'));
        assert_eq!(pkce.method(), "S256");
    }

    /// Validates the RFC 7636 appendix B test vector.
    ///
    /// Assertions:
    /// - Confirms the known verifier hashes to the known challenge.
    #[test]
    fn test_rfc7636_vector() {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r7wW1gFWFOEjXk";
        let expected = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";
        assert_eq!(generate_code_challenge(verifier), expected);
        assert!(verify(verifier, expected));
    }

    /// Validates `verify` rejects mismatched verifiers.
    ///
    /// Assertions:
    /// - Ensures a pair verifies and a different verifier does not.
    #[test]
    fn test_verify_rejects_other_verifier() {
        let first = PkceChallenge::generate().unwrap();
        let second = PkceChallenge::generate().unwrap();

        assert!(verify(&first.verifier, &first.challenge));
        assert!(!verify(&second.verifier, &first.challenge));
        assert!(!verify("", &first.challenge));
    }

    /// Validates random strings are unique and respect the alphabet.
    ///
    /// Assertions:
    /// - Ensures 100 generated strings are distinct.
    /// - Ensures every character comes from the requested alphabet.
    #[test]
    fn test_random_string_uniqueness() {
        let alphabet = b"abc123";
        let mut seen = HashSet::new();
        for _ in 0..100 {
            let value = random_string(alphabet, 32).unwrap();
            assert_eq!(value.len(), 32);
            assert!(value.bytes().all(|b| alphabet.contains(&b)));
            seen.insert(value);
        }
        assert_eq!(seen.len(), 100);
    }

    /// Validates the verifier slot is single-use.
    ///
    /// Assertions:
    /// - Confirms the stored verifier is returned once.
    /// - Confirms the second take finds nothing.
    #[tokio::test]
    async fn test_verifier_take_erases() {
        let store = MemoryStore::new();
        let pkce = PkceChallenge::generate().unwrap();

        store_verifier(&store, "state-a", &pkce).await.unwrap();
        let taken = take_verifier(&store, "state-a").await.unwrap().expect("verifier stored");
        assert_eq!(taken.as_str(), pkce.verifier.as_str());
        assert!(take_verifier(&store, "state-a").await.unwrap().is_none());
    }

    /// Validates verifiers of different attempts do not collide.
    ///
    /// Assertions:
    /// - Confirms each attempt gets back its own verifier.
    /// - Ensures an unknown state finds nothing and erases nothing.
    #[tokio::test]
    async fn test_verifiers_are_scoped_to_attempt() {
        let store = MemoryStore::new();
        let first = PkceChallenge::generate().unwrap();
        let second = PkceChallenge::generate().unwrap();

        store_verifier(&store, "state-a", &first).await.unwrap();
        store_verifier(&store, "state-b", &second).await.unwrap();
        assert!(take_verifier(&store, "forged").await.unwrap().is_none());
        assert_eq!(store.len(), 2);

        let taken = take_verifier(&store, "state-b").await.unwrap().unwrap();
        assert_eq!(taken.as_str(), second.verifier.as_str());
        let taken = take_verifier(&store, "state-a").await.unwrap().unwrap();
        assert_eq!(taken.as_str(), first.verifier.as_str());
    }

    /// Validates the debug output hides the verifier.
    ///
    /// Assertions:
    /// - Ensures the verifier does not appear in `{:?}` output.
    #[test]
    fn test_debug_redacts_verifier() {
        let pkce = PkceChallenge::generate().unwrap();
        let rendered = format!("{pkce:?}");
        assert!(!rendered.contains(pkce.verifier.as_str()));
        assert!(rendered.contains(&pkce.challenge));
    }
}
