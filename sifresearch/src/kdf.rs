//! Sub-key derivation using HKDF (HMAC-based Key Derivation Function).
//!
//! The caller supplies a single opaque secret. Every primitive in the
//! [`CipherSuite`](crate::cipher_suite::CipherSuite) gets its own key expanded
//! from it with HKDF-SHA256, with a distinct `info` label per purpose so no
//! two primitives ever share key bytes.

use hkdf::Hkdf;
use secrecy::{ExposeSecret, SecretVec};
use sha2::Sha256;

use crate::error::Error;

/// AES-256-SIV takes a 512-bit key.
pub const TOKEN_KEY_SIZE: usize = 64;

/// Size of the fixed token nonce (one AES block).
pub const TOKEN_NONCE_SIZE: usize = 16;

/// Key size for the order-preserving PRF.
pub const OPE_KEY_SIZE: usize = 32;

/// Purpose label for a derived sub-key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    /// Deterministic token cipher key
    TokenKey,
    /// Fixed nonce for the deterministic token cipher
    TokenNonce,
    /// Order-preserving encryption PRF key
    OpeKey,
}

impl Purpose {
    const fn info(self) -> &'static [u8] {
        match self {
            Self::TokenKey => b"sifresearch|token|key|v1",
            Self::TokenNonce => b"sifresearch|token|nonce|v1",
            Self::OpeKey => b"sifresearch|ope|key|v1",
        }
    }

    /// Output length for this purpose.
    #[must_use]
    pub const fn output_len(self) -> usize {
        match self {
            Self::TokenKey => TOKEN_KEY_SIZE,
            Self::TokenNonce => TOKEN_NONCE_SIZE,
            Self::OpeKey => OPE_KEY_SIZE,
        }
    }
}

/// Derives the sub-key for `purpose` from the caller's key material.
///
/// # Errors
///
/// Returns `Error::KeyDerivation` if the derivation fails.
///
/// # Example
///
/// ```
/// use sifresearch::kdf::{derive_subkey, Purpose};
/// use secrecy::{ExposeSecret, SecretVec};
///
/// let key = SecretVec::new(b"key goes here!!!".to_vec());
/// let token_key = derive_subkey(&key, Purpose::TokenKey).expect("derivation failed");
/// assert_eq!(token_key.expose_secret().len(), 64);
/// ```
pub fn derive_subkey(key: &SecretVec<u8>, purpose: Purpose) -> Result<SecretVec<u8>, Error> {
    let hkdf = Hkdf::<Sha256>::new(None, key.expose_secret());

    let mut okm = vec![0u8; purpose.output_len()];
    hkdf.expand(purpose.info(), &mut okm).map_err(|_| Error::KeyDerivation)?;

    Ok(SecretVec::new(okm))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_subkey_deterministic() {
        let key = SecretVec::new(vec![1u8; 16]);

        let k1 = derive_subkey(&key, Purpose::OpeKey).expect("derivation failed");
        let k2 = derive_subkey(&key, Purpose::OpeKey).expect("derivation failed");

        assert_eq!(k1.expose_secret(), k2.expose_secret());
    }

    #[test]
    fn test_purposes_are_separated() {
        let key = SecretVec::new(vec![1u8; 16]);

        let token = derive_subkey(&key, Purpose::TokenKey).expect("derivation failed");
        let ope = derive_subkey(&key, Purpose::OpeKey).expect("derivation failed");

        assert_ne!(&token.expose_secret()[..OPE_KEY_SIZE], ope.expose_secret().as_slice());
    }

    #[test]
    fn test_output_lengths() {
        let key = SecretVec::new(b"key goes here!!!".to_vec());

        for purpose in [Purpose::TokenKey, Purpose::TokenNonce, Purpose::OpeKey] {
            let sub = derive_subkey(&key, purpose).expect("derivation failed");
            assert_eq!(sub.expose_secret().len(), purpose.output_len());
        }
    }

    #[test]
    fn test_different_keys_differ() {
        let k1 = SecretVec::new(vec![1u8; 16]);
        let k2 = SecretVec::new(vec![2u8; 16]);

        let s1 = derive_subkey(&k1, Purpose::TokenNonce).expect("derivation failed");
        let s2 = derive_subkey(&k2, Purpose::TokenNonce).expect("derivation failed");

        assert_ne!(s1.expose_secret(), s2.expose_secret());
    }

    // RFC 5869 Appendix A.1, HKDF-SHA256 basic test case
    #[test]
    fn test_hkdf_rfc5869_test_case_1() {
        const IKM_HEX: &str = "0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b";
        const SALT_HEX: &str = "000102030405060708090a0b0c";
        const INFO_HEX: &str = "f0f1f2f3f4f5f6f7f8f9";
        const EXPECTED_OKM_HEX: &str =
            "3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf34007208d5b887185865";

        let ikm = hex::decode(IKM_HEX).unwrap();
        let salt = hex::decode(SALT_HEX).unwrap();
        let info = hex::decode(INFO_HEX).unwrap();
        let expected_okm = hex::decode(EXPECTED_OKM_HEX).unwrap();

        let hkdf = Hkdf::<Sha256>::new(Some(&salt), &ikm);
        let mut okm = vec![0u8; 42];
        hkdf.expand(&info, &mut okm).expect("HKDF expand failed");

        assert_eq!(okm, expected_okm);
    }
}
