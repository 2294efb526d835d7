//! Deterministic token encryption using AES-SIV for equality matches.
//!
//! AES-SIV (Synthetic IV) derives its IV from the plaintext, so the same
//! plaintext under the same key always yields the same ciphertext. The index
//! engine can then match ciphertext tokens for equality without seeing the
//! plaintext.
//!
//! # Security Properties
//!
//! - **Deterministic**: same plaintext → same ciphertext, for the lifetime of
//!   the key. The nonce is derived from the key once, at construction.
//! - **Misuse-resistant**: a fixed nonce is the intended usage of SIV.
//! - **Authenticated**: decrypting with another key, or a corrupted
//!   ciphertext, fails instead of yielding garbage.
//!
//! # Security Warning
//!
//! Deterministic encryption is not semantically secure: it reveals which
//! stored tokens are equal, and their frequencies. That is the price of
//! equality search on ciphertext. Use it only for fields that must be
//! searchable.

use aes_siv::{
    aead::{generic_array::GenericArray, Aead, KeyInit},
    Aes256SivAead,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use secrecy::{ExposeSecret, SecretVec};
use zeroize::Zeroizing;

use crate::error::Error;
use crate::kdf::{TOKEN_KEY_SIZE, TOKEN_NONCE_SIZE};

/// Deterministic token cipher using AES-256-SIV.
///
/// Ciphertexts are base64 (standard alphabet), so they never contain a space
/// or a `|`.
///
/// # Example
///
/// ```rust,ignore
/// use sifresearch::deterministic::TokenCipher;
/// use secrecy::SecretVec;
/// use zeroize::Zeroizing;
///
/// let cipher = TokenCipher::new(SecretVec::new(vec![0u8; 64]), Zeroizing::new([0u8; 16]))?;
///
/// let ct1 = cipher.encrypt(b"alice@example.com")?;
/// let ct2 = cipher.encrypt(b"alice@example.com")?;
/// assert_eq!(ct1, ct2); // Deterministic!
/// ```
pub struct TokenCipher {
    /// AES-256-SIV requires a 64-byte key (512 bits)
    key: SecretVec<u8>,
    nonce: Zeroizing<[u8; TOKEN_NONCE_SIZE]>,
}

impl TokenCipher {
    /// Creates a token cipher with the given key and fixed nonce.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidKey` if the key is not 64 bytes.
    pub fn new(
        key: SecretVec<u8>,
        nonce: Zeroizing<[u8; TOKEN_NONCE_SIZE]>,
    ) -> Result<Self, Error> {
        let len = key.expose_secret().len();
        if len != TOKEN_KEY_SIZE {
            return Err(Error::InvalidKey(format!(
                "token key must be {TOKEN_KEY_SIZE} bytes, got {len}"
            )));
        }
        Ok(Self { key, nonce })
    }

    /// Encrypts `plaintext` into a base64 ciphertext.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, Error> {
        let cipher = self.cipher()?;
        let ciphertext = cipher
            .encrypt(GenericArray::from_slice(self.nonce.as_slice()), plaintext)
            .map_err(|e| Error::EncryptionFailed(format!("AES-SIV encryption failed: {e}")))?;
        Ok(STANDARD.encode(ciphertext))
    }

    /// Decrypts a base64 ciphertext produced by [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    ///
    /// Returns `Error::DecryptionFailed` if the input is not base64, was
    /// produced under another key, or was corrupted.
    pub fn decrypt(&self, ciphertext: &str) -> Result<Vec<u8>, Error> {
        let raw = STANDARD
            .decode(ciphertext)
            .map_err(|e| Error::DecryptionFailed(format!("invalid base64: {e}")))?;

        let cipher = self.cipher()?;
        cipher
            .decrypt(GenericArray::from_slice(self.nonce.as_slice()), raw.as_slice())
            .map_err(|e| Error::DecryptionFailed(format!("AES-SIV decryption failed: {e}")))
    }

    fn cipher(&self) -> Result<Aes256SivAead, Error> {
        Aes256SivAead::new_from_slice(self.key.expose_secret())
            .map_err(|e| Error::EncryptionFailed(format!("Failed to create AES-SIV cipher: {e}")))
    }
}
