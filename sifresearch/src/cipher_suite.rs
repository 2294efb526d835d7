//! The cipher suite: every primitive derived from one key.
//!
//! [`CipherSuite`] owns the caller's key and exposes the two encryption
//! families a searchable index needs:
//!
//! - deterministic token encryption (AES-SIV) for equality and term matches;
//! - order-preserving integer encryption for range queries, with dates
//!   reduced to day ordinals and times to seconds of the day.
//!
//! The suite is immutable after construction and cheap to clone; clones
//! share the same derived keys.

use std::fmt;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use secrecy::{ExposeSecret, SecretVec};
use zeroize::Zeroizing;

use crate::config::SuiteConfig;
use crate::deterministic::TokenCipher;
use crate::error::Error;
use crate::kdf::{derive_subkey, Purpose, TOKEN_NONCE_SIZE};
use crate::ope::{OpeCipher, ValueRange};

struct Inner {
    tokens: TokenCipher,
    ope: OpeCipher,
}

/// Deterministic and order-preserving encryption under a single key.
///
/// # Example
///
/// ```
/// use chrono::NaiveDate;
/// use secrecy::SecretVec;
/// use sifresearch::cipher_suite::CipherSuite;
/// use sifresearch::config::SuiteConfig;
///
/// let key = SecretVec::new(b"key goes here!!!".to_vec());
/// let suite = CipherSuite::new(key, SuiteConfig::default())?;
///
/// let token = suite.encrypt_str("Kim Chong Un")?;
/// assert_eq!(token, suite.encrypt_str("Kim Chong Un")?);
/// assert_eq!(suite.decrypt_str(&token)?, "Kim Chong Un");
///
/// assert!(suite.encrypt_int(1233)? < suite.encrypt_int(1235)?);
///
/// let day = NaiveDate::from_ymd_opt(2010, 1, 1).unwrap();
/// assert_eq!(suite.decrypt_date(suite.encrypt_date(day)?)?, day);
/// # Ok::<(), sifresearch::error::Error>(())
/// ```
#[derive(Clone)]
pub struct CipherSuite {
    inner: Arc<Inner>,
}

impl CipherSuite {
    /// Derives all primitives from `key`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidKey` if the key is empty and
    /// `Error::InvalidRange` if `config.int_min >= config.int_max` or the
    /// resulting domain is too wide.
    pub fn new(key: SecretVec<u8>, config: SuiteConfig) -> Result<Self, Error> {
        if key.expose_secret().is_empty() {
            return Err(Error::InvalidKey("key material is empty".to_string()));
        }
        if config.int_min >= config.int_max {
            return Err(Error::InvalidRange { min: config.int_min, max: config.int_max });
        }

        let token_key = derive_subkey(&key, Purpose::TokenKey)?;
        let nonce_bytes = derive_subkey(&key, Purpose::TokenNonce)?;
        let mut nonce = Zeroizing::new([0u8; TOKEN_NONCE_SIZE]);
        nonce.copy_from_slice(nonce_bytes.expose_secret());

        let (min, max) = config.effective_domain();
        let ope_key = derive_subkey(&key, Purpose::OpeKey)?;
        let ope = OpeCipher::new(ope_key, ValueRange::new(min, max)?)?;

        Ok(Self { inner: Arc::new(Inner { tokens: TokenCipher::new(token_key, nonce)?, ope }) })
    }

    /// Integer domain accepted by [`encrypt_int`](Self::encrypt_int).
    #[must_use]
    pub fn int_domain(&self) -> ValueRange {
        self.inner.ope.domain()
    }

    /// Encrypts a token deterministically.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails.
    pub fn encrypt_token(&self, plaintext: &[u8]) -> Result<String, Error> {
        self.inner.tokens.encrypt(plaintext)
    }

    /// Decrypts a token.
    ///
    /// # Errors
    ///
    /// Returns `Error::DecryptionFailed` for malformed or foreign ciphertexts.
    pub fn decrypt_token(&self, ciphertext: &str) -> Result<Vec<u8>, Error> {
        self.inner.tokens.decrypt(ciphertext)
    }

    /// Encrypts a UTF-8 token.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails.
    pub fn encrypt_str(&self, plaintext: &str) -> Result<String, Error> {
        self.encrypt_token(plaintext.as_bytes())
    }

    /// Decrypts a UTF-8 token.
    ///
    /// # Errors
    ///
    /// Returns `Error::DecryptionFailed` if decryption fails or the plaintext
    /// is not UTF-8.
    pub fn decrypt_str(&self, ciphertext: &str) -> Result<String, Error> {
        String::from_utf8(self.decrypt_token(ciphertext)?)
            .map_err(|e| Error::DecryptionFailed(format!("plaintext is not UTF-8: {e}")))
    }

    /// Encrypts an integer, preserving order.
    ///
    /// # Errors
    ///
    /// Returns `Error::OutOfRange` outside [`int_domain`](Self::int_domain).
    pub fn encrypt_int(&self, value: i64) -> Result<u64, Error> {
        self.inner.ope.encrypt(value)
    }

    /// Decrypts an order-preserving ciphertext.
    ///
    /// # Errors
    ///
    /// Returns `Error::DecryptionFailed` if no integer maps to `ciphertext`.
    pub fn decrypt_int(&self, ciphertext: u64) -> Result<i64, Error> {
        self.inner.ope.decrypt(ciphertext)
    }

    /// Encrypts a date as its day ordinal (0001-01-01 is day 1).
    ///
    /// # Errors
    ///
    /// Returns `Error::OutOfRange` for dates outside the integer domain.
    pub fn encrypt_date(&self, date: NaiveDate) -> Result<u64, Error> {
        self.encrypt_int(i64::from(date.num_days_from_ce()))
    }

    /// Decrypts a date.
    ///
    /// # Errors
    ///
    /// Returns `Error::DecryptionFailed` if the ordinal is not a valid date.
    pub fn decrypt_date(&self, ciphertext: u64) -> Result<NaiveDate, Error> {
        let ordinal = self.decrypt_int(ciphertext)?;
        i32::try_from(ordinal)
            .ok()
            .and_then(NaiveDate::from_num_days_from_ce_opt)
            .ok_or_else(|| Error::DecryptionFailed(format!("day ordinal {ordinal} is not a date")))
    }

    /// Encrypts a time of day as whole seconds since midnight.
    ///
    /// Fractional seconds are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails.
    pub fn encrypt_time(&self, time: NaiveTime) -> Result<u64, Error> {
        self.encrypt_int(i64::from(time.num_seconds_from_midnight()))
    }

    /// Decrypts a time of day, to the second.
    ///
    /// # Errors
    ///
    /// Returns `Error::DecryptionFailed` if the value is not a second of the day.
    pub fn decrypt_time(&self, ciphertext: u64) -> Result<NaiveTime, Error> {
        let seconds = self.decrypt_int(ciphertext)?;
        let invalid = || Error::DecryptionFailed(format!("{seconds} is not a second of the day"));
        let seconds = u32::try_from(seconds).map_err(|_| invalid())?;
        NaiveTime::from_hms_opt(seconds / 3600, seconds / 60 % 60, seconds % 60).ok_or_else(invalid)
    }
}

impl fmt::Debug for CipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherSuite")
            .field("key", &"[REDACTED]")
            .field("int_domain", &self.int_domain())
            .finish()
    }
}
