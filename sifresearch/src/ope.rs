//! Order-preserving integer encryption.
//!
//! A keyed, strictly increasing map from a closed plaintext interval onto a
//! larger ciphertext interval. Range queries on ciphertexts therefore return
//! exactly the documents the plaintext range query would.
//!
//! # Construction
//!
//! The cipher is a lazily sampled binary search tree. Every node covers a
//! plaintext interval `[dlo, dhi]` and a ciphertext interval `[rlo, rhi]`
//! with at least as many ciphertexts as plaintexts. The plaintext interval
//! is split at its midpoint and the ciphertext split point is drawn with
//! HMAC-SHA256 keyed by the OPE key over the node coordinates, constrained so
//! that both halves keep enough room. A one-plaintext leaf picks a single
//! ciphertext in its interval the same way.
//!
//! Encryption descends by plaintext, decryption by ciphertext; both cost one
//! PRF evaluation per tree level.
//!
//! # Security Warning
//!
//! Order-preserving ciphertexts reveal the order of plaintexts and, roughly,
//! their distance. There is no integrity tag: a foreign ciphertext may decrypt
//! to an unrelated in-domain value instead of failing.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretVec};
use sha2::Sha256;

use crate::error::Error;

type HmacSha256 = Hmac<Sha256>;

const SPLIT_TAG: u8 = b'S';
const LEAF_TAG: u8 = b'L';

/// A closed integer interval `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueRange {
    min: i64,
    max: i64,
}

impl ValueRange {
    /// Creates a range.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRange` if `min >= max`.
    pub fn new(min: i64, max: i64) -> Result<Self, Error> {
        if min >= max {
            return Err(Error::InvalidRange { min, max });
        }
        Ok(Self { min, max })
    }

    /// Lowest value in the range.
    #[must_use]
    pub const fn min(&self) -> i64 {
        self.min
    }

    /// Highest value in the range.
    #[must_use]
    pub const fn max(&self) -> i64 {
        self.max
    }

    /// Returns true if `value` lies inside the range.
    #[must_use]
    pub const fn contains(&self, value: i64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Number of integers in the range.
    fn size(&self) -> Option<u64> {
        u64::try_from(i128::from(self.max) - i128::from(self.min) + 1).ok()
    }
}

/// Node of the lazily sampled tree, in offsets from the interval starts.
#[derive(Debug, Clone, Copy)]
struct Node {
    dlo: u64,
    dhi: u64,
    rlo: u64,
    rhi: u64,
}

impl Node {
    const fn domain_size(&self) -> u64 {
        self.dhi - self.dlo + 1
    }

    const fn midpoint(&self) -> u64 {
        self.dlo + (self.domain_size() - 1) / 2
    }

    fn coordinates(&self, tag: u8) -> [u8; 33] {
        let mut buf = [0u8; 33];
        buf[0] = tag;
        buf[1..9].copy_from_slice(&self.dlo.to_be_bytes());
        buf[9..17].copy_from_slice(&self.dhi.to_be_bytes());
        buf[17..25].copy_from_slice(&self.rlo.to_be_bytes());
        buf[25..33].copy_from_slice(&self.rhi.to_be_bytes());
        buf
    }
}

/// Keyed order-preserving cipher over a [`ValueRange`].
///
/// Ciphertexts lie in `[0, M²)` where `M` is the number of plaintexts.
pub struct OpeCipher {
    key: SecretVec<u8>,
    domain: ValueRange,
    domain_size: u64,
    range_size: u64,
}

impl OpeCipher {
    /// Creates a cipher for `domain` under `key`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRange` if the ciphertext space (`M²`) does not
    /// fit in a `u64`, and `Error::InvalidKey` if the key is empty.
    pub fn new(key: SecretVec<u8>, domain: ValueRange) -> Result<Self, Error> {
        if key.expose_secret().is_empty() {
            return Err(Error::InvalidKey("OPE key is empty".to_string()));
        }

        let invalid = || Error::InvalidRange { min: domain.min, max: domain.max };
        let domain_size = domain.size().ok_or_else(invalid)?;
        let range_size = domain_size.checked_mul(domain_size).ok_or_else(invalid)?;

        Ok(Self { key, domain, domain_size, range_size })
    }

    /// The plaintext domain.
    #[must_use]
    pub const fn domain(&self) -> ValueRange {
        self.domain
    }

    /// Number of possible ciphertexts.
    #[must_use]
    pub const fn range_size(&self) -> u64 {
        self.range_size
    }

    /// Encrypts `value`.
    ///
    /// # Errors
    ///
    /// Returns `Error::OutOfRange` if `value` is outside the domain.
    pub fn encrypt(&self, value: i64) -> Result<u64, Error> {
        if !self.domain.contains(value) {
            return Err(Error::OutOfRange { value, min: self.domain.min, max: self.domain.max });
        }
        let offset = u64::try_from(i128::from(value) - i128::from(self.domain.min))
            .map_err(|_| Error::OutOfRange { value, min: self.domain.min, max: self.domain.max })?;

        let mac = self.mac()?;
        let mut node = self.root();
        loop {
            if node.domain_size() == 1 {
                return Ok(leaf_value(&mac, &node));
            }
            let mid = node.midpoint();
            let split = split_point(&mac, &node);
            if offset <= mid {
                node.dhi = mid;
                node.rhi = split;
            } else {
                node.dlo = mid + 1;
                node.rlo = split + 1;
            }
        }
    }

    /// Decrypts `ciphertext`.
    ///
    /// # Errors
    ///
    /// Returns `Error::DecryptionFailed` if no plaintext maps to `ciphertext`.
    pub fn decrypt(&self, ciphertext: u64) -> Result<i64, Error> {
        if ciphertext >= self.range_size {
            return Err(Error::DecryptionFailed(format!(
                "ciphertext {ciphertext} outside [0, {})",
                self.range_size
            )));
        }

        let mac = self.mac()?;
        let mut node = self.root();
        loop {
            if node.domain_size() == 1 {
                if leaf_value(&mac, &node) != ciphertext {
                    return Err(Error::DecryptionFailed(format!(
                        "ciphertext {ciphertext} is not in the image of this key"
                    )));
                }
                let value = i128::from(self.domain.min) + i128::from(node.dlo);
                return i64::try_from(value)
                    .map_err(|_| Error::DecryptionFailed("plaintext overflow".to_string()));
            }
            let mid = node.midpoint();
            let split = split_point(&mac, &node);
            if ciphertext <= split {
                node.dhi = mid;
                node.rhi = split;
            } else {
                node.dlo = mid + 1;
                node.rlo = split + 1;
            }
        }
    }

    const fn root(&self) -> Node {
        Node { dlo: 0, dhi: self.domain_size - 1, rlo: 0, rhi: self.range_size - 1 }
    }

    fn mac(&self) -> Result<HmacSha256, Error> {
        HmacSha256::new_from_slice(self.key.expose_secret())
            .map_err(|e| Error::EncryptionFailed(format!("invalid OPE key: {e}")))
    }
}

/// Ciphertext split point for an inner node.
///
/// The left child keeps `[rlo, split]` and must hold at least as many
/// ciphertexts as its plaintexts; the right child likewise.
fn split_point(mac: &HmacSha256, node: &Node) -> u64 {
    let left_count = node.midpoint() - node.dlo + 1;
    let right_count = node.dhi - node.midpoint();
    let lo = node.rlo + left_count - 1;
    let hi = node.rhi - right_count;
    lo + draw(mac, &node.coordinates(SPLIT_TAG), hi - lo + 1)
}

fn leaf_value(mac: &HmacSha256, node: &Node) -> u64 {
    node.rlo + draw(mac, &node.coordinates(LEAF_TAG), node.rhi - node.rlo + 1)
}

/// Keyed draw in `[0, width)`.
fn draw(mac: &HmacSha256, input: &[u8], width: u64) -> u64 {
    let mut mac = mac.clone();
    mac.update(input);
    let digest = mac.finalize().into_bytes();

    let mut head = [0u8; 16];
    head.copy_from_slice(&digest[..16]);
    let sample = u128::from_be_bytes(head) % u128::from(width);
    // sample < width <= u64::MAX
    u64::try_from(sample).unwrap_or(0)
}
