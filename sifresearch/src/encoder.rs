//! Whole-document encoding and decoding.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::cipher_suite::CipherSuite;
use crate::codec::Codec;
use crate::config::EncoderOptions;
use crate::document::{Decoded, DecodedDocument, Document, EncryptedDocument, EncryptedValue};
use crate::error::Error;
use crate::field::{raw_companion, FieldKind, FieldSpecs};
use crate::tokenizer::Tokenizer;

/// Encrypts documents field by field according to their [`FieldSpecs`].
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use secrecy::SecretVec;
/// use sifresearch::prelude::*;
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let key = SecretVec::new(b"key goes here!!!".to_vec());
/// let suite = CipherSuite::new(key, SuiteConfig::default())?;
/// let tokenizer = Arc::new(EdgeNgramTokenizer::new(AnalyzerConfig::default())?);
/// let encoder = DocumentEncoder::new(suite, tokenizer);
///
/// let specs = FieldSpecs::builder()
///     .raw(["author"])
///     .full_text(["text"])
///     .integer(["value"])
///     .build()?;
/// let doc = Document::new()
///     .with("author", "Kim Chong Un")
///     .with("text", "The quick brown fox")
///     .with("value", 1234);
///
/// let encrypted = encoder.encode(&doc, &specs).await?;
/// assert!(encrypted.get("text_raw").is_some());
///
/// let decoded = encoder.decode(&encrypted, &specs)?;
/// assert_eq!(decoded.value("author"), doc.get("author"));
/// # Ok::<(), Error>(())
/// # }).unwrap();
/// ```
#[derive(Clone)]
pub struct DocumentEncoder {
    codec: Codec,
    tokenizer: Arc<dyn Tokenizer>,
    options: EncoderOptions,
}

impl DocumentEncoder {
    /// Creates an encoder with default options.
    pub fn new(suite: CipherSuite, tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { codec: Codec::new(suite), tokenizer, options: EncoderOptions::default() }
    }

    /// Replaces the options.
    #[must_use]
    pub fn with_options(mut self, options: EncoderOptions) -> Self {
        self.options = options;
        self
    }

    /// Current options.
    #[must_use]
    pub const fn options(&self) -> EncoderOptions {
        self.options
    }

    /// Field codec.
    #[must_use]
    pub const fn codec(&self) -> &Codec {
        &self.codec
    }

    /// Tokenizer used for full-text fields.
    #[must_use]
    pub fn tokenizer(&self) -> &Arc<dyn Tokenizer> {
        &self.tokenizer
    }

    /// Checks every field of `document` against `specs` without encrypting.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownField` for undeclared fields unless
    /// `allow_unencrypted` is set, `Error::DuplicateField` for an undeclared
    /// field shadowing a `_raw` companion, and `Error::TypeMismatch` for
    /// values that do not fit their kind.
    pub fn validate(&self, document: &Document, specs: &FieldSpecs) -> Result<(), Error> {
        for (name, value) in document.iter() {
            match specs.kind(name) {
                Some(kind) => Codec::check_type(name, kind, value)?,
                None if specs.resolve_stored(name).is_some() => {
                    return Err(Error::DuplicateField(name.to_string()));
                }
                None if self.options.allow_unencrypted => {}
                None => return Err(Error::UnknownField(name.to_string())),
            }
        }
        Ok(())
    }

    /// Encrypts `document`.
    ///
    /// Declared fields missing from the document are skipped. A full-text
    /// field `f` yields both `f` and its companion `f_raw`.
    ///
    /// # Errors
    ///
    /// Fails on the first field that does not validate or encrypt; nothing
    /// is returned for the rest of the document.
    #[instrument(skip_all, fields(fields = document.len()))]
    pub async fn encode(
        &self,
        document: &Document,
        specs: &FieldSpecs,
    ) -> Result<EncryptedDocument, Error> {
        self.validate(document, specs)?;

        let mut out = EncryptedDocument::new();
        for (name, value) in document.iter() {
            match specs.kind(name) {
                None => {
                    warn!(field = name, "storing undeclared field unencrypted");
                    out.insert(name, EncryptedValue::Plain(value.clone()));
                }
                Some(FieldKind::FullText) => {
                    let text = Codec::full_text_input(name, value)?;
                    let groups = self.tokenizer.tokenize(text).await?;
                    let (tokens, raw) = self.codec.encode_full_text(name, value, &groups)?;
                    out.insert(name, tokens);
                    out.insert(raw_companion(name), raw);
                }
                Some(kind) => out.insert(name, self.codec.encode_scalar(name, kind, value)?),
            }
        }

        debug!(stored = out.len(), "encoded document");
        Ok(out)
    }

    /// Decrypts `document`.
    ///
    /// Full-text fields come back as token alternatives; their `_raw`
    /// companions come back as exact text. Plaintext passthrough values are
    /// returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownField` for encrypted fields `specs` does not
    /// declare and `Error::DecryptionFailed` if a value does not decrypt.
    pub fn decode(
        &self,
        document: &EncryptedDocument,
        specs: &FieldSpecs,
    ) -> Result<DecodedDocument, Error> {
        let mut out = DecodedDocument::default();
        for (name, value) in document.iter() {
            let decoded = match value {
                EncryptedValue::Plain(plain) => Decoded::Value(plain.clone()),
                _ => {
                    let (kind, _) = specs
                        .resolve_stored(name)
                        .ok_or_else(|| Error::UnknownField(name.to_string()))?;
                    self.codec.decode(name, kind, value)?
                }
            };
            out.insert(name, decoded);
        }
        Ok(out)
    }
}

impl std::fmt::Debug for DocumentEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentEncoder")
            .field("codec", &self.codec)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
