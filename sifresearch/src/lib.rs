//! # `SifreSearch`
//!
//! Searchable encryption for document indexes. Documents are encrypted
//! field by field before they reach the index engine, in forms the engine
//! can still query:
//!
//! - deterministic encryption (AES-SIV) for equality on whole values;
//! - deterministic encryption of edge n-gram tokens for partial and phrase
//!   matches on full text;
//! - order-preserving encryption for range queries on integers, dates and
//!   times.
//!
//! The engine sees ciphertext only. Key material never leaves the
//! [`CipherSuite`](cipher_suite::CipherSuite).
//!
//! ## Example
//!
//! ```rust,ignore
//! use sifresearch::prelude::*;
//!
//! let suite = CipherSuite::new(SecretVec::new(key), SuiteConfig::default())?;
//! let tokenizer = Arc::new(EdgeNgramTokenizer::new(AnalyzerConfig::default())?);
//! let pipeline = BulkPipeline::new(DocumentEncoder::new(suite, tokenizer));
//! let index = SearchableIndex::new(gateway, pipeline, "library", AnalyzerConfig::default());
//!
//! index.create(true).await?;
//! index.index_doc("1", "book", &document, &specs).await?;
//! index.refresh().await?;
//!
//! let hits = index.search(&index.queries().match_phrase("text", "brown fox").await?).await?;
//! ```

#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod bulk;
pub mod cipher_suite;
pub mod codec;
pub mod config;
pub mod deterministic;
pub mod document;
pub mod encoder;
pub mod error;
pub mod field;
pub mod gateway;
pub mod kdf;
pub mod ope;
pub mod query;
pub mod searchable;
pub mod tokenizer;

pub mod prelude {
    //! Convenience re-exports for common use.
    pub use crate::bulk::{BulkBatch, BulkEntry, BulkPipeline};
    pub use crate::cipher_suite::CipherSuite;
    pub use crate::config::{AnalyzerConfig, EncoderOptions, SuiteConfig, TokenChars};
    pub use crate::document::{
        Decoded, DecodedDocument, Document, EncryptedDocument, EncryptedValue, Value,
    };
    pub use crate::encoder::DocumentEncoder;
    pub use crate::error::{Error, GatewayError};
    pub use crate::field::{FieldKind, FieldSpec, FieldSpecs};
    pub use crate::gateway::{BulkItem, BulkResponse, Hit, IndexGateway, SearchResponse};
    pub use crate::query::{Query, QueryEncoder};
    pub use crate::searchable::SearchableIndex;
    pub use crate::tokenizer::{AnalyzerTokenizer, EdgeNgramTokenizer, TokenGroup, Tokenizer};
}
