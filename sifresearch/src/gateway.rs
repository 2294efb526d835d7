//! Index engine abstraction.
//!
//! The index engine stores, analyzes and searches encrypted documents. It
//! never receives plaintext (except fields the caller explicitly passes
//! through) and never receives key material.

use async_trait::async_trait;

use crate::config::AnalyzerConfig;
use crate::document::EncryptedDocument;
use crate::error::GatewayError;
use crate::query::Query;

/// A token reported by the engine's analyzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzedToken {
    /// Token text
    pub token: String,
    /// Start offset in the source text
    pub start_offset: usize,
    /// End offset in the source text
    pub end_offset: usize,
    /// Index of the source text in the request
    pub segment: usize,
}

/// One document of a bulk request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItem {
    /// Document identifier
    pub id: String,
    /// Caller-defined kind tag
    pub kind: String,
    /// Encrypted body
    pub body: EncryptedDocument,
}

/// A bulk item the engine refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkFailure {
    /// Document identifier
    pub id: String,
    /// Engine-provided reason
    pub reason: String,
}

/// Outcome of a bulk request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkResponse {
    /// Number of documents written
    pub indexed: usize,
    /// Documents that were refused
    pub failures: Vec<BulkFailure>,
}

/// A matching document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    /// Document identifier
    pub id: String,
    /// Caller-defined kind tag
    pub kind: String,
    /// Stored encrypted body
    pub source: EncryptedDocument,
}

/// Result of a search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResponse {
    /// Number of matching documents
    pub total: usize,
    /// Matching documents
    pub hits: Vec<Hit>,
}

/// Operations the index engine must provide.
///
/// Implementations must be thread-safe (`Send + Sync`). Retries and backoff,
/// if any, belong inside the implementation; callers see failures unchanged.
///
/// Writes for the same document id must not be issued concurrently.
#[async_trait]
pub trait IndexGateway: Send + Sync {
    /// Creates an index with `analyzer` registered on it.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::IndexExists` if the index already exists.
    async fn create_index(
        &self,
        index: &str,
        analyzer: &AnalyzerConfig,
    ) -> Result<(), GatewayError>;

    /// Drops an index and its documents.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::IndexNotFound` if the index does not exist.
    async fn drop_index(&self, index: &str) -> Result<(), GatewayError>;

    /// Returns true if the index exists.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Unavailable` if the engine cannot be reached.
    async fn index_exists(&self, index: &str) -> Result<bool, GatewayError>;

    /// Runs the named analyzer over `texts`.
    ///
    /// Tokens come back ordered by segment, then by start offset, each tagged
    /// with the index of its text.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::AnalyzerNotFound` for an unknown analyzer.
    async fn analyze(
        &self,
        index: &str,
        analyzer: &str,
        texts: &[&str],
    ) -> Result<Vec<AnalyzedToken>, GatewayError>;

    /// Writes one document, replacing any document with the same id.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::IndexNotFound` if the index does not exist.
    async fn index_document(
        &self,
        index: &str,
        id: &str,
        kind: &str,
        body: &EncryptedDocument,
    ) -> Result<(), GatewayError>;

    /// Writes many documents in one request.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::IndexNotFound` if the index does not exist.
    /// Per-document refusals are reported in the response instead.
    async fn bulk_index(
        &self,
        index: &str,
        items: Vec<BulkItem>,
    ) -> Result<BulkResponse, GatewayError>;

    /// Runs a query.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Rejected` for queries the engine cannot run.
    async fn search(&self, index: &str, query: &Query) -> Result<SearchResponse, GatewayError>;

    /// Makes every write issued so far visible to searches.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::IndexNotFound` if the index does not exist.
    async fn refresh(&self, index: &str) -> Result<(), GatewayError>;
}
