//! In-memory index engine for `SifreSearch`.
//!
//! [`MemoryGateway`] implements [`IndexGateway`] inside the process. It
//! behaves like a search engine as far as the encryption layer can tell:
//! indexes carry an edge n-gram analyzer, writes become visible on
//! `refresh`, and queries run over the stored ciphertext only.
//!
//! Suitable for tests, benchmarks and local development.
//!
//! | Query          | Matches when                                              |
//! |----------------|-----------------------------------------------------------|
//! | `match`        | any query term equals any stored token of the field       |
//! | `match_phrase` | the query terms appear in consecutive token groups        |
//! | `term`         | the whole term equals a stored token                      |
//! | `range`        | an order-preserving or plain integer lies within bounds   |

#![warn(clippy::pedantic, clippy::nursery)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::RangeBounds;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use sifresearch::codec::{GROUP_SEPARATOR, TOKEN_SEPARATOR};
use sifresearch::config::AnalyzerConfig;
use sifresearch::document::{EncryptedDocument, EncryptedValue, Value};
use sifresearch::error::GatewayError;
use sifresearch::gateway::{
    AnalyzedToken, BulkFailure, BulkItem, BulkResponse, Hit, IndexGateway, SearchResponse,
};
use sifresearch::query::Query;
use sifresearch::tokenizer::EdgeNgramTokenizer;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Number of requests served, per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestCounts {
    /// `analyze` calls
    pub analyze: usize,
    /// `index_document` calls
    pub index: usize,
    /// `bulk_index` calls
    pub bulk: usize,
    /// `search` calls
    pub search: usize,
}

#[derive(Default)]
struct Counters {
    analyze: AtomicUsize,
    index: AtomicUsize,
    bulk: AtomicUsize,
    search: AtomicUsize,
}

#[derive(Debug, Clone)]
struct Stored {
    kind: String,
    body: EncryptedDocument,
}

struct MemoryIndex {
    analyzer: EdgeNgramTokenizer,
    visible: BTreeMap<String, Stored>,
    pending: Vec<(String, Stored)>,
}

impl MemoryIndex {
    fn write(&mut self, id: String, kind: String, body: EncryptedDocument) {
        self.pending.push((id, Stored { kind, body }));
    }
}

/// In-memory implementation of [`IndexGateway`].
///
/// # Example
///
/// ```
/// use sifresearch::config::AnalyzerConfig;
/// use sifresearch::gateway::IndexGateway;
/// use sifresearch_index_memory::MemoryGateway;
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let gateway = MemoryGateway::new();
/// gateway.create_index("docs", &AnalyzerConfig::default()).await.unwrap();
///
/// let tokens = gateway.analyze("docs", "encrypted_text", &["hi you"]).await.unwrap();
/// assert_eq!(tokens.len(), 3);
/// # });
/// ```
#[derive(Default)]
pub struct MemoryGateway {
    indices: RwLock<HashMap<String, MemoryIndex>>,
    counters: Counters,
}

impl MemoryGateway {
    /// Creates a gateway with no indexes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests served so far.
    #[must_use]
    pub fn requests(&self) -> RequestCounts {
        RequestCounts {
            analyze: self.counters.analyze.load(Ordering::Relaxed),
            index: self.counters.index.load(Ordering::Relaxed),
            bulk: self.counters.bulk.load(Ordering::Relaxed),
            search: self.counters.search.load(Ordering::Relaxed),
        }
    }

    /// Number of searchable documents in `index`.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::IndexNotFound` if the index does not exist.
    pub async fn document_count(&self, index: &str) -> Result<usize, GatewayError> {
        let indices = self.indices.read().await;
        Ok(lookup(&indices, index)?.visible.len())
    }
}

fn lookup<'a>(
    indices: &'a HashMap<String, MemoryIndex>,
    index: &str,
) -> Result<&'a MemoryIndex, GatewayError> {
    indices.get(index).ok_or_else(|| GatewayError::IndexNotFound(index.to_string()))
}

fn lookup_mut<'a>(
    indices: &'a mut HashMap<String, MemoryIndex>,
    index: &str,
) -> Result<&'a mut MemoryIndex, GatewayError> {
    indices.get_mut(index).ok_or_else(|| GatewayError::IndexNotFound(index.to_string()))
}

fn split_terms(text: &str) -> impl Iterator<Item = &str> {
    text.split([GROUP_SEPARATOR, TOKEN_SEPARATOR]).filter(|term| !term.is_empty())
}

/// Searchable text of a stored value; ordinals have none.
fn stored_text(value: &EncryptedValue) -> Option<&str> {
    match value {
        EncryptedValue::Token(text)
        | EncryptedValue::Tokens(text)
        | EncryptedValue::Plain(Value::Text(text)) => Some(text.as_str()),
        _ => None,
    }
}

fn stored_number(value: &EncryptedValue) -> Option<u64> {
    match value {
        EncryptedValue::Ordinal(n) => Some(*n),
        EncryptedValue::Plain(Value::Integer(n)) => u64::try_from(*n).ok(),
        _ => None,
    }
}

fn phrase_matches(stored: &str, phrase: &str) -> bool {
    let words: Vec<&str> = phrase.split_whitespace().collect();
    if words.is_empty() {
        return false;
    }
    let groups: Vec<HashSet<&str>> = stored
        .split(GROUP_SEPARATOR)
        .filter(|group| !group.is_empty())
        .map(|group| group.split(TOKEN_SEPARATOR).collect())
        .collect();

    groups
        .windows(words.len())
        .any(|window| window.iter().zip(&words).all(|(group, word)| group.contains(word)))
}

fn matches(query: &Query, body: &EncryptedDocument) -> bool {
    match query {
        Query::MatchAll => true,
        Query::Match { field, query } => {
            body.get(field).and_then(stored_text).is_some_and(|stored| {
                let stored: HashSet<&str> = split_terms(stored).collect();
                split_terms(query).any(|term| stored.contains(term))
            })
        }
        Query::MatchPhrase { field, phrase } => body
            .get(field)
            .and_then(stored_text)
            .is_some_and(|stored| phrase_matches(stored, phrase)),
        Query::Term { field, value } => match body.get(field) {
            Some(EncryptedValue::Token(token)) => token == value,
            Some(EncryptedValue::Tokens(tokens)) => split_terms(tokens).any(|token| token == value),
            Some(EncryptedValue::Plain(Value::Text(text))) => text == value,
            _ => false,
        },
        Query::Range { field, lower, upper } => body
            .get(field)
            .and_then(stored_number)
            .is_some_and(|n| (*lower, *upper).contains(&n)),
        Query::Bool { must } => must.iter().all(|clause| matches(clause, body)),
    }
}

#[async_trait]
impl IndexGateway for MemoryGateway {
    async fn create_index(
        &self,
        index: &str,
        analyzer: &AnalyzerConfig,
    ) -> Result<(), GatewayError> {
        let tokenizer = EdgeNgramTokenizer::new(analyzer.clone())
            .map_err(|e| GatewayError::Rejected(format!("analyzer `{}`: {e}", analyzer.name)))?;

        let mut indices = self.indices.write().await;
        if indices.contains_key(index) {
            return Err(GatewayError::IndexExists(index.to_string()));
        }
        indices.insert(
            index.to_string(),
            MemoryIndex { analyzer: tokenizer, visible: BTreeMap::new(), pending: Vec::new() },
        );
        info!(index, analyzer = %analyzer.name, "created index");
        Ok(())
    }

    async fn drop_index(&self, index: &str) -> Result<(), GatewayError> {
        let mut indices = self.indices.write().await;
        indices.remove(index).ok_or_else(|| GatewayError::IndexNotFound(index.to_string()))?;
        info!(index, "dropped index");
        Ok(())
    }

    async fn index_exists(&self, index: &str) -> Result<bool, GatewayError> {
        Ok(self.indices.read().await.contains_key(index))
    }

    async fn analyze(
        &self,
        index: &str,
        analyzer: &str,
        texts: &[&str],
    ) -> Result<Vec<AnalyzedToken>, GatewayError> {
        self.counters.analyze.fetch_add(1, Ordering::Relaxed);
        let indices = self.indices.read().await;
        let tokenizer = &lookup(&indices, index)?.analyzer;
        if tokenizer.config().name != analyzer {
            return Err(GatewayError::AnalyzerNotFound(analyzer.to_string()));
        }

        let tokens = texts
            .iter()
            .enumerate()
            .flat_map(|(segment, text)| {
                tokenizer.analyze(text).into_iter().map(move |(token, start_offset, end_offset)| {
                    AnalyzedToken { token, start_offset, end_offset, segment }
                })
            })
            .collect();
        Ok(tokens)
    }

    async fn index_document(
        &self,
        index: &str,
        id: &str,
        kind: &str,
        body: &EncryptedDocument,
    ) -> Result<(), GatewayError> {
        self.counters.index.fetch_add(1, Ordering::Relaxed);
        if id.is_empty() {
            return Err(GatewayError::Rejected("document id is empty".to_string()));
        }
        let mut indices = self.indices.write().await;
        lookup_mut(&mut indices, index)?.write(id.to_string(), kind.to_string(), body.clone());
        Ok(())
    }

    async fn bulk_index(
        &self,
        index: &str,
        items: Vec<BulkItem>,
    ) -> Result<BulkResponse, GatewayError> {
        self.counters.bulk.fetch_add(1, Ordering::Relaxed);
        let mut indices = self.indices.write().await;
        let target = lookup_mut(&mut indices, index)?;

        let mut response = BulkResponse::default();
        for BulkItem { id, kind, body } in items {
            if id.is_empty() {
                let reason = "document id is empty".to_string();
                response.failures.push(BulkFailure { id, reason });
                continue;
            }
            target.write(id, kind, body);
            response.indexed += 1;
        }
        debug!(index, indexed = response.indexed, failed = response.failures.len(), "bulk request");
        Ok(response)
    }

    async fn search(&self, index: &str, query: &Query) -> Result<SearchResponse, GatewayError> {
        self.counters.search.fetch_add(1, Ordering::Relaxed);
        let indices = self.indices.read().await;
        let hits: Vec<Hit> = lookup(&indices, index)?
            .visible
            .iter()
            .filter(|(_, stored)| matches(query, &stored.body))
            .map(|(id, stored)| Hit {
                id: id.clone(),
                kind: stored.kind.clone(),
                source: stored.body.clone(),
            })
            .collect();
        Ok(SearchResponse { total: hits.len(), hits })
    }

    async fn refresh(&self, index: &str) -> Result<(), GatewayError> {
        let mut indices = self.indices.write().await;
        let target = lookup_mut(&mut indices, index)?;
        let pending = std::mem::take(&mut target.pending);
        let count = pending.len();
        target.visible.extend(pending);
        debug!(index, count, "refreshed");
        Ok(())
    }
}
