//! A searchable encrypted index: encoder, pipeline and gateway wired together.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::bulk::{run_blocking, BulkBatch, BulkPipeline};
use crate::config::AnalyzerConfig;
use crate::document::{DecodedDocument, Document};
use crate::error::Error;
use crate::field::FieldSpecs;
use crate::gateway::{BulkResponse, IndexGateway, SearchResponse};
use crate::query::{Query, QueryEncoder};

/// An encrypted index on an index engine.
///
/// Documents are encrypted before they leave this type; queries are
/// expected to come from [`queries`](Self::queries) so their operands are
/// encrypted with the same key.
pub struct SearchableIndex<G: IndexGateway + ?Sized> {
    gateway: Arc<G>,
    pipeline: BulkPipeline,
    index: String,
    analyzer: AnalyzerConfig,
}

impl<G: IndexGateway + ?Sized> SearchableIndex<G> {
    /// Creates a handle on `index`. Nothing is sent to the engine.
    pub fn new(
        gateway: Arc<G>,
        pipeline: BulkPipeline,
        index: impl Into<String>,
        analyzer: AnalyzerConfig,
    ) -> Self {
        Self { gateway, pipeline, index: index.into(), analyzer }
    }

    /// Index name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.index
    }

    /// Analyzer registered on the index.
    #[must_use]
    pub const fn analyzer(&self) -> &AnalyzerConfig {
        &self.analyzer
    }

    /// The batch pipeline.
    #[must_use]
    pub const fn pipeline(&self) -> &BulkPipeline {
        &self.pipeline
    }

    /// The engine gateway.
    #[must_use]
    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    /// Query builder bound to this index's key and tokenizer.
    #[must_use]
    pub fn queries(&self) -> QueryEncoder {
        let encoder = self.pipeline.encoder();
        QueryEncoder::new(encoder.codec().suite().clone(), encoder.tokenizer().clone())
    }

    /// Creates the index with its analyzer, dropping an existing one first
    /// when `recreate` is set.
    ///
    /// # Errors
    ///
    /// Returns `Error::Gateway` if the engine refuses, including
    /// `IndexExists` when the index exists and `recreate` is false.
    #[instrument(skip(self), fields(index = %self.index))]
    pub async fn create(&self, recreate: bool) -> Result<(), Error> {
        if recreate && self.gateway.index_exists(&self.index).await? {
            self.gateway.drop_index(&self.index).await?;
            info!("dropped existing index");
        }
        self.gateway.create_index(&self.index, &self.analyzer).await?;
        info!(analyzer = %self.analyzer.name, "created index");
        Ok(())
    }

    /// Encrypts and writes one document.
    ///
    /// # Errors
    ///
    /// Returns encoding errors, or `Error::Gateway` if the write fails.
    #[instrument(skip(self, document, specs), fields(index = %self.index))]
    pub async fn index_doc(
        &self,
        id: &str,
        kind: &str,
        document: &Document,
        specs: &FieldSpecs,
    ) -> Result<(), Error> {
        let body = self.pipeline.encoder().encode(document, specs).await?;
        self.gateway.index_document(&self.index, id, kind, &body).await?;
        debug!("indexed document");
        Ok(())
    }

    /// Encrypts a batch and writes it in one request.
    ///
    /// # Errors
    ///
    /// Returns encoding errors, or `Error::Gateway` if the request fails.
    /// Documents the engine refuses individually are listed in the response.
    #[instrument(skip_all, fields(index = %self.index, batch = batch.len()))]
    pub async fn index_bulk(
        &self,
        batch: &BulkBatch,
        specs: &FieldSpecs,
    ) -> Result<BulkResponse, Error> {
        let items = self.pipeline.encode_batch(batch, specs).await?;
        let response = self.gateway.bulk_index(&self.index, items).await?;
        if response.failures.is_empty() {
            debug!(indexed = response.indexed, "indexed batch");
        } else {
            warn!(
                indexed = response.indexed,
                failed = response.failures.len(),
                "engine refused documents"
            );
        }
        Ok(response)
    }

    /// Runs an encrypted query.
    ///
    /// # Errors
    ///
    /// Returns `Error::Gateway` if the engine fails.
    pub async fn search(&self, query: &Query) -> Result<SearchResponse, Error> {
        Ok(self.gateway.search(&self.index, query).await?)
    }

    /// Runs a query and decrypts the hits.
    ///
    /// # Errors
    ///
    /// Returns `Error::Gateway` if the engine fails and decoding errors for
    /// hits that do not decrypt under `specs`.
    pub async fn search_decoded(
        &self,
        query: &Query,
        specs: &FieldSpecs,
    ) -> Result<Vec<(String, DecodedDocument)>, Error> {
        let response = self.search(query).await?;
        let (ids, bodies): (Vec<_>, Vec<_>) =
            response.hits.into_iter().map(|hit| (hit.id, hit.source)).unzip();

        let pipeline = self.pipeline.clone();
        let specs = specs.clone();
        let decoded = run_blocking(move || pipeline.decode_batch(&bodies, &specs)).await?;
        Ok(ids.into_iter().zip(decoded).collect())
    }

    /// Makes all writes so far searchable.
    ///
    /// # Errors
    ///
    /// Returns `Error::Gateway` if the engine fails.
    pub async fn refresh(&self) -> Result<(), Error> {
        Ok(self.gateway.refresh(&self.index).await?)
    }

    /// Drops the index.
    ///
    /// # Errors
    ///
    /// Returns `Error::Gateway` if the engine fails.
    #[instrument(skip(self), fields(index = %self.index))]
    pub async fn drop_index(&self) -> Result<(), Error> {
        self.gateway.drop_index(&self.index).await?;
        info!("dropped index");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::BulkEntry;
    use crate::cipher_suite::CipherSuite;
    use crate::config::SuiteConfig;
    use crate::document::EncryptedDocument;
    use crate::encoder::DocumentEncoder;
    use crate::error::GatewayError;
    use crate::gateway::{AnalyzedToken, BulkItem, Hit};
    use crate::tokenizer::EdgeNgramTokenizer;
    use async_trait::async_trait;
    use secrecy::SecretVec;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingGateway {
        calls: Mutex<Vec<String>>,
        exists: Mutex<bool>,
        stored: Mutex<Vec<(String, EncryptedDocument)>>,
    }

    impl RecordingGateway {
        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl IndexGateway for RecordingGateway {
        async fn create_index(
            &self,
            index: &str,
            _analyzer: &AnalyzerConfig,
        ) -> Result<(), GatewayError> {
            self.record(format!("create {index}"));
            let mut exists = self.exists.lock().unwrap();
            if *exists {
                return Err(GatewayError::IndexExists(index.to_string()));
            }
            *exists = true;
            Ok(())
        }

        async fn drop_index(&self, index: &str) -> Result<(), GatewayError> {
            self.record(format!("drop {index}"));
            *self.exists.lock().unwrap() = false;
            Ok(())
        }

        async fn index_exists(&self, _index: &str) -> Result<bool, GatewayError> {
            Ok(*self.exists.lock().unwrap())
        }

        async fn analyze(
            &self,
            _: &str,
            _: &str,
            _: &[&str],
        ) -> Result<Vec<AnalyzedToken>, GatewayError> {
            Ok(Vec::new())
        }

        async fn index_document(
            &self,
            _index: &str,
            id: &str,
            _kind: &str,
            body: &EncryptedDocument,
        ) -> Result<(), GatewayError> {
            self.record(format!("index {id}"));
            self.stored.lock().unwrap().push((id.to_string(), body.clone()));
            Ok(())
        }

        async fn bulk_index(
            &self,
            _index: &str,
            items: Vec<BulkItem>,
        ) -> Result<BulkResponse, GatewayError> {
            self.record(format!("bulk {}", items.len()));
            let indexed = items.len();
            self.stored.lock().unwrap().extend(items.into_iter().map(|item| (item.id, item.body)));
            Ok(BulkResponse { indexed, failures: Vec::new() })
        }

        async fn search(
            &self,
            _index: &str,
            _query: &Query,
        ) -> Result<SearchResponse, GatewayError> {
            let hits: Vec<Hit> = self
                .stored
                .lock()
                .unwrap()
                .iter()
                .map(|(id, body)| Hit {
                    id: id.clone(),
                    kind: "doc".to_string(),
                    source: body.clone(),
                })
                .collect();
            Ok(SearchResponse { total: hits.len(), hits })
        }

        async fn refresh(&self, index: &str) -> Result<(), GatewayError> {
            Err(GatewayError::Unavailable(format!("{index} is offline")))
        }
    }

    fn create_test_index(gateway: Arc<RecordingGateway>) -> SearchableIndex<RecordingGateway> {
        let key = SecretVec::new(b"key goes here!!!".to_vec());
        let suite = CipherSuite::new(key, SuiteConfig::default()).unwrap();
        let tokenizer = Arc::new(EdgeNgramTokenizer::new(AnalyzerConfig::default()).unwrap());
        let pipeline = BulkPipeline::new(DocumentEncoder::new(suite, tokenizer));
        SearchableIndex::new(gateway, pipeline, "test", AnalyzerConfig::default())
    }

    fn specs() -> FieldSpecs {
        FieldSpecs::builder().full_text(["text"]).integer(["value"]).build().unwrap()
    }

    #[tokio::test]
    async fn test_create_and_recreate() {
        let gateway = Arc::new(RecordingGateway::default());
        let index = create_test_index(gateway.clone());

        index.create(false).await.unwrap();
        let err = index.create(false).await.unwrap_err();
        assert!(matches!(err, Error::Gateway(GatewayError::IndexExists(_))));

        index.create(true).await.unwrap();
        assert_eq!(gateway.calls(), vec!["create test", "create test", "drop test", "create test"]);
    }

    #[tokio::test]
    async fn test_bulk_is_one_request() {
        let gateway = Arc::new(RecordingGateway::default());
        let index = create_test_index(gateway.clone());

        let batch: BulkBatch = (0..50)
            .map(|i| BulkEntry::new(format!("{i}"), "doc", Document::new().with("value", i)))
            .collect();
        let response = index.index_bulk(&batch, &specs()).await.unwrap();

        assert_eq!(response.indexed, 50);
        assert_eq!(gateway.calls(), vec!["bulk 50"]);
    }

    #[tokio::test]
    async fn test_search_decoded() {
        let gateway = Arc::new(RecordingGateway::default());
        let index = create_test_index(gateway);
        let doc = Document::new().with("text", "hello world").with("value", 42);

        index.index_doc("a", "doc", &doc, &specs()).await.unwrap();
        let query = index.queries().match_token("text", "hel").await.unwrap();
        let hits = index.search_decoded(&query, &specs()).await.unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "a");
        assert_eq!(hits[0].1.value("value"), doc.get("value"));
        assert_eq!(hits[0].1.value("text_raw"), doc.get("text"));
    }

    #[tokio::test]
    async fn test_encoding_error_skips_gateway() {
        let gateway = Arc::new(RecordingGateway::default());
        let index = create_test_index(gateway.clone());

        let doc = Document::new().with("unknown", 1);
        let result = index.index_doc("a", "doc", &doc, &specs()).await;
        assert!(matches!(result, Err(Error::UnknownField(_))));
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_gateway_error_surfaces_unchanged() {
        let index = create_test_index(Arc::new(RecordingGateway::default()));
        let err = index.refresh().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Gateway(GatewayError::Unavailable(ref m)) if m == "test is offline"
        ));
    }
}
