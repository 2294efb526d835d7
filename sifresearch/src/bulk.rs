//! Batch encoding for bulk indexing.
//!
//! A batch is transposed into columns. Scalar columns are encrypted in
//! parallel with rayon; all full-text columns go to the tokenizer in a single
//! `tokenize_segments` call, with segment `column * batch_len + row`. Rows
//! are then recomposed by index, so output `i` always belongs to input `i`.
//! Encryption runs on tokio's blocking pool so async workers stay free.

use std::collections::BTreeSet;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, instrument, warn};

use crate::document::{DecodedDocument, Document, EncryptedDocument, EncryptedValue, Value};
use crate::encoder::DocumentEncoder;
use crate::error::Error;
use crate::field::{raw_companion, FieldKind, FieldSpecs};
use crate::gateway::BulkItem;
use crate::tokenizer::{SegmentGroup, TokenGroup};

/// One document of a batch, with its index identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkEntry {
    /// Document identifier
    pub id: String,
    /// Caller-defined kind tag
    pub kind: String,
    /// Plaintext document
    pub document: Document,
}

impl BulkEntry {
    /// Creates an entry.
    pub fn new(id: impl Into<String>, kind: impl Into<String>, document: Document) -> Self {
        Self { id: id.into(), kind: kind.into(), document }
    }
}

/// An ordered batch of documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkBatch {
    entries: Vec<BulkEntry>,
}

impl BulkBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a document.
    pub fn push(&mut self, id: impl Into<String>, kind: impl Into<String>, document: Document) {
        self.entries.push(BulkEntry::new(id, kind, document));
    }

    /// Entries in submission order.
    #[must_use]
    pub fn entries(&self) -> &[BulkEntry] {
        &self.entries
    }

    /// Number of documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the batch holds no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<BulkEntry> for BulkBatch {
    fn from_iter<T: IntoIterator<Item = BulkEntry>>(iter: T) -> Self {
        Self { entries: iter.into_iter().collect() }
    }
}

/// Encoded cells of one column, index-aligned with the batch.
struct Column {
    name: String,
    cells: Vec<Option<EncryptedValue>>,
    companions: Option<Vec<Option<EncryptedValue>>>,
}

/// Owned copy of a batch for the blocking encode stages.
struct Job {
    batch: BulkBatch,
    specs: FieldSpecs,
}

/// Batch encoder built on a [`DocumentEncoder`].
#[derive(Debug, Clone)]
pub struct BulkPipeline {
    encoder: DocumentEncoder,
}

impl BulkPipeline {
    /// Creates a pipeline.
    #[must_use]
    pub const fn new(encoder: DocumentEncoder) -> Self {
        Self { encoder }
    }

    /// The per-document encoder.
    #[must_use]
    pub const fn encoder(&self) -> &DocumentEncoder {
        &self.encoder
    }

    /// Encrypts a batch.
    ///
    /// Item `i` of the result is the encoding of entry `i`, identical to what
    /// [`DocumentEncoder::encode`] yields for that document alone.
    ///
    /// # Errors
    ///
    /// Any invalid document fails the whole batch with the error
    /// [`DocumentEncoder::encode`] would report. Tokenizer output that cannot
    /// be mapped back onto the batch is `Error::Alignment`.
    #[instrument(skip_all, fields(batch = batch.len()))]
    pub async fn encode_batch(
        &self,
        batch: &BulkBatch,
        specs: &FieldSpecs,
    ) -> Result<Vec<BulkItem>, Error> {
        for entry in batch.entries() {
            self.encoder.validate(&entry.document, specs)?;
        }
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let rows = batch.len();
        let job = Arc::new(Job { batch: batch.clone(), specs: specs.clone() });

        let pipeline = self.clone();
        let scalar_job = Arc::clone(&job);
        let mut columns = run_blocking(move || {
            pipeline.encode_scalar_columns(&scalar_job.batch, &scalar_job.specs)
        })
        .await?;

        let undeclared: BTreeSet<&str> = batch
            .entries()
            .iter()
            .flat_map(|entry| entry.document.iter().map(|(name, _)| name))
            .filter(|name| !specs.contains(name))
            .collect();
        for name in undeclared {
            warn!(field = name, "storing undeclared field unencrypted");
            let cells = column(batch, name)
                .into_iter()
                .map(|v| v.cloned().map(EncryptedValue::Plain))
                .collect();
            columns.push(Column { name: name.to_string(), cells, companions: None });
        }

        let texts: Vec<&str> = full_text_fields(specs)
            .flat_map(|name| {
                column(batch, name)
                    .into_iter()
                    .map(|v| v.and_then(Value::as_text).unwrap_or_default())
            })
            .collect();
        if !texts.is_empty() {
            let segments = self.encoder.tokenizer().tokenize_segments(&texts).await?;
            let buckets = bucket_segments(segments, texts.len())?;
            let pipeline = self.clone();
            let full_text = run_blocking(move || {
                pipeline.encode_full_text_columns(&job.batch, &job.specs, &buckets)
            })
            .await?;
            columns.extend(full_text);
        }

        let mut bodies = vec![EncryptedDocument::new(); rows];
        for column in columns {
            for (body, value) in bodies.iter_mut().zip(column.cells) {
                if let Some(value) = value {
                    body.insert(column.name.as_str(), value);
                }
            }
            if let Some(companions) = column.companions {
                let companion = raw_companion(&column.name);
                for (body, value) in bodies.iter_mut().zip(companions) {
                    if let Some(value) = value {
                        body.insert(companion.as_str(), value);
                    }
                }
            }
        }

        debug!(rows, "encoded batch");
        Ok(batch
            .entries()
            .iter()
            .zip(bodies)
            .map(|(entry, body)| BulkItem { id: entry.id.clone(), kind: entry.kind.clone(), body })
            .collect())
    }

    /// Decrypts many documents in parallel, preserving order.
    ///
    /// # Errors
    ///
    /// Returns the first error [`DocumentEncoder::decode`] reports.
    pub fn decode_batch(
        &self,
        documents: &[EncryptedDocument],
        specs: &FieldSpecs,
    ) -> Result<Vec<DecodedDocument>, Error> {
        documents.par_iter().map(|document| self.encoder.decode(document, specs)).collect()
    }

    fn encode_scalar_columns(
        &self,
        batch: &BulkBatch,
        specs: &FieldSpecs,
    ) -> Result<Vec<Column>, Error> {
        specs
            .iter()
            .filter(|(_, kind)| *kind != FieldKind::FullText)
            .map(|(name, kind)| self.encode_scalar_column(name, kind, &column(batch, name)))
            .collect()
    }

    fn encode_scalar_column(
        &self,
        name: &str,
        kind: FieldKind,
        cells: &[Option<&Value>],
    ) -> Result<Column, Error> {
        let codec = self.encoder.codec();
        let cells = cells
            .par_iter()
            .map(|value| value.map(|value| codec.encode_scalar(name, kind, value)).transpose())
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(Column { name: name.to_string(), cells, companions: None })
    }

    /// `buckets` holds one group list per segment, `column * rows + row`.
    fn encode_full_text_columns(
        &self,
        batch: &BulkBatch,
        specs: &FieldSpecs,
        buckets: &[Vec<TokenGroup>],
    ) -> Result<Vec<Column>, Error> {
        let rows = batch.len();
        full_text_fields(specs)
            .enumerate()
            .map(|(c, name)| {
                let groups = buckets.get(c * rows..(c + 1) * rows).ok_or_else(|| {
                    Error::Alignment(format!("no token groups for column `{name}`"))
                })?;
                self.encode_full_text_column(name, &column(batch, name), groups)
            })
            .collect()
    }

    fn encode_full_text_column(
        &self,
        name: &str,
        cells: &[Option<&Value>],
        groups: &[Vec<TokenGroup>],
    ) -> Result<Column, Error> {
        let codec = self.encoder.codec();
        let encoded = cells
            .par_iter()
            .zip(groups.par_iter())
            .map(|(value, groups)| {
                value
                    .map(|value| codec.encode_full_text(name, value, groups))
                    .transpose()
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let (cells, companions) = encoded.into_iter().map(Option::unzip).unzip();
        Ok(Column { name: name.to_string(), cells, companions: Some(companions) })
    }
}

/// Runs CPU-bound work on the blocking pool, off the async worker threads.
pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T, Error>
where
    F: FnOnce() -> Result<T, Error> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::Task(format!("encoding task failed: {e}")))?
}

/// Full-text field names, in the order their columns are laid out.
fn full_text_fields(specs: &FieldSpecs) -> impl Iterator<Item = &str> {
    specs
        .iter()
        .filter(|(_, kind)| *kind == FieldKind::FullText)
        .map(|(name, _)| name)
}

/// Values of `name` across the batch, one per row.
fn column<'a>(batch: &'a BulkBatch, name: &str) -> Vec<Option<&'a Value>> {
    batch.entries().iter().map(|entry| entry.document.get(name)).collect()
}

/// Splits segment-tagged groups into one bucket per segment.
fn bucket_segments(
    segments: Vec<SegmentGroup>,
    count: usize,
) -> Result<Vec<Vec<TokenGroup>>, Error> {
    let mut buckets: Vec<Vec<TokenGroup>> = vec![Vec::new(); count];
    let mut last = 0;

    for SegmentGroup { segment, group } in segments {
        if segment >= count {
            return Err(Error::Alignment(format!(
                "segment {segment} out of range for {count} texts"
            )));
        }
        if segment < last {
            return Err(Error::Alignment(format!("segment {segment} arrived after segment {last}")));
        }
        let bucket = &mut buckets[segment];
        if group.index != bucket.len() {
            return Err(Error::Alignment(format!(
                "segment {segment}: group {} arrived at position {}",
                group.index,
                bucket.len()
            )));
        }
        bucket.push(group);
        last = segment;
    }
    Ok(buckets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher_suite::CipherSuite;
    use crate::config::{AnalyzerConfig, EncoderOptions, SuiteConfig};
    use crate::tokenizer::{EdgeNgramTokenizer, Tokenizer};
    use async_trait::async_trait;
    use chrono::{Duration, NaiveDate, NaiveTime};
    use secrecy::SecretVec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn suite() -> CipherSuite {
        let key = SecretVec::new(b"key goes here!!!".to_vec());
        CipherSuite::new(key, SuiteConfig::default()).unwrap()
    }

    fn local_tokenizer() -> EdgeNgramTokenizer {
        EdgeNgramTokenizer::new(AnalyzerConfig::default()).unwrap()
    }

    fn create_test_pipeline() -> BulkPipeline {
        BulkPipeline::new(DocumentEncoder::new(suite(), Arc::new(local_tokenizer())))
    }

    fn specs() -> FieldSpecs {
        FieldSpecs::builder()
            .raw(["author"])
            .full_text(["text", "title"])
            .date(["date"])
            .time(["time"])
            .integer(["value"])
            .build()
            .unwrap()
    }

    fn document(i: i64) -> Document {
        let day = NaiveDate::from_ymd_opt(2010, 1, 1).unwrap() + Duration::days(i);
        let seconds = u32::try_from(i).unwrap() * 61;
        Document::new()
            .with("author", format!("author {}", i % 7))
            .with("text", format!("The quick brown fox number {i} jumps"))
            .with("title", format!("Title {i}"))
            .with("date", day)
            .with("time", NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0).unwrap())
            .with("value", i * 3)
    }

    fn batch(n: i64) -> BulkBatch {
        (0..n).map(|i| BulkEntry::new(format!("doc-{i}"), "document", document(i))).collect()
    }

    #[tokio::test]
    async fn test_batch_matches_single_encoding() {
        let pipeline = create_test_pipeline();
        let batch = batch(1000);

        let items = pipeline.encode_batch(&batch, &specs()).await.unwrap();
        assert_eq!(items.len(), 1000);

        for (entry, item) in batch.entries().iter().zip(&items) {
            assert_eq!(item.id, entry.id);
            assert_eq!(item.kind, "document");
            let single = pipeline.encoder().encode(&entry.document, &specs()).await.unwrap();
            assert_eq!(item.body, single, "document {}", entry.id);
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_encoding_leaves_runtime_free() {
        let pipeline = create_test_pipeline();
        let batch = batch(200);
        let ticks = Arc::new(AtomicUsize::new(0));
        let ticker = {
            let ticks = Arc::clone(&ticks);
            tokio::spawn(async move {
                loop {
                    ticks.fetch_add(1, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                }
            })
        };

        let items = pipeline.encode_batch(&batch, &specs()).await.unwrap();
        ticker.abort();

        assert_eq!(items.len(), 200);
        assert!(ticks.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn test_batch_decodes_back_to_rows() {
        let pipeline = create_test_pipeline();
        let batch = batch(50);

        let items = pipeline.encode_batch(&batch, &specs()).await.unwrap();
        let bodies: Vec<EncryptedDocument> = items.into_iter().map(|item| item.body).collect();
        let decoded = pipeline.decode_batch(&bodies, &specs()).unwrap();

        for (entry, decoded) in batch.entries().iter().zip(&decoded) {
            assert_eq!(decoded.value("value"), entry.document.get("value"));
            assert_eq!(decoded.value("text_raw"), entry.document.get("text"));
            assert_eq!(decoded.value("title_raw"), entry.document.get("title"));
        }
    }

    #[tokio::test]
    async fn test_missing_fields_keep_rows_aligned() {
        let pipeline = create_test_pipeline();
        let batch: BulkBatch = vec![
            BulkEntry::new(
                "a",
                "document",
                Document::new().with("text", "alpha beta").with("value", 1),
            ),
            BulkEntry::new("b", "document", Document::new().with("value", 2)),
            BulkEntry::new("c", "document", Document::new().with("text", "gamma")),
        ]
        .into_iter()
        .collect();

        let items = pipeline.encode_batch(&batch, &specs()).await.unwrap();
        for (entry, item) in batch.entries().iter().zip(&items) {
            let single = pipeline.encoder().encode(&entry.document, &specs()).await.unwrap();
            assert_eq!(item.body, single);
        }
        assert!(items[1].body.get("text").is_none());
        assert!(items[1].body.get("text_raw").is_none());
        assert!(items[2].body.get("value").is_none());
    }

    #[tokio::test]
    async fn test_invalid_document_fails_batch() {
        let pipeline = create_test_pipeline();
        let mut batch = batch(3);
        batch.push("bad", "document", Document::new().with("value", "not a number"));

        let result = pipeline.encode_batch(&batch, &specs()).await;
        assert!(matches!(result, Err(Error::TypeMismatch { .. })));
    }

    #[tokio::test]
    async fn test_undeclared_column_passthrough() {
        let encoder = DocumentEncoder::new(suite(), Arc::new(local_tokenizer()))
            .with_options(EncoderOptions { allow_unencrypted: true });
        let pipeline = BulkPipeline::new(encoder);
        let mut batch = batch(2);
        batch.push("extra", "document", Document::new().with("note", "public"));

        let items = pipeline.encode_batch(&batch, &specs()).await.unwrap();
        assert_eq!(items[2].body.get("note"), Some(&EncryptedValue::Plain(Value::from("public"))));
        assert!(items[0].body.get("note").is_none());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let items = create_test_pipeline().encode_batch(&BulkBatch::new(), &specs()).await.unwrap();
        assert!(items.is_empty());
    }

    struct CountingTokenizer {
        inner: EdgeNgramTokenizer,
        segment_calls: AtomicUsize,
    }

    #[async_trait]
    impl Tokenizer for CountingTokenizer {
        async fn tokenize(&self, text: &str) -> Result<Vec<TokenGroup>, Error> {
            self.inner.tokenize(text).await
        }

        async fn tokenize_segments(&self, texts: &[&str]) -> Result<Vec<SegmentGroup>, Error> {
            self.segment_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.tokenize_segments(texts).await
        }
    }

    #[tokio::test]
    async fn test_one_tokenizer_call_per_batch() {
        let tokenizer = Arc::new(CountingTokenizer {
            inner: local_tokenizer(),
            segment_calls: AtomicUsize::new(0),
        });
        let pipeline = BulkPipeline::new(DocumentEncoder::new(suite(), tokenizer.clone()));

        pipeline.encode_batch(&batch(50), &specs()).await.unwrap();
        assert_eq!(tokenizer.segment_calls.load(Ordering::SeqCst), 1);
    }

    struct MisalignedTokenizer;

    #[async_trait]
    impl Tokenizer for MisalignedTokenizer {
        async fn tokenize(&self, _text: &str) -> Result<Vec<TokenGroup>, Error> {
            Ok(Vec::new())
        }

        async fn tokenize_segments(&self, texts: &[&str]) -> Result<Vec<SegmentGroup>, Error> {
            let group = TokenGroup { index: 0, start_offset: 0, tokens: vec!["ab".to_string()] };
            Ok(vec![SegmentGroup { segment: texts.len(), group }])
        }
    }

    #[tokio::test]
    async fn test_misaligned_tokenizer_output() {
        let encoder = DocumentEncoder::new(suite(), Arc::new(MisalignedTokenizer));
        let pipeline = BulkPipeline::new(encoder);
        let result = pipeline.encode_batch(&batch(4), &specs()).await;
        assert!(matches!(result, Err(Error::Alignment(_))));
    }

    #[test]
    fn test_bucket_segments_rules() {
        let group = |index| TokenGroup { index, start_offset: 0, tokens: vec!["ab".to_string()] };
        let tagged = |segment, index| SegmentGroup { segment, group: group(index) };

        let buckets = bucket_segments(vec![tagged(0, 0), tagged(0, 1), tagged(2, 0)], 3).unwrap();
        assert_eq!(buckets.iter().map(Vec::len).collect::<Vec<_>>(), vec![2, 0, 1]);

        let unordered = bucket_segments(vec![tagged(1, 0), tagged(0, 0)], 2);
        assert!(matches!(unordered, Err(Error::Alignment(_))));
        assert!(matches!(bucket_segments(vec![tagged(0, 1)], 1), Err(Error::Alignment(_))));
        assert!(matches!(bucket_segments(vec![tagged(5, 0)], 2), Err(Error::Alignment(_))));
    }
}
