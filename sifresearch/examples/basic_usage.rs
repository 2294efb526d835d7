//! Basic usage example for `SifreSearch`: encrypt, index and search documents.

use std::ops::Bound;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use secrecy::SecretVec;
use sifresearch::prelude::*;
use sifresearch_index_memory::MemoryGateway;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("SifreSearch Basic Usage Example");
    println!("===============================\n");

    let key = SecretVec::new(b"key goes here!!!".to_vec());
    let suite = CipherSuite::new(key, SuiteConfig::default())?;
    let analyzer = AnalyzerConfig::default();
    let tokenizer = Arc::new(EdgeNgramTokenizer::new(analyzer.clone())?);
    let pipeline = BulkPipeline::new(DocumentEncoder::new(suite, tokenizer));
    println!("✓ Cipher suite and encoder created\n");

    let gateway = Arc::new(MemoryGateway::new());
    let index = SearchableIndex::new(gateway, pipeline, "library", analyzer);
    index.create(true).await?;
    println!("✓ Index `{}` created\n", index.name());

    let specs = FieldSpecs::builder()
        .raw(["author"])
        .full_text(["text"])
        .date(["date"])
        .time(["time"])
        .integer(["value"])
        .build()?;

    let doc = Document::new()
        .with("author", "Kim Chong Un")
        .with("text", "The quick brown fox jumps over the lazy dog!")
        .with("date", NaiveDate::from_ymd_opt(2010, 1, 1).ok_or("bad date")?)
        .with("time", NaiveTime::from_hms_opt(11, 12, 13).ok_or("bad time")?)
        .with("value", 1234);

    let encrypted = index.pipeline().encoder().encode(&doc, &specs).await?;
    println!("Encrypted body as the engine sees it:");
    println!("{}\n", serde_json::to_string_pretty(&encrypted.to_json())?);

    index.index_doc("1", "book", &doc, &specs).await?;
    index.refresh().await?;

    let q = index.queries();
    let searches = [
        ("author = \"Kim\"", q.term("author", "Kim")?),
        ("author = \"Kim Chong Un\"", q.term("author", "Kim Chong Un")?),
        ("text ~ \"qui\"", q.match_token("text", "qui").await?),
        ("text ~ \"foxie\"", q.match_token("text", "foxie").await?),
        ("text phrase \"brown fox\"", q.match_phrase("text", "brown fox").await?),
        ("text phrase \"The dog\"", q.match_phrase("text", "The dog").await?),
        (
            "1233 < value < 1235",
            q.range_int("value", Bound::Excluded(1233), Bound::Excluded(1235))?,
        ),
    ];

    for (label, query) in &searches {
        let hits = index.search(query).await?;
        println!("{label:<28} → {} hit(s)", hits.total);
    }

    let decoded = index.search_decoded(&Query::MatchAll, &specs).await?;
    for (id, doc) in &decoded {
        println!("\nDocument {id}: author = {:?}", doc.value("author"));
    }

    Ok(())
}
