//! `SifreSearch` CLI tool for encryption helpers and indexing benchmarks.

#![warn(clippy::pedantic, clippy::nursery)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveTime};
use clap::{Parser, Subcommand};
use secrecy::SecretVec;
use sifresearch::prelude::*;
use sifresearch_index_memory::MemoryGateway;
use tracing::info;
use tracing_subscriber::EnvFilter;

const BENCH_TEXT: &str = "Lorem Ipsum is simply dummy text of the printing and typesetting \
    industry. Lorem Ipsum has been the industry's standard dummy text ever since the 1500s, \
    when an unknown printer took a galley of type and scrambled it to make a type specimen \
    book. It has survived not only five centuries, but also the leap into electronic \
    typesetting, remaining essentially unchanged.";

#[derive(Parser)]
#[command(name = "sifresearch")]
#[command(about = "SifreSearch searchable encryption CLI", long_about = None)]
struct Cli {
    /// Encryption key
    #[arg(long, conflicts_with = "key_file", global = true)]
    key: Option<String>,
    /// File holding the encryption key
    #[arg(long, global = true)]
    key_file: Option<PathBuf>,
    /// Lowest integer to support
    #[arg(long, default_value_t = 0, global = true)]
    int_min: i64,
    /// Highest integer to support
    #[arg(long, default_value_t = 1_000_000, global = true)]
    int_max: i64,
    /// Analyzer definition (JSON)
    #[arg(long, global = true)]
    analyzer: Option<PathBuf>,
    /// Log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a value as a deterministic token
    EncryptToken {
        /// Plaintext
        text: String,
    },
    /// Decrypt a deterministic token
    DecryptToken {
        /// Base64 ciphertext
        ciphertext: String,
    },
    /// Encrypt a phrase word by word
    EncryptPhrase {
        /// Plaintext phrase
        phrase: String,
    },
    /// Encrypt an integer, preserving order
    EncryptInt {
        /// Integer plaintext
        #[arg(allow_negative_numbers = true)]
        value: i64,
    },
    /// Decrypt an order-preserving ciphertext
    DecryptInt {
        /// Ciphertext
        ciphertext: u64,
    },
    /// Encrypt a date (YYYY-MM-DD), preserving order
    EncryptDate {
        /// Date plaintext
        date: NaiveDate,
    },
    /// Encrypt a time of day (HH:MM:SS), preserving order
    EncryptTime {
        /// Time plaintext
        time: NaiveTime,
    },
    /// Show how the analyzer cuts text into token groups
    Tokenize {
        /// Text to analyze
        text: String,
    },
    /// Print the index settings declaring the analyzer
    Settings,
    /// Compare plaintext and encrypted indexing throughput, single and bulk
    Bench {
        /// Number of documents per run
        #[arg(long, default_value_t = 1000)]
        docs: usize,
        /// Documents per bulk request
        #[arg(long, default_value_t = 50)]
        batch_size: usize,
    },
}

fn init_logging(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let directives = format!("warn,sifresearch={level},sifresearch_index_memory={level}");
    let filter = EnvFilter::try_new(directives).context("Invalid log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
    Ok(())
}

fn load_key(cli: &Cli) -> Result<SecretVec<u8>> {
    let bytes = match (&cli.key, &cli.key_file) {
        (Some(key), _) => key.clone().into_bytes(),
        (None, Some(path)) => {
            fs::read(path).with_context(|| format!("Failed to read key file {}", path.display()))?
        }
        (None, None) => bail!("No key given; pass --key or --key-file"),
    };
    Ok(SecretVec::new(bytes))
}

fn load_analyzer(path: Option<&Path>) -> Result<AnalyzerConfig> {
    let Some(path) = path else {
        return Ok(AnalyzerConfig::default());
    };
    let raw =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid analyzer definition in {}", path.display()))
}

fn suite(cli: &Cli) -> Result<CipherSuite> {
    let config = SuiteConfig::new(cli.int_min, cli.int_max);
    Ok(CipherSuite::new(load_key(cli)?, config)?)
}

fn bench_document() -> Result<Document> {
    let date = NaiveDate::from_ymd_opt(2010, 1, 1).context("Invalid benchmark date")?;
    let time = NaiveTime::from_hms_opt(11, 12, 13).context("Invalid benchmark time")?;
    Ok(Document::new()
        .with("author", "Kim Chong Un")
        .with("text", BENCH_TEXT)
        .with("date", date)
        .with("time", time)
        .with("value", 1234))
}

fn bench_specs() -> Result<FieldSpecs> {
    Ok(FieldSpecs::builder()
        .raw(["author"])
        .full_text(["text"])
        .date(["date"])
        .time(["time"])
        .integer(["value"])
        .build()?)
}

/// The document as the engine would store it without encryption.
fn plain_body(document: &Document) -> EncryptedDocument {
    let mut body = EncryptedDocument::new();
    for (name, value) in document.iter() {
        body.insert(name, EncryptedValue::Plain(value.clone()));
    }
    body
}

#[allow(clippy::cast_precision_loss)]
fn report(label: &str, docs: usize, elapsed: Duration) -> Duration {
    let rate = docs as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
    println!(
        "{label:<16} {docs:>6} docs in {:>9.3} s  ({rate:>10.1} docs/s)",
        elapsed.as_secs_f64()
    );
    elapsed
}

fn overhead(label: &str, encrypted: Duration, plain: Duration) {
    let ratio = encrypted.as_secs_f64() / plain.as_secs_f64().max(f64::EPSILON);
    println!("{label:<16} encryption overhead x{ratio:.1}");
}

async fn bench(
    suite: CipherSuite,
    analyzer: AnalyzerConfig,
    docs: usize,
    batch_size: usize,
) -> Result<()> {
    if batch_size == 0 {
        bail!("Batch size must be positive");
    }
    let specs = bench_specs()?;
    let document = bench_document()?;
    let body = plain_body(&document);
    let gateway = Arc::new(MemoryGateway::new());
    let tokenizer = Arc::new(EdgeNgramTokenizer::new(analyzer.clone())?);
    let pipeline = BulkPipeline::new(DocumentEncoder::new(suite, tokenizer));
    let chunks: Vec<(usize, usize)> =
        (0..docs).step_by(batch_size).map(|start| (start, docs.min(start + batch_size))).collect();

    gateway.create_index("plain", &analyzer).await?;
    let started = Instant::now();
    for id in 0..docs {
        gateway.index_document("plain", &id.to_string(), "plain", &body).await?;
    }
    gateway.refresh("plain").await?;
    let plain_single = report("plain single", docs, started.elapsed());

    let single =
        SearchableIndex::new(gateway.clone(), pipeline.clone(), "encrypted", analyzer.clone());
    single.create(true).await?;
    let started = Instant::now();
    for id in 0..docs {
        single.index_doc(&id.to_string(), "encrypted", &document, &specs).await?;
    }
    single.refresh().await?;
    let encrypted_single = report("encrypted single", docs, started.elapsed());

    gateway.create_index("plain_bulk", &analyzer).await?;
    let started = Instant::now();
    for &(start, end) in &chunks {
        let items = (start..end)
            .map(|id| BulkItem {
                id: id.to_string(),
                kind: "plain_bulk".to_string(),
                body: body.clone(),
            })
            .collect();
        gateway.bulk_index("plain_bulk", items).await?;
    }
    gateway.refresh("plain_bulk").await?;
    let plain_bulk = report("plain bulk", docs, started.elapsed());

    let bulk = SearchableIndex::new(gateway.clone(), pipeline, "encrypted_bulk", analyzer);
    bulk.create(true).await?;
    let started = Instant::now();
    let mut failed = 0;
    for &(start, end) in &chunks {
        let batch: BulkBatch = (start..end)
            .map(|id| BulkEntry::new(id.to_string(), "encrypted_bulk", document.clone()))
            .collect();
        failed += bulk.index_bulk(&batch, &specs).await?.failures.len();
    }
    bulk.refresh().await?;
    let encrypted_bulk = report("encrypted bulk", docs, started.elapsed());

    overhead("single", encrypted_single, plain_single);
    overhead("bulk", encrypted_bulk, plain_bulk);

    for index in ["plain_bulk", bulk.name()] {
        let stored = gateway.document_count(index).await?;
        if stored != docs {
            bail!("Index {index} holds {stored} documents, expected {docs}");
        }
    }
    info!(failed, requests = ?gateway.requests(), "benchmark finished");
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;
    let analyzer = load_analyzer(cli.analyzer.as_deref())?;

    match &cli.command {
        Commands::EncryptToken { text } => println!("{}", suite(&cli)?.encrypt_str(text)?),
        Commands::DecryptToken { ciphertext } => {
            println!("{}", suite(&cli)?.decrypt_str(ciphertext)?);
        }
        Commands::EncryptPhrase { phrase } => {
            let tokenizer = Arc::new(EdgeNgramTokenizer::new(analyzer)?);
            let encoder = QueryEncoder::new(suite(&cli)?, tokenizer);
            println!("{}", encoder.encrypt_phrase(phrase).await?);
        }
        Commands::EncryptInt { value } => println!("{}", suite(&cli)?.encrypt_int(*value)?),
        Commands::DecryptInt { ciphertext } => {
            println!("{}", suite(&cli)?.decrypt_int(*ciphertext)?);
        }
        Commands::EncryptDate { date } => println!("{}", suite(&cli)?.encrypt_date(*date)?),
        Commands::EncryptTime { time } => println!("{}", suite(&cli)?.encrypt_time(*time)?),
        Commands::Tokenize { text } => {
            let tokenizer = EdgeNgramTokenizer::new(analyzer)?;
            for group in tokenizer.tokenize_local(text) {
                let tokens = group.tokens.join(" ");
                println!("{:>4} @{:<4} {tokens}", group.index, group.start_offset);
            }
        }
        Commands::Settings => {
            println!("{}", serde_json::to_string_pretty(&analyzer.index_settings())?);
        }
        Commands::Bench { docs, batch_size } => {
            bench(suite(&cli)?, analyzer, *docs, *batch_size).await?;
        }
    }
    Ok(())
}
