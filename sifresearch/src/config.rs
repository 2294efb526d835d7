//! Configuration for the cipher suite, the text analyzer and the encoders.
//!
//! All configuration is plain data supplied programmatically; nothing is
//! read from files or the environment by this crate.

use serde::{Deserialize, Serialize};
use serde_json::json;
use unicode_general_category::{get_general_category, GeneralCategory};

/// Smallest upper bound the order-preserving domain is ever given.
///
/// Day ordinals of realistic dates (~740 000) and seconds of the day
/// (< 86 400) both fit below it.
pub const MIN_INT_DOMAIN_MAX: i64 = 1 << 20;

/// Configuration of the [`CipherSuite`](crate::cipher_suite::CipherSuite).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteConfig {
    /// Lowest integer the caller needs to encrypt
    pub int_min: i64,
    /// Highest integer the caller needs to encrypt
    pub int_max: i64,
}

impl SuiteConfig {
    /// Creates a configuration for the integer interval `[int_min, int_max]`.
    #[must_use]
    pub const fn new(int_min: i64, int_max: i64) -> Self {
        Self { int_min, int_max }
    }

    /// Interval actually handed to the OPE cipher.
    ///
    /// Widened to include `[0, 2^20]` so dates and times are always
    /// encryptable alongside the caller's integers.
    #[must_use]
    pub fn effective_domain(&self) -> (i64, i64) {
        (self.int_min.min(0), self.int_max.max(MIN_INT_DOMAIN_MAX))
    }
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self { int_min: 0, int_max: 1_000_000 }
    }
}

/// Character classes kept inside tokens.
///
/// Classes follow Unicode general categories the way the engine's
/// `token_chars` do, so local analysis cuts text exactly as the engine does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenChars {
    /// Letters (`L*`)
    Letter,
    /// Decimal digits (`Nd`)
    Digit,
    /// Whitespace, excluding no-break spaces
    Whitespace,
    /// Punctuation (`P*`)
    Punctuation,
    /// Symbols (`S*`)
    Symbol,
}

impl TokenChars {
    /// Returns true if `c` belongs to this class.
    #[must_use]
    pub fn matches(self, c: char) -> bool {
        use GeneralCategory as G;

        let category = get_general_category(c);
        match self {
            Self::Letter => matches!(
                category,
                G::UppercaseLetter
                    | G::LowercaseLetter
                    | G::TitlecaseLetter
                    | G::ModifierLetter
                    | G::OtherLetter
            ),
            Self::Digit => category == G::DecimalNumber,
            Self::Whitespace => match c {
                '\u{00A0}' | '\u{2007}' | '\u{202F}' => false,
                '\t' | '\n' | '\u{000B}' | '\u{000C}' | '\r' | '\u{001C}'..='\u{001F}' => true,
                _ => matches!(
                    category,
                    G::SpaceSeparator | G::LineSeparator | G::ParagraphSeparator
                ),
            },
            Self::Punctuation => matches!(
                category,
                G::ConnectorPunctuation
                    | G::DashPunctuation
                    | G::OpenPunctuation
                    | G::ClosePunctuation
                    | G::InitialPunctuation
                    | G::FinalPunctuation
                    | G::OtherPunctuation
            ),
            Self::Symbol => matches!(
                category,
                G::MathSymbol | G::CurrencySymbol | G::ModifierSymbol | G::OtherSymbol
            ),
        }
    }
}

/// Edge n-gram analyzer definition.
///
/// The same definition must be registered with the index engine and used
/// locally: query tokens only match if both sides cut text identically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Analyzer name as registered on the index
    pub name: String,
    /// Shortest n-gram, in characters
    pub min_gram: usize,
    /// Longest n-gram, in characters
    pub max_gram: usize,
    /// Character classes that form tokens; everything else splits
    pub token_chars: Vec<TokenChars>,
}

impl AnalyzerConfig {
    /// Name of the tokenizer registered next to the analyzer.
    #[must_use]
    pub fn tokenizer_name(&self) -> String {
        format!("{}_tokenizer", self.name)
    }

    /// Returns true if `c` is kept inside tokens.
    ///
    /// An empty class list keeps every character.
    #[must_use]
    pub fn is_token_char(&self, c: char) -> bool {
        self.token_chars.is_empty() || self.token_chars.iter().any(|class| class.matches(c))
    }

    /// Index settings body declaring this analyzer.
    ///
    /// ```
    /// use sifresearch::config::AnalyzerConfig;
    ///
    /// let settings = AnalyzerConfig::default().index_settings();
    /// let tokenizer = &settings["settings"]["analysis"]["tokenizer"]["encrypted_text_tokenizer"];
    /// assert_eq!(tokenizer["type"], "edge_ngram");
    /// assert_eq!(tokenizer["min_gram"], 2);
    /// ```
    #[must_use]
    pub fn index_settings(&self) -> serde_json::Value {
        let tokenizer = self.tokenizer_name();
        json!({
            "settings": {
                "analysis": {
                    "analyzer": {
                        &self.name: { "tokenizer": &tokenizer }
                    },
                    "tokenizer": {
                        &tokenizer: {
                            "type": "edge_ngram",
                            "min_gram": self.min_gram,
                            "max_gram": self.max_gram,
                            "token_chars": &self.token_chars,
                        }
                    }
                }
            }
        })
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            name: "encrypted_text".to_string(),
            min_gram: 2,
            max_gram: 10,
            token_chars: vec![TokenChars::Letter, TokenChars::Digit],
        }
    }
}

/// Options for [`DocumentEncoder`](crate::encoder::DocumentEncoder).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderOptions {
    /// Copy undeclared fields verbatim instead of failing.
    ///
    /// Those fields reach the index engine in plaintext.
    pub allow_unencrypted: bool,
}
