//! Encrypted queries.
//!
//! A [`Query`] only ever carries ciphertext operands. [`QueryEncoder`]
//! builds them from plaintext with the same [`CipherSuite`] that encoded the
//! documents, so equal plaintexts meet as equal ciphertexts and ranges keep
//! their order.

use std::fmt;
use std::ops::Bound;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use serde_json::{json, Map, Value as JsonValue};

use crate::cipher_suite::CipherSuite;
use crate::error::Error;
use crate::field::raw_companion;
use crate::tokenizer::Tokenizer;

/// A query over encrypted fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Every document
    MatchAll,
    /// Documents whose field holds any of the space-separated tokens
    Match {
        /// Field name
        field: String,
        /// Space-separated token ciphertexts
        query: String,
    },
    /// Documents whose field holds the tokens in consecutive positions
    MatchPhrase {
        /// Field name
        field: String,
        /// Space-separated token ciphertexts, one per word
        phrase: String,
    },
    /// Documents whose field holds exactly this token
    Term {
        /// Field name
        field: String,
        /// Token ciphertext
        value: String,
    },
    /// Documents whose order-preserving field lies between the bounds
    Range {
        /// Field name
        field: String,
        /// Lower bound on the ciphertext
        lower: Bound<u64>,
        /// Upper bound on the ciphertext
        upper: Bound<u64>,
    },
    /// Documents matching every clause
    Bool {
        /// Clauses that must all match
        must: Vec<Query>,
    },
}

impl Query {
    /// Renders the query in the engine's JSON query language.
    ///
    /// ```
    /// use std::ops::Bound;
    /// use sifresearch::query::Query;
    ///
    /// let query = Query::Range {
    ///     field: "value".into(),
    ///     lower: Bound::Included(3),
    ///     upper: Bound::Unbounded,
    /// };
    /// assert_eq!(query.to_json()["range"]["value"]["gte"], 3);
    /// ```
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::MatchAll => json!({ "match_all": {} }),
            Self::Match { field, query } => json!({ "match": { field: query } }),
            Self::MatchPhrase { field, phrase } => json!({ "match_phrase": { field: phrase } }),
            Self::Term { field, value } => json!({ "term": { field: value } }),
            Self::Range { field, lower, upper } => {
                let lower = match lower {
                    Bound::Included(v) => Some(("gte", v)),
                    Bound::Excluded(v) => Some(("gt", v)),
                    Bound::Unbounded => None,
                };
                let upper = match upper {
                    Bound::Included(v) => Some(("lte", v)),
                    Bound::Excluded(v) => Some(("lt", v)),
                    Bound::Unbounded => None,
                };
                let bounds: Map<String, JsonValue> = lower
                    .into_iter()
                    .chain(upper)
                    .map(|(op, v)| (op.to_string(), json!(v)))
                    .collect();
                json!({ "range": { field: bounds } })
            }
            Self::Bool { must } => {
                let clauses: Vec<JsonValue> = must.iter().map(Self::to_json).collect();
                json!({ "bool": { "must": clauses } })
            }
        }
    }
}

/// Builds encrypted queries.
///
/// Full-text operands go through the same [`Tokenizer`] that indexed the
/// documents, and each word is encrypted in its longest indexed form, so a
/// word with trailing punctuation or longer than `max_gram` still meets its
/// stored gram.
#[derive(Clone)]
pub struct QueryEncoder {
    suite: CipherSuite,
    tokenizer: Arc<dyn Tokenizer>,
}

impl QueryEncoder {
    /// Creates an encoder over `suite`, analyzing text with `tokenizer`.
    #[must_use]
    pub fn new(suite: CipherSuite, tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { suite, tokenizer }
    }

    /// Match on a full-text field for any word of `text`.
    ///
    /// A word matches documents holding it, or holding a longer word it is a
    /// prefix of.
    ///
    /// # Errors
    ///
    /// Returns an error if tokenization or encryption fails.
    pub async fn match_token(&self, field: &str, text: &str) -> Result<Query, Error> {
        Ok(Query::Match {
            field: field.to_string(),
            query: self.encrypt_phrase(text).await?,
        })
    }

    /// Phrase match on a full-text field.
    ///
    /// # Errors
    ///
    /// Returns an error if tokenization or encryption fails.
    pub async fn match_phrase(&self, field: &str, phrase: &str) -> Result<Query, Error> {
        Ok(Query::MatchPhrase {
            field: field.to_string(),
            phrase: self.encrypt_phrase(phrase).await?,
        })
    }

    /// Analyzes `phrase` and encrypts the longest gram of every word, joined
    /// with spaces.
    ///
    /// Words the analyzer drops (too short, or made only of non-token
    /// characters) are dropped here too.
    ///
    /// # Errors
    ///
    /// Returns an error if tokenization or encryption fails.
    pub async fn encrypt_phrase(&self, phrase: &str) -> Result<String, Error> {
        let groups = self.tokenizer.tokenize(phrase).await?;
        let words = groups
            .iter()
            .filter_map(|group| group.tokens.iter().max_by_key(|gram| gram.chars().count()))
            .map(|gram| self.suite.encrypt_str(gram))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(words.join(" "))
    }

    /// Exact match of a raw field.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails.
    pub fn term(&self, field: &str, value: &str) -> Result<Query, Error> {
        Ok(Query::Term { field: field.to_string(), value: self.suite.encrypt_str(value)? })
    }

    /// Exact match of a full-text field's whole value, via its `_raw` companion.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails.
    pub fn term_raw(&self, field: &str, value: &str) -> Result<Query, Error> {
        self.term(&raw_companion(field), value)
    }

    /// Range over an integer field.
    ///
    /// # Errors
    ///
    /// Returns `Error::OutOfRange` if a bound is outside the integer domain.
    pub fn range_int(
        &self,
        field: &str,
        lower: Bound<i64>,
        upper: Bound<i64>,
    ) -> Result<Query, Error> {
        self.range(field, lower, upper, |v| self.suite.encrypt_int(v))
    }

    /// Range over a date field.
    ///
    /// # Errors
    ///
    /// Returns `Error::OutOfRange` if a bound is outside the integer domain.
    pub fn range_date(
        &self,
        field: &str,
        lower: Bound<NaiveDate>,
        upper: Bound<NaiveDate>,
    ) -> Result<Query, Error> {
        self.range(field, lower, upper, |v| self.suite.encrypt_date(v))
    }

    /// Range over a time field.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails.
    pub fn range_time(
        &self,
        field: &str,
        lower: Bound<NaiveTime>,
        upper: Bound<NaiveTime>,
    ) -> Result<Query, Error> {
        self.range(field, lower, upper, |v| self.suite.encrypt_time(v))
    }

    // Strict monotonicity keeps inclusive and exclusive bounds meaningful.
    fn range<T, F>(
        &self,
        field: &str,
        lower: Bound<T>,
        upper: Bound<T>,
        encrypt: F,
    ) -> Result<Query, Error>
    where
        F: Fn(T) -> Result<u64, Error>,
    {
        let map = |bound: Bound<T>| -> Result<Bound<u64>, Error> {
            Ok(match bound {
                Bound::Included(v) => Bound::Included(encrypt(v)?),
                Bound::Excluded(v) => Bound::Excluded(encrypt(v)?),
                Bound::Unbounded => Bound::Unbounded,
            })
        };
        Ok(Query::Range { field: field.to_string(), lower: map(lower)?, upper: map(upper)? })
    }
}

impl fmt::Debug for QueryEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryEncoder").field("suite", &self.suite).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AnalyzerConfig, SuiteConfig};
    use crate::tokenizer::EdgeNgramTokenizer;
    use secrecy::SecretVec;

    fn encoder() -> (QueryEncoder, CipherSuite) {
        let suite =
            CipherSuite::new(SecretVec::new(b"key goes here!!!".to_vec()), SuiteConfig::default())
                .unwrap();
        let tokenizer = Arc::new(EdgeNgramTokenizer::new(AnalyzerConfig::default()).unwrap());
        (QueryEncoder::new(suite.clone(), tokenizer), suite)
    }

    fn encrypted_words(suite: &CipherSuite, words: &[&str]) -> String {
        let words: Vec<String> = words.iter().map(|w| suite.encrypt_str(w).unwrap()).collect();
        words.join(" ")
    }

    #[tokio::test]
    async fn test_match_token_is_encrypted() {
        let (encoder, suite) = encoder();
        let query = encoder.match_token("text", "qui").await.unwrap();
        assert_eq!(
            query,
            Query::Match { field: "text".to_string(), query: suite.encrypt_str("qui").unwrap() }
        );
    }

    #[tokio::test]
    async fn test_phrase_encrypts_word_by_word() {
        let (encoder, suite) = encoder();
        let phrase = encoder.encrypt_phrase("  brown   fox ").await.unwrap();
        assert_eq!(phrase, encrypted_words(&suite, &["brown", "fox"]));
        assert_eq!(encoder.encrypt_phrase("").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_phrase_drops_punctuation() {
        let (encoder, suite) = encoder();
        let phrase = encoder.encrypt_phrase("lazy dog!").await.unwrap();
        assert_eq!(phrase, encrypted_words(&suite, &["lazy", "dog"]));
        assert_eq!(encoder.encrypt_phrase("?! a").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_long_words_use_longest_gram() {
        let (encoder, suite) = encoder();
        let phrase = encoder.encrypt_phrase("electronic typesetting").await.unwrap();
        assert_eq!(phrase, encrypted_words(&suite, &["electronic", "typesettin"]));

        let query = encoder.match_token("text", "typesetting").await.unwrap();
        let expected = suite.encrypt_str("typesettin").unwrap();
        assert_eq!(query, Query::Match { field: "text".to_string(), query: expected });
    }

    #[test]
    fn test_term_raw_targets_companion() {
        let (encoder, _) = encoder();
        let Query::Term { field, .. } = encoder.term_raw("author", "Kim Chong Un").unwrap() else {
            panic!("expected term query");
        };
        assert_eq!(field, "author_raw");
    }

    #[test]
    fn test_range_bounds_keep_kind_and_order() {
        let (encoder, _) = encoder();
        let query =
            encoder.range_int("value", Bound::Excluded(1233), Bound::Included(1235)).unwrap();
        let Query::Range { lower: Bound::Excluded(lo), upper: Bound::Included(hi), .. } = query
        else {
            panic!("unexpected bounds");
        };
        assert!(lo < hi);
    }

    #[test]
    fn test_range_out_of_domain() {
        let (encoder, _) = encoder();
        let result = encoder.range_int("value", Bound::Included(-1), Bound::Unbounded);
        assert!(matches!(result, Err(Error::OutOfRange { value: -1, .. })));
    }

    #[test]
    fn test_date_and_time_ranges() {
        let (encoder, suite) = encoder();
        let day = NaiveDate::from_ymd_opt(2010, 1, 1).unwrap();
        let query = encoder.range_date("date", Bound::Included(day), Bound::Unbounded).unwrap();
        assert_eq!(
            query,
            Query::Range {
                field: "date".to_string(),
                lower: Bound::Included(suite.encrypt_date(day).unwrap()),
                upper: Bound::Unbounded,
            }
        );

        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        let query = encoder.range_time("time", Bound::Unbounded, Bound::Excluded(noon)).unwrap();
        assert!(matches!(
            query,
            Query::Range { lower: Bound::Unbounded, upper: Bound::Excluded(_), .. }
        ));
    }

    #[test]
    fn test_to_json() {
        let range = Query::Range {
            field: "value".to_string(),
            lower: Bound::Excluded(1),
            upper: Bound::Included(9),
        };
        assert_eq!(range.to_json(), json!({ "range": { "value": { "gt": 1, "lte": 9 } } }));

        let query = Query::Bool {
            must: vec![
                Query::Term { field: "author_raw".to_string(), value: "QQ==".to_string() },
                Query::MatchAll,
            ],
        };
        assert_eq!(
            query.to_json(),
            json!({
                "bool": { "must": [ { "term": { "author_raw": "QQ==" } }, { "match_all": {} } ] }
            })
        );
    }
}
