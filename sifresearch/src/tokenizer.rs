//! Text tokenization into grouped edge n-grams.
//!
//! Full-text fields are indexed as edge n-grams: every word contributes all
//! of its prefixes between `min_gram` and `max_gram` characters. Prefixes of
//! one word share a start offset and form a [`TokenGroup`]; the sequence of
//! groups keeps word adjacency, which is what phrase queries match on.
//!
//! The [`Tokenizer`] trait is a capability: the index engine's own analyzer
//! ([`AnalyzerTokenizer`]) or the local [`EdgeNgramTokenizer`] can serve it,
//! as long as both sides use the same [`AnalyzerConfig`]. Query tokens are
//! encrypted one by one and only match if they were cut the same way.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::AnalyzerConfig;
use crate::error::Error;
use crate::gateway::{AnalyzedToken, IndexGateway};

/// One token with its position information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Token text
    pub text: String,
    /// Byte offset of the token start in the source text
    pub start_offset: usize,
    /// Index of the group this token belongs to
    pub group: usize,
}

/// All tokens sharing one start offset, in analyzer order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGroup {
    /// Position of the group in the text, counting from 0
    pub index: usize,
    /// Byte offset shared by all tokens of the group
    pub start_offset: usize,
    /// Token texts, shortest first for edge n-grams
    pub tokens: Vec<String>,
}

impl TokenGroup {
    /// Tokens of the group with their position information.
    pub fn tokens(&self) -> impl Iterator<Item = Token> + '_ {
        self.tokens.iter().map(move |text| Token {
            text: text.clone(),
            start_offset: self.start_offset,
            group: self.index,
        })
    }
}

/// A token group tagged with the index of the text it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentGroup {
    /// Index of the source text in the `tokenize_segments` input
    pub segment: usize,
    /// The group, indexed within its own segment
    pub group: TokenGroup,
}

/// Folds `(token, start_offset)` pairs into groups of equal start offset.
///
/// Only consecutive tokens are merged, so input order is preserved.
#[must_use]
pub fn group_tokens<I>(tokens: I) -> Vec<TokenGroup>
where
    I: IntoIterator<Item = (String, usize)>,
{
    let mut groups: Vec<TokenGroup> = Vec::new();
    for (text, start_offset) in tokens {
        match groups.last_mut() {
            Some(last) if last.start_offset == start_offset => last.tokens.push(text),
            _ => groups.push(TokenGroup {
                index: groups.len(),
                start_offset,
                tokens: vec![text],
            }),
        }
    }
    groups
}

/// Turns text into ordered token groups.
///
/// Implementations must be pure functions of their input: tokenizing the
/// same text twice yields the same groups.
#[async_trait]
pub trait Tokenizer: Send + Sync {
    /// Tokenizes a single text.
    ///
    /// # Errors
    ///
    /// Returns an error if the analyzer fails.
    async fn tokenize(&self, text: &str) -> Result<Vec<TokenGroup>, Error>;

    /// Tokenizes many texts in one call.
    ///
    /// Every returned group carries the index of its source text. Groups come
    /// back ordered by segment, then by position.
    ///
    /// # Errors
    ///
    /// Returns an error if the analyzer fails.
    async fn tokenize_segments(&self, texts: &[&str]) -> Result<Vec<SegmentGroup>, Error> {
        let mut out = Vec::new();
        for (segment, text) in texts.iter().enumerate() {
            let groups = self.tokenize(text).await?;
            out.extend(groups.into_iter().map(|group| SegmentGroup { segment, group }));
        }
        Ok(out)
    }
}

/// Local edge n-gram tokenizer.
///
/// Mirrors the `edge_ngram` tokenizer of the index engine: text is split
/// into runs of token characters, and every run yields its prefixes of
/// `min_gram..=max_gram` characters. Runs shorter than `min_gram` yield
/// nothing. Case is preserved.
#[derive(Debug, Clone)]
pub struct EdgeNgramTokenizer {
    config: AnalyzerConfig,
}

impl EdgeNgramTokenizer {
    /// Creates a tokenizer for `config`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Tokenizer` if `min_gram` is 0 or exceeds `max_gram`.
    pub fn new(config: AnalyzerConfig) -> Result<Self, Error> {
        if config.min_gram == 0 || config.min_gram > config.max_gram {
            return Err(Error::Tokenizer(format!(
                "invalid gram bounds {}..={}",
                config.min_gram, config.max_gram
            )));
        }
        Ok(Self { config })
    }

    /// The analyzer definition this tokenizer implements.
    #[must_use]
    pub const fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Tokenizes `text` into flat `(token, start_offset, end_offset)` triples.
    #[must_use]
    pub fn analyze(&self, text: &str) -> Vec<(String, usize, usize)> {
        let mut out = Vec::new();
        let mut run_start = None;

        for (i, c) in text.char_indices() {
            match (self.config.is_token_char(c), run_start) {
                (true, None) => run_start = Some(i),
                (false, Some(start)) => {
                    self.emit_run(text, start, i, &mut out);
                    run_start = None;
                }
                _ => {}
            }
        }
        if let Some(start) = run_start {
            self.emit_run(text, start, text.len(), &mut out);
        }
        out
    }

    /// Groups of [`analyze`](Self::analyze), without going through the trait.
    #[must_use]
    pub fn tokenize_local(&self, text: &str) -> Vec<TokenGroup> {
        group_tokens(self.analyze(text).into_iter().map(|(token, start, _)| (token, start)))
    }

    fn emit_run(
        &self,
        text: &str,
        start: usize,
        end: usize,
        out: &mut Vec<(String, usize, usize)>,
    ) {
        let word = &text[start..end];
        let prefix_ends = word
            .char_indices()
            .map(|(i, c)| i + c.len_utf8())
            .skip(self.config.min_gram - 1)
            .take(self.config.max_gram - self.config.min_gram + 1);

        for prefix_end in prefix_ends {
            out.push((word[..prefix_end].to_string(), start, start + prefix_end));
        }
    }
}

#[async_trait]
impl Tokenizer for EdgeNgramTokenizer {
    async fn tokenize(&self, text: &str) -> Result<Vec<TokenGroup>, Error> {
        Ok(self.tokenize_local(text))
    }
}

/// Tokenizer delegating to the index engine's analyzer.
///
/// One `tokenize_segments` call issues exactly one `analyze` request.
pub struct AnalyzerTokenizer<G: IndexGateway + ?Sized> {
    gateway: Arc<G>,
    index: String,
    analyzer: String,
}

impl<G: IndexGateway + ?Sized> AnalyzerTokenizer<G> {
    /// Creates a tokenizer using `analyzer` registered on `index`.
    pub fn new(gateway: Arc<G>, index: impl Into<String>, analyzer: impl Into<String>) -> Self {
        Self { gateway, index: index.into(), analyzer: analyzer.into() }
    }
}

/// Splits analyzer output into per-segment groups.
fn regroup_segments(
    tokens: Vec<AnalyzedToken>,
    segments: usize,
) -> Result<Vec<SegmentGroup>, Error> {
    let mut out: Vec<SegmentGroup> = Vec::new();
    let mut next_index = 0;

    for token in tokens {
        if token.segment >= segments {
            return Err(Error::Alignment(format!(
                "analyzer returned segment {} for {segments} texts",
                token.segment
            )));
        }
        match out.last_mut() {
            Some(last) if last.segment == token.segment => {
                if last.group.start_offset == token.start_offset {
                    last.group.tokens.push(token.token);
                    continue;
                }
            }
            Some(last) if last.segment > token.segment => {
                return Err(Error::Alignment(format!(
                    "analyzer returned segment {} after segment {}",
                    token.segment, last.segment
                )));
            }
            _ => next_index = 0,
        }
        out.push(SegmentGroup {
            segment: token.segment,
            group: TokenGroup {
                index: next_index,
                start_offset: token.start_offset,
                tokens: vec![token.token],
            },
        });
        next_index += 1;
    }
    Ok(out)
}

#[async_trait]
impl<G: IndexGateway + ?Sized> Tokenizer for AnalyzerTokenizer<G> {
    async fn tokenize(&self, text: &str) -> Result<Vec<TokenGroup>, Error> {
        let groups = self.tokenize_segments(&[text]).await?;
        Ok(groups.into_iter().map(|sg| sg.group).collect())
    }

    async fn tokenize_segments(&self, texts: &[&str]) -> Result<Vec<SegmentGroup>, Error> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let tokens = self.gateway.analyze(&self.index, &self.analyzer, texts).await?;
        regroup_segments(tokens, texts.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenChars;

    fn tokenizer() -> EdgeNgramTokenizer {
        EdgeNgramTokenizer::new(AnalyzerConfig::default()).unwrap()
    }

    fn token_lists(groups: &[TokenGroup]) -> Vec<Vec<&str>> {
        groups.iter().map(|g| g.tokens.iter().map(String::as_str).collect()).collect()
    }

    #[test]
    fn test_edge_ngrams_grouped_by_word() {
        let groups = tokenizer().tokenize_local("The quick brown fox");

        assert_eq!(
            token_lists(&groups),
            vec![
                vec!["Th", "The"],
                vec!["qu", "qui", "quic", "quick"],
                vec!["br", "bro", "brow", "brown"],
                vec!["fo", "fox"],
            ]
        );
        assert_eq!(groups[1].start_offset, 4);
        assert_eq!(groups.iter().map(|g| g.index).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_punctuation_splits_and_short_words_vanish() {
        let groups = tokenizer().tokenize_local("Foo BAR! a b2");
        assert_eq!(token_lists(&groups), vec![vec!["Fo", "Foo"], vec!["BA", "BAR"], vec!["b2"]]);
    }

    #[test]
    fn test_max_gram_caps_prefixes() {
        let groups = tokenizer().tokenize_local("typesetting");
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].tokens.len(), 9);
        assert_eq!(groups[0].tokens.last().map(String::as_str), Some("typesettin"));
    }

    #[test]
    fn test_multibyte_characters() {
        let groups = tokenizer().tokenize_local("şifre çözüm");
        assert_eq!(groups[0].tokens[0], "şi");
        assert_eq!(groups[1].start_offset, "şifre ".len());
        assert_eq!(groups[1].tokens.last().map(String::as_str), Some("çözüm"));
    }

    #[test]
    fn test_token_chars_configurable() {
        let config = AnalyzerConfig {
            token_chars: vec![TokenChars::Letter],
            ..AnalyzerConfig::default()
        };
        let groups = EdgeNgramTokenizer::new(config).unwrap().tokenize_local("ab12cd");
        assert_eq!(token_lists(&groups), vec![vec!["ab"], vec!["cd"]]);
    }

    #[test]
    fn test_analyze_offsets() {
        let tokens = tokenizer().analyze("hi you");
        assert_eq!(
            tokens,
            vec![
                ("hi".to_string(), 0, 2),
                ("yo".to_string(), 3, 5),
                ("you".to_string(), 3, 6),
            ]
        );
    }

    #[test]
    fn test_invalid_gram_bounds() {
        let config = AnalyzerConfig { min_gram: 4, max_gram: 3, ..AnalyzerConfig::default() };
        assert!(matches!(EdgeNgramTokenizer::new(config), Err(Error::Tokenizer(_))));
    }

    #[test]
    fn test_group_tokens_keeps_order() {
        let groups = group_tokens(vec![
            ("a".to_string(), 0),
            ("ab".to_string(), 0),
            ("c".to_string(), 3),
            ("d".to_string(), 5),
        ]);
        assert_eq!(token_lists(&groups), vec![vec!["a", "ab"], vec!["c"], vec!["d"]]);
        let flat: Vec<Token> = groups.iter().flat_map(TokenGroup::tokens).collect();
        assert_eq!(flat[2], Token { text: "c".to_string(), start_offset: 3, group: 1 });
    }

    #[tokio::test]
    async fn test_tokenize_is_deterministic() {
        let tokenizer = tokenizer();
        let text = "The quick brown fox jumps over the lazy dog!";
        let first = tokenizer.tokenize(text).await.unwrap();
        assert_eq!(first, tokenizer.tokenize(text).await.unwrap());
    }

    #[tokio::test]
    async fn test_tokenize_segments_tags_segments() {
        let groups = tokenizer().tokenize_segments(&["foo bar", "", "baz"]).await.unwrap();

        let tags: Vec<(usize, usize)> = groups.iter().map(|g| (g.segment, g.group.index)).collect();
        assert_eq!(tags, vec![(0, 0), (0, 1), (2, 0)]);
    }

    #[test]
    fn test_regroup_segments() {
        let token = |token: &str, start_offset, segment| AnalyzedToken {
            token: token.to_string(),
            start_offset,
            end_offset: start_offset + token.len(),
            segment,
        };
        let groups = regroup_segments(
            vec![token("fo", 0, 0), token("foo", 0, 0), token("ba", 4, 0), token("ba", 0, 2)],
            3,
        )
        .unwrap();

        let tags: Vec<(usize, usize, usize)> =
            groups.iter().map(|g| (g.segment, g.group.index, g.group.tokens.len())).collect();
        assert_eq!(tags, vec![(0, 0, 2), (0, 1, 1), (2, 0, 1)]);
    }

    #[test]
    fn test_regroup_segments_rejects_bad_tags() {
        let token = |segment| AnalyzedToken {
            token: "ab".to_string(),
            start_offset: 0,
            end_offset: 2,
            segment,
        };
        assert!(matches!(regroup_segments(vec![token(3)], 3), Err(Error::Alignment(_))));
        assert!(matches!(regroup_segments(vec![token(1), token(0)], 2), Err(Error::Alignment(_))));
    }
}
