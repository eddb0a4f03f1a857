//! Text normalization shared by page HTML and search queries.
//!
//! Both sides of the comparison go through the same [`TextNormalizer`] so the
//! stemmed tokens they produce land in one vector space.

use crc32fast::Hasher as Crc32;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use scraper::node::Node;
use scraper::Html;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::HashSet;

use crate::stopwords;

/// Elements whose text children never render.
const HIDDEN_PARENTS: &[&str] = &["style", "script"];
const TOKEN_PATTERN: &str = r"\w+(?:'\w+)?|[^\w\s]";
const COMMENT_PATTERN: &str = r"(?s)<!--.*?-->";
const ESCAPED_WHITESPACE_PATTERN: &str = r"\\+[a-z]";
/// Upper bound on stemmer passes; each pass only shortens or rewrites a suffix.
const MAX_STEM_PASSES: usize = 8;

/// Raw page bytes plus response metadata awaiting normalization.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL the page was registered under.
    pub url: String,
    /// HTTP response status code.
    pub status: u16,
    /// Content-Type header, when the server sent one.
    pub content_type: Option<String>,
    /// Raw response body bytes.
    pub body: Vec<u8>,
}

impl FetchedPage {
    /// Builds a fetched page payload without a content type.
    pub fn new(url: impl Into<String>, status: u16, body: Vec<u8>) -> Self {
        Self {
            url: url.into(),
            status,
            content_type: None,
            body,
        }
    }

    /// Annotates the page with its Content-Type header.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Metadata captured while normalizing a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageMetadata {
    /// Registered page URL.
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    /// Content-Type header (if provided).
    pub content_type: Option<String>,
    /// Body length in bytes.
    pub content_length: usize,
    /// CRC32 checksum of the raw body.
    pub checksum: u32,
    /// True when the body required lossy decoding.
    pub lossy_decoding: bool,
    /// Stemmed tokens kept after stop-word removal.
    pub token_count: usize,
}

impl PageMetadata {
    fn from_page(page: &FetchedPage, lossy_decoding: bool, token_count: usize) -> Self {
        let mut hasher = Crc32::new();
        hasher.update(&page.body);
        let checksum = hasher.finalize();

        Self {
            url: page.url.clone(),
            status: page.status,
            content_type: page.content_type.clone(),
            content_length: page.body.len(),
            checksum,
            lossy_decoding,
            token_count,
        }
    }
}

/// Stemmed token stream extracted from one page.
#[derive(Debug, Clone)]
pub struct NormalizedPage {
    /// Captured metadata.
    pub metadata: PageMetadata,
    /// Stemmed, stop-word-free tokens in document order.
    pub tokens: Vec<String>,
}

/// Immutable NLP resources: stop-word set, stemmer and compiled patterns.
///
/// Build one per process and pass it by reference; nothing here changes after
/// construction.
pub struct TextNormalizer {
    stop_words: HashSet<String>,
    stemmer: Stemmer,
    token_pattern: Regex,
    comment_pattern: Regex,
    escaped_whitespace: Regex,
}

impl TextNormalizer {
    /// Normalizer using the English stop-word list and Snowball English stemmer.
    pub fn new() -> Self {
        Self::with_stop_words(stopwords::ENGLISH.iter().copied())
    }

    /// Normalizer with a caller-provided stop-word set. Entries are lowercased.
    pub fn with_stop_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            stop_words: words
                .into_iter()
                .map(|word| word.as_ref().to_lowercase())
                .collect(),
            stemmer: Stemmer::create(Algorithm::English),
            token_pattern: Regex::new(TOKEN_PATTERN).expect("token pattern"),
            comment_pattern: Regex::new(COMMENT_PATTERN).expect("comment pattern"),
            escaped_whitespace: Regex::new(ESCAPED_WHITESPACE_PATTERN)
                .expect("escaped whitespace pattern"),
        }
    }

    /// True when `token` (already lowercase) is a stop word.
    pub fn is_stop_word(&self, token: &str) -> bool {
        self.stop_words.contains(token)
    }

    /// Lowercases `text`, splits it into word and punctuation tokens and drops
    /// stop words. No stemming.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        self.token_pattern
            .find_iter(&lowered)
            .map(|found| found.as_str())
            .filter(|token| !self.is_stop_word(token))
            .map(str::to_string)
            .collect()
    }

    /// Reduces a single token to its stem.
    ///
    /// The Snowball stemmer is reapplied until its output stops changing, so
    /// stemming an already stemmed token returns it unchanged.
    pub fn stem(&self, token: &str) -> String {
        let mut current = token.to_string();
        for _ in 0..MAX_STEM_PASSES {
            let next = self.stemmer.stem(&current);
            if next == current {
                break;
            }
            current = next.into_owned();
        }
        current
    }

    /// Tokenizes and stems plain text (queries, or already extracted page text).
    pub fn normalize_text(&self, text: &str) -> Vec<String> {
        self.tokenize(text)
            .iter()
            .map(|token| self.stem(token))
            .collect()
    }

    /// Extracts the renderable text of an HTML document.
    ///
    /// Comments are stripped before parsing. Text nodes directly under
    /// `style`, `script` or the document root are dropped; the rest are
    /// trimmed, lowercased and joined with single spaces.
    pub fn visible_text(&self, html: &str) -> String {
        let without_comments = self.comment_pattern.replace_all(html, "");
        let document = Html::parse_document(&without_comments);

        let mut fragments: Vec<String> = Vec::new();
        for node in document.tree.root().descendants() {
            let Node::Text(text) = node.value() else {
                continue;
            };
            let visible = node.parent().is_some_and(|parent| match parent.value() {
                Node::Element(element) => !HIDDEN_PARENTS.contains(&element.name()),
                Node::Document => false,
                _ => true,
            });
            if !visible {
                continue;
            }
            let fragment = text.trim();
            if !fragment.is_empty() {
                fragments.push(fragment.to_lowercase());
            }
        }
        fragments.join(" ")
    }

    /// Full HTML pipeline: visible text, escaped-whitespace cleanup, then
    /// tokenization and stemming.
    pub fn normalize_html(&self, html: &str) -> Vec<String> {
        let text = self.visible_text(html);
        let cleaned = self.escaped_whitespace.replace_all(&text, "");
        self.normalize_text(&cleaned)
    }

    /// Decodes and normalizes a fetched page.
    pub fn normalize_page(&self, page: &FetchedPage) -> NormalizedPage {
        let (decoded, lossy) = decode_body(&page.body);
        let tokens = self.normalize_html(&decoded);
        let metadata = PageMetadata::from_page(page, lossy, tokens.len());
        NormalizedPage { metadata, tokens }
    }
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_body(bytes: &[u8]) -> (Cow<'_, str>, bool) {
    match std::str::from_utf8(bytes) {
        Ok(text) => (Cow::Borrowed(text), false),
        Err(_) => (String::from_utf8_lossy(bytes), true),
    }
}
