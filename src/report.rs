//! Analysis results and their text rendering.

use serde::Serialize;
use std::fmt::{self, Write as _};
use std::time::Duration;

use crate::normalizer::PageMetadata;
use crate::similarity::SimilarityMatrix;

/// Why a page was excluded from the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// The URL did not start with an accepted protocol; no request was made.
    InvalidProtocol,
    /// Retrieval failed (transport error, non-2xx status, unparsable URL).
    Fetch(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidProtocol => write!(f, "url does not have a valid protocol"),
            Self::Fetch(message) => write!(f, "{message}"),
        }
    }
}

/// One page that could not be scraped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScrapeFailure {
    /// Registered URL.
    pub url: String,
    /// Failure classification.
    pub reason: FailureReason,
}

/// Per-page scrape failures of one run, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FailureReport {
    failures: Vec<ScrapeFailure>,
}

impl FailureReport {
    pub(crate) fn record(&mut self, url: &str, reason: FailureReason) {
        self.failures.push(ScrapeFailure {
            url: url.to_string(),
            reason,
        });
    }

    /// Number of failed pages.
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// True when every page was scraped.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Failed URLs in input order.
    pub fn urls(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.url.as_str()).collect()
    }

    /// True when `url` failed.
    pub fn contains(&self, url: &str) -> bool {
        self.failures.iter().any(|f| f.url == url)
    }

    /// Iterates the failures.
    pub fn iter(&self) -> impl Iterator<Item = &ScrapeFailure> {
        self.failures.iter()
    }
}

/// Counters gathered across one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunMetrics {
    /// Pages registered for the run.
    pub pages_requested: usize,
    /// Pages scraped successfully.
    pub pages_scraped: usize,
    /// Pages rejected for their protocol.
    pub invalid_protocol: usize,
    /// Pages whose retrieval failed.
    pub fetch_errors: usize,
    /// Queries scored.
    pub queries: usize,
    /// Queries that normalized to no tokens.
    pub empty_queries: usize,
    /// Scraped pages that normalized to no tokens.
    pub empty_pages: usize,
    /// Scraped pages whose body has the same CRC32 checksum as an earlier page.
    pub duplicate_bodies: usize,
    /// Fitted vocabulary size.
    pub vocabulary_size: usize,
    /// Wall-clock time of the run in milliseconds.
    pub elapsed_ms: u64,
}

impl RunMetrics {
    pub(crate) fn finish(&mut self, elapsed: Duration) {
        self.elapsed_ms = elapsed.as_millis() as u64;
    }
}

/// Output of one analysis run.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    /// URLs of successfully scraped pages; row order of `matrix`.
    pub pages: Vec<String>,
    /// Queries; column order of `matrix`.
    pub queries: Vec<String>,
    /// Cosine similarity of every (page, query) pair.
    pub matrix: SimilarityMatrix,
    /// Pages excluded from scoring.
    pub failures: FailureReport,
    /// Metadata of the scored pages, aligned with `pages`.
    pub page_metadata: Vec<PageMetadata>,
    /// Run counters.
    pub metrics: RunMetrics,
}

/// Queries for which more than one page scores above a threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Competition {
    /// The contested query.
    pub query: String,
    /// Competing page URLs with raw scores, highest first.
    pub pages: Vec<(String, f64)>,
}

impl Analysis {
    /// Score of `url` against `query`, if both were scored.
    pub fn score(&self, url: &str, query: &str) -> Option<f64> {
        let row = self.pages.iter().position(|p| p == url)?;
        let column = self.queries.iter().position(|q| q == query)?;
        self.matrix.get(row, column)
    }

    /// Queries where at least two pages reach `threshold` on raw scores.
    pub fn competitions(&self, threshold: f64) -> Vec<Competition> {
        self.queries
            .iter()
            .enumerate()
            .filter_map(|(column, query)| {
                let hits = self.matrix.competing_pages(column, threshold);
                (hits.len() > 1).then(|| Competition {
                    query: query.clone(),
                    pages: hits
                        .into_iter()
                        .map(|(row, score)| (self.pages[row].clone(), score))
                        .collect(),
                })
            })
            .collect()
    }

    /// Legend mapping row labels to URLs (`URL 1  https://...`).
    pub fn render_legend(&self) -> String {
        let mut out = String::new();
        for (idx, url) in self.pages.iter().enumerate() {
            let _ = writeln!(out, "{:<10}{}", format!("URL {}", idx + 1), url);
        }
        out
    }

    /// Fixed-width score table with queries as columns and `URL n` rows.
    /// `normalize` divides each column by its maximum first.
    pub fn render_matrix(&self, normalize: bool) -> String {
        let matrix = if normalize {
            self.matrix.column_normalized()
        } else {
            self.matrix.clone()
        };
        let widths: Vec<usize> = self
            .queries
            .iter()
            .map(|query| query.chars().count().max(6))
            .collect();
        let label_width = format!("URL {}", self.pages.len()).len().max(6);

        let mut out = String::new();
        let _ = write!(out, "{:<label_width$}", "");
        for (query, &width) in self.queries.iter().zip(&widths) {
            let _ = write!(out, "  {query:>width$}");
        }
        out.push('\n');
        for row in 0..matrix.rows() {
            let _ = write!(out, "{:<label_width$}", format!("URL {}", row + 1));
            for (column, &width) in widths.iter().enumerate() {
                let score = matrix.get(row, column).unwrap_or(0.0);
                let _ = write!(out, "  {score:>width$.3}");
            }
            out.push('\n');
        }
        out
    }
}
