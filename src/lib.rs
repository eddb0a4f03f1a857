#![warn(missing_docs)]
//! Keyword cannibalization detection: score scraped pages against target
//! search queries in a shared TF-IDF space.

pub mod analytics;
pub mod controls;
pub mod fetch;
pub mod ngrams;
pub mod normalizer;
pub mod report;
pub mod runtime;
pub mod similarity;
pub mod stopwords;
pub mod vectorizer;

pub use analytics::{
    click_totals, parse_response, AnalyticsRow, ClickTotal, ManualInput, RowOutcome, SkipReason,
    SourceError, Targets,
};
pub use controls::{AnalysisControls, Cli};
pub use fetch::{resolve_protocol, scan, FetchError, HttpFetcher, PageFetcher};
pub use normalizer::{FetchedPage, NormalizedPage, PageMetadata, TextNormalizer};
pub use report::{
    Analysis, Competition, FailureReason, FailureReport, RunMetrics, ScrapeFailure,
};
pub use runtime::{AnalysisError, Detector, Stage};
pub use similarity::{cosine, SimilarityError, SimilarityMatrix};
pub use vectorizer::{TfidfVectorizer, Vocabulary};
