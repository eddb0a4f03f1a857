//! Pipeline orchestrator: scrape, normalize, vectorize and score one run.

use std::collections::HashMap;
use std::fmt;
use std::thread;
use std::time::Instant;

use crossbeam_channel::bounded;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::fetch::{self, FetchError, PageFetcher};
use crate::ngrams;
use crate::normalizer::{FetchedPage, NormalizedPage, TextNormalizer};
use crate::report::{Analysis, FailureReason, FailureReport, RunMetrics};
use crate::similarity::{SimilarityError, SimilarityMatrix};
use crate::vectorizer::TfidfVectorizer;

/// Fatal outcomes of a run. Per-page failures never surface here; they land
/// in the [`FailureReport`] of a successful [`Analysis`].
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The call itself was unusable (no queries or no pages).
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// Every page failed to scrape, so no vocabulary could be fit.
    #[error("no page could be scraped ({} failed); nothing to fit a vocabulary on", .report.len())]
    VocabularyEmpty {
        /// Why each page failed.
        report: FailureReport,
    },
    /// Page and query vectors disagreed on dimension.
    #[error(transparent)]
    Similarity(#[from] SimilarityError),
}

/// Linear stages of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// No run in progress.
    Idle,
    /// Fetching pages.
    Scraping,
    /// Turning pages and queries into corpora.
    Normalizing,
    /// Fitting the vocabulary and projecting corpora.
    Vectorizing,
    /// Matrix computed.
    Scored,
}

impl Stage {
    /// Lowercase stage name used in log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::Scraping => "scraping",
            Stage::Normalizing => "normalizing",
            Stage::Vectorizing => "vectorizing",
            Stage::Scored => "scored",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Insertion-ordered set of keys; the first occurrence wins.
#[derive(Debug, Default)]
struct Registry {
    entries: Vec<String>,
    index: HashMap<String, usize>,
}

impl Registry {
    fn from_keys<S: AsRef<str>>(keys: &[S]) -> Self {
        let mut registry = Self::default();
        for key in keys {
            let key = key.as_ref();
            if registry.index.contains_key(key) {
                debug!(key, "ignoring duplicate entry");
                continue;
            }
            registry.index.insert(key.to_string(), registry.entries.len());
            registry.entries.push(key.to_string());
        }
        registry
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn into_entries(self) -> Vec<String> {
        self.entries
    }
}

enum Scraped {
    Page(FetchedPage),
    Failed(FailureReason),
}

fn classify(url: &str, outcome: Result<Option<FetchedPage>, FetchError>) -> Scraped {
    match outcome {
        Ok(Some(page)) => Scraped::Page(page),
        Ok(None) => Scraped::Failed(FailureReason::InvalidProtocol),
        Err(err) => {
            warn!(url, error = %err, "page scrape failed");
            Scraped::Failed(FailureReason::Fetch(err.to_string()))
        }
    }
}

/// Runs the detection pipeline against a [`PageFetcher`].
///
/// The normalizer is borrowed so one set of NLP resources serves every run.
pub struct Detector<'n, F> {
    normalizer: &'n TextNormalizer,
    fetcher: F,
    fetch_threads: usize,
    stage: Stage,
}

impl<'n, F: PageFetcher> Detector<'n, F> {
    /// Sequential detector.
    pub fn new(normalizer: &'n TextNormalizer, fetcher: F) -> Self {
        Self {
            normalizer,
            fetcher,
            fetch_threads: 1,
            stage: Stage::Idle,
        }
    }

    /// Fetch up to `threads` pages concurrently. Row order is unaffected.
    pub fn with_fetch_threads(mut self, threads: usize) -> Self {
        self.fetch_threads = threads.max(1);
        self
    }

    /// Current stage; [`Stage::Idle`] between runs.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Scores every page in `urls` against every query in `queries`.
    pub fn analyze<U, Q>(&mut self, urls: &[U], queries: &[Q]) -> Result<Analysis, AnalysisError>
    where
        U: AsRef<str>,
        Q: AsRef<str>,
    {
        self.analyze_with_progress(urls, queries, |_, _| {})
    }

    /// Like [`Detector::analyze`], calling `progress(done, total)` after each
    /// page is scraped.
    pub fn analyze_with_progress<U, Q, P>(
        &mut self,
        urls: &[U],
        queries: &[Q],
        mut progress: P,
    ) -> Result<Analysis, AnalysisError>
    where
        U: AsRef<str>,
        Q: AsRef<str>,
        P: FnMut(usize, usize),
    {
        let result = self.run(urls, queries, &mut progress);
        self.enter(Stage::Idle);
        result
    }

    fn enter(&mut self, stage: Stage) {
        if self.stage != stage {
            info!(from = %self.stage, to = %stage, "pipeline stage");
            self.stage = stage;
        }
    }

    fn run<U, Q, P>(
        &mut self,
        urls: &[U],
        queries: &[Q],
        progress: &mut P,
    ) -> Result<Analysis, AnalysisError>
    where
        U: AsRef<str>,
        Q: AsRef<str>,
        P: FnMut(usize, usize),
    {
        if queries.is_empty() {
            return Err(AnalysisError::InvalidInput("no queries supplied"));
        }
        if urls.is_empty() {
            return Err(AnalysisError::InvalidInput("no page urls supplied"));
        }
        let started = Instant::now();
        let pages = Registry::from_keys(urls);
        let queries = Registry::from_keys(queries);
        let mut metrics = RunMetrics {
            pages_requested: pages.len(),
            queries: queries.len(),
            ..RunMetrics::default()
        };

        self.enter(Stage::Scraping);
        let scraped = self.scrape(&pages.entries, progress);
        let mut failures = FailureReport::default();
        let mut fetched = Vec::with_capacity(scraped.len());
        for (url, outcome) in pages.entries.iter().zip(scraped) {
            match outcome {
                Scraped::Page(page) => fetched.push(page),
                Scraped::Failed(reason) => {
                    match reason {
                        FailureReason::InvalidProtocol => metrics.invalid_protocol += 1,
                        FailureReason::Fetch(_) => metrics.fetch_errors += 1,
                    }
                    failures.record(url, reason);
                }
            }
        }
        metrics.pages_scraped = fetched.len();
        if !failures.is_empty() {
            warn!(
                failed = failures.len(),
                urls = ?failures.urls(),
                "some pages could not be scraped"
            );
        }
        if fetched.is_empty() {
            return Err(AnalysisError::VocabularyEmpty { report: failures });
        }

        self.enter(Stage::Normalizing);
        let normalized: Vec<NormalizedPage> = fetched
            .iter()
            .map(|page| self.normalizer.normalize_page(page))
            .collect();
        let mut first_by_checksum: HashMap<u32, &str> = HashMap::new();
        for page in &normalized {
            let meta = &page.metadata;
            if let Some(first) = first_by_checksum.insert(meta.checksum, &meta.url) {
                warn!(url = %meta.url, duplicate_of = first, "page body duplicates another page");
                first_by_checksum.insert(meta.checksum, first);
                metrics.duplicate_bodies += 1;
            }
            if page.tokens.is_empty() {
                debug!(url = %meta.url, "page has no indexable text");
                metrics.empty_pages += 1;
            }
        }
        let page_corpora: Vec<String> = normalized
            .iter()
            .map(|page| ngrams::expand(&page.tokens))
            .collect();
        let query_corpora: Vec<String> = queries
            .entries
            .iter()
            .map(|query| {
                let tokens = self.normalizer.normalize_text(query);
                if tokens.is_empty() {
                    debug!(query = %query, "query has no indexable terms");
                    metrics.empty_queries += 1;
                }
                ngrams::expand(&tokens)
            })
            .collect();

        self.enter(Stage::Vectorizing);
        let vectorizer = TfidfVectorizer::fit(&page_corpora);
        metrics.vocabulary_size = vectorizer.dimension();
        let page_vectors = vectorizer.transform(&page_corpora);
        let query_vectors = vectorizer.transform(&query_corpora);

        let matrix = SimilarityMatrix::compute(&page_vectors, &query_vectors)?;
        self.enter(Stage::Scored);
        metrics.finish(started.elapsed());
        report_metrics(&metrics);

        let page_metadata: Vec<_> = normalized.into_iter().map(|page| page.metadata).collect();
        Ok(Analysis {
            pages: page_metadata.iter().map(|meta| meta.url.clone()).collect(),
            queries: queries.into_entries(),
            matrix,
            failures,
            page_metadata,
            metrics,
        })
    }

    fn scrape<P: FnMut(usize, usize)>(&self, urls: &[String], progress: &mut P) -> Vec<Scraped> {
        let total = urls.len();
        let threads = self.fetch_threads.min(total);
        if threads <= 1 {
            return urls
                .iter()
                .enumerate()
                .map(|(idx, url)| {
                    let outcome = classify(url, fetch::scan(&self.fetcher, url));
                    progress(idx + 1, total);
                    outcome
                })
                .collect();
        }

        debug!(threads, pages = total, "scraping with worker pool");
        let fetcher = &self.fetcher;
        let mut slots: Vec<Option<Scraped>> = (0..total).map(|_| None).collect();
        thread::scope(|scope| {
            let (task_tx, task_rx) = bounded::<(usize, &str)>(threads * 2);
            let (result_tx, result_rx) = bounded::<(usize, Scraped)>(threads * 2);
            for _ in 0..threads {
                let task_rx = task_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    for (idx, url) in task_rx.iter() {
                        let outcome = classify(url, fetch::scan(fetcher, url));
                        if result_tx.send((idx, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(task_rx);
            drop(result_tx);

            scope.spawn(move || {
                for task in urls.iter().map(String::as_str).enumerate() {
                    if task_tx.send(task).is_err() {
                        break;
                    }
                }
            });

            for (done, (idx, outcome)) in result_rx.iter().enumerate() {
                slots[idx] = Some(outcome);
                progress(done + 1, total);
            }
        });

        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    Scraped::Failed(FailureReason::Fetch("scrape worker returned no result".into()))
                })
            })
            .collect()
    }
}

fn report_metrics(metrics: &RunMetrics) {
    info!(
        elapsed_ms = metrics.elapsed_ms,
        pages_requested = metrics.pages_requested,
        pages_scraped = metrics.pages_scraped,
        invalid_protocol = metrics.invalid_protocol,
        fetch_errors = metrics.fetch_errors,
        duplicate_bodies = metrics.duplicate_bodies,
        empty_pages = metrics.empty_pages,
        queries = metrics.queries,
        empty_queries = metrics.empty_queries,
        vocabulary_size = metrics.vocabulary_size,
        "analysis complete"
    );
}
