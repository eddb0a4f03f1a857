use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use cannibalizer::{
    AnalysisError, Detector, FailureReason, FetchError, FetchedPage, PageFetcher, TextNormalizer,
};
use pretty_assertions::assert_eq;

/// In-memory fetcher: known URLs return their HTML, everything else a 404.
struct StubFetcher {
    pages: HashMap<String, String>,
    delay_for: fn(&str) -> Duration,
}

impl StubFetcher {
    fn new(pages: &[(&str, &str)]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|(url, html)| (url.to_string(), html.to_string()))
                .collect(),
            delay_for: |_| Duration::ZERO,
        }
    }
}

impl PageFetcher for StubFetcher {
    fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        thread::sleep((self.delay_for)(url));
        match self.pages.get(url) {
            Some(html) => Ok(FetchedPage::new(url, 200, html.clone().into_bytes())
                .with_content_type("text/html; charset=utf-8")),
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

const WIDGETS: &str = "http://a.example/widgets";
const GIZMOS: &str = "http://a.example/gizmos";

fn shop() -> StubFetcher {
    StubFetcher::new(&[
        (
            WIDGETS,
            "<html><head><style>p { color: red }</style></head>\
             <body><p>Buy red widgets online</p><script>track()</script></body></html>",
        ),
        (GIZMOS, "<html><body><p>Buy blue gizmos online</p></body></html>"),
    ])
}

#[test]
fn each_page_scores_highest_on_its_own_query() {
    let normalizer = TextNormalizer::new();
    let mut detector = Detector::new(&normalizer, shop());
    let analysis = detector
        .analyze(&[WIDGETS, GIZMOS], &["red widgets", "blue gizmos"])
        .unwrap();

    assert_eq!(analysis.pages, vec![WIDGETS, GIZMOS]);
    assert_eq!(analysis.queries, vec!["red widgets", "blue gizmos"]);
    let widgets_red = analysis.score(WIDGETS, "red widgets").unwrap();
    let widgets_blue = analysis.score(WIDGETS, "blue gizmos").unwrap();
    let gizmos_red = analysis.score(GIZMOS, "red widgets").unwrap();
    let gizmos_blue = analysis.score(GIZMOS, "blue gizmos").unwrap();
    assert!(widgets_red > widgets_blue, "{widgets_red} <= {widgets_blue}");
    assert!(gizmos_blue > gizmos_red, "{gizmos_blue} <= {gizmos_red}");
    assert_eq!(analysis.matrix.best_page(0).map(|(row, _)| row), Some(0));
    assert_eq!(analysis.matrix.best_page(1).map(|(row, _)| row), Some(1));
    assert!(analysis.failures.is_empty());
}

#[test]
fn one_failed_page_leaves_two_rows() {
    let normalizer = TextNormalizer::new();
    let mut detector = Detector::new(&normalizer, shop());
    let missing = "http://a.example/missing";
    let analysis = detector
        .analyze(&[WIDGETS, missing, GIZMOS], &["red widgets"])
        .unwrap();

    assert_eq!(analysis.matrix.rows(), 2);
    assert_eq!(analysis.pages, vec![WIDGETS, GIZMOS]);
    assert_eq!(analysis.failures.urls(), vec![missing]);
    assert_eq!(analysis.page_metadata.len(), 2);
    assert_eq!(
        analysis.page_metadata[0].content_type.as_deref(),
        Some("text/html; charset=utf-8")
    );
}

#[test]
fn missing_queries_or_pages_are_invalid_input() {
    let normalizer = TextNormalizer::new();
    let mut detector = Detector::new(&normalizer, shop());
    let no_queries: [&str; 0] = [];
    let no_pages: [&str; 0] = [];

    let err = detector.analyze(&[WIDGETS], &no_queries).unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidInput(_)), "{err}");
    let err = detector.analyze(&no_pages, &["red widgets"]).unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidInput(_)), "{err}");
}

#[test]
fn every_page_failing_is_an_empty_vocabulary() {
    let normalizer = TextNormalizer::new();
    let mut detector = Detector::new(&normalizer, shop());
    let err = detector
        .analyze(&["ftp://a.example/widgets", "http://a.example/nope"], &["red widgets"])
        .unwrap_err();

    let report = match err {
        AnalysisError::VocabularyEmpty { report } => report,
        other => panic!("expected VocabularyEmpty, got {other}"),
    };
    assert_eq!(
        report.urls(),
        vec!["ftp://a.example/widgets", "http://a.example/nope"]
    );
    let reasons: Vec<&FailureReason> = report.iter().map(|f| &f.reason).collect();
    assert_eq!(reasons[0], &FailureReason::InvalidProtocol);
}

#[test]
fn queries_never_change_the_vocabulary_but_pages_do() {
    let normalizer = TextNormalizer::new();
    let mut detector = Detector::new(&normalizer, shop());

    let base = detector.analyze(&[WIDGETS], &["red widgets"]).unwrap();
    let more_queries = detector
        .analyze(&[WIDGETS], &["red widgets", "purple elephants"])
        .unwrap();
    let more_pages = detector
        .analyze(&[WIDGETS, GIZMOS], &["red widgets"])
        .unwrap();

    assert_eq!(
        base.metrics.vocabulary_size,
        more_queries.metrics.vocabulary_size
    );
    assert!(more_pages.metrics.vocabulary_size > base.metrics.vocabulary_size);
    assert_eq!(base.score(WIDGETS, "red widgets"), more_queries.score(WIDGETS, "red widgets"));
}

#[test]
fn empty_query_corpus_is_a_zero_column() {
    let normalizer = TextNormalizer::new();
    let mut detector = Detector::new(&normalizer, shop());
    let analysis = detector
        .analyze(&[WIDGETS, GIZMOS], &["the and of", "zebra", "red widgets"])
        .unwrap();

    assert_eq!(analysis.matrix.columns(), 3);
    assert_eq!(analysis.matrix.column(0), Some(vec![0.0, 0.0]));
    assert_eq!(analysis.matrix.column(1), Some(vec![0.0, 0.0]));
    assert_eq!(analysis.metrics.empty_queries, 1);
    assert!(analysis.score(WIDGETS, "red widgets").unwrap() > 0.0);
}

#[test]
fn worker_pool_preserves_input_order() {
    let urls: Vec<String> = (0..8).map(|i| format!("http://a.example/{i}")).collect();
    let pages: Vec<(String, String)> = urls
        .iter()
        .enumerate()
        .map(|(i, url)| (url.clone(), format!("<p>page number {i} about topic{i}</p>")))
        .collect();
    let borrowed: Vec<(&str, &str)> = pages
        .iter()
        .map(|(url, html)| (url.as_str(), html.as_str()))
        .collect();
    let mut fetcher = StubFetcher::new(&borrowed);
    // Earlier pages finish later.
    fetcher.delay_for = |url| {
        let idx: u64 = url.rsplit('/').next().and_then(|s| s.parse().ok()).unwrap_or(0);
        Duration::from_millis((8 - idx) * 5)
    };

    let normalizer = TextNormalizer::new();
    let mut detector = Detector::new(&normalizer, fetcher).with_fetch_threads(4);
    let mut progress = Vec::new();
    let analysis = detector
        .analyze_with_progress(&urls, &["topic3"], |done, total| progress.push((done, total)))
        .unwrap();

    assert_eq!(analysis.pages, urls);
    assert_eq!(progress.last(), Some(&(8, 8)));
    assert_eq!(progress.len(), 8);
    assert_eq!(analysis.matrix.best_page(0).map(|(row, _)| row), Some(3));
}

/// Answers every request with `Ok`, carrying a 404 status for `/gone`.
struct StatusFetcher;

impl PageFetcher for StatusFetcher {
    fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let status = if url.ends_with("/gone") { 404 } else { 200 };
        Ok(FetchedPage::new(url, status, b"<p>red widgets for sale</p>".to_vec()))
    }
}

#[test]
fn non_success_status_from_any_fetcher_is_a_failure() {
    let normalizer = TextNormalizer::new();
    let mut detector = Detector::new(&normalizer, StatusFetcher);
    let analysis = detector
        .analyze(&["http://a.example/ok", "http://a.example/gone"], &["red widgets"])
        .unwrap();

    assert_eq!(analysis.pages, vec!["http://a.example/ok"]);
    assert_eq!(analysis.matrix.rows(), 1);
    assert_eq!(analysis.failures.urls(), vec!["http://a.example/gone"]);
    let reasons: Vec<&FailureReason> = analysis.failures.iter().map(|f| &f.reason).collect();
    assert!(matches!(reasons[0], FailureReason::Fetch(msg) if msg.contains("404")));
}
