//! Run controls and the command-line surface that builds them.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// User agent sent with every page request.
pub const USER_AGENT: &str = "cannibalizer/0.1 (+keyword cannibalization audit)";

/// Tunable knobs that bound how pages are retrieved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalysisControls {
    fetch_threads: usize,
    request_timeout: Duration,
    max_retries: usize,
    max_redirects: usize,
    user_agent: String,
}

impl AnalysisControls {
    /// Constructs a new set of analysis controls.
    pub fn new(
        fetch_threads: usize,
        request_timeout: Duration,
        max_retries: usize,
        max_redirects: usize,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            fetch_threads: fetch_threads.max(1),
            request_timeout,
            max_retries: max_retries.max(1),
            max_redirects,
            user_agent: user_agent.into(),
        }
    }

    /// Number of pages fetched concurrently. `1` scrapes strictly in order.
    pub fn fetch_threads(&self) -> usize {
        self.fetch_threads
    }

    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Attempts per page, including the first, for retryable failures.
    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// Redirects followed before a fetch fails.
    pub fn max_redirects(&self) -> usize {
        self.max_redirects
    }

    /// User agent header value.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

impl Default for AnalysisControls {
    fn default() -> Self {
        Self {
            fetch_threads: 1,
            request_timeout: Duration::from_secs(10),
            max_retries: 3,
            max_redirects: 5,
            user_agent: USER_AGENT.to_string(),
        }
    }
}

/// Command-line interface of the `cannibalizer` binary.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "cannibalizer",
    about = "Score pages against target search queries to spot keyword cannibalization"
)]
pub struct Cli {
    /// JSON file with `queries` and `urls` arrays
    #[arg(long, env = "CANNIBALIZER_INPUT")]
    pub input: Option<PathBuf>,

    /// Search-analytics export (`{"rows": [{"keys": [date, page, query], "clicks": n}]}`)
    #[arg(long, env = "CANNIBALIZER_ANALYTICS")]
    pub analytics: Option<PathBuf>,

    /// Extra target query (repeatable)
    #[arg(long = "query")]
    pub queries: Vec<String>,

    /// Extra page URL (repeatable)
    #[arg(long = "url")]
    pub urls: Vec<String>,

    /// Pages fetched concurrently
    #[arg(long, env = "CANNIBALIZER_FETCH_THREADS", default_value_t = 1)]
    pub fetch_threads: usize,

    /// Seconds before a page request times out
    #[arg(long, env = "CANNIBALIZER_TIMEOUT_SECS", default_value_t = 10)]
    pub timeout_secs: u64,

    /// Attempts per page for rate limits and transient errors
    #[arg(long, env = "CANNIBALIZER_MAX_RETRIES", default_value_t = 3)]
    pub max_retries: usize,

    /// Redirects followed per page
    #[arg(long, env = "CANNIBALIZER_MAX_REDIRECTS", default_value_t = 5)]
    pub max_redirects: usize,

    /// User agent sent with page requests
    #[arg(long, env = "CANNIBALIZER_USER_AGENT", default_value = USER_AGENT)]
    pub user_agent: String,

    /// Print column-normalized scores (each column divided by its maximum)
    #[arg(long, env = "CANNIBALIZER_NORMALIZE", default_value_t = false)]
    pub normalize: bool,

    /// Minimum raw score for a page to count as competing for a query
    #[arg(long, env = "CANNIBALIZER_THRESHOLD", default_value_t = 0.1)]
    pub threshold: f64,

    /// Optional JSON report output path
    #[arg(long, env = "CANNIBALIZER_REPORT")]
    pub report_json: Option<PathBuf>,
}

impl Cli {
    /// Converts the parsed CLI into `AnalysisControls`.
    pub fn build_controls(&self) -> AnalysisControls {
        AnalysisControls::new(
            self.fetch_threads,
            Duration::from_secs(self.timeout_secs.max(1)),
            self.max_retries,
            self.max_redirects,
            self.user_agent.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controls_clamp_thread_and_retry_counts() {
        let controls = AnalysisControls::new(0, Duration::from_secs(2), 0, 3, "ua");
        assert_eq!(controls.fetch_threads(), 1);
        assert_eq!(controls.max_retries(), 1);
        assert_eq!(controls.user_agent(), "ua");
    }

    #[test]
    fn cli_builds_controls_from_flags() {
        let cli = Cli::parse_from([
            "cannibalizer",
            "--query",
            "red widgets",
            "--query",
            "blue gizmos",
            "--url",
            "https://a.example/widgets",
            "--fetch-threads",
            "4",
            "--timeout-secs",
            "3",
        ]);
        assert_eq!(cli.queries, vec!["red widgets", "blue gizmos"]);
        assert_eq!(cli.urls, vec!["https://a.example/widgets"]);
        let controls = cli.build_controls();
        assert_eq!(controls.fetch_threads(), 4);
        assert_eq!(controls.request_timeout(), Duration::from_secs(3));
        assert_eq!(controls.user_agent(), USER_AGENT);
    }
}
