//! Page retrieval: protocol screening plus a blocking HTTP fetcher.

use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::controls::AnalysisControls;
use crate::normalizer::FetchedPage;

/// Errors surfaced while retrieving a page.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The URL passed protocol screening but could not be parsed.
    #[error("invalid url {url}: {source}")]
    InvalidUrl {
        /// Offending URL.
        url: String,
        /// Parser failure.
        source: url::ParseError,
    },
    /// The HTTP client could not be constructed.
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
    /// Network, TLS, redirect or body read failure.
    #[error("http error for {url}: {source}")]
    Transport {
        /// Requested URL.
        url: String,
        /// Underlying client error.
        source: reqwest::Error,
    },
    /// The server answered with a non-success status.
    #[error("{url} responded with status {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },
}

/// Collaborator that turns a URL into raw page content.
///
/// Implementations must be shareable across the scrape worker pool.
pub trait PageFetcher: Sync {
    /// Retrieves `url`, which has already passed [`resolve_protocol`].
    fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

impl<F: PageFetcher + ?Sized> PageFetcher for &F {
    fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        (**self).fetch(url)
    }
}

/// Returns the URL to request, or `None` unless `url` starts with `http://`,
/// `https://` or `//`. Protocol-relative URLs are requested over `https:`.
pub fn resolve_protocol(url: &str) -> Option<String> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Some(url.to_string())
    } else if url.starts_with("//") {
        Some(format!("https:{url}"))
    } else {
        None
    }
}

/// Screens `url` and fetches it.
///
/// A URL with an unaccepted protocol is logged and skipped: the result is
/// `Ok(None)` and nothing is requested. A page answered with a non-2xx status
/// is a [`FetchError::Status`], whichever fetcher produced it. The returned
/// page keeps the URL as registered, not the resolved form.
pub fn scan<F: PageFetcher + ?Sized>(
    fetcher: &F,
    url: &str,
) -> Result<Option<FetchedPage>, FetchError> {
    let Some(resolved) = resolve_protocol(url) else {
        warn!(url, "url does not appear to have a valid protocol; skipping");
        return Ok(None);
    };
    Url::parse(&resolved).map_err(|source| FetchError::InvalidUrl {
        url: url.to_string(),
        source,
    })?;

    let mut page = fetcher.fetch(&resolved)?;
    if !(200..300).contains(&page.status) {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: page.status,
        });
    }
    page.url = url.to_string();
    Ok(Some(page))
}

/// Blocking fetcher backed by a shared `reqwest` client.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    max_retries: usize,
}

impl HttpFetcher {
    /// Builds a fetcher from the run controls.
    pub fn new(controls: &AnalysisControls) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(controls.user_agent())
            .redirect(reqwest::redirect::Policy::limited(controls.max_redirects()))
            .timeout(controls.request_timeout())
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self {
            client,
            max_retries: controls.max_retries().max(1),
        })
    }

    fn should_retry(&self, status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }

    fn is_retryable_error(&self, err: &reqwest::Error) -> bool {
        err.is_timeout() || err.is_connect() || err.is_body()
    }

    fn retry_backoff(&self, attempt: usize) -> Duration {
        let capped = attempt.min(4) as u32;
        Duration::from_millis(250 * (1 << capped))
    }

    fn read_page(url: &str, response: Response) -> Result<FetchedPage, FetchError> {
        let status = response.status().as_u16();
        let content_type = header_to_string(response.headers());
        let body = response
            .bytes()
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?
            .to_vec();
        let mut page = FetchedPage::new(url, status, body);
        page.content_type = content_type;
        Ok(page)
    }
}

impl PageFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let mut attempt = 0usize;
        loop {
            match self.client.get(url).send() {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Self::read_page(url, response);
                    }
                    if self.should_retry(status) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        debug!(url, %status, attempt, "retrying page fetch");
                        thread::sleep(self.retry_backoff(attempt));
                        continue;
                    }
                    return Err(FetchError::Status {
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                }
                Err(err) => {
                    if self.is_retryable_error(&err) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        debug!(url, error = %err, attempt, "retrying page fetch");
                        thread::sleep(self.retry_backoff(attempt));
                        continue;
                    }
                    return Err(FetchError::Transport {
                        url: url.to_string(),
                        source: err,
                    });
                }
            }
        }
    }
}

fn header_to_string(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
