//! Query sources: manual target lists and search-analytics exports.
//!
//! Whatever the source, the pipeline only consumes a flat, ordered,
//! de-duplicated list of queries and a flat list of page URLs.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;

/// Errors surfaced while reading a query source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The payload was not valid JSON or did not match the manual schema.
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    /// `rows` exists but is not an array.
    #[error("analytics response `rows` field is not an array")]
    RowsNotArray,
}

/// Manually supplied targets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualInput {
    /// Target search queries.
    #[serde(default)]
    pub queries: Vec<String>,
    /// Pages to compare against the queries.
    #[serde(default)]
    pub urls: Vec<String>,
}

impl ManualInput {
    /// Parses the `{"queries": [...], "urls": [...]}` document.
    pub fn from_json(json: &str) -> Result<Self, SourceError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// One search-analytics row: a query that led to a page on a day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalyticsRow {
    /// Day the clicks were recorded on.
    pub date: String,
    /// Landing page URL.
    pub page: String,
    /// Search query.
    pub query: String,
    /// Clicks from `query` to `page` that day.
    pub clicks: u64,
}

/// Why a row was left out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The row is not a JSON object.
    NotAnObject,
    /// `keys` is missing or holds fewer than `date, page, query`.
    MissingKeys {
        /// Number of keys present.
        found: usize,
    },
    /// The page key is empty.
    EmptyPage,
    /// The query key is empty.
    EmptyQuery,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "row is not an object"),
            Self::MissingKeys { found } => write!(f, "expected 3 keys, found {found}"),
            Self::EmptyPage => write!(f, "page key is empty"),
            Self::EmptyQuery => write!(f, "query key is empty"),
        }
    }
}

/// Result of reading one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RowOutcome {
    /// The row yielded usable fields.
    Parsed(AnalyticsRow),
    /// The row was skipped; `index` is its position in the response.
    Skipped {
        /// Position of the row in `rows`.
        index: usize,
        /// Why the row was skipped.
        reason: SkipReason,
    },
}

/// Reads every row of a search-analytics response.
///
/// A response without `rows` has no data and yields no outcomes. Missing
/// `date` and `clicks` default to an empty string and zero.
pub fn parse_response(json: &str) -> Result<Vec<RowOutcome>, SourceError> {
    let response: Value = serde_json::from_str(json)?;
    let rows = match response.get("rows") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(rows)) => rows,
        Some(_) => return Err(SourceError::RowsNotArray),
    };
    Ok(rows
        .iter()
        .enumerate()
        .map(|(index, row)| match parse_row(row) {
            Ok(parsed) => RowOutcome::Parsed(parsed),
            Err(reason) => RowOutcome::Skipped { index, reason },
        })
        .collect())
}

fn parse_row(row: &Value) -> Result<AnalyticsRow, SkipReason> {
    let object = row.as_object().ok_or(SkipReason::NotAnObject)?;
    let keys: Vec<String> = object
        .get("keys")
        .and_then(Value::as_array)
        .map(|keys| keys.iter().map(key_to_string).collect())
        .unwrap_or_default();
    if keys.len() < 3 {
        return Err(SkipReason::MissingKeys { found: keys.len() });
    }
    let page = keys[1].trim().to_string();
    let query = keys[2].trim().to_string();
    if page.is_empty() {
        return Err(SkipReason::EmptyPage);
    }
    if query.is_empty() {
        return Err(SkipReason::EmptyQuery);
    }
    let clicks = object
        .get("clicks")
        .and_then(Value::as_f64)
        .filter(|clicks| clicks.is_finite() && *clicks > 0.0)
        .map(|clicks| clicks as u64)
        .unwrap_or(0);
    Ok(AnalyticsRow {
        date: keys[0].clone(),
        page,
        query,
        clicks,
    })
}

fn key_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Clicks summed over every day for one (page, query) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClickTotal {
    /// Landing page URL.
    pub page: String,
    /// Search query.
    pub query: String,
    /// Total clicks.
    pub clicks: u64,
}

/// Ordered, de-duplicated queries and pages handed to the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Targets {
    queries: Vec<String>,
    urls: Vec<String>,
    #[serde(skip)]
    seen_queries: HashSet<String>,
    #[serde(skip)]
    seen_urls: HashSet<String>,
}

impl Targets {
    /// Empty target set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a query unless it is blank or already present.
    pub fn push_query(&mut self, query: &str) -> bool {
        push_unique(&mut self.queries, &mut self.seen_queries, query)
    }

    /// Adds a page URL unless it is blank or already present.
    pub fn push_url(&mut self, url: &str) -> bool {
        push_unique(&mut self.urls, &mut self.seen_urls, url)
    }

    /// Adds every query and URL of a manual input.
    pub fn extend_manual(&mut self, input: &ManualInput) {
        for query in &input.queries {
            self.push_query(query);
        }
        for url in &input.urls {
            self.push_url(url);
        }
    }

    /// Adds the query and page of every parsed row, in row order.
    pub fn extend_rows(&mut self, outcomes: &[RowOutcome]) {
        for row in parsed_rows(outcomes) {
            self.push_query(&row.query);
            self.push_url(&row.page);
        }
    }

    /// Queries in first-seen order.
    pub fn queries(&self) -> &[String] {
        &self.queries
    }

    /// Page URLs in first-seen order.
    pub fn urls(&self) -> &[String] {
        &self.urls
    }
}

fn push_unique(list: &mut Vec<String>, seen: &mut HashSet<String>, value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() || !seen.insert(value.to_string()) {
        return false;
    }
    list.push(value.to_string());
    true
}

fn parsed_rows(outcomes: &[RowOutcome]) -> impl Iterator<Item = &AnalyticsRow> {
    outcomes.iter().filter_map(|outcome| match outcome {
        RowOutcome::Parsed(row) => Some(row),
        RowOutcome::Skipped { .. } => None,
    })
}

/// Sums clicks per (page, query), ordered by first appearance.
pub fn click_totals(outcomes: &[RowOutcome]) -> Vec<ClickTotal> {
    let mut totals: Vec<ClickTotal> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();
    for row in parsed_rows(outcomes) {
        let key = (row.page.clone(), row.query.clone());
        match index.get(&key) {
            Some(&idx) => totals[idx].clicks += row.clicks,
            None => {
                index.insert(key, totals.len());
                totals.push(ClickTotal {
                    page: row.page.clone(),
                    query: row.query.clone(),
                    clicks: row.clicks,
                });
            }
        }
    }
    totals
}
