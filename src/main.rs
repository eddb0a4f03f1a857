use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use cannibalizer::{
    click_totals, parse_response, Analysis, ClickTotal, Cli, Competition, Detector, HttpFetcher,
    ManualInput, RowOutcome, Targets, TextNormalizer,
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const PROGRESS_TEMPLATE: &str = "Scraping urls: [{bar:40}] {pos}/{len}";

#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    analysis: &'a Analysis,
    threshold: f64,
    competitions: Vec<Competition>,
    click_totals: Vec<ClickTotal>,
    skipped_rows: Vec<&'a RowOutcome>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cannibalizer=info")),
        )
        .init();

    let mut targets = Targets::new();
    if let Some(path) = &cli.input {
        let raw = read_file(path)?;
        let manual = ManualInput::from_json(&raw)
            .with_context(|| format!("invalid input file {:?}", path))?;
        targets.extend_manual(&manual);
    }
    let mut outcomes = Vec::new();
    if let Some(path) = &cli.analytics {
        let raw = read_file(path)?;
        outcomes = parse_response(&raw)
            .with_context(|| format!("invalid analytics export {:?}", path))?;
        for outcome in &outcomes {
            if let RowOutcome::Skipped { index, reason } = outcome {
                warn!(row = index, %reason, "skipping analytics row");
            }
        }
        targets.extend_rows(&outcomes);
    }
    for query in &cli.queries {
        targets.push_query(query);
    }
    for url in &cli.urls {
        targets.push_url(url);
    }
    info!(
        queries = targets.queries().len(),
        urls = targets.urls().len(),
        "loaded targets"
    );

    let controls = cli.build_controls();
    let normalizer = TextNormalizer::new();
    let fetcher = HttpFetcher::new(&controls).context("failed to build page fetcher")?;
    let mut detector =
        Detector::new(&normalizer, fetcher).with_fetch_threads(controls.fetch_threads());
    let progress = scrape_progress(targets.urls().len())?;
    let result = detector.analyze_with_progress(targets.urls(), targets.queries(), |done, total| {
        progress.set_length(total as u64);
        progress.set_position(done as u64);
    });
    progress.finish();
    let analysis = result.context("analysis failed")?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    write!(out, "{}", analysis.render_legend())?;
    writeln!(out)?;
    write!(out, "{}", analysis.render_matrix(cli.normalize))?;
    let competitions = analysis.competitions(cli.threshold);
    if !competitions.is_empty() {
        writeln!(out)?;
        writeln!(out, "Competing pages (raw score >= {}):", cli.threshold)?;
        for competition in &competitions {
            writeln!(out, "  {}", competition.query)?;
            for (url, score) in &competition.pages {
                writeln!(out, "    {score:.3}  {url}")?;
            }
        }
    }
    if !analysis.failures.is_empty() {
        writeln!(out)?;
        writeln!(out, "Failed pages:")?;
        for failure in analysis.failures.iter() {
            writeln!(out, "  {}  ({})", failure.url, failure.reason)?;
        }
    }
    out.flush()?;

    if let Some(path) = &cli.report_json {
        let report = JsonReport {
            analysis: &analysis,
            threshold: cli.threshold,
            competitions,
            click_totals: click_totals(&outcomes),
            skipped_rows: outcomes
                .iter()
                .filter(|outcome| matches!(outcome, RowOutcome::Skipped { .. }))
                .collect(),
        };
        let file =
            File::create(path).with_context(|| format!("failed to create {:?}", path))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &report)
            .with_context(|| format!("failed to write report {:?}", path))?;
        writer.flush()?;
        info!(path = %path.display(), "wrote json report");
    }
    Ok(())
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {:?}", path))
}

fn scrape_progress(pages: usize) -> Result<ProgressBar> {
    let style = ProgressStyle::with_template(PROGRESS_TEMPLATE)
        .context("invalid progress template")?
        .progress_chars("#>.");
    Ok(ProgressBar::new(pages as u64).with_style(style))
}
