// src/ingest/mod.rs
pub mod date;
pub mod providers;
pub mod types;

use crate::error::MonitorError;
use crate::ingest::types::{FetchBatch, UpdateFetcher};
use metrics::{counter, describe_counter, describe_histogram};
use once_cell::sync::OnceCell;
use std::path::Path;
use std::time::Duration;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_items_total", "Items parsed from fetchers.");
        describe_counter!(
            "monitor_fetch_errors_total",
            "Fetcher errors and timeouts."
        );
        describe_histogram!("ingest_fetch_ms", "Fetch time per source in milliseconds.");
    });
}

/// Normalize scraped text: decode entities, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace (incl. nbsp left over from decoding)
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"[\s\u{00A0}]+").expect("ws regex"));
    out = re_ws.replace_all(&out, " ").to_string();
    out.trim().to_string()
}

/// Cap at `max` chars, on a char boundary.
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Outcome of asking every fetcher once.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub batch: FetchBatch,
    pub failures: Vec<MonitorError>,
}

impl FetchOutcome {
    pub fn fetched(&self) -> usize {
        self.batch.values().map(Vec::len).sum()
    }
}

/// Run every fetcher for `oj_date` under `timeout`.
///
/// A failing or slow source contributes an empty list and a `Fetch` error;
/// the remaining sources are still asked.
pub async fn fetch_all(
    fetchers: &[Box<dyn UpdateFetcher>],
    oj_date: &str,
    timeout: Duration,
    archive_dir: Option<&Path>,
) -> FetchOutcome {
    ensure_metrics_described();

    let mut out = FetchOutcome::default();
    for f in fetchers {
        let source = f.source().to_string();
        let t0 = std::time::Instant::now();
        let res = tokio::time::timeout(timeout, f.fetch(oj_date)).await;
        metrics::histogram!("ingest_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        let items = match res {
            Ok(Ok(items)) => items,
            Ok(Err(e)) => {
                tracing::warn!(target: "ingest", error = ?e, source = %source, "fetcher error");
                counter!("monitor_fetch_errors_total").increment(1);
                out.failures.push(MonitorError::Fetch {
                    feed: source.clone(),
                    reason: format!("{e:#}"),
                });
                Vec::new()
            }
            Err(_) => {
                tracing::warn!(target: "ingest", source = %source, ?timeout, "fetcher timed out");
                counter!("monitor_fetch_errors_total").increment(1);
                out.failures.push(MonitorError::Fetch {
                    feed: source.clone(),
                    reason: format!("timed out after {timeout:?}"),
                });
                Vec::new()
            }
        };

        counter!("ingest_items_total").increment(items.len() as u64);
        if !items.is_empty() {
            tracing::info!(target: "ingest", source = %source, oj_date, items = items.len(), "fetched");
            if let Some(dir) = archive_dir {
                if let Err(e) = archive_snapshot(dir, &source, &items) {
                    tracing::warn!(target: "ingest", error = ?e, source = %source, "snapshot not written");
                }
            }
        } else {
            tracing::info!(target: "ingest", source = %source, oj_date, "no items");
        }
        out.batch.entry(source).or_default().extend(items);
    }
    out
}

/// Keep a raw copy of what a source returned today: `<dir>/<source>_<YYYYMMDD>.json`.
fn archive_snapshot(
    dir: &Path,
    source: &str,
    items: &[types::FetchedUpdate],
) -> anyhow::Result<()> {
    let stamp = chrono::Utc::now().format("%Y%m%d");
    let path = dir.join(format!("{source}_{stamp}.json"));
    crate::store::write_json_atomic(&path, &items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_collapses_ws_and_tags() {
        let s = "  <b>Commission&nbsp;Implementing</b>\n  Regulation &ldquo;X&rdquo;  ";
        assert_eq!(normalize_text(s), r#"Commission Implementing Regulation "X""#);
    }

    #[test]
    fn normalize_keeps_trailing_punctuation() {
        assert_eq!(normalize_text("Decision (EU) 2025/1."), "Decision (EU) 2025/1.");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("žluťoučký", 3), "žlu");
        assert_eq!(truncate_chars("ab", 10), "ab");
    }
}
