// src/ingest/providers/eurlex.rs
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use metrics::counter;
use once_cell::sync::OnceCell;
use regex::Regex;
use reqwest::{StatusCode, Url};
use std::time::Duration;

use crate::ingest::date::oj_date_to_iso;
use crate::ingest::types::{FetchedUpdate, UpdateFetcher};
use crate::ingest::{normalize_text, truncate_chars};

pub const SOURCE: &str = "eur-lex";
pub const DAILY_VIEW_URL: &str = "https://eur-lex.europa.eu/oj/daily-view/L-series/default.html";

const TITLE_FALLBACK_CHARS: usize = 200;
const CONTENT_CHARS: usize = 800;

/// EUR-Lex Official Journal (L series) daily view, addressed by `ojDate`.
pub struct EurLexDailyProvider {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http {
        base: String,
        client: reqwest::Client,
        max_retries: u8,
        max_delay: Duration,
    },
}

impl EurLexDailyProvider {
    /// Parse a captured daily-view page instead of hitting the network.
    pub fn from_fixture_str(html: &str) -> Self {
        Self {
            mode: Mode::Fixture(html.to_string()),
        }
    }

    pub fn from_url(base: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(
                "eu-compliance-monitor/",
                env!("CARGO_PKG_VERSION")
            ))
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .context("building eur-lex http client")?;
        Ok(Self {
            mode: Mode::Http {
                base: base.into(),
                client,
                max_retries: 3,
                max_delay: Duration::from_secs(5),
            },
        })
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        if let Mode::Http { max_retries, .. } = &mut self.mode {
            *max_retries = retries;
        }
        self
    }

    pub fn daily_url(base: &str, oj_date: &str) -> String {
        format!("{base}?&ojDate={oj_date}")
    }

    async fn get_with_retries(
        client: &reqwest::Client,
        url: &str,
        max_retries: u8,
        max_delay: Duration,
    ) -> Result<String> {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let err = match client.get(url).send().await {
                Ok(rsp) if rsp.status().is_success() => {
                    return rsp.text().await.context("eur-lex body");
                }
                Ok(rsp) if rsp.status() == StatusCode::TOO_MANY_REQUESTS => {
                    let wait = rsp
                        .headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.trim().parse::<u64>().ok())
                        .map(Duration::from_secs)
                        .unwrap_or(max_delay);
                    tracing::warn!(target: "ingest", ?wait, attempt, "eur-lex rate limited");
                    if attempt <= max_retries {
                        tokio::time::sleep(wait).await;
                        continue;
                    }
                    anyhow!("eur-lex rate limited, retries exhausted")
                }
                Ok(rsp) => anyhow!("eur-lex HTTP {}", rsp.status()),
                Err(e) => anyhow!("eur-lex request failed: {e}"),
            };

            if attempt > max_retries {
                return Err(err.context(format!("max retries exceeded for {url}")));
            }
            tracing::info!(target: "ingest", attempt, max_retries, error = %err, "retrying eur-lex");
            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1).min(6))).await;
        }
    }
}

fn re_row() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)<div[^>]*\bclass\s*=\s*"[^"]*daily-view-row-spacing[^"]*"[^>]*>"#)
            .expect("row regex")
    })
}

fn re_anchor() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*"([^"]*)"[^>]*>(.*?)</a>"#).expect("anchor regex")
    })
}

fn re_para() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?is)<p(?:\s[^>]*)?>(.*?)</p>").expect("para regex"))
}

/// Extract one update per `daily-view-row-spacing` container.
///
/// A row runs from its opening tag to the next row's opening tag. Title and
/// link come from the first anchor; without one, the row text is the title.
pub fn parse_daily_view(html: &str, page_url: &str, oj_date: &str) -> Result<Vec<FetchedUpdate>> {
    let date = oj_date_to_iso(oj_date)?;
    let base = Url::parse(page_url).with_context(|| format!("bad page url {page_url}"))?;

    let starts: Vec<usize> = re_row().find_iter(html).map(|m| m.start()).collect();
    tracing::debug!(target: "ingest", rows = starts.len(), "eur-lex row containers");

    let mut out = Vec::with_capacity(starts.len());
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(html.len());
        let row = &html[start..end];

        let (title, url) = match re_anchor().captures(row) {
            Some(c) => {
                let href = html_escape::decode_html_entities(&c[1]).to_string();
                let url = base
                    .join(href.trim())
                    .map(|u| u.to_string())
                    .unwrap_or_default();
                (normalize_text(&c[2]), url)
            }
            None => (
                truncate_chars(&normalize_text(row), TITLE_FALLBACK_CHARS),
                String::new(),
            ),
        };
        if title.is_empty() {
            continue;
        }

        let content = re_para()
            .captures(row)
            .map(|c| truncate_chars(&normalize_text(&c[1]), CONTENT_CHARS))
            .unwrap_or_default();

        out.push(FetchedUpdate {
            source: SOURCE.to_string(),
            title,
            date: date.clone(),
            content,
            url,
        });
    }
    Ok(out)
}

#[async_trait]
impl UpdateFetcher for EurLexDailyProvider {
    async fn fetch(&self, oj_date: &str) -> Result<Vec<FetchedUpdate>> {
        match &self.mode {
            Mode::Fixture(html) => parse_daily_view(html, DAILY_VIEW_URL, oj_date),
            Mode::Http {
                base,
                client,
                max_retries,
                max_delay,
            } => {
                let url = Self::daily_url(base, oj_date);
                tracing::info!(target: "ingest", %url, "fetching eur-lex daily view");
                let body = match Self::get_with_retries(client, &url, *max_retries, *max_delay).await {
                    Ok(b) => b,
                    Err(e) => {
                        counter!("ingest_http_errors_total").increment(1);
                        return Err(e);
                    }
                };
                parse_daily_view(&body, &url, oj_date)
            }
        }
    }

    fn source(&self) -> &str {
        SOURCE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<div class="panel">
  <div class="row daily-view-row-spacing">
    <a href="/legal-content/EN/TXT/?uri=OJ:L_202501234">Commission Regulation (EU) 2025/1234 &amp; annex</a>
    <p>Laying down   rules on <b>data</b> access.</p>
  </div>
  <div class="daily-view-row-spacing col">
    Corrigendum without a link
  </div>
</div>"#;

    #[test]
    fn rows_become_updates() {
        let out = parse_daily_view(PAGE, DAILY_VIEW_URL, "10092025").unwrap();
        assert_eq!(out.len(), 2);

        assert_eq!(out[0].title, "Commission Regulation (EU) 2025/1234 & annex");
        assert_eq!(
            out[0].url,
            "https://eur-lex.europa.eu/legal-content/EN/TXT/?uri=OJ:L_202501234"
        );
        assert_eq!(out[0].content, "Laying down rules on data access.");
        assert_eq!(out[0].date, "2025-09-10");
        assert_eq!(out[0].source, SOURCE);

        assert_eq!(out[1].url, "");
        assert!(out[1].title.starts_with("Corrigendum without a link"));
        assert_eq!(out[1].content, "");
    }

    #[test]
    fn page_without_rows_is_empty() {
        let out = parse_daily_view("<html><body>No OJ today</body></html>", DAILY_VIEW_URL, "10092025").unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn daily_url_carries_oj_date() {
        assert_eq!(
            EurLexDailyProvider::daily_url(DAILY_VIEW_URL, "10092025"),
            "https://eur-lex.europa.eu/oj/daily-view/L-series/default.html?&ojDate=10092025"
        );
    }
}
