// src/monitor/compose.rs
use chrono::{DateTime, Utc};
use html_escape::{encode_double_quoted_attribute, encode_text};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::Write as _;

use crate::ingest::types::UpdateRecord;
use crate::monitor::merge::UpdateLog;

pub const ITEMS_PER_SOURCE: usize = 3;
pub const EXCERPT_CHARS: usize = 300;
pub const SUBJECT: &str = "EU Regulatory Compliance Alert - Important Updates";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationItem {
    pub title: String,
    pub date: String,
    pub excerpt: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSection {
    pub source: String,
    pub items: Vec<NotificationItem>,
}

/// What the dispatcher delivers to each recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertNotification {
    pub subject: String,
    pub matched_count: usize,
    pub generated_at: DateTime<Utc>,
    pub sections: Vec<SourceSection>,
}

/// `s` cut to `max` chars, with an ellipsis when something was dropped.
pub fn excerpt(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push('…');
    out
}

/// Newest first; equal discovery times rank the later append first.
fn most_recent(records: &[UpdateRecord], n: usize) -> Vec<&UpdateRecord> {
    let mut v: Vec<&UpdateRecord> = records.iter().rev().collect();
    // stable: reversed insertion order survives among equal timestamps
    v.sort_by(|a, b| b.discovered_at.cmp(&a.discovered_at));
    v.truncate(n);
    v
}

/// Build the digest for the sources that received new records this cycle.
pub fn compose(
    log: &UpdateLog,
    sources_changed: &BTreeSet<String>,
    matched_count: usize,
    now: DateTime<Utc>,
) -> AlertNotification {
    let sections = sources_changed
        .iter()
        .filter_map(|source| {
            let items: Vec<NotificationItem> = most_recent(log.source(source), ITEMS_PER_SOURCE)
                .into_iter()
                .map(|r| NotificationItem {
                    title: r.title.clone(),
                    date: r.date.clone(),
                    excerpt: excerpt(&r.content, EXCERPT_CHARS),
                    url: r.url.clone(),
                })
                .collect();
            (!items.is_empty()).then(|| SourceSection {
                source: source.clone(),
                items,
            })
        })
        .collect();

    AlertNotification {
        subject: SUBJECT.to_string(),
        matched_count,
        generated_at: now,
        sections,
    }
}

impl AlertNotification {
    pub fn item_count(&self) -> usize {
        self.sections.iter().map(|s| s.items.len()).sum()
    }

    pub fn text_body(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "EU Regulatory Compliance Alert\n{} new regulatory updates in the alert window.\n",
            self.matched_count
        );
        for section in &self.sections {
            let _ = writeln!(out, "== {} ==", section.source.to_uppercase());
            for it in &section.items {
                let _ = writeln!(out, "* {}", it.title);
                let _ = writeln!(out, "  Date: {}", it.date);
                if !it.excerpt.is_empty() {
                    let _ = writeln!(out, "  {}", it.excerpt);
                }
                if !it.url.is_empty() {
                    let _ = writeln!(out, "  {}", it.url);
                }
            }
            out.push('\n');
        }
        out.push_str(FOOTER_TEXT);
        out
    }

    pub fn html_body(&self) -> String {
        let mut out = String::from(
            "<html><body style=\"font-family: Arial, sans-serif; line-height: 1.6;\">\
             <h2>EU Regulatory Compliance Alert</h2>\
             <p>Important updates to EU regulations that may affect your compliance obligations.</p>",
        );
        for section in &self.sections {
            let _ = write!(
                out,
                "<div style=\"border-left: 4px solid #007bff; padding: 10px; margin-bottom: 16px;\"><h3>{}</h3>",
                encode_text(&section.source.to_uppercase())
            );
            for it in &section.items {
                let _ = write!(
                    out,
                    "<div><h4>{}</h4><p><strong>Date:</strong> {}</p><p>{}</p>",
                    encode_text(&it.title),
                    encode_text(&it.date),
                    encode_text(&it.excerpt)
                );
                if !it.url.is_empty() {
                    let _ = write!(
                        out,
                        "<p><a href=\"{}\">Read more</a></p>",
                        encode_double_quoted_attribute(&it.url)
                    );
                }
                out.push_str("</div>");
            }
            out.push_str("</div>");
        }
        let _ = write!(out, "<p>{}</p></body></html>", encode_text(FOOTER_TEXT.trim()));
        out
    }
}

const FOOTER_TEXT: &str = "These updates may impact your compliance obligations. \
We recommend reviewing them with your legal team.\n\
This is an automated alert from the EU Regulatory Compliance Monitoring Service.\n";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::{FetchBatch, FetchedUpdate};
    use crate::monitor::merge::merge;
    use chrono::{Duration, TimeZone};

    fn batch(titles: &[&str]) -> FetchBatch {
        let mut b = FetchBatch::new();
        b.insert(
            "eur-lex".into(),
            titles
                .iter()
                .map(|t| FetchedUpdate {
                    source: "eur-lex".into(),
                    title: t.to_string(),
                    date: "2025-09-10".into(),
                    content: format!("About {t}"),
                    url: format!("https://eur-lex.europa.eu/{t}"),
                })
                .collect(),
        );
        b
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 10, 8, 0, 0).unwrap()
    }

    #[test]
    fn at_most_three_newest_per_source() {
        let log = merge(&UpdateLog::new(), batch(&["A", "B"]), t0()).log;
        let out = merge(&log, batch(&["C", "D"]), t0() + Duration::hours(1));
        let n = compose(&out.log, &out.sources_changed, 4, t0());

        assert_eq!(n.sections.len(), 1);
        let titles: Vec<_> = n.sections[0].items.iter().map(|i| i.title.as_str()).collect();
        // C and D share a timestamp: the later append (D) comes first.
        assert_eq!(titles, vec!["D", "C", "B"]);
    }

    #[test]
    fn unchanged_sources_are_left_out() {
        let out = merge(&UpdateLog::new(), batch(&["A"]), t0());
        let n = compose(&out.log, &BTreeSet::new(), 1, t0());
        assert!(n.sections.is_empty());
        assert_eq!(n.item_count(), 0);
    }

    #[test]
    fn long_content_is_excerpted() {
        let long = "x".repeat(EXCERPT_CHARS + 50);
        let e = excerpt(&long, EXCERPT_CHARS);
        assert_eq!(e.chars().count(), EXCERPT_CHARS + 1);
        assert!(e.ends_with('…'));
        assert_eq!(excerpt("short", EXCERPT_CHARS), "short");
    }

    #[test]
    fn bodies_render_and_escape() {
        let mut b = batch(&["A"]);
        b.get_mut("eur-lex").unwrap()[0].title = "Rules <on> data & AI".into();
        let out = merge(&UpdateLog::new(), b, t0());
        let n = compose(&out.log, &out.sources_changed, 1, t0());

        let text = n.text_body();
        assert!(text.contains("== EUR-LEX =="));
        assert!(text.contains("Rules <on> data & AI"));

        let html = n.html_body();
        assert!(html.contains("Rules &lt;on&gt; data &amp; AI"));
        assert!(html.contains("href=\"https://eur-lex.europa.eu/A\""));
    }
}
