// src/ingest/date.rs
//! Official Journal date keys.
//!
//! EUR-Lex addresses a daily view by `ojDate=DDMMYYYY`. Callers hand us dates
//! in a few shapes; everything is funnelled into that compact key here.

use chrono::{DateTime, NaiveDate, TimeZone};
use once_cell::sync::OnceCell;
use regex::Regex;

use crate::error::{MonitorError, Result};

/// Anything the normalizer accepts.
#[derive(Debug, Clone, Copy)]
pub enum DateInput<'a> {
    Date(NaiveDate),
    Text(&'a str),
}

impl From<NaiveDate> for DateInput<'_> {
    fn from(d: NaiveDate) -> Self {
        DateInput::Date(d)
    }
}

impl<'a> From<&'a str> for DateInput<'a> {
    fn from(s: &'a str) -> Self {
        DateInput::Text(s)
    }
}

impl<'a> From<&'a String> for DateInput<'a> {
    fn from(s: &'a String) -> Self {
        DateInput::Text(s.as_str())
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for DateInput<'_> {
    fn from(dt: DateTime<Tz>) -> Self {
        DateInput::Date(dt.date_naive())
    }
}

fn re_iso() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$").expect("iso date regex"))
}

fn re_dmy() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"^(\d{2})-(\d{2})-(\d{4})$").expect("dmy date regex"))
}

fn re_compact() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"^(\d{2})(\d{2})(\d{4})$").expect("compact date regex"))
}

/// Normalize into the compact `DDMMYYYY` key used by the EUR-Lex daily view.
///
/// Accepted text shapes: `YYYY-MM-DD`, `DD-MM-YYYY` and `DDMMYYYY`, digits
/// only and fixed width. The result must also be a real calendar date.
pub fn to_oj_date<'a>(input: impl Into<DateInput<'a>>) -> Result<String> {
    let date = match input.into() {
        DateInput::Date(d) => d,
        DateInput::Text(raw) => parse_text(raw)?,
    };
    Ok(date.format("%d%m%Y").to_string())
}

fn parse_text(raw: &str) -> Result<NaiveDate> {
    let s = raw.trim();
    let ymd = |c: regex::Captures<'_>, y: usize, m: usize, d: usize| -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(c[y].parse().ok()?, c[m].parse().ok()?, c[d].parse().ok()?)
    };

    let date = if let Some(c) = re_iso().captures(s) {
        ymd(c, 1, 2, 3)
    } else if let Some(c) = re_dmy().captures(s) {
        ymd(c, 3, 2, 1)
    } else if let Some(c) = re_compact().captures(s) {
        ymd(c, 3, 2, 1)
    } else {
        None
    };
    date.ok_or_else(|| MonitorError::InvalidDateFormat(raw.to_string()))
}

/// `DDMMYYYY` -> `YYYY-MM-DD`, the nominal date stamped on scraped records.
pub fn oj_date_to_iso(oj_date: &str) -> Result<String> {
    let d = NaiveDate::parse_from_str(oj_date, "%d%m%Y")
        .map_err(|_| MonitorError::InvalidDateFormat(oj_date.to_string()))?;
    Ok(d.format("%Y-%m-%d").to_string())
}
