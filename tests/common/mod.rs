// tests/common/mod.rs
// Test doubles shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use eu_compliance_monitor::ingest::types::{FetchedUpdate, UpdateFetcher};
use eu_compliance_monitor::monitor::compose::AlertNotification;
use eu_compliance_monitor::notify::AlertDispatcher;
use eu_compliance_monitor::recipients::Recipient;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 10, 8, 0, 0).unwrap()
}

pub fn update(source: &str, title: &str) -> FetchedUpdate {
    FetchedUpdate {
        source: source.into(),
        title: title.into(),
        date: "2025-09-10".into(),
        content: format!("{title} body"),
        url: format!("https://eur-lex.europa.eu/{}", title.replace(' ', "_")),
    }
}

#[derive(Default)]
struct FetcherState {
    titles: Mutex<Vec<String>>,
    fail: AtomicBool,
    panic: AtomicBool,
    delay_ms: AtomicUsize,
    calls: AtomicUsize,
}

/// Returns whatever titles were last configured. Clones share state, so a
/// test can keep one handle and box another into the pipeline.
#[derive(Clone)]
pub struct StaticFetcher {
    source: String,
    state: Arc<FetcherState>,
}

impl StaticFetcher {
    pub fn new(source: &str, titles: &[&str]) -> Self {
        let f = Self {
            source: source.to_string(),
            state: Arc::new(FetcherState::default()),
        };
        f.set(titles);
        f
    }

    pub fn set(&self, titles: &[&str]) {
        *self.state.titles.lock().unwrap() = titles.iter().map(|t| t.to_string()).collect();
    }

    pub fn fail(&self, on: bool) {
        self.state.fail.store(on, Ordering::SeqCst);
    }

    pub fn panic(&self, on: bool) {
        self.state.panic.store(on, Ordering::SeqCst);
    }

    pub fn delay(&self, d: Duration) {
        self.state.delay_ms.store(d.as_millis() as usize, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    pub fn boxed(&self) -> Box<dyn UpdateFetcher> {
        Box::new(self.clone())
    }
}

#[async_trait]
impl UpdateFetcher for StaticFetcher {
    async fn fetch(&self, _oj_date: &str) -> Result<Vec<FetchedUpdate>> {
        self.state.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.state.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        if self.state.panic.load(Ordering::SeqCst) {
            panic!("fetcher blew up");
        }
        if self.state.fail.load(Ordering::SeqCst) {
            bail!("{} unreachable", self.source);
        }
        let titles = self.state.titles.lock().unwrap().clone();
        Ok(titles.iter().map(|t| update(&self.source, t)).collect())
    }

    fn source(&self) -> &str {
        &self.source
    }
}

/// Records deliveries; addresses in `failing` are refused.
#[derive(Default)]
pub struct RecordingDispatcher {
    pub sent: Mutex<Vec<(String, usize)>>,
    failing: HashSet<String>,
}

impl RecordingDispatcher {
    pub fn failing_for(addrs: &[&str]) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: addrs.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn sent_to(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(to, _)| to.clone()).collect()
    }
}

#[async_trait]
impl AlertDispatcher for RecordingDispatcher {
    async fn deliver(&self, recipient: &Recipient, n: &AlertNotification) -> Result<()> {
        if self.failing.contains(&recipient.email) {
            bail!("mailbox {} rejected the message", recipient.email);
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient.email.clone(), n.item_count()));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

pub fn recipients(addrs: &[&str]) -> Vec<Recipient> {
    addrs.iter().map(|a| Recipient::new(*a)).collect()
}
