// src/store/mod.rs
//! Durable collections: update log, alert ledger, recipient registry.
//!
//! Each collection sits behind its own trait so the pipeline can run against
//! JSON files in production and an in-memory double in tests. Writes replace
//! the whole collection atomically (temp file + fsync + rename), so a reader
//! sees either the previous or the new state, never a mix.

mod json_file;
mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use crate::monitor::ledger::AlertEvent;
use crate::monitor::merge::UpdateLog;
use crate::recipients::Recipient;

pub trait UpdateLogStore: Send + Sync {
    fn load(&self) -> Result<UpdateLog>;
    /// Replace the whole log. Either all of it lands or nothing changes.
    fn replace(&self, log: &UpdateLog) -> Result<()>;
}

pub trait AlertLedgerStore: Send + Sync {
    fn events(&self) -> Result<Vec<AlertEvent>>;
    /// Append one event; it must be durable when this returns `Ok`.
    fn append(&self, event: &AlertEvent) -> Result<()>;
}

pub trait RecipientStore: Send + Sync {
    fn recipients(&self) -> Result<Vec<Recipient>>;
    fn upsert(&self, recipient: Recipient) -> Result<()>;
    /// Add `candidate` unless its email (case-insensitive) is already known.
    /// Lookup and insert happen under one write lock.
    fn register(&self, candidate: Recipient) -> Result<Registration>;
}

/// Result of `RecipientStore::register`.
#[derive(Debug, Clone, PartialEq)]
pub enum Registration {
    Created(Recipient),
    Existing(Recipient),
}

impl Registration {
    pub fn recipient(&self) -> &Recipient {
        match self {
            Registration::Created(r) | Registration::Existing(r) => r,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Registration::Created(_))
    }
}

/// Shared body of `register` for stores holding the whole registry in a `Vec`.
fn register_in(all: &mut Vec<Recipient>, candidate: Recipient) -> Registration {
    match all
        .iter()
        .find(|r| r.email.eq_ignore_ascii_case(&candidate.email))
    {
        Some(found) => Registration::Existing(found.clone()),
        None => {
            all.push(candidate.clone());
            Registration::Created(candidate)
        }
    }
}

/// The three collections a pipeline writes to, injected separately so a test
/// can fail one of them.
#[derive(Clone)]
pub struct Stores {
    pub updates: Arc<dyn UpdateLogStore>,
    pub ledger: Arc<dyn AlertLedgerStore>,
    pub recipients: Arc<dyn RecipientStore>,
}

impl Stores {
    /// All three backed by one store object.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: UpdateLogStore + AlertLedgerStore + RecipientStore + 'static,
    {
        Self {
            updates: store.clone(),
            ledger: store.clone(),
            recipients: store,
        }
    }
}

/// Serialize `value` as pretty JSON and move it over `path` in one rename.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
    }
    let json = serde_json::to_vec_pretty(value).context("serializing collection")?;
    let tmp = path.with_extension("json.tmp");
    {
        let mut f = fs::File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
        f.write_all(&json)
            .with_context(|| format!("writing {}", tmp.display()))?;
        f.sync_all().with_context(|| format!("syncing {}", tmp.display()))?;
    }
    fs::rename(&tmp, path).with_context(|| format!("renaming onto {}", path.display()))?;
    Ok(())
}

/// Read a JSON collection; a missing file is the empty collection.
pub fn read_json_or_default<T>(path: &Path) -> Result<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    match fs::read_to_string(path) {
        Ok(s) if s.trim().is_empty() => Ok(T::default()),
        Ok(s) => serde_json::from_str(&s).with_context(|| format!("parsing {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}
