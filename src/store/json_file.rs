use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{
    read_json_or_default, register_in, write_json_atomic, AlertLedgerStore, RecipientStore,
    Registration, UpdateLogStore,
};
use crate::monitor::ledger::AlertEvent;
use crate::monitor::merge::UpdateLog;
use crate::recipients::Recipient;

pub const UPDATES_FILE: &str = "regulatory_updates.json";
pub const ALERTS_FILE: &str = "alert_history.json";
pub const RECIPIENTS_FILE: &str = "recipients.json";

/// The three collections as JSON files under one data directory.
///
/// Writers are serialized through `write_lock`; the pipeline is the only
/// writer for the log and ledger, the API only touches recipients.
pub struct JsonFileStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Open and validate every collection, so corrupt state is caught before
    /// the scheduler starts rather than inside a cycle.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let store = Self::new(dir);
        store.load()?;
        store.events()?;
        store.recipients()?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        // The guarded value is `()`; a poisoned lock carries no broken state.
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl UpdateLogStore for JsonFileStore {
    fn load(&self) -> Result<UpdateLog> {
        read_json_or_default(&self.path(UPDATES_FILE))
    }

    fn replace(&self, log: &UpdateLog) -> Result<()> {
        let _g = self.lock();
        write_json_atomic(&self.path(UPDATES_FILE), log)
    }
}

impl AlertLedgerStore for JsonFileStore {
    fn events(&self) -> Result<Vec<AlertEvent>> {
        read_json_or_default(&self.path(ALERTS_FILE))
    }

    fn append(&self, event: &AlertEvent) -> Result<()> {
        let _g = self.lock();
        let mut all: Vec<AlertEvent> = read_json_or_default(&self.path(ALERTS_FILE))?;
        all.push(event.clone());
        write_json_atomic(&self.path(ALERTS_FILE), &all)
    }
}

impl RecipientStore for JsonFileStore {
    fn recipients(&self) -> Result<Vec<Recipient>> {
        read_json_or_default(&self.path(RECIPIENTS_FILE))
    }

    fn upsert(&self, recipient: Recipient) -> Result<()> {
        let _g = self.lock();
        let mut all: Vec<Recipient> = read_json_or_default(&self.path(RECIPIENTS_FILE))?;
        match all.iter_mut().find(|r| r.id == recipient.id) {
            Some(slot) => *slot = recipient,
            None => all.push(recipient),
        }
        write_json_atomic(&self.path(RECIPIENTS_FILE), &all)
    }

    fn register(&self, candidate: Recipient) -> Result<Registration> {
        let _g = self.lock();
        let mut all: Vec<Recipient> = read_json_or_default(&self.path(RECIPIENTS_FILE))?;
        let outcome = register_in(&mut all, candidate);
        if outcome.is_created() {
            write_json_atomic(&self.path(RECIPIENTS_FILE), &all)?;
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn ledger_appends_without_rewriting_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let a = AlertEvent::new(Utc::now(), 3, true);
        let b = AlertEvent::new(Utc::now(), 4, false);
        store.append(&a).unwrap();
        store.append(&b).unwrap();

        let events = store.events().unwrap();
        assert_eq!(events, vec![a, b]);
    }

    #[test]
    fn recipients_upsert_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let mut r = Recipient::new("ops@example.com");
        store.upsert(r.clone()).unwrap();
        r.last_notified_at = Some(Utc::now());
        store.upsert(r.clone()).unwrap();
        store.upsert(Recipient::new("legal@example.com")).unwrap();

        let all = store.recipients().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0], r);
        assert_ne!(all[1].id, Uuid::nil());
    }

    #[test]
    fn concurrent_register_of_one_address_inserts_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(JsonFileStore::new(dir.path()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let email = if i % 2 == 0 { "legal@example.com" } else { "LEGAL@example.com" };
                    store.register(Recipient::new(email)).unwrap()
                })
            })
            .collect();
        let outcomes: Vec<Registration> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(outcomes.iter().filter(|o| o.is_created()).count(), 1);
        let all = store.recipients().unwrap();
        assert_eq!(all.len(), 1);
        assert!(outcomes.iter().all(|o| o.recipient().id == all[0].id));
    }

    #[test]
    fn open_rejects_corrupt_state() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(UPDATES_FILE), "[[[").unwrap();
        assert!(JsonFileStore::open(dir.path()).is_err());
    }
}
