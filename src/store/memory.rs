use anyhow::{bail, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::{register_in, AlertLedgerStore, RecipientStore, Registration, UpdateLogStore};
use crate::monitor::ledger::AlertEvent;
use crate::monitor::merge::UpdateLog;
use crate::recipients::Recipient;

/// In-process store for tests and dry runs. Writes can be made to fail to
/// exercise the pipeline's persistence error path.
#[derive(Default)]
pub struct MemoryStore {
    log: Mutex<UpdateLog>,
    events: Mutex<Vec<AlertEvent>>,
    recipients: Mutex<Vec<Recipient>>,
    fail_log_writes: AtomicBool,
    fail_ledger_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recipients(recipients: Vec<Recipient>) -> Self {
        let s = Self::default();
        *s.recipients.lock().expect("recipients mutex poisoned") = recipients;
        s
    }

    pub fn fail_log_writes(&self, fail: bool) {
        self.fail_log_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_ledger_writes(&self, fail: bool) {
        self.fail_ledger_writes.store(fail, Ordering::SeqCst);
    }
}

impl UpdateLogStore for MemoryStore {
    fn load(&self) -> Result<UpdateLog> {
        Ok(self.log.lock().expect("log mutex poisoned").clone())
    }

    fn replace(&self, log: &UpdateLog) -> Result<()> {
        if self.fail_log_writes.load(Ordering::SeqCst) {
            bail!("update log write refused");
        }
        *self.log.lock().expect("log mutex poisoned") = log.clone();
        Ok(())
    }
}

impl AlertLedgerStore for MemoryStore {
    fn events(&self) -> Result<Vec<AlertEvent>> {
        Ok(self.events.lock().expect("events mutex poisoned").clone())
    }

    fn append(&self, event: &AlertEvent) -> Result<()> {
        if self.fail_ledger_writes.load(Ordering::SeqCst) {
            bail!("ledger write refused");
        }
        self.events
            .lock()
            .expect("events mutex poisoned")
            .push(event.clone());
        Ok(())
    }
}

impl RecipientStore for MemoryStore {
    fn recipients(&self) -> Result<Vec<Recipient>> {
        Ok(self
            .recipients
            .lock()
            .expect("recipients mutex poisoned")
            .clone())
    }

    fn upsert(&self, recipient: Recipient) -> Result<()> {
        let mut all = self.recipients.lock().expect("recipients mutex poisoned");
        match all.iter_mut().find(|r| r.id == recipient.id) {
            Some(slot) => *slot = recipient,
            None => all.push(recipient),
        }
        Ok(())
    }

    fn register(&self, candidate: Recipient) -> Result<Registration> {
        let mut all = self.recipients.lock().expect("recipients mutex poisoned");
        Ok(register_in(&mut all, candidate))
    }
}
