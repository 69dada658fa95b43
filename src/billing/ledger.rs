//! Usage ledger sinks.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::Error;
use crate::Result;

use super::UsageRecord;

/// Durable sink for usage records.
pub trait UsageLedger: Send + Sync {
    /// Persist a record and return it as stored.
    fn persist(&self, record: UsageRecord) -> Result<UsageRecord>;

    /// Records charged to a payer, oldest first.
    fn records_for_payer(&self, payer_id: &str) -> Result<Vec<UsageRecord>>;
}

/// In-memory ledger for tests and one-shot CLI sessions.
#[derive(Default)]
pub struct InMemoryLedger {
    records: Mutex<Vec<UsageRecord>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every persisted record.
    pub fn records(&self) -> Vec<UsageRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl UsageLedger for InMemoryLedger {
    fn persist(&self, record: UsageRecord) -> Result<UsageRecord> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| Error::Ledger("ledger lock poisoned".to_string()))?;
        records.push(record.clone());
        Ok(record)
    }

    fn records_for_payer(&self, payer_id: &str) -> Result<Vec<UsageRecord>> {
        Ok(self
            .records()
            .into_iter()
            .filter(|r| r.payer_id == payer_id)
            .collect())
    }
}

/// Append-only JSON Lines ledger file.
pub struct JsonlLedger {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record in the file, skipping lines that fail to parse.
    pub fn read_all(&self) -> Result<Vec<UsageRecord>> {
        if !self.path.exists() {
            return Ok(vec![]);
        }

        let file = std::fs::File::open(&self.path)?;
        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(error = %e, "Skipping malformed ledger line"),
            }
        }
        Ok(records)
    }
}

impl UsageLedger for JsonlLedger {
    fn persist(&self, record: UsageRecord) -> Result<UsageRecord> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| Error::Ledger("ledger lock poisoned".to_string()))?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(record)
    }

    fn records_for_payer(&self, payer_id: &str) -> Result<Vec<UsageRecord>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|r| r.payer_id == payer_id)
            .collect())
    }
}
