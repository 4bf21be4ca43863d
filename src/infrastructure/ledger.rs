//! Append-only JSONL file ledger.
//!
//! Each entry is one JSON object per line. Appends flush and sync before
//! returning, so a record acknowledged to the PnL tracker survives a crash
//! immediately afterwards.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::domain::LedgerEntry;
use crate::error::{LedgerError, Result};
use crate::port::ledger::PnlLedger;

/// File-backed [`PnlLedger`] with one JSON entry per line.
pub struct FileLedger {
    path: PathBuf,
    /// Single writer; the file handle is kept open in append mode.
    file: Mutex<File>,
}

impl FileLedger {
    /// Open (or create) the ledger file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(LedgerError::Io)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PnlLedger for FileLedger {
    fn append(&self, entry: &LedgerEntry) -> Result<()> {
        let line = serde_json::to_string(entry).map_err(LedgerError::Malformed)?;
        let mut file = self.file.lock();
        writeln!(file, "{line}").map_err(LedgerError::Io)?;
        file.flush().map_err(LedgerError::Io)?;
        file.sync_data().map_err(LedgerError::Io)?;
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<LedgerEntry>> {
        let file = File::open(&self.path).map_err(LedgerError::Io)?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line.map_err(LedgerError::Io)?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: LedgerEntry = serde_json::from_str(&line).map_err(LedgerError::Malformed)?;
            entries.push(entry);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[test]
    fn append_then_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::open(dir.path().join("ledger.jsonl")).unwrap();

        ledger
            .append(&LedgerEntry::trade(Utc::now(), "a-1", dec!(1.5), dec!(1.5), "x"))
            .unwrap();
        ledger
            .append(&LedgerEntry::trade(Utc::now(), "a-2", dec!(-0.5), dec!(1.0), "y"))
            .unwrap();

        let entries = ledger.read_all().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].pnl, dec!(1.5));
        assert_eq!(entries[1].cumulative, dec!(1.0));
    }

    #[test]
    fn read_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");

        {
            let ledger = FileLedger::open(&path).unwrap();
            ledger
                .append(&LedgerEntry::trade(Utc::now(), "a-1", dec!(2), dec!(2), "x"))
                .unwrap();
        }

        let reopened = FileLedger::open(&path).unwrap();
        let entries = reopened.read_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].pnl, dec!(2));
    }

    #[test]
    fn empty_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::open(dir.path().join("ledger.jsonl")).unwrap();
        assert!(ledger.read_all().unwrap().is_empty());
    }
}
