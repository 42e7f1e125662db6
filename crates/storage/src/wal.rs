// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Kiosk Hub Contributors

//! Write-ahead log of [`kh_core::Event`]s.
//!
//! One JSON object per line, each stamped with a monotonically increasing
//! sequence number. `flush` fsyncs; callers decide the commit granularity
//! (the daemon batches a drained channel then flushes once, §9).

use kh_core::Event;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt WAL entry at line {line}: {source}")]
    Corrupt { line: usize, source: serde_json::Error },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WalEntry {
    pub seq: u64,
    pub event: Event,
}

/// Append-only event log backing a [`crate::MaterializedState`].
pub struct Wal {
    path: PathBuf,
    file: File,
    next_seq: u64,
}

impl Wal {
    /// Open (creating if absent) and scan for the current tail sequence.
    pub fn open(path: &Path, known_seq: u64) -> Result<Self, WalError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let existing_tail = if path.exists() { Self::tail_seq(path)? } else { 0 };
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { path: path.to_path_buf(), file, next_seq: existing_tail.max(known_seq) + 1 })
    }

    fn tail_seq(path: &Path) -> Result<u64, WalError> {
        let reader = BufReader::new(File::open(path)?);
        let mut tail = 0;
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: WalEntry =
                serde_json::from_str(&line).map_err(|source| WalError::Corrupt { line: i + 1, source })?;
            tail = entry.seq;
        }
        Ok(tail)
    }

    /// Append one event, assigning it the next sequence number.
    pub fn append(&mut self, event: Event) -> Result<WalEntry, WalError> {
        let entry = WalEntry { seq: self.next_seq, event };
        let mut line = serde_json::to_string(&entry).map_err(|e| WalError::Corrupt { line: 0, source: e })?;
        line.push('\n');
        self.file.write_all(line.as_bytes())?;
        self.next_seq += 1;
        Ok(entry)
    }

    /// fsync the underlying file.
    pub fn flush(&mut self) -> Result<(), WalError> {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Read every entry with `seq > after_seq`, in order.
    pub fn entries_after(&self, after_seq: u64) -> Result<Vec<WalEntry>, WalError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let mut out = Vec::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: WalEntry =
                serde_json::from_str(&line).map_err(|source| WalError::Corrupt { line: i + 1, source })?;
            if entry.seq > after_seq {
                out.push(entry);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kh_core::AgentId;

    fn heartbeat(n: u64) -> Event {
        Event::AgentHeartbeat { agent_id: AgentId::new("a1"), replica_id: "r1".into(), at_ms: n }
    }

    #[test]
    fn append_assigns_increasing_sequence_numbers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("wal.jsonl");
        let mut wal = Wal::open(&path, 0).expect("open");
        let e1 = wal.append(heartbeat(1)).expect("append");
        let e2 = wal.append(heartbeat(2)).expect("append");
        assert_eq!(e1.seq, 1);
        assert_eq!(e2.seq, 2);
    }

    #[test]
    fn reopening_resumes_sequence_after_existing_tail() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("wal.jsonl");
        {
            let mut wal = Wal::open(&path, 0).expect("open");
            wal.append(heartbeat(1)).expect("append");
            wal.append(heartbeat(2)).expect("append");
            wal.flush().expect("flush");
        }
        let mut wal = Wal::open(&path, 0).expect("reopen");
        let e3 = wal.append(heartbeat(3)).expect("append");
        assert_eq!(e3.seq, 3);
    }

    #[test]
    fn entries_after_excludes_already_processed_seq() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("wal.jsonl");
        let mut wal = Wal::open(&path, 0).expect("open");
        wal.append(heartbeat(1)).expect("append");
        wal.append(heartbeat(2)).expect("append");
        wal.append(heartbeat(3)).expect("append");
        wal.flush().expect("flush");
        let entries = wal.entries_after(1).expect("read");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].seq, 2);
    }

    #[test]
    fn known_seq_from_snapshot_overrides_empty_wal_tail() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("wal.jsonl");
        let mut wal = Wal::open(&path, 41).expect("open");
        let entry = wal.append(heartbeat(1)).expect("append");
        assert_eq!(entry.seq, 42);
    }
}
