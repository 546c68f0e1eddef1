// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSONL event segment log with group commit.
//!
//! Events are buffered in memory and flushed to disk in batches (~10ms
//! durability window). The active segment rolls over at a byte threshold;
//! sealed segments are trimmed oldest-first once retention budgets are
//! exceeded, but never past the last flush-acknowledged id.
//!
//! Each entry is a single line of JSON: `{"id":N,"event":{...}}\n`

use hive_core::EventRecord;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::warn;

/// Flush interval for group commit (~10ms batches)
const FLUSH_INTERVAL: Duration = Duration::from_millis(10);

/// Maximum entries to buffer before forcing flush
const FLUSH_THRESHOLD: usize = 100;

/// Errors that can occur in segment log operations
#[derive(Debug, Error)]
pub enum LogError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Out-of-order append: id {id} after {last}")]
    OutOfOrder { id: u64, last: u64 },
}

/// Retention and rotation thresholds.
#[derive(Debug, Clone, Copy)]
pub struct RetentionLimits {
    /// Trim oldest sealed segments once this many events are stored.
    pub max_events: u64,
    /// Trim oldest sealed segments once this many bytes are stored.
    pub max_bytes: u64,
    /// Seal the active segment once it grows past this many bytes.
    pub segment_bytes: u64,
}

impl Default for RetentionLimits {
    fn default() -> Self {
        Self {
            max_events: 100_000,
            max_bytes: 64 * 1024 * 1024,
            segment_bytes: 8 * 1024 * 1024,
        }
    }
}

/// Serialization helper for writing entries without cloning the event.
#[derive(Serialize)]
struct EntryRef<'a> {
    id: u64,
    event: &'a EventRecord,
}

/// Deserialization helper for reading entries.
#[derive(Deserialize)]
struct Entry {
    id: u64,
    event: EventRecord,
}

/// A sealed, immutable segment on disk.
#[derive(Debug, Clone)]
struct SegmentMeta {
    path: PathBuf,
    first_id: u64,
    last_id: u64,
    events: u64,
    bytes: u64,
}

/// Append-only JSONL segment log.
///
/// The caller (the event store) assigns ids; this layer owns durability:
/// group commit, segment rotation, retention, and crash recovery. A corrupt
/// tail on the active segment is rotated to `.bak` with the valid prefix
/// preserved.
pub struct SegmentLog {
    dir: PathBuf,
    sealed: Vec<SegmentMeta>,
    active: File,
    active_path: PathBuf,
    active_first_id: u64,
    active_last_id: u64,
    active_events: u64,
    active_bytes: u64,
    /// Buffered JSON lines (with trailing newline) waiting to be flushed
    write_buffer: Vec<Vec<u8>>,
    buffer_last_id: u64,
    /// Highest id guaranteed durable on disk
    flushed_through: u64,
    last_flush: Instant,
    limits: RetentionLimits,
}

impl SegmentLog {
    /// Open or create a segment log in `dir`.
    ///
    /// Scans existing segments in id order, recovering the highest stored id.
    pub fn open(dir: &Path, limits: RetentionLimits) -> Result<Self, LogError> {
        std::fs::create_dir_all(dir)?;

        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("seg-") && n.ends_with(".jsonl"))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        let mut sealed = Vec::new();
        for (i, path) in paths.iter().enumerate() {
            let is_last = i + 1 == paths.len();
            let scan = scan_segment(path)?;

            if scan.corrupt {
                if is_last {
                    // Active segment with a torn tail: rotate to .bak and
                    // rewrite the valid prefix.
                    repair_segment(path, &scan)?;
                } else {
                    warn!(
                        path = %path.display(),
                        valid_entries = scan.events,
                        "corrupt entry inside sealed segment, later entries in it are lost",
                    );
                }
            }

            if scan.events > 0 {
                sealed.push(SegmentMeta {
                    path: path.clone(),
                    first_id: scan.first_id,
                    last_id: scan.last_id,
                    events: scan.events,
                    bytes: scan.bytes,
                });
            } else if is_last {
                // Empty trailing segment: reuse it as the active one.
                let _ = std::fs::remove_file(path);
            }
        }

        let last_id = sealed.last().map(|s| s.last_id).unwrap_or(0);

        // The most recent segment (if any) becomes the active one again.
        let (active_path, active_meta) = match sealed.pop() {
            Some(meta) => (meta.path.clone(), Some(meta)),
            None => (segment_path(dir, last_id + 1), None),
        };

        let active = OpenOptions::new().create(true).append(true).open(&active_path)?;

        let (active_first_id, active_last_id, active_events, active_bytes) = match &active_meta {
            Some(m) => (m.first_id, m.last_id, m.events, m.bytes),
            None => (last_id + 1, last_id, 0, 0),
        };

        Ok(Self {
            dir: dir.to_owned(),
            sealed,
            active,
            active_path,
            active_first_id,
            active_last_id,
            active_events,
            active_bytes,
            write_buffer: Vec::new(),
            buffer_last_id: last_id,
            flushed_through: last_id,
            last_flush: Instant::now(),
            limits,
        })
    }

    /// Highest id recovered from or flushed to disk.
    pub fn flushed_through(&self) -> u64 {
        self.flushed_through
    }

    /// Highest id appended (buffered or durable).
    pub fn last_appended(&self) -> u64 {
        self.buffer_last_id
    }

    /// Buffer an event for the next group commit.
    ///
    /// Ids must arrive in strictly increasing order; the event store owns
    /// allocation.
    pub fn append(&mut self, event: &EventRecord) -> Result<(), LogError> {
        if event.id <= self.buffer_last_id {
            return Err(LogError::OutOfOrder { id: event.id, last: self.buffer_last_id });
        }
        let mut line = serde_json::to_vec(&EntryRef { id: event.id, event })?;
        line.push(b'\n');
        self.write_buffer.push(line);
        self.buffer_last_id = event.id;
        Ok(())
    }

    /// Check if flush is needed (interval elapsed or buffer full).
    pub fn needs_flush(&self) -> bool {
        !self.write_buffer.is_empty()
            && (self.last_flush.elapsed() >= FLUSH_INTERVAL
                || self.write_buffer.len() >= FLUSH_THRESHOLD)
    }

    /// Flush all buffered entries with a single fsync.
    ///
    /// This is the durability point: after flush returns, every previously
    /// appended event is stable on disk. Also rolls the active segment and
    /// enforces retention.
    pub fn flush(&mut self) -> Result<(), LogError> {
        if !self.write_buffer.is_empty() {
            let count = self.write_buffer.len() as u64;
            for line in self.write_buffer.drain(..) {
                self.active_bytes += line.len() as u64;
                self.active.write_all(&line)?;
            }
            self.active.sync_all()?;
            self.active_events += count;
            self.active_last_id = self.buffer_last_id;
            self.flushed_through = self.buffer_last_id;
            self.last_flush = Instant::now();
        }

        if self.active_bytes >= self.limits.segment_bytes {
            self.roll_segment()?;
        }
        self.enforce_retention();
        Ok(())
    }

    /// Read all durable events with id greater than `since_id`, in id order.
    ///
    /// Buffered (unflushed) entries are not visible; callers that need them
    /// flush first.
    pub fn read_from(&self, since_id: u64) -> Result<Vec<EventRecord>, LogError> {
        let mut out = Vec::new();
        for meta in &self.sealed {
            if meta.last_id <= since_id {
                continue;
            }
            read_segment_into(&meta.path, since_id, &mut out)?;
        }
        if self.active_events > 0 && self.active_last_id > since_id {
            read_segment_into(&self.active_path, since_id, &mut out)?;
        }
        Ok(out)
    }

    /// Total durable events across all segments.
    pub fn stored_events(&self) -> u64 {
        self.sealed.iter().map(|s| s.events).sum::<u64>() + self.active_events
    }

    /// Total durable bytes across all segments.
    pub fn stored_bytes(&self) -> u64 {
        self.sealed.iter().map(|s| s.bytes).sum::<u64>() + self.active_bytes
    }

    /// Oldest id still stored, if any events remain.
    pub fn oldest_id(&self) -> Option<u64> {
        if let Some(first) = self.sealed.first() {
            return Some(first.first_id);
        }
        (self.active_events > 0).then_some(self.active_first_id)
    }

    /// Seal the current active segment and start a fresh one.
    fn roll_segment(&mut self) -> Result<(), LogError> {
        self.sealed.push(SegmentMeta {
            path: self.active_path.clone(),
            first_id: self.active_first_id,
            last_id: self.active_last_id,
            events: self.active_events,
            bytes: self.active_bytes,
        });

        let next_first = self.active_last_id + 1;
        self.active_path = segment_path(&self.dir, next_first);
        self.active = OpenOptions::new().create(true).append(true).open(&self.active_path)?;
        self.active_first_id = next_first;
        self.active_events = 0;
        self.active_bytes = 0;
        Ok(())
    }

    /// Delete oldest sealed segments while over either retention budget.
    ///
    /// Only whole sealed segments are removed; the active segment and
    /// anything past `flushed_through` always survive.
    fn enforce_retention(&mut self) {
        while !self.sealed.is_empty()
            && (self.stored_events() > self.limits.max_events
                || self.stored_bytes() > self.limits.max_bytes)
        {
            let oldest = self.sealed.remove(0);
            if oldest.last_id > self.flushed_through {
                // Never trim past the durability point.
                self.sealed.insert(0, oldest);
                break;
            }
            if let Err(e) = std::fs::remove_file(&oldest.path) {
                warn!(path = %oldest.path.display(), error = %e, "failed to trim segment");
            }
        }
    }
}

/// Segment file name for the segment whose first event is `first_id`.
fn segment_path(dir: &Path, first_id: u64) -> PathBuf {
    dir.join(format!("seg-{first_id:012}.jsonl"))
}

struct ScanResult {
    first_id: u64,
    last_id: u64,
    events: u64,
    /// Bytes of the valid prefix
    bytes: u64,
    corrupt: bool,
    valid_lines: Vec<String>,
}

/// Scan a segment, collecting the valid prefix and detecting corruption.
fn scan_segment(path: &Path) -> Result<ScanResult, LogError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let mut result = ScanResult {
        first_id: 0,
        last_id: 0,
        events: 0,
        bytes: 0,
        corrupt: false,
        valid_lines: Vec::new(),
    };

    let mut line = String::new();
    loop {
        line.clear();
        let bytes_read = match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                result.corrupt = true;
                break;
            }
            Err(e) => return Err(e.into()),
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            result.bytes += bytes_read as u64;
            continue;
        }

        // Parse failure means a torn write; everything before it is kept
        let entry: Entry = match serde_json::from_str(trimmed) {
            Ok(e) => e,
            Err(_) => {
                result.corrupt = true;
                break;
            }
        };

        if result.events == 0 {
            result.first_id = entry.id;
        }
        result.last_id = entry.id;
        result.events += 1;
        result.bytes += bytes_read as u64;
        result.valid_lines.push(trimmed.to_string());
    }

    Ok(result)
}

/// Rotate a corrupt segment to `.bak` and rewrite only its valid prefix.
fn repair_segment(path: &Path, scan: &ScanResult) -> Result<(), LogError> {
    let bak_path = path.with_extension("jsonl.bak");
    warn!(
        path = %path.display(),
        bak = %bak_path.display(),
        valid_entries = scan.events,
        "corrupt segment tail detected, rotating to .bak and preserving valid entries",
    );
    std::fs::rename(path, &bak_path)?;

    let mut file = File::create(path)?;
    for line in &scan.valid_lines {
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
    }
    file.sync_all()?;
    Ok(())
}

/// Append events with id > `since_id` from one segment file into `out`.
fn read_segment_into(
    path: &Path,
    since_id: u64,
    out: &mut Vec<EventRecord>,
) -> Result<(), LogError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::InvalidData => break,
            Err(e) => return Err(e.into()),
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let entry: Entry = match serde_json::from_str(trimmed) {
            Ok(e) => e,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt entry during read, stopping");
                break;
            }
        };

        if entry.id > since_id {
            out.push(entry.event);
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
