// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Append-only rolling journal.
//!
//! Files are pre-allocated to `file_size` bytes and filled with JSON lines.
//! Compaction is intentionally absent: deleted addresses and acknowledged
//! messages leave their records behind, so the on-disk footprint only grows.

use crate::error::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Records written by the post office.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JournalRecord {
    AddAddress { name: String },
    DeleteAddress { name: String },
    AddQueue { name: String, address: String },
    DeleteQueue { name: String },
    AddMessage { id: String, address: String, size: u64 },
    AckMessage { id: String, queue: String },
    AddDuplicateId { cache: String, id: String },
}

struct ActiveFile {
    index: u64,
    file: File,
    offset: u64,
}

/// A journal rooted at one directory.
pub struct Journal {
    directory: PathBuf,
    prefix: String,
    file_size: u64,
    active: Mutex<ActiveFile>,
    records: AtomicU64,
}

impl Journal {
    /// Open (or create) a journal, pre-allocating at least `min_files` files.
    pub fn open(directory: &Path, prefix: &str, file_size: u64, min_files: usize) -> Result<Self> {
        fs::create_dir_all(directory)?;
        let mut highest = existing_indices(directory, prefix)?
            .into_iter()
            .max()
            .unwrap_or(0);

        // Always start writing into a fresh file.
        highest += 1;
        let file = create_file(directory, prefix, highest, file_size)?;
        let mut total = existing_indices(directory, prefix)?.len();
        let mut next = highest + 1;
        while total < min_files {
            create_file(directory, prefix, next, file_size)?;
            next += 1;
            total += 1;
        }

        Ok(Self {
            directory: directory.to_path_buf(),
            prefix: prefix.to_string(),
            file_size: file_size.max(1),
            active: Mutex::new(ActiveFile {
                index: highest,
                file,
                offset: 0,
            }),
            records: AtomicU64::new(0),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Number of records appended since open.
    pub fn records(&self) -> u64 {
        self.records.load(Ordering::Relaxed)
    }

    /// Append one record, rolling to a new file when the current one is full.
    pub fn append(&self, record: &JournalRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut active = self.active.lock();
        if active.offset + line.len() as u64 > self.file_size {
            let index = active.index + 1;
            let path = file_path(&self.directory, &self.prefix, index);
            let file = if path.exists() {
                OpenOptions::new().write(true).open(&path)?
            } else {
                create_file(&self.directory, &self.prefix, index, self.file_size)?
            };
            *active = ActiveFile {
                index,
                file,
                offset: 0,
            };
        }
        let offset = active.offset;
        active.file.seek(SeekFrom::Start(offset))?;
        active.file.write_all(&line)?;
        active.offset += line.len() as u64;
        self.records.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Flush the active file to disk.
    pub fn sync(&self) -> Result<()> {
        self.active.lock().file.sync_data()?;
        Ok(())
    }

    /// Number of journal files currently on disk.
    pub fn file_count(&self) -> Result<usize> {
        Ok(existing_indices(&self.directory, &self.prefix)?.len())
    }
}

fn file_path(directory: &Path, prefix: &str, index: u64) -> PathBuf {
    directory.join(format!("{}-{}.jrn", prefix, index))
}

fn create_file(directory: &Path, prefix: &str, index: u64, size: u64) -> Result<File> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(file_path(directory, prefix, index))?;
    file.set_len(size)?;
    Ok(file)
}

fn existing_indices(directory: &Path, prefix: &str) -> Result<Vec<u64>> {
    let mut indices = Vec::new();
    let head = format!("{}-", prefix);
    for entry in fs::read_dir(directory)? {
        let name = entry?.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(index) = name
            .strip_prefix(&head)
            .and_then(|rest| rest.strip_suffix(".jrn"))
            .and_then(|n| n.parse::<u64>().ok())
        {
            indices.push(index);
        }
    }
    Ok(indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preallocates_min_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let journal = Journal::open(dir.path(), "wildleak-data", 4096, 2).expect("open");
        assert_eq!(journal.file_count().expect("count"), 2);

        let total: u64 = fs::read_dir(dir.path())
            .expect("read_dir")
            .map(|e| e.expect("entry").metadata().expect("meta").len())
            .sum();
        assert_eq!(total, 8192);
    }

    #[test]
    fn test_rolls_when_full() {
        let dir = tempfile::tempdir().expect("tempdir");
        let journal = Journal::open(dir.path(), "j", 128, 1).expect("open");
        for i in 0..10 {
            journal
                .append(&JournalRecord::AddAddress {
                    name: format!("publish/{}", i),
                })
                .expect("append");
        }
        assert_eq!(journal.records(), 10);
        assert!(journal.file_count().expect("count") > 1);
        journal.sync().expect("sync");
    }

    #[test]
    fn test_reopen_starts_new_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let journal = Journal::open(dir.path(), "j", 256, 2).expect("open");
            journal
                .append(&JournalRecord::DeleteQueue { name: "q".into() })
                .expect("append");
        }
        let journal = Journal::open(dir.path(), "j", 256, 2).expect("reopen");
        assert_eq!(journal.file_count().expect("count"), 3);
    }

    #[test]
    fn test_record_format() {
        let json = serde_json::to_string(&JournalRecord::AddQueue {
            name: "q".into(),
            address: "publish/#".into(),
        })
        .expect("serialize");
        assert!(json.contains("\"kind\":\"add_queue\""));
    }
}
