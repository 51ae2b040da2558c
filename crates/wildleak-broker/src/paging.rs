// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Paging stores.
//!
//! Every address gets a paging store when it is created (persistence on).
//! The store owns a directory `paging/<uuid>/` holding an `address.txt`
//! marker and, once the address exceeds its size limit, page files. Deleting
//! the address removes the directory.

use crate::error::Result;
use crate::message::Message;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

struct PageWriter {
    page_id: u64,
    file: File,
    written: u64,
}

/// Overflow storage for one address.
pub struct PagingStore {
    address: String,
    directory: Option<PathBuf>,
    max_size_bytes: u64,
    page_size_bytes: u64,
    address_size: AtomicI64,
    pages_written: AtomicU64,
    writer: Mutex<Option<PageWriter>>,
}

impl PagingStore {
    fn create(
        address: &str,
        root: Option<&Path>,
        max_size_bytes: u64,
        page_size_bytes: u64,
    ) -> Result<Self> {
        let directory = match root {
            Some(root) => {
                let dir = root.join(Uuid::new_v4().simple().to_string());
                fs::create_dir_all(&dir)?;
                fs::write(dir.join("address.txt"), address)?;
                Some(dir)
            }
            None => None,
        };
        Ok(Self {
            address: address.to_string(),
            directory,
            max_size_bytes,
            page_size_bytes: page_size_bytes.max(1),
            address_size: AtomicI64::new(0),
            pages_written: AtomicU64::new(0),
            writer: Mutex::new(None),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    /// Bytes currently held in memory for the address.
    pub fn address_size(&self) -> i64 {
        self.address_size.load(Ordering::Relaxed)
    }

    /// True once the address exceeds its in-memory limit.
    pub fn is_paging(&self) -> bool {
        self.max_size_bytes > 0 && self.address_size() > self.max_size_bytes as i64
    }

    pub fn pages_written(&self) -> u64 {
        self.pages_written.load(Ordering::Relaxed)
    }

    /// Account for a message entering (positive) or leaving (negative) memory.
    pub fn add_size(&self, delta: i64) {
        self.address_size.fetch_add(delta, Ordering::Relaxed);
    }

    /// Write `message` to the current page file if the address is paging.
    ///
    /// Returns `true` when the message was paged.
    pub fn page_if_needed(&self, message: &Message) -> Result<bool> {
        if !self.is_paging() {
            return Ok(false);
        }
        let Some(dir) = self.directory.as_ref() else {
            return Ok(false);
        };

        let mut record = serde_json::to_vec(message)?;
        record.push(b'\n');

        let mut guard = self.writer.lock();
        let roll = match guard.as_ref() {
            Some(w) => w.written + record.len() as u64 > self.page_size_bytes,
            None => true,
        };
        if roll {
            let page_id = guard.as_ref().map(|w| w.page_id + 1).unwrap_or(1);
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join(format!("{:09}.page", page_id)))?;
            *guard = Some(PageWriter {
                page_id,
                file,
                written: 0,
            });
            self.pages_written.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(writer) = guard.as_mut() {
            writer.file.write_all(&record)?;
            writer.written += record.len() as u64;
        }
        Ok(true)
    }

    fn destroy(&self) -> Result<()> {
        self.writer.lock().take();
        if let Some(dir) = &self.directory {
            if dir.exists() {
                fs::remove_dir_all(dir)?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for PagingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagingStore")
            .field("address", &self.address)
            .field("directory", &self.directory)
            .field("address_size", &self.address_size())
            .finish()
    }
}

/// Owns every paging store of a node.
pub struct PagingManager {
    root: Option<PathBuf>,
    max_size_bytes: u64,
    page_size_bytes: u64,
    stores: DashMap<String, Arc<PagingStore>>,
}

impl PagingManager {
    /// `root` is `None` when persistence is disabled (stores stay in memory).
    pub fn new(root: Option<PathBuf>, max_size_bytes: u64, page_size_bytes: u64) -> Result<Self> {
        if let Some(root) = &root {
            fs::create_dir_all(root)?;
        }
        Ok(Self {
            root,
            max_size_bytes,
            page_size_bytes,
            stores: DashMap::new(),
        })
    }

    /// Return the store for `address`, creating it on first use.
    pub fn get_or_create(&self, address: &str) -> Result<Arc<PagingStore>> {
        if let Some(store) = self.stores.get(address) {
            return Ok(Arc::clone(store.value()));
        }
        let entry = self
            .stores
            .entry(address.to_string())
            .or_try_insert_with(|| {
                PagingStore::create(
                    address,
                    self.root.as_deref(),
                    self.max_size_bytes,
                    self.page_size_bytes,
                )
                .map(Arc::new)
            })?;
        Ok(Arc::clone(entry.value()))
    }

    pub fn get(&self, address: &str) -> Option<Arc<PagingStore>> {
        self.stores.get(address).map(|s| Arc::clone(s.value()))
    }

    /// Release the store of `address` and delete its directory.
    pub fn remove(&self, address: &str) -> Result<bool> {
        match self.stores.remove(address) {
            Some((_, store)) => {
                store.destroy()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Names of all live stores.
    pub fn store_names(&self) -> Vec<String> {
        self.stores.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}
