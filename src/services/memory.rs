// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::VecDeque;
use std::io::SeekFrom;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;

use super::Digester;
use crate::*;

#[derive(Clone, Debug)]
struct MemoryEntry {
    /// `None` marks a directory.
    data: Option<Vec<u8>>,
    mode: u32,
    modified: chrono::DateTime<Utc>,
}

type Store = Arc<Mutex<BTreeMap<String, MemoryEntry>>>;

/// In-memory data plane, full capability including ranged checksums.
///
/// Entries are keyed by `domain + path`, so one module instance serves
/// any number of fake hosts. Mostly useful as the TURL target in tests
/// and demos.
#[derive(Clone)]
pub struct MemoryModule {
    scheme: &'static str,
    priority: i32,
    store: Store,
}

impl std::fmt::Debug for MemoryModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryModule")
            .field("scheme", &self.scheme)
            .finish_non_exhaustive()
    }
}

impl MemoryModule {
    /// Create a memory module serving the given scheme.
    pub fn new(scheme: &'static str) -> Self {
        Self {
            scheme,
            priority: 0,
            store: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Override the resolution priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    fn key(uri: &Uri) -> String {
        format!("{}{}", uri.domain(), uri.path())
    }

    fn lookup(&self, uri: &Uri) -> Result<MemoryEntry> {
        let store = self.store.lock().expect("memory store lock poisoned");
        let key = Self::key(uri);

        if let Some(entry) = store.get(&key) {
            return Ok(entry.clone());
        }
        // A key prefix with children is an implicit directory.
        let dir_prefix = format!("{key}/");
        if store.range(dir_prefix.clone()..).next().is_some_and(|(k, _)| k.starts_with(&dir_prefix))
        {
            return Ok(MemoryEntry {
                data: None,
                mode: 0o755,
                modified: Utc::now(),
            });
        }

        Err(Error::new(ErrorKind::NotFound, "entry does not exist").with_context("url", uri))
    }

    fn metadata_of(entry: &MemoryEntry) -> Metadata {
        match &entry.data {
            Some(data) => Metadata::new(EntryMode::File)
                .with_size(data.len() as u64)
                .with_permissions(entry.mode)
                .with_modified(entry.modified),
            None => Metadata::new(EntryMode::Dir)
                .with_permissions(entry.mode)
                .with_modified(entry.modified),
        }
    }
}

#[async_trait]
impl Module for MemoryModule {
    fn info(&self) -> ModuleInfo {
        ModuleInfo::new("memory", &[self.scheme], self.priority, Capability::full())
    }

    async fn open(&self, uri: &Uri, args: OpOpen) -> Result<Box<dyn ModuleFile>> {
        let key = Self::key(uri);
        let flags = args.flags;

        let existing = {
            let store = self.store.lock().expect("memory store lock poisoned");
            store.get(&key).cloned()
        };

        let buf = match (&existing, flags.create) {
            (Some(entry), _) => match &entry.data {
                Some(_) if flags.truncate => Vec::new(),
                Some(data) => data.clone(),
                None => {
                    return Err(
                        Error::new(ErrorKind::InvalidArgument, "entry is a directory")
                            .with_context("url", uri),
                    )
                }
            },
            (None, true) => Vec::new(),
            (None, false) => {
                return Err(Error::new(ErrorKind::NotFound, "entry does not exist")
                    .with_context("url", uri))
            }
        };

        let pos = if flags.append { buf.len() } else { 0 };
        // A truncating open of an existing file must land even when the
        // caller writes nothing.
        let dirty = flags.is_write() && (existing.is_none() || flags.truncate);
        Ok(Box::new(MemoryFile {
            store: self.store.clone(),
            key,
            mode: args.mode,
            buf,
            pos,
            writable: flags.is_write(),
            dirty,
        }))
    }

    async fn stat(&self, uri: &Uri) -> Result<Metadata> {
        Ok(Self::metadata_of(&self.lookup(uri)?))
    }

    async fn access(&self, uri: &Uri, mode: AccessMode) -> Result<()> {
        let entry = self.lookup(uri)?;
        if mode.exists && !mode.read && !mode.write && !mode.execute {
            return Ok(());
        }

        let bits = entry.mode >> 6;
        let denied = (mode.read && bits & 0o4 == 0)
            || (mode.write && bits & 0o2 == 0)
            || (mode.execute && bits & 0o1 == 0);
        if denied {
            return Err(Error::new(
                ErrorKind::PermissionDenied,
                "requested access is not permitted",
            )
            .with_context("url", uri));
        }
        Ok(())
    }

    async fn mkdir(&self, uri: &Uri, mode: u32, recursive: bool) -> Result<()> {
        let mut store = self.store.lock().expect("memory store lock poisoned");

        let mut insert_dir = |key: String| -> Result<()> {
            match store.get(&key) {
                Some(entry) if entry.data.is_some() => Err(Error::new(
                    ErrorKind::InvalidArgument,
                    "a file exists at the directory path",
                )
                .with_context("path", &key)),
                // mkdir on an existing dir succeeds.
                Some(_) => Ok(()),
                None => {
                    store.insert(
                        key,
                        MemoryEntry {
                            data: None,
                            mode,
                            modified: Utc::now(),
                        },
                    );
                    Ok(())
                }
            }
        };

        if recursive {
            let mut prefix = uri.domain().to_string();
            for component in uri.path().split('/').filter(|c| !c.is_empty()) {
                prefix.push('/');
                prefix.push_str(component);
                insert_dir(prefix.clone())?;
            }
            return Ok(());
        }

        insert_dir(Self::key(uri))
    }

    async fn unlink(&self, uri: &Uri) -> Result<()> {
        let mut store = self.store.lock().expect("memory store lock poisoned");
        let key = Self::key(uri);

        match store.get(&key) {
            Some(entry) if entry.data.is_none() => Err(Error::new(
                ErrorKind::InvalidArgument,
                "cannot unlink a directory",
            )
            .with_context("url", uri)),
            Some(_) => {
                store.remove(&key);
                Ok(())
            }
            None => Err(
                Error::new(ErrorKind::NotFound, "entry does not exist").with_context("url", uri)
            ),
        }
    }

    async fn chmod(&self, uri: &Uri, mode: u32) -> Result<()> {
        let mut store = self.store.lock().expect("memory store lock poisoned");
        let key = Self::key(uri);

        match store.get_mut(&key) {
            Some(entry) => {
                entry.mode = mode;
                Ok(())
            }
            None => Err(
                Error::new(ErrorKind::NotFound, "entry does not exist").with_context("url", uri)
            ),
        }
    }

    async fn rename(&self, from: &Uri, to: &Uri) -> Result<()> {
        let mut store = self.store.lock().expect("memory store lock poisoned");

        let entry = store.remove(&Self::key(from)).ok_or_else(|| {
            Error::new(ErrorKind::NotFound, "entry does not exist").with_context("url", from)
        })?;
        store.insert(Self::key(to), entry);
        Ok(())
    }

    async fn opendir(&self, uri: &Uri) -> Result<Box<dyn DirStream>> {
        // Existence check first so a missing dir fails like POSIX opendir.
        let entry = self.lookup(uri)?;
        if entry.data.is_some() {
            return Err(
                Error::new(ErrorKind::InvalidArgument, "entry is not a directory")
                    .with_context("url", uri),
            );
        }

        let store = self.store.lock().expect("memory store lock poisoned");
        let prefix = format!("{}/", Self::key(uri));

        let mut names = BTreeSet::new();
        let mut entries = VecDeque::new();
        for (key, entry) in store.range(prefix.clone()..) {
            let Some(rest) = key.strip_prefix(&prefix) else {
                break;
            };
            let name = rest.split('/').next().unwrap_or(rest);
            if name.is_empty() || !names.insert(name.to_string()) {
                continue;
            }
            let metadata = if rest.contains('/') {
                Metadata::new(EntryMode::Dir)
            } else {
                Self::metadata_of(entry)
            };
            entries.push_back(DirEntry::new(name, metadata));
        }

        Ok(Box::new(MemoryDirStream { entries }))
    }

    async fn checksum(&self, uri: &Uri, args: OpChecksum) -> Result<String> {
        let entry = self.lookup(uri)?;
        let Some(data) = entry.data else {
            return Err(
                Error::new(ErrorKind::InvalidArgument, "cannot checksum a directory")
                    .with_context("url", uri),
            );
        };

        let start = args.offset as usize;
        if start > data.len() {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "checksum offset is past end of file",
            )
            .with_context("url", uri)
            .with_context("offset", args.offset));
        }
        let end = match args.length {
            Some(len) => (start + len as usize).min(data.len()),
            None => data.len(),
        };

        let mut digester = Digester::new(&args.algorithm)?;
        digester.update(&data[start..end]);
        Ok(digester.finish())
    }
}

/// Cursor over a snapshot of one entry; writes land on close.
struct MemoryFile {
    store: Store,
    key: String,
    mode: u32,
    buf: Vec<u8>,
    pos: usize,
    writable: bool,
    dirty: bool,
}

#[async_trait]
impl ModuleFile for MemoryFile {
    async fn read(&mut self, count: usize) -> Result<Bytes> {
        let end = (self.pos + count).min(self.buf.len());
        let bs = Bytes::copy_from_slice(&self.buf[self.pos.min(end)..end]);
        self.pos = end.max(self.pos);
        Ok(bs)
    }

    async fn pread(&mut self, count: usize, offset: u64) -> Result<Bytes> {
        let start = (offset as usize).min(self.buf.len());
        let end = (start + count).min(self.buf.len());
        Ok(Bytes::copy_from_slice(&self.buf[start..end]))
    }

    async fn write(&mut self, bs: Bytes) -> Result<usize> {
        if !self.writable {
            return Err(Error::new(
                ErrorKind::PermissionDenied,
                "file is open read-only",
            ));
        }

        let end = self.pos + bs.len();
        if end > self.buf.len() {
            self.buf.resize(end, 0);
        }
        self.buf[self.pos..end].copy_from_slice(&bs);
        self.pos = end;
        self.dirty = true;
        Ok(bs.len())
    }

    async fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => n as i64,
            SeekFrom::Current(n) => self.pos as i64 + n,
            SeekFrom::End(n) => self.buf.len() as i64 + n,
        };
        if target < 0 {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "seek before start of file",
            ));
        }
        self.pos = target as usize;
        Ok(self.pos as u64)
    }

    async fn close(&mut self) -> Result<()> {
        if self.dirty {
            let mut store = self.store.lock().expect("memory store lock poisoned");
            store.insert(
                self.key.clone(),
                MemoryEntry {
                    data: Some(std::mem::take(&mut self.buf)),
                    mode: self.mode,
                    modified: Utc::now(),
                },
            );
            self.dirty = false;
        }
        Ok(())
    }
}

struct MemoryDirStream {
    entries: VecDeque<DirEntry>,
}

#[async_trait]
impl DirStream for MemoryDirStream {
    async fn next_entry(&mut self) -> Result<Option<DirEntry>> {
        Ok(self.entries.pop_front())
    }
}
