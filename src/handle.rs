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

use std::collections::HashMap;
use std::fmt;
use std::fmt::Display;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::RwLock;

use tokio::sync::Mutex;

use crate::*;

/// Opaque id of one open file, valid from `open` until the one `close`
/// that destroys it.
///
/// Ids are drawn from a monotonic counter and never reused within a
/// process, so a stale id always fails with `InvalidHandle` instead of
/// silently hitting an unrelated file.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Handle(u64);

impl Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Per-handle state: the owning module's name and its private descriptor.
pub(crate) struct HandleSlot {
    pub(crate) module: &'static str,
    pub(crate) file: Box<dyn ModuleFile>,
}

/// Table of live file handles.
///
/// Insert/remove take the exclusive section; lookup hands out an
/// `Arc<Mutex<_>>` clone so per-handle I/O serializes on the handle's own
/// lock without blocking unrelated handles.
#[derive(Default)]
pub(crate) struct HandleTable {
    next_id: AtomicU64,
    slots: RwLock<HashMap<u64, Arc<Mutex<HandleSlot>>>>,
}

impl HandleTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly opened descriptor, returning its public id.
    pub(crate) fn insert(&self, module: &'static str, file: Box<dyn ModuleFile>) -> Handle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let slot = Arc::new(Mutex::new(HandleSlot { module, file }));
        self.slots
            .write()
            .expect("handle table lock poisoned")
            .insert(id, slot);
        Handle(id)
    }

    /// Look up a live handle.
    pub(crate) fn get(&self, handle: Handle) -> Result<Arc<Mutex<HandleSlot>>> {
        self.slots
            .read()
            .expect("handle table lock poisoned")
            .get(&handle.0)
            .cloned()
            .ok_or_else(|| invalid_handle(handle))
    }

    /// Remove a handle from the table, returning its slot.
    ///
    /// The id is invalid from the moment this returns, whatever the caller
    /// then does with the slot.
    pub(crate) fn remove(&self, handle: Handle) -> Result<Arc<Mutex<HandleSlot>>> {
        self.slots
            .write()
            .expect("handle table lock poisoned")
            .remove(&handle.0)
            .ok_or_else(|| invalid_handle(handle))
    }

    /// Number of live handles, used by leak checks in tests.
    pub(crate) fn len(&self) -> usize {
        self.slots.read().expect("handle table lock poisoned").len()
    }
}

fn invalid_handle(handle: Handle) -> Error {
    Error::new(ErrorKind::InvalidHandle, "file handle is not open").with_context("handle", handle)
}

/// Opaque id of one open directory iteration.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct DirHandle(u64);

impl Display for DirHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dir#{}", self.0)
    }
}

/// Table of live directory streams, same ownership rules as
/// [`HandleTable`].
#[derive(Default)]
pub(crate) struct DirTable {
    next_id: AtomicU64,
    slots: RwLock<HashMap<u64, Arc<Mutex<Box<dyn DirStream>>>>>,
}

impl DirTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, stream: Box<dyn DirStream>) -> DirHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.slots
            .write()
            .expect("dir table lock poisoned")
            .insert(id, Arc::new(Mutex::new(stream)));
        DirHandle(id)
    }

    pub(crate) fn get(&self, handle: DirHandle) -> Result<Arc<Mutex<Box<dyn DirStream>>>> {
        self.slots
            .read()
            .expect("dir table lock poisoned")
            .get(&handle.0)
            .cloned()
            .ok_or_else(|| invalid_dir_handle(handle))
    }

    pub(crate) fn remove(&self, handle: DirHandle) -> Result<()> {
        self.slots
            .write()
            .expect("dir table lock poisoned")
            .remove(&handle.0)
            .map(|_| ())
            .ok_or_else(|| invalid_dir_handle(handle))
    }
}

fn invalid_dir_handle(handle: DirHandle) -> Error {
    Error::new(ErrorKind::InvalidHandle, "directory handle is not open")
        .with_context("handle", handle)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::io::SeekFrom;

    use super::*;

    struct NullFile;

    #[async_trait]
    impl ModuleFile for NullFile {
        async fn read(&mut self, _: usize) -> Result<Bytes> {
            Ok(Bytes::new())
        }
        async fn pread(&mut self, _: usize, _: u64) -> Result<Bytes> {
            Ok(Bytes::new())
        }
        async fn write(&mut self, bs: Bytes) -> Result<usize> {
            Ok(bs.len())
        }
        async fn seek(&mut self, _: SeekFrom) -> Result<u64> {
            Ok(0)
        }
        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_insert_get_remove() {
        let table = HandleTable::new();
        let h = table.insert("null", Box::new(NullFile));

        assert!(table.get(h).is_ok());
        assert_eq!(table.len(), 1);

        table.remove(h).unwrap();
        assert_eq!(table.len(), 0);

        let err = table.get(h).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidHandle);
        let err = table.remove(h).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidHandle);
    }

    #[test]
    fn test_ids_are_never_reused() {
        let table = HandleTable::new();
        let first = table.insert("null", Box::new(NullFile));
        table.remove(first).unwrap();

        let second = table.insert("null", Box::new(NullFile));
        assert_ne!(first, second);
    }
}
