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

use std::fmt::Debug;
use std::io::SeekFrom;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::*;

/// Static description of a registered protocol module.
#[derive(Clone, Debug)]
pub struct ModuleInfo {
    name: &'static str,
    schemes: Vec<String>,
    priority: i32,
    capability: Capability,
}

impl ModuleInfo {
    /// Create a module descriptor.
    pub fn new(name: &'static str, schemes: &[&str], priority: i32, capability: Capability) -> Self {
        Self {
            name,
            schemes: schemes.iter().map(|s| s.to_lowercase()).collect(),
            priority,
            capability,
        }
    }

    /// Module name, unique among registered modules.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// URL schemes this module serves, lowercase.
    pub fn schemes(&self) -> &[String] {
        &self.schemes
    }

    /// Resolution priority; higher wins, ties broken by registration order.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Operations this module implements.
    pub fn capability(&self) -> Capability {
        self.capability
    }

    /// Whether this module serves the given scheme.
    pub fn matches(&self, scheme: &str) -> bool {
        self.schemes.iter().any(|s| s == &scheme.to_lowercase())
    }
}

/// Uniform operation contract every protocol module implements.
///
/// Every operation has a default implementation raising
/// [`ErrorKind::NotSupported`]; a module implements the subset its
/// protocol can express and declares that subset in
/// [`ModuleInfo::capability`]. Dispatch falls through to the next
/// candidate module only on `NotSupported`; any genuine failure from a
/// capable module is final.
///
/// Modules report failures already translated into the crate taxonomy;
/// wire-level error vocabularies stay behind this trait.
#[async_trait]
pub trait Module: Send + Sync + Debug + 'static {
    /// Descriptor of this module.
    fn info(&self) -> ModuleInfo;

    /// Open a file, producing the module-private descriptor dispatch wraps
    /// into a [`FileHandle`][crate::Handle].
    async fn open(&self, uri: &Uri, args: OpOpen) -> Result<Box<dyn ModuleFile>> {
        let (_, _) = (uri, args);

        Err(Error::new(
            ErrorKind::NotSupported,
            "operation is not supported",
        ))
    }

    /// Stat the entry at the given URL, following symlinks.
    async fn stat(&self, uri: &Uri) -> Result<Metadata> {
        let _ = uri;

        Err(Error::new(
            ErrorKind::NotSupported,
            "operation is not supported",
        ))
    }

    /// Stat the entry at the given URL without following symlinks.
    ///
    /// Defaults to [`Module::stat`] for protocols without symlinks.
    async fn lstat(&self, uri: &Uri) -> Result<Metadata> {
        self.stat(uri).await
    }

    /// Check accessibility of the given URL.
    async fn access(&self, uri: &Uri, mode: AccessMode) -> Result<()> {
        let (_, _) = (uri, mode);

        Err(Error::new(
            ErrorKind::NotSupported,
            "operation is not supported",
        ))
    }

    /// Create a directory.
    async fn mkdir(&self, uri: &Uri, mode: u32, recursive: bool) -> Result<()> {
        let (_, _, _) = (uri, mode, recursive);

        Err(Error::new(
            ErrorKind::NotSupported,
            "operation is not supported",
        ))
    }

    /// Remove a file.
    async fn unlink(&self, uri: &Uri) -> Result<()> {
        let _ = uri;

        Err(Error::new(
            ErrorKind::NotSupported,
            "operation is not supported",
        ))
    }

    /// Change permission bits.
    async fn chmod(&self, uri: &Uri, mode: u32) -> Result<()> {
        let (_, _) = (uri, mode);

        Err(Error::new(
            ErrorKind::NotSupported,
            "operation is not supported",
        ))
    }

    /// Rename an entry within the same endpoint.
    async fn rename(&self, from: &Uri, to: &Uri) -> Result<()> {
        let (_, _) = (from, to);

        Err(Error::new(
            ErrorKind::NotSupported,
            "operation is not supported",
        ))
    }

    /// Open a directory for iteration.
    async fn opendir(&self, uri: &Uri) -> Result<Box<dyn DirStream>> {
        let _ = uri;

        Err(Error::new(
            ErrorKind::NotSupported,
            "operation is not supported",
        ))
    }

    /// Compute a checksum of the entry, or of a byte range of it.
    ///
    /// # Behavior
    ///
    /// - A module whose protocol cannot express byte ranges MUST reject a
    ///   partial-range request with `NotSupported` instead of silently
    ///   checksumming the whole entry.
    async fn checksum(&self, uri: &Uri, args: OpChecksum) -> Result<String> {
        let (_, _) = (uri, args);

        Err(Error::new(
            ErrorKind::NotSupported,
            "operation is not supported",
        ))
    }

    /// Transport protocols the endpoint behind this URL advertises for
    /// direct transfers, in the endpoint's preference order.
    ///
    /// Consumed by transfer negotiation; modules without a resolution
    /// layer leave the default, which routes copies to the streamed path.
    async fn transfer_protocols(&self, uri: &Uri) -> Result<Vec<String>> {
        let _ = uri;

        Err(Error::new(
            ErrorKind::NotSupported,
            "operation is not supported",
        ))
    }

    /// Drive a direct transfer between two remote endpoints over the
    /// negotiated protocol, without routing the data through this process.
    async fn third_party_copy(&self, from: &Uri, to: &Uri, protocol: &str) -> Result<()> {
        let (_, _, _) = (from, to, protocol);

        Err(Error::new(
            ErrorKind::NotSupported,
            "operation is not supported",
        ))
    }
}

/// All functions in `Module` only require `&self`, so it's safe to
/// implement `Module` for `Arc<dyn Module>`.
#[async_trait]
impl<T: Module + ?Sized> Module for Arc<T> {
    fn info(&self) -> ModuleInfo {
        self.as_ref().info()
    }

    async fn open(&self, uri: &Uri, args: OpOpen) -> Result<Box<dyn ModuleFile>> {
        self.as_ref().open(uri, args).await
    }

    async fn stat(&self, uri: &Uri) -> Result<Metadata> {
        self.as_ref().stat(uri).await
    }

    async fn lstat(&self, uri: &Uri) -> Result<Metadata> {
        self.as_ref().lstat(uri).await
    }

    async fn access(&self, uri: &Uri, mode: AccessMode) -> Result<()> {
        self.as_ref().access(uri, mode).await
    }

    async fn mkdir(&self, uri: &Uri, mode: u32, recursive: bool) -> Result<()> {
        self.as_ref().mkdir(uri, mode, recursive).await
    }

    async fn unlink(&self, uri: &Uri) -> Result<()> {
        self.as_ref().unlink(uri).await
    }

    async fn chmod(&self, uri: &Uri, mode: u32) -> Result<()> {
        self.as_ref().chmod(uri, mode).await
    }

    async fn rename(&self, from: &Uri, to: &Uri) -> Result<()> {
        self.as_ref().rename(from, to).await
    }

    async fn opendir(&self, uri: &Uri) -> Result<Box<dyn DirStream>> {
        self.as_ref().opendir(uri).await
    }

    async fn checksum(&self, uri: &Uri, args: OpChecksum) -> Result<String> {
        self.as_ref().checksum(uri, args).await
    }

    async fn transfer_protocols(&self, uri: &Uri) -> Result<Vec<String>> {
        self.as_ref().transfer_protocols(uri).await
    }

    async fn third_party_copy(&self, from: &Uri, to: &Uri, protocol: &str) -> Result<()> {
        self.as_ref().third_party_copy(from, to, protocol).await
    }
}

/// Module-private descriptor of one opened file.
///
/// Dispatch guarantees calls on one descriptor never interleave; the
/// implementation may keep a plain cursor without its own locking.
#[async_trait]
pub trait ModuleFile: Send + Sync {
    /// Read up to `count` bytes at the current cursor, advancing it.
    ///
    /// An empty buffer signals end of file.
    async fn read(&mut self, count: usize) -> Result<Bytes>;

    /// Read up to `count` bytes at `offset` without moving the cursor.
    async fn pread(&mut self, count: usize, offset: u64) -> Result<Bytes>;

    /// Write the buffer at the current cursor, returning bytes written.
    async fn write(&mut self, bs: Bytes) -> Result<usize>;

    /// Reposition the cursor, returning the new offset from start.
    async fn seek(&mut self, pos: SeekFrom) -> Result<u64>;

    /// Flush and close the descriptor.
    ///
    /// Close is called at most once by dispatch; the handle id is gone
    /// whatever this returns.
    async fn close(&mut self) -> Result<()>;
}

/// Module-private stream of directory entries.
#[async_trait]
pub trait DirStream: Send + Sync {
    /// Yield the next entry, `None` when the directory is exhausted.
    async fn next_entry(&mut self) -> Result<Option<DirEntry>>;
}
