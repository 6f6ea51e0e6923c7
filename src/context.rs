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

use std::future::Future;
use std::io::SeekFrom;
use std::sync::Arc;

use bytes::Bytes;
use log::debug;
use log::warn;

use crate::handle::DirTable;
use crate::handle::HandleTable;
use crate::*;

/// Context is the dispatch surface of gridal.
///
/// It owns the [`Registry`], the file handle table, and the [`Config`],
/// and exposes the uniform POSIX-like operation set. One context is meant
/// to be shared by many concurrent callers; per-handle operations
/// serialize on the handle, everything else runs independently.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use gridal::services::MemoryModule;
/// use gridal::{Context, OpOpen, OpenFlags, Registry, Result};
///
/// # async fn example() -> Result<()> {
/// let registry = Arc::new(Registry::new());
/// registry.register(Arc::new(MemoryModule::new("mock")));
/// let ctx = Context::new(registry, Default::default());
///
/// let fd = ctx
///     .open("mock://host/hello.txt", OpOpen::new(OpenFlags::write_create()))
///     .await?;
/// ctx.write(fd, "Hello, World!".into()).await?;
/// ctx.close(fd).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    registry: Arc<Registry>,
    config: Config,
    handles: HandleTable,
    dirs: DirTable,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("registry", &self.inner.registry)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Create a context over an already populated registry.
    pub fn new(registry: Arc<Registry>, config: Config) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                registry,
                config,
                handles: HandleTable::new(),
                dirs: DirTable::new(),
            }),
        }
    }

    /// The shared module registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.registry
    }

    /// The configuration this context was built with.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Walk the resolved module list for a stateless operation.
    ///
    /// `NotSupported` falls through to the next candidate; any other
    /// failure from a capable module is final. No silent fallback past a
    /// genuine failure.
    async fn try_modules<T, F, Fut>(&self, uri: &Uri, operation: &'static str, f: F) -> Result<T>
    where
        F: Fn(Arc<dyn Module>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let modules = self.inner.registry.resolve_required(uri.scheme())?;

        let mut last = None;
        for module in modules {
            match f(module).await {
                Ok(v) => return Ok(v),
                Err(err) if err.kind() == ErrorKind::NotSupported => last = Some(err),
                Err(err) => {
                    return Err(err.with_operation(operation).with_context("url", uri));
                }
            }
        }

        Err(last
            .unwrap_or_else(|| Error::new(ErrorKind::NotSupported, "operation is not supported"))
            .with_operation(operation)
            .with_context("url", uri))
    }

    /// Open a file by URL, returning the opaque handle id for the
    /// stateful read/write/seek/close family.
    pub async fn open(&self, url: &str, args: OpOpen) -> Result<Handle> {
        let uri = Uri::parse(url)?;
        debug!("open {} flags {:?}", uri, args.flags);

        let modules = self.inner.registry.resolve_required(uri.scheme())?;

        let mut last = None;
        for module in modules {
            let name = module.info().name();
            match module.open(&uri, args.clone()).await {
                Ok(file) => {
                    let handle = self.inner.handles.insert(name, file);
                    debug!("open {} -> {}", uri, handle);
                    return Ok(handle);
                }
                Err(err) if err.kind() == ErrorKind::NotSupported => last = Some(err),
                Err(err) => {
                    return Err(err.with_operation("Context::open").with_context("url", uri));
                }
            }
        }

        Err(last
            .unwrap_or_else(|| Error::new(ErrorKind::NotSupported, "operation is not supported"))
            .with_operation("Context::open")
            .with_context("url", uri))
    }

    /// Read up to `count` bytes at the handle's cursor.
    pub async fn read(&self, handle: Handle, count: usize) -> Result<Bytes> {
        let slot = self.inner.handles.get(handle)?;
        let mut slot = slot.lock().await;
        slot.file
            .read(count)
            .await
            .map_err(|err| err.with_operation("Context::read").with_context("handle", handle))
    }

    /// Read up to `count` bytes at `offset` without moving the cursor.
    pub async fn pread(&self, handle: Handle, count: usize, offset: u64) -> Result<Bytes> {
        let slot = self.inner.handles.get(handle)?;
        let mut slot = slot.lock().await;
        slot.file.pread(count, offset).await.map_err(|err| {
            err.with_operation("Context::pread")
                .with_context("handle", handle)
        })
    }

    /// Write a buffer at the handle's cursor, returning bytes written.
    pub async fn write(&self, handle: Handle, bs: Bytes) -> Result<usize> {
        let slot = self.inner.handles.get(handle)?;
        let mut slot = slot.lock().await;
        slot.file.write(bs).await.map_err(|err| {
            err.with_operation("Context::write")
                .with_context("handle", handle)
        })
    }

    /// Reposition the handle's cursor.
    pub async fn lseek(&self, handle: Handle, pos: SeekFrom) -> Result<u64> {
        let slot = self.inner.handles.get(handle)?;
        let mut slot = slot.lock().await;
        slot.file.seek(pos).await.map_err(|err| {
            err.with_operation("Context::lseek")
                .with_context("handle", handle)
        })
    }

    /// Close a handle.
    ///
    /// The id is removed from the table before the module's close runs
    /// and is invalid from then on, whatever close reports: a failing
    /// finalize is surfaced to the caller but never resurrects the
    /// handle.
    pub async fn close(&self, handle: Handle) -> Result<()> {
        let slot = self.inner.handles.remove(handle)?;
        let mut slot = slot.lock().await;

        let ret = slot.file.close().await;
        if let Err(err) = &ret {
            warn!("close of {} on module {} failed: {}", handle, slot.module, err);
        }
        ret.map_err(|err| {
            err.with_operation("Context::close")
                .with_context("handle", handle)
        })
    }

    /// Stat the entry at the given URL, following symlinks.
    pub async fn stat(&self, url: &str) -> Result<Metadata> {
        let uri = Uri::parse(url)?;
        self.try_modules(&uri, "Context::stat", |m| {
            let uri = uri.clone();
            async move { m.stat(&uri).await }
        })
        .await
    }

    /// Stat the entry at the given URL without following symlinks.
    pub async fn lstat(&self, url: &str) -> Result<Metadata> {
        let uri = Uri::parse(url)?;
        self.try_modules(&uri, "Context::lstat", |m| {
            let uri = uri.clone();
            async move { m.lstat(&uri).await }
        })
        .await
    }

    /// Check accessibility of the given URL.
    pub async fn access(&self, url: &str, mode: AccessMode) -> Result<()> {
        let uri = Uri::parse(url)?;
        self.try_modules(&uri, "Context::access", |m| {
            let uri = uri.clone();
            async move { m.access(&uri, mode).await }
        })
        .await
    }

    /// Create a directory, optionally with all missing parents.
    pub async fn mkdir(&self, url: &str, mode: u32, recursive: bool) -> Result<()> {
        let uri = Uri::parse(url)?;
        self.try_modules(&uri, "Context::mkdir", |m| {
            let uri = uri.clone();
            async move { m.mkdir(&uri, mode, recursive).await }
        })
        .await
    }

    /// Remove the file at the given URL.
    pub async fn unlink(&self, url: &str) -> Result<()> {
        let uri = Uri::parse(url)?;
        self.try_modules(&uri, "Context::unlink", |m| {
            let uri = uri.clone();
            async move { m.unlink(&uri).await }
        })
        .await
    }

    /// Change permission bits of the entry at the given URL.
    pub async fn chmod(&self, url: &str, mode: u32) -> Result<()> {
        let uri = Uri::parse(url)?;
        self.try_modules(&uri, "Context::chmod", |m| {
            let uri = uri.clone();
            async move { m.chmod(&uri, mode).await }
        })
        .await
    }

    /// Rename an entry; both URLs must resolve to the same module.
    pub async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let from = Uri::parse(from)?;
        let to = Uri::parse(to)?;
        if from.scheme() != to.scheme() {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "rename across schemes is not possible, use copy",
            )
            .with_context("from", &from)
            .with_context("to", &to));
        }

        self.try_modules(&from, "Context::rename", |m| {
            let from = from.clone();
            let to = to.clone();
            async move { m.rename(&from, &to).await }
        })
        .await
    }

    /// Open a directory for iteration with [`Context::readdir`].
    pub async fn opendir(&self, url: &str) -> Result<DirHandle> {
        let uri = Uri::parse(url)?;
        let stream = self
            .try_modules(&uri, "Context::opendir", |m| {
                let uri = uri.clone();
                async move { m.opendir(&uri).await }
            })
            .await?;
        Ok(self.inner.dirs.insert(stream))
    }

    /// Yield the next entry of an open directory, `None` when exhausted.
    pub async fn readdir(&self, handle: DirHandle) -> Result<Option<DirEntry>> {
        let slot = self.inner.dirs.get(handle)?;
        let mut slot = slot.lock().await;
        slot.next_entry().await.map_err(|err| {
            err.with_operation("Context::readdir")
                .with_context("handle", handle)
        })
    }

    /// Close an open directory.
    pub async fn closedir(&self, handle: DirHandle) -> Result<()> {
        self.inner.dirs.remove(handle)
    }

    /// Compute a checksum of the entry at the given URL.
    pub async fn checksum(&self, url: &str, args: OpChecksum) -> Result<String> {
        let uri = Uri::parse(url)?;
        self.try_modules(&uri, "Context::checksum", |m| {
            let uri = uri.clone();
            let args = args.clone();
            async move { m.checksum(&uri, args).await }
        })
        .await
    }

    /// Copy `src` to `dst`, negotiating a direct third-party transfer when
    /// both endpoints allow it and streaming through this process
    /// otherwise. See [`CopyOptions`][crate::transfer::CopyOptions].
    pub async fn copy(
        &self,
        options: &transfer::CopyOptions,
        src: &str,
        dst: &str,
    ) -> Result<()> {
        transfer::copy(self, options, src, dst).await
    }

    /// Number of live file handles. Exposed for leak checks.
    pub fn open_handles(&self) -> usize {
        self.inner.handles.len()
    }
}
