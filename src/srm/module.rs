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

use std::io::SeekFrom;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use log::debug;
use tokio::time::sleep;

use super::resolver::Endpoint;
use super::resolver::EndpointDirectory;
use super::resolver::EndpointKind;
use super::resolver::SrmRequestMode;
use super::resolver::SrmResolver;
use super::session::SrmSession;
use crate::*;

/// SRM protocol module: resolves logical storage URLs into transport URLs
/// and delegates the real I/O to the module owning the TURL's scheme.
///
/// Opens are two-phase: a resolution round (submit, poll until ready,
/// obtain TURLs and a request token) followed by a plain open of the
/// chosen TURL. The returned descriptor carries the [`SrmSession`] so the
/// reservation is committed or released exactly once when the handle is
/// closed.
pub struct SrmModule {
    schemes: Vec<&'static str>,
    priority: i32,
    resolver: Arc<dyn SrmResolver>,
    directory: Option<Arc<dyn EndpointDirectory>>,
    registry: Arc<Registry>,
    config: Config,
}

impl std::fmt::Debug for SrmModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SrmModule")
            .field("schemes", &self.schemes)
            .field("priority", &self.priority)
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

impl SrmModule {
    /// Create an SRM module serving the `srm` scheme.
    ///
    /// `registry` is the registry the module will consult to open
    /// resolved TURLs; registering the module into the same registry
    /// closes the loop.
    pub fn new(resolver: Arc<dyn SrmResolver>, registry: Arc<Registry>, config: Config) -> Self {
        Self {
            schemes: vec!["srm"],
            priority: 0,
            resolver,
            directory: None,
            registry,
            config,
        }
    }

    /// Serve additional or different schemes.
    pub fn with_schemes(mut self, schemes: Vec<&'static str>) -> Self {
        self.schemes = schemes;
        self
    }

    /// Override the resolution priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Attach an endpoint directory, consulted when a SURL doesn't pin
    /// the endpoint port.
    pub fn with_directory(mut self, directory: Arc<dyn EndpointDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// The wire-level resolver this module drives.
    pub fn resolver(&self) -> &Arc<dyn SrmResolver> {
        &self.resolver
    }

    /// Determine the concrete endpoint serving `surl`.
    ///
    /// A SURL carrying a port addresses its endpoint directly; without
    /// one the endpoint directory supplies candidates and the first
    /// SRMv2 entry wins.
    async fn endpoint_of(&self, surl: &Uri) -> Result<Uri> {
        if surl.port() != 0 {
            return Ok(surl.origin());
        }

        let directory = self.directory.as_ref().ok_or_else(|| {
            Error::new(
                ErrorKind::NoRoute,
                "surl has no port and no endpoint directory is configured",
            )
            .with_context("surl", surl)
        })?;

        let endpoints = directory.resolve_endpoints(surl.domain()).await?;
        endpoints
            .into_iter()
            .find(|Endpoint { kind, .. }| *kind == EndpointKind::SrmV2)
            .map(|e| e.url)
            .ok_or_else(|| {
                Error::new(ErrorKind::NoRoute, "no srm endpoint advertised for host")
                    .with_context("host", surl.domain())
            })
    }

    /// Run the resolution rounds: submit, then poll until TURLs arrive,
    /// honoring the configured deadline and the caller's abort flag.
    ///
    /// Once a token exists, every early exit (timeout, abort, failed
    /// poll) attempts a best-effort release so the server-side
    /// reservation doesn't leak.
    async fn resolve_turls(
        &self,
        endpoint: &Uri,
        surl: &Uri,
        mode: SrmRequestMode,
        abort: &AbortFlag,
    ) -> Result<SrmSession> {
        let deadline = Instant::now() + self.config.operation_timeout;

        let request = self.resolver.prepare(endpoint, surl, mode).await?;
        let mut session = SrmSession::new(surl.clone(), endpoint.clone(), request.token, mode);

        if !request.turls.is_empty() {
            session.mark_ready(request.turls);
            return Ok(session);
        }

        loop {
            if abort.is_aborted() {
                session.best_effort_release(self.resolver.as_ref()).await?;
                return Err(Error::new(ErrorKind::Timeout, "srm resolution aborted")
                    .with_context("surl", surl)
                    .with_context("aborted", true));
            }
            if Instant::now() >= deadline {
                session.best_effort_release(self.resolver.as_ref()).await?;
                return Err(Error::new(ErrorKind::Timeout, "srm resolution timed out")
                    .with_context("surl", surl)
                    .with_context("timeout_ms", self.config.operation_timeout.as_millis()));
            }

            sleep(self.config.poll_interval).await;

            match self.resolver.poll(endpoint, session.token()).await {
                Ok(None) => continue,
                Ok(Some(turls)) => {
                    session.mark_ready(turls);
                    return Ok(session);
                }
                Err(err) => {
                    session.best_effort_release(self.resolver.as_ref()).await?;
                    return Err(err.with_context("surl", surl));
                }
            }
        }
    }

    /// Pick the first TURL whose scheme has a registered module capable
    /// of real I/O, and open it.
    async fn open_data_plane(
        &self,
        session: &SrmSession,
        args: &OpOpen,
    ) -> Result<Box<dyn ModuleFile>> {
        for raw in session.turls() {
            let turl = match Uri::parse(raw) {
                Ok(turl) => turl,
                Err(_) => continue,
            };

            let candidates = self.registry.resolve(turl.scheme());
            let Some(module) = candidates.into_iter().find(|m| m.info().capability().open)
            else {
                continue;
            };

            debug!("srm resolution {} -> {}", session.surl(), turl);
            return module.open(&turl, args.clone()).await;
        }

        Err(
            Error::new(ErrorKind::NoRoute, "no turl has a usable i/o module")
                .with_context("surl", session.surl())
                .with_context("turls", session.turls().join(", ")),
        )
    }

    /// Resolve one side of a third-party transfer down to the TURL of
    /// the requested protocol, keeping the session open for finalize.
    async fn resolve_for_transfer(
        &self,
        surl: &Uri,
        mode: SrmRequestMode,
        protocol: &str,
    ) -> Result<(SrmSession, Uri)> {
        let endpoint = self.endpoint_of(surl).await?;
        let session = self
            .resolve_turls(&endpoint, surl, mode, &AbortFlag::new())
            .await?;

        let turl = session
            .turls()
            .iter()
            .filter_map(|raw| Uri::parse(raw).ok())
            .find(|turl| turl.scheme().eq_ignore_ascii_case(protocol));

        match turl {
            Some(turl) => Ok((session, turl)),
            None => {
                let mut session = session;
                session.best_effort_release(self.resolver.as_ref()).await?;
                Err(
                    Error::new(ErrorKind::NoRoute, "endpoint produced no turl for protocol")
                        .with_context("surl", surl)
                        .with_context("protocol", protocol),
                )
            }
        }
    }
}

#[async_trait]
impl Module for SrmModule {
    fn info(&self) -> ModuleInfo {
        ModuleInfo::new(
            "srm",
            &self.schemes,
            self.priority,
            Capability {
                open: true,
                stat: true,
                access: true,
                mkdir: true,
                unlink: true,
                chmod: true,
                third_party_copy: true,
                ..Default::default()
            },
        )
    }

    async fn open(&self, uri: &Uri, args: OpOpen) -> Result<Box<dyn ModuleFile>> {
        let mode = if args.flags.is_write() {
            SrmRequestMode::Put
        } else {
            SrmRequestMode::Get
        };
        debug!("srm open {} mode {:?}", uri, mode);

        let endpoint = self.endpoint_of(uri).await?;
        let session = self
            .resolve_turls(&endpoint, uri, mode, &args.abort)
            .await
            .map_err(|err| err.with_operation("SrmModule::open"))?;

        match self.open_data_plane(&session, &args).await {
            Ok(inner) => Ok(Box::new(SrmFile {
                inner,
                session,
                resolver: self.resolver.clone(),
            })),
            Err(err) => {
                // No handle is left behind; drop the reservation too.
                let mut session = session;
                session.best_effort_release(self.resolver.as_ref()).await?;
                Err(err.with_operation("SrmModule::open"))
            }
        }
    }

    async fn stat(&self, uri: &Uri) -> Result<Metadata> {
        let endpoint = self.endpoint_of(uri).await?;
        self.resolver.stat(&endpoint, uri).await
    }

    async fn access(&self, uri: &Uri, mode: AccessMode) -> Result<()> {
        let endpoint = self.endpoint_of(uri).await?;
        let meta = self.resolver.stat(&endpoint, uri).await?;

        if mode.exists && !mode.read && !mode.write && !mode.execute {
            return Ok(());
        }
        let bits = meta.permissions() >> 6;
        let denied = (mode.read && bits & 0o4 == 0)
            || (mode.write && bits & 0o2 == 0)
            || (mode.execute && bits & 0o1 == 0);
        if denied {
            return Err(
                Error::new(ErrorKind::PermissionDenied, "requested access is not permitted")
                    .with_context("surl", uri),
            );
        }
        Ok(())
    }

    async fn mkdir(&self, uri: &Uri, mode: u32, recursive: bool) -> Result<()> {
        let endpoint = self.endpoint_of(uri).await?;

        if recursive {
            let mut prefix = String::new();
            let components: Vec<&str> =
                uri.path().split('/').filter(|c| !c.is_empty()).collect();
            for component in components {
                prefix.push('/');
                prefix.push_str(component);
                self.resolver
                    .mkdir(&endpoint, &uri.with_path(prefix.clone()), mode)
                    .await?;
            }
            return Ok(());
        }

        self.resolver.mkdir(&endpoint, uri, mode).await
    }

    async fn unlink(&self, uri: &Uri) -> Result<()> {
        let endpoint = self.endpoint_of(uri).await?;
        self.resolver.unlink(&endpoint, uri).await
    }

    async fn chmod(&self, uri: &Uri, mode: u32) -> Result<()> {
        let endpoint = self.endpoint_of(uri).await?;
        self.resolver.chmod(&endpoint, uri, mode).await
    }

    async fn transfer_protocols(&self, uri: &Uri) -> Result<Vec<String>> {
        let endpoint = self.endpoint_of(uri).await?;
        self.resolver.transfer_protocols(&endpoint).await
    }

    async fn third_party_copy(&self, from: &Uri, to: &Uri, protocol: &str) -> Result<()> {
        let (mut src_session, src_turl) = self
            .resolve_for_transfer(from, SrmRequestMode::Get, protocol)
            .await?;
        let (mut dst_session, dst_turl) = match self
            .resolve_for_transfer(to, SrmRequestMode::Put, protocol)
            .await
        {
            Ok(v) => v,
            Err(err) => {
                src_session
                    .best_effort_release(self.resolver.as_ref())
                    .await?;
                return Err(err);
            }
        };

        debug!("srm 3rd party {} -> {}", src_turl, dst_turl);
        let transferred = self
            .resolver
            .third_party_transfer(&src_turl, &dst_turl)
            .await;

        let data_ok = transferred.is_ok();
        let src_fin = src_session.finalize(self.resolver.as_ref(), false).await;
        let dst_fin = dst_session.finalize(self.resolver.as_ref(), data_ok).await;

        transferred
            .map_err(|err| err.with_operation("SrmModule::third_party_copy"))
            .and(src_fin)
            .and(dst_fin)
    }
}

/// Data-plane descriptor wrapped together with its SRM session.
///
/// Read/write/seek are pure pass-through; close finalizes the session
/// exactly once after the data-plane close, choosing commit or release
/// from the close outcome.
struct SrmFile {
    inner: Box<dyn ModuleFile>,
    session: SrmSession,
    resolver: Arc<dyn SrmResolver>,
}

#[async_trait]
impl ModuleFile for SrmFile {
    async fn read(&mut self, count: usize) -> Result<Bytes> {
        self.inner.read(count).await
    }

    async fn pread(&mut self, count: usize, offset: u64) -> Result<Bytes> {
        self.inner.pread(count, offset).await
    }

    async fn write(&mut self, bs: Bytes) -> Result<usize> {
        self.inner.write(bs).await
    }

    async fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.inner.seek(pos).await
    }

    async fn close(&mut self) -> Result<()> {
        let data_ret = self.inner.close().await;

        let finalize_ret = self
            .session
            .finalize(self.resolver.as_ref(), data_ret.is_ok())
            .await;

        data_ret.and(finalize_ret)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;

    use super::super::resolver::SrmRequest;
    use super::*;
    use crate::services::MemoryModule;

    /// Mock SRM endpoint backed by the memory module: every SURL maps to
    /// a `mock://` TURL on the same path.
    #[derive(Debug, Default)]
    struct MockResolver {
        turl_scheme: &'static str,
        pending_polls: AtomicUsize,
        fail_prepare: bool,
        release_calls: AtomicUsize,
        put_done_calls: AtomicUsize,
        tokens: Mutex<HashMap<String, String>>,
        endpoints_seen: Mutex<Vec<String>>,
    }

    impl MockResolver {
        fn new(turl_scheme: &'static str) -> Self {
            Self {
                turl_scheme,
                ..Default::default()
            }
        }

        fn turl_of(&self, surl: &Uri) -> String {
            format!("{}://{}{}", self.turl_scheme, surl.domain(), surl.path())
        }
    }

    #[async_trait]
    impl SrmResolver for MockResolver {
        async fn prepare(
            &self,
            endpoint: &Uri,
            surl: &Uri,
            _: SrmRequestMode,
        ) -> Result<SrmRequest> {
            self.endpoints_seen.lock().unwrap().push(endpoint.to_string());
            if self.fail_prepare {
                return Err(Error::new(ErrorKind::RemoteFailure, "SRM_FAILURE"));
            }

            let token = format!("req-{}", uuid::Uuid::new_v4());
            self.tokens
                .lock()
                .unwrap()
                .insert(token.clone(), self.turl_of(surl));

            if self.pending_polls.load(Ordering::SeqCst) > 0 {
                return Ok(SrmRequest {
                    token,
                    turls: vec![],
                });
            }
            let turl = self.turl_of(surl);
            Ok(SrmRequest {
                token,
                turls: vec![turl],
            })
        }

        async fn poll(&self, _: &Uri, token: &str) -> Result<Option<Vec<String>>> {
            if self.pending_polls.fetch_sub(1, Ordering::SeqCst) > 1 {
                return Ok(None);
            }
            let turl = self.tokens.lock().unwrap().get(token).cloned();
            Ok(turl.map(|t| vec![t]))
        }

        async fn put_done(&self, _: &Uri, _: &Uri, _: &str) -> Result<()> {
            self.put_done_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn release(&self, _: &Uri, _: &Uri, _: &str) -> Result<()> {
            self.release_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn stat(&self, _: &Uri, _: &Uri) -> Result<Metadata> {
            Err(Error::new(ErrorKind::NotFound, "entry does not exist"))
        }
        async fn unlink(&self, _: &Uri, _: &Uri) -> Result<()> {
            Ok(())
        }
        async fn mkdir(&self, _: &Uri, _: &Uri, _: u32) -> Result<()> {
            Ok(())
        }
        async fn chmod(&self, _: &Uri, _: &Uri, _: u32) -> Result<()> {
            Ok(())
        }
        async fn transfer_protocols(&self, _: &Uri) -> Result<Vec<String>> {
            Ok(vec![self.turl_scheme.to_string()])
        }
        async fn third_party_transfer(&self, _: &Uri, _: &Uri) -> Result<()> {
            Ok(())
        }
    }

    fn quick_config() -> Config {
        Config {
            operation_timeout: std::time::Duration::from_millis(200),
            poll_interval: std::time::Duration::from_millis(1),
            ..Default::default()
        }
    }

    fn srm_context(resolver: Arc<MockResolver>) -> Context {
        let registry = Arc::new(Registry::new());
        registry.register(Arc::new(MemoryModule::new("mock")));
        registry.register(Arc::new(SrmModule::new(
            resolver,
            registry.clone(),
            quick_config(),
        )));
        Context::new(registry, Config::default())
    }

    #[tokio::test]
    async fn test_two_phase_open_and_release_on_get() {
        let resolver = Arc::new(MockResolver::new("mock"));
        let ctx = srm_context(resolver.clone());

        // Seed the data plane through the TURL scheme.
        let fd = ctx
            .open(
                "mock://se.example/dteam/f",
                OpOpen::new(OpenFlags::write_create()),
            )
            .await
            .unwrap();
        ctx.write(fd, Bytes::from_static(b"grid data")).await.unwrap();
        ctx.close(fd).await.unwrap();

        let fd = ctx
            .open(
                "srm://se.example:8446/dteam/f",
                OpOpen::new(OpenFlags::read_only()),
            )
            .await
            .unwrap();
        let bs = ctx.read(fd, 64).await.unwrap();
        assert_eq!(&bs[..], b"grid data");
        ctx.close(fd).await.unwrap();

        // GET-mode close releases, never commits.
        assert_eq!(resolver.release_calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.put_done_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_put_open_commits_on_close() {
        let resolver = Arc::new(MockResolver::new("mock"));
        let ctx = srm_context(resolver.clone());

        let fd = ctx
            .open(
                "srm://se.example:8446/dteam/out",
                OpOpen::new(OpenFlags::write_create()),
            )
            .await
            .unwrap();
        ctx.write(fd, Bytes::from_static(b"x")).await.unwrap();
        ctx.close(fd).await.unwrap();

        assert_eq!(resolver.put_done_calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.release_calls.load(Ordering::SeqCst), 0);

        // The write landed behind the TURL.
        let meta = ctx.stat("mock://se.example/dteam/out").await.unwrap();
        assert_eq!(meta.size(), 1);
    }

    #[tokio::test]
    async fn test_polling_until_ready() {
        let resolver = Arc::new(MockResolver::new("mock"));
        resolver.pending_polls.store(3, Ordering::SeqCst);
        let ctx = srm_context(resolver.clone());

        let fd = ctx
            .open(
                "srm://se.example:8446/dteam/queued",
                OpOpen::new(OpenFlags::write_create()),
            )
            .await
            .unwrap();
        ctx.close(fd).await.unwrap();
        assert_eq!(resolver.put_done_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_abort_during_polling_releases_token() {
        let resolver = Arc::new(MockResolver::new("mock"));
        resolver.pending_polls.store(usize::MAX / 2, Ordering::SeqCst);
        let ctx = srm_context(resolver.clone());

        let mut args = OpOpen::new(OpenFlags::read_only());
        args.abort = AbortFlag::new();
        args.abort.abort();

        let err = ctx
            .open("srm://se.example:8446/dteam/slow", args)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(resolver.release_calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_timeout_during_polling_releases_token() {
        let resolver = Arc::new(MockResolver::new("mock"));
        resolver.pending_polls.store(usize::MAX / 2, Ordering::SeqCst);
        let ctx = srm_context(resolver.clone());

        let err = ctx
            .open(
                "srm://se.example:8446/dteam/slow",
                OpOpen::new(OpenFlags::read_only()),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(resolver.release_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_endpoint_derived_without_path_or_query() {
        let resolver = Arc::new(MockResolver::new("mock"));
        let ctx = srm_context(resolver.clone());

        let fd = ctx
            .open(
                "srm://se.example:8446/srm/managerv2?SFN=/dteam/q",
                OpOpen::new(OpenFlags::write_create()),
            )
            .await
            .unwrap();
        ctx.close(fd).await.unwrap();

        // The endpoint address carries neither the entry path nor the query.
        let seen = resolver.endpoints_seen.lock().unwrap();
        assert_eq!(seen.as_slice(), ["srm://se.example:8446"]);
    }

    #[tokio::test]
    async fn test_no_usable_turl_is_no_route() {
        // TURLs come back with a scheme nothing is registered for.
        let resolver = Arc::new(MockResolver::new("rfio"));
        let ctx = srm_context(resolver.clone());

        let err = ctx
            .open(
                "srm://se.example:8446/dteam/f",
                OpOpen::new(OpenFlags::read_only()),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NoRoute);
        // The reservation was dropped along with the failed open.
        assert_eq!(resolver.release_calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_put_finalize_release_when_data_close_fails() {
        /// Data plane whose close outcome the test controls.
        struct FailingCloseFile;

        #[async_trait]
        impl ModuleFile for FailingCloseFile {
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
                Err(Error::new(ErrorKind::RemoteFailure, "lost connection"))
            }
        }

        let resolver = Arc::new(MockResolver::new("mock"));
        let surl = Uri::parse("srm://se.example:8446/dteam/broken").unwrap();
        let endpoint = surl.origin();
        let mut session = SrmSession::new(
            surl,
            endpoint,
            "req-broken".to_string(),
            SrmRequestMode::Put,
        );
        session.mark_ready(vec!["mock://se.example/dteam/broken".to_string()]);

        let mut file = SrmFile {
            inner: Box::new(FailingCloseFile),
            session,
            resolver: resolver.clone(),
        };

        let err = file.close().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteFailure);

        // Data-plane failure on PUT releases instead of committing.
        assert_eq!(resolver.put_done_calls.load(Ordering::SeqCst), 0);
        assert_eq!(resolver.release_calls.load(Ordering::SeqCst), 1);

        // Double close performs no further network action.
        let _ = file.close().await;
        assert_eq!(resolver.release_calls.load(Ordering::SeqCst), 1);
    }
}
