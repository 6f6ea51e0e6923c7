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

//! End-to-end copy scenarios over a mock SRM deployment.

use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use pretty_assertions::assert_eq;

use gridal::services::MemoryModule;
use gridal::srm::SrmModule;
use gridal::srm::SrmRequest;
use gridal::srm::SrmRequestMode;
use gridal::srm::SrmResolver;
use gridal::transfer::CopyOptions;
use gridal::*;

/// Mock SRM wire client backed by a shared [`MemoryModule`] store.
///
/// Every SURL resolves to one TURL per configured scheme on the same
/// `host/path` key, so data written through any TURL flavor is visible
/// through every other one.
#[derive(Debug)]
struct GridResolver {
    mem: MemoryModule,
    protocols: Vec<String>,
    protocols_by_host: HashMap<String, Vec<String>>,
    turl_schemes: Vec<&'static str>,
    put_done_calls: AtomicUsize,
    release_calls: AtomicUsize,
    direct_transfers: AtomicUsize,
}

impl GridResolver {
    fn new(mem: MemoryModule, protocols: &[&str], turl_schemes: Vec<&'static str>) -> Self {
        Self {
            mem,
            protocols: protocols.iter().map(|s| s.to_string()).collect(),
            protocols_by_host: HashMap::new(),
            turl_schemes,
            put_done_calls: AtomicUsize::new(0),
            release_calls: AtomicUsize::new(0),
            direct_transfers: AtomicUsize::new(0),
        }
    }

    /// Advertise a host-specific protocol list instead of the default.
    fn with_host_protocols(mut self, host: &str, protocols: &[&str]) -> Self {
        self.protocols_by_host.insert(
            host.to_string(),
            protocols.iter().map(|s| s.to_string()).collect(),
        );
        self
    }
}

#[async_trait]
impl SrmResolver for GridResolver {
    async fn prepare(&self, _: &Uri, surl: &Uri, _: SrmRequestMode) -> Result<SrmRequest> {
        let turls = self
            .turl_schemes
            .iter()
            .map(|scheme| format!("{}://{}{}", scheme, surl.domain(), surl.path()))
            .collect();
        Ok(SrmRequest {
            token: format!("req-{}", uuid::Uuid::new_v4()),
            turls,
        })
    }

    async fn poll(&self, _: &Uri, _: &str) -> Result<Option<Vec<String>>> {
        Ok(None)
    }

    async fn put_done(&self, _: &Uri, _: &Uri, _: &str) -> Result<()> {
        self.put_done_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn release(&self, _: &Uri, _: &Uri, _: &str) -> Result<()> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stat(&self, _: &Uri, surl: &Uri) -> Result<Metadata> {
        self.mem.stat(surl).await
    }

    async fn unlink(&self, _: &Uri, surl: &Uri) -> Result<()> {
        self.mem.unlink(surl).await
    }

    async fn mkdir(&self, _: &Uri, surl: &Uri, mode: u32) -> Result<()> {
        self.mem.mkdir(surl, mode, false).await
    }

    async fn chmod(&self, _: &Uri, surl: &Uri, mode: u32) -> Result<()> {
        self.mem.chmod(surl, mode).await
    }

    async fn transfer_protocols(&self, endpoint: &Uri) -> Result<Vec<String>> {
        match self.protocols_by_host.get(endpoint.domain()) {
            Some(protocols) => Ok(protocols.clone()),
            None => Ok(self.protocols.clone()),
        }
    }

    async fn third_party_transfer(&self, src_turl: &Uri, dst_turl: &Uri) -> Result<()> {
        let mut src = self
            .mem
            .open(src_turl, OpOpen::new(OpenFlags::read_only()))
            .await?;
        let data = src.read(1 << 20).await?;
        src.close().await?;

        let mut dst = self
            .mem
            .open(dst_turl, OpOpen::new(OpenFlags::write_create()))
            .await?;
        dst.write(data).await?;
        dst.close().await?;

        self.direct_transfers.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn srm_context(resolver: Arc<GridResolver>, mem: MemoryModule, preference: &str) -> Context {
    let _ = env_logger::builder().is_test(true).try_init();

    let registry = Arc::new(Registry::new());
    registry.register(Arc::new(mem));
    registry.register(Arc::new(SrmModule::new(
        resolver,
        registry.clone(),
        Config {
            operation_timeout: Duration::from_millis(500),
            poll_interval: Duration::from_millis(1),
            ..Default::default()
        },
    )));

    Context::new(
        registry,
        Config {
            turl_3rd_party_protocols: preference.to_string(),
            ..Default::default()
        },
    )
}

async fn seed(ctx: &Context, url: &str, data: &[u8]) {
    let fd = ctx
        .open(url, OpOpen::new(OpenFlags::write_create()))
        .await
        .unwrap();
    ctx.write(fd, Bytes::copy_from_slice(data)).await.unwrap();
    ctx.close(fd).await.unwrap();
}

fn recording_options() -> (CopyOptions, Arc<Mutex<Vec<(String, String)>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let options = CopyOptions::new().add_event_callback(move |event| {
        sink.lock()
            .unwrap()
            .push((event.stage.to_string(), event.description.clone()));
    });
    (options, events)
}

#[tokio::test]
async fn test_third_party_copy_between_srm_endpoints() {
    let mem = MemoryModule::new("mock");
    let resolver = Arc::new(GridResolver::new(mem.clone(), &["mock"], vec!["mock"]));
    let ctx = srm_context(resolver.clone(), mem, "");

    seed(&ctx, "mock://se1.example/dteam/in", b"payload").await;

    let (options, events) = recording_options();
    ctx.copy(
        &options,
        "srm://se1.example:8446/dteam/in",
        "srm://se2.example:8446/dteam/out",
    )
    .await
    .unwrap();

    // The payload moved endpoint to endpoint, not through this process.
    assert_eq!(resolver.direct_transfers.load(Ordering::SeqCst), 1);
    let meta = ctx.stat("mock://se2.example/dteam/out").await.unwrap();
    assert_eq!(meta.size(), 7);

    // Source reservation released, destination committed.
    assert_eq!(resolver.put_done_calls.load(Ordering::SeqCst), 1);
    assert_eq!(resolver.release_calls.load(Ordering::SeqCst), 1);

    let events = events.lock().unwrap();
    let stages: Vec<&str> = events.iter().map(|(s, _)| s.as_str()).collect();
    assert_eq!(
        stages,
        vec!["RESOLVING", "PROTOCOL_SELECTED", "TRANSFERRING", "DONE"]
    );
    assert!(events[1].1.starts_with("3rd party transfer"));
}

#[tokio::test]
async fn test_preference_reorders_negotiated_protocol() {
    // Both endpoints advertise gsiftp first; the configured preference
    // bumps mock ahead of the advertised order.
    let mem = MemoryModule::new("mock");
    let resolver = Arc::new(GridResolver::new(
        mem.clone(),
        &["gsiftp", "mock"],
        vec!["gsiftp", "mock"],
    ));
    let ctx = srm_context(resolver.clone(), mem, "mock");

    seed(&ctx, "mock://se1.example/dteam/pref", b"x").await;

    let (options, events) = recording_options();
    ctx.copy(
        &options,
        "srm://se1.example:8446/dteam/pref",
        "srm://se2.example:8446/dteam/pref",
    )
    .await
    .unwrap();

    let events = events.lock().unwrap();
    let selected = &events[1].1;
    assert_eq!(selected, "3rd party transfer using mock");
}

#[tokio::test]
async fn test_streamed_fallback_without_protocol_advertisement() {
    // Plain data-plane URLs advertise no transfer protocols, so the
    // payload streams through this process.
    let registry = Arc::new(Registry::new());
    registry.register(Arc::new(MemoryModule::new("mock")));
    let ctx = Context::new(registry, Config::default());

    seed(&ctx, "mock://host/src", b"falls back").await;

    let (options, events) = recording_options();
    ctx.copy(&options, "mock://host/src", "mock://host/dst")
        .await
        .unwrap();

    let meta = ctx.stat("mock://host/dst").await.unwrap();
    assert_eq!(meta.size(), 10);
    assert_eq!(ctx.open_handles(), 0);

    let events = events.lock().unwrap();
    assert!(events[1].1.starts_with("streamed transfer"));
}

#[tokio::test]
async fn test_streamed_fallback_when_no_common_protocol() {
    // Both endpoints advertise, but the lists are disjoint; the copy must
    // stream instead of attempting a direct transfer.
    let mem = MemoryModule::new("mock");
    let resolver = Arc::new(
        GridResolver::new(mem.clone(), &["rfio"], vec!["mock"])
            .with_host_protocols("se2.example", &["http"]),
    );
    let ctx = srm_context(resolver.clone(), mem, "");

    seed(&ctx, "mock://se1.example/dteam/disjoint", b"fallback").await;

    let (options, events) = recording_options();
    ctx.copy(
        &options,
        "srm://se1.example:8446/dteam/disjoint",
        "srm://se2.example:8446/dteam/disjoint",
    )
    .await
    .unwrap();

    assert_eq!(resolver.direct_transfers.load(Ordering::SeqCst), 0);
    let meta = ctx.stat("mock://se2.example/dteam/disjoint").await.unwrap();
    assert_eq!(meta.size(), 8);
    assert_eq!(ctx.open_handles(), 0);

    let events = events.lock().unwrap();
    assert!(events[1].1.starts_with("streamed transfer"));
}

#[tokio::test]
async fn test_copy_missing_source_leaves_no_trace() {
    let registry = Arc::new(Registry::new());
    registry.register(Arc::new(MemoryModule::new("mock")));
    let ctx = Context::new(registry, Config::default());

    let err = ctx
        .copy(&CopyOptions::new(), "mock://host/absent", "mock://host/dst")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    // Nothing was created at the destination and no handle leaked.
    let err = ctx.stat("mock://host/dst").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(ctx.open_handles(), 0);
}

#[tokio::test]
async fn test_copy_refuses_existing_destination_without_overwrite() {
    let registry = Arc::new(Registry::new());
    registry.register(Arc::new(MemoryModule::new("mock")));
    let ctx = Context::new(registry, Config::default());

    seed(&ctx, "mock://host/a", b"new").await;
    seed(&ctx, "mock://host/b", b"old data").await;

    let err = ctx
        .copy(&CopyOptions::new(), "mock://host/a", "mock://host/b")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    // The destination kept its original content.
    let meta = ctx.stat("mock://host/b").await.unwrap();
    assert_eq!(meta.size(), 8);

    let mut options = CopyOptions::new();
    options.overwrite = true;
    ctx.copy(&options, "mock://host/a", "mock://host/b")
        .await
        .unwrap();
    let meta = ctx.stat("mock://host/b").await.unwrap();
    assert_eq!(meta.size(), 3);
}

#[tokio::test]
async fn test_copy_verifies_checksums() {
    let registry = Arc::new(Registry::new());
    registry.register(Arc::new(MemoryModule::new("mock")));
    let ctx = Context::new(registry, Config::default());

    seed(&ctx, "mock://host/sum-src", b"verified payload").await;

    let (mut options, events) = recording_options();
    options.verify_checksum = true;
    ctx.copy(&options, "mock://host/sum-src", "mock://host/sum-dst")
        .await
        .unwrap();

    let events = events.lock().unwrap();
    let stages: Vec<&str> = events.iter().map(|(s, _)| s.as_str()).collect();
    assert_eq!(
        stages,
        vec![
            "RESOLVING",
            "PROTOCOL_SELECTED",
            "TRANSFERRING",
            "CHECKSUM_VERIFY",
            "DONE"
        ]
    );
}
