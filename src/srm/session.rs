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

use log::debug;
use log::warn;

use super::resolver::SrmRequestMode;
use super::resolver::SrmResolver;
use crate::*;

/// Lifecycle of one SRM reservation.
///
/// ```text
/// Pending -> Ready -> Finalizing -> Finalized
///    |         |
///    +---------+--> Failed
/// ```
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SrmSessionStatus {
    /// Request submitted, TURLs not ready yet.
    Pending,
    /// TURLs obtained, data-plane I/O may run.
    Ready,
    /// Finalize network action in flight.
    Finalizing,
    /// Finalize network action completed.
    Finalized,
    /// Resolution or finalize failed; no further network action.
    Failed,
}

/// Server-side state of one resolved logical URL, owned by the file
/// handle it is attached to.
///
/// Created during open, mutated only here, finalized exactly once:
/// however many times [`SrmSession::finalize`] is called, at most one
/// commit-or-release reaches the network.
#[derive(Debug)]
pub struct SrmSession {
    surl: Uri,
    endpoint: Uri,
    token: String,
    mode: SrmRequestMode,
    turls: Vec<String>,
    status: SrmSessionStatus,
}

impl SrmSession {
    /// Start tracking a freshly submitted request.
    pub fn new(surl: Uri, endpoint: Uri, token: String, mode: SrmRequestMode) -> Self {
        Self {
            surl,
            endpoint,
            token,
            mode,
            turls: Vec::new(),
            status: SrmSessionStatus::Pending,
        }
    }

    /// The logical URL this session resolves.
    pub fn surl(&self) -> &Uri {
        &self.surl
    }

    /// The request token issued by the endpoint.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Request mode.
    pub fn mode(&self) -> SrmRequestMode {
        self.mode
    }

    /// Current lifecycle status.
    pub fn status(&self) -> SrmSessionStatus {
        self.status
    }

    /// Transport URLs, available once ready.
    pub fn turls(&self) -> &[String] {
        &self.turls
    }

    /// Record the TURLs the endpoint produced; `Pending -> Ready`.
    pub fn mark_ready(&mut self, turls: Vec<String>) {
        debug_assert_eq!(self.status, SrmSessionStatus::Pending);
        self.turls = turls;
        self.status = SrmSessionStatus::Ready;
    }

    /// Record a resolution failure; no finalize will run.
    pub fn mark_failed(&mut self) {
        self.status = SrmSessionStatus::Failed;
    }

    /// Finalize the reservation, network-effecting at most once.
    ///
    /// Mode PUT with a successful data plane commits (`put_done`);
    /// everything else releases. A second call, or a call on a session
    /// that already failed, performs no network action and returns `Ok` —
    /// callers double-close after errors and that must stay harmless.
    pub async fn finalize(
        &mut self,
        resolver: &dyn SrmResolver,
        data_plane_ok: bool,
    ) -> Result<()> {
        match self.status {
            SrmSessionStatus::Ready => {}
            SrmSessionStatus::Finalized | SrmSessionStatus::Failed => return Ok(()),
            SrmSessionStatus::Finalizing => return Ok(()),
            SrmSessionStatus::Pending => {
                // Never became ready; nothing was reserved for I/O, but the
                // token may still hold server resources.
                self.status = SrmSessionStatus::Failed;
                return self.best_effort_release(resolver).await;
            }
        }

        self.status = SrmSessionStatus::Finalizing;

        let ret = if self.mode == SrmRequestMode::Put && data_plane_ok {
            debug!("srm putdone {} token {}", self.surl, self.token);
            resolver
                .put_done(&self.endpoint, &self.surl, &self.token)
                .await
        } else {
            debug!("srm release {} token {}", self.surl, self.token);
            resolver
                .release(&self.endpoint, &self.surl, &self.token)
                .await
        };

        match ret {
            Ok(()) => {
                self.status = SrmSessionStatus::Finalized;
                Ok(())
            }
            Err(err) => {
                self.status = SrmSessionStatus::Failed;
                Err(err
                    .with_operation("SrmSession::finalize")
                    .with_context("surl", &self.surl)
                    .with_context("token", &self.token))
            }
        }
    }

    /// Release the reservation during error unwind, swallowing release
    /// failures (the session is already failing for another reason).
    pub async fn best_effort_release(&mut self, resolver: &dyn SrmResolver) -> Result<()> {
        self.status = SrmSessionStatus::Failed;
        if let Err(err) = resolver
            .release(&self.endpoint, &self.surl, &self.token)
            .await
        {
            warn!(
                "release of srm token {} for {} failed: {}",
                self.token, self.surl, err
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::super::resolver::SrmRequest;
    use super::*;

    /// Counts finalize-family calls so tests can assert on
    /// exactly-once semantics.
    #[derive(Debug, Default)]
    struct CountingResolver {
        put_done_calls: AtomicUsize,
        release_calls: AtomicUsize,
        fail_finalize: bool,
    }

    #[async_trait]
    impl SrmResolver for CountingResolver {
        async fn prepare(&self, _: &Uri, _: &Uri, _: SrmRequestMode) -> Result<SrmRequest> {
            unreachable!("not used in session tests")
        }
        async fn poll(&self, _: &Uri, _: &str) -> Result<Option<Vec<String>>> {
            unreachable!("not used in session tests")
        }
        async fn put_done(&self, _: &Uri, _: &Uri, _: &str) -> Result<()> {
            self.put_done_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_finalize {
                return Err(Error::new(ErrorKind::RemoteFailure, "putdone refused"));
            }
            Ok(())
        }
        async fn release(&self, _: &Uri, _: &Uri, _: &str) -> Result<()> {
            self.release_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn stat(&self, _: &Uri, _: &Uri) -> Result<Metadata> {
            unreachable!("not used in session tests")
        }
        async fn unlink(&self, _: &Uri, _: &Uri) -> Result<()> {
            unreachable!("not used in session tests")
        }
        async fn mkdir(&self, _: &Uri, _: &Uri, _: u32) -> Result<()> {
            unreachable!("not used in session tests")
        }
        async fn chmod(&self, _: &Uri, _: &Uri, _: u32) -> Result<()> {
            unreachable!("not used in session tests")
        }
        async fn transfer_protocols(&self, _: &Uri) -> Result<Vec<String>> {
            unreachable!("not used in session tests")
        }
        async fn third_party_transfer(&self, _: &Uri, _: &Uri) -> Result<()> {
            unreachable!("not used in session tests")
        }
    }

    fn ready_session(mode: SrmRequestMode) -> SrmSession {
        let surl = Uri::parse("srm://se.example:8446/dteam/f").unwrap();
        let endpoint = Uri::parse("srm://se.example:8446/srm/managerv2").unwrap();
        let mut session = SrmSession::new(surl, endpoint, "req-1".to_string(), mode);
        session.mark_ready(vec!["gsiftp://door.example:2811/dteam/f".to_string()]);
        session
    }

    #[tokio::test]
    async fn test_put_success_commits() {
        let resolver = Arc::new(CountingResolver::default());
        let mut session = ready_session(SrmRequestMode::Put);

        session.finalize(resolver.as_ref(), true).await.unwrap();

        assert_eq!(resolver.put_done_calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.release_calls.load(Ordering::SeqCst), 0);
        assert_eq!(session.status(), SrmSessionStatus::Finalized);
    }

    #[tokio::test]
    async fn test_put_data_failure_releases() {
        let resolver = Arc::new(CountingResolver::default());
        let mut session = ready_session(SrmRequestMode::Put);

        session.finalize(resolver.as_ref(), false).await.unwrap();

        assert_eq!(resolver.put_done_calls.load(Ordering::SeqCst), 0);
        assert_eq!(resolver.release_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_always_releases() {
        let resolver = Arc::new(CountingResolver::default());
        let mut session = ready_session(SrmRequestMode::Get);

        session.finalize(resolver.as_ref(), true).await.unwrap();

        assert_eq!(resolver.put_done_calls.load(Ordering::SeqCst), 0);
        assert_eq!(resolver.release_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_finalize_network_action_at_most_once() {
        let resolver = Arc::new(CountingResolver::default());
        let mut session = ready_session(SrmRequestMode::Get);

        session.finalize(resolver.as_ref(), true).await.unwrap();
        session.finalize(resolver.as_ref(), true).await.unwrap();
        session.finalize(resolver.as_ref(), false).await.unwrap();

        assert_eq!(resolver.release_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_finalize_does_not_retry() {
        let resolver = Arc::new(CountingResolver {
            fail_finalize: true,
            ..Default::default()
        });
        let mut session = ready_session(SrmRequestMode::Put);

        let err = session.finalize(resolver.as_ref(), true).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteFailure);
        assert_eq!(session.status(), SrmSessionStatus::Failed);

        // Second close after the error stays quiet.
        session.finalize(resolver.as_ref(), true).await.unwrap();
        assert_eq!(resolver.put_done_calls.load(Ordering::SeqCst), 1);
    }
}
