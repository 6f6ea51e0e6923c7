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

//! Collaborator boundaries of the SRM resolution machinery.
//!
//! The wire-level SRM client and the endpoint discovery service live
//! outside this crate; these traits are the exact interface the core
//! needs from them. Implementations translate their protocol's failure
//! vocabulary into the crate taxonomy before returning.

use std::fmt::Debug;

use async_trait::async_trait;

use crate::*;

/// Mode of one SRM resolution request.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SrmRequestMode {
    /// Resolve for reading (`srmPrepareToGet`).
    Get,
    /// Resolve for writing (`srmPrepareToPut`).
    Put,
}

/// Outcome of submitting a resolution request.
#[derive(Clone, Debug)]
pub struct SrmRequest {
    /// Server-issued token correlating every later call of this
    /// reservation (poll, commit, release).
    pub token: String,
    /// Transport URLs, in the server's preference order.
    ///
    /// Empty when the server answered "queued"; the caller then polls
    /// with the token until TURLs arrive.
    pub turls: Vec<String>,
}

/// Wire-level SRM client, supplied by the embedding application.
///
/// All methods take the concrete `endpoint` the request is addressed to;
/// the `surl` is the logical name within that endpoint's namespace.
#[async_trait]
pub trait SrmResolver: Send + Sync + Debug + 'static {
    /// Submit a resolution request for `(surl, mode)`.
    async fn prepare(&self, endpoint: &Uri, surl: &Uri, mode: SrmRequestMode) -> Result<SrmRequest>;

    /// Poll a queued request. `None` means still pending, `Some` carries
    /// the ready TURLs. A failed request is an `Err`.
    async fn poll(&self, endpoint: &Uri, token: &str) -> Result<Option<Vec<String>>>;

    /// Commit a PUT reservation: the logical write is durable.
    async fn put_done(&self, endpoint: &Uri, surl: &Uri, token: &str) -> Result<()>;

    /// Release the server-side resources of a reservation.
    ///
    /// Idempotent and safe to call during error unwind.
    async fn release(&self, endpoint: &Uri, surl: &Uri, token: &str) -> Result<()>;

    /// Namespace stat over the SRM channel.
    async fn stat(&self, endpoint: &Uri, surl: &Uri) -> Result<Metadata>;

    /// Namespace unlink over the SRM channel.
    async fn unlink(&self, endpoint: &Uri, surl: &Uri) -> Result<()>;

    /// Namespace mkdir over the SRM channel.
    async fn mkdir(&self, endpoint: &Uri, surl: &Uri, mode: u32) -> Result<()>;

    /// Namespace chmod over the SRM channel.
    async fn chmod(&self, endpoint: &Uri, surl: &Uri, mode: u32) -> Result<()>;

    /// Transport protocols the endpoint advertises for third-party
    /// transfers, in the endpoint's preference order.
    async fn transfer_protocols(&self, endpoint: &Uri) -> Result<Vec<String>>;

    /// Execute a direct endpoint-to-endpoint transfer between two
    /// already-resolved TURLs. The data never crosses this process.
    async fn third_party_transfer(&self, src_turl: &Uri, dst_turl: &Uri) -> Result<()>;
}

/// Kind of a discovered storage endpoint.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum EndpointKind {
    /// SRM protocol, version 2.2.
    SrmV2,
    /// Legacy SRM, version 1.
    SrmV1,
    /// WebDAV door.
    WebDav,
    /// Advertised but unrecognized.
    Unknown,
}

/// One candidate endpoint of a logical hostname.
#[derive(Clone, Debug)]
pub struct Endpoint {
    /// Concrete endpoint URL, port included.
    pub url: Uri,
    /// Endpoint flavor.
    pub kind: EndpointKind,
}

/// Directory service resolving a logical hostname into candidate
/// endpoints (BDII-style lookup, external collaborator).
#[async_trait]
pub trait EndpointDirectory: Send + Sync + Debug + 'static {
    /// Return the candidate endpoints of `host`, best first.
    async fn resolve_endpoints(&self, host: &str) -> Result<Vec<Endpoint>>;
}
