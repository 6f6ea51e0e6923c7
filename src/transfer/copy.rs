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

use std::sync::Arc;

use log::debug;
use log::warn;

use super::event::TransferEvent;
use super::event::TransferObserver;
use super::event::TransferStage;
use super::negotiate::negotiate;
use crate::*;

/// Tunables of one copy operation.
#[derive(Clone, Default)]
pub struct CopyOptions {
    /// Replace an existing destination instead of failing.
    pub overwrite: bool,
    /// Compare source and destination checksums after the transfer.
    pub verify_checksum: bool,
    /// Digest algorithm of the verification, `md5` by default.
    pub checksum_algorithm: Option<String>,
    /// Chunk size of the streamed fallback, in bytes.
    pub chunk_size: Option<usize>,

    observers: Vec<TransferObserver>,
}

impl std::fmt::Debug for CopyOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CopyOptions")
            .field("overwrite", &self.overwrite)
            .field("verify_checksum", &self.verify_checksum)
            .field("checksum_algorithm", &self.checksum_algorithm)
            .field("chunk_size", &self.chunk_size)
            .field("observers", &self.observers.len())
            .finish()
    }
}

const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

impl CopyOptions {
    /// Create options with defaults: no overwrite, no verification,
    /// 64 KiB streaming chunks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer receiving the ordered lifecycle events of
    /// this copy.
    pub fn add_event_callback(mut self, f: impl Fn(&TransferEvent) + Send + Sync + 'static) -> Self {
        self.observers.push(Arc::new(f));
        self
    }

    fn emit(&self, stage: TransferStage, description: impl Into<String>) {
        let event = TransferEvent::new(stage, description);
        debug!("transfer event {}: {}", event.stage, event.description);
        for observer in &self.observers {
            observer(&event);
        }
    }
}

/// Copy `src` to `dst`.
///
/// The protocol of the transfer is decided strictly before any data
/// moves: when both sides advertise transport protocols, the negotiator
/// picks a common one and the source-side module drives a direct
/// third-party transfer; otherwise the payload streams through this
/// process. A negotiation miss is a routing signal, not a failure.
pub(crate) async fn copy(
    ctx: &Context,
    options: &CopyOptions,
    src: &str,
    dst: &str,
) -> Result<()> {
    let src_uri = Uri::parse(src)?;
    let dst_uri = Uri::parse(dst)?;

    options.emit(
        TransferStage::Resolving,
        format!("resolving {src_uri} and {dst_uri}"),
    );

    // The source must exist before anything is created at the destination.
    let src_meta = ctx
        .stat(src)
        .await
        .map_err(|err| err.with_operation("transfer::copy"))?;

    match ctx.stat(dst).await {
        Ok(_) if !options.overwrite => {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "destination already exists and overwrite is disabled",
            )
            .with_operation("transfer::copy")
            .with_context("dst", dst_uri));
        }
        Ok(_) => {
            ctx.unlink(dst).await?;
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) if err.kind() == ErrorKind::NotSupported => {}
        Err(err) => return Err(err),
    }

    match select_direct_path(ctx, &src_uri, &dst_uri).await {
        Some((module, protocol)) => {
            options.emit(
                TransferStage::ProtocolSelected,
                format!("3rd party transfer using {protocol}"),
            );
            options.emit(
                TransferStage::Transferring,
                format!("{} -> {} ({} bytes)", src_uri, dst_uri, src_meta.size()),
            );
            module
                .third_party_copy(&src_uri, &dst_uri, &protocol)
                .await
                .map_err(|err| err.with_operation("transfer::copy"))?;
        }
        None => {
            options.emit(
                TransferStage::ProtocolSelected,
                "streamed transfer through local process",
            );
            options.emit(
                TransferStage::Transferring,
                format!("{} -> {} ({} bytes)", src_uri, dst_uri, src_meta.size()),
            );
            stream_copy(ctx, options, src, dst).await?;
        }
    }

    if options.verify_checksum {
        verify_checksum(ctx, options, src, dst).await?;
    }

    options.emit(TransferStage::Done, format!("{src_uri} -> {dst_uri}"));
    Ok(())
}

/// Decide whether a direct transfer is possible, returning the
/// source-side module and the negotiated protocol.
///
/// Requires a third-party capable module on the source scheme plus
/// advertised protocol lists on both sides; any gap routes to the
/// streamed fallback.
async fn select_direct_path(
    ctx: &Context,
    src: &Uri,
    dst: &Uri,
) -> Option<(Arc<dyn Module>, String)> {
    let src_module = ctx
        .registry()
        .resolve(src.scheme())
        .into_iter()
        .find(|m| m.info().capability().third_party_copy)?;
    let dst_module = ctx
        .registry()
        .resolve(dst.scheme())
        .into_iter()
        .find(|m| m.info().capability().third_party_copy)?;

    let src_protocols = match src_module.transfer_protocols(src).await {
        Ok(p) => p,
        Err(err) => {
            debug!("source side advertises no transfer protocols: {err}");
            return None;
        }
    };
    let dst_protocols = match dst_module.transfer_protocols(dst).await {
        Ok(p) => p,
        Err(err) => {
            debug!("destination side advertises no transfer protocols: {err}");
            return None;
        }
    };

    let preference = ctx.config().third_party_preference();
    match negotiate(&src_protocols, &dst_protocols, &preference) {
        Some(protocol) => Some((src_module, protocol)),
        None => {
            // ProtocolMismatch by taxonomy, but for copy it only means
            // "stream instead".
            debug!(
                "no common transfer protocol between {:?} and {:?}",
                src_protocols, dst_protocols
            );
            None
        }
    }
}

/// Streamed fallback: read from the source, write to the destination,
/// through this process.
async fn stream_copy(ctx: &Context, options: &CopyOptions, src: &str, dst: &str) -> Result<()> {
    let chunk = options.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);

    let src_fd = ctx.open(src, OpOpen::new(OpenFlags::read_only())).await?;

    let dst_fd = match ctx.open(dst, OpOpen::new(OpenFlags::write_create())).await {
        Ok(fd) => fd,
        Err(err) => {
            if let Err(close_err) = ctx.close(src_fd).await {
                warn!("closing source after failed destination open: {close_err}");
            }
            return Err(err);
        }
    };

    let moved = async {
        loop {
            let bs = ctx.read(src_fd, chunk).await?;
            if bs.is_empty() {
                break;
            }
            ctx.write(dst_fd, bs).await?;
        }
        Ok(())
    }
    .await;

    let src_closed = ctx.close(src_fd).await;
    let dst_closed = ctx.close(dst_fd).await;

    if let Err(err) = moved.and(src_closed).and(dst_closed) {
        // Don't leave a partial destination behind.
        if let Err(unlink_err) = ctx.unlink(dst).await {
            warn!("removing partial destination failed: {unlink_err}");
        }
        return Err(err.with_operation("transfer::stream_copy"));
    }
    Ok(())
}

/// Compare source and destination digests after the payload moved.
///
/// Sides that cannot produce the digest are skipped with a warning;
/// a real mismatch fails the copy.
async fn verify_checksum(
    ctx: &Context,
    options: &CopyOptions,
    src: &str,
    dst: &str,
) -> Result<()> {
    let algorithm = options
        .checksum_algorithm
        .clone()
        .unwrap_or_else(|| "md5".to_string());

    options.emit(
        TransferStage::ChecksumVerify,
        format!("comparing {algorithm} digests"),
    );

    // Both sides digest in parallel; they don't share state.
    let (src_sum, dst_sum) = futures::join!(
        ctx.checksum(src, OpChecksum::new(&algorithm)),
        ctx.checksum(dst, OpChecksum::new(&algorithm))
    );

    match (src_sum, dst_sum) {
        (Ok(s), Ok(d)) if s == d => Ok(()),
        (Ok(s), Ok(d)) => Err(Error::new(
            ErrorKind::RemoteFailure,
            "checksum mismatch after transfer",
        )
        .with_operation("transfer::verify_checksum")
        .with_context("source", s)
        .with_context("destination", d)),
        (Err(err), _) | (_, Err(err)) if err.kind() == ErrorKind::NotSupported => {
            warn!("checksum verification skipped: {err}");
            Ok(())
        }
        (Err(err), _) | (_, Err(err)) => Err(err),
    }
}
