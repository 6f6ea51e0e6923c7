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

//! Arguments of the POSIX-like operation surface.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Open flags of the `open` operation, the portable subset of the POSIX
/// `O_*` set that dispatch actually interprets.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct OpenFlags {
    /// Open for reading.
    pub read: bool,
    /// Open for writing.
    pub write: bool,
    /// Create the file if it doesn't exist.
    ///
    /// For SRM-like modules this selects PUT-mode resolution.
    pub create: bool,
    /// Truncate to zero length on open.
    pub truncate: bool,
    /// Append to the end of the file.
    pub append: bool,
}

impl OpenFlags {
    /// Flags of a plain read-only open.
    pub fn read_only() -> Self {
        Self {
            read: true,
            ..Default::default()
        }
    }

    /// Flags of a create-and-truncate write open.
    pub fn write_create() -> Self {
        Self {
            write: true,
            create: true,
            truncate: true,
            ..Default::default()
        }
    }

    /// Whether these flags imply a mutating open.
    pub fn is_write(self) -> bool {
        self.write || self.create || self.append || self.truncate
    }
}

/// Arguments of the `open` operation.
#[derive(Clone, Debug, Default)]
pub struct OpOpen {
    /// Open flags.
    pub flags: OpenFlags,
    /// POSIX mode bits applied on create.
    pub mode: u32,
    /// Abort signal observed at suspend points during resolution.
    pub abort: AbortFlag,
}

impl OpOpen {
    /// Create open args from flags with default mode bits.
    pub fn new(flags: OpenFlags) -> Self {
        Self {
            flags,
            mode: 0o644,
            abort: AbortFlag::default(),
        }
    }
}

/// Arguments of the `access` operation, POSIX `F_OK`/`R_OK`/`W_OK`/`X_OK`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct AccessMode {
    /// Check for existence only.
    pub exists: bool,
    /// Check read permission.
    pub read: bool,
    /// Check write permission.
    pub write: bool,
    /// Check execute/search permission.
    pub execute: bool,
}

/// Arguments of the `checksum` operation.
#[derive(Clone, Debug)]
pub struct OpChecksum {
    /// Digest algorithm name, lowercase: `md5`, `sha256`, `crc32`, `adler32`.
    pub algorithm: String,
    /// Start offset of the checksummed range.
    pub offset: u64,
    /// Length of the checksummed range, `None` meaning up to end of file.
    ///
    /// A module whose protocol cannot express byte ranges rejects a
    /// partial-range request with `NotSupported`.
    pub length: Option<u64>,
}

impl OpChecksum {
    /// Checksum the whole entry with the given algorithm.
    pub fn new(algorithm: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into().to_lowercase(),
            offset: 0,
            length: None,
        }
    }

    /// Whether this request covers less than the whole entry.
    pub fn is_partial(&self) -> bool {
        self.offset != 0 || self.length.is_some()
    }
}

/// Cooperative abort signal shared between a caller and an in-flight
/// operation.
///
/// Cancellation is observed at the next suspend point (resolution polling,
/// data-plane I/O), never injected into already-running code. An operation
/// that observes the flag after obtaining a server-side reservation still
/// attempts a best-effort release of it.
#[derive(Clone, Debug, Default)]
pub struct AbortFlag {
    flag: Arc<AtomicBool>,
}

impl AbortFlag {
    /// Create a fresh, unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request abort; visible to every clone of this flag.
    pub fn abort(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Check whether abort was requested.
    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_flag_shared_between_clones() {
        let flag = AbortFlag::new();
        let observer = flag.clone();
        assert!(!observer.is_aborted());

        flag.abort();
        assert!(observer.is_aborted());
    }

    #[test]
    fn test_open_flags_write_detection() {
        assert!(!OpenFlags::read_only().is_write());
        assert!(OpenFlags::write_create().is_write());
        assert!(OpenFlags {
            append: true,
            ..Default::default()
        }
        .is_write());
    }
}
