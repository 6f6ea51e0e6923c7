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

/// Capability is used to describe what operations are supported by a
/// registered module.
///
/// A `true` flag means the module implements the operation natively; a
/// `false` flag means dispatch will see [`ErrorKind::NotSupported`][crate::ErrorKind::NotSupported]
/// and may fall through to a lower-priority module for the same scheme.
#[derive(Copy, Clone, Default)]
pub struct Capability {
    /// If the module supports open/read/write/seek/close, it will be true.
    pub open: bool,
    /// If the module supports stat, it will be true.
    pub stat: bool,
    /// If the module supports access, it will be true.
    pub access: bool,
    /// If the module supports mkdir, it will be true.
    pub mkdir: bool,
    /// If the module supports unlink, it will be true.
    pub unlink: bool,
    /// If the module supports chmod, it will be true.
    pub chmod: bool,
    /// If the module supports rename, it will be true.
    pub rename: bool,
    /// If the module supports opendir/readdir, it will be true.
    pub opendir: bool,
    /// If the module supports checksum, it will be true.
    pub checksum: bool,
    /// If the module supports checksum over a byte range, it will be true.
    pub checksum_with_range: bool,
    /// If the module can drive a direct transfer between two remote
    /// endpoints, it will be true.
    pub third_party_copy: bool,
}

impl Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = vec![];

        if self.open {
            s.push("Open");
        }
        if self.stat {
            s.push("Stat");
        }
        if self.access {
            s.push("Access");
        }
        if self.mkdir {
            s.push("Mkdir");
        }
        if self.unlink {
            s.push("Unlink");
        }
        if self.chmod {
            s.push("Chmod");
        }
        if self.rename {
            s.push("Rename");
        }
        if self.opendir {
            s.push("Opendir");
        }
        if self.checksum {
            s.push("Checksum");
        }
        if self.third_party_copy {
            s.push("ThirdPartyCopy");
        }

        write!(f, "{{ {} }}", s.join(" | "))
    }
}

impl Capability {
    /// Capability of a full data-plane module.
    pub fn full() -> Self {
        Self {
            open: true,
            stat: true,
            access: true,
            mkdir: true,
            unlink: true,
            chmod: true,
            rename: true,
            opendir: true,
            checksum: true,
            checksum_with_range: true,
            third_party_copy: false,
        }
    }
}
