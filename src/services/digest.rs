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

use md5::Digest;
use md5::Md5;
use sha2::Sha256;

use crate::Error;
use crate::ErrorKind;
use crate::Result;

/// Streaming digest shared by the built-in data planes.
///
/// An algorithm a module doesn't know is `NotSupported`, so dispatch can
/// fall through to another module for the same scheme.
pub(crate) enum Digester {
    Md5(Md5),
    Sha256(Sha256),
    Crc32(crc32fast::Hasher),
}

impl Digester {
    pub(crate) fn new(algorithm: &str) -> Result<Self> {
        match algorithm {
            "md5" => Ok(Digester::Md5(Md5::new())),
            "sha256" => Ok(Digester::Sha256(Sha256::new())),
            "crc32" => Ok(Digester::Crc32(crc32fast::Hasher::new())),
            _ => Err(
                Error::new(ErrorKind::NotSupported, "unknown checksum algorithm")
                    .with_context("algorithm", algorithm),
            ),
        }
    }

    pub(crate) fn update(&mut self, bs: &[u8]) {
        match self {
            Digester::Md5(h) => h.update(bs),
            Digester::Sha256(h) => h.update(bs),
            Digester::Crc32(h) => h.update(bs),
        }
    }

    pub(crate) fn finish(self) -> String {
        match self {
            Digester::Md5(h) => hex(&h.finalize()),
            Digester::Sha256(h) => hex(&h.finalize()),
            Digester::Crc32(h) => format!("{:08x}", h.finalize()),
        }
    }
}

fn hex(bs: &[u8]) -> String {
    bs.iter().map(|b| format!("{b:02x}")).collect()
}
