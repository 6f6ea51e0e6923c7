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

/// Select the transport protocol of a direct third-party transfer.
///
/// The caller's `preference` list is walked first; the first entry
/// advertised by both endpoints wins. With an empty or exhausted
/// preference list, the source's advertised order decides. `None` means
/// no common protocol exists and the caller falls back to a streamed
/// copy.
///
/// Inputs are ordered lists, never sets: given identical inputs the
/// result is always identical.
pub fn negotiate(
    source_protocols: &[String],
    dest_protocols: &[String],
    preference: &[String],
) -> Option<String> {
    let both = |p: &str| {
        source_protocols.iter().any(|s| s.eq_ignore_ascii_case(p))
            && dest_protocols.iter().any(|d| d.eq_ignore_ascii_case(p))
    };

    for candidate in preference {
        if both(candidate) {
            return Some(candidate.clone());
        }
    }

    for candidate in source_protocols {
        if dest_protocols
            .iter()
            .any(|d| d.eq_ignore_ascii_case(candidate))
        {
            return Some(candidate.clone());
        }
    }

    None
}
