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

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

/// Configuration owned by a [`Context`][crate::Context].
///
/// There is no process-global state: every tunable lives here and travels
/// with the context value it was built into.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Deadline of one resolution request, polling included.
    #[serde(with = "humantime_ms")]
    pub operation_timeout: Duration,
    /// Delay between resolution status polls.
    #[serde(with = "humantime_ms")]
    pub poll_interval: Duration,
    /// Preference order of third-party transfer protocols, semicolon
    /// separated, e.g. `rfio;gsiftp`.
    ///
    /// Empty means: follow the source endpoint's advertised order.
    pub turl_3rd_party_protocols: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(180),
            poll_interval: Duration::from_millis(500),
            turl_3rd_party_protocols: String::new(),
        }
    }
}

impl Config {
    /// The configured protocol preference split into an ordered list.
    pub fn third_party_preference(&self) -> Vec<String> {
        self.turl_3rd_party_protocols
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

mod humantime_ms {
    use std::time::Duration;

    use serde::Deserialize;
    use serde::Deserializer;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_third_party_preference_split() {
        let config = Config {
            turl_3rd_party_protocols: "rfio;gsiftp".to_string(),
            ..Default::default()
        };
        assert_eq!(config.third_party_preference(), vec!["rfio", "gsiftp"]);

        let config = Config::default();
        assert!(config.third_party_preference().is_empty());
    }
}
