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

use std::fmt;
use std::fmt::Display;
use std::fmt::Formatter;
use std::str::FromStr;

use crate::Error;
use crate::ErrorKind;
use crate::Result;

/// Parsed representation of an absolute storage URL.
///
/// Pure string transformation, no network access. Parsing is idempotent:
/// re-parsing the [`Display`] form of a parsed value yields a value equal
/// in all fields.
///
/// Malformed input yields an [`ErrorKind::InvalidArgument`] error, never a
/// partially filled value.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Uri {
    scheme: String,
    domain: String,
    port: u16,
    path: String,
    query: String,
}

impl Uri {
    /// Parse an absolute URL of the form `scheme://host[:port][/path][?query]`.
    pub fn parse(raw: &str) -> Result<Self> {
        let malformed = |message: &str| {
            Error::new(ErrorKind::InvalidArgument, message.to_string()).with_context("uri", raw)
        };

        let (scheme, rest) = raw
            .split_once("://")
            .ok_or_else(|| malformed("missing scheme separator"))?;
        if scheme.is_empty() {
            return Err(malformed("empty scheme"));
        }
        if !scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        {
            return Err(malformed("invalid character in scheme"));
        }

        let (authority, rest) = match rest.find(['/', '?']) {
            Some(idx) if rest.as_bytes()[idx] == b'/' => rest.split_at(idx),
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };

        let (path, query) = match rest.split_once('?') {
            Some((p, q)) => (p, q),
            None => (rest, ""),
        };

        // IPv6 literals keep their brackets verbatim in `domain`.
        let (domain, port_part) = if let Some(stripped) = authority.strip_prefix('[') {
            let end = stripped
                .find(']')
                .ok_or_else(|| malformed("unterminated ipv6 literal"))?;
            let domain = &authority[..end + 2];
            let tail = &authority[end + 2..];
            match tail.strip_prefix(':') {
                Some(p) => (domain, Some(p)),
                None if tail.is_empty() => (domain, None),
                None => return Err(malformed("unexpected characters after ipv6 literal")),
            }
        } else {
            match authority.split_once(':') {
                Some((d, p)) => (d, Some(p)),
                None => (authority, None),
            }
        };

        let port = match port_part {
            // Absent port is 0, not an error.
            None => 0,
            Some(p) => p
                .parse::<u16>()
                .map_err(|err| malformed("invalid port").set_source(err))?,
        };

        Ok(Self {
            scheme: scheme.to_string(),
            domain: domain.to_string(),
            port,
            path: path.to_string(),
            query: query.to_string(),
        })
    }

    /// URL scheme, always non-empty.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Host part: hostname, IPv4, or a bracketed IPv6 literal.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Port, `0` when the URL doesn't carry one.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Path verbatim as it appeared after the authority, possibly empty.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query string without the leading `?`, empty when absent.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Return a copy of this URI with another path.
    pub fn with_path(&self, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..self.clone()
        }
    }

    /// Return a copy keeping only scheme, host, and port.
    ///
    /// This is the endpoint address of a URL: the path and query belong
    /// to the entry, not to the server serving it.
    pub fn origin(&self) -> Self {
        Self {
            path: String::new(),
            query: String::new(),
            ..self.clone()
        }
    }
}

impl Display for Uri {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.domain)?;
        if self.port != 0 {
            write!(f, ":{}", self.port)?;
        }
        write!(f, "{}", self.path)?;
        if !self.query.is_empty() {
            write!(f, "?{}", self.query)?;
        }
        Ok(())
    }
}

impl FromStr for Uri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uri::parse(s)
    }
}
