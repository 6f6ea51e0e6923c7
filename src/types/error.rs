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

//! Errors that returned by gridal.
//!
//! Every failing public operation yields an [`Error`] carrying a stable
//! machine-checkable [`ErrorKind`] plus human-readable context. Module
//! implementations report failures in their own vocabulary; the dispatch
//! boundary translates them into this taxonomy and never lets a
//! module-specific error type escape.

use std::fmt;
use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;
use std::io;

/// Result that is a wrapper of `Result<T, gridal::Error>`
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// ErrorKind is all kinds of Error of gridal.
///
/// The set is uniform across protocols: a permission failure from any
/// module always reports [`ErrorKind::PermissionDenied`], whatever the
/// protocol called it on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// No registered module matches the URL scheme.
    UnsupportedScheme,
    /// The matched module doesn't implement this operation.
    ///
    /// This is the only kind that triggers automatic fallback to the next
    /// candidate module during dispatch; every other kind is terminal for
    /// that call.
    NotSupported,
    /// The given arguments are invalid, e.g. a malformed URL.
    InvalidArgument,
    /// The given file handle id is unknown or already closed.
    InvalidHandle,
    /// The given path is not found.
    NotFound,
    /// The given path doesn't have enough permission for this operation.
    PermissionDenied,
    /// Resolution produced no transport URL with a usable module.
    NoRoute,
    /// The operation didn't complete within the caller-supplied deadline,
    /// or was aborted by the caller.
    Timeout,
    /// Transfer negotiation found no protocol common to both endpoints.
    ///
    /// Not itself a copy failure: callers use it to pick the streamed
    /// fallback instead of a direct transfer.
    ProtocolMismatch,
    /// The remote collaborator reported a failure; wraps the underlying
    /// code/message as the error source.
    RemoteFailure,
    /// gridal doesn't know what happened here.
    Internal,
}

impl ErrorKind {
    /// Convert self into static str.
    pub fn into_static(self) -> &'static str {
        self.into()
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.into_static())
    }
}

impl From<ErrorKind> for &'static str {
    fn from(v: ErrorKind) -> &'static str {
        match v {
            ErrorKind::UnsupportedScheme => "UnsupportedScheme",
            ErrorKind::NotSupported => "NotSupported",
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::InvalidHandle => "InvalidHandle",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::NoRoute => "NoRoute",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::ProtocolMismatch => "ProtocolMismatch",
            ErrorKind::RemoteFailure => "RemoteFailure",
            ErrorKind::Internal => "Internal",
        }
    }
}

/// Error is the error struct returned by all gridal functions.
///
/// ## Display
///
/// Error will be printed in a single line:
///
/// ```shell
/// NotFound at Stat, context: { url: srm://se.example/f } => entry does not exist
/// ```
///
/// `Debug` prints multi lines with context and the source chain.
pub struct Error {
    kind: ErrorKind,
    message: String,

    operation: &'static str,
    context: Vec<(&'static str, String)>,
    source: Option<anyhow::Error>,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if !self.operation.is_empty() {
            write!(f, " at {}", self.operation)?;
        }

        if !self.context.is_empty() {
            write!(f, ", context: {{ ")?;
            write!(
                f,
                "{}",
                self.context
                    .iter()
                    .map(|(k, v)| format!("{k}: {v}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            )?;
            write!(f, " }}")?;
        }

        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }

        if let Some(source) = &self.source {
            write!(f, ", source: {source}")?;
        }

        Ok(())
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // If alternate has been specified, print the struct-style debug.
        if f.alternate() {
            let mut de = f.debug_struct("Error");
            de.field("kind", &self.kind);
            de.field("message", &self.message);
            de.field("operation", &self.operation);
            de.field("context", &self.context);
            de.field("source", &self.source);
            return de.finish();
        }

        write!(f, "{}", self.kind)?;
        if !self.operation.is_empty() {
            write!(f, " at {}", self.operation)?;
        }
        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }
        writeln!(f)?;

        if !self.context.is_empty() {
            writeln!(f)?;
            writeln!(f, "Context:")?;
            for (k, v) in self.context.iter() {
                writeln!(f, "   {k}: {v}")?;
            }
        }
        if let Some(source) = &self.source {
            writeln!(f)?;
            writeln!(f, "Source:")?;
            writeln!(f, "   {source:#}")?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|v| v.as_ref())
    }
}

impl Error {
    /// Create a new Error with error kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),

            operation: "",
            context: Vec::default(),
            source: None,
        }
    }

    /// Update error's operation.
    ///
    /// # Notes
    ///
    /// If the error already carries an operation, we will push a new context
    /// `(called, operation)`.
    pub fn with_operation(mut self, operation: impl Into<&'static str>) -> Self {
        if !self.operation.is_empty() {
            self.context.push(("called", self.operation.to_string()));
        }

        self.operation = operation.into();
        self
    }

    /// Add more context in error.
    pub fn with_context(mut self, key: &'static str, value: impl ToString) -> Self {
        self.context.push((key, value.to_string()));
        self
    }

    /// Set source for error.
    ///
    /// # Notes
    ///
    /// If the source has been set, we will raise a panic here.
    pub fn set_source(mut self, src: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "the source error has been set");

        self.source = Some(src.into());
        self
    }

    /// Return error's kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Return error's message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        let kind = match err.kind() {
            ErrorKind::NotFound => io::ErrorKind::NotFound,
            ErrorKind::PermissionDenied => io::ErrorKind::PermissionDenied,
            ErrorKind::InvalidArgument => io::ErrorKind::InvalidInput,
            ErrorKind::Timeout => io::ErrorKind::TimedOut,
            _ => io::ErrorKind::Other,
        };

        io::Error::new(kind, err)
    }
}

/// Parse std io error into gridal::Error.
pub(crate) fn new_std_io_error(err: io::Error) -> Error {
    use std::io::ErrorKind::*;

    let kind = match err.kind() {
        NotFound => ErrorKind::NotFound,
        PermissionDenied => ErrorKind::PermissionDenied,
        InvalidInput => ErrorKind::InvalidArgument,
        Unsupported => ErrorKind::NotSupported,
        TimedOut => ErrorKind::Timeout,
        _ => ErrorKind::Internal,
    };

    Error::new(kind, err.kind().to_string()).set_source(err)
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use pretty_assertions::assert_eq;
    use std::sync::LazyLock;

    use super::*;

    static TEST_ERROR: LazyLock<Error> = LazyLock::new(|| Error {
        kind: ErrorKind::RemoteFailure,
        message: "srm endpoint rejected the request".to_string(),
        operation: "SrmModule::open",
        context: vec![
            ("url", "srm://se.example/dteam/f".to_string()),
            ("token", "req-123".to_string()),
        ],
        source: Some(anyhow!("SRM_FAILURE: no free space")),
    });

    #[test]
    fn test_error_display() {
        let s = format!("{}", LazyLock::force(&TEST_ERROR));
        assert_eq!(
            s,
            r#"RemoteFailure at SrmModule::open, context: { url: srm://se.example/dteam/f, token: req-123 } => srm endpoint rejected the request, source: SRM_FAILURE: no free space"#
        );
    }

    #[test]
    fn test_error_debug() {
        let s = format!("{:?}", LazyLock::force(&TEST_ERROR));
        assert_eq!(
            s,
            r#"RemoteFailure at SrmModule::open => srm endpoint rejected the request

Context:
   url: srm://se.example/dteam/f
   token: req-123

Source:
   SRM_FAILURE: no free space
"#
        )
    }

    #[test]
    fn test_error_with_operation_stacks_context() {
        let err = Error::new(ErrorKind::NotFound, "entry does not exist")
            .with_operation("Module::stat")
            .with_operation("Context::stat");

        assert_eq!(err.kind(), ErrorKind::NotFound);
        let s = format!("{err}");
        assert!(s.contains("called: Module::stat"), "{s}");
        assert!(s.contains("at Context::stat"), "{s}");
    }
}
