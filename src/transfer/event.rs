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
use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;

/// Stage of one copy operation's lifecycle, emitted in order.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum TransferStage {
    /// Source and destination are being resolved.
    Resolving,
    /// The transfer path is decided; the description distinguishes a
    /// negotiated direct transfer (`3rd party ...`) from the streamed
    /// fallback (`streamed ...`).
    ProtocolSelected,
    /// Payload bytes are moving.
    Transferring,
    /// End-to-end checksum comparison is running.
    ChecksumVerify,
    /// The copy completed.
    Done,
}

impl Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransferStage::Resolving => "RESOLVING",
            TransferStage::ProtocolSelected => "PROTOCOL_SELECTED",
            TransferStage::Transferring => "TRANSFERRING",
            TransferStage::ChecksumVerify => "CHECKSUM_VERIFY",
            TransferStage::Done => "DONE",
        };
        write!(f, "{s}")
    }
}

/// One lifecycle notification handed to transfer observers.
///
/// Events are delivered synchronously and not retained by the core.
#[derive(Clone, Debug)]
pub struct TransferEvent {
    /// Lifecycle stage.
    pub stage: TransferStage,
    /// Human-readable detail of the stage.
    pub description: String,
    /// Emission time.
    pub timestamp: DateTime<Utc>,
}

impl TransferEvent {
    pub(crate) fn new(stage: TransferStage, description: impl Into<String>) -> Self {
        Self {
            stage,
            description: description.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Observer callback registered on [`CopyOptions`][super::CopyOptions].
pub type TransferObserver = Arc<dyn Fn(&TransferEvent) + Send + Sync>;
