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

use chrono::DateTime;
use chrono::Utc;

/// EntryMode represents the mode of an entry.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Default)]
pub enum EntryMode {
    /// A regular file.
    #[default]
    File,
    /// A directory.
    Dir,
    /// A symbolic link.
    Symlink,
    /// Unknown to the serving module.
    Unknown,
}

impl EntryMode {
    /// Check if this mode is a file.
    pub fn is_file(self) -> bool {
        self == EntryMode::File
    }

    /// Check if this mode is a dir.
    pub fn is_dir(self) -> bool {
        self == EntryMode::Dir
    }
}

/// Metadata carries the attributes a `stat` family call returns, uniform
/// across protocols.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Metadata {
    mode: EntryMode,
    size: u64,
    permissions: u32,
    modified: Option<DateTime<Utc>>,
}

impl Metadata {
    /// Create a new metadata with the given entry mode.
    pub fn new(mode: EntryMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    /// Entry mode of this entry.
    pub fn mode(&self) -> EntryMode {
        self.mode
    }

    /// Content length in bytes, 0 for directories.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Set content length.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// POSIX permission bits.
    pub fn permissions(&self) -> u32 {
        self.permissions
    }

    /// Set POSIX permission bits.
    pub fn with_permissions(mut self, permissions: u32) -> Self {
        self.permissions = permissions;
        self
    }

    /// Last modification time, if the serving module knows it.
    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.modified
    }

    /// Set last modification time.
    pub fn with_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = Some(modified);
        self
    }
}

/// A single directory entry yielded by `readdir`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DirEntry {
    name: String,
    metadata: Metadata,
}

impl DirEntry {
    /// Create a new dir entry.
    pub fn new(name: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            name: name.into(),
            metadata,
        }
    }

    /// Entry name relative to the opened directory.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attributes of this entry.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}
