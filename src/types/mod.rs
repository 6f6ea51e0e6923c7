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

mod error;
pub use error::Error;
pub use error::ErrorKind;
pub use error::Result;
pub(crate) use error::new_std_io_error;

mod uri;
pub use uri::Uri;

mod capability;
pub use capability::Capability;

mod metadata;
pub use metadata::DirEntry;
pub use metadata::EntryMode;
pub use metadata::Metadata;

mod ops;
pub use ops::AbortFlag;
pub use ops::AccessMode;
pub use ops::OpChecksum;
pub use ops::OpOpen;
pub use ops::OpenFlags;
