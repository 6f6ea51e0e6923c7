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

//! Built-in data-plane modules.
//!
//! These are not remote protocol wire code; they are the concrete
//! [`Module`][crate::Module] implementations a deployment registers so
//! resolved transport URLs have somewhere to land.

#[cfg(feature = "services-memory")]
mod memory;
#[cfg(feature = "services-memory")]
pub use memory::MemoryModule;

#[cfg(feature = "services-file")]
mod file;
#[cfg(feature = "services-file")]
pub use file::FileModule;

mod digest;
pub(crate) use digest::Digester;
