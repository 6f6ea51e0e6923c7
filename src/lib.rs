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

//! Gridal is a protocol dispatch layer for grid storage: one POSIX-like
//! operation surface over pluggable protocol modules, with SRM-style
//! two-phase resolution and third-party transfer negotiation on top.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use gridal::services::MemoryModule;
//! use gridal::{Context, OpOpen, OpenFlags, Registry, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Register the modules this deployment speaks.
//!     let registry = Arc::new(Registry::new());
//!     registry.register(Arc::new(MemoryModule::new("mem")));
//!
//!     let ctx = Context::new(registry, Default::default());
//!
//!     // The same calls work whatever module serves the scheme.
//!     let fd = ctx
//!         .open("mem://host/hello.txt", OpOpen::new(OpenFlags::write_create()))
//!         .await?;
//!     ctx.write(fd, "Hello, World!".into()).await?;
//!     ctx.close(fd).await?;
//!
//!     let meta = ctx.stat("mem://host/hello.txt").await?;
//!     println!("size: {}", meta.size());
//!     Ok(())
//! }
//! ```
//!
//! # Concepts
//!
//! - [`Registry`]: scheme to module resolution, priority ordered.
//! - [`Module`]: the uniform operation contract a protocol implements.
//! - [`Context`]: the dispatch surface callers hold, owning the handle
//!   tables and the [`Config`].
//! - [`srm`]: the two-phase SURL resolution state machine and its module.
//! - [`transfer`]: copy between URLs with protocol negotiation and a
//!   streamed fallback.

#![warn(missing_docs)]
#![deny(unused_qualifications)]

mod types;
pub use types::*;

mod module;
pub use module::DirStream;
pub use module::Module;
pub use module::ModuleFile;
pub use module::ModuleInfo;

mod registry;
pub use registry::Registry;

mod handle;
pub use handle::DirHandle;
pub use handle::Handle;

mod config;
pub use config::Config;

mod context;
pub use context::Context;

pub mod services;
pub mod srm;
pub mod transfer;
