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

//! Storage-Resource-Manager resolution: logical URL to transport URL,
//! with a server-issued request token held across the session and a
//! deferred, exactly-once finalize at close.

mod resolver;
pub use resolver::Endpoint;
pub use resolver::EndpointDirectory;
pub use resolver::EndpointKind;
pub use resolver::SrmRequest;
pub use resolver::SrmRequestMode;
pub use resolver::SrmResolver;

mod session;
pub use session::SrmSession;
pub use session::SrmSessionStatus;

mod module;
pub use module::SrmModule;
