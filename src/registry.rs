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

use std::sync::Arc;
use std::sync::RwLock;

use log::debug;

use crate::*;

struct Registration {
    module: Arc<dyn Module>,
    // Registration sequence breaks priority ties: first registered wins.
    seq: u64,
}

/// Registry maps URL schemes to the ordered list of modules serving them.
///
/// Read-mostly and shared by all dispatches via `Arc<Registry>`. Mutation
/// (register/unregister) takes the write lock; resolution snapshots the
/// matching `Arc<dyn Module>`s, so in-flight operations keep their module
/// alive across a concurrent unregister.
#[derive(Default)]
pub struct Registry {
    inner: RwLock<Vec<Registration>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module.
    ///
    /// Modules sharing a scheme are resolved by descending priority, ties
    /// broken by registration order.
    pub fn register(&self, module: Arc<dyn Module>) {
        let info = module.info();
        debug!(
            "register module {} for schemes {:?} with priority {}",
            info.name(),
            info.schemes(),
            info.priority()
        );

        let mut inner = self.inner.write().expect("registry lock poisoned");
        let seq = inner.last().map(|r| r.seq + 1).unwrap_or(0);
        inner.push(Registration { module, seq });
    }

    /// Remove the module with the given name.
    ///
    /// Removal keys on the unique module name rather than a scheme:
    /// several modules may share a scheme, and removal must be able to
    /// target exactly one of them. Operations already holding a resolved
    /// `Arc<dyn Module>` continue safely to completion.
    pub fn unregister(&self, name: &str) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.retain(|r| r.module.info().name() != name);
    }

    /// Return all modules serving `scheme`, highest priority first.
    ///
    /// An empty result means the scheme is unsupported; use
    /// [`Registry::resolve_required`] to turn that into an error.
    pub fn resolve(&self, scheme: &str) -> Vec<Arc<dyn Module>> {
        let inner = self.inner.read().expect("registry lock poisoned");

        let mut matches: Vec<(&Registration, ModuleInfo)> = inner
            .iter()
            .map(|r| (r, r.module.info()))
            .filter(|(_, info)| info.matches(scheme))
            .collect();
        matches.sort_by(|(a, ia), (b, ib)| {
            ib.priority()
                .cmp(&ia.priority())
                .then_with(|| a.seq.cmp(&b.seq))
        });

        matches.into_iter().map(|(r, _)| r.module.clone()).collect()
    }

    /// Like [`Registry::resolve`] but maps the empty result to
    /// `UnsupportedScheme`.
    pub fn resolve_required(&self, scheme: &str) -> Result<Vec<Arc<dyn Module>>> {
        let modules = self.resolve(scheme);
        if modules.is_empty() {
            return Err(Error::new(
                ErrorKind::UnsupportedScheme,
                "no module registered for scheme",
            )
            .with_context("scheme", scheme));
        }
        Ok(modules)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read().expect("registry lock poisoned");
        let names: Vec<_> = inner.iter().map(|r| r.module.info().name()).collect();
        f.debug_struct("Registry").field("modules", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Debug)]
    struct FakeModule {
        name: &'static str,
        schemes: Vec<&'static str>,
        priority: i32,
    }

    #[async_trait]
    impl Module for FakeModule {
        fn info(&self) -> ModuleInfo {
            ModuleInfo::new(self.name, &self.schemes, self.priority, Capability::full())
        }
    }

    fn fake(name: &'static str, schemes: &[&'static str], priority: i32) -> Arc<dyn Module> {
        Arc::new(FakeModule {
            name,
            schemes: schemes.to_vec(),
            priority,
        })
    }

    #[test]
    fn test_resolve_orders_by_priority() {
        let registry = Registry::new();
        registry.register(fake("low", &["srm"], 5));
        registry.register(fake("high", &["srm"], 10));

        let resolved = registry.resolve("srm");
        let names: Vec<_> = resolved.iter().map(|m| m.info().name()).collect();
        assert_eq!(names, vec!["high", "low"]);
    }

    #[test]
    fn test_resolve_ties_keep_registration_order() {
        let registry = Registry::new();
        registry.register(fake("first", &["gsiftp"], 7));
        registry.register(fake("second", &["gsiftp"], 7));

        let resolved = registry.resolve("gsiftp");
        let names: Vec<_> = resolved.iter().map(|m| m.info().name()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_unregister_leaves_remaining_module() {
        let registry = Registry::new();
        registry.register(fake("high", &["srm"], 10));
        registry.register(fake("low", &["srm"], 5));

        registry.unregister("high");

        let resolved = registry.resolve("srm");
        let names: Vec<_> = resolved.iter().map(|m| m.info().name()).collect();
        assert_eq!(names, vec!["low"]);
    }

    #[test]
    fn test_resolved_module_survives_unregister() {
        let registry = Registry::new();
        registry.register(fake("only", &["http"], 0));

        let resolved = registry.resolve("http");
        registry.unregister("only");

        // The snapshot still owns the module.
        assert_eq!(resolved[0].info().name(), "only");
        assert!(registry.resolve("http").is_empty());
    }

    #[test]
    fn test_unknown_scheme_is_unsupported() {
        let registry = Registry::new();
        let err = registry.resolve_required("rfio").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedScheme);
    }

    #[test]
    fn test_scheme_match_is_case_insensitive() {
        let registry = Registry::new();
        registry.register(fake("dav", &["davs"], 0));
        assert_eq!(registry.resolve("DAVS").len(), 1);
    }
}
