//! Provider Registry
//!
//! Maps names to provider instances. Registration is one-shot: a name
//! cannot be replaced or removed once taken.

use crate::error::{Result, TimerError};
use crate::provider::Provider;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};
use tracing::debug;

/// Named provider instances that timer stores are built from.
///
/// Most callers create one `Registry` and pass it around. Code that
/// wants a single process-wide table can use [`Registry::global`].
#[derive(Default)]
pub struct Registry {
    providers: RwLock<HashMap<String, Arc<dyn Provider>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry, created on first use.
    pub fn global() -> &'static Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(Registry::new)
    }

    /// Registers `provider` under `name`. Fails with
    /// [`TimerError::Duplicate`] if the name is taken; the first
    /// registration stays in place.
    pub fn register(&self, name: impl Into<String>, provider: Arc<dyn Provider>) -> Result<()> {
        let name = name.into();
        let mut providers = self.providers.write().unwrap_or_else(|e| e.into_inner());
        if providers.contains_key(&name) {
            return Err(TimerError::Duplicate(name));
        }
        debug!(provider = %name, "Registered provider");
        providers.insert(name, provider);
        Ok(())
    }

    /// Looks up a provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// Like [`get`](Self::get), but an unknown name is
    /// [`TimerError::UnknownProvider`].
    pub fn lookup(&self, name: &str) -> Result<Arc<dyn Provider>> {
        self.get(name)
            .ok_or_else(|| TimerError::UnknownProvider(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(name)
    }
}
