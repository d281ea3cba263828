use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::warn;

use super::builtin::{DAYS_SINCE_POSTED, DaysSincePosted, ENTRIES_LIMITER, EntriesLimiter};
use super::types::{Plugin, PluginError};
use crate::domain::blog::{BlogSettings, ChainSpec};

type Factory = Arc<dyn Fn() -> Box<dyn Plugin> + Send + Sync>;

/// Maps plugin identifiers to factories producing request-scoped instances.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    factories: BTreeMap<String, Factory>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the plugins shipped in this crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(ENTRIES_LIMITER, || EntriesLimiter);
        registry.register(DAYS_SINCE_POSTED, DaysSincePosted::new);
        registry
    }

    /// Register `factory` under `id`, replacing any previous registration.
    pub fn register<F, P>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn() -> P + Send + Sync + 'static,
        P: Plugin + 'static,
    {
        self.factories
            .insert(id.into(), Arc::new(move || Box::new(factory()) as Box<dyn Plugin>));
    }

    pub fn resolve(&self, id: &str) -> Result<Box<dyn Plugin>, PluginError> {
        self.factories
            .get(id)
            .map(|factory| factory())
            .ok_or_else(|| PluginError::NotFound { id: id.to_string() })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Check every chain a blog configures against the registry, returning
    /// `(chain, plugin)` pairs that will be skipped at request time.
    pub fn unresolved(&self, blog: &BlogSettings) -> Vec<(String, String)> {
        let mut missing = Vec::new();
        for (chain, raw) in &blog.plugins {
            let spec = ChainSpec::parse(raw);
            for id in spec.ids().filter(|id| !self.contains(id)) {
                warn!(
                    tenant = %blog.id,
                    chain = %chain,
                    plugin = id,
                    "configured plugin is not registered"
                );
                missing.push((chain.clone(), id.to_string()));
            }
        }
        missing
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
