//! Per-tenant blog configuration consumed by the fetch pipeline.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::Deserialize;

/// Blog property holding the cache refresh period in seconds.
pub const CACHE_REFRESH_PROPERTY: &str = "caching-fetcher-refresh";
/// Refresh period used when the property is unset or unparsable.
pub const DEFAULT_REFRESH_SECS: u64 = 300;
/// Key of the tenant-wide fallback plugin chain.
pub const DEFAULT_CHAIN_KEY: &str = "default";
/// Flavor served when neither the requested nor the configured one exists.
pub const FALLBACK_FLAVOR: &str = "html";

#[derive(Debug, Clone, Deserialize)]
pub struct BlogSettings {
    pub id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default = "fallback_flavor")]
    pub default_flavor: String,
    #[serde(default)]
    pub flavors: BTreeSet<String>,
    #[serde(default)]
    pub linear_navigation: bool,
    #[serde(default)]
    pub ignore_flavors: BTreeSet<String>,
    /// Comma separated plugin identifiers keyed by flavor or `default`.
    #[serde(default)]
    pub plugins: BTreeMap<String, String>,
    /// Number of entries shown per page; `-1` disables the limit.
    #[serde(default = "default_display_entries")]
    pub display_entries: i64,
    /// Maximum category nesting included in flavor-wide loads.
    #[serde(default)]
    pub directory_depth: Option<u32>,
}

fn fallback_flavor() -> String {
    FALLBACK_FLAVOR.to_string()
}

fn default_display_entries() -> i64 {
    -1
}

impl BlogSettings {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: String::new(),
            properties: BTreeMap::new(),
            default_flavor: fallback_flavor(),
            flavors: BTreeSet::new(),
            linear_navigation: false,
            ignore_flavors: BTreeSet::new(),
            plugins: BTreeMap::new(),
            display_entries: default_display_entries(),
            directory_depth: None,
        }
    }

    /// Cache refresh period, parsed from the blog properties on every call so
    /// that edits to the property take effect without a restart.
    pub fn refresh_period(&self) -> Duration {
        let secs = self
            .properties
            .get(CACHE_REFRESH_PROPERTY)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(DEFAULT_REFRESH_SECS);
        Duration::from_secs(secs)
    }

    pub fn ignores_flavor(&self, flavor: &str) -> bool {
        self.ignore_flavors.contains(flavor)
    }

    /// Pick the flavor to serve: the requested one when the blog knows it,
    /// otherwise the configured default, otherwise `html`.
    pub fn resolve_flavor(&self, requested: Option<&str>) -> String {
        let requested = requested
            .map(str::trim)
            .filter(|value| self.flavors.contains(*value));
        if let Some(flavor) = requested {
            return flavor.to_string();
        }
        if self.flavors.contains(&self.default_flavor) {
            return self.default_flavor.clone();
        }
        FALLBACK_FLAVOR.to_string()
    }

    /// Resolve the plugin chain for a request.
    ///
    /// An explicit override wins even when empty; otherwise the flavor's chain
    /// is used when non-blank, falling back to the `default` chain.
    pub fn chain_for(&self, flavor: &str, override_chain: Option<&str>) -> ChainSpec {
        if let Some(raw) = override_chain {
            return ChainSpec::parse(raw);
        }

        match self.plugins.get(flavor) {
            Some(raw) if !raw.trim().is_empty() => ChainSpec::parse(raw),
            _ => self
                .plugins
                .get(DEFAULT_CHAIN_KEY)
                .map(|raw| ChainSpec::parse(raw))
                .unwrap_or_default(),
        }
    }
}

/// Ordered plugin identifiers for one request. Order is preserved and
/// duplicates are allowed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainSpec(Vec<String>);

impl ChainSpec {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(ids.into_iter().map(Into::into).collect())
    }

    /// Parse a comma separated list, dropping blank items.
    pub fn parse(raw: &str) -> Self {
        Self(
            raw.split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
