//! Caching fetch coordinator.
//!
//! Resolves the entry list for a request through the shared [`CacheStore`],
//! serving expired lists immediately while a single supervised background
//! refresh replaces them.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::application::context::{RequestContext, keys};
use crate::application::repos::{BackingStore, RepoError};
use crate::cache::{
    CacheConfig, CacheKey, CacheStore, DrainReport, Lookup, RefreshScheduler, Scope,
};
use crate::domain::blog::BlogSettings;
use crate::domain::entities::{Entry, EntryList, ROOT_CATEGORY};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to populate cache key `{key}`")]
    MissFill {
        key: String,
        #[source]
        source: RepoError,
    },
    #[error("failed to load permalink `{permalink}`")]
    Permalink {
        permalink: String,
        #[source]
        source: RepoError,
    },
}

/// What a request asks the fetcher for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub flavor: String,
    pub category: String,
    pub permalink: Option<String>,
}

impl FetchRequest {
    pub fn new(flavor: impl Into<String>) -> Self {
        Self {
            flavor: flavor.into(),
            category: ROOT_CATEGORY.to_string(),
            permalink: None,
        }
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn permalink(mut self, permalink: impl Into<String>) -> Self {
        self.permalink = Some(permalink.into());
        self
    }

    pub fn scope(&self) -> Scope {
        Scope::for_request(&self.flavor, &self.category)
    }
}

/// Entries adjacent to a permalink entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbors {
    pub previous: Option<Arc<Entry>>,
    pub next: Option<Arc<Entry>>,
}

/// Locate `id` in `entries` and return its neighbours; `None` when the entry
/// is not part of the list.
pub fn neighbors(entries: &[Arc<Entry>], id: &str) -> Option<Neighbors> {
    let index = entries.iter().position(|entry| entry.id == id)?;
    Some(Neighbors {
        previous: index
            .checked_sub(1)
            .and_then(|previous| entries.get(previous))
            .cloned(),
        next: entries.get(index + 1).cloned(),
    })
}

pub struct CachingFetcher {
    store: Arc<dyn BackingStore>,
    refresher: RefreshScheduler<EntryList>,
    shutdown_grace: Duration,
}

impl CachingFetcher {
    pub fn new(
        store: Arc<dyn BackingStore>,
        cache: Arc<CacheStore<EntryList>>,
        config: &CacheConfig,
    ) -> Self {
        Self {
            store,
            refresher: RefreshScheduler::new(cache, config),
            shutdown_grace: config.shutdown_grace(),
        }
    }

    pub fn cache(&self) -> &Arc<CacheStore<EntryList>> {
        self.refresher.store()
    }

    /// Number of background refreshes still running.
    pub fn refreshes_in_flight(&self) -> usize {
        self.refresher.in_flight()
    }

    /// Produce the entry list for a request.
    ///
    /// Ignored flavors yield nothing. Permalink requests load their entry
    /// directly and, with linear navigation enabled, resolve the surrounding
    /// list through the cache to publish neighbour links into `ctx`.
    #[instrument(
        skip_all,
        fields(tenant = %blog.id, flavor = %request.flavor, category = %request.category)
    )]
    pub async fn fetch_entries(
        &self,
        blog: &BlogSettings,
        request: &FetchRequest,
        ctx: &mut RequestContext,
    ) -> Result<EntryList, FetchError> {
        if blog.ignores_flavor(&request.flavor) {
            debug!("flavor ignored; skipping fetch");
            return Ok(EntryList::from([]));
        }

        let refresh_period = blog.refresh_period();
        match request.permalink.as_deref() {
            Some(permalink) => {
                self.fetch_permalink(blog, request.scope(), permalink, refresh_period, ctx)
                    .await
            }
            None => self.resolve(blog, request.scope(), refresh_period).await,
        }
    }

    /// Resolve a scope through the cache with stale-while-revalidate.
    pub async fn resolve(
        &self,
        blog: &BlogSettings,
        scope: Scope,
        refresh_period: Duration,
    ) -> Result<EntryList, FetchError> {
        let key = CacheKey::new(blog.id.clone(), scope);
        let cache = self.refresher.store();

        match cache.get(&key, refresh_period) {
            Lookup::Fresh(entries) => Ok(entries),
            Lookup::Miss => {
                info!(cache_key = %key, "cache miss; loading from backing store");
                let entries = load_scope(self.store.as_ref(), blog, key.scope())
                    .await
                    .map_err(|source| FetchError::MissFill {
                        key: key.to_string(),
                        source,
                    })?;
                cache.put(key, entries.clone());
                Ok(entries)
            }
            Lookup::Stale(entries) => {
                match cache.claim_refresh(&key) {
                    Some(ticket) => {
                        debug!(cache_key = %key, "serving stale entries; refresh scheduled");
                        let store = Arc::clone(&self.store);
                        let blog = blog.clone();
                        let scope = key.scope().clone();
                        self.refresher.spawn(ticket, async move {
                            load_scope(store.as_ref(), &blog, &scope).await
                        });
                    }
                    None => {
                        debug!(cache_key = %key, "serving stale entries; refresh already in flight");
                    }
                }
                Ok(entries)
            }
        }
    }

    /// Drop a cached list and abort any refresh still working on it.
    pub fn invalidate(&self, blog_id: &str, scope: Scope) -> bool {
        let key = CacheKey::new(blog_id, scope);
        let removed = self.refresher.store().invalidate(&key);
        self.refresher.cancel(&key);
        info!(cache_key = %key, removed, "cache key invalidated");
        removed
    }

    /// Drain background refreshes, aborting those that outlive the grace
    /// period.
    pub async fn shutdown(&self) -> DrainReport {
        self.refresher.shutdown(self.shutdown_grace).await
    }

    async fn fetch_permalink(
        &self,
        blog: &BlogSettings,
        scope: Scope,
        permalink: &str,
        refresh_period: Duration,
        ctx: &mut RequestContext,
    ) -> Result<EntryList, FetchError> {
        ctx.insert(keys::PERMALINK, permalink);

        let entry = self
            .store
            .load_entry_by_permalink(blog, permalink)
            .await
            .map_err(|source| FetchError::Permalink {
                permalink: permalink.to_string(),
                source,
            })?;

        let Some(entry) = entry else {
            debug!(permalink, "permalink matched no entry");
            return Ok(EntryList::from([]));
        };
        let entry = Arc::new(entry);

        if blog.linear_navigation {
            match self.resolve(blog, scope, refresh_period).await {
                Ok(all) => match neighbors(&all, &entry.id) {
                    Some(found) => {
                        if let Some(previous) = found.previous {
                            ctx.insert_serialized(keys::PERMALINK_PREVIOUS_ENTRY, previous.as_ref());
                        }
                        if let Some(next) = found.next {
                            ctx.insert_serialized(keys::PERMALINK_NEXT_ENTRY, next.as_ref());
                        }
                    }
                    None => debug!(
                        permalink,
                        entry_id = %entry.id,
                        "permalink entry missing from list; navigation omitted"
                    ),
                },
                Err(error) => warn!(
                    permalink,
                    error = %error,
                    "navigation lookup failed; navigation omitted"
                ),
            }
        }

        Ok(EntryList::from([entry]))
    }
}

async fn load_scope(
    store: &dyn BackingStore,
    blog: &BlogSettings,
    scope: &Scope,
) -> Result<EntryList, RepoError> {
    match scope {
        Scope::Flavor(flavor) => {
            store
                .load_entries_for_flavor(blog, flavor, blog.directory_depth)
                .await
        }
        Scope::Category(category) => store.load_entries_for_category(blog, category).await,
    }
}
