//! Backing store trait describing the persistence adapter behind the cache.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::blog::BlogSettings;
use crate::domain::entities::{Entry, EntryList};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("blog `{blog}` not found")]
    UnknownBlog { blog: String },
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Durable source of blog entries. Implementations return entries newest
/// first.
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Every entry of the blog for `flavor`, limited to categories at most
    /// `depth` levels deep when a depth is given.
    async fn load_entries_for_flavor(
        &self,
        blog: &BlogSettings,
        flavor: &str,
        depth: Option<u32>,
    ) -> Result<EntryList, RepoError>;

    async fn load_entries_for_category(
        &self,
        blog: &BlogSettings,
        category: &str,
    ) -> Result<EntryList, RepoError>;

    /// Single entry addressed by its permalink; `None` when nothing matches.
    async fn load_entry_by_permalink(
        &self,
        blog: &BlogSettings,
        permalink: &str,
    ) -> Result<Option<Entry>, RepoError>;
}
