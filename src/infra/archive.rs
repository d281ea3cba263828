//! TOML content archive acting as the durable backing store.
//!
//! ```toml
//! [[blogs]]
//! id = "tenantA"
//! flavors = ["html", "rss"]
//! linear_navigation = true
//!
//! [blogs.properties]
//! caching-fetcher-refresh = "300"
//!
//! [blogs.plugins]
//! default = "entries-limiter"
//!
//! [[blogs.entries]]
//! id = "hello"
//! title = "Hello"
//! permalink = "hello.html"
//! category = "/notes/"
//! date = "2024-06-30T12:00:00Z"
//! ```
//!
//! The file is parsed on every load so edits show up on the next cache
//! refresh.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::error::InfraError;
use crate::application::repos::{BackingStore, RepoError};
use crate::domain::blog::BlogSettings;
use crate::domain::entities::{Entry, EntryList, entry_list};
use crate::domain::error::DomainError;

#[derive(Debug, Deserialize)]
struct Archive {
    #[serde(default)]
    blogs: Vec<ArchiveBlog>,
}

#[derive(Debug, Deserialize)]
struct ArchiveBlog {
    #[serde(flatten)]
    settings: BlogSettings,
    #[serde(default)]
    entries: Vec<Entry>,
}

impl Archive {
    fn parse(path: &Path, data: &str) -> Result<Self, InfraError> {
        let mut archive: Archive =
            toml::from_str(data).map_err(|err| InfraError::archive(path, err.to_string()))?;
        archive.normalize();
        Ok(archive)
    }

    fn normalize(&mut self) {
        for blog in &mut self.blogs {
            for entry in &mut blog.entries {
                entry.category = normalize_category(&entry.category);
            }
            blog.entries.sort_by(|a, b| b.date.cmp(&a.date));
        }
    }

    fn blog(&self, id: &str) -> Option<&ArchiveBlog> {
        self.blogs.iter().find(|blog| blog.settings.id == id)
    }
}

/// `/`-delimited category with leading and trailing slashes.
fn normalize_category(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}

fn category_depth(category: &str) -> u32 {
    category.split('/').filter(|part| !part.is_empty()).count() as u32
}

#[derive(Debug, Clone)]
pub struct ArchiveStore {
    path: PathBuf,
}

impl ArchiveStore {
    /// Open the archive at `path`, validating it once up front.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, InfraError> {
        let store = Self { path: path.into() };
        let archive = store.read().await?;
        debug!(
            path = %store.path.display(),
            blogs = archive.blogs.len(),
            "content archive opened"
        );
        Ok(store)
    }

    /// Settings of the blog identified by `id`.
    pub async fn blog(&self, id: &str) -> Result<Arc<BlogSettings>, ArchiveLookupError> {
        let archive = self.read().await?;
        archive
            .blog(id)
            .map(|blog| Arc::new(blog.settings.clone()))
            .ok_or_else(|| DomainError::blog_not_found(id).into())
    }

    async fn read(&self) -> Result<Archive, InfraError> {
        let data = tokio::fs::read_to_string(&self.path).await?;
        Archive::parse(&self.path, &data)
    }

    async fn entries(&self, blog: &BlogSettings) -> Result<Vec<Entry>, RepoError> {
        let archive = self.read().await.map_err(RepoError::from_persistence)?;
        archive
            .blogs
            .into_iter()
            .find(|candidate| candidate.settings.id == blog.id)
            .map(|found| found.entries)
            .ok_or_else(|| RepoError::UnknownBlog {
                blog: blog.id.clone(),
            })
    }
}

/// Failure to look up a blog's settings.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveLookupError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

#[async_trait]
impl BackingStore for ArchiveStore {
    async fn load_entries_for_flavor(
        &self,
        blog: &BlogSettings,
        _flavor: &str,
        depth: Option<u32>,
    ) -> Result<EntryList, RepoError> {
        let entries = self.entries(blog).await?;
        Ok(entry_list(entries.into_iter().filter(|entry| {
            depth.is_none_or(|limit| category_depth(&entry.category) <= limit)
        })))
    }

    async fn load_entries_for_category(
        &self,
        blog: &BlogSettings,
        category: &str,
    ) -> Result<EntryList, RepoError> {
        let category = normalize_category(category);
        let entries = self.entries(blog).await?;
        Ok(entry_list(
            entries
                .into_iter()
                .filter(|entry| entry.category == category),
        ))
    }

    async fn load_entry_by_permalink(
        &self,
        blog: &BlogSettings,
        permalink: &str,
    ) -> Result<Option<Entry>, RepoError> {
        let entries = self.entries(blog).await?;
        Ok(entries
            .into_iter()
            .find(|entry| entry.permalink == permalink))
    }
}
