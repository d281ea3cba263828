//! Cache key definitions.
//!
//! Entry lists are cached along two disjoint dimensions: flavor-wide lists
//! (the root category) and single-category lists.

use std::fmt;

use crate::domain::entities::ROOT_CATEGORY;

/// Which slice of a blog an entry list covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Every entry of the blog, as served for one flavor.
    Flavor(String),
    /// Entries of one category.
    Category(String),
}

impl Scope {
    /// Derive the scope for a request: the root category shares the flavor
    /// dimension, every other category gets its own.
    pub fn for_request(flavor: &str, category: &str) -> Self {
        if category.is_empty() || category == ROOT_CATEGORY {
            Scope::Flavor(flavor.to_string())
        } else {
            Scope::Category(category.to_string())
        }
    }

    fn dimension(&self) -> &'static str {
        match self {
            Scope::Flavor(_) => "flavor",
            Scope::Category(_) => "category",
        }
    }

    fn value(&self) -> &str {
        match self {
            Scope::Flavor(value) | Scope::Category(value) => value,
        }
    }
}

/// Key of one cached entry list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    tenant: String,
    scope: Scope,
}

impl CacheKey {
    pub fn new(tenant: impl Into<String>, scope: Scope) -> Self {
        Self {
            tenant: tenant.into(),
            scope,
        }
    }

    pub fn flavor(tenant: impl Into<String>, flavor: impl Into<String>) -> Self {
        Self::new(tenant, Scope::Flavor(flavor.into()))
    }

    pub fn category(tenant: impl Into<String>, category: impl Into<String>) -> Self {
        Self::new(tenant, Scope::Category(category.into()))
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.tenant,
            self.scope.dimension(),
            self.scope.value()
        )
    }
}
