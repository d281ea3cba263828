//! Request-scoped side channel shared by the fetcher, the plugin chain and
//! the template dispatcher.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::domain::blog::BlogSettings;

/// Well-known context keys.
pub mod keys {
    /// Flavor the request resolved to.
    pub const REQUESTED_FLAVOR: &str = "requested-flavor";
    /// Permalink of the single entry being served.
    pub const PERMALINK: &str = "permalink";
    /// Entry preceding the permalink entry in the blog's entry list.
    pub const PERMALINK_PREVIOUS_ENTRY: &str = "permalink-previous-entry";
    /// Entry following the permalink entry in the blog's entry list.
    pub const PERMALINK_NEXT_ENTRY: &str = "permalink-next-entry";
    /// Plugin-supplied Last-Modified override, unix milliseconds.
    pub const LAST_MODIFIED: &str = "last-modified";
    pub const BLOG_DATE: &str = "blog-date";
    pub const BLOG_DATE_ISO8601: &str = "blog-date-iso8601";
    pub const BLOG_DATE_UTC: &str = "blog-date-utc";
}

/// Mutable key/value side channel living for a single request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: Uuid,
    blog: Arc<BlogSettings>,
    flavor: String,
    params: HashMap<String, String>,
    values: BTreeMap<String, Value>,
}

impl RequestContext {
    pub fn new(blog: Arc<BlogSettings>, flavor: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            blog,
            flavor: flavor.into(),
            params: HashMap::new(),
            values: BTreeMap::new(),
        }
    }

    pub fn with_params(mut self, params: HashMap<String, String>) -> Self {
        self.params = params;
        self
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn blog(&self) -> &BlogSettings {
        &self.blog
    }

    pub fn flavor(&self) -> &str {
        &self.flavor
    }

    /// Raw request parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Insert any serializable value; values that fail to serialize are
    /// logged and skipped.
    pub fn insert_serialized<T: Serialize>(&mut self, key: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(value) => {
                self.values.insert(key.to_string(), value);
            }
            Err(error) => warn!(key, error = %error, "context value failed to serialize"),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    pub fn into_values(self) -> BTreeMap<String, Value> {
        self.values
    }

    pub(crate) fn snapshot(&self) -> BTreeMap<String, Value> {
        self.values.clone()
    }

    pub(crate) fn restore(&mut self, values: BTreeMap<String, Value>) {
        self.values = values;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_and_restore_round_trip_values() {
        let mut ctx = RequestContext::new(Arc::new(BlogSettings::new("t")), "html");
        ctx.insert("a", 1);
        let snapshot = ctx.snapshot();

        ctx.insert("b", "two");
        ctx.remove("a");
        ctx.restore(snapshot);

        assert_eq!(ctx.get("a"), Some(&Value::from(1)));
        assert!(!ctx.contains("b"));
    }

    #[test]
    fn params_are_read_only_lookups() {
        let params = HashMap::from([("entries".to_string(), "3".to_string())]);
        let ctx = RequestContext::new(Arc::new(BlogSettings::new("t")), "rss").with_params(params);

        assert_eq!(ctx.param("entries"), Some("3"));
        assert_eq!(ctx.param("missing"), None);
        assert_eq!(ctx.flavor(), "rss");
    }
}
