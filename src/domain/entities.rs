//! Domain entities handed out by the backing store.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Shared, immutable sequence of entries as stored in the cache.
///
/// Cloning an `EntryList` only bumps reference counts; entries themselves are
/// never copied unless a plugin mutates one through [`Arc::make_mut`].
pub type EntryList = Arc<[Arc<Entry>]>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "root_category")]
    pub category: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_modified: Option<OffsetDateTime>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Entry {
    /// Date of the most recent comment, if the entry has any.
    pub fn latest_comment_date(&self) -> Option<OffsetDateTime> {
        self.comments.iter().map(|comment| comment.date).max()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    #[serde(default)]
    pub body: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
}

pub(crate) fn root_category() -> String {
    ROOT_CATEGORY.to_string()
}

/// Category that spans the whole blog.
pub const ROOT_CATEGORY: &str = "/";

/// Collect owned entries into a shareable list.
pub fn entry_list(entries: impl IntoIterator<Item = Entry>) -> EntryList {
    entries.into_iter().map(Arc::new).collect()
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn latest_comment_date_picks_newest() {
        let entry = Entry {
            id: "a".into(),
            title: "A".into(),
            description: String::new(),
            category: root_category(),
            permalink: "a".into(),
            date: datetime!(2024-01-01 00:00 UTC),
            last_modified: None,
            comments: vec![
                Comment {
                    author: "x".into(),
                    body: String::new(),
                    date: datetime!(2024-01-03 00:00 UTC),
                },
                Comment {
                    author: "y".into(),
                    body: String::new(),
                    date: datetime!(2024-01-02 00:00 UTC),
                },
            ],
            metadata: BTreeMap::new(),
        };

        assert_eq!(
            entry.latest_comment_date(),
            Some(datetime!(2024-01-03 00:00 UTC))
        );
    }

    #[test]
    fn entry_deserializes_with_defaults() {
        let entry: Entry = serde_json::from_str(
            r#"{"id":"first","title":"First","date":"2024-02-01T10:00:00Z"}"#,
        )
        .expect("entry should deserialize");

        assert_eq!(entry.category, ROOT_CATEGORY);
        assert!(entry.comments.is_empty());
        assert!(entry.last_modified.is_none());
    }
}
