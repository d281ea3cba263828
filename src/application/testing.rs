//! Shared fixtures for application tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use time::macros::datetime;

use crate::application::repos::{BackingStore, RepoError};
use crate::domain::blog::BlogSettings;
use crate::domain::entities::{Entry, EntryList, ROOT_CATEGORY, entry_list};

/// `count` entries, newest first, with ids and permalinks `entry-0..`.
pub(crate) fn sample_entries(count: usize) -> Vec<Entry> {
    let newest = datetime!(2024-06-30 12:00 UTC);
    (0..count)
        .map(|index| sample_entry(&format!("entry-{index}"), newest - time::Duration::days(index as i64)))
        .collect()
}

pub(crate) fn sample_entry(id: &str, date: OffsetDateTime) -> Entry {
    Entry {
        id: id.to_string(),
        title: format!("Title {id}"),
        description: String::new(),
        category: ROOT_CATEGORY.to_string(),
        permalink: id.to_string(),
        date,
        last_modified: None,
        comments: Vec::new(),
        metadata: Default::default(),
    }
}

/// Let spawned tasks run to their next suspension point.
pub(crate) async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

/// In-memory backing store counting every call it receives.
#[derive(Default)]
pub(crate) struct RecordingStore {
    entries: Mutex<Vec<Entry>>,
    delay: Mutex<Option<Duration>>,
    failing: AtomicBool,
    list_failing: AtomicBool,
    flavor_calls: AtomicUsize,
    category_calls: AtomicUsize,
    permalink_calls: AtomicUsize,
}

impl RecordingStore {
    pub(crate) fn new(entries: Vec<Entry>) -> Self {
        Self {
            entries: Mutex::new(entries),
            ..Default::default()
        }
    }

    pub(crate) fn replace(&self, entries: Vec<Entry>) {
        *self.entries.lock().expect("entries lock") = entries;
    }

    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.delay.lock().expect("delay lock") = Some(delay);
    }

    /// Fail every call.
    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Fail list loads only; permalink lookups keep working.
    pub(crate) fn set_list_failing(&self, failing: bool) {
        self.list_failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn flavor_calls(&self) -> usize {
        self.flavor_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn category_calls(&self) -> usize {
        self.category_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn permalink_calls(&self) -> usize {
        self.permalink_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.flavor_calls() + self.category_calls() + self.permalink_calls()
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().expect("delay lock");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn check(&self, list: bool) -> Result<(), RepoError> {
        if self.failing.load(Ordering::SeqCst)
            || (list && self.list_failing.load(Ordering::SeqCst))
        {
            return Err(RepoError::from_persistence("backing store unavailable"));
        }
        Ok(())
    }

    fn snapshot(&self) -> Vec<Entry> {
        self.entries.lock().expect("entries lock").clone()
    }
}

#[async_trait]
impl BackingStore for RecordingStore {
    async fn load_entries_for_flavor(
        &self,
        _blog: &BlogSettings,
        _flavor: &str,
        _depth: Option<u32>,
    ) -> Result<EntryList, RepoError> {
        self.flavor_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.check(true)?;
        Ok(entry_list(self.snapshot()))
    }

    async fn load_entries_for_category(
        &self,
        _blog: &BlogSettings,
        category: &str,
    ) -> Result<EntryList, RepoError> {
        self.category_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.check(true)?;
        Ok(entry_list(
            self.snapshot()
                .into_iter()
                .filter(|entry| entry.category.starts_with(category)),
        ))
    }

    async fn load_entry_by_permalink(
        &self,
        _blog: &BlogSettings,
        permalink: &str,
    ) -> Result<Option<Entry>, RepoError> {
        self.permalink_calls.fetch_add(1, Ordering::SeqCst);
        self.check(false)?;
        Ok(self
            .snapshot()
            .into_iter()
            .find(|entry| entry.permalink == permalink))
    }
}
