//! Plugins shipped with the crate.

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::debug;

use super::types::{Plugin, PluginError};
use crate::application::context::RequestContext;
use crate::domain::entities::Entry;

pub const ENTRIES_LIMITER: &str = "entries-limiter";
pub const DAYS_SINCE_POSTED: &str = "days-since-posted";

/// Request parameter overriding the blog's display count.
pub const ENTRIES_PARAM: &str = "entries";
/// Entry metadata key written by [`DaysSincePosted`].
pub const DAYS_SINCE_POSTED_METADATA: &str = "days-since-posted";

/// Truncates the list to the blog's display count.
///
/// The `entries` request parameter overrides the count when it lies within
/// `1..=len`; a negative count leaves the list untouched.
#[derive(Debug, Default)]
pub struct EntriesLimiter;

impl EntriesLimiter {
    fn limit(ctx: &RequestContext, available: usize) -> i64 {
        let configured = ctx.blog().display_entries;
        match ctx.param(ENTRIES_PARAM).map(|raw| raw.trim().parse::<i64>()) {
            Some(Ok(requested)) if requested >= 1 && requested as usize <= available => {
                debug!(requested, "overriding display entries");
                requested
            }
            Some(_) => {
                debug!(configured, "display entries override rejected");
                configured
            }
            None => configured,
        }
    }
}

impl Plugin for EntriesLimiter {
    fn transform(
        &mut self,
        mut entries: Vec<Arc<Entry>>,
        ctx: &mut RequestContext,
    ) -> Result<Vec<Arc<Entry>>, PluginError> {
        let limit = Self::limit(ctx, entries.len());
        if let Ok(limit) = usize::try_from(limit) {
            entries.truncate(limit);
        }
        Ok(entries)
    }
}

/// Records how many whole days have passed since each entry was posted.
#[derive(Debug)]
pub struct DaysSincePosted {
    now: OffsetDateTime,
}

impl DaysSincePosted {
    pub fn new() -> Self {
        Self::at(OffsetDateTime::now_utc())
    }

    pub fn at(now: OffsetDateTime) -> Self {
        Self { now }
    }
}

impl Default for DaysSincePosted {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for DaysSincePosted {
    fn transform(
        &mut self,
        mut entries: Vec<Arc<Entry>>,
        _ctx: &mut RequestContext,
    ) -> Result<Vec<Arc<Entry>>, PluginError> {
        for entry in &mut entries {
            let days = (self.now - entry.date).whole_days().max(0);
            Arc::make_mut(entry)
                .metadata
                .insert(DAYS_SINCE_POSTED_METADATA.to_string(), days.into());
        }
        Ok(entries)
    }
}
