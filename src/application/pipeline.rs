//! Request pipeline: resolve flavor, fetch entries, run the plugin chain and
//! derive the response dates handed to the template dispatcher.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::Value;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use time::format_description::well_known::{Iso8601, Rfc2822};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::application::context::{RequestContext, keys};
use crate::application::error::AppError;
use crate::application::fetch::{CachingFetcher, FetchRequest};
use crate::application::plugins::{ChainExecutor, ChainReport};
use crate::domain::blog::BlogSettings;
use crate::domain::entities::{Entry, EntryList, ROOT_CATEGORY};

/// Request parameter overriding the configured plugin chain.
pub const PLUGINS_PARAM: &str = "plugins";

/// A request already routed to a blog.
#[derive(Debug, Clone, Default)]
pub struct PipelineRequest {
    pub flavor: Option<String>,
    pub category: Option<String>,
    pub permalink: Option<String>,
    pub params: HashMap<String, String>,
}

/// Everything a template needs to render the response.
#[derive(Debug, Clone)]
pub struct RenderInput {
    pub request_id: Uuid,
    pub flavor: String,
    pub entries: EntryList,
    pub context: BTreeMap<String, Value>,
    pub last_modified: OffsetDateTime,
    pub etag: String,
    pub report: ChainReport,
}

/// Last-Modified and ETag for a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseDates {
    pub last_modified: OffsetDateTime,
    pub etag: String,
}

impl ResponseDates {
    /// Derive the dates from the first entry, its newest comment, and a
    /// plugin-supplied `last-modified` override. With no entries, `now` is
    /// used as is.
    pub fn derive(
        entries: &[Arc<Entry>],
        ctx: &RequestContext,
        now: OffsetDateTime,
    ) -> Result<Self, time::error::Format> {
        let last_modified = match entries.first() {
            Some(first) => {
                let from_entry = first.latest_comment_date().unwrap_or(first.date);
                match plugin_last_modified(ctx) {
                    Some(from_plugin) if from_plugin > from_entry => from_plugin,
                    _ => from_entry,
                }
            }
            None => now,
        };

        let iso = last_modified.format(&Iso8601::DEFAULT)?;
        let etag = format!("\"{}\"", hash_date(&iso));
        Ok(Self {
            last_modified,
            etag,
        })
    }

    /// Expose the dates to templates.
    pub fn publish(&self, ctx: &mut RequestContext) -> Result<(), time::error::Format> {
        ctx.insert(keys::BLOG_DATE, self.last_modified.format(&Rfc2822)?);
        ctx.insert(
            keys::BLOG_DATE_ISO8601,
            self.last_modified.format(&Iso8601::DEFAULT)?,
        );
        ctx.insert(keys::BLOG_DATE_UTC, unix_millis(self.last_modified));
        Ok(())
    }
}

fn hash_date(iso: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(iso.as_bytes());
    hex::encode(hasher.finalize())
}

fn plugin_last_modified(ctx: &RequestContext) -> Option<OffsetDateTime> {
    let millis = ctx.get(keys::LAST_MODIFIED)?.as_i64()?;
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
}

fn unix_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

pub struct RequestPipeline {
    fetcher: Arc<CachingFetcher>,
    executor: ChainExecutor,
}

impl RequestPipeline {
    pub fn new(fetcher: Arc<CachingFetcher>, executor: ChainExecutor) -> Self {
        Self { fetcher, executor }
    }

    pub fn fetcher(&self) -> &Arc<CachingFetcher> {
        &self.fetcher
    }

    #[instrument(skip_all, fields(tenant = %blog.id))]
    pub async fn handle(
        &self,
        blog: Arc<BlogSettings>,
        request: PipelineRequest,
    ) -> Result<RenderInput, AppError> {
        let flavor = blog.resolve_flavor(request.flavor.as_deref());
        let mut ctx = RequestContext::new(Arc::clone(&blog), flavor.clone())
            .with_params(request.params);
        ctx.insert(keys::REQUESTED_FLAVOR, flavor.as_str());

        let fetch = FetchRequest {
            flavor: flavor.clone(),
            category: request
                .category
                .unwrap_or_else(|| ROOT_CATEGORY.to_string()),
            permalink: request.permalink,
        };
        let entries = self.fetcher.fetch_entries(&blog, &fetch, &mut ctx).await?;

        let chain = blog.chain_for(&flavor, ctx.param(PLUGINS_PARAM));
        let (entries, report) = self.executor.run(&chain, entries, &mut ctx);

        let dates = ResponseDates::derive(&entries, &ctx, OffsetDateTime::now_utc())
            .map_err(|err| AppError::unexpected(format!("failed to format response date: {err}")))?;
        dates
            .publish(&mut ctx)
            .map_err(|err| AppError::unexpected(format!("failed to format response date: {err}")))?;

        debug!(
            request_id = %ctx.request_id(),
            flavor = %flavor,
            entries = entries.len(),
            plugins = chain.len(),
            "request pipeline finished"
        );

        Ok(RenderInput {
            request_id: ctx.request_id(),
            flavor,
            entries,
            context: ctx.into_values(),
            last_modified: dates.last_modified,
            etag: dates.etag,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::application::plugins::{PluginRegistry, StepOutcome};
    use crate::application::repos::BackingStore;
    use crate::application::testing::{RecordingStore, sample_entries, sample_entry};
    use crate::cache::{CacheConfig, CacheStore};
    use crate::domain::entities::Comment;

    fn pipeline(store: Arc<RecordingStore>) -> RequestPipeline {
        let config = CacheConfig::default();
        let backing: Arc<dyn BackingStore> = store;
        let fetcher = CachingFetcher::new(backing, Arc::new(CacheStore::new(&config)), &config);
        RequestPipeline::new(
            Arc::new(fetcher),
            ChainExecutor::new(Arc::new(PluginRegistry::with_builtins())),
        )
    }

    fn blog() -> BlogSettings {
        let mut blog = BlogSettings::new("tenantA");
        blog.flavors = ["html".to_string(), "rss".to_string()].into();
        blog.display_entries = 2;
        blog.plugins
            .insert("default".into(), "entries-limiter".into());
        blog.plugins.insert("rss".into(), "days-since-posted".into());
        blog
    }

    fn ctx() -> RequestContext {
        RequestContext::new(Arc::new(BlogSettings::new("t")), "html")
    }

    #[test]
    fn last_modified_prefers_newest_comment() {
        let mut entry = sample_entry("a", datetime!(2024-01-01 00:00 UTC));
        entry.comments.push(Comment {
            author: "reader".into(),
            body: String::new(),
            date: datetime!(2024-01-05 08:30 UTC),
        });

        let dates = ResponseDates::derive(&[Arc::new(entry)], &ctx(), OffsetDateTime::now_utc())
            .expect("derive");

        assert_eq!(dates.last_modified, datetime!(2024-01-05 08:30 UTC));
    }

    #[test]
    fn plugin_override_only_moves_forward() {
        let entry = Arc::new(sample_entry("a", datetime!(2024-01-01 00:00 UTC)));
        let mut ctx = ctx();

        ctx.insert(keys::LAST_MODIFIED, unix_millis(datetime!(2023-12-01 00:00 UTC)));
        let older = ResponseDates::derive(&[entry.clone()], &ctx, OffsetDateTime::now_utc())
            .expect("derive");
        assert_eq!(older.last_modified, datetime!(2024-01-01 00:00 UTC));

        ctx.insert(keys::LAST_MODIFIED, unix_millis(datetime!(2024-02-01 00:00 UTC)));
        let newer = ResponseDates::derive(&[entry], &ctx, OffsetDateTime::now_utc())
            .expect("derive");
        assert_eq!(newer.last_modified, datetime!(2024-02-01 00:00 UTC));
    }

    #[test]
    fn etag_is_quoted_digest_of_iso_date() {
        let now = datetime!(2024-03-01 10:00 UTC);
        let dates = ResponseDates::derive(&[], &ctx(), now).expect("derive");

        let iso = now.format(&Iso8601::DEFAULT).expect("format");
        assert_eq!(dates.last_modified, now);
        assert_eq!(dates.etag, format!("\"{}\"", hash_date(&iso)));
        assert!(dates.etag[1..65].chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(dates.etag.len(), 66);
    }

    #[test]
    fn publish_writes_blog_dates() {
        let now = datetime!(2024-03-01 10:00 UTC);
        let dates = ResponseDates::derive(&[], &ctx(), now).expect("derive");
        let mut ctx = ctx();

        dates.publish(&mut ctx).expect("publish");

        assert_eq!(
            ctx.get(keys::BLOG_DATE),
            Some(&Value::from("Fri, 01 Mar 2024 10:00:00 +0000"))
        );
        assert!(ctx.contains(keys::BLOG_DATE_ISO8601));
        assert_eq!(
            ctx.get(keys::BLOG_DATE_UTC),
            Some(&Value::from(1_709_287_200_000_i64))
        );
    }

    #[tokio::test]
    async fn handle_runs_default_chain_for_html() {
        let store = Arc::new(RecordingStore::new(sample_entries(5)));
        let pipeline = pipeline(store);

        let output = pipeline
            .handle(Arc::new(blog()), PipelineRequest::default())
            .await
            .expect("pipeline");

        assert_eq!(output.flavor, "html");
        assert_eq!(output.entries.len(), 2);
        assert_eq!(output.last_modified, datetime!(2024-06-30 12:00 UTC));
        assert_eq!(
            output.context.get(keys::REQUESTED_FLAVOR),
            Some(&Value::from("html"))
        );
        assert!(output.report.is_clean());
    }

    #[tokio::test]
    async fn handle_uses_flavor_chain_and_unknown_flavor_falls_back() {
        let store = Arc::new(RecordingStore::new(sample_entries(3)));
        let pipeline = pipeline(store);

        let rss = pipeline
            .handle(
                Arc::new(blog()),
                PipelineRequest {
                    flavor: Some("rss".into()),
                    ..Default::default()
                },
            )
            .await
            .expect("rss");
        assert_eq!(rss.entries.len(), 3);
        assert!(rss.entries[0].metadata.contains_key("days-since-posted"));

        let unknown = pipeline
            .handle(
                Arc::new(blog()),
                PipelineRequest {
                    flavor: Some("atom".into()),
                    ..Default::default()
                },
            )
            .await
            .expect("fallback");
        assert_eq!(unknown.flavor, "html");
    }

    #[tokio::test]
    async fn handle_honours_plugin_override_parameter() {
        let store = Arc::new(RecordingStore::new(sample_entries(4)));
        let pipeline = pipeline(store);

        let output = pipeline
            .handle(
                Arc::new(blog()),
                PipelineRequest {
                    params: HashMap::from([(PLUGINS_PARAM.to_string(), "ghost".to_string())]),
                    ..Default::default()
                },
            )
            .await
            .expect("override");

        assert_eq!(output.entries.len(), 4);
        assert_eq!(output.report.count(StepOutcome::Skipped), 1);
    }

    #[tokio::test]
    async fn handle_propagates_fetch_failure() {
        let store = Arc::new(RecordingStore::new(sample_entries(1)));
        store.set_failing(true);
        let pipeline = pipeline(store);

        let error = pipeline
            .handle(Arc::new(blog()), PipelineRequest::default())
            .await
            .expect_err("fetch fails");

        assert!(matches!(error, AppError::Fetch(_)));
    }
}
