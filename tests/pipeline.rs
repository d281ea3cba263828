use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use scriptorium::application::context::keys;
use scriptorium::application::fetch::CachingFetcher;
use scriptorium::application::pipeline::{PLUGINS_PARAM, PipelineRequest, RequestPipeline};
use scriptorium::application::plugins::{ChainExecutor, PluginRegistry, StepOutcome};
use scriptorium::application::repos::BackingStore;
use scriptorium::cache::{CacheConfig, CacheStore};
use scriptorium::infra::archive::ArchiveStore;
use serde_json::Value;
use tempfile::NamedTempFile;

fn archive(refresh: &str, extra_entry: bool) -> String {
    let mut toml = format!(
        r#"
[[blogs]]
id = "tenantA"
flavors = ["html", "rss", "css"]
ignore_flavors = ["css"]
linear_navigation = true
display_entries = 2

[blogs.properties]
caching-fetcher-refresh = "{refresh}"

[blogs.plugins]
default = "entries-limiter"
rss = "days-since-posted"

[[blogs.entries]]
id = "first"
title = "First"
permalink = "first.html"
date = "2024-01-01T00:00:00Z"

[[blogs.entries]]
id = "second"
title = "Second"
permalink = "second.html"
date = "2024-02-01T00:00:00Z"

[[blogs.entries]]
id = "third"
title = "Third"
permalink = "third.html"
date = "2024-03-01T00:00:00Z"

[[blogs.entries.comments]]
author = "reader"
body = "nice"
date = "2024-03-05T09:00:00Z"
"#
    );
    if extra_entry {
        toml.push_str(
            r#"
[[blogs.entries]]
id = "fourth"
title = "Fourth"
permalink = "fourth.html"
date = "2024-04-01T00:00:00Z"
"#,
        );
    }
    toml
}

fn write_archive(file: &mut NamedTempFile, contents: &str) {
    let handle = file.as_file_mut();
    handle.set_len(0).expect("truncate archive");
    std::io::Seek::rewind(handle).expect("rewind archive");
    handle.write_all(contents.as_bytes()).expect("write archive");
    handle.flush().expect("flush archive");
}

async fn setup(contents: &str) -> (NamedTempFile, ArchiveStore, RequestPipeline) {
    let mut file = NamedTempFile::new().expect("tmp file");
    write_archive(&mut file, contents);
    let store = ArchiveStore::open(file.path()).await.expect("open archive");

    let config = CacheConfig::default();
    let backing: Arc<dyn BackingStore> = Arc::new(store.clone());
    let fetcher = CachingFetcher::new(backing, Arc::new(CacheStore::new(&config)), &config);
    let pipeline = RequestPipeline::new(
        Arc::new(fetcher),
        ChainExecutor::new(Arc::new(PluginRegistry::with_builtins())),
    );
    (file, store, pipeline)
}

fn ids(entries: &[Arc<scriptorium::domain::entities::Entry>]) -> Vec<&str> {
    entries.iter().map(|entry| entry.id.as_str()).collect()
}

async fn wait_for_refreshes(fetcher: &CachingFetcher) {
    for _ in 0..200 {
        if fetcher.refreshes_in_flight() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("background refresh did not finish");
}

#[tokio::test]
async fn default_chain_limits_entries_and_derives_dates() {
    let (_file, store, pipeline) = setup(&archive("300", false)).await;
    let blog = store.blog("tenantA").await.expect("blog");

    let output = pipeline
        .handle(blog, PipelineRequest::default())
        .await
        .expect("pipeline");

    assert_eq!(output.flavor, "html");
    assert_eq!(ids(&output.entries), vec!["third", "second"]);
    assert!(output.report.is_clean());
    assert_eq!(
        output.context.get(keys::BLOG_DATE),
        Some(&Value::from("Tue, 05 Mar 2024 09:00:00 +0000"))
    );
    assert!(output.etag.starts_with('"') && output.etag.ends_with('"'));
}

#[tokio::test]
async fn permalink_request_publishes_neighbours() {
    let (_file, store, pipeline) = setup(&archive("300", false)).await;
    let blog = store.blog("tenantA").await.expect("blog");

    let output = pipeline
        .handle(
            blog,
            PipelineRequest {
                permalink: Some("second.html".into()),
                ..Default::default()
            },
        )
        .await
        .expect("permalink");

    assert_eq!(ids(&output.entries), vec!["second"]);
    let neighbour = |key: &str| {
        output
            .context
            .get(key)
            .and_then(|value| value.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    assert_eq!(neighbour(keys::PERMALINK_PREVIOUS_ENTRY).as_deref(), Some("third"));
    assert_eq!(neighbour(keys::PERMALINK_NEXT_ENTRY).as_deref(), Some("first"));
}

#[tokio::test]
async fn ignored_flavor_yields_nothing() {
    let (_file, store, pipeline) = setup(&archive("300", false)).await;
    let blog = store.blog("tenantA").await.expect("blog");

    let output = pipeline
        .handle(
            blog,
            PipelineRequest {
                flavor: Some("css".into()),
                ..Default::default()
            },
        )
        .await
        .expect("ignored flavor");

    assert_eq!(output.flavor, "css");
    assert!(output.entries.is_empty());
    assert!(pipeline.fetcher().cache().is_empty());
}

#[tokio::test]
async fn plugin_override_replaces_configured_chain() {
    let (_file, store, pipeline) = setup(&archive("300", false)).await;
    let blog = store.blog("tenantA").await.expect("blog");

    let output = pipeline
        .handle(
            blog,
            PipelineRequest {
                params: HashMap::from([
                    (PLUGINS_PARAM.to_string(), "days-since-posted,nope".to_string()),
                ]),
                ..Default::default()
            },
        )
        .await
        .expect("override");

    assert_eq!(output.entries.len(), 3);
    assert!(
        output
            .entries
            .iter()
            .all(|entry| entry.metadata.contains_key("days-since-posted"))
    );
    assert_eq!(
        output
            .report
            .steps
            .iter()
            .map(|step| step.outcome)
            .collect::<Vec<_>>(),
        vec![StepOutcome::RanOk, StepOutcome::Skipped]
    );
}

#[tokio::test]
async fn stale_list_is_served_until_background_refresh_lands() {
    let (mut file, store, pipeline) = setup(&archive("0", false)).await;
    let request = || PipelineRequest {
        params: HashMap::from([(PLUGINS_PARAM.to_string(), String::new())]),
        ..Default::default()
    };

    let blog = store.blog("tenantA").await.expect("blog");
    let first = pipeline
        .handle(Arc::clone(&blog), request())
        .await
        .expect("miss fill");
    assert_eq!(ids(&first.entries), vec!["third", "second", "first"]);

    write_archive(&mut file, &archive("0", true));

    let stale = pipeline
        .handle(Arc::clone(&blog), request())
        .await
        .expect("stale read");
    assert_eq!(ids(&stale.entries), vec!["third", "second", "first"]);

    wait_for_refreshes(pipeline.fetcher()).await;

    let refreshed = pipeline
        .handle(blog, request())
        .await
        .expect("refreshed read");
    assert_eq!(
        ids(&refreshed.entries),
        vec!["fourth", "third", "second", "first"]
    );

    pipeline.fetcher().shutdown().await;
}

#[tokio::test]
async fn unknown_blog_is_reported() {
    let (_file, store, _pipeline) = setup(&archive("300", false)).await;
    assert!(store.blog("ghost").await.is_err());
}
