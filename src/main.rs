use std::{collections::HashMap, process, sync::Arc, time::Duration};

use scriptorium::{
    application::{
        error::AppError,
        fetch::CachingFetcher,
        pipeline::{PLUGINS_PARAM, PipelineRequest, RenderInput, RequestPipeline},
        plugins::{ChainExecutor, PluginRegistry},
        repos::BackingStore,
    },
    cache::{CacheConfig, CacheStore},
    config,
    domain::entities::Entry,
    infra::{archive::ArchiveStore, telemetry},
};
use serde_json::{Value, json};
use time::format_description::well_known::Rfc3339;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    let report = error.report();
    let emit = || {
        error!(
            error = %error,
            causes = ?report.messages,
            summary = error.presentation_message(),
            "application error"
        );
    };

    if dispatcher::has_been_set() {
        emit();
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, emit);
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match cli_args.command {
        config::Command::Fetch(args) => run_fetch(settings, *args).await,
    }
}

async fn run_fetch(settings: config::Settings, args: config::FetchArgs) -> Result<(), AppError> {
    let archive = ArchiveStore::open(&settings.content.archive).await?;

    let registry = PluginRegistry::with_builtins();
    let blog = archive.blog(&args.blog).await?;
    let unresolved = registry.unresolved(&blog);
    if !unresolved.is_empty() {
        warn!(
            tenant = %blog.id,
            count = unresolved.len(),
            "blog configures plugins that will be skipped"
        );
    }

    let cache_config = CacheConfig::from(&settings.cache);
    let cache = Arc::new(CacheStore::new(&cache_config));
    let backing: Arc<dyn BackingStore> = Arc::new(archive.clone());
    let fetcher = Arc::new(CachingFetcher::new(backing, cache, &cache_config));
    let pipeline = RequestPipeline::new(
        Arc::clone(&fetcher),
        ChainExecutor::new(Arc::new(registry)),
    );

    let mut params: HashMap<String, String> = args.params.iter().cloned().collect();
    if let Some(plugins) = args.plugins.as_ref() {
        params.insert(PLUGINS_PARAM.to_string(), plugins.clone());
    }
    let interval = Duration::from_millis(args.interval_ms);

    let result = run_iterations(args.repeat, interval, |iteration| {
        let archive = &archive;
        let pipeline = &pipeline;
        let args = &args;
        let params = params.clone();
        async move {
            // Blog settings are re-read so refresh-period edits apply between requests.
            let blog = archive.blog(&args.blog).await?;
            let request = PipelineRequest {
                flavor: args.flavor.clone(),
                category: args.category.clone(),
                permalink: args.permalink.clone(),
                params,
            };
            let output = pipeline.handle(blog, request).await?;
            println!("{}", render_json(&output, iteration)?);
            Ok::<(), AppError>(())
        }
    })
    .await;

    let drained = fetcher.shutdown().await;
    info!(
        completed = drained.completed,
        aborted = drained.aborted,
        "fetch command finished"
    );

    result
}

/// Run `serve` for iterations `1..=repeat`, pausing `interval` in between.
/// Stops at the first failing iteration and returns its error; callers drain
/// background work afterwards either way.
async fn run_iterations<F, Fut>(
    repeat: u32,
    interval: Duration,
    mut serve: F,
) -> Result<(), AppError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<(), AppError>>,
{
    for iteration in 1..=repeat {
        serve(iteration).await?;

        if iteration < repeat && !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
    }
    Ok(())
}

fn render_json(output: &RenderInput, iteration: u32) -> Result<Value, AppError> {
    let last_modified = output
        .last_modified
        .format(&Rfc3339)
        .map_err(|err| AppError::unexpected(format!("failed to format Last-Modified: {err}")))?;
    let entries: Vec<&Entry> = output.entries.iter().map(Arc::as_ref).collect();
    let steps: Vec<Value> = output
        .report
        .steps
        .iter()
        .map(|step| {
            json!({
                "plugin": step.plugin,
                "outcome": step.outcome.as_str(),
                "cleanup_failed": step.cleanup_failed,
            })
        })
        .collect();

    Ok(json!({
        "request_id": output.request_id.to_string(),
        "iteration": iteration,
        "flavor": output.flavor,
        "last_modified": last_modified,
        "etag": output.etag,
        "entries": entries,
        "context": output.context,
        "plugins": steps,
    }))
}
