//! Ordered plugin chain execution with per-step failure isolation.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};

use super::registry::PluginRegistry;
use super::types::{Plugin, PluginError};
use crate::application::context::RequestContext;
use crate::domain::blog::ChainSpec;
use crate::domain::entities::{Entry, EntryList};

const METRIC_PLUGIN_FAILURES: &str = "scriptorium_plugin_failures_total";

/// What happened to one step of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The plugin could not be resolved.
    Skipped,
    RanOk,
    /// The plugin failed or panicked; its changes were discarded.
    RanFailed,
}

impl StepOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            StepOutcome::Skipped => "skipped",
            StepOutcome::RanOk => "ran_ok",
            StepOutcome::RanFailed => "ran_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub plugin: String,
    pub outcome: StepOutcome,
    pub cleanup_failed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainReport {
    pub steps: Vec<StepReport>,
}

impl ChainReport {
    pub fn count(&self, outcome: StepOutcome) -> usize {
        self.steps
            .iter()
            .filter(|step| step.outcome == outcome)
            .count()
    }

    /// True when every step ran and cleaned up without error.
    pub fn is_clean(&self) -> bool {
        self.steps
            .iter()
            .all(|step| step.outcome == StepOutcome::RanOk && !step.cleanup_failed)
    }
}

#[derive(Debug, Clone)]
pub struct ChainExecutor {
    registry: Arc<PluginRegistry>,
}

impl ChainExecutor {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self { registry }
    }

    /// Run `chain` over `entries`, in order.
    ///
    /// A step that cannot be resolved is skipped. A step that fails or panics
    /// leaves both the entries and the context exactly as they were before it
    /// ran. Cleanup runs after every resolved step and its failure is only
    /// recorded.
    pub fn run(
        &self,
        chain: &ChainSpec,
        entries: EntryList,
        ctx: &mut RequestContext,
    ) -> (EntryList, ChainReport) {
        let mut current: Vec<Arc<Entry>> = entries.to_vec();
        let mut report = ChainReport::default();

        for id in chain.ids() {
            let mut plugin = match self.registry.resolve(id) {
                Ok(plugin) => plugin,
                Err(error) => {
                    warn!(plugin = id, error = %error, "plugin unavailable; step skipped");
                    counter!(METRIC_PLUGIN_FAILURES, "stage" => "resolve").increment(1);
                    report.steps.push(StepReport {
                        plugin: id.to_string(),
                        outcome: StepOutcome::Skipped,
                        cleanup_failed: false,
                    });
                    continue;
                }
            };

            let (next, outcome) = transform_step(id, plugin.as_mut(), current, ctx);
            current = next;
            let cleanup_failed = !cleanup_step(id, plugin.as_mut());

            debug!(
                plugin = id,
                outcome = outcome.as_str(),
                cleanup_failed,
                entries = current.len(),
                "plugin step finished"
            );
            report.steps.push(StepReport {
                plugin: id.to_string(),
                outcome,
                cleanup_failed,
            });
        }

        (EntryList::from(current), report)
    }
}

fn transform_step(
    id: &str,
    plugin: &mut dyn Plugin,
    before: Vec<Arc<Entry>>,
    ctx: &mut RequestContext,
) -> (Vec<Arc<Entry>>, StepOutcome) {
    let saved_values = ctx.snapshot();
    let attempt = catch_unwind(AssertUnwindSafe(|| plugin.transform(before.clone(), ctx)));

    let error = match attempt {
        Ok(Ok(entries)) => return (entries, StepOutcome::RanOk),
        Ok(Err(error)) => error,
        Err(payload) => PluginError::Panicked {
            message: panic_message(payload.as_ref()),
        },
    };

    warn!(plugin = id, error = %error, "plugin transform failed; changes discarded");
    counter!(METRIC_PLUGIN_FAILURES, "stage" => "transform").increment(1);
    ctx.restore(saved_values);
    (before, StepOutcome::RanFailed)
}

fn cleanup_step(id: &str, plugin: &mut dyn Plugin) -> bool {
    let error = match catch_unwind(AssertUnwindSafe(|| plugin.cleanup())) {
        Ok(Ok(())) => return true,
        Ok(Err(error)) => error,
        Err(payload) => PluginError::Panicked {
            message: panic_message(payload.as_ref()),
        },
    };

    warn!(plugin = id, error = %error, "plugin cleanup failed");
    counter!(METRIC_PLUGIN_FAILURES, "stage" => "cleanup").increment(1);
    false
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
