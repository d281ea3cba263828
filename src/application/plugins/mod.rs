//! Per-request plugin chain.
//!
//! Plugins are resolved by identifier from a [`PluginRegistry`] of factories,
//! so every request works with its own instances. The [`ChainExecutor`] runs
//! them in configured order and isolates each step's failure.

mod builtin;
mod chain;
mod registry;
mod types;

pub use builtin::{
    DAYS_SINCE_POSTED, DAYS_SINCE_POSTED_METADATA, DaysSincePosted, ENTRIES_LIMITER,
    ENTRIES_PARAM, EntriesLimiter,
};
pub use chain::{ChainExecutor, ChainReport, StepOutcome, StepReport};
pub use registry::PluginRegistry;
pub use types::{Plugin, PluginError};
