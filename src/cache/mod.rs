//! Scriptorium entry-list cache.
//!
//! A stale-while-revalidate store for the entry lists a blog request needs:
//!
//! - **Store**: freshness is judged at read time against a caller-supplied
//!   refresh period; expired lists keep being served while one background
//!   refresh per key replaces them.
//! - **Refresh**: background refreshes are supervised tasks with a timeout,
//!   cancellable per key and drained on shutdown.
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `scriptorium.toml`:
//!
//! ```toml
//! [cache]
//! capacity = 512
//! refresh_timeout_ms = 30000
//! shutdown_grace_ms = 5000
//! ```

mod config;
mod keys;
mod lock;
mod refresh;
mod store;

pub use config::CacheConfig;
pub use keys::{CacheKey, Scope};
pub use refresh::{DrainReport, RefreshOutcome, RefreshScheduler};
pub use store::{CacheStore, Lookup, RefreshTicket};
