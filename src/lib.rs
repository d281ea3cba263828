//! Scriptorium: the request-scoped fetch-and-process core of a multi-tenant
//! blog engine.
//!
//! A request resolved to a blog and flavor flows through the
//! [`application::fetch::CachingFetcher`], which serves entry lists from a
//! stale-while-revalidate [`cache::CacheStore`], and then through the
//! [`application::plugins::ChainExecutor`], which applies the configured
//! plugin chain. [`application::pipeline::RequestPipeline`] composes the two.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
