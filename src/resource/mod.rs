//! Resource expansion
//!
//! Turns a resource id into one fully expanded JSON document.
//!
//! # Architecture
//!
//! - [`query`] - The [`QuerySource`] seam and [`QueryTarget`] parsing
//! - [`cache`] - Per-run id cache with explicit pending slots
//! - [`merge`] - Splices cached documents into the objects that reference them
//! - [`resolver`] - Drives discovery and merge for one run
//!
//! # Example
//!
//! ```ignore
//! use azinfo::azure::AzCliQuery;
//! use azinfo::resource::Resolver;
//!
//! async fn expand(id: &str) -> anyhow::Result<serde_json::Value> {
//!     let resolver = Resolver::new(AzCliQuery::default());
//!     Ok(resolver.resolve(id).await?.document)
//! }
//! ```

pub mod cache;
pub mod merge;
pub mod query;
pub mod resolver;

pub use cache::{CacheEntry, EntryState, PendingRef, ResolutionCache};
pub use merge::MergePass;
pub use query::{QuerySource, QueryTarget, ALL_RESOURCES};
pub use resolver::{
    QueryErrorPolicy, Resolution, ResolveError, ResolveOptions, ResolveStats, Resolver,
    DEFAULT_CONCURRENCY,
};
