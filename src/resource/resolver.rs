//! Resolver
//!
//! Expands a resource id into a single JSON document in two passes:
//!
//! 1. Discovery: query the root, then claim and query every nested `id`
//!    not yet in the [`ResolutionCache`]. Claimed ids are never queried
//!    again, which is what stops reference cycles.
//! 2. Merge: splice each cached document into the first object that
//!    references it (see [`MergePass`]).

use super::cache::{EntryState, PendingRef, ResolutionCache};
use super::merge::MergePass;
use super::query::{QuerySource, QueryTarget};
use crate::azure::{format_query_error, QueryError};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use thiserror::Error;

/// Default number of queries allowed in flight at once
pub const DEFAULT_CONCURRENCY: usize = 8;

/// What to do when a nested query fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum QueryErrorPolicy {
    /// Log a warning and treat the resource as not found
    #[default]
    Skip,
    /// Fail the whole resolution
    Abort,
}

/// Resolver settings
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    pub concurrency: usize,
    pub on_query_error: QueryErrorPolicy,
    /// Expand nested references of every resource returned by `all`.
    /// This queries each referenced id one at a time and can be very slow
    /// on large tenants.
    pub expand_wildcard: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            on_query_error: QueryErrorPolicy::Skip,
            expand_wildcard: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("query for '{id}' failed: {source}")]
    Query {
        id: String,
        #[source]
        source: QueryError,
    },
}

/// Counters for one resolution run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveStats {
    /// Queries sent to the query source
    pub queries: usize,
    /// Cache entries after the run
    pub cached: usize,
    /// Nested queries that failed and were replaced with an empty object
    pub failed: usize,
    /// References that received merged fields
    pub merged: usize,
}

/// Output of a resolution run
#[derive(Debug, Clone)]
pub struct Resolution {
    pub document: Value,
    pub stats: ResolveStats,
}

pub struct Resolver<Q> {
    source: Q,
    options: ResolveOptions,
}

impl<Q: QuerySource> Resolver<Q> {
    pub fn new(source: Q) -> Self {
        Self {
            source,
            options: ResolveOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ResolveOptions) -> Self {
        self.options = options;
        self
    }

    pub fn source(&self) -> &Q {
        &self.source
    }

    /// Resolve `id` with a fresh cache
    pub async fn resolve(&self, id: &str) -> Result<Resolution, ResolveError> {
        let mut cache = ResolutionCache::new();
        self.resolve_with_cache(id, &mut cache).await
    }

    /// Resolve `id`, reusing (and extending) an existing cache
    ///
    /// On error, slots this run left pending are released so the cache can
    /// be reused.
    pub async fn resolve_with_cache(
        &self,
        id: &str,
        cache: &mut ResolutionCache,
    ) -> Result<Resolution, ResolveError> {
        let result = self.run(id, cache).await;
        if result.is_err() {
            let released = cache.release_pending();
            tracing::debug!("Released {} pending slots after failed run", released);
        }
        result
    }

    async fn run(&self, id: &str, cache: &mut ResolutionCache) -> Result<Resolution, ResolveError> {
        let target = QueryTarget::parse(id);
        let mut stats = ResolveStats::default();

        let mut raw = match cache.claim(id) {
            Some(slot) => {
                stats.queries += 1;
                let rows = self
                    .source
                    .query(&target)
                    .await
                    .map_err(|source| ResolveError::Query {
                        id: id.to_string(),
                        source,
                    })?;
                let doc = document_from_rows(&target, rows);
                cache.fulfil(slot, doc.clone());
                doc
            }
            None => match cache.state(id) {
                EntryState::Resolved(doc) => doc.clone(),
                _ => {
                    tracing::warn!("{} is still pending, expanding an empty document", id);
                    empty_object()
                }
            },
        };

        if target.is_all() && !self.options.expand_wildcard {
            tracing::info!("Wildcard expansion disabled, returning resources as listed");
        } else {
            self.discover(&raw, cache, &mut stats).await?;
            stats.merged = MergePass::new(cache).apply(&mut raw);
        }
        stats.cached = cache.len();

        tracing::info!(
            "Resolved {}: {} queries, {} cached, {} failed, {} merged",
            target,
            stats.queries,
            stats.cached,
            stats.failed,
            stats.merged
        );

        let document = match raw {
            Value::Array(resources) => {
                tracing::debug!("Coercing raw to an object (was an array)");
                json!({ "resources": resources })
            }
            Value::Object(_) => raw,
            other => {
                tracing::warn!("Top-level document for {} is not an object: {}", target, other);
                empty_object()
            }
        };

        Ok(Resolution { document, stats })
    }

    /// Query every id reachable from `root` that the cache has not seen yet
    async fn discover(
        &self,
        root: &Value,
        cache: &mut ResolutionCache,
        stats: &mut ResolveStats,
    ) -> Result<(), ResolveError> {
        let mut queue = VecDeque::new();
        claim_nested_ids(root, cache, &mut queue);

        let limit = self.options.concurrency.max(1);
        let mut in_flight = FuturesUnordered::new();

        loop {
            while in_flight.len() < limit {
                let Some(slot) = queue.pop_front() else {
                    break;
                };
                in_flight.push(self.fetch(slot));
            }

            let Some((slot, result)) = in_flight.next().await else {
                break;
            };
            stats.queries += 1;

            let doc = match result {
                Ok(doc) => doc,
                Err(source) => match self.options.on_query_error {
                    QueryErrorPolicy::Skip => {
                        tracing::warn!(
                            "Skipping {}: {} ({})",
                            slot.id(),
                            format_query_error(&source),
                            source
                        );
                        stats.failed += 1;
                        empty_object()
                    }
                    QueryErrorPolicy::Abort => {
                        return Err(ResolveError::Query {
                            id: slot.id().to_string(),
                            source,
                        });
                    }
                },
            };

            claim_nested_ids(&doc, cache, &mut queue);
            cache.fulfil(slot, doc);
        }

        Ok(())
    }

    async fn fetch(&self, slot: PendingRef) -> (PendingRef, Result<Value, QueryError>) {
        let target = QueryTarget::parse(slot.id());
        let result = self
            .source
            .query(&target)
            .await
            .map(|rows| document_from_rows(&target, rows));
        (slot, result)
    }
}

/// Claim every unseen string `id` in `doc`, depth first
fn claim_nested_ids(doc: &Value, cache: &mut ResolutionCache, queue: &mut VecDeque<PendingRef>) {
    match doc {
        Value::Array(items) => {
            for item in items {
                claim_nested_ids(item, cache, queue);
            }
        }
        Value::Object(map) => {
            match map.get("id") {
                Some(Value::String(id)) => {
                    if let Some(slot) = cache.claim(id) {
                        queue.push_back(slot);
                    }
                }
                Some(other) => tracing::debug!("Ignoring non-string id: {}", other),
                None => {}
            }
            for value in map.values() {
                claim_nested_ids(value, cache, queue);
            }
        }
        _ => {}
    }
}

/// Turn query rows into the raw document for a target
fn document_from_rows(target: &QueryTarget, rows: Vec<Value>) -> Value {
    match target {
        QueryTarget::All => Value::Array(rows),
        QueryTarget::Id(id) => rows.into_iter().next().unwrap_or_else(|| {
            tracing::debug!("No resource found for id: {}", id);
            empty_object()
        }),
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}
