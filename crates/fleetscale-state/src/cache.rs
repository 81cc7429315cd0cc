//! Read-through TTL cache for state providers.
//!
//! [`CachedStateProvider`] wraps any [`ClusterStateProvider`] and serves
//! repeated reads from memory for a short TTL. Decisions tolerate up to
//! one TTL of staleness; failed reads are never cached.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

use crate::error::StateResult;
use crate::provider::ClusterStateProvider;
use crate::types::*;

/// Default time a cached read stays fresh.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(10);

struct Entry<V> {
    fetched_at: Instant,
    value: V,
}

/// A keyed cache whose entries expire after a fixed TTL.
pub struct TtlCache<V> {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached value for `key`, or run `fetch` and cache its
    /// successful result.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> StateResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = StateResult<V>>,
    {
        {
            let entries = self.entries.lock().await;
            if let Some(entry) = entries.get(key)
                && entry.fetched_at.elapsed() < self.ttl
            {
                trace!(%key, "state cache hit");
                return Ok(entry.value.clone());
            }
        }

        let value = fetch().await?;
        self.entries.lock().await.insert(
            key.to_string(),
            Entry {
                fetched_at: Instant::now(),
                value: value.clone(),
            },
        );
        Ok(value)
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}

/// A [`ClusterStateProvider`] that caches the reads of an inner provider.
pub struct CachedStateProvider<P> {
    inner: P,
    nodes: TtlCache<Vec<Node>>,
    allocations: TtlCache<Vec<Allocation>>,
    evaluations: TtlCache<Vec<Evaluation>>,
    jobs: TtlCache<BTreeMap<JobId, JobMeta>>,
    job_specs: TtlCache<JobSpec>,
}

impl<P: ClusterStateProvider> CachedStateProvider<P> {
    pub fn new(inner: P, ttl: Duration) -> Self {
        Self {
            inner,
            nodes: TtlCache::new(ttl),
            allocations: TtlCache::new(ttl),
            evaluations: TtlCache::new(ttl),
            jobs: TtlCache::new(ttl),
            job_specs: TtlCache::new(ttl),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Forget everything cached so the next reads go to the provider.
    pub async fn invalidate(&self) {
        self.nodes.clear().await;
        self.allocations.clear().await;
        self.evaluations.clear().await;
        self.jobs.clear().await;
        self.job_specs.clear().await;
    }
}

#[async_trait]
impl<P: ClusterStateProvider> ClusterStateProvider for CachedStateProvider<P> {
    async fn nodes(&self) -> StateResult<Vec<Node>> {
        self.nodes.get_or_fetch("nodes", || self.inner.nodes()).await
    }

    async fn allocations(&self) -> StateResult<Vec<Allocation>> {
        self.allocations
            .get_or_fetch("allocations", || self.inner.allocations())
            .await
    }

    async fn evaluations(&self) -> StateResult<Vec<Evaluation>> {
        self.evaluations
            .get_or_fetch("evaluations", || self.inner.evaluations())
            .await
    }

    async fn jobs(&self) -> StateResult<BTreeMap<JobId, JobMeta>> {
        self.jobs.get_or_fetch("jobs", || self.inner.jobs()).await
    }

    async fn job_details(&self, job_id: &str) -> StateResult<JobSpec> {
        self.job_specs
            .get_or_fetch(job_id, || self.inner.job_details(job_id))
            .await
    }
}
