//! Caching algorithms.
//!
//! Every algorithm runs against one request and the current generation's
//! store. Write-through is detached: the response never waits for the store
//! write, and a failed write is only logged.
//!
//! ### cache-first
//! Stored copy if present, no network. On a miss, fetch and write through.
//! A miss with a failed network propagates the network error; nothing is
//! synthesized.
//!
//! ### network-first
//! Fetch and write through. On a network failure, the stored copy, or a 503
//! JSON fallback naming the URL when there is none.
//!
//! ### stale-while-revalidate
//! The network fetch is issued before the store lookup. A stored copy is
//! returned at once and the fetch keeps running in the background, refreshing
//! the store for the next request. On a miss the caller waits for the fetch.

mod background;

pub use background::BackgroundTasks;

use serde::{Deserialize, Serialize};
use shellcache_core::{CacheStore, Error, RequestKey};
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::classify::StrategyTag;
use crate::fetch::{Fetcher, Request, Response};

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    /// Replayed from the current generation's store.
    Cache,
    /// Fetched from the network by a strategy.
    Network,
    /// Synthesized 503 from network-first.
    Fallback,
    /// Forwarded to the network without touching the store.
    Passthrough,
}

impl fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResponseSource::Cache => "cache",
            ResponseSource::Network => "network",
            ResponseSource::Fallback => "fallback",
            ResponseSource::Passthrough => "passthrough",
        };
        f.write_str(name)
    }
}

/// Outcome of a strategy.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub response: Response,
    pub source: ResponseSource,
}

impl Resolved {
    fn new(response: Response, source: ResponseSource) -> Self {
        Self { response, source }
    }
}

/// Executes the caching algorithms.
#[derive(Clone)]
pub struct StrategyEngine {
    fetcher: Arc<dyn Fetcher>,
    background: BackgroundTasks,
}

impl StrategyEngine {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher, background: BackgroundTasks::new() }
    }

    /// Tracker of the detached writes and revalidations this engine started.
    pub fn background(&self) -> &BackgroundTasks {
        &self.background
    }

    /// Wait for every detached task to finish.
    pub async fn settle(&self) {
        self.background.settle().await;
    }

    /// Run the algorithm named by `tag`.
    pub async fn execute(&self, tag: StrategyTag, request: &Request, store: &CacheStore) -> Result<Resolved, Error> {
        match tag {
            StrategyTag::CacheFirst => self.cache_first(request, store).await,
            StrategyTag::NetworkFirst => self.network_first(request, store).await,
            StrategyTag::StaleWhileRevalidate => self.stale_while_revalidate(request, store).await,
            StrategyTag::Passthrough => {
                let response = self.fetcher.fetch(request).await?;
                Ok(Resolved::new(response, ResponseSource::Passthrough))
            }
        }
    }

    pub async fn cache_first(&self, request: &Request, store: &CacheStore) -> Result<Resolved, Error> {
        let key = request.key();

        if let Some(cached) = store.get(&key).await? {
            tracing::debug!(key = %key, generation = store.name(), "cache-first hit");
            return Ok(Resolved::new(Response::from_cached(cached), ResponseSource::Cache));
        }

        let response = self.fetcher.fetch(request).await.inspect_err(|e| {
            tracing::debug!(key = %key, error = %e, "cache-first miss with network failure");
        })?;

        if response.is_cacheable() {
            self.write_through(store, key, &response);
        }

        Ok(Resolved::new(response, ResponseSource::Network))
    }

    pub async fn network_first(&self, request: &Request, store: &CacheStore) -> Result<Resolved, Error> {
        let key = request.key();

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.is_cacheable() {
                    self.write_through(store, key, &response);
                }
                Ok(Resolved::new(response, ResponseSource::Network))
            }
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "network-first falling back to store");

                match store.get(&key).await? {
                    Some(cached) => Ok(Resolved::new(Response::from_cached(cached), ResponseSource::Cache)),
                    None => {
                        tracing::warn!(key = %key, error = %e, "no network and no stored copy; answering 503");
                        Ok(Resolved::new(Response::service_unavailable(request.url.as_str()), ResponseSource::Fallback))
                    }
                }
            }
        }
    }

    pub async fn stale_while_revalidate(&self, request: &Request, store: &CacheStore) -> Result<Resolved, Error> {
        let key = request.key();
        let (tx, rx) = oneshot::channel();

        let engine = self.clone();
        let revalidate_store = store.clone();
        let revalidate_request = request.clone();
        self.background.spawn(async move {
            let result = engine.fetcher.fetch(&revalidate_request).await;
            if let Ok(response) = &result
                && response.is_cacheable()
            {
                engine.write_through(&revalidate_store, revalidate_request.key(), response);
            }

            if let Err(e) = &result {
                tracing::warn!(url = %revalidate_request.url, error = %e, "background revalidation failed");
            }
            // Nobody is listening once a stored copy was served.
            let _ = tx.send(result);
        });

        if let Some(cached) = store.get(&key).await? {
            tracing::debug!(key = %key, generation = store.name(), "serving stale copy while revalidating");
            return Ok(Resolved::new(Response::from_cached(cached), ResponseSource::Cache));
        }

        match rx.await {
            Ok(result) => result.map(|response| Resolved::new(response, ResponseSource::Network)),
            Err(_) => Err(Error::Network(format!("{}: revalidation ended without a result", request.url))),
        }
    }

    /// Detached store write. Failures are logged and dropped.
    fn write_through(&self, store: &CacheStore, key: RequestKey, response: &Response) {
        let store = store.clone();
        let snapshot = response.to_cached();
        self.background.spawn(async move {
            match store.put(&key, &snapshot).await {
                Ok(()) => tracing::debug!(key = %key, generation = store.name(), "write-through stored"),
                Err(e) => tracing::warn!(key = %key, generation = store.name(), error = %e, "write-through failed"),
            }
        });
    }
}
