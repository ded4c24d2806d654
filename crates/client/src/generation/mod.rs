//! Cache generation lifecycle.
//!
//! One generation is current at a time. Its store is filled at install time
//! from the [`Manifest`], and activation deletes every other store before
//! clients are claimed and told to reload.
//!
//! ```text
//! Uninitialized -> Populating -> Installed -> Active -> Superseded
//!        ^             |
//!        +-------------+  (store open failed)
//! ```

mod manifest;

pub use manifest::{Asset, AssetClass, Manifest};

use serde::{Deserialize, Serialize};
use shellcache_core::{CacheDb, CacheStore, Error};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{RwLock, Semaphore, broadcast};
use tokio::task::JoinSet;

use crate::fetch::{Fetcher, Request};

const MESSAGE_CAPACITY: usize = 16;
const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationState {
    Uninitialized,
    Populating,
    /// Populated and waiting for activation.
    Installed,
    Active,
    /// Replaced by a newer deployment; no longer serves requests.
    Superseded,
}

impl fmt::Display for GenerationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GenerationState::Uninitialized => "uninitialized",
            GenerationState::Populating => "populating",
            GenerationState::Installed => "installed",
            GenerationState::Active => "active",
            GenerationState::Superseded => "superseded",
        };
        f.write_str(name)
    }
}

/// Broadcast to controlled clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// A new generation took over; clients should reload.
    ReloadPage,
}

/// A manifest entry that did not make it into the store.
#[derive(Debug, Clone, Serialize)]
pub struct AssetMiss {
    pub url: String,
    pub class: AssetClass,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PopulateReport {
    pub generation: String,
    pub cached: Vec<String>,
    pub missed: Vec<AssetMiss>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivateReport {
    pub generation: String,
    /// Stores removed by this run, in creation order.
    pub deleted: Vec<String>,
    /// True only on the run that moved the generation to active.
    pub claimed: bool,
}

/// Owns the current generation and its transitions.
pub struct GenerationManager {
    generation: String,
    manifest: Manifest,
    db: CacheDb,
    fetcher: Arc<dyn Fetcher>,
    concurrency: usize,
    state: RwLock<GenerationState>,
    /// Set at activation; cleared once superseded.
    active: RwLock<Option<CacheStore>>,
    skip_waiting: AtomicBool,
    messages: broadcast::Sender<ClientMessage>,
}

impl GenerationManager {
    pub fn new(generation: impl Into<String>, manifest: Manifest, db: CacheDb, fetcher: Arc<dyn Fetcher>) -> Self {
        let (messages, _) = broadcast::channel(MESSAGE_CAPACITY);
        Self {
            generation: generation.into(),
            manifest,
            db,
            fetcher,
            concurrency: DEFAULT_CONCURRENCY,
            state: RwLock::new(GenerationState::Uninitialized),
            active: RwLock::new(None),
            skip_waiting: AtomicBool::new(false),
            messages,
        }
    }

    /// Bound the number of manifest fetches in flight during population.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn current_generation_name(&self) -> &str {
        &self.generation
    }

    pub fn db(&self) -> &CacheDb {
        &self.db
    }

    pub async fn state(&self) -> GenerationState {
        *self.state.read().await
    }

    /// Receive cutover messages.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientMessage> {
        self.messages.subscribe()
    }

    /// Take over without waiting for old clients to go away.
    pub fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::SeqCst);
        tracing::debug!(generation = %self.generation, "skip waiting requested");
    }

    pub fn is_waiting_skipped(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    /// Mark this generation as replaced. It stops serving requests.
    pub async fn retire(&self) {
        let mut state = self.state.write().await;
        *state = GenerationState::Superseded;
        *self.active.write().await = None;
        drop(state);
        tracing::info!(generation = %self.generation, "generation superseded");
    }

    /// Open the generation's store and write every manifest asset into it.
    ///
    /// Individual asset failures are recorded in the report and never abort
    /// the run. Only a store that cannot be opened fails population.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidState` outside `Uninitialized`/`Installed`, or
    /// the store open error.
    pub async fn populate(&self) -> Result<PopulateReport, Error> {
        {
            let mut state = self.state.write().await;
            match *state {
                GenerationState::Uninitialized | GenerationState::Installed => *state = GenerationState::Populating,
                other => return Err(Error::InvalidState(format!("cannot populate {} while {other}", self.generation))),
            }
        }

        let store = match self.db.open_store(&self.generation).await {
            Ok(store) => store,
            Err(e) => {
                *self.state.write().await = GenerationState::Uninitialized;
                tracing::error!(generation = %self.generation, error = %e, "population failed to open store");
                return Err(e);
            }
        };

        let assets = self.manifest.assets();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut join_set = JoinSet::new();

        for (index, asset) in assets.iter().cloned().enumerate() {
            let semaphore = semaphore.clone();
            let fetcher = self.fetcher.clone();
            let store = store.clone();

            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                (index, cache_asset(fetcher.as_ref(), &store, &asset).await)
            });
        }

        let mut outcomes: Vec<Option<Result<(), String>>> = vec![None; assets.len()];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = Some(outcome),
                Err(e) => tracing::warn!(generation = %self.generation, error = %e, "population task failed"),
            }
        }

        let mut report = PopulateReport { generation: self.generation.clone(), cached: Vec::new(), missed: Vec::new() };
        for (asset, outcome) in assets.iter().zip(outcomes) {
            let reason = match outcome {
                Some(Ok(())) => {
                    report.cached.push(asset.url.to_string());
                    continue;
                }
                Some(Err(reason)) => reason,
                None => "task did not complete".to_string(),
            };

            tracing::warn!(generation = %self.generation, url = %asset.url, class = ?asset.class, reason = %reason, "asset not cached");
            report.missed.push(AssetMiss { url: asset.url.to_string(), class: asset.class, reason });
        }

        *self.state.write().await = GenerationState::Installed;
        tracing::info!(
            generation = %self.generation,
            cached = report.cached.len(),
            missed = report.missed.len(),
            "population complete"
        );

        Ok(report)
    }

    /// Delete every other generation, then claim clients.
    ///
    /// The write lock is held across the deletion pass so no request can read
    /// from the new store before the old ones are gone. Re-running on an
    /// active generation deletes nothing and broadcasts nothing.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidState` unless the generation is installed or
    /// already active, or the store error that interrupted deletion.
    pub async fn activate(&self) -> Result<ActivateReport, Error> {
        let mut state = self.state.write().await;
        if !matches!(*state, GenerationState::Installed | GenerationState::Active) {
            return Err(Error::InvalidState(format!("cannot activate {} while {}", self.generation, *state)));
        }

        let mut deleted = Vec::new();
        for name in self.db.store_names().await? {
            if name == self.generation {
                continue;
            }
            if self.db.delete_store(&name).await? {
                tracing::info!(generation = %name, current = %self.generation, "deleted stale generation");
                deleted.push(name);
            }
        }

        let store = self.db.existing_store(&self.generation).await?.ok_or_else(|| {
            Error::InvalidState(format!("store for {} was deleted before activation", self.generation))
        })?;

        let claimed = *state == GenerationState::Installed;
        *state = GenerationState::Active;
        *self.active.write().await = Some(store);
        drop(state);

        if claimed {
            tracing::info!(generation = %self.generation, "clients claimed");
            // No subscribers is fine: nobody to reload.
            let receivers = self.messages.send(ClientMessage::ReloadPage).unwrap_or(0);
            tracing::info!(generation = %self.generation, receivers, "cutover broadcast");
        }

        Ok(ActivateReport { generation: self.generation.clone(), deleted, claimed })
    }

    /// The store requests may be served from. `None` until activation.
    ///
    /// A newer generation's activation deletes this store. Once that is
    /// observed the generation is superseded and stops serving; the store is
    /// never recreated.
    pub async fn current_store(&self) -> Result<Option<CacheStore>, Error> {
        let Some(store) = self.active.read().await.clone() else {
            return Ok(None);
        };

        if self.db.has_store(store.name()).await? {
            return Ok(Some(store));
        }

        tracing::info!(generation = %self.generation, "store deleted by a newer generation");
        self.retire().await;
        Ok(None)
    }
}

async fn cache_asset(fetcher: &dyn Fetcher, store: &CacheStore, asset: &Asset) -> Result<(), String> {
    let request = Request::get(asset.url.clone());
    let response = fetcher.fetch(&request).await.map_err(|e| e.to_string())?;

    if !response.is_cacheable() {
        return Err(format!("HTTP {}", response.status.as_u16()));
    }

    store
        .put(&request.key(), &response.to_cached())
        .await
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedFetcher;
    use shellcache_core::RequestKey;
    use url::Url;

    const INDEX: &str = "http://localhost:8080/index.html";
    const ICON: &str = "http://localhost:8080/favicon.ico";
    const GONE: &str = "http://localhost:8080/removed.png";
    const SETS: &str = "http://localhost:8080/data/sets.csv";

    fn manifest() -> Manifest {
        let urls = |list: &[&str]| list.iter().map(|u| Url::parse(u).unwrap()).collect();
        Manifest::new(urls(&[INDEX, ICON, GONE]), urls(&[SETS]))
    }

    async fn manager(generation: &str, db: CacheDb) -> (Arc<ScriptedFetcher>, GenerationManager) {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.reply(INDEX, 200, "<html></html>");
        fetcher.reply(ICON, 200, "icon");
        fetcher.reply(SETS, 200, "set_num,name\n");
        let manager = GenerationManager::new(generation, manifest(), db, fetcher.clone());
        (fetcher, manager)
    }

    #[tokio::test]
    async fn test_populate_tolerates_missing_asset() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let (_, manager) = manager("shellcache-v2", db.clone()).await;

        let report = manager.populate().await.unwrap();

        assert_eq!(report.cached, vec![INDEX, ICON, SETS]);
        assert_eq!(report.missed.len(), 1);
        assert_eq!(report.missed[0].url, GONE);
        assert_eq!(report.missed[0].class, AssetClass::Shell);
        assert_eq!(report.missed[0].reason, "HTTP 404");
        assert_eq!(manager.state().await, GenerationState::Installed);

        let store = db.open_store("shellcache-v2").await.unwrap();
        assert_eq!(store.len().await.unwrap(), 3);
        assert!(store.get(&RequestKey::get(INDEX)).await.unwrap().is_some());
        assert!(store.get(&RequestKey::get(GONE)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_populate_offline_still_installs() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let (fetcher, manager) = manager("shellcache-v2", db.clone()).await;
        fetcher.set_offline(true);

        let report = manager.populate().await.unwrap();

        assert!(report.cached.is_empty());
        assert_eq!(report.missed.len(), 4);
        assert!(db.has_store("shellcache-v2").await.unwrap());
        assert_eq!(manager.state().await, GenerationState::Installed);
    }

    #[tokio::test]
    async fn test_populate_with_bounded_concurrency() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let (_, manager) = manager("shellcache-v2", db).await;
        let manager = manager.with_concurrency(1);

        let report = manager.populate().await.unwrap();
        assert_eq!(report.cached, vec![INDEX, ICON, SETS]);
    }

    #[tokio::test]
    async fn test_populate_bad_store_name_reverts() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let (_, manager) = manager("", db).await;

        assert!(matches!(manager.populate().await, Err(Error::StoreOpen(_))));
        assert_eq!(manager.state().await, GenerationState::Uninitialized);
    }

    #[tokio::test]
    async fn test_activate_removes_other_generations() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open_store("shellcache-v0").await.unwrap();
        db.open_store("shellcache-v1").await.unwrap();
        let (_, manager) = manager("shellcache-v2", db.clone()).await;

        manager.populate().await.unwrap();
        let report = manager.activate().await.unwrap();

        assert_eq!(report.deleted, vec!["shellcache-v0", "shellcache-v1"]);
        assert!(report.claimed);
        assert_eq!(db.store_names().await.unwrap(), vec!["shellcache-v2"]);
        assert_eq!(manager.state().await, GenerationState::Active);
    }

    #[tokio::test]
    async fn test_activate_twice_is_noop() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open_store("shellcache-v1").await.unwrap();
        let (_, manager) = manager("shellcache-v2", db.clone()).await;
        manager.populate().await.unwrap();

        let first = manager.activate().await.unwrap();
        let mut messages = manager.subscribe();
        let second = manager.activate().await.unwrap();

        assert_eq!(first.deleted.len(), 1);
        assert!(second.deleted.is_empty());
        assert!(!second.claimed);
        assert!(messages.try_recv().is_err());
        assert_eq!(db.store_names().await.unwrap(), vec!["shellcache-v2"]);
    }

    #[tokio::test]
    async fn test_activate_broadcasts_reload() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let (_, manager) = manager("shellcache-v2", db).await;
        let mut messages = manager.subscribe();

        manager.populate().await.unwrap();
        manager.activate().await.unwrap();

        let message = messages.recv().await.unwrap();
        assert_eq!(message, ClientMessage::ReloadPage);
        assert_eq!(serde_json::to_string(&message).unwrap(), r#"{"type":"RELOAD_PAGE"}"#);
    }

    #[tokio::test]
    async fn test_invalid_transitions() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let (_, manager) = manager("shellcache-v2", db).await;

        assert!(matches!(manager.activate().await, Err(Error::InvalidState(_))));

        manager.populate().await.unwrap();
        manager.activate().await.unwrap();
        assert!(matches!(manager.populate().await, Err(Error::InvalidState(_))));

        manager.retire().await;
        assert!(matches!(manager.activate().await, Err(Error::InvalidState(_))));
        assert!(manager.current_store().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_newer_activation_supersedes_old_generation() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let (_, old) = manager("shellcache-v1", db.clone()).await;
        old.populate().await.unwrap();
        old.activate().await.unwrap();
        assert!(old.current_store().await.unwrap().is_some());

        let (_, new) = manager("shellcache-v2", db.clone()).await;
        new.populate().await.unwrap();
        new.activate().await.unwrap();

        assert!(old.current_store().await.unwrap().is_none());
        assert_eq!(old.state().await, GenerationState::Superseded);
        assert_eq!(db.store_names().await.unwrap(), vec!["shellcache-v2"]);
        assert!(matches!(old.activate().await, Err(Error::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_current_store_only_when_active() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let (_, manager) = manager("shellcache-v2", db).await;

        assert!(manager.current_store().await.unwrap().is_none());
        manager.populate().await.unwrap();
        assert!(manager.current_store().await.unwrap().is_none());
        manager.activate().await.unwrap();

        let store = manager.current_store().await.unwrap().unwrap();
        assert_eq!(store.name(), "shellcache-v2");
        assert_eq!(manager.current_generation_name(), "shellcache-v2");
    }

    #[tokio::test]
    async fn test_skip_waiting_flag() {
        let fetcher: Arc<dyn Fetcher> = Arc::new(ScriptedFetcher::new());
        let db = CacheDb::open_in_memory().await.unwrap();
        let manager = GenerationManager::new("shellcache-v2", Manifest::default(), db, fetcher);

        assert!(!manager.is_waiting_skipped());
        manager.skip_waiting();
        assert!(manager.is_waiting_skipped());
    }

    #[test]
    fn test_state_serialization() {
        assert_eq!(serde_json::to_string(&GenerationState::Installed).unwrap(), r#""installed""#);
        assert_eq!(GenerationState::Superseded.to_string(), "superseded");
    }
}
