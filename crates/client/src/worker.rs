//! Lifecycle host.
//!
//! [`Worker`] is what the hosting runtime talks to. It owns the generation
//! manager and the interceptor and maps runtime triggers onto them:
//!
//! | trigger       | effect                                                  |
//! |---------------|---------------------------------------------------------|
//! | `on_install`  | populate, then skip waiting when configured              |
//! | `on_activate` | delete stale generations, claim clients, broadcast       |
//! | `on_fetch`    | respond from a strategy, or pass through                 |
//! | `on_message`  | `SKIP_WAITING` forces activation of an installed worker  |

use serde::{Deserialize, Serialize};
use shellcache_core::{AppConfig, CacheDb, Error};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::classify::Classifier;
use crate::fetch::{FetchClient, FetchConfig, Fetcher, Request};
use crate::generation::{ActivateReport, ClientMessage, GenerationManager, GenerationState, Manifest, PopulateReport};
use crate::intercept::{Interception, Interceptor};
use crate::strategy::{Resolved, ResponseSource, StrategyEngine};

/// Commands accepted from controlled clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    SkipWaiting,
}

impl FromStr for Command {
    type Err = Error;

    /// Accepts the bare command name or its `{"type": ..}` message form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.starts_with('{') {
            return serde_json::from_str(s).map_err(|e| Error::InvalidInput(format!("unrecognized message {s}: {e}")));
        }

        match s {
            "SKIP_WAITING" => Ok(Command::SkipWaiting),
            other => Err(Error::InvalidInput(format!("unrecognized command: {other}"))),
        }
    }
}

pub struct Worker {
    manager: Arc<GenerationManager>,
    interceptor: Interceptor,
    fetcher: Arc<dyn Fetcher>,
    skip_waiting_on_install: bool,
}

impl Worker {
    /// Build a worker that reaches the network through reqwest.
    pub fn from_config(config: &AppConfig, db: CacheDb) -> Result<Self, Error> {
        let fetcher = Arc::new(FetchClient::new(FetchConfig::from_app_config(config)?)?);
        Self::with_fetcher(config, db, fetcher)
    }

    pub fn with_fetcher(config: &AppConfig, db: CacheDb, fetcher: Arc<dyn Fetcher>) -> Result<Self, Error> {
        let origin = config.origin_url().map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let manifest = Manifest::from_config(&config.manifest, &origin)?;
        let classifier = Classifier::from_config(&config.routes)?;

        let manager = Arc::new(
            GenerationManager::new(config.generation.clone(), manifest, db, fetcher.clone())
                .with_concurrency(config.populate_concurrency),
        );
        let interceptor = Interceptor::new(classifier, StrategyEngine::new(fetcher.clone()), manager.clone());

        Ok(Self { manager, interceptor, fetcher, skip_waiting_on_install: config.skip_waiting_on_install })
    }

    pub fn manager(&self) -> &GenerationManager {
        &self.manager
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientMessage> {
        self.manager.subscribe()
    }

    pub async fn on_install(&self) -> Result<PopulateReport, Error> {
        let report = self.manager.populate().await?;
        if self.skip_waiting_on_install {
            self.manager.skip_waiting();
        }
        Ok(report)
    }

    pub async fn on_activate(&self) -> Result<ActivateReport, Error> {
        self.manager.activate().await
    }

    /// Install, then activate straight away if waiting was skipped.
    pub async fn start(&self) -> Result<Option<ActivateReport>, Error> {
        self.on_install().await?;
        if !self.manager.is_waiting_skipped() {
            tracing::info!(generation = self.manager.current_generation_name(), "installed; waiting for SKIP_WAITING");
            return Ok(None);
        }
        self.on_activate().await.map(Some)
    }

    pub async fn on_fetch(&self, request: &Request) -> Result<Interception, Error> {
        self.interceptor.intercept(request).await
    }

    /// Resolve a request end to end, sending passthroughs to the network.
    pub async fn fetch(&self, request: &Request) -> Result<Resolved, Error> {
        match self.on_fetch(request).await? {
            Interception::Respond(resolved) => Ok(resolved),
            Interception::Passthrough => {
                let response = self.fetcher.fetch(request).await?;
                Ok(Resolved { response, source: ResponseSource::Passthrough })
            }
        }
    }

    /// Handle a client command. Returns the activation it triggered, if any.
    pub async fn on_message(&self, command: Command) -> Result<Option<ActivateReport>, Error> {
        match command {
            Command::SkipWaiting => {
                self.manager.skip_waiting();
                if self.manager.state().await == GenerationState::Installed {
                    return self.on_activate().await.map(Some);
                }
                Ok(None)
            }
        }
    }

    /// Wait for detached write-throughs and revalidations.
    pub async fn settle(&self) {
        self.interceptor.engine().settle().await;
    }
}
