//! Per-request entry point.

use shellcache_core::Error;
use std::sync::Arc;

use crate::classify::{Classifier, StrategyTag};
use crate::fetch::Request;
use crate::generation::GenerationManager;
use crate::strategy::{Resolved, StrategyEngine};

/// What the host should do with an intercepted request.
#[derive(Debug)]
pub enum Interception {
    /// Substitute this response for the network's.
    Respond(Resolved),
    /// Let the request reach the network untouched.
    Passthrough,
}

pub struct Interceptor {
    classifier: Classifier,
    engine: StrategyEngine,
    manager: Arc<GenerationManager>,
}

impl Interceptor {
    pub fn new(classifier: Classifier, engine: StrategyEngine, manager: Arc<GenerationManager>) -> Self {
        Self { classifier, engine, manager }
    }

    pub fn engine(&self) -> &StrategyEngine {
        &self.engine
    }

    /// Classify the request and run its strategy against the current store.
    ///
    /// Unsafe methods and forced refreshes are never instrumented, and nothing
    /// is handled before a generation has been activated.
    pub async fn intercept(&self, request: &Request) -> Result<Interception, Error> {
        let tag = self.classifier.classify(request);
        if tag == StrategyTag::Passthrough {
            return Ok(Interception::Passthrough);
        }

        let Some(store) = self.manager.current_store().await? else {
            tracing::debug!(url = %request.url, "no active generation; passing through");
            return Ok(Interception::Passthrough);
        };

        let resolved = self.engine.execute(tag, request, &store).await?;
        tracing::debug!(url = %request.url, strategy = %tag, source = ?resolved.source, "intercepted");
        Ok(Interception::Respond(resolved))
    }
}
