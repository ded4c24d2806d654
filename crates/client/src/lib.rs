//! Client-side interception and caching for shellcache.
//!
//! This crate decides, per intercepted request, whether to answer from the
//! current generation's store, from the network, or both:
//!
//! - [`fetch`]: request/response model and the network seam ([`Fetcher`])
//! - [`classify`]: ordered rule table mapping a request to a [`StrategyTag`]
//! - [`strategy`]: cache-first, network-first and stale-while-revalidate
//! - [`generation`]: install-time population, activation and cutover
//! - [`intercept`]: per-request entry point wiring the pieces together
//! - [`worker`]: lifecycle host exposing install/activate/fetch/message

pub mod classify;
pub mod fetch;
pub mod generation;
pub mod intercept;
pub mod strategy;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use classify::{Classifier, StrategyTag, is_forced_refresh};
pub use fetch::{
    CacheMode, FetchClient, FetchConfig, Fetcher, Request, RequestMode, Response, ResponseKind, canonicalize,
};
pub use generation::{ActivateReport, ClientMessage, GenerationManager, GenerationState, Manifest, PopulateReport};
pub use intercept::{Interception, Interceptor};
pub use strategy::{BackgroundTasks, Resolved, ResponseSource, StrategyEngine};
pub use worker::{Command, Worker};
