//! Scripted network and log capture for unit tests.

use async_trait::async_trait;
use reqwest::StatusCode;
use shellcache_core::Error;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

use crate::fetch::{Fetcher, Request, Response, ResponseKind};

struct Reply {
    status: u16,
    body: String,
    kind: ResponseKind,
}

/// Per-URL canned replies, an offline switch and a call counter.
/// Unknown URLs answer 404.
#[derive(Default)]
pub(crate) struct ScriptedFetcher {
    replies: Mutex<HashMap<String, Reply>>,
    offline: AtomicBool,
    calls: AtomicUsize,
    latency: Duration,
}

impl ScriptedFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_latency(latency: Duration) -> Self {
        Self { latency, ..Self::default() }
    }

    pub(crate) fn reply(&self, url: &str, status: u16, body: &str) {
        self.insert(url, Reply { status, body: body.to_string(), kind: ResponseKind::Basic });
    }

    pub(crate) fn reply_opaque(&self, url: &str, status: u16, body: &str) {
        self.insert(url, Reply { status, body: body.to_string(), kind: ResponseKind::Opaque });
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn insert(&self, url: &str, reply: Reply) {
        self.replies.lock().unwrap().insert(url.to_string(), reply);
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("{}: offline", request.url)));
        }

        let replies = self.replies.lock().unwrap();
        let response = match replies.get(request.url.as_str()) {
            Some(reply) => Response::new(request.url.as_str(), StatusCode::from_u16(reply.status).unwrap(), reply.body.clone())
                .with_kind(reply.kind),
            None => Response::new(request.url.as_str(), StatusCode::NOT_FOUND, ""),
        };
        Ok(response)
    }
}

/// Formatted log output collected in memory.
#[derive(Clone, Default)]
pub(crate) struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Capture `warn` and above on this thread until the guard drops.
/// Only spans the single-threaded test runtime.
pub(crate) fn capture_logs() -> (LogCapture, DefaultGuard) {
    let capture = LogCapture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(capture.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();
    (capture, tracing::subscriber::set_default(subscriber))
}
