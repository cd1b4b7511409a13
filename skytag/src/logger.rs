//! Best-effort usage logging of resolution events.
//!
//! Callers never block: `log()` clones the payload onto a bounded channel
//! and a single background worker performs the network notification. Each
//! event carries its own copy of the data, so there is no shared staging
//! state to guard.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, trace};

const SEND_TIMEOUT: Duration = Duration::from_secs(5);
const DRAIN_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
struct LogEvent {
    tag: String,
    params: String,
    at: DateTime<Utc>,
}

/// Handle for firing resolution notifications. Cheap to clone.
#[derive(Clone)]
pub struct UsageLogger {
    tx: Option<mpsc::Sender<LogEvent>>,
    pending: Arc<AtomicUsize>,
}

impl UsageLogger {
    /// A logger bound to `site`, or a disabled no-op logger when `site` is
    /// `None`. Spawns the worker task on the current runtime.
    pub fn new(client: reqwest::Client, site: Option<String>, queue: usize) -> Self {
        let pending = Arc::new(AtomicUsize::new(0));
        let Some(site) = site else {
            return Self { tx: None, pending };
        };

        let (tx, rx) = mpsc::channel(queue.max(1));
        tokio::spawn(run_worker(client, site, rx, Arc::clone(&pending)));
        Self {
            tx: Some(tx),
            pending,
        }
    }

    /// Disabled logger, for callers that never notify.
    pub fn disabled() -> Self {
        Self {
            tx: None,
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue a notification. Never blocks; a full queue drops the event.
    pub fn log(&self, tag: &str, params: &str) {
        let Some(tx) = &self.tx else {
            return;
        };
        let event = LogEvent {
            tag: tag.to_string(),
            params: params.to_string(),
            at: Utc::now(),
        };
        self.pending.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = tx.try_send(event) {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            trace!(tag, error = %e, "usage log queue full, event dropped");
        }
    }

    /// Number of notifications not yet delivered.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Wait until every queued notification has been attempted. Callers
    /// wanting a bound should wrap this in `tokio::time::timeout`.
    pub async fn drain(&self) {
        while self.pending() > 0 {
            tokio::time::sleep(DRAIN_POLL).await;
        }
    }
}

async fn run_worker(
    client: reqwest::Client,
    site: String,
    mut rx: mpsc::Receiver<LogEvent>,
    pending: Arc<AtomicUsize>,
) {
    while let Some(event) = rx.recv().await {
        let at = event.at.to_rfc3339();
        let result = client
            .get(&site)
            .query(&[
                ("tag", event.tag.as_str()),
                ("params", event.params.as_str()),
                ("at", at.as_str()),
            ])
            .timeout(SEND_TIMEOUT)
            .send()
            .await;
        if let Err(e) = result {
            debug!(tag = %event.tag, error = %e, "usage log notification failed");
        }
        pending.fetch_sub(1, Ordering::SeqCst);
    }
}
