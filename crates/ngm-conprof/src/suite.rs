//! Scrape suite — the periodic fetch loop for one target.
//!
//! A [`ScrapeSuite`] waits for ticks, fetches a profile into a reused
//! buffer under a per-cycle timeout and forwards the payload to profile
//! storage. Failures are logged and the cycle skipped; only cancellation
//! ends the loop.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use ngm_core::ProfileTarget;

use crate::scraper::Scraper;
use crate::store::ProfileStore;
use crate::ticker::TickerChan;

/// Capacity of the scrape buffer before the first payload is seen.
const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// Lifecycle of a suite. A stopped suite never runs again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuiteState {
    Idle,
    Running,
    Stopped,
}

/// Periodic scraping of one target.
pub struct ScrapeSuite {
    scraper: Scraper,
    store: Arc<dyn ProfileStore>,
    cancel: CancellationToken,
    state: SuiteState,
    /// Tick of the last cycle whose payload was persisted.
    last_scrape: Option<SystemTime>,
    /// Size of the last non-empty payload, used to size the buffer.
    last_scrape_size: usize,
}

impl ScrapeSuite {
    /// Create a suite whose lifetime is bounded by `parent`.
    pub fn new(
        parent: &CancellationToken,
        scraper: Scraper,
        store: Arc<dyn ProfileStore>,
    ) -> Self {
        Self {
            scraper,
            store,
            cancel: parent.child_token(),
            state: SuiteState::Idle,
            last_scrape: None,
            last_scrape_size: 0,
        }
    }

    pub fn identity(&self) -> &ProfileTarget {
        self.scraper.target().identity()
    }

    pub fn state(&self) -> SuiteState {
        self.state
    }

    pub fn last_scrape(&self) -> Option<SystemTime> {
        self.last_scrape
    }

    pub fn last_scrape_size(&self) -> usize {
        self.last_scrape_size
    }

    /// Token cancelled by [`stop`](Self::stop); lets an owner stop a suite
    /// that has been moved into a task.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the suite. An in-flight fetch is aborted; a persist call that
    /// already started may still complete after this returns.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Run the scrape loop until the suite is cancelled.
    pub async fn run(&mut self, mut ticker: TickerChan) {
        let target = self.identity().clone();
        if self.state != SuiteState::Idle {
            warn!(
                component = %target.component,
                address = %target.address,
                kind = %target.kind,
                state = ?self.state,
                "scraper already started"
            );
            return;
        }
        self.state = SuiteState::Running;

        info!(
            component = %target.component,
            address = %target.address,
            kind = %target.kind,
            "scraper start to run"
        );

        let mut buf = Vec::with_capacity(INITIAL_BUFFER_CAPACITY);
        self.last_scrape_size = 0;

        loop {
            let tick = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                tick = ticker.tick() => tick,
            };
            let Some(start) = tick else {
                // Ticker gone: nothing left to schedule, wait to be stopped.
                self.cancel.cancelled().await;
                break;
            };

            reuse_buffer(&mut buf, self.last_scrape_size);
            self.run_cycle(&target, start, &mut buf).await;
        }

        ticker.stop();
        self.state = SuiteState::Stopped;
        info!(
            component = %target.component,
            address = %target.address,
            kind = %target.kind,
            "scraper stop running"
        );
    }

    async fn run_cycle(&mut self, target: &ProfileTarget, start: SystemTime, buf: &mut Vec<u8>) {
        let timeout = self.scraper.config().current().timeout();
        let scope = self.cancel.child_token();
        let _release = scope.clone().drop_guard();

        if let Err(e) = self.scraper.scrape(&scope, timeout, buf).await {
            error!(
                component = %target.component,
                address = %target.address,
                kind = %target.kind,
                error = %e,
                "scrape failed"
            );
            return;
        }
        if buf.is_empty() {
            return;
        }

        self.last_scrape_size = buf.len();
        let ts = unix_seconds(start);
        match self.store.add_profile(target, ts, buf) {
            Ok(()) => self.last_scrape = Some(start),
            Err(e) => error!(
                component = %target.component,
                address = %target.address,
                kind = %target.kind,
                ts,
                error = %e,
                "save scrape data failed"
            ),
        }
    }
}

/// Empty `buf` for the next cycle, shrinking it when it has grown past
/// twice the last payload size.
fn reuse_buffer(buf: &mut Vec<u8>, last_size: usize) {
    if last_size > 0 && buf.capacity() > 2 * last_size {
        *buf = Vec::with_capacity(last_size);
    }
    buf.clear();
}

fn unix_seconds(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
