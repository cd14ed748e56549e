//! Tick source for scrape cycles.

use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Shortest period accepted by [`TickerChan::new`].
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Delivers the nominal instant at which each scrape cycle should begin.
///
/// Ticks carry the scheduled time, not the time the consumer woke up, so
/// samples stay aligned to the schedule. A tick that arrives while the
/// consumer is still busy with the previous cycle is dropped.
pub struct TickerChan {
    rx: mpsc::Receiver<SystemTime>,
    stop: CancellationToken,
}

impl TickerChan {
    /// Tick every `period`, starting one period from now.
    pub fn new(period: Duration) -> Self {
        let period = period.max(MIN_PERIOD);
        let (tx, rx) = mpsc::channel(1);
        let stop = CancellationToken::new();
        let token = stop.clone();

        tokio::spawn(async move {
            let anchor = Instant::now();
            let anchor_wall = SystemTime::now();
            let mut interval = tokio::time::interval_at(anchor + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                let scheduled = tokio::select! {
                    _ = token.cancelled() => break,
                    at = interval.tick() => at,
                };
                let nominal = anchor_wall + scheduled.duration_since(anchor);
                match tx.try_send(nominal) {
                    Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => {}
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
        });

        Self { rx, stop }
    }

    /// A ticker driven by hand through the returned sender.
    pub fn manual() -> (Self, mpsc::Sender<SystemTime>) {
        let (tx, rx) = mpsc::channel(16);
        (
            Self {
                rx,
                stop: CancellationToken::new(),
            },
            tx,
        )
    }

    /// Wait for the next tick. `None` once the ticker is stopped and drained.
    pub async fn tick(&mut self) -> Option<SystemTime> {
        self.rx.recv().await
    }

    /// Stop producing ticks. Idempotent.
    pub fn stop(&mut self) {
        self.stop.cancel();
        self.rx.close();
    }
}

impl Drop for TickerChan {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}
