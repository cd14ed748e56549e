//! Scrape manager — owns one background suite per registered target.
//!
//! Suites tick on the interval in force when they were spawned. [`run`]
//! follows the live configuration and respawns every suite when the
//! interval or the CPU profile duration changes.
//!
//! [`run`]: ScrapeManager::run

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ngm_core::{ConfigHandle, ContinuousProfilingConfig, ProfileTarget, TargetConfig};

use crate::error::ScrapeError;
use crate::scraper::{HttpClient, Scraper, http_client};
use crate::store::ProfileStore;
use crate::suite::ScrapeSuite;
use crate::target::{Target, default_profiling_paths};
use crate::ticker::TickerChan;

/// How long a stopped suite gets to drain.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Where a suite's target comes from.
#[derive(Debug, Clone)]
enum Registration {
    /// Built by the caller; only the schedule follows the configuration.
    Fixed(Target),
    /// A built-in profile kind of a configured component, rebuilt from the
    /// configuration on every respawn.
    Component { component: TargetConfig, kind: String },
}

impl Registration {
    fn target(&self, config: &ContinuousProfilingConfig) -> Result<Target, ScrapeError> {
        match self {
            Registration::Fixed(target) => Ok(target.clone()),
            Registration::Component { component, kind } => {
                let paths = default_profiling_paths(config);
                let path = paths.get(kind.as_str()).ok_or_else(|| {
                    ScrapeError::InvalidRequest(format!("unknown profile kind {kind}"))
                })?;
                Target::from_config(component, kind, path)
            }
        }
    }
}

/// The configuration fields baked into a running suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Schedule {
    interval_seconds: u64,
    profile_seconds: u64,
}

impl Schedule {
    fn of(config: &ContinuousProfilingConfig) -> Self {
        Self {
            interval_seconds: config.interval_seconds,
            profile_seconds: config.profile_seconds,
        }
    }
}

/// Per-target suite state.
struct SuiteSlot {
    registration: Registration,
    cancel: CancellationToken,
    handle: JoinHandle<ScrapeSuite>,
}

/// Registers targets and runs a [`ScrapeSuite`] for each of them.
pub struct ScrapeManager {
    client: HttpClient,
    store: Arc<dyn ProfileStore>,
    config: ConfigHandle,
    gzip: bool,
    /// Parent of every suite token.
    root: CancellationToken,
    /// Schedule the running suites were spawned with.
    applied: Mutex<Schedule>,
    /// Active suites: target identity → slot.
    suites: Arc<RwLock<HashMap<ProfileTarget, SuiteSlot>>>,
}

impl ScrapeManager {
    pub fn new(store: Arc<dyn ProfileStore>, config: ConfigHandle) -> Self {
        let applied = Mutex::new(Schedule::of(&config.current()));
        Self {
            client: http_client(),
            store,
            config,
            gzip: false,
            root: CancellationToken::new(),
            applied,
            suites: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Gunzip profiles fetched by suites started after this call.
    pub fn with_gzip(mut self, gzip: bool) -> Self {
        self.gzip = gzip;
        self
    }

    /// Start scraping a target on the currently configured interval.
    ///
    /// A target with the same identity that is already running is stopped
    /// and replaced. Ignored once the manager is shut down.
    pub async fn start_target(&self, target: Target) {
        self.register(Registration::Fixed(target.clone()), target)
            .await;
    }

    /// Start scraping every built-in profile kind of a configured component.
    ///
    /// The targets are rebuilt from the live configuration whenever the
    /// suites are respawned, so a new profile duration reaches the URL.
    pub async fn start_component(&self, component: &TargetConfig) -> Result<(), ScrapeError> {
        let config = self.config.current();
        for kind in default_profiling_paths(&config).into_keys() {
            let registration = Registration::Component {
                component: component.clone(),
                kind: kind.to_string(),
            };
            let target = registration.target(&config)?;
            self.register(registration, target).await;
        }
        Ok(())
    }

    async fn register(&self, registration: Registration, target: Target) {
        let identity = target.identity().clone();
        if self.root.is_cancelled() {
            warn!(profile = %identity, "scrape manager is shut down, target ignored");
            return;
        }

        let interval = self.config.current().interval();
        let slot = self.spawn_slot(registration, target, interval);
        let replaced = self.suites.write().await.insert(identity.clone(), slot);

        info!(
            component = %identity.component,
            address = %identity.address,
            kind = %identity.kind,
            interval_secs = interval.as_secs(),
            "scrape target registered"
        );

        if let Some(old) = replaced {
            old.cancel.cancel();
            drain(&identity, old.handle).await;
            debug!(profile = %identity, "replaced running scrape suite");
        }
    }

    fn spawn_slot(
        &self,
        registration: Registration,
        target: Target,
        interval: Duration,
    ) -> SuiteSlot {
        let scraper = Scraper::new(Arc::new(target), self.client.clone(), self.config.clone())
            .with_gzip(self.gzip);
        let mut suite = ScrapeSuite::new(&self.root, scraper, Arc::clone(&self.store));
        let cancel = suite.cancel_token();

        let handle = tokio::spawn(async move {
            suite.run(TickerChan::new(interval)).await;
            suite
        });

        SuiteSlot {
            registration,
            cancel,
            handle,
        }
    }

    /// Follow configuration changes until [`shutdown`](Self::shutdown).
    ///
    /// Every suite is respawned when `interval_seconds` or
    /// `profile_seconds` changes; other fields are read by the suites at
    /// the start of each cycle.
    pub async fn run(&self) {
        let mut rx = self.config.subscribe();
        self.apply_schedule(&self.config.current()).await;

        loop {
            tokio::select! {
                _ = self.root.cancelled() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let config = rx.borrow_and_update().clone();
                    self.apply_schedule(&config).await;
                }
            }
        }
        debug!("scrape manager stopped following config");
    }

    async fn apply_schedule(&self, config: &ContinuousProfilingConfig) {
        let schedule = Schedule::of(config);
        {
            let mut applied = self.applied.lock();
            if *applied == schedule {
                return;
            }
            *applied = schedule;
        }

        let mut retired = Vec::new();
        let mut suites = self.suites.write().await;
        let identities: Vec<ProfileTarget> = suites.keys().cloned().collect();
        for identity in identities {
            let Some(old) = suites.remove(&identity) else {
                continue;
            };
            old.cancel.cancel();
            match old.registration.target(config) {
                Ok(target) => {
                    let slot = self.spawn_slot(old.registration.clone(), target, config.interval());
                    suites.insert(identity.clone(), slot);
                }
                Err(e) => warn!(profile = %identity, error = %e, "failed to rebuild scrape target"),
            }
            retired.push((identity, old.handle));
        }
        let respawned = suites.len();
        drop(suites);

        for (identity, handle) in retired {
            drain(&identity, handle).await;
        }
        info!(
            interval_secs = schedule.interval_seconds,
            profile_secs = schedule.profile_seconds,
            suites = respawned,
            "scrape suites respawned with new schedule"
        );
    }

    /// Stop scraping a target and wait for its suite to exit.
    ///
    /// Returns the stopped suite, or `None` if the target was not running.
    pub async fn stop_target(&self, identity: &ProfileTarget) -> Option<ScrapeSuite> {
        let slot = self.suites.write().await.remove(identity)?;
        slot.cancel.cancel();
        match slot.handle.await {
            Ok(suite) => {
                info!(profile = %identity, "scrape target stopped");
                Some(suite)
            }
            Err(e) => {
                warn!(profile = %identity, error = %e, "scrape suite task failed");
                None
            }
        }
    }

    /// Stop every suite, waiting a bounded time for them to drain.
    pub async fn stop_all(&self) {
        let slots: Vec<(ProfileTarget, SuiteSlot)> = self.suites.write().await.drain().collect();
        for (_, slot) in &slots {
            slot.cancel.cancel();
        }
        for (identity, slot) in slots {
            drain(&identity, slot.handle).await;
        }
        info!("all scrape suites stopped");
    }

    /// Cancel the root token and stop every suite. Later registrations are
    /// ignored.
    pub async fn shutdown(&self) {
        self.root.cancel();
        self.stop_all().await;
    }

    /// Identities of targets with a running suite, sorted.
    pub async fn active_targets(&self) -> Vec<ProfileTarget> {
        let mut targets: Vec<ProfileTarget> = self
            .suites
            .read()
            .await
            .iter()
            .filter(|(_, slot)| !slot.handle.is_finished())
            .map(|(identity, _)| identity.clone())
            .collect();
        targets.sort();
        targets
    }

    pub async fn is_scraping(&self, identity: &ProfileTarget) -> bool {
        self.suites
            .read()
            .await
            .get(identity)
            .is_some_and(|slot| !slot.handle.is_finished())
    }
}

async fn drain(identity: &ProfileTarget, handle: JoinHandle<ScrapeSuite>) {
    match tokio::time::timeout(DRAIN_TIMEOUT, handle).await {
        Ok(Ok(_)) => debug!(profile = %identity, "scrape suite drained"),
        Ok(Err(e)) => warn!(profile = %identity, error = %e, "scrape suite task failed"),
        Err(_) => warn!(profile = %identity, "scrape suite did not drain in time"),
    }
}
