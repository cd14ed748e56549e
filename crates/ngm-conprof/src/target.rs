//! Scrape targets and the built-in profile catalogue.

use std::collections::BTreeMap;

use ngm_core::{ContinuousProfilingConfig, ProfileTarget, ProfilingPathConfig, TargetConfig};
use url::Url;

use crate::error::ScrapeError;

/// A single HTTP endpoint serving one profile kind of one component.
///
/// Immutable once built. Scrapers cache a request derived from it, so a
/// changed URL or header set means building a new `Target` and a new suite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    identity: ProfileTarget,
    header: BTreeMap<String, String>,
    url: Url,
}

impl Target {
    /// Build a target for `kind` on the component reachable at `scrape_address`.
    ///
    /// Query parameters are encoded in key order so the rendered URL is
    /// stable for a given configuration.
    pub fn new(
        component: &str,
        address: &str,
        scrape_address: &str,
        kind: &str,
        scheme: &str,
        cfg: &ProfilingPathConfig,
    ) -> Result<Self, ScrapeError> {
        let mut query: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for (k, v) in &cfg.params {
            query.insert(k.as_str(), vec![v.clone()]);
        }
        if cfg.seconds > 0 {
            query
                .entry("seconds")
                .or_default()
                .push(cfg.seconds.to_string());
        }

        let mut url = Url::parse(&format!("{scheme}://{scrape_address}"))?;
        url.set_path(&cfg.path);
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, values) in &query {
                for v in values {
                    pairs.append_pair(k, v);
                }
            }
        }

        Ok(Self {
            identity: ProfileTarget::new(kind, component, address),
            header: cfg.header.clone(),
            url,
        })
    }

    /// Build a target from a configured component, merging its headers
    /// with the profile kind's headers (the component's win).
    pub fn from_config(
        component: &TargetConfig,
        kind: &str,
        path: &ProfilingPathConfig,
    ) -> Result<Self, ScrapeError> {
        let mut cfg = path.clone();
        cfg.header.extend(
            component
                .header
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        Self::new(
            &component.component,
            &component.address,
            component.scrape_address(),
            kind,
            &component.scheme,
            &cfg,
        )
    }

    pub fn identity(&self) -> &ProfileTarget {
        &self.identity
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn header(&self) -> &BTreeMap<String, String> {
        &self.header
    }

    /// The canonical request URL.
    pub fn url_string(&self) -> String {
        self.url.to_string()
    }
}

/// Profile kinds scraped from every component, keyed by kind.
pub fn default_profiling_paths(
    config: &ContinuousProfilingConfig,
) -> BTreeMap<&'static str, ProfilingPathConfig> {
    let mut paths = BTreeMap::new();
    paths.insert(
        "profile",
        ProfilingPathConfig {
            path: "/debug/pprof/profile".to_string(),
            seconds: config.profile_duration().as_secs(),
            ..Default::default()
        },
    );
    paths.insert(
        "heap",
        ProfilingPathConfig {
            path: "/debug/pprof/heap".to_string(),
            ..Default::default()
        },
    );
    paths.insert(
        "goroutine",
        ProfilingPathConfig {
            path: "/debug/pprof/goroutine".to_string(),
            params: BTreeMap::from([("debug".to_string(), "2".to_string())]),
            ..Default::default()
        },
    );
    paths.insert(
        "mutex",
        ProfilingPathConfig {
            path: "/debug/pprof/mutex".to_string(),
            ..Default::default()
        },
    );
    paths
}
