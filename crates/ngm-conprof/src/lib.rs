//! ngm-conprof — continuous profiling scrapes for ngm.
//!
//! Periodically pulls pprof-style profiles from every registered component
//! and hands the payloads to a [`ProfileStore`]. Each target gets its own
//! background task; a failed cycle is logged and skipped, never retried
//! before the next tick.
//!
//! # Architecture
//!
//! ```text
//! ScrapeManager (root CancellationToken)
//!   └── Per-target ScrapeSuite task (child token)
//!       ├── TickerChan → nominal tick instant
//!       ├── Scraper::scrape() under a per-cycle child token + timeout
//!       └── ProfileStore::add_profile(target, ts, payload)
//! ```
//!
//! Stopping a suite cancels its token, which aborts an in-flight fetch.
//! Profile storage has its own lifetime and is closed by its owner.

pub mod error;
pub mod manager;
pub mod scraper;
pub mod store;
pub mod suite;
pub mod target;
pub mod ticker;

pub use error::{ProfileStoreError, ScrapeError};
pub use manager::ScrapeManager;
pub use scraper::{HttpClient, Scraper, http_client};
pub use store::{MemProfileStore, ProfileStore, StoredProfile};
pub use suite::{ScrapeSuite, SuiteState};
pub use target::{Target, default_profiling_paths};
pub use ticker::TickerChan;
