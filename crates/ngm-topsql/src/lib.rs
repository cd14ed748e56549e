//! ngm-topsql — aggregation of streaming Top SQL telemetry.
//!
//! Instances push CPU-time and resource-usage records in small batches;
//! the store merges every batch into one record per key so that a key's
//! samples can be read back as a single time series.
//!
//! # Architecture
//!
//! ```text
//! TopSqlStore (capability)
//!   ├── register_instance()      ← instance id → type, latest wins
//!   ├── ingest_cpu_time()        ← (instance, sql, plan) → appended series
//!   ├── ingest_resource_usage()  ← (instance, resource tag) → appended series
//!   └── upsert_metadata()        ← digest → SQL / plan text, latest wins
//!
//! MemStore — single-lock in-memory implementation
//!   ├── read()     → consistent multi-key view
//!   └── predict()  → wait_until() evaluated under the store lock
//! ```

pub mod error;
pub mod mem_store;
pub mod poll;
pub mod store;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use mem_store::{MemStore, MemStoreState};
pub use poll::wait_until;
pub use store::TopSqlStore;
pub use types::*;
