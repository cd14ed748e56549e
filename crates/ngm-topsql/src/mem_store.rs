//! In-memory Top SQL store.
//!
//! One mutex guards the whole state, so every ingest is atomic and readers
//! see a consistent view across keys.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::StoreResult;
use crate::poll::wait_until;
use crate::store::TopSqlStore;
use crate::types::{
    CpuTimeKey, CpuTimeRecord, Metadata, PlanMeta, ResourceUsageKey, ResourceUsageRecord, SqlMeta,
};

/// Aggregated telemetry held by a [`MemStore`].
#[derive(Debug, Default)]
pub struct MemStoreState {
    /// instance id → instance type
    instances: HashMap<String, String>,
    cpu_time: HashMap<CpuTimeKey, CpuTimeRecord>,
    resource_usage: HashMap<ResourceUsageKey, ResourceUsageRecord>,
    /// sql digest → meta
    sql_meta: HashMap<Vec<u8>, SqlMeta>,
    /// plan digest → meta
    plan_meta: HashMap<Vec<u8>, PlanMeta>,
}

impl MemStoreState {
    pub fn instance_type(&self, instance: &str) -> Option<&str> {
        self.instances.get(instance).map(String::as_str)
    }

    /// Registered `(instance, type)` pairs, sorted by instance.
    pub fn instances(&self) -> Vec<(&str, &str)> {
        let mut out: Vec<(&str, &str)> = self
            .instances
            .iter()
            .map(|(i, t)| (i.as_str(), t.as_str()))
            .collect();
        out.sort();
        out
    }

    pub fn cpu_time(
        &self,
        instance: &str,
        sql_digest: &[u8],
        plan_digest: &[u8],
    ) -> Option<&CpuTimeRecord> {
        self.cpu_time
            .get(&CpuTimeKey::new(instance, sql_digest, plan_digest))
    }

    /// All CPU-time series of one instance, ordered by digests.
    pub fn cpu_time_records(&self, instance: &str) -> Vec<&CpuTimeRecord> {
        let mut out: Vec<(&CpuTimeKey, &CpuTimeRecord)> = self
            .cpu_time
            .iter()
            .filter(|(k, _)| k.instance == instance)
            .collect();
        out.sort_by(|a, b| a.0.cmp(b.0));
        out.into_iter().map(|(_, r)| r).collect()
    }

    pub fn resource_usage(&self, instance: &str, tag: &[u8]) -> Option<&ResourceUsageRecord> {
        self.resource_usage.get(&ResourceUsageKey::new(instance, tag))
    }

    /// All resource-usage series of one instance, ordered by tag.
    pub fn resource_usage_records(&self, instance: &str) -> Vec<&ResourceUsageRecord> {
        let mut out: Vec<(&ResourceUsageKey, &ResourceUsageRecord)> = self
            .resource_usage
            .iter()
            .filter(|(k, _)| k.instance == instance)
            .collect();
        out.sort_by(|a, b| a.0.cmp(b.0));
        out.into_iter().map(|(_, r)| r).collect()
    }

    pub fn sql_meta(&self, sql_digest: &[u8]) -> Option<&SqlMeta> {
        self.sql_meta.get(sql_digest)
    }

    pub fn plan_meta(&self, plan_digest: &[u8]) -> Option<&PlanMeta> {
        self.plan_meta.get(plan_digest)
    }

    /// Total CPU-time samples across every series.
    pub fn cpu_sample_count(&self) -> usize {
        self.cpu_time.values().map(CpuTimeRecord::len).sum()
    }
}

/// Process-lifetime [`TopSqlStore`].
#[derive(Debug, Default)]
pub struct MemStore {
    state: Mutex<MemStoreState>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against a consistent snapshot of the state.
    pub fn read<R>(&self, f: impl FnOnce(&MemStoreState) -> R) -> R {
        f(&self.state.lock())
    }

    /// Wait until `pred` holds for the state, checking under the store lock
    /// with the backoff of [`wait_until`].
    pub async fn predict(
        &self,
        mut pred: impl FnMut(&MemStoreState) -> bool,
        initial_wait: Duration,
        max_wait: Duration,
    ) -> bool {
        wait_until(|| pred(&self.state.lock()), initial_wait, max_wait).await
    }
}

impl TopSqlStore for MemStore {
    fn register_instance(&self, instance: &str, instance_type: &str) -> StoreResult<()> {
        self.state
            .lock()
            .instances
            .insert(instance.to_string(), instance_type.to_string());
        debug!(%instance, %instance_type, "instance registered");
        Ok(())
    }

    fn ingest_cpu_time(
        &self,
        instance: &str,
        _instance_type: &str,
        record: &CpuTimeRecord,
    ) -> StoreResult<()> {
        if let Err(e) = record.check_aligned() {
            warn!(%instance, error = %e, "rejected cpu time record");
            return Err(e);
        }

        let key = CpuTimeKey::new(
            instance,
            record.sql_digest.clone(),
            record.plan_digest.clone(),
        );
        self.state
            .lock()
            .cpu_time
            .entry(key)
            .or_insert_with(|| {
                CpuTimeRecord::new(record.sql_digest.clone(), record.plan_digest.clone())
            })
            .extend_from(record);
        Ok(())
    }

    fn ingest_resource_usage(
        &self,
        instance: &str,
        _instance_type: &str,
        record: &ResourceUsageRecord,
    ) -> StoreResult<()> {
        if let Err(e) = record.check_aligned() {
            warn!(%instance, error = %e, "rejected resource usage record");
            return Err(e);
        }

        let key = ResourceUsageKey::new(instance, record.resource_group_tag.clone());
        self.state
            .lock()
            .resource_usage
            .entry(key)
            .or_insert_with(|| ResourceUsageRecord::new(record.resource_group_tag.clone()))
            .extend_from(record);
        Ok(())
    }

    fn upsert_metadata(&self, meta: Metadata) -> StoreResult<()> {
        let mut state = self.state.lock();
        match meta {
            Metadata::Sql(meta) => {
                state.sql_meta.insert(meta.sql_digest.clone(), meta);
            }
            Metadata::Plan(meta) => {
                state.plan_meta.insert(meta.plan_digest.clone(), meta);
            }
        }
        Ok(())
    }

    /// Nothing to release; the aggregates stay readable.
    fn close(&self) {}
}
