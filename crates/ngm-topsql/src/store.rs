//! Top SQL store capability.

use crate::error::StoreResult;
use crate::types::{CpuTimeRecord, Metadata, ResourceUsageRecord};

/// Sink for Top SQL telemetry.
///
/// Implementations merge every ingested record into one series per key,
/// appending samples in arrival order. Callers may ingest from many tasks
/// at once.
pub trait TopSqlStore: Send + Sync {
    /// Record the type of an instance. The latest call wins.
    fn register_instance(&self, instance: &str, instance_type: &str) -> StoreResult<()>;

    /// Merge a CPU-time batch into the series keyed by
    /// `(instance, sql_digest, plan_digest)`.
    fn ingest_cpu_time(
        &self,
        instance: &str,
        instance_type: &str,
        record: &CpuTimeRecord,
    ) -> StoreResult<()>;

    /// Merge a resource-usage batch into the series keyed by
    /// `(instance, resource_group_tag)`.
    fn ingest_resource_usage(
        &self,
        instance: &str,
        instance_type: &str,
        record: &ResourceUsageRecord,
    ) -> StoreResult<()>;

    /// Store SQL or plan text for a digest. The latest call wins.
    fn upsert_metadata(&self, meta: Metadata) -> StoreResult<()>;

    fn close(&self);
}
