//! Top SQL record model.
//!
//! Digests are opaque byte strings; two digests are the same key exactly
//! when their bytes are equal.

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// CPU time consumed by one (SQL, plan) pair on one instance.
///
/// `timestamps_sec[i]` and `cpu_time_ms[i]` describe the same sample.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuTimeRecord {
    pub sql_digest: Vec<u8>,
    pub plan_digest: Vec<u8>,
    pub timestamps_sec: Vec<u64>,
    pub cpu_time_ms: Vec<u32>,
}

impl CpuTimeRecord {
    /// An empty series for the given digests.
    pub fn new(sql_digest: impl Into<Vec<u8>>, plan_digest: impl Into<Vec<u8>>) -> Self {
        Self {
            sql_digest: sql_digest.into(),
            plan_digest: plan_digest.into(),
            ..Default::default()
        }
    }

    /// Add one sample at the end of the series.
    pub fn push(&mut self, ts: u64, cpu_time_ms: u32) {
        self.timestamps_sec.push(ts);
        self.cpu_time_ms.push(cpu_time_ms);
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.timestamps_sec.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps_sec.is_empty()
    }

    pub(crate) fn check_aligned(&self) -> StoreResult<()> {
        let lengths = vec![self.timestamps_sec.len(), self.cpu_time_ms.len()];
        aligned("cpu time", lengths)
    }

    /// Append every sample of `other`, in order.
    pub(crate) fn extend_from(&mut self, other: &CpuTimeRecord) {
        self.timestamps_sec.extend_from_slice(&other.timestamps_sec);
        self.cpu_time_ms.extend_from_slice(&other.cpu_time_ms);
    }
}

/// Resource usage attributed to one resource group tag on one instance.
///
/// The four series are co-indexed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsageRecord {
    pub resource_group_tag: Vec<u8>,
    pub timestamps_sec: Vec<u64>,
    pub cpu_time_ms: Vec<u32>,
    pub read_keys: Vec<u32>,
    pub write_keys: Vec<u32>,
}

impl ResourceUsageRecord {
    pub fn new(resource_group_tag: impl Into<Vec<u8>>) -> Self {
        Self {
            resource_group_tag: resource_group_tag.into(),
            ..Default::default()
        }
    }

    pub fn push(&mut self, ts: u64, cpu_time_ms: u32, read_keys: u32, write_keys: u32) {
        self.timestamps_sec.push(ts);
        self.cpu_time_ms.push(cpu_time_ms);
        self.read_keys.push(read_keys);
        self.write_keys.push(write_keys);
    }

    pub fn len(&self) -> usize {
        self.timestamps_sec.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps_sec.is_empty()
    }

    pub(crate) fn check_aligned(&self) -> StoreResult<()> {
        let lengths = vec![
            self.timestamps_sec.len(),
            self.cpu_time_ms.len(),
            self.read_keys.len(),
            self.write_keys.len(),
        ];
        aligned("resource usage", lengths)
    }

    pub(crate) fn extend_from(&mut self, other: &ResourceUsageRecord) {
        self.timestamps_sec.extend_from_slice(&other.timestamps_sec);
        self.cpu_time_ms.extend_from_slice(&other.cpu_time_ms);
        self.read_keys.extend_from_slice(&other.read_keys);
        self.write_keys.extend_from_slice(&other.write_keys);
    }
}

fn aligned(kind: &'static str, lengths: Vec<usize>) -> StoreResult<()> {
    if lengths.windows(2).all(|w| w[0] == w[1]) {
        Ok(())
    } else {
        Err(StoreError::MisalignedRecord { kind, lengths })
    }
}

/// Normalized text of a SQL statement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlMeta {
    pub sql_digest: Vec<u8>,
    pub normalized_sql: String,
    pub is_internal_sql: bool,
}

/// Normalized text of an execution plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanMeta {
    pub plan_digest: Vec<u8>,
    pub normalized_plan: String,
    pub encoded_normalized_plan: String,
}

/// Digest metadata accepted by [`TopSqlStore::upsert_metadata`](crate::TopSqlStore::upsert_metadata).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Metadata {
    Sql(SqlMeta),
    Plan(PlanMeta),
}

/// Key of an aggregated CPU-time series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CpuTimeKey {
    pub instance: String,
    pub sql_digest: Vec<u8>,
    pub plan_digest: Vec<u8>,
}

impl CpuTimeKey {
    pub fn new(
        instance: impl Into<String>,
        sql_digest: impl Into<Vec<u8>>,
        plan_digest: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            instance: instance.into(),
            sql_digest: sql_digest.into(),
            plan_digest: plan_digest.into(),
        }
    }
}

/// Key of an aggregated resource-usage series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceUsageKey {
    pub instance: String,
    pub resource_group_tag: Vec<u8>,
}

impl ResourceUsageKey {
    pub fn new(instance: impl Into<String>, resource_group_tag: impl Into<Vec<u8>>) -> Self {
        Self {
            instance: instance.into(),
            resource_group_tag: resource_group_tag.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_record_alignment() {
        let mut rec = CpuTimeRecord::new(b"sql".to_vec(), b"plan".to_vec());
        rec.push(1, 10);
        rec.push(2, 20);
        assert!(rec.check_aligned().is_ok());
        assert_eq!(rec.len(), 2);

        rec.cpu_time_ms.pop();
        match rec.check_aligned() {
            Err(StoreError::MisalignedRecord { kind, lengths }) => {
                assert_eq!(kind, "cpu time");
                assert_eq!(lengths, vec![2, 1]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn resource_usage_alignment() {
        let mut rec = ResourceUsageRecord::new(b"tag".to_vec());
        rec.push(1, 10, 100, 1000);
        assert!(rec.check_aligned().is_ok());

        rec.write_keys.push(5);
        assert!(matches!(
            rec.check_aligned(),
            Err(StoreError::MisalignedRecord { .. })
        ));
    }

    #[test]
    fn empty_record_is_aligned() {
        assert!(CpuTimeRecord::default().check_aligned().is_ok());
        assert!(ResourceUsageRecord::default().check_aligned().is_ok());
        assert!(CpuTimeRecord::default().is_empty());
    }

    #[test]
    fn extend_appends_in_order() {
        let mut acc = CpuTimeRecord::new(b"s".to_vec(), b"p".to_vec());
        let mut batch = CpuTimeRecord::new(b"s".to_vec(), b"p".to_vec());
        batch.push(5, 1);
        batch.push(3, 2);
        acc.push(9, 0);
        acc.extend_from(&batch);
        assert_eq!(acc.timestamps_sec, vec![9, 5, 3]);
        assert_eq!(acc.cpu_time_ms, vec![0, 1, 2]);
    }

    #[test]
    fn metadata_serializes_with_kind_tag() {
        let meta = Metadata::Sql(SqlMeta {
            sql_digest: vec![1, 2],
            normalized_sql: "select ?".to_string(),
            is_internal_sql: false,
        });
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["kind"], "sql");
        assert_eq!(json["normalized_sql"], "select ?");
    }
}
