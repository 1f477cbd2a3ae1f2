//! In-memory remote store for exercising the sync path without a network

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::util::parse_timestamp;

use super::remote::RemoteStore;

/// A [`RemoteStore`] holding its tables in memory, with injectable failures.
#[derive(Default)]
pub(crate) struct FakeRemoteStore {
    tables: Mutex<HashMap<String, BTreeMap<String, Value>>>,
    fail_upserts: AtomicBool,
    fail_queries: AtomicBool,
    upsert_calls: AtomicUsize,
}

impl FakeRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a record in a table without counting it as an upsert
    pub fn seed(&self, table: &str, record: Value) {
        let id = record_id(&record);
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .insert(id, record);
    }

    /// Snapshot of a table's records, in id order
    pub fn records(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn set_fail_upserts(&self, fail: bool) {
        self.fail_upserts.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteStore for FakeRemoteStore {
    async fn upsert(&self, table: &str, record: Value) -> Result<()> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(Error::Remote("injected upsert failure".to_string()));
        }
        self.seed(table, record);
        Ok(())
    }

    async fn changed_since(
        &self,
        table: &str,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Value>> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(Error::Remote("injected query failure".to_string()));
        }

        let mut rows: Vec<Value> = self
            .tables
            .lock()
            .unwrap()
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default();

        if let Some(since) = since {
            rows.retain(|row| record_updated_at(row) >= since);
        }
        rows.sort_by_key(|row| std::cmp::Reverse(record_updated_at(row)));
        rows.truncate(limit);
        Ok(rows)
    }
}

fn record_id(record: &Value) -> String {
    record
        .get("id")
        .and_then(Value::as_str)
        .expect("fake remote records carry an id")
        .to_string()
}

fn record_updated_at(record: &Value) -> DateTime<Utc> {
    record
        .get("updated_at")
        .and_then(Value::as_str)
        .and_then(|raw| parse_timestamp(raw).ok())
        .expect("fake remote records carry an updated_at")
}
