//! Test doubles for the lookup flow.
//!
//! Shared with `exam_lookup_lambda` through the `test-helpers` feature so the
//! router tests can drive a real [`LookupService`](crate::lookup::LookupService)
//! without a database.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::contract::{LookupKey, LookupValue, Record, Table};
use crate::lookup::{RecordStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreCall {
    Count(Table),
    Fetch(Table),
}

/// Builds a record from `(column, value)` pairs.
pub fn record(columns: &[(&str, Value)]) -> Record {
    columns
        .iter()
        .map(|(name, value)| ((*name).to_string(), value.clone()))
        .collect()
}

/// Equality between a lookup value and a stored column, loosely following the
/// coercions MySQL applies when comparing text and numbers.
pub fn value_matches(expected: &LookupValue, column: &Value) -> bool {
    match (expected, column) {
        (LookupValue::Text(expected), Value::String(actual)) => expected == actual,
        (LookupValue::Text(expected), Value::Number(actual)) => expected
            .parse::<f64>()
            .ok()
            .zip(actual.as_f64())
            .is_some_and(|(left, right)| left == right),
        (LookupValue::Integer(expected), Value::Number(actual)) => {
            actual.as_i64() == Some(*expected)
        }
        (LookupValue::Integer(expected), Value::String(actual)) => {
            actual.parse::<i64>().ok() == Some(*expected)
        }
        (LookupValue::Float(expected), Value::Number(actual)) => {
            actual.as_f64() == Some(*expected)
        }
        (LookupValue::Float(expected), Value::String(actual)) => {
            actual.parse::<f64>().ok() == Some(*expected)
        }
        _ => false,
    }
}

/// Rows held in memory per table. Records every call so tests can assert
/// which queries ran, and can be told to fail a given call.
#[derive(Default)]
pub struct InMemoryRecordStore {
    rows: HashMap<Table, Vec<Record>>,
    failing_call: Option<StoreCall>,
    calls: Mutex<Vec<StoreCall>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_row(mut self, table: Table, row: Record) -> Self {
        self.rows.entry(table).or_default().push(row);
        self
    }

    pub fn failing_on(mut self, call: StoreCall) -> Self {
        self.failing_call = Some(call);
        self
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().expect("poisoned mutex").clone()
    }

    fn record_call(&self, call: StoreCall) -> Result<(), StoreError> {
        self.calls.lock().expect("poisoned mutex").push(call);
        if self.failing_call == Some(call) {
            return Err(StoreError::Query("injected store failure".into()));
        }
        Ok(())
    }

    fn matching(&self, table: Table, key: &LookupKey) -> Vec<Record> {
        self.rows
            .get(&table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| {
                        row.get(key.field.column())
                            .is_some_and(|column| value_matches(&key.value, column))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn count_matching(&self, table: Table, key: &LookupKey) -> Result<u64, StoreError> {
        self.record_call(StoreCall::Count(table))?;
        Ok(self.matching(table, key).len() as u64)
    }

    async fn fetch_matching(
        &self,
        table: Table,
        key: &LookupKey,
    ) -> Result<Vec<Record>, StoreError> {
        self.record_call(StoreCall::Fetch(table))?;
        Ok(self.matching(table, key))
    }
}
