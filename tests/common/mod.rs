//! In-memory fakes for the warehouse, staging store and record source.

#![allow(dead_code)]

use anyhow::Result;
use futures::stream::{self, StreamExt};
use load_core::{
    Field, FieldType, FieldValue, Fields, LoadObserver, LoadState, Record, RecordSource,
    RecordStream, StageFormat, StagedLocation, StagingStore, Warehouse,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// Warehouse that records every call and tracks table existence from the
/// DDL it executes.
#[derive(Default)]
pub struct FakeWarehouse {
    tables: Mutex<HashSet<String>>,
    statements: Mutex<Vec<String>>,
    calls: Mutex<Vec<String>>,
    fail_on: Option<String>,
    row_count: Option<u64>,
    fail_row_count: bool,
}

impl FakeWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, table: &str) -> Self {
        self.tables.lock().unwrap().insert(table.to_string());
        self
    }

    /// Fail any statement starting with `prefix`.
    pub fn failing_on(mut self, prefix: &str) -> Self {
        self.fail_on = Some(prefix.to_string());
        self
    }

    pub fn with_row_count(mut self, count: u64) -> Self {
        self.row_count = Some(count);
        self
    }

    pub fn failing_row_count(mut self) -> Self {
        self.fail_row_count = true;
        self
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.lock().unwrap().contains(table)
    }
}

/// First double-quoted identifier after `prefix`.
fn quoted_name_after<'a>(sql: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = sql.strip_prefix(prefix)?.trim_start();
    let rest = rest.strip_prefix('"')?;
    rest.split('"').next()
}

#[async_trait::async_trait]
impl Warehouse for FakeWarehouse {
    async fn table_exists(&self, table: &str) -> Result<bool> {
        self.calls.lock().unwrap().push(format!("exists {table}"));
        Ok(self.has_table(table))
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        self.calls.lock().unwrap().push(sql.to_string());
        self.statements.lock().unwrap().push(sql.to_string());

        if let Some(prefix) = &self.fail_on {
            if sql.starts_with(prefix.as_str()) {
                anyhow::bail!("simulated failure for {prefix}");
            }
        }

        let mut tables = self.tables.lock().unwrap();
        if let Some(name) = quoted_name_after(sql, "CREATE TABLE") {
            tables.insert(name.to_string());
        } else if let Some(name) = quoted_name_after(sql, "DROP TABLE IF EXISTS") {
            tables.remove(name);
        } else if let Some(name) = quoted_name_after(sql, "DROP TABLE") {
            tables.remove(name);
        }

        if sql.starts_with("INSERT INTO") && sql.contains(" VALUES ") {
            return Ok(sql.matches("), (").count() as u64 + 1);
        }
        Ok(0)
    }

    async fn row_count(&self, _table: &str) -> Result<Option<u64>> {
        if self.fail_row_count {
            anyhow::bail!("count unavailable");
        }
        Ok(self.row_count)
    }
}

/// Staging store keeping files in memory.
#[derive(Default)]
pub struct MemoryStage {
    files: Mutex<BTreeMap<String, Vec<Record>>>,
    fail_writes: AtomicU32,
    writes: AtomicU32,
    deleted_prefixes: Mutex<Vec<String>>,
}

impl MemoryStage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `n` writes after consuming one record.
    pub fn failing_writes(self, n: u32) -> Self {
        self.fail_writes.store(n, Ordering::SeqCst);
        self
    }

    pub fn writes(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().unwrap().len()
    }

    pub fn deleted_prefixes(&self) -> Vec<String> {
        self.deleted_prefixes.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl StagingStore for MemoryStage {
    async fn write(
        &self,
        path: &str,
        _format: &StageFormat,
        mut records: RecordStream<'_>,
    ) -> Result<StagedLocation> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let should_fail = self
            .fail_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        let file = format!("{path}part-00000.csv");
        let mut rows = Vec::new();
        while let Some(record) = records.next().await {
            rows.push(record?);
            self.files
                .lock()
                .unwrap()
                .insert(file.clone(), rows.clone());
            if should_fail {
                anyhow::bail!("simulated staging failure");
            }
        }
        let count = rows.len() as u64;
        self.files.lock().unwrap().insert(file.clone(), rows);

        Ok(StagedLocation {
            uri: path.to_string(),
            files: vec![file],
            rows: count,
        })
    }

    async fn delete(&self, location: &StagedLocation) -> Result<()> {
        let mut files = self.files.lock().unwrap();
        for file in &location.files {
            files.remove(file);
        }
        Ok(())
    }

    async fn delete_prefix(&self, path: &str) -> Result<()> {
        self.deleted_prefixes.lock().unwrap().push(path.to_string());
        self.files
            .lock()
            .unwrap()
            .retain(|file, _| !file.starts_with(path));
        Ok(())
    }
}

/// Source replaying a fixed list of records.
pub struct VecSource {
    fields: Fields,
    records: Vec<Record>,
    produced: AtomicU32,
    pending: bool,
}

impl VecSource {
    pub fn new(fields: Fields, records: Vec<Record>) -> Self {
        Self {
            fields,
            records,
            produced: AtomicU32::new(0),
            pending: false,
        }
    }

    /// A source whose stream never yields.
    pub fn pending(fields: Fields) -> Self {
        Self {
            pending: true,
            ..Self::new(fields, Vec::new())
        }
    }

    pub fn produced(&self) -> u32 {
        self.produced.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RecordSource for VecSource {
    fn fields(&self) -> Fields {
        self.fields.clone()
    }

    async fn produce_records(&self) -> Result<RecordStream<'_>> {
        self.produced.fetch_add(1, Ordering::SeqCst);
        if self.pending {
            return Ok(stream::pending().boxed());
        }
        Ok(stream::iter(self.records.clone().into_iter().map(Ok)).boxed())
    }
}

/// Observer collecting transitions and warnings.
#[derive(Default)]
pub struct RecordingObserver {
    states: Mutex<Vec<LoadState>>,
    warnings: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn states(&self) -> Vec<LoadState> {
        self.states.lock().unwrap().clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().unwrap().clone()
    }
}

impl LoadObserver for RecordingObserver {
    fn on_transition(&self, _table: &str, _from: Option<LoadState>, to: LoadState) {
        self.states.lock().unwrap().push(to);
    }

    fn on_warning(&self, _table: &str, message: &str) {
        self.warnings.lock().unwrap().push(message.to_string());
    }
}

pub fn user_fields() -> Fields {
    Fields::declared([
        Field::new("id", FieldType::Integer),
        Field::new("name", FieldType::VarChar { length: 64 }),
    ])
}

pub fn user_records() -> Vec<Record> {
    vec![
        Record::new(vec![FieldValue::Int(1), FieldValue::text("Ann")]),
        Record::new(vec![FieldValue::Int(2), FieldValue::text("Bob")]),
        Record::new(vec![FieldValue::Int(3), FieldValue::Null]),
    ]
}
