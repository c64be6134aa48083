//! Load orchestration.
//!
//! A load moves through `Staging -> TableCheck -> (Create | Skip |
//! DropRecreate) -> Loading -> Verify -> Done`, with `Failed` reachable from
//! any state. Every statement that does not depend on record contents is
//! compiled before the first I/O.

use anyhow::Context;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use load_core::compile::{
    compile_create_like, compile_create_table, compile_drop_table, compile_drop_table_if_exists,
    compile_insert, compile_into, compile_merge, validate,
};
use load_core::{
    CopyCommand, CopyOptionSet, Credentials, LoadError, LoadObserver, LoadState, Record,
    RecordSource, Result, SinkMode, StageFormat, StagedLocation, StagingStore, TableDesc,
    TracingObserver, Warehouse,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default number of staging attempts before a load fails.
pub const DEFAULT_STAGING_ATTEMPTS: u32 = 3;

/// Default rows per `INSERT` statement in direct insert mode.
pub const DEFAULT_INSERT_BATCH_SIZE: usize = 1000;

/// Everything one load needs, resolved from configuration.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    pub desc: TableDesc,
    pub copy_options: CopyOptionSet,
    pub credentials: Credentials,
    pub sink_mode: SinkMode,
    /// Base location runs are staged under.
    pub staging_base: String,
    pub stage_format: StageFormat,
    /// Keep staged files when the load fails.
    pub keep_debug_data: bool,
    /// Skip staging and load with `INSERT` statements.
    pub use_direct_insert: bool,
    pub staging_attempts: u32,
    pub insert_batch_size: usize,
}

impl LoadConfig {
    pub fn new(desc: TableDesc, sink_mode: SinkMode, staging_base: impl Into<String>) -> Self {
        Self {
            desc,
            copy_options: CopyOptionSet::new(),
            credentials: Credentials::RuntimeDetermined,
            sink_mode,
            staging_base: staging_base.into(),
            stage_format: StageFormat::default(),
            keep_debug_data: false,
            use_direct_insert: false,
            staging_attempts: DEFAULT_STAGING_ATTEMPTS,
            insert_batch_size: DEFAULT_INSERT_BATCH_SIZE,
        }
    }
}

/// Statements compiled before any I/O.
#[derive(Debug, Clone)]
pub struct LoadPlan {
    pub table: String,
    pub sink_mode: SinkMode,
    /// Run directory records are staged to; `None` in direct insert mode.
    pub run_path: Option<String>,
    pub create: Option<String>,
    pub drop: Option<String>,
    pub merge: Option<MergePlan>,
    /// COPY into the target, or into the intermediate table for UPDATE.
    pub copy: Option<CopyCommand>,
}

/// Statements for an UPDATE load.
#[derive(Debug, Clone)]
pub struct MergePlan {
    pub intermediate: String,
    pub create_intermediate: String,
    pub merge: Vec<String>,
    pub drop_intermediate: String,
}

impl LoadPlan {
    /// Compile every statement the load will issue.
    ///
    /// Fails with a configuration or compile error without touching the
    /// warehouse or the staging store.
    pub fn compile(config: &LoadConfig) -> Result<Self> {
        let table = validate(&config.desc)?.to_string();

        if config.staging_attempts == 0 {
            return Err(LoadError::Configuration(
                "staging attempts must be at least 1".to_string(),
            ));
        }

        let create = match config.sink_mode {
            SinkMode::Create | SinkMode::Replace => Some(compile_create_table(&config.desc)?),
            SinkMode::Append | SinkMode::Update => None,
        };
        let drop = match config.sink_mode {
            SinkMode::Replace => Some(compile_drop_table(&table)),
            _ => None,
        };

        let merge = match config.sink_mode {
            SinkMode::Update => {
                let intermediate = intermediate_table_name(&table);
                Some(MergePlan {
                    create_intermediate: compile_create_like(&intermediate, &table),
                    merge: compile_merge(&config.desc, &intermediate)?,
                    drop_intermediate: compile_drop_table_if_exists(&intermediate),
                    intermediate,
                })
            }
            _ => None,
        };

        let (run_path, copy) = if config.use_direct_insert {
            (None, None)
        } else {
            let run_path = redshift_load_stage::new_run_path(&config.staging_base, &table);
            let target = merge
                .as_ref()
                .map_or(table.as_str(), |m| m.intermediate.as_str());
            let copy = compile_into(
                target,
                &config.desc,
                &config.copy_options,
                &run_path,
                &config.credentials,
            )?;
            (Some(run_path), Some(copy))
        };

        Ok(Self {
            table,
            sink_mode: config.sink_mode,
            run_path,
            create,
            drop,
            merge,
            copy,
        })
    }
}

/// `<table>_stage_<8 hex chars>`, keeping any schema qualifier.
fn intermediate_table_name(table: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{table}_stage_{}", &suffix[..8])
}

/// Outcome of a completed load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadReport {
    pub table: String,
    pub sink_mode: SinkMode,
    pub direct_insert: bool,
    pub staged_location: Option<String>,
    pub staged_files: usize,
    pub rows_staged: u64,
    pub rows_loaded: u64,
    /// Row count reported by the warehouse after the load, if available.
    pub row_count: Option<u64>,
    pub staging_attempts: u32,
    pub states: Vec<LoadState>,
    pub warnings: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl LoadReport {
    pub fn duration_seconds(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    /// Write the report as pretty-printed JSON.
    pub fn write_to_file(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write load report to {}", path.display()))?;
        info!("Load report written to {}", path.display());
        Ok(())
    }
}

/// Tracks the current state and forwards transitions to the observer.
struct Progress<'a> {
    table: String,
    observer: &'a dyn LoadObserver,
    current: Option<LoadState>,
    states: Vec<LoadState>,
    warnings: Vec<String>,
}

impl<'a> Progress<'a> {
    fn new(table: &str, observer: &'a dyn LoadObserver) -> Self {
        Self {
            table: table.to_string(),
            observer,
            current: None,
            states: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn enter(&mut self, next: LoadState) {
        if let Some(current) = self.current {
            debug_assert!(
                current.can_transition_to(next),
                "invalid load transition {current} -> {next}"
            );
        }
        self.observer.on_transition(&self.table, self.current, next);
        self.current = Some(next);
        self.states.push(next);
    }

    fn warn(&mut self, message: String) {
        self.observer.on_warning(&self.table, &message);
        self.warnings.push(message);
    }
}

/// Runs loads against a warehouse and a staging store.
pub struct Loader<'a, W: ?Sized, S: ?Sized> {
    warehouse: &'a W,
    stage: &'a S,
    observer: &'a dyn LoadObserver,
    cancel: CancellationToken,
}

static TRACING_OBSERVER: TracingObserver = TracingObserver;

impl<'a, W, S> Loader<'a, W, S>
where
    W: Warehouse + ?Sized,
    S: StagingStore + ?Sized,
{
    pub fn new(warehouse: &'a W, stage: &'a S) -> Self {
        Self {
            warehouse,
            stage,
            observer: &TRACING_OBSERVER,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_observer(mut self, observer: &'a dyn LoadObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Cancelling the token before the first warehouse statement aborts the
    /// load with [`LoadError::Cancelled`].
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run one load of `source` into the configured table.
    pub async fn run(&self, config: &LoadConfig, source: &dyn RecordSource) -> Result<LoadReport> {
        let started_at = Utc::now();
        let plan = LoadPlan::compile(config)?;
        info!(
            "Loading into {} ({} mode{})",
            plan.table,
            plan.sink_mode,
            if config.use_direct_insert {
                ", direct insert"
            } else {
                ""
            }
        );

        let mut progress = Progress::new(&plan.table, self.observer);
        let mut staged: Option<(StagedLocation, u32)> = None;

        let result = self
            .execute_plan(config, &plan, source, &mut progress, &mut staged)
            .await;

        let keep_staged = result.is_err() && config.keep_debug_data;
        if let Some((location, _)) = &staged {
            if keep_staged {
                info!("Keeping staged files for debugging under {}", location.uri);
            } else if let Err(e) = self.stage.delete(location).await {
                progress.warn(format!(
                    "Failed to delete staged files under {}: {e:#}",
                    location.uri
                ));
            }
        }

        let (rows_loaded, row_count) = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                progress.enter(LoadState::Failed);
                return Err(e);
            }
        };
        progress.enter(LoadState::Done);

        let (location, attempts) = match staged {
            Some((location, attempts)) => (Some(location), attempts),
            None => (None, 0),
        };
        Ok(LoadReport {
            table: plan.table.clone(),
            sink_mode: plan.sink_mode,
            direct_insert: config.use_direct_insert,
            staged_location: location.as_ref().map(|l| l.uri.clone()),
            staged_files: location.as_ref().map_or(0, |l| l.files.len()),
            rows_staged: location.as_ref().map_or(0, |l| l.rows),
            rows_loaded,
            row_count,
            staging_attempts: attempts,
            states: progress.states,
            warnings: progress.warnings,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Returns rows loaded and the verified row count.
    async fn execute_plan(
        &self,
        config: &LoadConfig,
        plan: &LoadPlan,
        source: &dyn RecordSource,
        progress: &mut Progress<'_>,
        staged: &mut Option<(StagedLocation, u32)>,
    ) -> Result<(u64, Option<u64>)> {
        if let Some(run_path) = &plan.run_path {
            progress.enter(LoadState::Staging);
            *staged = Some(self.stage_records(config, run_path, source, progress).await?);
        }

        if self.cancel.is_cancelled() {
            return Err(LoadError::Cancelled("staging"));
        }

        progress.enter(LoadState::TableCheck);
        self.reconcile_table(plan, progress).await?;

        progress.enter(LoadState::Loading);
        let rows_loaded = self.load(config, plan, source, progress).await?;

        progress.enter(LoadState::Verify);
        match self.warehouse.table_exists(&plan.table).await {
            Ok(true) => {}
            Ok(false) => progress.warn(format!("Table {} not found after load", plan.table)),
            Err(e) => progress.warn(format!("Could not verify table {}: {e:#}", plan.table)),
        }
        let row_count = match self.warehouse.row_count(&plan.table).await {
            Ok(count) => count,
            Err(e) => {
                progress.warn(format!("Could not count rows of {}: {e:#}", plan.table));
                None
            }
        };

        Ok((rows_loaded, row_count))
    }

    /// Stage records, retrying from scratch with a fresh stream on failure.
    async fn stage_records(
        &self,
        config: &LoadConfig,
        run_path: &str,
        source: &dyn RecordSource,
        progress: &mut Progress<'_>,
    ) -> Result<(StagedLocation, u32)> {
        let mut last_error = None;

        for attempt in 1..=config.staging_attempts {
            if self.cancel.is_cancelled() {
                self.discard_stage(run_path, progress).await;
                return Err(LoadError::Cancelled("staging"));
            }

            let attempt_result = async {
                let records = source.produce_records().await?;
                self.stage.write(run_path, &config.stage_format, records).await
            };

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                result = attempt_result => Some(result),
            };

            match outcome {
                None => {
                    self.discard_stage(run_path, progress).await;
                    return Err(LoadError::Cancelled("staging"));
                }
                Some(Ok(location)) => {
                    info!(
                        "Staged {} rows in {} files to {} (attempt {})",
                        location.rows,
                        location.files.len(),
                        location.uri,
                        attempt
                    );
                    return Ok((location, attempt));
                }
                Some(Err(e)) => {
                    warn!(
                        "Staging attempt {}/{} to {} failed: {:#}",
                        attempt, config.staging_attempts, run_path, e
                    );
                    self.discard_stage(run_path, progress).await;
                    last_error = Some(e);
                }
            }
        }

        let source = last_error.unwrap_or_else(|| anyhow::anyhow!("no staging attempt was made"));
        Err(LoadError::staging(run_path, source))
    }

    async fn discard_stage(&self, run_path: &str, progress: &mut Progress<'_>) {
        if let Err(e) = self.stage.delete_prefix(run_path).await {
            progress.warn(format!(
                "Failed to remove partial stage {run_path}: {e:#}"
            ));
        }
    }

    /// Check the target table against the sink mode and create or drop it.
    async fn reconcile_table(&self, plan: &LoadPlan, progress: &mut Progress<'_>) -> Result<()> {
        let exists = self
            .warehouse
            .table_exists(&plan.table)
            .await
            .map_err(|e| LoadError::execution("table check", e))?;
        debug!("Table {} exists: {}", plan.table, exists);

        let table_state = |reason: &str| LoadError::TableState {
            table: plan.table.clone(),
            mode: plan.sink_mode,
            reason: reason.to_string(),
        };

        if plan.sink_mode.requires_existing_table() {
            if !exists {
                return Err(table_state("table does not exist"));
            }
            progress.enter(LoadState::Skip);
            return Ok(());
        }

        match (plan.sink_mode, exists) {
            (SinkMode::Create, true) => Err(table_state("table already exists")),
            (_, true) => {
                progress.enter(LoadState::DropRecreate);
                if let Some(drop) = &plan.drop {
                    self.execute("DROP TABLE", drop).await?;
                }
                self.create(plan).await
            }
            (_, false) => {
                progress.enter(LoadState::Create);
                self.create(plan).await
            }
        }
    }

    async fn create(&self, plan: &LoadPlan) -> Result<()> {
        match &plan.create {
            Some(create) => self.execute("CREATE TABLE", create).await.map(|_| ()),
            None => Err(LoadError::Configuration(format!(
                "no CREATE TABLE statement compiled for {}",
                plan.table
            ))),
        }
    }

    /// Move rows into the target: COPY or direct inserts, through the
    /// intermediate table for UPDATE.
    async fn load(
        &self,
        config: &LoadConfig,
        plan: &LoadPlan,
        source: &dyn RecordSource,
        progress: &mut Progress<'_>,
    ) -> Result<u64> {
        let Some(merge) = &plan.merge else {
            return self.load_into(config, plan, source, &plan.table).await;
        };

        self.execute("CREATE TABLE", &merge.create_intermediate).await?;
        let result = async {
            let loaded = self
                .load_into(config, plan, source, &merge.intermediate)
                .await?;
            for statement in &merge.merge {
                self.execute("MERGE", statement).await?;
            }
            Ok(loaded)
        }
        .await;

        if let Err(e) = self.warehouse.execute(&merge.drop_intermediate).await {
            progress.warn(format!(
                "Failed to drop intermediate table {}: {e:#}",
                merge.intermediate
            ));
        }
        result
    }

    async fn load_into(
        &self,
        config: &LoadConfig,
        plan: &LoadPlan,
        source: &dyn RecordSource,
        target: &str,
    ) -> Result<u64> {
        match &plan.copy {
            Some(copy) => {
                info!("Executing {}", copy);
                self.execute("COPY", copy.as_sql()).await
            }
            None => self.insert_records(config, source, target).await,
        }
    }

    /// Stream records into batched `INSERT` statements.
    async fn insert_records(
        &self,
        config: &LoadConfig,
        source: &dyn RecordSource,
        target: &str,
    ) -> Result<u64> {
        let batch_size = config.insert_batch_size.max(1);
        let mut records = source
            .produce_records()
            .await
            .map_err(|e| LoadError::execution("INSERT", e))?;

        let mut batch: Vec<Record> = Vec::with_capacity(batch_size);
        let mut inserted = 0u64;
        while let Some(record) = records.next().await {
            batch.push(record.map_err(|e| LoadError::execution("INSERT", e))?);
            if batch.len() >= batch_size {
                inserted += self.insert_batch(config, target, &batch).await?;
                batch.clear();
            }
        }
        if !batch.is_empty() {
            inserted += self.insert_batch(config, target, &batch).await?;
        }

        info!("Inserted {} rows into {}", inserted, target);
        Ok(inserted)
    }

    async fn insert_batch(&self, config: &LoadConfig, target: &str, batch: &[Record]) -> Result<u64> {
        let Some(sql) = compile_insert(&config.desc, target, batch)? else {
            return Ok(0);
        };
        let inserted = self.execute("INSERT", &sql).await?;
        debug!("Inserted batch of {} rows into {}", batch.len(), target);
        Ok(inserted)
    }

    async fn execute(&self, statement: &'static str, sql: &str) -> Result<u64> {
        debug!("Executing {statement}");
        self.warehouse
            .execute(sql)
            .await
            .map_err(|e| LoadError::execution(statement, e))
    }
}
