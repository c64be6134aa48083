//! Loader behaviour against in-memory warehouse and staging fakes.

mod common;

use common::{user_fields, user_records, FakeWarehouse, MemoryStage, RecordingObserver, VecSource};
use load_core::{CompileError, Credentials, LoadError, LoadState, SinkMode, TableDesc};
use redshift_load::{LoadConfig, Loader};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn users_desc() -> TableDesc {
    TableDesc::new("users")
        .with_column("id", Some("INTEGER"))
        .with_column("name", Some("VARCHAR(64)"))
}

fn config(mode: SinkMode) -> LoadConfig {
    LoadConfig::new(users_desc(), mode, "s3://bucket/stage")
}

fn source() -> VecSource {
    VecSource::new(user_fields(), user_records())
}

#[tokio::test]
async fn test_create_new_table() {
    let warehouse = FakeWarehouse::new().with_row_count(3);
    let stage = MemoryStage::new();
    let observer = RecordingObserver::default();

    let report = Loader::new(&warehouse, &stage)
        .with_observer(&observer)
        .run(&config(SinkMode::Create), &source())
        .await
        .unwrap();

    let statements = warehouse.statements();
    assert_eq!(statements.len(), 2);
    assert!(statements[0].starts_with(r#"CREATE TABLE "users" ("id" INTEGER"#));
    assert!(statements[1].starts_with(r#"COPY "users" ("id", "name") FROM 's3://bucket/stage/users/"#));
    assert!(statements[1].contains("IAM_ROLE default"));

    assert_eq!(
        observer.states(),
        vec![
            LoadState::Staging,
            LoadState::TableCheck,
            LoadState::Create,
            LoadState::Loading,
            LoadState::Verify,
            LoadState::Done,
        ]
    );
    assert_eq!(report.states, observer.states());
    assert_eq!(report.rows_staged, 3);
    assert_eq!(report.row_count, Some(3));
    assert_eq!(report.staging_attempts, 1);
    assert!(report.warnings.is_empty());
    // Staged files are removed after a successful load
    assert_eq!(stage.file_count(), 0);
}

#[tokio::test]
async fn test_create_existing_table_fails_without_ddl() {
    let warehouse = FakeWarehouse::new().with_table("users");
    let stage = MemoryStage::new();
    let observer = RecordingObserver::default();

    let err = Loader::new(&warehouse, &stage)
        .with_observer(&observer)
        .run(&config(SinkMode::Create), &source())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        LoadError::TableState {
            mode: SinkMode::Create,
            ..
        }
    ));
    assert!(warehouse.statements().is_empty());
    assert_eq!(
        observer.states(),
        vec![LoadState::Staging, LoadState::TableCheck, LoadState::Failed]
    );
    assert_eq!(stage.file_count(), 0);
}

#[tokio::test]
async fn test_replace_drops_before_create() {
    let warehouse = FakeWarehouse::new().with_table("users");
    let stage = MemoryStage::new();
    let observer = RecordingObserver::default();

    Loader::new(&warehouse, &stage)
        .with_observer(&observer)
        .run(&config(SinkMode::Replace), &source())
        .await
        .unwrap();

    let statements = warehouse.statements();
    assert_eq!(statements[0], r#"DROP TABLE "users""#);
    assert!(statements[1].starts_with(r#"CREATE TABLE "users""#));
    assert!(statements[2].starts_with("COPY"));
    assert!(observer.states().contains(&LoadState::DropRecreate));
}

#[tokio::test]
async fn test_replace_missing_table_creates() {
    let warehouse = FakeWarehouse::new();
    let stage = MemoryStage::new();

    Loader::new(&warehouse, &stage)
        .run(&config(SinkMode::Replace), &source())
        .await
        .unwrap();

    let statements = warehouse.statements();
    assert!(statements[0].starts_with(r#"CREATE TABLE "users""#));
    assert!(warehouse.has_table("users"));
}

#[tokio::test]
async fn test_append_requires_existing_table() {
    let warehouse = FakeWarehouse::new();
    let stage = MemoryStage::new();

    let err = Loader::new(&warehouse, &stage)
        .run(&config(SinkMode::Append), &source())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LoadError::TableState {
            mode: SinkMode::Append,
            ..
        }
    ));
    assert!(warehouse.statements().is_empty());
}

#[tokio::test]
async fn test_update_requires_existing_table() {
    let warehouse = FakeWarehouse::new();
    let stage = MemoryStage::new();
    let observer = RecordingObserver::default();

    let mut config = config(SinkMode::Update);
    config.desc = users_desc().with_distribution_key("id");

    let err = Loader::new(&warehouse, &stage)
        .with_observer(&observer)
        .run(&config, &source())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LoadError::TableState {
            mode: SinkMode::Update,
            ..
        }
    ));
    // Neither the intermediate table nor the target is created
    assert!(warehouse.statements().is_empty());
    assert!(!observer.states().contains(&LoadState::Loading));
}

#[tokio::test]
async fn test_append_existing_table_only_copies() {
    let warehouse = FakeWarehouse::new().with_table("users");
    let stage = MemoryStage::new();
    let observer = RecordingObserver::default();

    // Untyped columns are fine when the table is not created
    let desc = TableDesc::new("users")
        .with_column("id", None)
        .with_column("name", None);
    let config = LoadConfig::new(desc, SinkMode::Append, "s3://bucket/stage");

    Loader::new(&warehouse, &stage)
        .with_observer(&observer)
        .run(&config, &source())
        .await
        .unwrap();

    let statements = warehouse.statements();
    assert_eq!(statements.len(), 1);
    assert!(statements[0].starts_with(r#"COPY "users""#));
    assert!(observer.states().contains(&LoadState::Skip));
}

#[tokio::test]
async fn test_update_merges_through_intermediate_table() {
    let warehouse = FakeWarehouse::new().with_table("users");
    let stage = MemoryStage::new();

    let mut config = config(SinkMode::Update);
    config.desc = users_desc().with_distribution_key("id");

    Loader::new(&warehouse, &stage)
        .run(&config, &source())
        .await
        .unwrap();

    let statements = warehouse.statements();
    assert_eq!(statements.len(), 5);
    assert!(statements[0].starts_with(r#"CREATE TABLE "users_stage_"#));
    assert!(statements[0].ends_with(r#"(LIKE "users")"#));

    let intermediate = statements[0]
        .split('"')
        .nth(1)
        .unwrap()
        .to_string();
    assert_eq!(intermediate.len(), "users_stage_".len() + 8);

    assert!(statements[1].starts_with(&format!(r#"COPY "{intermediate}" ("id", "name")"#)));
    assert_eq!(
        statements[2],
        format!(
            r#"DELETE FROM "users" USING "{intermediate}" WHERE "users"."id" = "{intermediate}"."id""#
        )
    );
    assert_eq!(
        statements[3],
        format!(r#"INSERT INTO "users" ("id", "name") SELECT "id", "name" FROM "{intermediate}""#)
    );
    assert_eq!(statements[4], format!(r#"DROP TABLE IF EXISTS "{intermediate}""#));
    assert!(!warehouse.has_table(&intermediate));
}

#[tokio::test]
async fn test_update_drops_intermediate_table_on_failure() {
    let warehouse = FakeWarehouse::new().with_table("users").failing_on("COPY");
    let stage = MemoryStage::new();

    let mut config = config(SinkMode::Update);
    config.desc = users_desc().with_distribution_key("id");

    let err = Loader::new(&warehouse, &stage)
        .run(&config, &source())
        .await
        .unwrap_err();

    assert!(matches!(err, LoadError::Execution { statement: "COPY", .. }));
    let statements = warehouse.statements();
    assert!(statements.last().unwrap().starts_with("DROP TABLE IF EXISTS"));
}

#[tokio::test]
async fn test_intermediate_drop_failure_is_reported() {
    let warehouse = FakeWarehouse::new()
        .with_table("users")
        .failing_on("DROP TABLE IF EXISTS");
    let stage = MemoryStage::new();
    let observer = RecordingObserver::default();

    let mut config = config(SinkMode::Update);
    config.desc = users_desc().with_distribution_key("id");

    let report = Loader::new(&warehouse, &stage)
        .with_observer(&observer)
        .run(&config, &source())
        .await
        .unwrap();

    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].starts_with("Failed to drop intermediate table users_stage_"));
    assert_eq!(observer.warnings(), report.warnings);
    assert_eq!(report.states.last(), Some(&LoadState::Done));
}

#[tokio::test]
async fn test_compile_errors_precede_any_io() {
    let warehouse = FakeWarehouse::new();
    let stage = MemoryStage::new();
    let source = source();

    // CREATE needs a type for every column
    let desc = TableDesc::new("users").with_column("id", None);
    let err = Loader::new(&warehouse, &stage)
        .run(&LoadConfig::new(desc, SinkMode::Create, "/tmp"), &source)
        .await
        .unwrap_err();
    assert!(err.is_preflight());

    // UPDATE needs a distribution key
    let err = Loader::new(&warehouse, &stage)
        .run(&config(SinkMode::Update), &source)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LoadError::Compile(CompileError::MissingMergeKey(_))
    ));

    // Sort keys must name columns
    let mut config = config(SinkMode::Create);
    config.desc = users_desc().with_sort_keys(["missing"]);
    let err = Loader::new(&warehouse, &stage)
        .run(&config, &source)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LoadError::Compile(CompileError::UnknownKeyColumn { .. })
    ));

    assert!(warehouse.calls().is_empty());
    assert_eq!(stage.writes(), 0);
    assert_eq!(source.produced(), 0);
}

#[tokio::test]
async fn test_staging_retries_with_fresh_stream() {
    let warehouse = FakeWarehouse::new();
    let stage = MemoryStage::new().failing_writes(1);
    let source = source();

    let report = Loader::new(&warehouse, &stage)
        .run(&config(SinkMode::Create), &source)
        .await
        .unwrap();

    assert_eq!(report.staging_attempts, 2);
    assert_eq!(report.rows_staged, 3);
    assert_eq!(source.produced(), 2);
    assert_eq!(stage.writes(), 2);
    // The partial first attempt was cleared before retrying
    assert_eq!(stage.deleted_prefixes().len(), 1);
    assert!(stage.deleted_prefixes()[0].starts_with("s3://bucket/stage/users/"));
}

#[tokio::test]
async fn test_staging_failure_aborts_before_table_check() {
    let warehouse = FakeWarehouse::new();
    let stage = MemoryStage::new().failing_writes(10);
    let observer = RecordingObserver::default();

    let mut config = config(SinkMode::Create);
    config.staging_attempts = 2;

    let err = Loader::new(&warehouse, &stage)
        .with_observer(&observer)
        .run(&config, &source())
        .await
        .unwrap_err();

    assert!(matches!(err, LoadError::Staging { .. }));
    assert_eq!(stage.writes(), 2);
    assert!(warehouse.calls().is_empty());
    assert_eq!(observer.states(), vec![LoadState::Staging, LoadState::Failed]);
}

#[tokio::test]
async fn test_zero_staging_attempts_is_a_configuration_error() {
    let warehouse = FakeWarehouse::new();
    let stage = MemoryStage::new();

    let mut config = config(SinkMode::Create);
    config.staging_attempts = 0;

    let err = Loader::new(&warehouse, &stage)
        .run(&config, &source())
        .await
        .unwrap_err();
    assert!(matches!(err, LoadError::Configuration(_)));
}

#[tokio::test]
async fn test_cancel_before_start_issues_nothing() {
    let warehouse = FakeWarehouse::new();
    let stage = MemoryStage::new();
    let source = source();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = Loader::new(&warehouse, &stage)
        .with_cancellation(cancel)
        .run(&config(SinkMode::Create), &source)
        .await
        .unwrap_err();

    assert!(matches!(err, LoadError::Cancelled(_)));
    assert_eq!(source.produced(), 0);
    assert!(warehouse.calls().is_empty());
}

#[tokio::test]
async fn test_cancel_during_staging() {
    let warehouse = FakeWarehouse::new();
    let stage = MemoryStage::new();
    let source = VecSource::pending(user_fields());
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = Loader::new(&warehouse, &stage)
        .with_cancellation(cancel)
        .run(&config(SinkMode::Create), &source)
        .await
        .unwrap_err();

    assert!(matches!(err, LoadError::Cancelled("staging")));
    assert!(warehouse.calls().is_empty());
    assert_eq!(stage.deleted_prefixes().len(), 1);
}

#[tokio::test]
async fn test_keep_debug_data_on_failure() {
    let stage = MemoryStage::new();
    let warehouse = FakeWarehouse::new().failing_on("COPY");

    let mut config = config(SinkMode::Create);
    config.keep_debug_data = true;

    let err = Loader::new(&warehouse, &stage)
        .run(&config, &source())
        .await
        .unwrap_err();
    assert!(matches!(err, LoadError::Execution { statement: "COPY", .. }));
    assert_eq!(stage.file_count(), 1);

    // Without the flag the staged files are removed
    let stage = MemoryStage::new();
    let warehouse = FakeWarehouse::new().failing_on("COPY");
    config.keep_debug_data = false;

    Loader::new(&warehouse, &stage)
        .run(&config, &source())
        .await
        .unwrap_err();
    assert_eq!(stage.file_count(), 0);
}

#[tokio::test]
async fn test_keep_debug_data_ignored_on_success() {
    let stage = MemoryStage::new();
    let warehouse = FakeWarehouse::new();

    let mut config = config(SinkMode::Create);
    config.keep_debug_data = true;

    Loader::new(&warehouse, &stage)
        .run(&config, &source())
        .await
        .unwrap();
    assert_eq!(stage.file_count(), 0);
}

#[tokio::test]
async fn test_direct_insert_batches_rows() {
    let warehouse = FakeWarehouse::new();
    let stage = MemoryStage::new();
    let observer = RecordingObserver::default();

    let mut config = config(SinkMode::Create);
    config.use_direct_insert = true;
    config.insert_batch_size = 2;

    let report = Loader::new(&warehouse, &stage)
        .with_observer(&observer)
        .run(&config, &source())
        .await
        .unwrap();

    let statements = warehouse.statements();
    assert_eq!(statements.len(), 3);
    assert!(statements[0].starts_with("CREATE TABLE"));
    assert_eq!(
        statements[1],
        r#"INSERT INTO "users" ("id", "name") VALUES (1, 'Ann'), (2, 'Bob')"#
    );
    assert_eq!(
        statements[2],
        r#"INSERT INTO "users" ("id", "name") VALUES (3, NULL)"#
    );

    assert_eq!(report.rows_loaded, 3);
    assert!(report.direct_insert);
    assert_eq!(report.staged_location, None);
    assert_eq!(stage.writes(), 0);
    assert_eq!(observer.states()[0], LoadState::TableCheck);
}

#[tokio::test]
async fn test_verify_problems_are_warnings() {
    let warehouse = FakeWarehouse::new().failing_row_count();
    let stage = MemoryStage::new();
    let observer = RecordingObserver::default();

    let report = Loader::new(&warehouse, &stage)
        .with_observer(&observer)
        .run(&config(SinkMode::Create), &source())
        .await
        .unwrap();

    assert_eq!(report.row_count, None);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("count rows"));
    assert_eq!(observer.warnings(), report.warnings);
    assert_eq!(*report.states.last().unwrap(), LoadState::Done);
}

#[tokio::test]
async fn test_explicit_credentials_reach_copy() {
    let warehouse = FakeWarehouse::new();
    let stage = MemoryStage::new();

    let mut config = config(SinkMode::Create);
    config.credentials = Credentials::resolve(Some("AKIA"), Some("s3cr3t"), None, None);

    Loader::new(&warehouse, &stage)
        .run(&config, &source())
        .await
        .unwrap();

    let copy = &warehouse.statements()[1];
    assert!(copy.contains("aws_access_key_id=AKIA;aws_secret_access_key=s3cr3t"));
}

#[tokio::test]
async fn test_report_written_as_json() {
    let warehouse = FakeWarehouse::new();
    let stage = MemoryStage::new();

    let report = Loader::new(&warehouse, &stage)
        .run(&config(SinkMode::Create), &source())
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.json");
    report.write_to_file(&path).unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["table"], "users");
    assert_eq!(json["sink_mode"], "CREATE");
    assert_eq!(json["states"][0], "staging");
}
