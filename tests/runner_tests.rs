/// Runner tests
///
/// End-to-end runs against the in-memory document store.
/// Run with: cargo test --test runner_tests
mod common;

use async_trait::async_trait;
use bson::{Document, doc};
use common::{Harness, SHARED_URI, SOURCE_DB, TARGET_DB};
use docmigrate::engine::{BatchCursorProcessor, DocumentVisitor};
use docmigrate::storage::{InMemoryConnector, InMemoryStore};
use docmigrate::{
    ExecutionContext, MigrateError, Migration, MigrationConfig, MigrationRunner, RunCounters,
    RunState,
};
use std::sync::Arc;

fn auth_users(count: i32) -> Vec<Document> {
    (0..count)
        .map(|n| doc! { "_id": n, "email": format!("user{}@example.com", n), "role": "member" })
        .collect()
}

#[tokio::test]
async fn test_auth_copy_end_to_end() {
    let harness = Harness::new();
    harness.seed_source("auth", auth_users(1200));

    let report = harness.run("0001-auth", harness.config()).await.unwrap();

    assert_eq!(report.migration_id, "0001-auth");
    assert_eq!(report.counters.processed(), 1200);
    assert_eq!(report.counters.upserts("auth"), 1200);
    assert!(report.counters.to_string().starts_with("Total processed: 1200"));
    assert_eq!(harness.target("auth").len(), 1200);
    assert_eq!(
        report.states,
        vec![
            RunState::Idle,
            RunState::ConnectionsOpening,
            RunState::Running,
            RunState::ConnectionsClosing,
            RunState::Completed,
        ]
    );
}

struct Noop;

#[async_trait]
impl DocumentVisitor for Noop {
    async fn visit(&mut self, _ctx: &ExecutionContext, _document: Document) -> docmigrate::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_progress_marks_follow_batch_size() {
    let harness = Harness::new();
    harness.seed_source("auth", auth_users(1200));

    let ctx = ExecutionContext::new(
        harness.store.database_handle(SOURCE_DB),
        harness.store.database_handle(TARGET_DB),
        Arc::new(harness.config().batch_size(500)),
        tracing::Span::none(),
    );
    let summary = BatchCursorProcessor::new("auth")
        .run(&ctx, &mut Noop)
        .await
        .unwrap();

    assert_eq!(summary.processed, 1200);
    assert_eq!(summary.progress_marks, vec![500, 1000, 1200]);
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let harness = Harness::new();
    harness.seed_source("auth", auth_users(25));

    let first = harness.run("0001-auth", harness.config()).await.unwrap();
    let after_first = harness.target("auth");
    let second = harness.run("0001-auth", harness.config()).await.unwrap();

    assert_eq!(first.counters, second.counters);
    assert_eq!(harness.target("auth"), after_first);
}

#[tokio::test]
async fn test_dry_run_writes_nothing_and_counts_the_same() {
    let dry = Harness::new();
    dry.seed_source("auth", auth_users(30));
    let live = Harness::new();
    live.seed_source("auth", auth_users(30));

    let dry_report = dry.run("0001-auth", dry.config().dry_run(true)).await.unwrap();
    let live_report = live.run("0001-auth", live.config()).await.unwrap();

    assert!(dry_report.dry_run);
    assert!(dry.target("auth").is_empty());
    assert_eq!(dry_report.counters, live_report.counters);
}

#[tokio::test]
async fn test_shared_connection_closed_once() {
    let harness = Harness::new();
    harness.seed_source("unit_usage", vec![doc! { "_id": 1, "collectionRef": "p-1", "units": 3 }]);

    let report = harness.run("0002-unit_usage", harness.config()).await.unwrap();

    assert_eq!(harness.connector.connect_count(), 1);
    assert_eq!(harness.store.shutdown_count(), 1);
    assert_eq!(report.counters.tally("removed_collectionRef"), 1);
    assert_eq!(harness.target("unit_usage"), vec![doc! { "_id": 1, "units": 3 }]);
}

struct Exploding;

#[async_trait]
impl Migration for Exploding {
    fn id(&self) -> &'static str {
        "0099-exploding"
    }

    fn description(&self) -> &'static str {
        "Always fails."
    }

    async fn up(&self, _ctx: &ExecutionContext) -> docmigrate::Result<RunCounters> {
        Err(MigrateError::transform("things", "42", "cannot be transformed"))
    }
}

#[tokio::test]
async fn test_failure_still_closes_both_connections() {
    let source = InMemoryStore::new();
    let target = InMemoryStore::new();
    let connector = InMemoryConnector::new()
        .with_store("mem://source", source.clone())
        .with_store("mem://target", target.clone());
    let config = MigrationConfig::new()
        .source_uri("mem://source")
        .target_uri("mem://target")
        .source_db(SOURCE_DB)
        .target_db(TARGET_DB);

    let mut runner = MigrationRunner::new(Arc::new(connector.clone()));
    let err = runner.run(Arc::new(Exploding), config).await.unwrap_err();

    assert!(matches!(err, MigrateError::Transform { .. }));
    assert_eq!(connector.connect_count(), 2);
    assert_eq!(source.shutdown_count(), 1);
    assert_eq!(target.shutdown_count(), 1);
    assert_eq!(runner.state(), RunState::Failed);
    assert!(runner.history().contains(&RunState::ConnectionsClosing));
}

#[tokio::test]
async fn test_invalid_config_never_connects() {
    let harness = Harness::new();
    let config = MigrationConfig::new().source_uri(SHARED_URI).batch_size(0);

    let err = harness.run("0001-auth", config).await.unwrap_err();

    match err {
        MigrateError::Configuration(message) => {
            assert!(message.contains("target_uri"));
            assert!(message.contains("source_db"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(harness.connector.connect_count(), 0);
}

#[tokio::test]
async fn test_unknown_migration_lists_available() {
    let harness = Harness::new();
    let err = harness.run("0042-missing", harness.config()).await.unwrap_err();
    match err {
        MigrateError::MigrationNotFound { name, available } => {
            assert_eq!(name, "0042-missing");
            assert!(available.contains("0001-auth"));
        }
        other => panic!("unexpected error: {other}"),
    }
}
