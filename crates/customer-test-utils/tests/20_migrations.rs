//! Migration ordering and failure behavior.
//!
//! Run with `cargo test -p customer-test-utils --features containers`.

#![cfg(feature = "containers")]

use customer_test_utils::{
    init_test_tracing, DetachedInstance, HarnessError, HarnessSettings, MigrationFailurePolicy,
    MigrationSet, SubstitutionRegistry, TestEnvironment,
};
use sqlx::postgres::PgPoolOptions;
use std::process::Command;

const BROKEN_MIGRATIONS: &str = concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/tests/fixtures/broken_migrations"
);

fn settings() -> HarnessSettings {
    init_test_tracing();
    HarnessSettings::from_env().expect("harness settings should parse")
}

async fn recorded_versions(kept: &DetachedInstance) -> Result<Vec<i64>, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect_with(kept.connection.connect_options())
        .await?;
    let versions = sqlx::query_scalar("SELECT version FROM _sqlx_migrations ORDER BY version")
        .fetch_all(&pool)
        .await;
    pool.close().await;
    versions
}

#[tokio::test]
async fn test_migrations_apply_in_order_exactly_once() -> anyhow::Result<()> {
    let mut env = TestEnvironment::provision(settings()).await?;

    let report = env.migrate().await?.clone();
    assert_eq!(report.applied, vec![1, 2, 3]);
    assert!(report.already_applied.is_empty());

    // Second run has nothing to do
    let report = env.migrate().await?.clone();
    assert!(report.is_noop());
    assert_eq!(report.already_applied, vec![1, 2, 3]);

    let raw = env.raw_client().await?;
    let versions: Vec<i64> = sqlx::query_scalar(
        "SELECT version FROM _sqlx_migrations ORDER BY installed_on, version",
    )
    .fetch_all(&raw)
    .await?;
    assert_eq!(versions, vec![1, 2, 3]);

    let direct = env.direct_access().await?;
    assert_eq!(direct.count_rows("_sqlx_migrations").await?, 3);
    assert_eq!(direct.count_rows("customer").await?, 0);

    raw.close().await;
    direct.close().await;
    env.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_failed_migration_keeps_earlier_versions() -> anyhow::Result<()> {
    let migrations = MigrationSet::from_dir(BROKEN_MIGRATIONS).await?;
    assert_eq!(migrations.versions(), vec![1, 2, 3]);

    let mut env =
        TestEnvironment::provision_with(settings(), migrations, SubstitutionRegistry::new())
            .await?;

    let err = env.migrate().await.unwrap_err();
    assert!(
        matches!(err, HarnessError::Migration { version: Some(2), .. }),
        "got {:?}",
        err
    );

    // Version 1 stays applied for inspection; 3 never ran
    let raw = env.raw_client().await?;
    let versions: Vec<i64> =
        sqlx::query_scalar("SELECT version FROM _sqlx_migrations ORDER BY version")
            .fetch_all(&raw)
            .await?;
    assert_eq!(versions, vec![1]);

    let widget_exists: bool = sqlx::query_scalar("SELECT to_regclass('widget') IS NOT NULL")
        .fetch_one(&raw)
        .await?;
    assert!(widget_exists);

    let weight_columns: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM information_schema.columns WHERE table_name = 'widget' AND column_name = 'weight'",
    )
    .fetch_one(&raw)
    .await?;
    assert_eq!(weight_columns, 0);

    raw.close().await;
    env.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_start_reports_migration_failure() -> anyhow::Result<()> {
    let migrations = MigrationSet::from_dir(BROKEN_MIGRATIONS).await?;
    let settings = settings().with_migration_failure_policy(MigrationFailurePolicy::Teardown);

    let err = TestEnvironment::start_with(settings, migrations, SubstitutionRegistry::new())
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::Migration { version: Some(2), .. }));
    assert!(err.kept_instance().is_none());
    Ok(())
}

#[tokio::test]
async fn test_keep_policy_leaves_failed_instance_reachable() -> anyhow::Result<()> {
    let migrations = MigrationSet::from_dir(BROKEN_MIGRATIONS).await?;
    let settings = settings().with_migration_failure_policy(MigrationFailurePolicy::Keep);

    let err = TestEnvironment::start_with(settings, migrations, SubstitutionRegistry::new())
        .await
        .unwrap_err();
    assert!(
        matches!(err, HarnessError::Migration { version: Some(2), .. }),
        "got {:?}",
        err
    );
    let kept = err.kept_instance().expect("instance should be kept").clone();
    assert!(err.to_string().contains(&kept.container_id));

    // The container outlived the environment and still holds version 1
    let versions = recorded_versions(&kept).await;

    // Nothing removes a kept container but us
    let removed = Command::new("docker")
        .args(["rm", "-f", kept.container_id.as_str()])
        .output()?;
    assert!(
        removed.status.success(),
        "docker rm failed: {}",
        String::from_utf8_lossy(&removed.stderr)
    );

    assert_eq!(versions?, vec![1]);
    Ok(())
}
